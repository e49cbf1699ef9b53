//! Claim outcome reporting, shared by every backend.

use chrono::{DateTime, Utc};
use opentelemetry::KeyValue;
use tracing::Span;

use super::metrics;

/// Record a claim attempt on the current span and the claims counter.
///
/// The caller's span must declare `workflow.id` and `lease_ms` as
/// `tracing::field::Empty`; both are filled only when a workflow was won.
pub fn record_claim(claimed: Option<&str>, now: DateTime<Utc>, timeout_at: DateTime<Utc>) {
    metrics::workflow_claims().add(
        1,
        &[KeyValue::new(
            "result",
            if claimed.is_some() { "claimed" } else { "empty" },
        )],
    );

    if let Some(id) = claimed {
        let lease_ms = (timeout_at - now).num_milliseconds();
        let span = Span::current();
        span.record("workflow.id", id);
        span.record("lease_ms", lease_ms);
        tracing::debug!(workflow_id = id, lease_ms, "workflow claimed");
    }
}
