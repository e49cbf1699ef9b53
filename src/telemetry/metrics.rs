//! Metric instrument factories for lidex.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! All instruments are created lazily from the [`INSTRUMENTATION_SCOPE`] meter.

use opentelemetry::metrics::{Counter, Meter};

use super::INSTRUMENTATION_SCOPE;

/// Returns the shared meter for lidex instruments.
fn meter() -> Meter {
    opentelemetry::global::meter(INSTRUMENTATION_SCOPE)
}

/// Counter: workflow registrations.
/// Labels: `handler`, `result` ("created" | "duplicate").
pub fn workflows_inserted() -> Counter<u64> {
    meter()
        .u64_counter("lidex.workflow.inserted")
        .with_description("Number of workflow insert attempts")
        .build()
}

/// Counter: claim attempts.
/// Labels: `result` ("claimed" | "empty").
pub fn workflow_claims() -> Counter<u64> {
    meter()
        .u64_counter("lidex.workflow.claims")
        .with_description("Number of claim attempts")
        .build()
}

/// Counter: step output lookups.
/// Labels: `result` ("hit" | "miss").
pub fn output_lookups() -> Counter<u64> {
    meter()
        .u64_counter("lidex.step.output_lookups")
        .with_description("Number of memoized step output lookups")
        .build()
}

/// Counter: step output writes.
/// Labels: `result` ("saved" | "exists").
pub fn outputs_saved() -> Counter<u64> {
    meter()
        .u64_counter("lidex.step.outputs_saved")
        .with_description("Number of step output write attempts")
        .build()
}
