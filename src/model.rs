//! Core data model.
//!
//! A workflow is a unit of work addressed by a caller-supplied id. Its
//! status and lease (`timeout_at`) decide whether a worker may claim it.

use chrono::{DateTime, SubsecRound, Utc};

use crate::codec::Payload;
use crate::error::Error;

// ---------------------------------------------------------------------------
// Workflow
// ---------------------------------------------------------------------------

/// A workflow row as persisted by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct Workflow {
    /// Caller-supplied, immutable, unique.
    pub id: String,

    /// Name of the logic that processes this workflow.
    pub handler: String,

    /// Serialized caller input. Opaque to the store.
    pub input: Payload,

    /// Current lifecycle status.
    pub status: Status,

    /// Lease expiry. Only meaningful while `Running` or `Failed`.
    pub timeout_at: Option<DateTime<Utc>>,

    /// Number of prior failed attempts, when the engine records them.
    pub failures: Option<u32>,

    /// Most recent failure text.
    pub last_error: Option<String>,
}

impl Workflow {
    /// A freshly registered workflow: idle, no lease.
    pub fn new(id: impl Into<String>, handler: impl Into<String>, input: Payload) -> Self {
        Self {
            id: id.into(),
            handler: handler.into(),
            input,
            status: Status::Idle,
            timeout_at: None,
            failures: None,
            last_error: None,
        }
    }

    /// Whether a claim evaluated at `now` may take this workflow.
    ///
    /// Idle rows are always eligible. Running and failed rows become eligible
    /// once their lease has lapsed (`timeout_at <= now`). A missing lease on
    /// a leased status is treated as never expiring.
    pub fn is_claimable(&self, now: DateTime<Utc>) -> bool {
        match self.status {
            status if status.is_terminal() => false,
            Status::Idle => true,
            _ => self.timeout_at.is_some_and(|t| t <= now),
        }
    }
}

/// Truncate a timestamp to the microsecond precision Postgres stores.
///
/// Claim inputs go through this in every backend so a lease compares the
/// same way whether it was persisted or held in memory.
pub fn storage_precision(t: DateTime<Utc>) -> DateTime<Utc> {
    t.trunc_subsecs(6)
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle status of a workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// Registered, never claimed.
    Idle,
    /// Leased to a worker until `timeout_at`.
    Running,
    /// Last attempt failed; retried once `timeout_at` passes.
    Failed,
    /// Done successfully. Terminal.
    Finished,
    /// Cancelled. Terminal.
    Aborted,
}

impl Status {
    /// Is this a terminal status?
    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Finished | Status::Aborted)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Idle => "idle",
            Status::Running => "running",
            Status::Failed => "failed",
            Status::Finished => "finished",
            Status::Aborted => "aborted",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Status {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(Status::Idle),
            "running" => Ok(Status::Running),
            "failed" => Ok(Status::Failed),
            "finished" => Ok(Status::Finished),
            "aborted" => Ok(Status::Aborted),
            other => Err(Error::InvalidStatus(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Step output key
// ---------------------------------------------------------------------------

/// Composite identity of a memoized step output: `"{workflow_id}/{step_id}"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StepKey(String);

impl StepKey {
    pub fn new(workflow_id: &str, step_id: &str) -> Self {
        Self(format!("{workflow_id}/{step_id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for StepKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Nap
// ---------------------------------------------------------------------------

/// A scheduled wake-up for a workflow suspended on a timer.
///
/// The table is created alongside the others; writing and consuming naps
/// belongs to the surrounding engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Nap {
    pub id: String,
    pub workflow_id: String,
    pub wake_up_at: DateTime<Utc>,
}
