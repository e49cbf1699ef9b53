//! The store contract shared by every backend.
//!
//! All time references are supplied by the caller. Backends run no timers
//! of their own, so behaviour is deterministic for fixed inputs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::codec::Payload;
use crate::error::Result;
use crate::model::Workflow;

#[async_trait]
pub trait WorkflowStore: Send + Sync {
    /// Register a workflow as `idle`.
    ///
    /// Returns `true` if a new row was created, `false` if one with the same
    /// id already existed (nothing is changed in that case).
    async fn insert(&self, workflow_id: &str, handler: &str, input: Payload) -> Result<bool>;

    /// Claim at most one eligible workflow.
    ///
    /// The chosen workflow moves to `running` with its lease set to
    /// `timeout_at`. Concurrent callers never receive the same id within one
    /// lease. `None` means nothing is claimable right now.
    async fn claim(
        &self,
        now: DateTime<Utc>,
        timeout_at: DateTime<Utc>,
    ) -> Result<Option<String>>;

    /// Look up a memoized step output. `None` means the step has not run.
    async fn find_output(&self, workflow_id: &str, step_id: &str) -> Result<Option<Payload>>;

    /// Record a step output once.
    ///
    /// Returns `false` and keeps the stored value if the key already has one.
    async fn save_output(&self, workflow_id: &str, step_id: &str, output: Payload)
    -> Result<bool>;

    /// Fetch a workflow row.
    async fn get_workflow(&self, workflow_id: &str) -> Result<Option<Workflow>>;

    /// Release the underlying resources. Later calls fail with
    /// [`Error::Terminated`](crate::Error::Terminated). Calling it twice is fine.
    async fn terminate(&self) -> Result<()>;

    /// [`insert`](Self::insert) with any serializable input.
    async fn insert_value<T>(&self, workflow_id: &str, handler: &str, input: &T) -> Result<bool>
    where
        T: Serialize + Sync + ?Sized,
        Self: Sized,
    {
        let payload = Payload::encode(input)?;
        self.insert(workflow_id, handler, payload).await
    }

    /// [`find_output`](Self::find_output) decoded into the caller's type.
    async fn find_output_value<T>(&self, workflow_id: &str, step_id: &str) -> Result<Option<T>>
    where
        T: DeserializeOwned + Send,
        Self: Sized,
    {
        match self.find_output(workflow_id, step_id).await? {
            Some(payload) => Ok(Some(payload.decode()?)),
            None => Ok(None),
        }
    }

    /// [`save_output`](Self::save_output) with any serializable output.
    async fn save_output_value<T>(
        &self,
        workflow_id: &str,
        step_id: &str,
        output: &T,
    ) -> Result<bool>
    where
        T: Serialize + Sync + ?Sized,
        Self: Sized,
    {
        let payload = Payload::encode(output)?;
        self.save_output(workflow_id, step_id, payload).await
    }
}
