use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use opentelemetry::KeyValue;
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use crate::codec::Payload;
use crate::error::{Error, Result, require_id};
use crate::model::{StepKey, Status, Workflow, storage_precision};
use crate::store::WorkflowStore;
use crate::telemetry::{claim, metrics};

#[derive(Default)]
struct MemoryState {
    /// Ordered by id so claim picks deterministically in tests.
    workflows: BTreeMap<String, Workflow>,
    steps: HashMap<StepKey, Payload>,
}

/// Store kept entirely in process memory.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    terminated: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite a workflow row wholesale.
    ///
    /// Status changes other than claim (finish, fail, abort) belong to the
    /// surrounding engine; this is how it, and tests, put a row into a
    /// given state.
    pub async fn put_workflow(&self, mut workflow: Workflow) -> Result<()> {
        self.ensure_open()?;
        require_id("workflow", &workflow.id)?;
        workflow.timeout_at = workflow.timeout_at.map(storage_precision);
        let mut state = self.state.lock().await;
        state.workflows.insert(workflow.id.clone(), workflow);
        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.terminated.load(Ordering::Acquire) {
            return Err(Error::Terminated);
        }
        Ok(())
    }
}

#[async_trait]
impl WorkflowStore for MemoryStore {
    #[instrument(skip(self, input))]
    async fn insert(&self, workflow_id: &str, handler: &str, input: Payload) -> Result<bool> {
        self.ensure_open()?;
        require_id("workflow", workflow_id)?;

        let mut state = self.state.lock().await;
        let created = !state.workflows.contains_key(workflow_id);
        if created {
            state.workflows.insert(
                workflow_id.to_string(),
                Workflow::new(workflow_id, handler, input),
            );
        }

        metrics::workflows_inserted().add(
            1,
            &[
                KeyValue::new("handler", handler.to_string()),
                KeyValue::new("result", if created { "created" } else { "duplicate" }),
            ],
        );
        Ok(created)
    }

    #[instrument(
        skip(self),
        fields(workflow.id = tracing::field::Empty, lease_ms = tracing::field::Empty)
    )]
    async fn claim(
        &self,
        now: DateTime<Utc>,
        timeout_at: DateTime<Utc>,
    ) -> Result<Option<String>> {
        self.ensure_open()?;
        let (now, timeout_at) = (storage_precision(now), storage_precision(timeout_at));

        let mut state = self.state.lock().await;
        let claimed = state
            .workflows
            .values_mut()
            .find(|wf| wf.is_claimable(now))
            .map(|wf| {
                wf.status = Status::Running;
                wf.timeout_at = Some(timeout_at);
                wf.id.clone()
            });
        drop(state);

        claim::record_claim(claimed.as_deref(), now, timeout_at);
        Ok(claimed)
    }

    #[instrument(skip(self))]
    async fn find_output(&self, workflow_id: &str, step_id: &str) -> Result<Option<Payload>> {
        self.ensure_open()?;
        require_id("workflow", workflow_id)?;
        require_id("step", step_id)?;

        let state = self.state.lock().await;
        let output = state.steps.get(&StepKey::new(workflow_id, step_id)).cloned();

        metrics::output_lookups().add(
            1,
            &[KeyValue::new(
                "result",
                if output.is_some() { "hit" } else { "miss" },
            )],
        );
        Ok(output)
    }

    #[instrument(skip(self, output))]
    async fn save_output(
        &self,
        workflow_id: &str,
        step_id: &str,
        output: Payload,
    ) -> Result<bool> {
        self.ensure_open()?;
        require_id("workflow", workflow_id)?;
        require_id("step", step_id)?;

        let mut state = self.state.lock().await;
        let key = StepKey::new(workflow_id, step_id);
        let saved = !state.steps.contains_key(&key);
        if saved {
            state.steps.insert(key, output);
        }

        metrics::outputs_saved().add(
            1,
            &[KeyValue::new("result", if saved { "saved" } else { "exists" })],
        );
        Ok(saved)
    }

    async fn get_workflow(&self, workflow_id: &str) -> Result<Option<Workflow>> {
        self.ensure_open()?;
        require_id("workflow", workflow_id)?;
        let state = self.state.lock().await;
        Ok(state.workflows.get(workflow_id).cloned())
    }

    async fn terminate(&self) -> Result<()> {
        if !self.terminated.swap(true, Ordering::AcqRel) {
            let mut state = self.state.lock().await;
            state.workflows.clear();
            state.steps.clear();
            debug!("memory store terminated");
        }
        Ok(())
    }
}
