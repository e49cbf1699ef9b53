//! Workflow operations: idempotent insert, lease-based claim, lookup.

use chrono::{DateTime, Utc};
use opentelemetry::KeyValue;
use tracing::{debug, instrument};

use crate::codec::Payload;
use crate::error::{Error, Result, require_id};
use crate::model::{Status, Workflow, storage_precision};
use crate::telemetry::{claim, metrics};

impl super::Db {
    /// Insert an idle workflow unless one with the same id exists.
    #[instrument(skip(self, input), fields(input_bytes = input.as_str().len()))]
    pub(super) async fn insert_workflow(
        &self,
        workflow_id: &str,
        handler: &str,
        input: &Payload,
    ) -> Result<bool> {
        require_id("workflow", workflow_id)?;

        // The primary key arbitrates concurrent duplicates; the loser gets
        // no row back instead of a constraint error.
        let inserted: Option<(String,)> = sqlx::query_as(concat!(
            "INSERT INTO ",
            workflows_table!(),
            " (id, handler, input, status)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (id) DO NOTHING
             RETURNING id"
        ))
        .bind(workflow_id)
        .bind(handler)
        .bind(input.as_str())
        .bind(Status::Idle.as_str())
        .fetch_optional(self.pool()?)
        .await?;

        let created = inserted.is_some();
        metrics::workflows_inserted().add(
            1,
            &[
                KeyValue::new("handler", handler.to_string()),
                KeyValue::new("result", if created { "created" } else { "duplicate" }),
            ],
        );
        debug!(created, "workflow insert");
        Ok(created)
    }

    /// Claim one eligible workflow in a single statement.
    ///
    /// The candidate scan takes a row lock with SKIP LOCKED, and the UPDATE
    /// runs against that same locked row, so eligibility check, lock, and
    /// transition are indivisible.
    #[instrument(
        skip(self),
        fields(workflow.id = tracing::field::Empty, lease_ms = tracing::field::Empty)
    )]
    pub(super) async fn claim_workflow(
        &self,
        now: DateTime<Utc>,
        timeout_at: DateTime<Utc>,
    ) -> Result<Option<String>> {
        let (now, timeout_at) = (storage_precision(now), storage_precision(timeout_at));

        let row: Option<(String,)> = sqlx::query_as(concat!(
            "WITH candidate AS (
                SELECT id
                FROM ",
            workflows_table!(),
            "
                WHERE status = 'idle'
                   OR (status IN ('running', 'failed') AND timeout_at <= $1)
                LIMIT 1
                FOR UPDATE SKIP LOCKED
             )
             UPDATE ",
            workflows_table!(),
            " w
             SET status = 'running',
                 timeout_at = $2
             FROM candidate
             WHERE w.id = candidate.id
             RETURNING w.id"
        ))
        .bind(now)
        .bind(timeout_at)
        .fetch_optional(self.pool()?)
        .await?;

        let claimed = row.map(|(id,)| id);
        claim::record_claim(claimed.as_deref(), now, timeout_at);
        Ok(claimed)
    }

    /// Fetch a workflow by id.
    #[instrument(skip(self))]
    pub(super) async fn fetch_workflow(&self, workflow_id: &str) -> Result<Option<Workflow>> {
        require_id("workflow", workflow_id)?;

        let row: Option<WorkflowRow> = sqlx::query_as(concat!(
            "SELECT id, handler, input, status, timeout_at, failures, last_error
             FROM ",
            workflows_table!(),
            " WHERE id = $1"
        ))
        .bind(workflow_id)
        .fetch_optional(self.pool()?)
        .await?;

        row.map(WorkflowRow::try_into_workflow).transpose()
    }
}

/// Internal row type for sqlx::FromRow.
#[derive(sqlx::FromRow)]
struct WorkflowRow {
    id: String,
    handler: String,
    input: String,
    status: String,
    timeout_at: Option<DateTime<Utc>>,
    failures: Option<i32>,
    last_error: Option<String>,
}

impl WorkflowRow {
    fn try_into_workflow(self) -> Result<Workflow> {
        let failures = self
            .failures
            .map(|n| {
                u32::try_from(n).map_err(|_| {
                    Error::InvalidRow(format!("workflow {} has failures = {n}", self.id))
                })
            })
            .transpose()?;

        Ok(Workflow {
            id: self.id,
            handler: self.handler,
            input: Payload::from_raw(self.input),
            status: self.status.parse()?,
            timeout_at: self.timeout_at,
            failures,
            last_error: self.last_error,
        })
    }
}
