//! Postgres backend: connection pool, schema bootstrap, health check.
//!
//! Claiming relies on `FOR UPDATE SKIP LOCKED`, so concurrent workers racing
//! for the same row never block on each other and never both win.

// Table names, shared by the schema and every query through `concat!`.
macro_rules! workflows_table {
    () => {
        "lidexworkflows"
    };
}
macro_rules! steps_table {
    () => {
        "lidexworkflowsteps"
    };
}
macro_rules! naps_table {
    () => {
        "lidexworkflownaps"
    };
}

mod step;
mod workflow;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::{debug, info};

use crate::codec::Payload;
use crate::error::{Error, Result};
use crate::model::Workflow;
use crate::store::WorkflowStore;

pub const WORKFLOWS_TABLE: &str = workflows_table!();
pub const STEPS_TABLE: &str = steps_table!();
pub const NAPS_TABLE: &str = naps_table!();

const SCHEMA: &[&str] = &[
    concat!(
        "CREATE TABLE IF NOT EXISTS ",
        workflows_table!(),
        " (
            id          TEXT PRIMARY KEY,
            handler     TEXT NOT NULL,
            input       TEXT NOT NULL,
            status      TEXT NOT NULL,
            timeout_at  TIMESTAMPTZ,
            failures    INTEGER,
            last_error  TEXT
        )"
    ),
    concat!(
        "CREATE INDEX IF NOT EXISTS ",
        workflows_table!(),
        "_lease_idx ON ",
        workflows_table!(),
        " (timeout_at) WHERE status IN ('running', 'failed')"
    ),
    concat!(
        "CREATE TABLE IF NOT EXISTS ",
        steps_table!(),
        " (
            id      TEXT PRIMARY KEY,
            output  TEXT NOT NULL
        )"
    ),
    concat!(
        "CREATE TABLE IF NOT EXISTS ",
        naps_table!(),
        " (
            id           TEXT PRIMARY KEY,
            workflow_id  TEXT NOT NULL,
            wake_up_at   TIMESTAMPTZ NOT NULL
        )"
    ),
];

const DEFAULT_MAX_CONNECTIONS: u32 = 10;

/// Database handle. Owns the connection pool; one per process is typical,
/// but nothing stops tests from opening a fresh one each.
pub struct Db {
    pool: PgPool,
}

impl Db {
    /// Connect with the default pool size and ensure the schema exists.
    pub async fn connect(url: &str) -> Result<Self> {
        Self::connect_with(url, DEFAULT_MAX_CONNECTIONS).await
    }

    /// Connect with an explicit pool size and ensure the schema exists.
    pub async fn connect_with(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        Self::from_pool(pool).await
    }

    /// Wrap an existing pool. Tables are created if absent.
    pub async fn from_pool(pool: PgPool) -> Result<Self> {
        let db = Self { pool };
        db.ensure_schema().await?;
        Ok(db)
    }

    /// Create the workflow, step, and nap tables if they do not exist.
    pub async fn ensure_schema(&self) -> Result<()> {
        let pool = self.pool()?;
        for statement in SCHEMA {
            sqlx::query(statement).execute(pool).await?;
        }
        info!(
            workflows = WORKFLOWS_TABLE,
            steps = STEPS_TABLE,
            naps = NAPS_TABLE,
            "schema ready"
        );
        Ok(())
    }

    /// Simple health check: run a SELECT 1.
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(self.pool()?).await?;
        Ok(())
    }

    /// The pool, unless the handle has been terminated.
    pub(crate) fn pool(&self) -> Result<&PgPool> {
        if self.pool.is_closed() {
            return Err(Error::Terminated);
        }
        Ok(&self.pool)
    }
}

#[async_trait]
impl WorkflowStore for Db {
    async fn insert(&self, workflow_id: &str, handler: &str, input: Payload) -> Result<bool> {
        self.insert_workflow(workflow_id, handler, &input).await
    }

    async fn claim(
        &self,
        now: DateTime<Utc>,
        timeout_at: DateTime<Utc>,
    ) -> Result<Option<String>> {
        self.claim_workflow(now, timeout_at).await
    }

    async fn find_output(&self, workflow_id: &str, step_id: &str) -> Result<Option<Payload>> {
        self.find_step_output(workflow_id, step_id).await
    }

    async fn save_output(
        &self,
        workflow_id: &str,
        step_id: &str,
        output: Payload,
    ) -> Result<bool> {
        self.save_step_output(workflow_id, step_id, &output).await
    }

    async fn get_workflow(&self, workflow_id: &str) -> Result<Option<Workflow>> {
        self.fetch_workflow(workflow_id).await
    }

    async fn terminate(&self) -> Result<()> {
        if !self.pool.is_closed() {
            self.pool.close().await;
            debug!("connection pool closed");
        }
        Ok(())
    }
}
