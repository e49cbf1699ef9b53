//! Memoized step outputs keyed by `"{workflow_id}/{step_id}"`.

use opentelemetry::KeyValue;
use tracing::instrument;

use crate::codec::Payload;
use crate::error::{Result, require_id};
use crate::model::StepKey;
use crate::telemetry::metrics;

fn step_key(workflow_id: &str, step_id: &str) -> Result<StepKey> {
    require_id("workflow", workflow_id)?;
    require_id("step", step_id)?;
    Ok(StepKey::new(workflow_id, step_id))
}

impl super::Db {
    #[instrument(skip(self))]
    pub(super) async fn find_step_output(
        &self,
        workflow_id: &str,
        step_id: &str,
    ) -> Result<Option<Payload>> {
        let key = step_key(workflow_id, step_id)?;

        let row: Option<(String,)> =
            sqlx::query_as(concat!("SELECT output FROM ", steps_table!(), " WHERE id = $1"))
                .bind(key.as_str())
                .fetch_optional(self.pool()?)
                .await?;

        metrics::output_lookups().add(
            1,
            &[KeyValue::new(
                "result",
                if row.is_some() { "hit" } else { "miss" },
            )],
        );
        Ok(row.map(|(output,)| Payload::from_raw(output)))
    }

    /// Write-once: an existing output for the key is left untouched.
    #[instrument(skip(self, output))]
    pub(super) async fn save_step_output(
        &self,
        workflow_id: &str,
        step_id: &str,
        output: &Payload,
    ) -> Result<bool> {
        let key = step_key(workflow_id, step_id)?;

        let rows_affected = sqlx::query(concat!(
            "INSERT INTO ",
            steps_table!(),
            " (id, output) VALUES ($1, $2) ON CONFLICT (id) DO NOTHING"
        ))
        .bind(key.as_str())
        .bind(output.as_str())
        .execute(self.pool()?)
        .await?
        .rows_affected();

        let saved = rows_affected > 0;
        metrics::outputs_saved().add(
            1,
            &[KeyValue::new("result", if saved { "saved" } else { "exists" })],
        );
        Ok(saved)
    }
}
