//! lidex CLI: operator interface to the workflow store.

use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};
use lidex::config::Config;
use lidex::config::secrets::ExposeSecret;
use lidex::db::Db;
use lidex::telemetry::{INSTRUMENTATION_SCOPE, TelemetryConfig, init_telemetry};
use lidex::{Payload, WorkflowStore};

#[derive(Parser)]
#[command(name = "lidex", about = "Durable workflow store")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create tables if absent and check connectivity
    Init,
    /// Register a workflow (no-op if the id already exists)
    Insert {
        /// Workflow ID
        id: String,
        /// Handler name
        handler: String,
        /// JSON input
        #[arg(long)]
        input: Option<String>,
    },
    /// Claim one eligible workflow
    Claim {
        /// Lease length in seconds
        #[arg(long, default_value_t = 30)]
        lease_secs: i64,
    },
    /// Show a workflow
    Show {
        /// Workflow ID
        id: String,
    },
    /// Show a memoized step output
    Output {
        /// Workflow ID
        workflow: String,
        /// Step ID
        step: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::from_env()?;

    let telemetry = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: INSTRUMENTATION_SCOPE.to_string(),
        log_level: config.log_level.clone(),
    })?;
    tracing::debug!(exporting = telemetry.is_exporting(), "telemetry ready");

    let db = Db::connect_with(config.database_url.expose_secret(), config.max_connections).await?;
    let result = run(&db, cli.command).await;
    db.terminate().await?;
    result
}

async fn run(db: &Db, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Init => {
            db.health_check().await?;
            println!("schema ready");
        }
        Command::Insert { id, handler, input } => {
            let input = match input {
                Some(raw) => serde_json::from_str(&raw)?,
                None => serde_json::Value::Null,
            };
            if db.insert(&id, &handler, Payload::encode(&input)?).await? {
                println!("inserted {id}");
            } else {
                println!("{id} already exists");
            }
        }
        Command::Claim { lease_secs } => {
            let now = Utc::now();
            match db.claim(now, now + Duration::seconds(lease_secs)).await? {
                Some(id) => println!("{id}"),
                None => println!("no claimable workflow"),
            }
        }
        Command::Show { id } => match db.get_workflow(&id).await? {
            Some(wf) => {
                println!("id:         {}", wf.id);
                println!("handler:    {}", wf.handler);
                if wf.status.is_terminal() {
                    println!("status:     {} (terminal)", wf.status);
                } else {
                    println!("status:     {}", wf.status);
                }
                if let Some(t) = wf.timeout_at {
                    println!("timeout_at: {}", t.to_rfc3339());
                }
                if let Some(n) = wf.failures {
                    println!("failures:   {n}");
                }
                if let Some(ref e) = wf.last_error {
                    println!("last_error: {e}");
                }
                println!("input:      {}", wf.input);
            }
            None => anyhow::bail!("workflow {id} not found"),
        },
        Command::Output { workflow, step } => {
            match db.find_output(&workflow, &step).await? {
                Some(output) => println!("{output}"),
                None => println!("no output recorded for {workflow}/{step}"),
            }
        }
    }
    Ok(())
}
