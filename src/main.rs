//! # Catalog Ingest CLI
//!
//! Operator entry point: creates batches from CSV files and drives them
//! through their lifecycle. Results are printed to stdout as JSON; logs go
//! to stderr.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use uuid::Uuid;

use catalog_ingest::{
    config::ConfigLoader,
    db,
    error::OperationResult,
    ingest::{BatchEngine, BatchStatus, CreateBatchOptions},
    telemetry::init_tracing,
};

#[derive(Parser)]
#[command(name = "catalog-ingest")]
#[command(about = "Batch ingestion of supplier product catalogs from CSV", long_about = None)]
struct Cli {
    /// Directory holding the layered .env files
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Apply pending database migrations
    Migrate,

    /// Create a batch for a CSV file and store the file
    Create {
        /// Path to the CSV file
        file: PathBuf,
        /// Catalog for rows that name none
        #[arg(long)]
        catalog_id: Option<i32>,
        /// Start processing right away
        #[arg(long)]
        start: bool,
    },

    /// Start a pending batch
    Start { batch_id: Uuid },

    /// Ask a running batch to pause before its next row
    Pause { batch_id: Uuid },

    /// Mark a paused batch as resumable
    MarkResumable { batch_id: Uuid },

    /// Continue a paused or resumable batch after its last processed row
    Resume { batch_id: Uuid },

    /// Reprocess a failed batch from the first row
    Retry { batch_id: Uuid },

    /// Cancel a batch
    Cancel { batch_id: Uuid },

    /// Delete a batch that is not running, with its log and file
    Delete { batch_id: Uuid },

    /// Show a batch with its issue counts
    Show { batch_id: Uuid },

    /// Print a batch's error log
    Errors { batch_id: Uuid },

    /// List batches, newest first
    List {
        #[arg(long)]
        status: Option<BatchStatus>,
    },

    /// Print a CSV template with the known attribute columns
    Template {
        #[arg(long)]
        catalog_id: Option<i32>,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let loader = match cli.config_dir {
        Some(dir) => ConfigLoader::with_base_dir(dir),
        None => ConfigLoader::new(),
    };
    let config = loader.load().context("loading configuration")?;
    init_tracing(&config).context("initializing tracing")?;

    if let Ok(redacted) = config.redacted_json() {
        tracing::debug!(profile = %config.profile, config = %redacted, "Configuration loaded");
    }

    let db = db::init_pool(&config)
        .await
        .context("initializing database connection pool")?;
    db::health_check(&db).await.context("database health check")?;
    db::migrate(&db).await.context("applying migrations")?;

    let engine = BatchEngine::with_local_store(db, config.ingest.clone());

    let success = match cli.command {
        Command::Migrate => {
            println!("{}", serde_json::json!({ "success": true }));
            true
        }
        Command::Create {
            file,
            catalog_id,
            start,
        } => {
            let filename = file
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| file.display().to_string());
            let created = engine
                .create_batch(
                    &filename,
                    CreateBatchOptions {
                        default_catalog_id: catalog_id,
                    },
                )
                .await;
            match created.data.as_ref().map(|batch| batch.id) {
                Some(batch_id) => {
                    let attached = engine.attach_file(batch_id, &file).await;
                    if start && attached.success {
                        emit(&engine.start(batch_id).await)?
                    } else {
                        emit(&attached)?
                    }
                }
                None => emit(&created)?,
            }
        }
        Command::Start { batch_id } => emit(&engine.start(batch_id).await)?,
        Command::Pause { batch_id } => emit(&engine.pause(batch_id).await)?,
        Command::MarkResumable { batch_id } => emit(&engine.mark_resumable(batch_id).await)?,
        Command::Resume { batch_id } => emit(&engine.resume(batch_id).await)?,
        Command::Retry { batch_id } => emit(&engine.retry(batch_id).await)?,
        Command::Cancel { batch_id } => emit(&engine.cancel(batch_id).await)?,
        Command::Delete { batch_id } => emit(&engine.delete(batch_id).await)?,
        Command::Show { batch_id } => emit(&engine.summary(batch_id).await)?,
        Command::Errors { batch_id } => emit(&engine.list_errors(batch_id).await)?,
        Command::List { status } => emit(&engine.list_batches(status).await)?,
        Command::Template { catalog_id } => {
            let template = engine.template(catalog_id).await;
            match &template.data {
                Some(csv) => {
                    print!("{csv}");
                    true
                }
                None => emit(&template)?,
            }
        }
    };

    Ok(if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn emit<T: Serialize>(result: &OperationResult<T>) -> Result<bool> {
    let json = serde_json::to_string_pretty(result).context("serializing result")?;
    println!("{json}");
    Ok(result.success)
}
