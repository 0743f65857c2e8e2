use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dumpflow::config::Settings;
use dumpflow::events::LoggingEventSink;
use dumpflow::observability::init_tracing;
use dumpflow::pipeline::{Collaborators, PipelineExecutor};
use dumpflow::service::{ArchiveService, BackupRequest, RestoreRequest};
use dumpflow::store::InMemoryTaskStore;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[clap(about = "Database and filestore backups", version)]
struct Args {
    /// Path to a settings file
    #[clap(short, long, global = true)]
    config: Option<PathBuf>,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Back up a database and its filestore
    Backup {
        /// Database name
        name: String,
        /// Leave the filestore out of the archive
        #[clap(long)]
        no_filestore: bool,
        /// Dump format: sql or custom
        #[clap(long)]
        format: Option<String>,
    },
    /// Restore an uploaded archive
    Restore {
        /// Target database name
        name: String,
        /// Archive name under the upload root
        filename: String,
    },
    /// Print the effective settings
    Settings,
}

fn print_settings(mut settings: Settings) -> Result<()> {
    if settings.postgres.password.is_some() {
        settings.postgres.password = Some("********".to_string());
    }
    println!("{}", serde_json::to_string_pretty(&settings)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let settings = Settings::load(args.config.as_deref()).context("Failed to load settings")?;
    init_tracing(&settings.logging);

    let executor = PipelineExecutor::new(Arc::new(InMemoryTaskStore::new()), settings.worker.concurrency)
        .with_events(Arc::new(LoggingEventSink::default()));
    let service = ArchiveService::new(Collaborators::postgres(settings.clone()), executor);

    let submission = match args.command {
        Command::Settings => return print_settings(settings),
        Command::Backup {
            name,
            no_filestore,
            format,
        } => {
            let request = BackupRequest {
                name,
                filestore: no_filestore.then_some(false),
                dump_format: format,
            };
            service.start_backup(request).await?
        }
        Command::Restore { name, filename } => service.start_restore(RestoreRequest { name, filename }).await?,
    };

    let task_id = submission.task_id();
    let outcome = submission.wait().await;

    let report = service.status(task_id).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    outcome.map(|_| ()).context("Pipeline failed")
}
