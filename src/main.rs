//! CLI entry point for the audioloader tool.

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, info, warn};

use audioloader::{
    ArtifactStore, Database, ObjectStoreConfig, Pipeline, RecordStore, TableId, TransferClient,
};

mod cli;

use cli::Args;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Determine log level based on verbose/quiet flags
    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    debug!(?args, "CLI arguments parsed");
    info!("Audioloader starting");

    // Unrecoverable configuration problems fail the whole run fast:
    // table id, credentials, database. Everything past this point is
    // per-item and isolated.
    let table = TableId::parse(&args.table).context("invalid --table value")?;

    let transfer = TransferClient::new();
    let artifacts = ArtifactStore::new(
        transfer.inner().clone(),
        ObjectStoreConfig {
            endpoint: args.store_endpoint,
            bucket: args.bucket,
            credentials_path: args.credentials,
        },
    )
    .await
    .context("object store configuration is unusable")?;

    let db = Database::new(&args.db)
        .await
        .context("failed to open record database")?;
    let records = RecordStore::new(db, table);

    let pipeline = Pipeline::new(transfer, artifacts, records, args.work_dir);
    let stats = pipeline.run(&args.page_url).await;

    info!(
        discovered = stats.discovered,
        persisted = stats.persisted,
        failed = stats.failed(),
        "Ingestion complete"
    );

    for failure in &stats.failures {
        warn!(
            url = %failure.url,
            stage = %failure.stage,
            error = %failure.error,
            "item was not persisted"
        );
    }

    Ok(())
}
