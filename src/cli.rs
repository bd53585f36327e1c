//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

/// Batch-ingest audio files linked from a web page.
///
/// Audioloader discovers audio links on the given page, uploads each
/// file to object storage, extracts duration and loudness, classifies
/// the result, and upserts a deduplicated row into the record table.
#[derive(Parser, Debug)]
#[command(name = "audioloader")]
#[command(author, version, about)]
pub struct Args {
    /// URL of the page to scan for audio links
    pub page_url: String,

    /// Object store base URL (e.g. https://storage.example.com)
    #[arg(long)]
    pub store_endpoint: String,

    /// Object store bucket receiving the uploaded artifacts
    #[arg(long)]
    pub bucket: String,

    /// Fully qualified record table id (project.dataset.table)
    #[arg(long)]
    pub table: String,

    /// Path to the JSON credential file for the object store
    #[arg(long)]
    pub credentials: PathBuf,

    /// Path to the record database file
    #[arg(long, default_value = "records.db")]
    pub db: PathBuf,

    /// Working directory for temporary download files
    #[arg(long, default_value = ".")]
    pub work_dir: PathBuf,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,
}
