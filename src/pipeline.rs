//! Pipeline orchestrator: drives each discovered resource through
//! acquisition, upload, metric extraction, classification, and
//! idempotent persistence, with guaranteed cleanup of the local
//! temporary file on every exit path.
//!
//! Items are processed one at a time; one item's failure is recorded
//! and never aborts the batch. All external calls are plain
//! request/response operations awaited in sequence.

use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::classify::classify;
use crate::discover::discover_audio_links;
use crate::metrics::{DecodeError, extract_metrics};
use crate::store::artifact::{ArtifactStore, StorageError};
use crate::store::records::{AudioRecord, RecordStore, StoreError, UpsertReceipt};
use crate::transfer::{TransferClient, TransferError, base_name_from_url, temp_file_name};

/// The pipeline stage an item was in when it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Fetching the resource bytes to the local temporary file.
    Download,
    /// Uploading the artifact to object storage.
    StoreArtifact,
    /// Decoding the artifact for duration and loudness.
    ExtractMetrics,
    /// Writing the record row (schema check included).
    PersistRecord,
}

impl Stage {
    /// Short label for logs.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Download => "download",
            Self::StoreArtifact => "store_artifact",
            Self::ExtractMetrics => "extract_metrics",
            Self::PersistRecord => "persist_record",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Any per-item failure, tagged by origin.
#[derive(Debug, Error)]
pub enum ItemError {
    /// Resource byte fetch failed.
    #[error(transparent)]
    Transfer(#[from] TransferError),

    /// Object storage upload failed.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The artifact could not be decoded.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// Schema check or upsert failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// One failed item: which resource, where it failed, and why.
#[derive(Debug)]
pub struct ItemFailure {
    /// The discovered resource URL.
    pub url: String,
    /// The stage that failed.
    pub stage: Stage,
    /// The underlying error.
    pub error: ItemError,
}

/// Outcome of one batch run.
#[derive(Debug, Default)]
pub struct RunStats {
    /// Number of audio links the discoverer produced.
    pub discovered: usize,
    /// Items that reached a persisted record.
    pub persisted: usize,
    /// Per-item failures, in processing order.
    pub failures: Vec<ItemFailure>,
}

impl RunStats {
    /// Number of items that failed.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    /// True when every discovered item was persisted.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && self.persisted == self.discovered
    }
}

/// The batch pipeline over one page URL.
///
/// Holds the shared HTTP client (used for page fetch and byte
/// transfer), the two persistence adapters, and the working directory
/// for temporary files.
#[derive(Debug, Clone)]
pub struct Pipeline {
    transfer: TransferClient,
    artifacts: ArtifactStore,
    records: RecordStore,
    work_dir: PathBuf,
}

impl Pipeline {
    /// Creates a pipeline from its collaborators.
    #[must_use]
    pub fn new(
        transfer: TransferClient,
        artifacts: ArtifactStore,
        records: RecordStore,
        work_dir: PathBuf,
    ) -> Self {
        Self {
            transfer,
            artifacts,
            records,
            work_dir,
        }
    }

    /// Runs the full batch over one page.
    ///
    /// Discovery failure is non-fatal: it is logged and the run
    /// completes with nothing to do. Each discovered resource is
    /// carried through download, upload, extraction, classification,
    /// and persistence in sequence; a failure at any stage records the
    /// item in the stats and processing moves to the next resource.
    #[instrument(skip(self), fields(page = %page_url))]
    pub async fn run(&self, page_url: &str) -> RunStats {
        let links = match discover_audio_links(self.transfer.inner(), page_url).await {
            Ok(links) => links,
            Err(error) => {
                warn!(%error, "link discovery failed; nothing to process");
                Vec::new()
            }
        };

        let mut stats = RunStats {
            discovered: links.len(),
            ..RunStats::default()
        };

        for url in &links {
            match self.process_item(url).await {
                Ok(receipt) => {
                    info!(
                        locator = %receipt.locator,
                        classification = %receipt.classification,
                        action = ?receipt.action,
                        "item persisted"
                    );
                    stats.persisted += 1;
                }
                Err(failure) => {
                    warn!(
                        url = %failure.url,
                        stage = %failure.stage,
                        error = %failure.error,
                        "item failed"
                    );
                    stats.failures.push(failure);
                }
            }
        }

        info!(
            discovered = stats.discovered,
            persisted = stats.persisted,
            failed = stats.failed(),
            "run complete"
        );
        stats
    }

    /// Processes one discovered resource to a terminal state.
    ///
    /// The temporary file is removed on every exit path, success or
    /// failure, before control returns to the batch loop.
    async fn process_item(&self, url: &str) -> Result<UpsertReceipt, ItemFailure> {
        let temp_path = self.work_dir.join(temp_file_name(url));

        let result = self.drive_stages(url, &temp_path).await;

        // Guaranteed release: the item exclusively owns its temp file
        // and must not leave it behind.
        if let Err(error) = tokio::fs::remove_file(&temp_path).await {
            if error.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %temp_path.display(), %error, "failed to remove temporary file");
            }
        }

        result.map_err(|(stage, error)| ItemFailure {
            url: url.to_string(),
            stage,
            error,
        })
    }

    /// The sequential stage chain for one item.
    async fn drive_stages(
        &self,
        url: &str,
        temp_path: &Path,
    ) -> Result<UpsertReceipt, (Stage, ItemError)> {
        let display_name = base_name_from_url(url);

        self.transfer
            .fetch_to_path(url, temp_path)
            .await
            .map_err(|e| (Stage::Download, ItemError::from(e)))?;

        let locator = self
            .artifacts
            .store(temp_path, &display_name)
            .await
            .map_err(|e| (Stage::StoreArtifact, ItemError::from(e)))?;

        // Full decode of a local file; short and synchronous by design.
        let metrics =
            extract_metrics(temp_path).map_err(|e| (Stage::ExtractMetrics, ItemError::from(e)))?;

        let classification = classify(metrics.duration_ms, metrics.loudness_db);

        let record = AudioRecord {
            locator,
            display_name,
            duration_ms: metrics.duration_ms,
            loudness_db: metrics.loudness_db,
            classification,
        };

        self.persist(&record)
            .await
            .map_err(|e| (Stage::PersistRecord, ItemError::from(e)))
    }

    /// Schema check plus upsert; `ensure_schema` is idempotent and
    /// safe to call before every write.
    async fn persist(&self, record: &AudioRecord) -> Result<UpsertReceipt, StoreError> {
        self.records.ensure_schema().await?;
        self.records.upsert(record).await
    }
}
