//! Record store adapter: schema management and the locator-keyed upsert.
//!
//! This is the part of the pipeline with a real invariant to protect:
//! at most one row exists per distinct locator. The adapter enforces it
//! with a check-then-write upsert — count the rows matching the
//! locator, then insert or update. The read and the write are not
//! atomic against a concurrent pipeline instance targeting the same
//! new locator; that race is an accepted bound of the single-writer
//! deployment, which is why the table carries no unique constraint on
//! `gcp_url`.
//!
//! All values travel through bound parameters; the only interpolated
//! SQL fragment is the table name, which is identifier-validated by
//! [`TableId`].

use std::fmt;

use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::classify::EnergyClass;
use crate::db::Database;

/// Finite floor used to persist a NaN loudness.
///
/// The loudness column is NOT NULL REAL and SQLite binds NaN as NULL.
/// Negative infinity round-trips fine and is stored as-is; NaN is
/// clamped to this floor. The extractor itself never produces NaN, so
/// this only matters for hand-built records.
pub const SILENCE_FLOOR_DB: f64 = -990.0;

/// The unit of persistence: one row per stored artifact.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioRecord {
    /// The artifact's durable storage address; the identity key.
    pub locator: String,
    /// Human-readable file name.
    pub display_name: String,
    /// Playback duration in milliseconds.
    pub duration_ms: u64,
    /// Loudness in dBFS; may be negative infinity for silent input.
    pub loudness_db: f64,
    /// Resolved energy classification.
    pub classification: EnergyClass,
}

/// Fully qualified three-part table identifier: `project.dataset.table`.
///
/// Each component must match `[A-Za-z0-9_-]+`. Table names cannot be
/// bound parameters, so this validation is what keeps the interpolated
/// identifier safe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableId {
    project: String,
    dataset: String,
    table: String,
}

impl TableId {
    /// Parses a `project.dataset.table` identifier.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidTableId`] when the value does not
    /// have exactly three non-empty, identifier-safe components.
    pub fn parse(value: &str) -> Result<Self> {
        let parts: Vec<&str> = value.split('.').collect();
        let [project, dataset, table] = parts.as_slice() else {
            return Err(StoreError::invalid_table_id(
                value,
                "expected exactly three dot-separated components",
            ));
        };

        for part in [project, dataset, table] {
            if part.is_empty() {
                return Err(StoreError::invalid_table_id(value, "empty component"));
            }
            if !part
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-'))
            {
                return Err(StoreError::invalid_table_id(
                    value,
                    "components may only contain ASCII letters, digits, '_' and '-'",
                ));
            }
        }

        Ok(Self {
            project: (*project).to_string(),
            dataset: (*dataset).to_string(),
            table: (*table).to_string(),
        })
    }

    /// The project component.
    #[must_use]
    pub fn project(&self) -> &str {
        &self.project
    }

    /// Physical SQLite table name for this logical identifier.
    ///
    /// The project component scopes the database file, so the physical
    /// name only combines dataset and table.
    #[must_use]
    pub fn physical_name(&self) -> String {
        format!("{}__{}", self.dataset, self.table)
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.project, self.dataset, self.table)
    }
}

/// Whether an upsert inserted a fresh row or updated an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertAction {
    /// No row existed for the locator; a new row was inserted.
    Inserted,
    /// Rows existed for the locator; non-key fields were overwritten.
    Updated,
}

/// Confirmation returned by a successful upsert, for observability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertReceipt {
    /// The record's identity key.
    pub locator: String,
    /// The classification that was persisted.
    pub classification: EnergyClass,
    /// What the check-then-write resolved to.
    pub action: UpsertAction,
}

/// Errors that can occur during record store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The table identifier is not a valid `project.dataset.table`.
    #[error("invalid table id '{value}': {reason}")]
    InvalidTableId {
        /// The offending identifier.
        value: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// A query or write against the store failed.
    #[error("record store error: {message}")]
    Database {
        /// Human-readable database error text.
        message: String,
    },

    /// A stored row carried a label outside the closed classification set.
    #[error("row for {locator} holds unknown classification '{label}'")]
    UnknownClassification {
        /// The row's locator.
        locator: String,
        /// The unexpected label.
        label: String,
    },
}

impl StoreError {
    fn invalid_table_id(value: &str, reason: &'static str) -> Self {
        Self::InvalidTableId {
            value: value.to_string(),
            reason,
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(error: sqlx::Error) -> Self {
        Self::Database {
            message: error.to_string(),
        }
    }
}

/// Result type for record store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Record store manager for one logical table.
///
/// Wraps the shared [`Database`] pool and the validated [`TableId`].
#[derive(Debug, Clone)]
pub struct RecordStore {
    db: Database,
    table: TableId,
    physical: String,
}

impl RecordStore {
    /// Creates a store over the given database and table identifier.
    #[must_use]
    pub fn new(db: Database, table: TableId) -> Self {
        let physical = table.physical_name();
        Self {
            db,
            table,
            physical,
        }
    }

    /// The logical table identifier this store writes to.
    #[must_use]
    pub fn table_id(&self) -> &TableId {
        &self.table
    }

    /// Reports whether the physical table exists.
    ///
    /// "Not found" is an ordinary `Ok(false)`; any query failure
    /// propagates instead of being swallowed as not-exists.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the catalog query fails.
    #[instrument(skip(self), fields(table = %self.table))]
    pub async fn exists(&self) -> Result<bool> {
        let found: Option<String> =
            sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?")
                .bind(&self.physical)
                .fetch_optional(self.db.pool())
                .await?;
        Ok(found.is_some())
    }

    /// Creates the record table if it does not exist. Idempotent, safe
    /// to call before every upsert.
    ///
    /// The schema is the fixed five-field record set, all NOT NULL.
    /// `gcp_url` deliberately carries no unique constraint: dedup is
    /// the upsert's check-then-write, and its concurrent-writer race
    /// is accepted (a hardened deployment would add the constraint and
    /// a conditional write).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the existence query or the
    /// create fails.
    #[instrument(skip(self), fields(table = %self.table))]
    pub async fn ensure_schema(&self) -> Result<()> {
        if self.exists().await? {
            return Ok(());
        }

        let ddl = format!(
            r#"CREATE TABLE IF NOT EXISTS "{}" (
                gcp_url        TEXT    NOT NULL,
                file_name      TEXT    NOT NULL,
                duration_ms    INTEGER NOT NULL,
                loudness       REAL    NOT NULL,
                classification TEXT    NOT NULL
            )"#,
            self.physical
        );
        sqlx::query(&ddl).execute(self.db.pool()).await?;
        info!(table = %self.table, "record table created");
        Ok(())
    }

    /// Inserts or updates the record, keyed by its locator.
    ///
    /// Queries the row count for the locator first; zero rows means a
    /// full insert, otherwise every non-key field of the matching rows
    /// is overwritten. Calling twice with the same locator always
    /// leaves exactly one logical record carrying the last write's
    /// values.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the count query or the
    /// write fails.
    #[instrument(skip(self, record), fields(table = %self.table, locator = %record.locator))]
    pub async fn upsert(&self, record: &AudioRecord) -> Result<UpsertReceipt> {
        let count: i64 = sqlx::query_scalar(&format!(
            r#"SELECT COUNT(*) FROM "{}" WHERE gcp_url = ?"#,
            self.physical
        ))
        .bind(&record.locator)
        .fetch_one(self.db.pool())
        .await?;

        let duration_ms = i64::try_from(record.duration_ms).unwrap_or(i64::MAX);
        let loudness = storable_loudness(record.loudness_db);

        let action = if count == 0 {
            sqlx::query(&format!(
                r#"INSERT INTO "{}" (gcp_url, file_name, duration_ms, loudness, classification)
                   VALUES (?, ?, ?, ?, ?)"#,
                self.physical
            ))
            .bind(&record.locator)
            .bind(&record.display_name)
            .bind(duration_ms)
            .bind(loudness)
            .bind(record.classification.as_str())
            .execute(self.db.pool())
            .await?;
            UpsertAction::Inserted
        } else {
            sqlx::query(&format!(
                r#"UPDATE "{}" SET
                       file_name = ?,
                       duration_ms = ?,
                       loudness = ?,
                       classification = ?
                   WHERE gcp_url = ?"#,
                self.physical
            ))
            .bind(&record.display_name)
            .bind(duration_ms)
            .bind(loudness)
            .bind(record.classification.as_str())
            .bind(&record.locator)
            .execute(self.db.pool())
            .await?;
            UpsertAction::Updated
        };

        debug!(?action, "record persisted");
        Ok(UpsertReceipt {
            locator: record.locator.clone(),
            classification: record.classification,
            action,
        })
    }

    /// Looks up the record stored for a locator, if any.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails, or
    /// [`StoreError::UnknownClassification`] if the stored label is
    /// outside the closed set.
    #[instrument(skip(self), fields(table = %self.table, locator = %locator))]
    pub async fn find_by_locator(&self, locator: &str) -> Result<Option<AudioRecord>> {
        let row: Option<(String, String, i64, f64, String)> = sqlx::query_as(&format!(
            r#"SELECT gcp_url, file_name, duration_ms, loudness, classification
               FROM "{}" WHERE gcp_url = ?"#,
            self.physical
        ))
        .bind(locator)
        .fetch_optional(self.db.pool())
        .await?;

        let Some((gcp_url, file_name, duration_ms, loudness, label)) = row else {
            return Ok(None);
        };

        let classification = EnergyClass::from_str_opt(&label).ok_or_else(|| {
            StoreError::UnknownClassification {
                locator: gcp_url.clone(),
                label,
            }
        })?;

        Ok(Some(AudioRecord {
            locator: gcp_url,
            display_name: file_name,
            duration_ms: u64::try_from(duration_ms).unwrap_or(0),
            loudness_db: loudness,
            classification,
        }))
    }

    /// Number of rows stored for a locator.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    #[instrument(skip(self), fields(table = %self.table, locator = %locator))]
    pub async fn count_for_locator(&self, locator: &str) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(&format!(
            r#"SELECT COUNT(*) FROM "{}" WHERE gcp_url = ?"#,
            self.physical
        ))
        .bind(locator)
        .fetch_one(self.db.pool())
        .await?;
        Ok(count)
    }
}

/// Maps a loudness value to what the NOT NULL REAL column can hold.
fn storable_loudness(loudness_db: f64) -> f64 {
    if loudness_db.is_nan() {
        SILENCE_FLOOR_DB
    } else {
        loudness_db
    }
}
