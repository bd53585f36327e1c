//! Audioloader Core Library
//!
//! This library implements a batch ingestion pipeline for audio files:
//! it discovers downloadable audio links on a web page, retrieves each
//! file, computes duration and loudness, classifies the file into an
//! energy category, uploads the binary to an object store, and records
//! a deduplicated row in a metadata table keyed by the artifact locator.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`db`] - Database connection management for the record store
//! - [`discover`] - Audio link discovery on HTML pages
//! - [`transfer`] - Raw byte acquisition of discovered resources
//! - [`metrics`] - Duration/loudness extraction from local artifacts
//! - [`classify`] - Energy classification from the extracted metrics
//! - [`store`] - Artifact (object storage) and record (table) adapters
//! - [`pipeline`] - The per-item orchestrator driving the full sequence

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod classify;
pub mod db;
pub mod discover;
pub mod metrics;
pub mod pipeline;
pub mod store;
pub mod transfer;

// Re-export commonly used types
pub use classify::{EnergyClass, classify};
pub use db::Database;
pub use discover::{DiscoveryError, discover_audio_links};
pub use metrics::{AudioMetrics, DecodeError, extract_metrics};
pub use pipeline::{ItemFailure, Pipeline, RunStats, Stage};
pub use store::artifact::{ArtifactStore, ObjectStoreConfig, StorageError};
pub use store::records::{
    AudioRecord, RecordStore, StoreError, TableId, UpsertAction, UpsertReceipt,
};
pub use transfer::{TransferClient, TransferError, temp_file_name};
