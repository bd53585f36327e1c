//! Persistence adapters for the two durable backends.
//!
//! - [`artifact`] uploads the binary payload to object storage and
//!   returns the stable locator that doubles as the record's identity.
//! - [`records`] owns the metadata table: schema creation and the
//!   idempotent, locator-keyed upsert.

pub mod artifact;
pub mod records;
