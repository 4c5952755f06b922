//! QuiteRSS to RSS Guard database migration.
//!
//! The [`migrate::Migrator`] streams categories, feeds and articles out of a
//! QuiteRSS SQLite file in bounded batches, normalizes them, and writes each
//! batch into an RSS Guard database in its own transaction. The destination is
//! tuned for bulk loading while the run lasts and its original engine settings
//! are restored afterwards.

pub mod config;
pub mod error;
pub mod migrate;
pub mod preflight;
pub mod storage;
pub mod util;

pub use error::{MigrationError, Result, TimestampFormatError};
