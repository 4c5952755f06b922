//! Error types for the migration engine.

use std::path::PathBuf;
use thiserror::Error;

use crate::migrate::MigrationPhase;

// ============================================================================
// Error Types
// ============================================================================

/// A timestamp column held something other than an ISO-8601 date-time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unrecognized timestamp format: '{value}'")]
pub struct TimestampFormatError {
    pub value: String,
}

/// Main error type for migration operations.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// A store could not be opened
    #[error("Failed to open {role} database '{path}': {source}")]
    Connect {
        role: &'static str,
        path: PathBuf,
        #[source]
        source: sqlx::Error,
    },

    /// The source cursor could not be opened or a row could not be decoded
    #[error("Extraction failed: {0}")]
    Extraction(#[source] sqlx::Error),

    /// A source timestamp could not be normalized
    #[error(transparent)]
    TimestampFormat(#[from] TimestampFormatError),

    /// A batch could not be written; the batch was rolled back
    #[error("Load failed, batch rolled back: {0}")]
    Load(#[source] sqlx::Error),

    /// Destination schema creation failed
    #[error("Destination schema creation failed: {0}")]
    Schema(#[source] sqlx::Error),

    /// Final row counts could not be read
    #[error("Validation failed: {0}")]
    Validation(#[source] sqlx::Error),

    /// A statement template override could not be read
    #[error("Failed to read statement template '{path}': {source}")]
    Template {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The run stopped in the given phase
    #[error("Migration failed during {phase}")]
    Failed {
        phase: MigrationPhase,
        #[source]
        source: Box<MigrationError>,
    },
}

impl MigrationError {
    /// Wrap an error with the phase it aborted.
    pub fn failed(phase: MigrationPhase, source: MigrationError) -> Self {
        MigrationError::Failed {
            phase,
            source: Box::new(source),
        }
    }

    /// The innermost migration error, skipping phase wrappers.
    pub fn root(&self) -> &MigrationError {
        match self {
            MigrationError::Failed { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrationError>;
