//! Path checks run before any store is opened.
//!
//! Nothing here touches SQLite. A failed check leaves no files behind.

use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PreflightError {
    #[error("Cannot read QuiteRSS database at {}: {source}", path.display())]
    SourceUnreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("QuiteRSS database path is not a file: {}", .0.display())]
    SourceNotAFile(PathBuf),

    #[error("Cannot write to RSS Guard directory at {}: {source}", dir.display())]
    DestinationNotWritable {
        dir: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("RSS Guard database path is a directory: {}", .0.display())]
    DestinationIsDirectory(PathBuf),

    #[error("Source and destination are the same file: {}", .0.display())]
    SameFile(PathBuf),
}

/// Check that `source` is a readable file and that the directory holding
/// `destination` accepts new files.
///
/// A bare file name for `destination` is checked against the current directory.
pub fn check_paths(source: &Path, destination: &Path) -> Result<(), PreflightError> {
    let unreadable = |source_err: io::Error| PreflightError::SourceUnreadable {
        path: source.to_path_buf(),
        source: source_err,
    };

    let meta = fs::metadata(source).map_err(unreadable)?;
    if !meta.is_file() {
        return Err(PreflightError::SourceNotAFile(source.to_path_buf()));
    }
    fs::File::open(source).map_err(unreadable)?;

    if destination.is_dir() {
        return Err(PreflightError::DestinationIsDirectory(
            destination.to_path_buf(),
        ));
    }

    let dir = destination_dir(destination);
    probe_writable(dir).map_err(|source| PreflightError::DestinationNotWritable {
        dir: dir.to_path_buf(),
        source,
    })?;

    if destination.exists() {
        if let (Ok(a), Ok(b)) = (source.canonicalize(), destination.canonicalize()) {
            if a == b {
                return Err(PreflightError::SameFile(a));
            }
        }
    }

    tracing::debug!(
        source = %source.display(),
        destination = %destination.display(),
        "Pre-flight checks passed"
    );
    Ok(())
}

fn destination_dir(destination: &Path) -> &Path {
    match destination.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

fn probe_writable(dir: &Path) -> io::Result<()> {
    let probe = dir.join(format!(".rss-migrate-probe-{}", std::process::id()));
    OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&probe)?;
    fs::remove_file(&probe)
}
