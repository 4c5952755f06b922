use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqliteLockingMode, SqliteSynchronous,
};
use sqlx::{Connection, SqliteConnection};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::pragma::PragmaSnapshot;
use crate::config::SessionTuning;
use crate::error::{MigrationError, Result};

// ============================================================================
// Sessions
// ============================================================================

/// The source and destination connections of one migration run.
///
/// The destination is tuned for load speed with durability switched off
/// (`synchronous = OFF`, `journal_mode = OFF`): a crash mid-run can corrupt it,
/// and any abnormal termination means the destination must be discarded.
///
/// [`Sessions::close`] restores the destination's original settings and then
/// closes both connections. Dropping a `Sessions` without closing still
/// releases both handles, but leaves the tuning in place on that connection.
pub struct Sessions {
    source: SqliteConnection,
    destination: SqliteConnection,
    destination_path: PathBuf,
    snapshot: PragmaSnapshot,
    restored: bool,
}

impl Sessions {
    /// Open both stores for migration.
    ///
    /// The source is opened first, so a missing source leaves no destination
    /// file behind. The destination's current settings are then captured on a
    /// plain connection before the tuned one is opened. The destination file
    /// is created when missing; the source must exist.
    ///
    /// `tuning.page_size` only applies to a destination with no pages yet. An
    /// existing file keeps its page size, which compaction would otherwise
    /// rewrite for good.
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::Connect` naming the store that could not be opened.
    pub async fn open(
        source_path: &Path,
        destination_path: &Path,
        tuning: &SessionTuning,
    ) -> Result<Self> {
        let source = SqliteConnection::connect_with(&source_options(source_path, tuning))
            .await
            .map_err(|source| MigrationError::Connect {
                role: "source",
                path: source_path.to_path_buf(),
                source,
            })?;

        let (snapshot, page_count) = capture_destination_settings(destination_path).await?;
        tracing::info!(
            journal_mode = %snapshot.journal_mode,
            synchronous = snapshot.synchronous,
            page_size = snapshot.page_size,
            page_count,
            "Captured destination settings"
        );

        let fresh = page_count == 0;
        if !fresh && i64::from(tuning.page_size) != snapshot.page_size {
            tracing::info!(
                page_size = snapshot.page_size,
                requested = tuning.page_size,
                "Destination already has data, keeping its page size"
            );
        }

        let destination = SqliteConnection::connect_with(&destination_options(
            destination_path,
            tuning,
            fresh,
        ))
        .await
        .map_err(|source| MigrationError::Connect {
            role: "destination",
            path: destination_path.to_path_buf(),
            source,
        })?;

        tracing::debug!(
            source = %source_path.display(),
            destination = %destination_path.display(),
            "Opened migration sessions"
        );

        Ok(Self {
            source,
            destination,
            destination_path: destination_path.to_path_buf(),
            snapshot,
            restored: false,
        })
    }

    /// Read-only source connection.
    pub fn source(&mut self) -> &mut SqliteConnection {
        &mut self.source
    }

    /// Tuned destination connection.
    pub fn destination(&mut self) -> &mut SqliteConnection {
        &mut self.destination
    }

    /// Both connections at once, for streaming from one into the other.
    pub fn split(&mut self) -> (&mut SqliteConnection, &mut SqliteConnection) {
        (&mut self.source, &mut self.destination)
    }

    /// Destination settings as they were before tuning.
    pub fn snapshot(&self) -> &PragmaSnapshot {
        &self.snapshot
    }

    /// Reapply the captured destination settings.
    ///
    /// Runs at most once per run; later calls (including the one made by
    /// [`Sessions::close`]) are no-ops. Returns the number of settings that
    /// failed to restore, each of which has already been logged.
    pub async fn restore_settings(&mut self) -> usize {
        if self.restored {
            return 0;
        }
        self.restored = true;

        let failures = self.snapshot.restore(&mut self.destination).await;
        if failures == 0 {
            tracing::info!(
                path = %self.destination_path.display(),
                "Restored destination settings"
            );
        } else {
            tracing::warn!(
                path = %self.destination_path.display(),
                failures,
                "Destination settings were only partially restored"
            );
        }
        failures
    }

    /// Restore destination settings, then close both connections.
    ///
    /// Never fails: restore and close errors are logged, and both connections
    /// are closed whatever the restore outcome.
    pub async fn close(mut self) {
        self.restore_settings().await;

        let Sessions {
            source,
            destination,
            ..
        } = self;
        close_quietly("source", source).await;
        close_quietly("destination", destination).await;
    }
}

// ============================================================================
// Connection Options
// ============================================================================

fn source_options(path: &Path, tuning: &SessionTuning) -> SqliteConnectOptions {
    SqliteConnectOptions::new()
        .filename(path)
        .read_only(true)
        .pragma("cache_size", tuning.cache_size.to_string())
        .pragma("temp_store", "MEMORY")
        .busy_timeout(Duration::from_millis(tuning.busy_timeout_ms))
}

fn destination_options(
    path: &Path,
    tuning: &SessionTuning,
    fresh: bool,
) -> SqliteConnectOptions {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .foreign_keys(true)
        .locking_mode(SqliteLockingMode::Exclusive)
        // Load-speed only: a crash while these are in effect can corrupt the file
        .journal_mode(SqliteJournalMode::Off)
        .synchronous(SqliteSynchronous::Off)
        .pragma("cache_size", tuning.cache_size.to_string())
        .pragma("temp_store", "MEMORY")
        .busy_timeout(Duration::from_millis(tuning.busy_timeout_ms));

    if fresh {
        options.page_size(tuning.page_size)
    } else {
        options
    }
}

/// Settings of the destination as found, plus its page count (0 when new).
async fn capture_destination_settings(path: &Path) -> Result<(PragmaSnapshot, i64)> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);
    let mut conn = SqliteConnection::connect_with(&options)
        .await
        .map_err(|source| MigrationError::Connect {
            role: "destination",
            path: path.to_path_buf(),
            source,
        })?;

    let snapshot = PragmaSnapshot::capture(&mut conn).await;
    // Unknown size counts as existing data
    let page_count = match sqlx::query_scalar::<_, i64>("PRAGMA page_count")
        .fetch_one(&mut conn)
        .await
    {
        Ok(pages) => pages,
        Err(e) => {
            tracing::warn!(error = %e, "Could not read destination page count");
            i64::MAX
        }
    };
    close_quietly("destination (settings probe)", conn).await;
    Ok((snapshot, page_count))
}

async fn close_quietly(role: &str, conn: SqliteConnection) {
    if let Err(e) = conn.close().await {
        tracing::warn!(role, error = %e, "Error closing connection");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "rss_migrate_sessions_{name}_{}",
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    async fn create_source(path: &Path) {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let mut conn = SqliteConnection::connect_with(&options).await.unwrap();
        sqlx::query("CREATE TABLE feeds (id INTEGER PRIMARY KEY)")
            .execute(&mut conn)
            .await
            .unwrap();
        conn.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_open_applies_destination_tuning() {
        let dir = temp_dir("tuning");
        let source_path = dir.join("source.db");
        create_source(&source_path).await;

        let mut sessions = Sessions::open(
            &source_path,
            &dir.join("dest.db"),
            &SessionTuning::default(),
        )
        .await
        .unwrap();

        let tuned = PragmaSnapshot::capture(sessions.destination()).await;
        assert_eq!(tuned.journal_mode, "off");
        assert_eq!(tuned.synchronous, 0);
        assert_eq!(tuned.locking_mode, "exclusive");
        assert_eq!(tuned.temp_store, 2);
        assert_eq!(tuned.cache_size, 20000);

        let fk: i64 = sqlx::query_scalar("PRAGMA foreign_keys")
            .fetch_one(sessions.destination())
            .await
            .unwrap();
        assert_eq!(fk, 1);

        sessions.close().await;
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_source_is_read_only() {
        let dir = temp_dir("readonly");
        let source_path = dir.join("source.db");
        create_source(&source_path).await;

        let mut sessions = Sessions::open(
            &source_path,
            &dir.join("dest.db"),
            &SessionTuning::default(),
        )
        .await
        .unwrap();

        let result = sqlx::query("INSERT INTO feeds (id) VALUES (1)")
            .execute(sessions.source())
            .await;
        assert!(result.is_err());

        sessions.close().await;
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_missing_source_is_connect_error() {
        let dir = temp_dir("missing");

        let result = Sessions::open(
            &dir.join("does-not-exist.db"),
            &dir.join("dest.db"),
            &SessionTuning::default(),
        )
        .await;

        match result {
            Err(MigrationError::Connect { role, .. }) => assert_eq!(role, "source"),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("opening a missing source should fail"),
        }
        assert!(!dir.join("dest.db").exists());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_restore_settings_runs_once() {
        let dir = temp_dir("once");
        let source_path = dir.join("source.db");
        create_source(&source_path).await;

        let mut sessions = Sessions::open(
            &source_path,
            &dir.join("dest.db"),
            &SessionTuning::default(),
        )
        .await
        .unwrap();

        assert_eq!(sessions.restore_settings().await, 0);
        let after_restore = PragmaSnapshot::capture(sessions.destination()).await;
        assert_eq!(&after_restore, sessions.snapshot());

        // Re-tune, then a second restore must not touch anything
        sqlx::query("PRAGMA cache_size = 777")
            .execute(sessions.destination())
            .await
            .unwrap();
        assert_eq!(sessions.restore_settings().await, 0);
        let cache: i64 = sqlx::query_scalar("PRAGMA cache_size")
            .fetch_one(sessions.destination())
            .await
            .unwrap();
        assert_eq!(cache, 777);

        sessions.close().await;
        std::fs::remove_dir_all(&dir).ok();
    }

    async fn page_size(sessions: &mut Sessions) -> i64 {
        sqlx::query_scalar("PRAGMA page_size")
            .fetch_one(sessions.destination())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_fresh_destination_gets_tuned_page_size() {
        let dir = temp_dir("fresh_page_size");
        let source_path = dir.join("source.db");
        create_source(&source_path).await;
        let tuning = SessionTuning {
            page_size: 8192,
            ..SessionTuning::default()
        };

        let mut sessions = Sessions::open(&source_path, &dir.join("dest.db"), &tuning)
            .await
            .unwrap();
        assert_eq!(page_size(&mut sessions).await, 8192);

        sessions.close().await;
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_existing_destination_keeps_page_size() {
        let dir = temp_dir("existing_page_size");
        let source_path = dir.join("source.db");
        let dest_path = dir.join("dest.db");
        create_source(&source_path).await;

        let options = SqliteConnectOptions::new()
            .filename(&dest_path)
            .create_if_missing(true)
            .page_size(1024);
        let mut conn = SqliteConnection::connect_with(&options).await.unwrap();
        sqlx::query("CREATE TABLE existing (id INTEGER PRIMARY KEY)")
            .execute(&mut conn)
            .await
            .unwrap();
        conn.close().await.unwrap();

        let mut sessions = Sessions::open(&source_path, &dest_path, &SessionTuning::default())
            .await
            .unwrap();
        assert_eq!(sessions.snapshot().page_size, 1024);

        sqlx::query("VACUUM")
            .execute(sessions.destination())
            .await
            .unwrap();
        assert_eq!(page_size(&mut sessions).await, 1024);

        sessions.close().await;
        std::fs::remove_dir_all(&dir).ok();
    }
}
