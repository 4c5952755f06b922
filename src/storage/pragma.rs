use serde::Serialize;
use sqlx::SqliteConnection;

// ============================================================================
// Pragma Snapshot
// ============================================================================

/// Engine settings of a SQLite database captured before migration tuning.
///
/// Fields are listed in capture order; [`PragmaSnapshot::restore`] applies them
/// back in the same order. Integer-valued pragmas keep SQLite's numeric codes
/// (`synchronous` 2 = FULL, `temp_store` 2 = MEMORY, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PragmaSnapshot {
    pub synchronous: i64,
    pub journal_mode: String,
    pub cache_size: i64,
    pub page_size: i64,
    pub temp_store: i64,
    pub locking_mode: String,
    pub mmap_size: i64,
    pub auto_vacuum: i64,
}

/// Conservative values used for any setting that cannot be read.
impl Default for PragmaSnapshot {
    fn default() -> Self {
        Self {
            synchronous: 2, // FULL
            journal_mode: "delete".to_string(),
            cache_size: -2000,
            page_size: 1024,
            temp_store: 0, // DEFAULT
            locking_mode: "normal".to_string(),
            mmap_size: 0,
            auto_vacuum: 1,
        }
    }
}

impl PragmaSnapshot {
    /// Read the current settings of `conn`.
    ///
    /// Every pragma is read on its own; a failed read keeps the conservative
    /// default for that setting and logs a warning instead of failing.
    pub async fn capture(conn: &mut SqliteConnection) -> Self {
        let defaults = Self::default();
        Self {
            synchronous: read_int(conn, "synchronous", defaults.synchronous).await,
            journal_mode: read_text(conn, "journal_mode", defaults.journal_mode).await,
            cache_size: read_int(conn, "cache_size", defaults.cache_size).await,
            page_size: read_int(conn, "page_size", defaults.page_size).await,
            temp_store: read_int(conn, "temp_store", defaults.temp_store).await,
            locking_mode: read_text(conn, "locking_mode", defaults.locking_mode).await,
            mmap_size: read_int(conn, "mmap_size", defaults.mmap_size).await,
            auto_vacuum: read_int(conn, "auto_vacuum", defaults.auto_vacuum).await,
        }
    }

    /// True when the captured journal mode is write-ahead logging.
    pub fn is_wal(&self) -> bool {
        self.journal_mode.eq_ignore_ascii_case("wal")
    }

    /// `PRAGMA` assignments reproducing this snapshot, in capture order.
    ///
    /// Text values that are not plain keywords are skipped with a warning, as
    /// they are spliced into the statement.
    pub fn restore_statements(&self) -> Vec<String> {
        let mut statements = vec![format!("PRAGMA synchronous = {}", self.synchronous)];
        push_keyword(&mut statements, "journal_mode", &self.journal_mode);
        statements.push(format!("PRAGMA cache_size = {}", self.cache_size));
        statements.push(format!("PRAGMA page_size = {}", self.page_size));
        statements.push(format!("PRAGMA temp_store = {}", self.temp_store));
        push_keyword(&mut statements, "locking_mode", &self.locking_mode);
        statements.push(format!("PRAGMA mmap_size = {}", self.mmap_size));
        statements.push(format!("PRAGMA auto_vacuum = {}", self.auto_vacuum));

        if self.is_wal() {
            // Left over from the journal-less load phase otherwise
            statements.push("PRAGMA wal_checkpoint(TRUNCATE)".to_string());
            statements.push("PRAGMA journal_size_limit = -1".to_string());
        }
        statements
    }

    /// Apply this snapshot to `conn`.
    ///
    /// Failures are logged per statement and never returned. Returns the
    /// number of statements that failed.
    pub async fn restore(&self, conn: &mut SqliteConnection) -> usize {
        let mut failures = 0;
        for statement in self.restore_statements() {
            match sqlx::query(&statement).execute(&mut *conn).await {
                Ok(_) => tracing::debug!(%statement, "Restored pragma"),
                Err(e) => {
                    failures += 1;
                    tracing::warn!(%statement, error = %e, "Failed to restore pragma");
                }
            }
        }
        failures
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn push_keyword(statements: &mut Vec<String>, pragma: &str, value: &str) {
    if !value.is_empty() && value.chars().all(|c| c.is_ascii_alphabetic()) {
        statements.push(format!("PRAGMA {pragma} = {value}"));
    } else {
        tracing::warn!(pragma, value, "Skipping restore of non-keyword pragma value");
    }
}

async fn read_int(conn: &mut SqliteConnection, pragma: &str, default: i64) -> i64 {
    let sql = format!("PRAGMA {pragma}");
    match sqlx::query_scalar::<_, i64>(&sql)
        .fetch_optional(&mut *conn)
        .await
    {
        Ok(Some(value)) => value,
        Ok(None) => {
            tracing::warn!(pragma, default, "Pragma returned no value, using default");
            default
        }
        Err(e) => {
            tracing::warn!(pragma, default, error = %e, "Could not read pragma, using default");
            default
        }
    }
}

async fn read_text(conn: &mut SqliteConnection, pragma: &str, default: String) -> String {
    let sql = format!("PRAGMA {pragma}");
    match sqlx::query_scalar::<_, String>(&sql)
        .fetch_optional(&mut *conn)
        .await
    {
        Ok(Some(value)) => value.to_ascii_lowercase(),
        Ok(None) => {
            tracing::warn!(pragma, %default, "Pragma returned no value, using default");
            default
        }
        Err(e) => {
            tracing::warn!(pragma, %default, error = %e, "Could not read pragma, using default");
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::Connection;

    async fn memory_conn() -> SqliteConnection {
        SqliteConnection::connect("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn test_capture_reads_memory_database() {
        let mut conn = memory_conn().await;
        let snapshot = PragmaSnapshot::capture(&mut conn).await;

        assert_eq!(snapshot.journal_mode, "memory");
        assert_eq!(snapshot.locking_mode, "normal");
        assert!(snapshot.page_size >= 512);
    }

    #[tokio::test]
    async fn test_restore_applies_per_connection_settings() {
        let mut conn = memory_conn().await;
        let original = PragmaSnapshot::capture(&mut conn).await;

        sqlx::query("PRAGMA cache_size = 12345")
            .execute(&mut conn)
            .await
            .unwrap();
        sqlx::query("PRAGMA temp_store = MEMORY")
            .execute(&mut conn)
            .await
            .unwrap();
        sqlx::query("PRAGMA synchronous = OFF")
            .execute(&mut conn)
            .await
            .unwrap();

        let failures = original.restore(&mut conn).await;
        assert_eq!(failures, 0);

        let restored = PragmaSnapshot::capture(&mut conn).await;
        assert_eq!(restored, original);
    }

    #[test]
    fn test_restore_statements_follow_capture_order() {
        let statements = PragmaSnapshot::default().restore_statements();
        let names: Vec<&str> = statements
            .iter()
            .map(|s| s.trim_start_matches("PRAGMA ").split(' ').next().unwrap())
            .collect();
        assert_eq!(
            names,
            [
                "synchronous",
                "journal_mode",
                "cache_size",
                "page_size",
                "temp_store",
                "locking_mode",
                "mmap_size",
                "auto_vacuum"
            ]
        );
    }

    #[test]
    fn test_wal_adds_checkpoint_and_clears_limit() {
        let snapshot = PragmaSnapshot {
            journal_mode: "WAL".to_string(),
            ..PragmaSnapshot::default()
        };
        let statements = snapshot.restore_statements();
        assert_eq!(
            &statements[statements.len() - 2..],
            [
                "PRAGMA wal_checkpoint(TRUNCATE)".to_string(),
                "PRAGMA journal_size_limit = -1".to_string()
            ]
        );
    }

    #[test]
    fn test_non_keyword_values_are_skipped() {
        let snapshot = PragmaSnapshot {
            journal_mode: "delete; DROP TABLE Feeds".to_string(),
            ..PragmaSnapshot::default()
        };
        let statements = snapshot.restore_statements();
        assert_eq!(statements.len(), 7);
        assert!(statements.iter().all(|s| !s.contains("DROP")));
    }

    #[test]
    fn test_default_is_conservative() {
        let defaults = PragmaSnapshot::default();
        assert_eq!(defaults.synchronous, 2);
        assert_eq!(defaults.journal_mode, "delete");
        assert!(!defaults.is_wal());
    }
}
