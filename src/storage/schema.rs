use sqlx::{Connection, SqliteConnection};

use crate::error::{MigrationError, Result};

// ============================================================================
// Destination Schema
// ============================================================================

/// Account id every migrated row is attached to.
pub const LOCAL_ACCOUNT_ID: i64 = 1;

/// RSS Guard tables the bundled insert templates write to.
///
/// Hierarchy parent columns use -1 for "top level" and carry no foreign key;
/// only the account reference is enforced.
const DESTINATION_SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS Accounts (
        id INTEGER PRIMARY KEY,
        ordr INTEGER NOT NULL CHECK (ordr >= 0),
        type TEXT NOT NULL CHECK (type != '')
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS Categories (
        id INTEGER PRIMARY KEY,
        parent_id INTEGER NOT NULL CHECK (parent_id >= -1),
        ordr INTEGER NOT NULL,
        title TEXT NOT NULL,
        description TEXT,
        date_created INTEGER,
        icon BLOB,
        account_id INTEGER NOT NULL,
        custom_id TEXT,
        FOREIGN KEY (account_id) REFERENCES Accounts (id) ON DELETE CASCADE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS Feeds (
        id INTEGER PRIMARY KEY,
        ordr INTEGER NOT NULL,
        title TEXT NOT NULL,
        description TEXT,
        date_created INTEGER,
        icon BLOB,
        category INTEGER NOT NULL CHECK (category >= -1),
        source TEXT,
        update_type INTEGER NOT NULL,
        update_interval INTEGER NOT NULL DEFAULT 900,
        is_off INTEGER NOT NULL DEFAULT 0,
        is_quiet INTEGER NOT NULL DEFAULT 0,
        is_rtl INTEGER NOT NULL DEFAULT 0,
        add_any_datetime_articles INTEGER NOT NULL DEFAULT 0,
        datetime_to_avoid INTEGER NOT NULL DEFAULT 0,
        keep_article_customize INTEGER NOT NULL DEFAULT 0,
        keep_article_count INTEGER NOT NULL DEFAULT 0,
        keep_unread_articles INTEGER NOT NULL DEFAULT 1,
        keep_starred_articles INTEGER NOT NULL DEFAULT 1,
        recycle_articles INTEGER NOT NULL DEFAULT 0,
        open_articles INTEGER NOT NULL DEFAULT 0,
        account_id INTEGER NOT NULL,
        custom_id TEXT,
        http_headers TEXT,
        FOREIGN KEY (account_id) REFERENCES Accounts (id) ON DELETE CASCADE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS Messages (
        id INTEGER PRIMARY KEY,
        is_read INTEGER NOT NULL DEFAULT 0 CHECK (is_read IN (0, 1)),
        is_important INTEGER NOT NULL DEFAULT 0,
        is_deleted INTEGER NOT NULL DEFAULT 0,
        is_pdeleted INTEGER NOT NULL DEFAULT 0,
        feed INTEGER NOT NULL,
        title TEXT NOT NULL,
        url TEXT,
        author TEXT,
        date_created INTEGER NOT NULL,
        contents TEXT,
        enclosures TEXT,
        score REAL NOT NULL DEFAULT 0,
        account_id INTEGER NOT NULL,
        custom_id TEXT,
        custom_hash TEXT,
        FOREIGN KEY (account_id) REFERENCES Accounts (id) ON DELETE CASCADE
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_messages_feed ON Messages(feed)",
    "CREATE INDEX IF NOT EXISTS idx_messages_feed_read ON Messages(feed, is_read)",
];

/// Create the destination tables and the local account if they are missing.
///
/// All statements run in one transaction, and every statement is idempotent,
/// so running this against an already-initialized destination is a no-op.
pub async fn ensure_destination_schema(conn: &mut SqliteConnection) -> Result<()> {
    let mut tx = conn.begin().await.map_err(MigrationError::Schema)?;

    for statement in DESTINATION_SCHEMA {
        sqlx::query(statement)
            .execute(&mut *tx)
            .await
            .map_err(MigrationError::Schema)?;
    }

    sqlx::query("INSERT OR IGNORE INTO Accounts (id, ordr, type) VALUES (?, 0, 'std-rss')")
        .bind(LOCAL_ACCOUNT_ID)
        .execute(&mut *tx)
        .await
        .map_err(MigrationError::Schema)?;

    tx.commit().await.map_err(MigrationError::Schema)?;
    tracing::info!("Destination schema ready");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_conn() -> SqliteConnection {
        SqliteConnection::connect("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn test_creates_tables_and_account() {
        let mut conn = memory_conn().await;
        ensure_destination_schema(&mut conn).await.unwrap();

        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name",
        )
        .fetch_all(&mut conn)
        .await
        .unwrap();
        assert_eq!(tables, ["Accounts", "Categories", "Feeds", "Messages"]);

        let accounts: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM accounts WHERE id = 1")
            .fetch_one(&mut conn)
            .await
            .unwrap();
        assert_eq!(accounts, 1);
    }

    #[tokio::test]
    async fn test_is_idempotent() {
        let mut conn = memory_conn().await;
        ensure_destination_schema(&mut conn).await.unwrap();
        ensure_destination_schema(&mut conn).await.unwrap();

        let accounts: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM Accounts")
            .fetch_one(&mut conn)
            .await
            .unwrap();
        assert_eq!(accounts, 1);
    }

    #[tokio::test]
    async fn test_unknown_account_rejected() {
        let mut conn = memory_conn().await;
        ensure_destination_schema(&mut conn).await.unwrap();

        let result = sqlx::query(
            "INSERT INTO Categories (id, parent_id, ordr, title, account_id) VALUES (1, -1, 0, 'x', 99)",
        )
        .execute(&mut conn)
        .await;
        assert!(result.is_err(), "foreign key on account_id should be enforced");
    }
}
