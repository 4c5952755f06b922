//! Transactional writes of normalized batches into the RSS Guard destination.
//!
//! One batch is one transaction. Inside it, rows are written in sub-chunks
//! of `chunk_size` statements; a sub-chunk is only a progress boundary and
//! never commits on its own. Any failure rolls the whole batch back.

use sqlx::{Connection, Sqlite, SqliteConnection, Transaction};

use super::templates::QueryTemplates;
use super::transform::{SourceArticle, SourceFeed};
use crate::error::{MigrationError, Result};
use crate::storage::LOCAL_ACCOUNT_ID;

// Destination defaults for migrated feeds
const UPDATE_TYPE_DEFAULT_INTERVAL: i64 = 1;
const UPDATE_INTERVAL_SECS: i64 = 900;
const KEEP_UNREAD_ARTICLES: i64 = 1;
const KEEP_STARRED_ARTICLES: i64 = 1;
const RECYCLE_ARTICLES: i64 = 1;

/// Rows written by one feed/category batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedLoadCounts {
    pub categories: u64,
    pub feeds: u64,
}

impl std::ops::AddAssign for FeedLoadCounts {
    fn add_assign(&mut self, other: Self) {
        self.categories += other.categories;
        self.feeds += other.feeds;
    }
}

/// Writes batches through the destination session.
pub struct Loader<'c> {
    destination: &'c mut SqliteConnection,
    templates: &'c QueryTemplates,
    chunk_size: usize,
    root_sentinel: Option<i64>,
}

impl<'c> Loader<'c> {
    /// `chunk_size` of 0 is treated as 1. `root_sentinel` is the source id whose
    /// category and direct children are moved to the top level.
    pub fn new(
        destination: &'c mut SqliteConnection,
        templates: &'c QueryTemplates,
        chunk_size: usize,
        root_sentinel: Option<i64>,
    ) -> Self {
        Self {
            destination,
            templates,
            chunk_size: chunk_size.max(1),
            root_sentinel,
        }
    }

    /// Write a mixed feed/category batch.
    ///
    /// Categories go first through the category statement, then feeds
    /// through the feed statement, both in the same transaction.
    ///
    /// # Errors
    ///
    /// `MigrationError::Load` after rolling back; nothing from the batch persists.
    pub async fn load_feeds(&mut self, batch: &[SourceFeed]) -> Result<FeedLoadCounts> {
        let (templates, chunk_size, sentinel) = (self.templates, self.chunk_size, self.root_sentinel);
        let mut tx = self.destination.begin().await.map_err(MigrationError::Load)?;

        let written = async {
            let categories =
                insert_categories(&mut tx, &templates.insert_categories, batch, chunk_size, sentinel)
                    .await?;
            let feeds =
                insert_feeds(&mut tx, &templates.insert_feeds, batch, chunk_size, sentinel).await?;
            Ok::<_, sqlx::Error>(FeedLoadCounts { categories, feeds })
        }
        .await;

        finish(tx, written).await
    }

    /// Write an article batch in one transaction.
    ///
    /// # Errors
    ///
    /// `MigrationError::Load` after rolling back; nothing from the batch persists.
    pub async fn load_articles(&mut self, batch: &[SourceArticle]) -> Result<u64> {
        let (templates, chunk_size) = (self.templates, self.chunk_size);
        let mut tx = self.destination.begin().await.map_err(MigrationError::Load)?;
        let written = insert_messages(&mut tx, &templates.insert_messages, batch, chunk_size).await;
        finish(tx, written).await
    }
}

async fn finish<T>(
    tx: Transaction<'_, Sqlite>,
    written: std::result::Result<T, sqlx::Error>,
) -> Result<T> {
    match written {
        Ok(value) => {
            tx.commit().await.map_err(MigrationError::Load)?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback) = tx.rollback().await {
                tracing::warn!(error = %rollback, "Rollback after failed batch also failed");
            }
            Err(MigrationError::Load(e))
        }
    }
}

// ============================================================================
// Insert Passes
// ============================================================================

async fn insert_categories(
    conn: &mut SqliteConnection,
    sql: &str,
    batch: &[SourceFeed],
    chunk_size: usize,
    root_sentinel: Option<i64>,
) -> std::result::Result<u64, sqlx::Error> {
    let categories: Vec<&SourceFeed> = batch.iter().filter(|node| node.is_category()).collect();
    let mut written = 0u64;

    for chunk in categories.chunks(chunk_size) {
        for category in chunk {
            sqlx::query(sql)
                .bind(category.order)
                .bind(category.destination_parent(root_sentinel))
                .bind(category.id)
                .bind(&category.title)
                .bind(category.created)
                .bind(LOCAL_ACCOUNT_ID)
                .bind("")
                .execute(&mut *conn)
                .await?;
        }
        written += chunk.len() as u64;
        tracing::debug!(rows = written, "Category chunk written");
    }
    Ok(written)
}

async fn insert_feeds(
    conn: &mut SqliteConnection,
    sql: &str,
    batch: &[SourceFeed],
    chunk_size: usize,
    root_sentinel: Option<i64>,
) -> std::result::Result<u64, sqlx::Error> {
    let feeds: Vec<&SourceFeed> = batch.iter().filter(|node| !node.is_category()).collect();
    let mut written = 0u64;

    for chunk in feeds.chunks(chunk_size) {
        for feed in chunk {
            sqlx::query(sql)
                .bind(feed.id)
                .bind(feed.order)
                .bind(&feed.title)
                .bind(&feed.description)
                .bind(feed.created)
                .bind(&feed.icon)
                .bind(feed.destination_parent(root_sentinel))
                .bind(&feed.feed_url)
                .bind(UPDATE_TYPE_DEFAULT_INTERVAL)
                .bind(UPDATE_INTERVAL_SECS)
                .bind(feed.disable_update)
                .bind(0i64) // is_quiet
                .bind(feed.layout_direction)
                .bind(feed.add_single_news_any_date_on)
                .bind(0i64) // datetime_to_avoid
                .bind(0i64) // keep_article_customize
                .bind(0i64) // keep_article_count
                .bind(KEEP_UNREAD_ARTICLES)
                .bind(KEEP_STARRED_ARTICLES)
                .bind(RECYCLE_ARTICLES)
                .bind(0i64) // open_articles
                .bind(LOCAL_ACCOUNT_ID)
                .bind(feed.id.to_string())
                .bind("")
                .execute(&mut *conn)
                .await?;
        }
        written += chunk.len() as u64;
        tracing::debug!(rows = written, "Feed chunk written");
    }
    Ok(written)
}

async fn insert_messages(
    conn: &mut SqliteConnection,
    sql: &str,
    batch: &[SourceArticle],
    chunk_size: usize,
) -> std::result::Result<u64, sqlx::Error> {
    let mut written = 0u64;

    for chunk in batch.chunks(chunk_size) {
        for article in chunk {
            sqlx::query(sql)
                .bind(&article.author)
                .bind(&article.description)
                .bind(&article.guid)
                .bind(article.received)
                .bind(article.feed_id)
                .bind(article.id)
                .bind(article.deleted)
                .bind(0i64) // is_pdeleted
                .bind(article.starred)
                .bind(article.read)
                .bind(&article.title)
                .bind(&article.link)
                .bind(LOCAL_ACCOUNT_ID)
                .execute(&mut *conn)
                .await?;
        }
        written += chunk.len() as u64;
        tracing::debug!(rows = written, "Message chunk written");
    }
    Ok(written)
}
