//! Streaming extraction from the QuiteRSS source in bounded batches.

use futures::TryStreamExt;
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, SqliteConnection};

use crate::error::{MigrationError, Result};

// ============================================================================
// Row Types
// ============================================================================

/// A row type the extractor can decode from a source cursor.
pub trait SourceRow: for<'r> FromRow<'r, SqliteRow> + Send + Unpin + 'static {
    /// Plural noun used in progress logs.
    const KIND: &'static str;
}

/// One row of the feeds template, exactly as stored.
///
/// Column names follow the QuiteRSS schema; every field is nullable.
#[derive(Debug, Clone, Default, PartialEq, FromRow)]
pub struct RawFeedRow {
    #[sqlx(rename = "rowToParent")]
    pub row_to_parent: Option<i64>,
    #[sqlx(rename = "parentId")]
    pub parent_id: Option<i64>,
    pub id: Option<i64>,
    pub text: Option<String>,
    pub description: Option<String>,
    pub created: Option<String>,
    #[sqlx(rename = "xmlUrl")]
    pub xml_url: Option<String>,
    pub image: Option<Vec<u8>>,
    #[sqlx(rename = "disableUpdate")]
    pub disable_update: Option<i64>,
    #[sqlx(rename = "layoutDirection")]
    pub layout_direction: Option<i64>,
    #[sqlx(rename = "addSingleNewsAnyDateOn")]
    pub add_single_news_any_date_on: Option<i64>,
}

impl SourceRow for RawFeedRow {
    const KIND: &'static str = "feeds";
}

/// One row of the articles template, exactly as stored.
#[derive(Debug, Clone, Default, PartialEq, FromRow)]
pub struct RawArticleRow {
    pub author_name: Option<String>,
    pub description: Option<String>,
    pub guid: Option<String>,
    pub received: Option<String>,
    #[sqlx(rename = "feedId")]
    pub feed_id: Option<i64>,
    pub id: Option<i64>,
    pub deleted: Option<i64>,
    pub starred: Option<i64>,
    pub read: Option<i64>,
    pub title: Option<String>,
    pub link_href: Option<String>,
}

impl SourceRow for RawArticleRow {
    const KIND: &'static str = "articles";
}

// ============================================================================
// Batch Handler
// ============================================================================

/// Receives each full batch the extractor produces.
///
/// An error returned from `handle` stops the stream and is propagated
/// unchanged to the caller of [`BatchExtractor::stream_in_batches`].
#[allow(async_fn_in_trait)]
pub trait BatchHandler<T> {
    async fn handle(&mut self, batch: Vec<T>) -> Result<()>;
}

// ============================================================================
// Extractor
// ============================================================================

/// Reads source rows through a forward-only cursor and hands them over in
/// batches, so memory stays bounded by one batch whatever the table size.
pub struct BatchExtractor<'c> {
    source: &'c mut SqliteConnection,
}

impl<'c> BatchExtractor<'c> {
    pub fn new(source: &'c mut SqliteConnection) -> Self {
        Self { source }
    }

    /// Run `query` and deliver its rows to `handler` in batches of `batch_size`.
    ///
    /// Every batch but the last holds exactly `batch_size` rows; the last holds
    /// the remainder. An empty result never calls the handler. A `batch_size`
    /// of 0 is treated as 1. Returns the number of rows delivered.
    ///
    /// # Errors
    ///
    /// `MigrationError::Extraction` if the query fails or a row cannot be
    /// decoded; any error from `handler` as returned.
    pub async fn stream_in_batches<T, H>(
        &mut self,
        query: &str,
        batch_size: usize,
        handler: &mut H,
    ) -> Result<u64>
    where
        T: SourceRow,
        H: BatchHandler<T>,
    {
        let batch_size = batch_size.max(1);
        let mut rows = sqlx::query_as::<_, T>(query).fetch(&mut *self.source);
        let mut batch = Vec::with_capacity(batch_size);
        let mut delivered: u64 = 0;
        let mut batches: u64 = 0;

        while let Some(row) = rows.try_next().await.map_err(MigrationError::Extraction)? {
            batch.push(row);
            if batch.len() == batch_size {
                let full = std::mem::replace(&mut batch, Vec::with_capacity(batch_size));
                delivered += full.len() as u64;
                batches += 1;
                handler.handle(full).await?;
                tracing::info!(kind = T::KIND, rows = delivered, batches, "Processed batch");
            }
        }

        if !batch.is_empty() {
            delivered += batch.len() as u64;
            batches += 1;
            handler.handle(batch).await?;
        }

        tracing::info!(kind = T::KIND, rows = delivered, batches, "Extraction complete");
        Ok(delivered)
    }
}
