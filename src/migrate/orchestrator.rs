//! Runs the migration phases in order and assembles the run report.

use serde::Serialize;
use sqlx::SqliteConnection;
use std::fmt;
use std::path::Path;

use super::extract::{BatchExtractor, BatchHandler, RawArticleRow, RawFeedRow};
use super::load::{FeedLoadCounts, Loader};
use super::report::{ReportBuilder, RunReport, ValidationCounts};
use super::templates::QueryTemplates;
use super::transform::{transform_articles, transform_feeds};
use crate::config::{Config, SessionTuning};
use crate::error::{MigrationError, Result};
use crate::storage::{ensure_destination_schema, Sessions};

// ============================================================================
// Phases
// ============================================================================

/// Steps of a run. `Failed` can follow any step before `Done`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MigrationPhase {
    Init,
    MigrateCategoriesAndFeeds,
    MigrateArticles,
    Compact,
    Validate,
    Done,
    Failed,
}

impl fmt::Display for MigrationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// ============================================================================
// Options
// ============================================================================

/// Knobs for one run, usually derived from [`Config`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationOptions {
    pub feed_batch_size: usize,
    pub article_batch_size: usize,
    pub insert_chunk_size: usize,
    pub root_sentinel: Option<i64>,
    /// Create the destination tables before loading.
    pub init_schema: bool,
}

impl Default for MigrationOptions {
    fn default() -> Self {
        Self::from_config(&Config::default(), false)
    }
}

impl MigrationOptions {
    pub fn from_config(config: &Config, init_schema: bool) -> Self {
        Self {
            feed_batch_size: config.feed_batch_size,
            article_batch_size: config.article_batch_size,
            insert_chunk_size: config.insert_chunk_size,
            root_sentinel: config.root_sentinel(),
            init_schema,
        }
    }
}

// ============================================================================
// Migrator
// ============================================================================

/// Drives a full QuiteRSS to RSS Guard migration.
pub struct Migrator {
    options: MigrationOptions,
    templates: QueryTemplates,
}

impl Migrator {
    pub fn new(options: MigrationOptions, templates: QueryTemplates) -> Self {
        Self { options, templates }
    }

    /// Open both stores, migrate, and close them again.
    ///
    /// The sessions are closed (restoring the destination's settings) whether
    /// or not the run succeeds.
    ///
    /// # Errors
    ///
    /// `MigrationError::Failed` naming the phase that stopped the run; a store
    /// that cannot be opened fails in `Init`.
    pub async fn run(
        &self,
        source: &Path,
        destination: &Path,
        tuning: &SessionTuning,
    ) -> Result<RunReport> {
        let mut sessions = Sessions::open(source, destination, tuning)
            .await
            .map_err(|e| MigrationError::failed(MigrationPhase::Init, e))?;
        let outcome = self.run_with(&mut sessions).await;
        sessions.close().await;
        outcome
    }

    /// Run every phase against already-open sessions.
    ///
    /// Leaves the sessions open; the caller closes them.
    pub async fn run_with(&self, sessions: &mut Sessions) -> Result<RunReport> {
        let mut report = ReportBuilder::start();
        let mut phase = MigrationPhase::Init;

        match self.execute(sessions, &mut report, &mut phase).await {
            Ok(counts) => {
                enter(&mut phase, MigrationPhase::Done);
                let report = report.finish(counts);
                tracing::info!(
                    categories = counts.categories,
                    feeds = counts.feeds,
                    messages = counts.messages,
                    elapsed_ms = report.elapsed_ms,
                    "Migration completed"
                );
                Ok(report)
            }
            Err(e) => {
                let failed_in = phase;
                enter(&mut phase, MigrationPhase::Failed);
                tracing::error!(phase = %failed_in, error = %e, "Migration failed");
                Err(MigrationError::failed(failed_in, e))
            }
        }
    }

    async fn execute(
        &self,
        sessions: &mut Sessions,
        report: &mut ReportBuilder,
        phase: &mut MigrationPhase,
    ) -> Result<ValidationCounts> {
        if self.options.init_schema {
            ensure_destination_schema(sessions.destination()).await?;
            report.stage("Destination schema initialized");
        }

        enter(phase, MigrationPhase::MigrateCategoriesAndFeeds);
        let loaded = self.migrate_feeds(sessions).await?;
        tracing::info!(
            categories = loaded.categories,
            feeds = loaded.feeds,
            "Categories and feeds loaded"
        );
        report.stage("Feeds and categories migration completed");

        enter(phase, MigrationPhase::MigrateArticles);
        let messages = self.migrate_articles(sessions).await?;
        tracing::info!(messages, "Articles loaded");
        report.stage("Articles migration completed");

        enter(phase, MigrationPhase::Compact);
        compact(sessions.destination(), report).await;

        enter(phase, MigrationPhase::Validate);
        validate(sessions).await
    }

    async fn migrate_feeds(&self, sessions: &mut Sessions) -> Result<FeedLoadCounts> {
        let (source, destination) = sessions.split();
        let mut handler = FeedBatches {
            loader: Loader::new(
                destination,
                &self.templates,
                self.options.insert_chunk_size,
                self.options.root_sentinel,
            ),
            loaded: FeedLoadCounts::default(),
        };

        BatchExtractor::new(source)
            .stream_in_batches::<RawFeedRow, _>(
                &self.templates.extract_feeds,
                self.options.feed_batch_size,
                &mut handler,
            )
            .await?;
        Ok(handler.loaded)
    }

    async fn migrate_articles(&self, sessions: &mut Sessions) -> Result<u64> {
        let (source, destination) = sessions.split();
        let mut handler = ArticleBatches {
            loader: Loader::new(
                destination,
                &self.templates,
                self.options.insert_chunk_size,
                self.options.root_sentinel,
            ),
            loaded: 0,
        };

        BatchExtractor::new(source)
            .stream_in_batches::<RawArticleRow, _>(
                &self.templates.extract_articles,
                self.options.article_batch_size,
                &mut handler,
            )
            .await?;
        Ok(handler.loaded)
    }
}

fn enter(phase: &mut MigrationPhase, next: MigrationPhase) {
    tracing::debug!(from = %phase, to = %next, "Phase transition");
    *phase = next;
}

/// VACUUM the destination. A failure becomes a report warning, never an error.
async fn compact(destination: &mut SqliteConnection, report: &mut ReportBuilder) {
    match sqlx::query("VACUUM").execute(destination).await {
        Ok(_) => {
            report.stage("Destination vacuum completed");
        }
        Err(e) => {
            tracing::warn!(error = %e, "Destination compaction failed, continuing");
            report.note(format!("Warning: destination compaction failed: {e}"));
            report.mark();
        }
    }
}

async fn validate(sessions: &mut Sessions) -> Result<ValidationCounts> {
    let (categories, feeds, messages): (i64, i64, i64) = sqlx::query_as(
        "SELECT (SELECT COUNT(*) FROM categories), \
                (SELECT COUNT(*) FROM feeds), \
                (SELECT COUNT(*) FROM messages)",
    )
    .fetch_one(sessions.destination())
    .await
    .map_err(MigrationError::Validation)?;

    Ok(ValidationCounts {
        categories,
        feeds,
        messages,
    })
}

// ============================================================================
// Batch Handlers
// ============================================================================

struct FeedBatches<'c> {
    loader: Loader<'c>,
    loaded: FeedLoadCounts,
}

impl BatchHandler<RawFeedRow> for FeedBatches<'_> {
    async fn handle(&mut self, batch: Vec<RawFeedRow>) -> Result<()> {
        let nodes = transform_feeds(batch)?;
        self.loaded += self.loader.load_feeds(&nodes).await?;
        Ok(())
    }
}

struct ArticleBatches<'c> {
    loader: Loader<'c>,
    loaded: u64,
}

impl BatchHandler<RawArticleRow> for ArticleBatches<'_> {
    async fn handle(&mut self, batch: Vec<RawArticleRow>) -> Result<()> {
        let articles = transform_articles(batch)?;
        self.loaded += self.loader.load_articles(&articles).await?;
        Ok(())
    }
}
