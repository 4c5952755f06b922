//! The migration engine: extract from QuiteRSS, normalize, load into RSS Guard.
//!
//! - [`extract`]: batched streaming reads from the source
//! - [`transform`]: pure row normalization
//! - [`load`]: one transaction per batch on the destination
//! - [`orchestrator`]: phase sequencing, compaction, validation
//! - [`report`]: stage timings and the summary line
//! - [`templates`]: the SQL statements all of the above run

pub mod extract;
pub mod load;
pub mod orchestrator;
pub mod report;
pub mod templates;
pub mod transform;

pub use extract::{BatchExtractor, BatchHandler, RawArticleRow, RawFeedRow, SourceRow};
pub use load::{FeedLoadCounts, Loader};
pub use orchestrator::{MigrationOptions, MigrationPhase, Migrator};
pub use report::{ReportBuilder, RunReport, ValidationCounts, DETAILS_HEADER};
pub use templates::QueryTemplates;
pub use transform::{to_epoch_millis, SourceArticle, SourceFeed, NO_PARENT};
