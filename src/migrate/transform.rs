//! Normalization of extracted QuiteRSS rows into load-ready records.
//!
//! Everything here is pure: null text becomes `""`, text is trimmed,
//! timestamps become epoch milliseconds, and the read flag is folded to 0/1.
//! The only failure is a timestamp that is not ISO-8601.

use chrono::{DateTime, NaiveDateTime};

use super::extract::{RawArticleRow, RawFeedRow};
use crate::error::TimestampFormatError;
use crate::util::strip_to_empty;

/// Parent id meaning "top level" in the destination hierarchy.
pub const NO_PARENT: i64 = -1;

// ============================================================================
// Records
// ============================================================================

/// A QuiteRSS feed or category, normalized.
///
/// Build with [`SourceFeed::from_raw`]; a node is a category exactly when its
/// feed URL is blank (see [`SourceFeed::is_category`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFeed {
    pub order: i64,
    pub parent_id: i64,
    pub id: i64,
    pub title: String,
    pub description: String,
    /// Creation time, epoch milliseconds
    pub created: i64,
    pub feed_url: String,
    /// Icon bytes, empty when the source has none
    pub icon: Vec<u8>,
    pub disable_update: i64,
    pub layout_direction: i64,
    pub add_single_news_any_date_on: i64,
}

impl SourceFeed {
    /// Normalize a raw extracted row.
    ///
    /// # Errors
    ///
    /// Returns `TimestampFormatError` when `created` is missing or not ISO-8601.
    pub fn from_raw(raw: RawFeedRow) -> Result<Self, TimestampFormatError> {
        Ok(Self {
            order: raw.row_to_parent.unwrap_or(0),
            parent_id: raw.parent_id.unwrap_or(0),
            id: raw.id.unwrap_or(0),
            title: strip_to_empty(raw.text),
            description: strip_to_empty(raw.description),
            created: required_epoch_millis(raw.created)?,
            feed_url: strip_to_empty(raw.xml_url),
            icon: raw.image.unwrap_or_default(),
            disable_update: raw.disable_update.unwrap_or(0),
            layout_direction: raw.layout_direction.unwrap_or(0),
            add_single_news_any_date_on: raw.add_single_news_any_date_on.unwrap_or(0),
        })
    }

    /// Categories have no feed URL; everything else is a feed.
    ///
    /// Both loader passes filter on this predicate, with opposite polarity.
    pub fn is_category(&self) -> bool {
        self.feed_url.trim().is_empty()
    }

    /// Parent id to write to the destination.
    ///
    /// With a root sentinel configured, the sentinel category itself and any
    /// node recorded directly under it are moved to the top level
    /// ([`NO_PARENT`]).
    pub fn destination_parent(&self, root_sentinel: Option<i64>) -> i64 {
        match root_sentinel {
            Some(sentinel) if self.is_category() && self.id == sentinel => NO_PARENT,
            Some(sentinel) if self.parent_id == sentinel => NO_PARENT,
            _ => self.parent_id,
        }
    }
}

/// A QuiteRSS article, normalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceArticle {
    pub author: String,
    pub description: String,
    pub guid: String,
    /// Time the article was received, epoch milliseconds
    pub received: i64,
    pub feed_id: i64,
    pub id: i64,
    pub deleted: i64,
    pub starred: i64,
    /// Always 0 or 1
    pub read: i64,
    pub title: String,
    pub link: String,
}

impl SourceArticle {
    /// Normalize a raw extracted row.
    ///
    /// # Errors
    ///
    /// Returns `TimestampFormatError` when `received` is missing or not ISO-8601.
    pub fn from_raw(raw: RawArticleRow) -> Result<Self, TimestampFormatError> {
        Ok(Self {
            author: strip_to_empty(raw.author_name),
            description: strip_to_empty(raw.description),
            guid: strip_to_empty(raw.guid),
            received: required_epoch_millis(raw.received)?,
            feed_id: raw.feed_id.unwrap_or(0),
            id: raw.id.unwrap_or(0),
            deleted: raw.deleted.unwrap_or(0),
            starred: raw.starred.unwrap_or(0),
            read: normalize_read_flag(raw.read.unwrap_or(0)),
            title: strip_to_empty(raw.title),
            link: strip_to_empty(raw.link_href),
        })
    }
}

// ============================================================================
// Batch Transforms
// ============================================================================

/// Normalize a whole feed/category batch; the first bad row fails the batch.
pub fn transform_feeds(batch: Vec<RawFeedRow>) -> Result<Vec<SourceFeed>, TimestampFormatError> {
    batch.into_iter().map(SourceFeed::from_raw).collect()
}

/// Normalize a whole article batch; the first bad row fails the batch.
pub fn transform_articles(
    batch: Vec<RawArticleRow>,
) -> Result<Vec<SourceArticle>, TimestampFormatError> {
    batch.into_iter().map(SourceArticle::from_raw).collect()
}

// ============================================================================
// Field Normalization
// ============================================================================

/// QuiteRSS uses several non-zero read states; the destination only knows read/unread.
pub fn normalize_read_flag(read: i64) -> i64 {
    if read != 0 {
        1
    } else {
        0
    }
}

/// Convert an ISO-8601 date-time to milliseconds since the Unix epoch.
///
/// A value ending in `Z` is an absolute UTC instant; a value without a zone
/// is read as UTC wall-clock time. Fractional seconds are optional, and a
/// zone-less value may omit seconds.
///
/// # Examples
///
/// ```
/// use rss_migrate::migrate::to_epoch_millis;
///
/// assert_eq!(to_epoch_millis("1970-01-01T00:00:01Z").unwrap(), 1000);
/// assert_eq!(to_epoch_millis("1970-01-01T00:00:01").unwrap(), 1000);
/// assert!(to_epoch_millis("01/01/1970").is_err());
/// ```
pub fn to_epoch_millis(value: &str) -> Result<i64, TimestampFormatError> {
    let trimmed = value.trim();
    let invalid = || TimestampFormatError {
        value: value.to_string(),
    };

    if trimmed.ends_with('Z') {
        return DateTime::parse_from_rfc3339(trimmed)
            .map(|dt| dt.timestamp_millis())
            .map_err(|_| invalid());
    }

    NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M"))
        .map(|dt| dt.and_utc().timestamp_millis())
        .map_err(|_| invalid())
}

fn required_epoch_millis(value: Option<String>) -> Result<i64, TimestampFormatError> {
    match value {
        Some(v) => to_epoch_millis(&v),
        None => Err(TimestampFormatError {
            value: String::new(),
        }),
    }
}
