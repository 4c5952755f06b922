//! SQL statement templates used by the extractor and the loader.
//!
//! The bundled set lives in `sql/` and is compiled in. A directory of
//! overrides can replace any subset of them by file name.

use std::path::Path;

use crate::error::{MigrationError, Result};

const EXTRACT_FEEDS: &str = include_str!("../../sql/extract_feeds.sql");
const EXTRACT_ARTICLES: &str = include_str!("../../sql/extract_articles.sql");
const INSERT_CATEGORIES: &str = include_str!("../../sql/insert_categories.sql");
const INSERT_FEEDS: &str = include_str!("../../sql/insert_feeds.sql");
const INSERT_MESSAGES: &str = include_str!("../../sql/insert_messages.sql");

/// The five statements a migration run needs.
///
/// Extract templates must yield the columns of
/// [`RawFeedRow`](super::RawFeedRow) and [`RawArticleRow`](super::RawArticleRow);
/// insert templates take 7, 24 and 13 positional parameters in the bundled
/// column order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryTemplates {
    pub extract_feeds: String,
    pub extract_articles: String,
    pub insert_categories: String,
    pub insert_feeds: String,
    pub insert_messages: String,
}

impl Default for QueryTemplates {
    fn default() -> Self {
        Self::bundled()
    }
}

impl QueryTemplates {
    /// The compiled-in templates.
    pub fn bundled() -> Self {
        Self {
            extract_feeds: EXTRACT_FEEDS.to_string(),
            extract_articles: EXTRACT_ARTICLES.to_string(),
            insert_categories: INSERT_CATEGORIES.to_string(),
            insert_feeds: INSERT_FEEDS.to_string(),
            insert_messages: INSERT_MESSAGES.to_string(),
        }
    }

    /// Bundled templates, with any file present in `dir` taking precedence.
    ///
    /// Files are looked up by the bundled names (`extract_feeds.sql`, ...).
    /// A missing file keeps the bundled statement.
    ///
    /// # Errors
    ///
    /// `MigrationError::Template` when an override exists but cannot be read
    /// or holds no statement.
    pub fn load(dir: Option<&Path>) -> Result<Self> {
        let mut templates = Self::bundled();
        let Some(dir) = dir else {
            return Ok(templates);
        };

        for (file_name, slot) in templates.slots_mut() {
            let path = dir.join(file_name);
            match std::fs::read_to_string(&path) {
                Ok(content) if content.trim().is_empty() => {
                    return Err(MigrationError::Template {
                        path,
                        source: std::io::Error::new(
                            std::io::ErrorKind::InvalidData,
                            "template is empty",
                        ),
                    });
                }
                Ok(content) => {
                    tracing::info!(path = %path.display(), "Using statement template override");
                    *slot = content;
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    tracing::debug!(template = file_name, "No override, using bundled template");
                }
                Err(source) => return Err(MigrationError::Template { path, source }),
            }
        }
        Ok(templates)
    }

    fn slots_mut(&mut self) -> [(&'static str, &mut String); 5] {
        [
            ("extract_feeds.sql", &mut self.extract_feeds),
            ("extract_articles.sql", &mut self.extract_articles),
            ("insert_categories.sql", &mut self.insert_categories),
            ("insert_feeds.sql", &mut self.insert_feeds),
            ("insert_messages.sql", &mut self.insert_messages),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "rss_migrate_templates_{name}_{}",
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn placeholders(sql: &str) -> usize {
        sql.matches('?').count()
    }

    #[test]
    fn test_bundled_parameter_counts() {
        let templates = QueryTemplates::bundled();
        assert_eq!(placeholders(&templates.insert_categories), 7);
        assert_eq!(placeholders(&templates.insert_feeds), 24);
        assert_eq!(placeholders(&templates.insert_messages), 13);
    }

    #[test]
    fn test_bundled_extracts_are_ordered() {
        let templates = QueryTemplates::bundled();
        assert!(templates
            .extract_feeds
            .contains("ORDER BY parentId, rowToParent, id"));
        assert!(templates.extract_articles.contains("ORDER BY id"));
    }

    #[test]
    fn test_no_dir_is_bundled() {
        assert_eq!(QueryTemplates::load(None).unwrap(), QueryTemplates::bundled());
    }

    #[test]
    fn test_override_replaces_only_present_files() {
        let dir = temp_dir("override");
        std::fs::write(dir.join("extract_articles.sql"), "SELECT 1 AS id").unwrap();

        let templates = QueryTemplates::load(Some(&dir)).unwrap();
        assert_eq!(templates.extract_articles, "SELECT 1 AS id");
        assert_eq!(templates.extract_feeds, EXTRACT_FEEDS);
        assert_eq!(templates.insert_messages, INSERT_MESSAGES);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_empty_override_rejected() {
        let dir = temp_dir("empty");
        std::fs::write(dir.join("insert_feeds.sql"), "  \n").unwrap();

        let err = QueryTemplates::load(Some(&dir)).unwrap_err();
        match err {
            MigrationError::Template { path, .. } => assert!(path.ends_with("insert_feeds.sql")),
            other => panic!("unexpected error: {other}"),
        }

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_missing_dir_keeps_bundled() {
        let dir = std::env::temp_dir().join("rss_migrate_templates_does_not_exist");
        assert_eq!(
            QueryTemplates::load(Some(&dir)).unwrap(),
            QueryTemplates::bundled()
        );
    }
}
