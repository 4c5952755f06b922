//! Per-stage timing and the final run report.

use chrono::TimeDelta;
use serde::Serialize;
use std::time::{Duration, Instant};

use crate::util::format_duration;

/// Header inserted between the summary and the stage lines.
pub const DETAILS_HEADER: &str = "Operation details :";

/// Row counts read back from the destination after loading.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ValidationCounts {
    pub categories: i64,
    pub feeds: i64,
    pub messages: i64,
}

impl ValidationCounts {
    /// Hierarchy nodes: categories plus feeds.
    pub fn nodes(&self) -> i64 {
        self.categories + self.feeds
    }
}

/// Outcome of a successful run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub summary: String,
    pub stages: Vec<String>,
    pub counts: ValidationCounts,
    pub elapsed_ms: u64,
}

impl RunReport {
    /// Summary line, the details header, then one line per stage.
    pub fn lines(&self) -> Vec<String> {
        let mut lines = Vec::with_capacity(self.stages.len() + 2);
        lines.push(self.summary.clone());
        lines.push(DETAILS_HEADER.to_string());
        lines.extend(self.stages.iter().cloned());
        lines
    }
}

/// Collects stage lines while a run progresses.
///
/// Each [`ReportBuilder::stage`] call measures the time since the previous
/// one (or since construction), so stages must be recorded in order.
#[derive(Debug)]
pub struct ReportBuilder {
    started: Instant,
    last_mark: Instant,
    stages: Vec<String>,
}

impl Default for ReportBuilder {
    fn default() -> Self {
        Self::start()
    }
}

impl ReportBuilder {
    pub fn start() -> Self {
        let now = Instant::now();
        Self {
            started: now,
            last_mark: now,
            stages: Vec::new(),
        }
    }

    /// Record `"<label> : <ms> ms"` for the time since the last mark.
    pub fn stage(&mut self, label: &str) -> Duration {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_mark);
        self.last_mark = now;
        self.stages
            .push(format!("{label} : {} ms", elapsed.as_millis()));
        tracing::info!(stage = label, elapsed_ms = elapsed.as_millis() as u64, "Stage finished");
        elapsed
    }

    /// Record a free-form line, such as a non-fatal warning.
    pub fn note(&mut self, line: impl Into<String>) {
        self.stages.push(line.into());
    }

    /// Restart the stage clock without recording a line.
    pub fn mark(&mut self) {
        self.last_mark = Instant::now();
    }

    pub fn finish(self, counts: ValidationCounts) -> RunReport {
        let elapsed = self.started.elapsed();
        let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        let summary = format!(
            "Migration completed successfully ({} categories, {} feeds, {} messages) in {}.",
            counts.categories,
            counts.feeds,
            counts.messages,
            format_duration(TimeDelta::milliseconds(
                i64::try_from(elapsed_ms).unwrap_or(i64::MAX)
            ))
        );
        RunReport {
            summary,
            stages: self.stages,
            counts,
            elapsed_ms,
        }
    }
}
