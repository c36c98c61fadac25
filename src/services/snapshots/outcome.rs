// File: src/services/snapshots/outcome.rs
use super::columns::ColumnError;
use super::normalizer::NormalizeError;
use crate::browser::session::BrowserError;
use chrono::NaiveDate;
use std::fmt;
use thiserror::Error;

/// Result of one pipeline step when nothing fatal happened.
#[derive(Debug)]
pub enum Step<T> {
    Continue(T),
    SkipRow(SkipReason),
    RetrySnapshot(RetryReason),
    RestartSession(String),
}

impl<T> Step<T> {
    /// Unwraps `Continue`; any other step is handed back retyped so the caller can return it.
    pub fn proceed<U>(self) -> Result<T, Step<U>> {
        match self {
            Step::Continue(value) => Ok(value),
            Step::SkipRow(reason) => Err(Step::SkipRow(reason)),
            Step::RetrySnapshot(reason) => Err(Step::RetrySnapshot(reason)),
            Step::RestartSession(reason) => Err(Step::RestartSession(reason)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    NoMarketCap,
}

/// Why the current date has to be captured again from navigation.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryReason {
    /// The landmark element never showed up.
    PageNotLoaded(String),
    /// No header row after loading; this is how rate limiting looks from here.
    HeaderMissing { found: usize },
    TableBodyMissing,
    /// Rows rendered fewer cells than the header; scrolling outran lazy rendering.
    RenderRace { row: usize, cells: usize, expected: usize },
    RankUnreadable { row: usize, text: String },
    /// A row-level skip surfaced for the snapshot as a whole.
    SnapshotSkipped(SkipReason),
}

impl fmt::Display for RetryReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryReason::PageNotLoaded(detail) => write!(f, "page did not load: {}", detail),
            RetryReason::HeaderMissing { found } => {
                write!(f, "ranking header not found ({} thead elements on page)", found)
            }
            RetryReason::TableBodyMissing => write!(f, "table body not found"),
            RetryReason::RenderRace { row, cells, expected } => write!(
                f,
                "row {} rendered {} of {} cells, scroll pace too fast",
                row, cells, expected
            ),
            RetryReason::RankUnreadable { row, text } => {
                write!(f, "row {} has unreadable rank '{}'", row, text)
            }
            RetryReason::SnapshotSkipped(reason) => {
                write!(f, "whole snapshot came back as skipped ({:?})", reason)
            }
        }
    }
}

/// Conditions that stop the run. Nothing past the failing date is committed.
#[derive(Error, Debug)]
pub enum ScrapeError {
    #[error("snapshot {date}: column layout not recognised: {source}")]
    Columns {
        date: NaiveDate,
        #[source]
        source: ColumnError,
    },

    #[error("snapshot {date}, row {row}, field {field}: {source}")]
    Normalize {
        date: NaiveDate,
        row: usize,
        field: &'static str,
        #[source]
        source: NormalizeError,
    },

    #[error("snapshot {date} captured {rows} rows, at or above the ceiling of {ceiling}; raise scraper.max_rows and scraper.row_ceiling")]
    RowCeiling {
        date: NaiveDate,
        rows: usize,
        ceiling: usize,
    },

    #[error("snapshot {date}: rank {rank} / symbol '{symbol}' appears twice in one batch")]
    DuplicateKey {
        date: NaiveDate,
        rank: i32,
        symbol: String,
    },

    #[error("snapshot {date}: failed to persist batch: {source}")]
    Persistence {
        date: NaiveDate,
        #[source]
        source: sqlx::Error,
    },

    #[error("failed to read the stored series: {0}")]
    Cursor(#[source] sqlx::Error),

    #[error("cannot open a browser session: {0}")]
    Connect(#[source] BrowserError),

    #[error("browser failure outside of a snapshot: {0}")]
    Browser(#[from] BrowserError),
}

/// Browser failures inside a snapshot never stop the run; the session is rebuilt instead.
pub fn restart_on_browser_error<T>(result: Result<Step<T>, ScrapeError>) -> Result<Step<T>, ScrapeError> {
    match result {
        Err(ScrapeError::Browser(e)) => Ok(Step::RestartSession(e.to_string())),
        other => other,
    }
}
