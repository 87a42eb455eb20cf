//! Error taxonomy for the normalization pipeline
//!
//! Per-month failures (`FormatMismatch`, `IncompleteVocabulary`) are isolated
//! by the scrape controller; `DuplicateRecord` means the store's upsert logic
//! is broken and must never occur in correct operation.

use crate::model::{TableType, YearMonth};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BulletinError {
    /// Adapter could not locate the table structure its era expects
    #[error("format mismatch for {period}: {reason} (excerpt: {excerpt:?})")]
    FormatMismatch {
        period: YearMonth,
        reason: String,
        excerpt: String,
    },

    /// Required category/country combinations never appeared in the tables
    #[error("incomplete vocabulary for {period}: {} missing ({})", missing.len(), preview(missing))]
    IncompleteVocabulary {
        period: YearMonth,
        missing: Vec<MissingEntry>,
    },

    /// Uniqueness violated at the storage boundary
    #[error("duplicate record {period} {} {category}/{country}", table_type.code())]
    DuplicateRecord {
        period: YearMonth,
        table_type: TableType,
        category: String,
        country: String,
    },

    /// A record inside a BulletinMonth belongs to another month
    #[error("record for {found} inside bulletin month {expected}")]
    MonthMismatch { expected: YearMonth, found: YearMonth },

    #[error("invalid bulletin period {year}-{month}")]
    InvalidPeriod { year: i32, month: u32 },

    #[error("vocabulary error: {0}")]
    Vocabulary(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// One required (table type, category, country) that was not produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingEntry {
    pub table_type: TableType,
    pub category: String,
    pub country: String,
}

impl std::fmt::Display for MissingEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}/{}", self.table_type.code(), self.category, self.country)
    }
}

fn preview(missing: &[MissingEntry]) -> String {
    let mut shown: Vec<String> = missing.iter().take(5).map(|m| m.to_string()).collect();
    if missing.len() > 5 {
        shown.push("...".to_string());
    }
    shown.join(", ")
}

impl BulletinError {
    pub fn format_mismatch(period: YearMonth, reason: impl Into<String>, excerpt: impl Into<String>) -> Self {
        BulletinError::FormatMismatch {
            period,
            reason: reason.into(),
            excerpt: excerpt.into(),
        }
    }

    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        BulletinError::Io {
            path: path.into(),
            source,
        }
    }

    /// Parse-level failures are fatal for the month only
    pub fn is_parse_failure(&self) -> bool {
        matches!(
            self,
            BulletinError::FormatMismatch { .. } | BulletinError::IncompleteVocabulary { .. }
        )
    }
}

impl From<serde_json::Error> for BulletinError {
    fn from(e: serde_json::Error) -> Self {
        BulletinError::Serialization(e.to_string())
    }
}

impl From<csv::Error> for BulletinError {
    fn from(e: csv::Error) -> Self {
        BulletinError::Serialization(e.to_string())
    }
}

pub type BulletinResult<T> = std::result::Result<T, BulletinError>;
