// Visa Bulletin Normalization Pipeline - Core Library
// Exposes all modules for use in the CLI and tests

pub mod model;
pub mod error;
pub mod codec;       // Date/Status Codec - one cell → CutoffValue
pub mod vocabulary;  // Controlled vocabulary - labels → canonical codes
pub mod adapter;     // Table-Format Adapter - one strategy per layout
pub mod parser;      // Bulletin Parser - adapter + codec → BulletinMonth
pub mod db;          // Historical Store - SQLite
pub mod fetcher;     // Bulletin sources - HTTP, cache directory
pub mod controller;  // Scrape Controller - fetch → parse → store
pub mod export;      // Movement & Export Engine
pub mod config;
pub mod logging;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use model::{
    BulletinMonth, BulletinRecord, CutoffValue, Layout, TableType, VisaClass, YearMonth,
};
pub use error::{BulletinError, BulletinResult, MissingEntry};
pub use codec::{decode, encode, Decoded};
pub use vocabulary::{CategoryDef, CountryDef, Vocabulary};
pub use adapter::{
    detect_layout, get_format, CellText, RawCell, TableFormat,
    CombinedFormat, ModernFormat, SplitFormat,
};
pub use parser::BulletinParser;
pub use db::{Event, MonthSummary, Store, UpsertOutcome, setup_database};
pub use fetcher::{
    bulletin_url, discover_months, BulletinFetcher, CacheFetcher, CachingFetcher,
    FetchError, FetchOutcome,
};
#[cfg(feature = "http")]
pub use fetcher::HttpFetcher;
pub use controller::{MonthOutcome, MonthResult, ScrapeController, SyncReport};
pub use export::{
    classify_movement, CategoryExport, ExportDocument, ExportEngine, HistoryEntry, Movement,
    MovementEntry,
};
pub use config::Settings;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
