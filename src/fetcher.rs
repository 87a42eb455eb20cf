// 🌐 Bulletin Fetchers - where bulletin HTML comes from
//
// The controller only sees BulletinFetcher; the pipeline itself never does
// network I/O. Three sources:
// - HttpFetcher     travel.state.gov (feature "http")
// - CacheFetcher    <dir>/YYYY-MM.html, for offline runs and tests
// - CachingFetcher  any fetcher + a cache directory in front of it

use crate::model::YearMonth;
use regex::Regex;
use scraper::{Html, Selector};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;

/// Default root of the bulletin pages
pub const DEFAULT_BASE_URL: &str = "https://travel.state.gov/content/travel/en/legal/visa-law0/visa-bulletin";

/// Result of asking for one month
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Html(String),
    /// The bulletin does not exist (yet)
    NotPublished,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request timed out: {url}")]
    Timeout { url: String },

    #[error("HTTP {status} from {url}")]
    Http { url: String, status: u16 },

    #[error("transport error for {url}: {message}")]
    Transport { url: String, message: String },

    #[error("I/O error: {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Source of bulletin pages
pub trait BulletinFetcher {
    fn fetch(&self, period: YearMonth) -> Result<FetchOutcome, FetchError>;

    /// The bulletin index page, used to discover newly published months
    fn fetch_index(&self) -> Result<FetchOutcome, FetchError> {
        Ok(FetchOutcome::NotPublished)
    }
}

/// Page of one bulletin
///
/// Bulletins are filed under the federal fiscal year:
/// October 2025 → `<base>/2026/visa-bulletin-for-october-2025.html`
pub fn bulletin_url(base_url: &str, period: YearMonth) -> String {
    format!(
        "{}/{}/visa-bulletin-for-{}-{}.html",
        base_url.trim_end_matches('/'),
        period.fiscal_year(),
        period.month_name(),
        period.year
    )
}

pub fn index_url(base_url: &str) -> String {
    format!("{}.html", base_url.trim_end_matches('/'))
}

fn bulletin_link() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"visa-bulletin-for-([A-Za-z]+)-(\d{4})\.html").expect("link pattern is valid"))
}

/// Months linked from the bulletin index page, newest first, deduplicated
pub fn discover_months(index_html: &str) -> Vec<YearMonth> {
    let document = Html::parse_document(index_html);
    let Ok(links) = Selector::parse("a[href]") else {
        return Vec::new();
    };

    let mut months: Vec<YearMonth> = document
        .select(&links)
        .filter_map(|a| a.value().attr("href"))
        .filter_map(|href| {
            let caps = bulletin_link().captures(href)?;
            let name = caps[1].to_lowercase();
            let month = crate::model::MONTH_NAMES.iter().position(|m| *m == name)? as u32 + 1;
            let year: i32 = caps[2].parse().ok()?;
            YearMonth::new(year, month)
        })
        .collect();

    months.sort_unstable_by(|a, b| b.cmp(a));
    months.dedup();
    months
}

// ============================================================================
// CACHE DIRECTORY
// ============================================================================

/// Reads `<dir>/YYYY-MM.html`; a missing file means not published
#[derive(Debug, Clone)]
pub struct CacheFetcher {
    dir: PathBuf,
}

impl CacheFetcher {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        CacheFetcher { dir: dir.into() }
    }

    pub fn path_for(&self, period: YearMonth) -> PathBuf {
        self.dir.join(format!("{}.html", period))
    }

    fn index_path(&self) -> PathBuf {
        self.dir.join("index.html")
    }

    fn read(&self, path: &Path) -> Result<FetchOutcome, FetchError> {
        match std::fs::read_to_string(path) {
            Ok(html) => Ok(FetchOutcome::Html(html)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(FetchOutcome::NotPublished),
            Err(source) => Err(FetchError::Io {
                path: path.display().to_string(),
                source,
            }),
        }
    }

    /// Store a page under its month
    pub fn store(&self, period: YearMonth, html: &str) -> Result<PathBuf, FetchError> {
        let io_err = |path: &Path, source| FetchError::Io {
            path: path.display().to_string(),
            source,
        };
        std::fs::create_dir_all(&self.dir).map_err(|e| io_err(&self.dir, e))?;
        let path = self.path_for(period);
        std::fs::write(&path, html).map_err(|e| io_err(&path, e))?;
        Ok(path)
    }
}

impl BulletinFetcher for CacheFetcher {
    fn fetch(&self, period: YearMonth) -> Result<FetchOutcome, FetchError> {
        self.read(&self.path_for(period))
    }

    fn fetch_index(&self) -> Result<FetchOutcome, FetchError> {
        self.read(&self.index_path())
    }
}

/// Cache in front of another fetcher
pub struct CachingFetcher<F> {
    inner: F,
    cache: CacheFetcher,
}

impl<F: BulletinFetcher> CachingFetcher<F> {
    pub fn new(inner: F, cache_dir: impl Into<PathBuf>) -> Self {
        CachingFetcher {
            inner,
            cache: CacheFetcher::new(cache_dir),
        }
    }
}

impl<F: BulletinFetcher> BulletinFetcher for CachingFetcher<F> {
    fn fetch(&self, period: YearMonth) -> Result<FetchOutcome, FetchError> {
        if let FetchOutcome::Html(html) = self.cache.fetch(period)? {
            tracing::debug!(period = %period, "bulletin served from cache");
            return Ok(FetchOutcome::Html(html));
        }

        let outcome = self.inner.fetch(period)?;
        if let FetchOutcome::Html(html) = &outcome {
            // a failed cache write costs a refetch next time, nothing more
            if let Err(e) = self.cache.store(period, html) {
                tracing::warn!(period = %period, error = %e, "could not cache bulletin");
            }
        }
        Ok(outcome)
    }

    /// Index always comes from the inner fetcher; it changes every month
    fn fetch_index(&self) -> Result<FetchOutcome, FetchError> {
        self.inner.fetch_index()
    }
}

// ============================================================================
// HTTP
// ============================================================================

#[cfg(feature = "http")]
pub use http::HttpFetcher;

#[cfg(feature = "http")]
mod http {
    use super::{bulletin_url, index_url, BulletinFetcher, FetchError, FetchOutcome};
    use crate::model::YearMonth;
    use reqwest::blocking::Client;
    use reqwest::StatusCode;
    use std::time::Duration;

    /// Blocking client with a per-request timeout; no retries within a run
    pub struct HttpFetcher {
        client: Client,
        base_url: String,
    }

    impl HttpFetcher {
        pub fn new(base_url: &str, timeout: Duration, user_agent: &str) -> Result<Self, FetchError> {
            let client = Client::builder()
                .timeout(timeout)
                .user_agent(user_agent)
                .build()
                .map_err(|e| FetchError::Transport {
                    url: base_url.to_string(),
                    message: e.to_string(),
                })?;

            Ok(HttpFetcher {
                client,
                base_url: base_url.to_string(),
            })
        }

        fn get(&self, url: &str) -> Result<FetchOutcome, FetchError> {
            tracing::debug!(url, "fetching");
            let response = self.client.get(url).send().map_err(|e| classify(url, e))?;

            let status = response.status();
            if status == StatusCode::NOT_FOUND {
                return Ok(FetchOutcome::NotPublished);
            }
            if !status.is_success() {
                return Err(FetchError::Http {
                    url: url.to_string(),
                    status: status.as_u16(),
                });
            }

            let body = response.text().map_err(|e| classify(url, e))?;
            Ok(FetchOutcome::Html(body))
        }
    }

    fn classify(url: &str, e: reqwest::Error) -> FetchError {
        if e.is_timeout() {
            FetchError::Timeout { url: url.to_string() }
        } else {
            FetchError::Transport {
                url: url.to_string(),
                message: e.to_string(),
            }
        }
    }

    impl BulletinFetcher for HttpFetcher {
        fn fetch(&self, period: YearMonth) -> Result<FetchOutcome, FetchError> {
            self.get(&bulletin_url(&self.base_url, period))
        }

        fn fetch_index(&self) -> Result<FetchOutcome, FetchError> {
            self.get(&index_url(&self.base_url))
        }
    }
}
