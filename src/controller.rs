// 🔄 Scrape Controller - fetch → parse → store, one month at a time
//
// A month that fails (network, unexpected table layout, incomplete
// vocabulary, store error) is reported and the run moves on to the next one.
// Only a failure to read the store's month index aborts a run.

use crate::db::{Store, UpsertOutcome};
use crate::error::BulletinResult;
use crate::fetcher::{discover_months, BulletinFetcher, FetchOutcome};
use crate::model::YearMonth;
use crate::parser::BulletinParser;
use serde::Serialize;
use std::collections::BTreeSet;

/// What happened to one month during a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum MonthOutcome {
    /// First time stored
    Imported { records: usize },
    /// Stored before with different content
    Replaced { records: usize },
    /// Re-scraped, content identical to the stored month
    Unchanged,
    /// Already stored and not forced
    Skipped,
    NotPublished,
    FetchFailed(String),
    /// FormatMismatch or IncompleteVocabulary
    ParseFailed(String),
    StoreFailed(String),
}

impl MonthOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            MonthOutcome::Imported { .. } => "imported",
            MonthOutcome::Replaced { .. } => "replaced",
            MonthOutcome::Unchanged => "unchanged",
            MonthOutcome::Skipped => "skipped",
            MonthOutcome::NotPublished => "not_published",
            MonthOutcome::FetchFailed(_) => "fetch_failed",
            MonthOutcome::ParseFailed(_) => "parse_failed",
            MonthOutcome::StoreFailed(_) => "store_failed",
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            MonthOutcome::FetchFailed(_) | MonthOutcome::ParseFailed(_) | MonthOutcome::StoreFailed(_)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthResult {
    pub period: YearMonth,
    #[serde(flatten)]
    pub outcome: MonthOutcome,
}

/// Per-month outcomes of one run, in processing order
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    pub results: Vec<MonthResult>,
}

impl SyncReport {
    pub fn outcome(&self, period: YearMonth) -> Option<&MonthOutcome> {
        self.results.iter().find(|r| r.period == period).map(|r| &r.outcome)
    }

    pub fn count(&self, label: &str) -> usize {
        self.results.iter().filter(|r| r.outcome.label() == label).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &MonthResult> {
        self.results.iter().filter(|r| r.outcome.is_failure())
    }

    pub fn has_failures(&self) -> bool {
        self.failures().next().is_some()
    }

    /// One line: "imported 3, unchanged 1, parse_failed 1"
    pub fn summary(&self) -> String {
        const LABELS: [&str; 8] = [
            "imported",
            "replaced",
            "unchanged",
            "skipped",
            "not_published",
            "fetch_failed",
            "parse_failed",
            "store_failed",
        ];
        let parts: Vec<String> = LABELS
            .iter()
            .map(|label| (label, self.count(label)))
            .filter(|(_, n)| *n > 0)
            .map(|(label, n)| format!("{} {}", label, n))
            .collect();
        if parts.is_empty() {
            "nothing to do".to_string()
        } else {
            parts.join(", ")
        }
    }
}

pub struct ScrapeController<'a> {
    store: &'a mut Store,
    fetcher: &'a dyn BulletinFetcher,
    parser: &'a BulletinParser,
}

impl<'a> ScrapeController<'a> {
    pub fn new(store: &'a mut Store, fetcher: &'a dyn BulletinFetcher, parser: &'a BulletinParser) -> Self {
        ScrapeController { store, fetcher, parser }
    }

    /// Bring every month in start..=end into the store
    ///
    /// Months already stored are skipped unless `force`.
    pub fn sync(&mut self, start: YearMonth, end: YearMonth, force: bool) -> BulletinResult<SyncReport> {
        let present = self.store.months_present()?;
        let mut report = SyncReport::default();

        tracing::info!(start = %start, end = %end, force, "sync started");
        for period in YearMonth::range(start, end) {
            let outcome = self.sync_month(period, force, &present);
            report.results.push(MonthResult { period, outcome });
        }
        tracing::info!(summary = %report.summary(), "sync finished");

        Ok(report)
    }

    /// Sync the newest `limit` months linked from the index that are not stored
    pub fn refresh_latest(&mut self, index_html: &str, limit: usize) -> BulletinResult<SyncReport> {
        let present = self.store.months_present()?;
        let mut wanted: Vec<YearMonth> = discover_months(index_html)
            .into_iter()
            .filter(|p| !present.contains(p))
            .take(limit)
            .collect();
        wanted.sort();

        tracing::info!(months = wanted.len(), "refreshing latest bulletins");
        let mut report = SyncReport::default();
        for period in wanted {
            let outcome = self.sync_month(period, false, &present);
            report.results.push(MonthResult { period, outcome });
        }
        Ok(report)
    }

    fn sync_month(&mut self, period: YearMonth, force: bool, present: &BTreeSet<YearMonth>) -> MonthOutcome {
        if present.contains(&period) && !force {
            tracing::debug!(period = %period, "already stored, skipping");
            return MonthOutcome::Skipped;
        }

        let html = match self.fetcher.fetch(period) {
            Ok(FetchOutcome::Html(html)) => html,
            Ok(FetchOutcome::NotPublished) => {
                tracing::info!(period = %period, "bulletin not published");
                return MonthOutcome::NotPublished;
            }
            Err(e) => {
                tracing::error!(period = %period, error = %e, "fetch failed");
                return MonthOutcome::FetchFailed(e.to_string());
            }
        };

        let month = match self.parser.parse_period(&html, period) {
            Ok(month) => month,
            Err(e) => {
                tracing::error!(period = %period, error = %e, "parse failed");
                return MonthOutcome::ParseFailed(e.to_string());
            }
        };

        let records = month.len();
        match self.store.upsert_month(&month) {
            Ok(UpsertOutcome::Inserted) => MonthOutcome::Imported { records },
            Ok(UpsertOutcome::Replaced) => {
                tracing::warn!(period = %period, "bulletin content changed since last scrape");
                MonthOutcome::Replaced { records }
            }
            Ok(UpsertOutcome::Unchanged) => MonthOutcome::Unchanged,
            Err(e) => {
                tracing::error!(period = %period, error = %e, "store failed");
                MonthOutcome::StoreFailed(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::FetchError;
    use crate::test_support::combined_page;
    use crate::vocabulary::Vocabulary;
    use std::collections::HashMap;
    use std::sync::Arc;

    /// Serves canned pages; months without a page are unpublished
    struct MapFetcher {
        pages: HashMap<YearMonth, Result<String, String>>,
    }

    impl BulletinFetcher for MapFetcher {
        fn fetch(&self, period: YearMonth) -> Result<FetchOutcome, FetchError> {
            match self.pages.get(&period) {
                Some(Ok(html)) => Ok(FetchOutcome::Html(html.clone())),
                Some(Err(_)) => Err(FetchError::Timeout {
                    url: format!("http://test/{}", period),
                }),
                None => Ok(FetchOutcome::NotPublished),
            }
        }
    }

    fn ym(s: &str) -> YearMonth {
        s.parse().unwrap()
    }

    fn parser() -> BulletinParser {
        BulletinParser::new(Arc::new(Vocabulary::embedded().unwrap()))
    }

    fn fetcher(pages: &[(&str, Result<String, String>)]) -> MapFetcher {
        MapFetcher {
            pages: pages.iter().map(|(p, r)| (ym(p), r.clone())).collect(),
        }
    }

    #[test]
    fn test_sync_isolates_failing_months() {
        let mut store = Store::open_in_memory().unwrap();
        let parser = parser();
        let fetcher = fetcher(&[
            ("2010-01", Ok(combined_page("01JAN06"))),
            ("2010-02", Ok("<html><body>maintenance</body></html>".to_string())),
            ("2010-03", Err("timeout".to_string())),
            ("2010-05", Ok(combined_page("15JAN06"))),
        ]);

        let report = ScrapeController::new(&mut store, &fetcher, &parser)
            .sync(ym("2010-01"), ym("2010-05"), false)
            .unwrap();

        assert_eq!(report.results.len(), 5);
        assert!(matches!(report.outcome(ym("2010-01")), Some(MonthOutcome::Imported { records: 70 })));
        assert!(matches!(report.outcome(ym("2010-02")), Some(MonthOutcome::ParseFailed(_))));
        assert!(matches!(report.outcome(ym("2010-03")), Some(MonthOutcome::FetchFailed(_))));
        assert_eq!(report.outcome(ym("2010-04")), Some(&MonthOutcome::NotPublished));
        assert!(matches!(report.outcome(ym("2010-05")), Some(MonthOutcome::Imported { .. })));
        assert!(report.has_failures());
        assert_eq!(
            report.summary(),
            "imported 2, not_published 1, fetch_failed 1, parse_failed 1"
        );

        // unpublished and failed months leave no trace in the store
        let present: Vec<YearMonth> = store.months_present().unwrap().into_iter().collect();
        assert_eq!(present, vec![ym("2010-01"), ym("2010-05")]);
    }

    #[test]
    fn test_sync_skips_stored_months_unless_forced() {
        let mut store = Store::open_in_memory().unwrap();
        let parser = parser();
        let fetcher = fetcher(&[("2010-01", Ok(combined_page("01JAN06")))]);

        let mut controller = ScrapeController::new(&mut store, &fetcher, &parser);
        controller.sync(ym("2010-01"), ym("2010-01"), false).unwrap();

        let again = controller.sync(ym("2010-01"), ym("2010-01"), false).unwrap();
        assert_eq!(again.outcome(ym("2010-01")), Some(&MonthOutcome::Skipped));

        let forced = controller.sync(ym("2010-01"), ym("2010-01"), true).unwrap();
        assert_eq!(forced.outcome(ym("2010-01")), Some(&MonthOutcome::Unchanged));
    }

    #[test]
    fn test_forced_sync_detects_republished_bulletin() {
        let mut store = Store::open_in_memory().unwrap();
        let parser = parser();

        let original = fetcher(&[("2010-01", Ok(combined_page("01JAN06")))]);
        ScrapeController::new(&mut store, &original, &parser)
            .sync(ym("2010-01"), ym("2010-01"), false)
            .unwrap();

        let revised = fetcher(&[("2010-01", Ok(combined_page("22FEB06")))]);
        let report = ScrapeController::new(&mut store, &revised, &parser)
            .sync(ym("2010-01"), ym("2010-01"), true)
            .unwrap();

        assert_eq!(report.outcome(ym("2010-01")), Some(&MonthOutcome::Replaced { records: 70 }));
        assert_eq!(store.record_count().unwrap(), 70);
    }

    #[test]
    fn test_refresh_latest_takes_newest_unstored() {
        let mut store = Store::open_in_memory().unwrap();
        let parser = parser();
        let fetcher = fetcher(&[
            ("2010-01", Ok(combined_page("01JAN06"))),
            ("2010-02", Ok(combined_page("01JAN06"))),
            ("2010-03", Ok(combined_page("01FEB06"))),
        ]);

        let index = r#"
            <a href="/visa-bulletin/2010/visa-bulletin-for-january-2010.html">Jan</a>
            <a href="/visa-bulletin/2010/visa-bulletin-for-february-2010.html">Feb</a>
            <a href="/visa-bulletin/2010/visa-bulletin-for-march-2010.html">Mar</a>"#;

        let mut controller = ScrapeController::new(&mut store, &fetcher, &parser);
        controller.sync(ym("2010-03"), ym("2010-03"), false).unwrap();

        let report = controller.refresh_latest(index, 1).unwrap();
        let periods: Vec<YearMonth> = report.results.iter().map(|r| r.period).collect();
        assert_eq!(periods, vec![ym("2010-02")]);
        assert!(matches!(report.outcome(ym("2010-02")), Some(MonthOutcome::Imported { .. })));
    }
}
