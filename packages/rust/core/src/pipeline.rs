//! Batch pipeline: fetch → check cleaned → extract → store → log, per URL.
//!
//! URLs are processed strictly in order. A URL that fails to fetch or
//! extract is recorded in the [`BatchReport`] and skipped; only storage write
//! failures abort the batch. The run is recorded as complete last, so an
//! aborted batch is retried on the next start.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, instrument, warn};

use confbot_crawler::{FeedFetcher, RawFetcher};
use confbot_shared::{ExtractionKind, ExtractionRecord, Result, RunId};
use confbot_storage::{CleanedStore, EventLog, Lookup};

use crate::extraction::Extractor;
use crate::scheduler::Scheduler;

// ---------------------------------------------------------------------------
// Planning
// ---------------------------------------------------------------------------

/// Per-URL step of the batch state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Fetching,
    ExtractChecking,
    Extracting,
    Storing,
    Logging,
    Done,
}

/// What to do for a URL once its raw content and cleaned cache state are known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionPlan {
    /// Raw content could not be obtained.
    SkipFetchFailed,
    /// Cleaned content is fresh; nothing to do.
    UseCleaned,
    /// Extract from this raw content.
    Extract(String),
}

/// Decide the extraction step. An unreadable cleaned entry is re-extracted.
pub fn plan_extraction(raw: Option<String>, cleaned: Lookup) -> ExtractionPlan {
    let Some(raw) = raw else {
        return ExtractionPlan::SkipFetchFailed;
    };
    match cleaned {
        Lookup::Hit(_) => ExtractionPlan::UseCleaned,
        Lookup::Miss => ExtractionPlan::Extract(raw),
        Lookup::ReadError(detail) => {
            warn!(error = %detail, "cleaned cache unreadable, re-extracting");
            ExtractionPlan::Extract(raw)
        }
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// How one URL ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UrlOutcome {
    Extracted,
    Fresh,
    FetchFailed,
    ExtractFailed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlReport {
    pub url: String,
    pub kind: ExtractionKind,
    pub outcome: UrlOutcome,
}

/// Result of one batch.
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub run_id: RunId,
    /// Page URLs in order, then the FAQ URL.
    pub urls: Vec<UrlReport>,
    /// Whether the feed snapshot was replaced.
    pub feed_refreshed: bool,
    pub elapsed: Duration,
}

impl BatchReport {
    fn count(&self, pred: impl Fn(&UrlOutcome) -> bool) -> usize {
        self.urls.iter().filter(|u| pred(&u.outcome)).count()
    }

    pub fn extracted(&self) -> usize {
        self.count(|o| *o == UrlOutcome::Extracted)
    }

    pub fn fresh(&self) -> usize {
        self.count(|o| *o == UrlOutcome::Fresh)
    }

    pub fn fetch_failed(&self) -> usize {
        self.count(|o| *o == UrlOutcome::FetchFailed)
    }

    pub fn extract_failed(&self) -> usize {
        self.count(|o| matches!(o, UrlOutcome::ExtractFailed(_)))
    }
}

/// Result of the daily entry point.
#[derive(Debug, Clone)]
pub enum DailyOutcome {
    /// The last run is recent enough.
    Skipped,
    Completed(BatchReport),
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Progress callback for reporting batch status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called before a URL is processed.
    fn url_started(&self, url: &str, current: usize, total: usize);
    /// Called after a URL is processed.
    fn url_finished(&self, url: &str, outcome: &UrlOutcome);
    /// Called when the batch completes.
    fn done(&self, report: &BatchReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn url_started(&self, _url: &str, _current: usize, _total: usize) {}
    fn url_finished(&self, _url: &str, _outcome: &UrlOutcome) {}
    fn done(&self, _report: &BatchReport) {}
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Extraction settings that travel with every URL.
#[derive(Debug, Clone)]
pub struct ExtractionSettings {
    /// Boilerplate sections removed by relevant-content extraction.
    pub exclude_sections: Vec<String>,
    pub input_price_per_million: f64,
    pub output_price_per_million: f64,
}

/// Runs batches over the configured URL set.
pub struct Orchestrator {
    fetcher: RawFetcher,
    extractor: Arc<dyn Extractor>,
    cleaned: CleanedStore,
    feed: FeedFetcher,
    extraction_log: EventLog,
    scheduler: Scheduler,
    settings: ExtractionSettings,
}

impl Orchestrator {
    pub fn new(
        fetcher: RawFetcher,
        extractor: Arc<dyn Extractor>,
        cleaned: CleanedStore,
        feed: FeedFetcher,
        extraction_log: EventLog,
        scheduler: Scheduler,
        settings: ExtractionSettings,
    ) -> Self {
        Self {
            fetcher,
            extractor,
            cleaned,
            feed,
            extraction_log,
            scheduler,
            settings,
        }
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Run a batch if one is due (or `force`), recording the run on success.
    pub async fn run_daily(
        &self,
        urls: &[String],
        faq_url: &str,
        force: bool,
        progress: &dyn ProgressReporter,
    ) -> Result<DailyOutcome> {
        if !force && !self.scheduler.is_due().await {
            info!(next_due = ?self.scheduler.next_due().await, "batch not due, skipping");
            return Ok(DailyOutcome::Skipped);
        }
        let report = self.run_batch(urls, faq_url, progress).await?;
        Ok(DailyOutcome::Completed(report))
    }

    /// One full pass: every page URL, then the FAQ URL, then the feed.
    ///
    /// Returns an error only for storage write failures, in which case the
    /// run is not recorded.
    #[instrument(skip_all, fields(urls = urls.len()))]
    pub async fn run_batch(
        &self,
        urls: &[String],
        faq_url: &str,
        progress: &dyn ProgressReporter,
    ) -> Result<BatchReport> {
        let start = Instant::now();
        let run_id = RunId::new();
        let total = urls.len() + 1;
        info!(%run_id, total, "starting batch");

        let mut reports = Vec::with_capacity(total);

        progress.phase("Processing pages");
        for (i, url) in urls.iter().enumerate() {
            progress.url_started(url, i + 1, total);
            let outcome = self.process_url(url, ExtractionKind::Relevant).await?;
            progress.url_finished(url, &outcome);
            reports.push(UrlReport {
                url: url.clone(),
                kind: ExtractionKind::Relevant,
                outcome,
            });
        }

        progress.phase("Processing FAQ");
        progress.url_started(faq_url, total, total);
        let outcome = self.process_url(faq_url, ExtractionKind::Faq).await?;
        progress.url_finished(faq_url, &outcome);
        reports.push(UrlReport {
            url: faq_url.to_string(),
            kind: ExtractionKind::Faq,
            outcome,
        });

        progress.phase("Refreshing schedule feed");
        let feed_refreshed = self.feed.refresh().await?;

        self.scheduler.record_run(self.scheduler.now()).await?;

        let report = BatchReport {
            run_id,
            urls: reports,
            feed_refreshed,
            elapsed: start.elapsed(),
        };
        info!(
            run_id = %report.run_id,
            extracted = report.extracted(),
            fresh = report.fresh(),
            fetch_failed = report.fetch_failed(),
            extract_failed = report.extract_failed(),
            feed_refreshed,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "batch complete"
        );
        progress.done(&report);
        Ok(report)
    }

    /// Walk one URL through the stages. `Err` only for storage writes.
    #[instrument(skip_all, fields(url = %url, kind = ?kind))]
    async fn process_url(&self, url: &str, kind: ExtractionKind) -> Result<UrlOutcome> {
        let mut stage = Stage::Idle;
        let mut enter = |next: Stage| {
            debug!(from = ?stage, to = ?next, "stage transition");
            stage = next;
        };

        enter(Stage::Fetching);
        let raw = self.fetcher.fetch(url).await;

        enter(Stage::ExtractChecking);
        let cleaned_lookup = if raw.is_some() {
            self.cleaned.get(url).await
        } else {
            Lookup::Miss
        };

        let raw = match plan_extraction(raw, cleaned_lookup) {
            ExtractionPlan::SkipFetchFailed => {
                warn!("no raw content, skipping");
                enter(Stage::Done);
                return Ok(UrlOutcome::FetchFailed);
            }
            ExtractionPlan::UseCleaned => {
                debug!("cleaned content is fresh");
                enter(Stage::Done);
                return Ok(UrlOutcome::Fresh);
            }
            ExtractionPlan::Extract(raw) => raw,
        };

        enter(Stage::Extracting);
        let cleaned = match self
            .extractor
            .extract(kind, &raw, &self.settings.exclude_sections)
            .await
        {
            Ok(cleaned) => cleaned,
            Err(e) => {
                warn!(error = %e, "extraction failed, skipping");
                enter(Stage::Done);
                return Ok(UrlOutcome::ExtractFailed(e.to_string()));
            }
        };

        enter(Stage::Storing);
        self.cleaned.put(url, &cleaned).await?;

        enter(Stage::Logging);
        let record = ExtractionRecord::estimate(
            url,
            kind,
            &raw,
            &cleaned,
            self.settings.input_price_per_million,
            self.settings.output_price_per_million,
        );
        info!(
            input_tokens = record.input_token_estimate,
            output_tokens = record.output_token_estimate,
            estimated_cost_usd = record.estimated_cost_usd,
            "extracted"
        );
        if let Err(e) = self.extraction_log.append(&record).await {
            warn!(error = %e, "failed to append extraction log");
        }

        enter(Stage::Done);
        Ok(UrlOutcome::Extracted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::path::Path;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::{TimeDelta, Utc};
    use confbot_crawler::http_client;
    use confbot_shared::ConfbotError;
    use confbot_storage::{Clock, ExpiringFileStore, FeedCache, ManualClock, RunStateStore};
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Extractor that upper-cases its input and can be told to fail for
    /// specific inputs.
    #[derive(Default)]
    struct FakeExtractor {
        fail_on: HashSet<String>,
        calls: Mutex<Vec<(ExtractionKind, String)>>,
    }

    impl FakeExtractor {
        fn failing_on(raw: &[&str]) -> Self {
            Self {
                fail_on: raw.iter().map(|s| s.to_string()).collect(),
                ..Default::default()
            }
        }

        fn calls(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Extractor for FakeExtractor {
        async fn extract_relevant(&self, text: &str, _exclude: &[String]) -> Result<String> {
            self.calls
                .lock()
                .unwrap()
                .push((ExtractionKind::Relevant, text.to_string()));
            if self.fail_on.contains(text) {
                return Err(ConfbotError::Provider("HTTP 500 after 3 attempts".into()));
            }
            Ok(text.to_uppercase())
        }

        async fn extract_faq(&self, text: &str) -> Result<String> {
            self.calls.lock().unwrap().push((ExtractionKind::Faq, text.to_string()));
            if self.fail_on.contains(text) {
                return Err(ConfbotError::EmptyResponse);
            }
            Ok(format!("FAQ: {text}"))
        }
    }

    struct Harness {
        orchestrator: Orchestrator,
        extractor: Arc<FakeExtractor>,
        cleaned: CleanedStore,
        run_state: RunStateStore,
        extraction_log: std::path::PathBuf,
        clock: Arc<ManualClock>,
    }

    fn harness(root: &Path, server: &MockServer, extractor: FakeExtractor) -> Harness {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let client = http_client(Duration::from_secs(5)).unwrap();
        let raw = ExpiringFileStore::new(root.join("raw-html"), clock.clone());
        let cleaned = CleanedStore::new(root.join("extracted-data"), clock.clone(), TimeDelta::hours(24));
        let feed_cache = FeedCache::new(
            root.join("sessionize_cache.json"),
            clock.clone(),
            TimeDelta::minutes(60),
        );
        let run_state = RunStateStore::new(root.join("last_run_time.json"));
        let extraction_log = root.join("extraction.log");
        let extractor = Arc::new(extractor);

        let orchestrator = Orchestrator::new(
            RawFetcher::new(client.clone(), raw, TimeDelta::hours(24)),
            extractor.clone(),
            cleaned.clone(),
            FeedFetcher::new(client, &format!("{}/feed", server.uri()), feed_cache).unwrap(),
            EventLog::new(&extraction_log, clock.clone()),
            Scheduler::new(run_state.clone(), clock.clone(), TimeDelta::hours(24)),
            ExtractionSettings {
                exclude_sections: vec!["footer".into()],
                input_price_per_million: 0.15,
                output_price_per_million: 0.60,
            },
        );

        Harness {
            orchestrator,
            extractor,
            cleaned,
            run_state,
            extraction_log,
            clock,
        }
    }

    async fn mount_page(server: &MockServer, route: &str, status: u16, body: &str) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(status).set_body_string(body))
            .mount(server)
            .await;
    }

    async fn mount_feed(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/feed"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "sessions": [{"id": "1", "title": "Keynote"}],
                "speakers": [], "questions": [], "categories": [], "rooms": []
            })))
            .mount(server)
            .await;
    }

    fn urls(server: &MockServer, routes: &[&str]) -> Vec<String> {
        routes.iter().map(|r| format!("{}{r}", server.uri())).collect()
    }

    #[test]
    fn plan_extraction_cases() {
        assert_eq!(plan_extraction(None, Lookup::Miss), ExtractionPlan::SkipFetchFailed);
        assert_eq!(
            plan_extraction(None, Lookup::Hit("old".into())),
            ExtractionPlan::SkipFetchFailed
        );
        assert_eq!(
            plan_extraction(Some("raw".into()), Lookup::Hit("clean".into())),
            ExtractionPlan::UseCleaned
        );
        assert_eq!(
            plan_extraction(Some("raw".into()), Lookup::Miss),
            ExtractionPlan::Extract("raw".into())
        );
        assert_eq!(
            plan_extraction(Some("raw".into()), Lookup::ReadError("eio".into())),
            ExtractionPlan::Extract("raw".into())
        );
    }

    #[tokio::test]
    async fn full_batch_extracts_everything_and_records_run() {
        let server = MockServer::start().await;
        mount_page(&server, "/", 200, "home page").await;
        mount_page(&server, "/talks", 200, "talks page").await;
        mount_page(&server, "/faq", 200, "faq page").await;
        mount_feed(&server).await;

        let tmp = tempfile::tempdir().unwrap();
        let h = harness(tmp.path(), &server, FakeExtractor::default());
        let pages = urls(&server, &["/", "/talks"]);
        let faq = format!("{}/faq", server.uri());

        let report = h.orchestrator.run_batch(&pages, &faq, &SilentProgress).await.unwrap();

        assert_eq!(report.extracted(), 3);
        assert!(report.feed_refreshed);
        assert_eq!(report.urls[2].kind, ExtractionKind::Faq);
        assert_eq!(h.cleaned.get(&pages[1]).await, Lookup::Hit("TALKS PAGE".into()));
        assert_eq!(h.cleaned.get(&faq).await, Lookup::Hit("FAQ: faq page".into()));
        assert_eq!(h.run_state.load().await.map(|t| t.timestamp_millis()), Some(h.clock.now().timestamp_millis()));

        let log = std::fs::read_to_string(&h.extraction_log).unwrap();
        assert_eq!(log.lines().count(), 3);
        assert!(log.contains(r#""kind":"faq""#));
    }

    #[tokio::test]
    async fn second_run_makes_no_extraction_calls() {
        let server = MockServer::start().await;
        mount_page(&server, "/", 200, "home page").await;
        mount_page(&server, "/faq", 200, "faq page").await;
        mount_feed(&server).await;

        let tmp = tempfile::tempdir().unwrap();
        let h = harness(tmp.path(), &server, FakeExtractor::default());
        let pages = urls(&server, &["/"]);
        let faq = format!("{}/faq", server.uri());

        h.orchestrator.run_batch(&pages, &faq, &SilentProgress).await.unwrap();
        let before = h.cleaned.get_all().await;
        assert_eq!(h.extractor.calls(), 2);

        let report = h.orchestrator.run_batch(&pages, &faq, &SilentProgress).await.unwrap();
        assert_eq!(report.fresh(), 2);
        assert_eq!(report.extracted(), 0);
        assert_eq!(h.extractor.calls(), 2);
        assert_eq!(h.cleaned.get_all().await, before);
    }

    #[tokio::test]
    async fn expired_cleaned_content_is_re_extracted() {
        let server = MockServer::start().await;
        mount_page(&server, "/", 200, "home page").await;
        mount_page(&server, "/faq", 200, "faq page").await;
        mount_feed(&server).await;

        let tmp = tempfile::tempdir().unwrap();
        let h = harness(tmp.path(), &server, FakeExtractor::default());
        let pages = urls(&server, &["/"]);
        let faq = format!("{}/faq", server.uri());

        h.orchestrator.run_batch(&pages, &faq, &SilentProgress).await.unwrap();
        h.clock.advance(TimeDelta::hours(25));

        let report = h.orchestrator.run_batch(&pages, &faq, &SilentProgress).await.unwrap();
        assert_eq!(report.extracted(), 2);
        assert_eq!(h.extractor.calls(), 4);
    }

    #[tokio::test]
    async fn one_failing_url_does_not_stop_the_batch() {
        let server = MockServer::start().await;
        mount_page(&server, "/a", 200, "page a").await;
        mount_page(&server, "/b", 404, "gone").await;
        mount_page(&server, "/c", 200, "page c").await;
        mount_page(&server, "/d", 200, "poison").await;
        mount_page(&server, "/faq", 200, "faq page").await;
        mount_feed(&server).await;

        let tmp = tempfile::tempdir().unwrap();
        let h = harness(tmp.path(), &server, FakeExtractor::failing_on(&["poison"]));
        let pages = urls(&server, &["/a", "/b", "/c", "/d"]);
        let faq = format!("{}/faq", server.uri());

        let report = h.orchestrator.run_batch(&pages, &faq, &SilentProgress).await.unwrap();

        let outcomes: Vec<_> = report.urls.iter().map(|u| u.outcome.clone()).collect();
        assert_eq!(outcomes[0], UrlOutcome::Extracted);
        assert_eq!(outcomes[1], UrlOutcome::FetchFailed);
        assert_eq!(outcomes[2], UrlOutcome::Extracted);
        assert!(matches!(&outcomes[3], UrlOutcome::ExtractFailed(reason) if reason.contains("HTTP 500")));
        assert_eq!(outcomes[4], UrlOutcome::Extracted);

        // Failed extraction leaves no cleaned file behind.
        assert_eq!(h.cleaned.get(&pages[3]).await, Lookup::Miss);
        assert!(h.run_state.load().await.is_some());
    }

    #[tokio::test]
    async fn feed_failure_is_soft() {
        let server = MockServer::start().await;
        mount_page(&server, "/", 200, "home page").await;
        mount_page(&server, "/faq", 200, "faq page").await;
        mount_page(&server, "/feed", 500, "down").await;

        let tmp = tempfile::tempdir().unwrap();
        let h = harness(tmp.path(), &server, FakeExtractor::default());
        let report = h
            .orchestrator
            .run_batch(&urls(&server, &["/"]), &format!("{}/faq", server.uri()), &SilentProgress)
            .await
            .unwrap();

        assert!(!report.feed_refreshed);
        assert!(h.run_state.load().await.is_some());
    }

    #[tokio::test]
    async fn storage_failure_aborts_without_recording_run() {
        let server = MockServer::start().await;
        mount_page(&server, "/", 200, "home page").await;
        mount_page(&server, "/faq", 200, "faq page").await;
        mount_feed(&server).await;

        let tmp = tempfile::tempdir().unwrap();
        let h = harness(tmp.path(), &server, FakeExtractor::default());
        // A regular file where the cleaned directory should be.
        std::fs::write(tmp.path().join("extracted-data"), "not a directory").unwrap();

        let result = h
            .orchestrator
            .run_batch(&urls(&server, &["/"]), &format!("{}/faq", server.uri()), &SilentProgress)
            .await;

        assert!(result.is_err());
        assert!(h.run_state.load().await.is_none());
        assert!(h.orchestrator.scheduler().is_due().await);
    }

    #[tokio::test]
    async fn run_daily_skips_when_not_due() {
        let server = MockServer::start().await;
        mount_page(&server, "/", 200, "home page").await;
        mount_page(&server, "/faq", 200, "faq page").await;
        mount_feed(&server).await;

        let tmp = tempfile::tempdir().unwrap();
        let h = harness(tmp.path(), &server, FakeExtractor::default());
        let pages = urls(&server, &["/"]);
        let faq = format!("{}/faq", server.uri());

        let first = h.orchestrator.run_daily(&pages, &faq, false, &SilentProgress).await.unwrap();
        assert!(matches!(first, DailyOutcome::Completed(_)));

        let second = h.orchestrator.run_daily(&pages, &faq, false, &SilentProgress).await.unwrap();
        assert!(matches!(second, DailyOutcome::Skipped));

        let forced = h.orchestrator.run_daily(&pages, &faq, true, &SilentProgress).await.unwrap();
        assert!(matches!(forced, DailyOutcome::Completed(ref r) if r.fresh() == 2));

        h.clock.advance(TimeDelta::hours(24));
        let next_day = h.orchestrator.run_daily(&pages, &faq, false, &SilentProgress).await.unwrap();
        assert!(matches!(next_day, DailyOutcome::Completed(_)));
    }
}
