//! Scan Orchestrator
//!
//! Drives one target through the scan state machine:
//!
//! ```text
//! Pending -> Scanning... -> Online | Failed | DB Error
//!         -> Deep Scanning... -> Online (Deep Scanned) | Failed | DB Error
//! ```
//!
//! Three entry points share the same fetch/analyze/persist core:
//! - [`Scanner::scan_target`]: manual scan, no reputation, diffing or alerts
//! - [`Scanner::deep_scan`]: manual scan plus one hop over discovered links
//! - [`Scanner::scan_target_with_diff`]: the scheduled task with URL
//!   reputation, diffing, alerting and a politeness delay
//!
//! Only fetch and persistence failures change a target's status. Reputation
//! and delivery failures are logged at their boundary.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use darkwatch_core::{
    analyze, content_hash, detect_new, extract_links, ContentSnapshot, RuleStore, Target,
    TargetStatus,
};
use darkwatch_intel::AlertDispatcher;
use darkwatch_store::{Store, StoreError};
use darkwatch_tor::{normalize_whitespace, FetchError, FetchMode, FetchedPage, Fetcher};

const SUB_TITLE_PREFIX: &str = "[SUB] ";
const SUB_CATEGORY_SUFFIX: &str = " (DeepScan)";

/// Errors that end a scan and decide the target's status
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("Persistence failed: {0}")]
    Persistence(#[from] StoreError),
}

impl ScanError {
    pub fn status(&self) -> TargetStatus {
        match self {
            ScanError::Fetch(_) => TargetStatus::Failed,
            ScanError::Persistence(_) => TargetStatus::DbError,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Pause after each scheduled per-target task
    pub politeness_delay: Duration,
    /// Discovered links fetched per deep scan
    pub deep_scan_links: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            politeness_delay: Duration::from_secs(10),
            deep_scan_links: 5,
        }
    }
}

/// Outcome counts for one full-fleet cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub scanned: usize,
    pub online: usize,
    pub failed: usize,
    pub db_errors: usize,
}

impl CycleSummary {
    fn record(&mut self, status: TargetStatus) {
        self.scanned += 1;
        match status {
            TargetStatus::Online | TargetStatus::OnlineDeepScanned => self.online += 1,
            TargetStatus::Failed => self.failed += 1,
            TargetStatus::DbError => self.db_errors += 1,
            _ => {}
        }
    }
}

/// Turn a fetched page into an analyzed, unpersisted snapshot.
///
/// The page is scored with its own title; the URL-based fallback title is
/// applied afterwards so the address itself never contributes to the score.
pub fn build_snapshot(
    rules: &RuleStore,
    page: FetchedPage,
    captured_at: DateTime<Utc>,
) -> ContentSnapshot {
    let content = normalize_whitespace(&page.html);
    let analysis = analyze(rules, &content, &page.title);

    let title = if page.title.trim().is_empty() {
        format!("Tor Onion site: {}", page.url)
    } else {
        page.title
    };

    let source_name = url::Url::parse(&page.url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| page.url.clone());

    ContentSnapshot {
        id: None,
        source_name,
        source_url: page.url,
        content_hash: content_hash(&content),
        title,
        content,
        captured_at,
        score: analysis.score,
        category: analysis.category.as_str().to_string(),
        findings: analysis.findings,
        screenshot: page.screenshot.map(|bytes| STANDARD.encode(bytes)),
        entities: analysis.entities,
    }
}

/// Runs scans against shared fetcher, store, rules and alerting
#[derive(Clone)]
pub struct Scanner {
    fetcher: Arc<dyn Fetcher>,
    store: Arc<dyn Store>,
    rules: Arc<RuleStore>,
    alerts: AlertDispatcher,
    config: ScanConfig,
}

impl Scanner {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        store: Arc<dyn Store>,
        rules: Arc<RuleStore>,
        alerts: AlertDispatcher,
        config: ScanConfig,
    ) -> Self {
        Self {
            fetcher,
            store,
            rules,
            alerts,
            config,
        }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Run a store call on the blocking pool, off the runtime workers
    async fn with_store<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        F: FnOnce(&dyn Store) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || op(store.as_ref()))
            .await
            .map_err(|e| StoreError::Task(e.to_string()))?
    }

    /// Status writes are advisory; a failed write is logged, never retried
    fn set_status_now(&self, target: &Target, status: TargetStatus) {
        if let Err(e) = self.store.update_target_status(target.id, status) {
            error!(url = %target.url, "Failed to set status {}: {}", status, e);
        }
    }

    async fn set_status(&self, target: &Target, status: TargetStatus) {
        let id = target.id;
        let result = self
            .with_store(move |store| store.update_target_status(id, status))
            .await;
        if let Err(e) = result {
            error!(url = %target.url, "Failed to set status {}: {}", status, e);
        }
    }

    async fn capture(&self, url: &str) -> Result<ContentSnapshot, FetchError> {
        let page = self.fetcher.fetch(url, FetchMode::Full).await?;
        Ok(build_snapshot(&self.rules, page, Utc::now()))
    }

    /// Persist the snapshot, then its entities. Entities are skipped when
    /// the snapshot write fails.
    async fn persist(&self, mut snapshot: ContentSnapshot) -> Result<ContentSnapshot, StoreError> {
        self.with_store(move |store| {
            let id = store.append_snapshot(&snapshot)?;
            snapshot.id = Some(id);
            store.append_entities(id, &snapshot.entities)?;
            debug!(
                "Saved snapshot {} with {} entities",
                id,
                snapshot.entities.len()
            );
            Ok(snapshot)
        })
        .await
    }

    async fn fetch_and_persist(&self, target: &Target) -> Result<ContentSnapshot, ScanError> {
        let snapshot = self.capture(&target.url).await?;
        Ok(self.persist(snapshot).await?)
    }

    async fn conclude(
        &self,
        target: &Target,
        result: Result<(), ScanError>,
        success: TargetStatus,
    ) -> TargetStatus {
        let status = match result {
            Ok(()) => success,
            Err(e) => {
                warn!(url = %target.url, "Scan failed: {}", e);
                e.status()
            }
        };
        self.set_status(target, status).await;
        status
    }

    async fn run_scan(&self, target: &Target) -> TargetStatus {
        let result = self.fetch_and_persist(target).await.map(|snapshot| {
            info!(
                url = %target.url,
                score = snapshot.score,
                "Scan complete: {}",
                snapshot.category
            );
        });
        self.conclude(target, result, TargetStatus::Online).await
    }

    /// Manual single-target scan: fetch, analyze, persist
    pub async fn scan_target(&self, target: &Target) -> TargetStatus {
        info!(url = %target.url, "Manual scan started");
        self.set_status(target, TargetStatus::Scanning).await;
        self.run_scan(target).await
    }

    /// Mark the target as scanning now and run the scan detached
    pub fn spawn_scan(&self, target: Target) -> JoinHandle<TargetStatus> {
        self.set_status_now(&target, TargetStatus::Scanning);
        let scanner = self.clone();
        tokio::spawn(async move { scanner.run_scan(&target).await })
    }

    /// Fetch up to `deep_scan_links` discovered links as sub-snapshots.
    /// Failures are logged and skipped.
    async fn scan_sub_links(&self, links: &[String]) {
        let selected = &links[..links.len().min(self.config.deep_scan_links)];
        info!(
            "Deep scan found {} links, scanning top {}",
            links.len(),
            selected.len()
        );

        for link in selected {
            match self.capture(link).await {
                Ok(mut sub) => {
                    sub.title = format!("{}{}", SUB_TITLE_PREFIX, sub.title);
                    sub.category.push_str(SUB_CATEGORY_SUFFIX);
                    if let Err(e) = self.persist(sub).await {
                        warn!(url = %link, "Sub-snapshot save failed: {}", e);
                    }
                }
                Err(e) => warn!(url = %link, "Sub-link fetch failed: {}", e),
            }
        }
    }

    async fn record_relationships(&self, source: &str, links: &[String]) {
        let source = source.to_string();
        let links = links.to_vec();
        let result = self
            .with_store(move |store| {
                for link in &links {
                    if let Err(e) = store.append_relationship(&source, link) {
                        warn!("Relationship save error: {}", e);
                    }
                }
                Ok(())
            })
            .await;
        if let Err(e) = result {
            warn!("Relationship save error: {}", e);
        }
    }

    async fn run_deep_scan(&self, target: &Target) -> TargetStatus {
        let snapshot = match self.fetch_and_persist(target).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                return self
                    .conclude(target, Err(e), TargetStatus::OnlineDeepScanned)
                    .await
            }
        };

        let links = extract_links(&snapshot.content, &target.url);
        self.record_relationships(&target.url, &links).await;

        self.scan_sub_links(&links).await;
        info!(url = %target.url, "Deep scan finished");
        self.conclude(target, Ok(()), TargetStatus::OnlineDeepScanned)
            .await
    }

    /// Manual scan plus one hop over discovered same-site links
    pub async fn deep_scan(&self, target: &Target) -> TargetStatus {
        info!(url = %target.url, "Deep scan started");
        self.set_status(target, TargetStatus::DeepScanning).await;
        self.run_deep_scan(target).await
    }

    /// Mark the target as deep scanning now and run the deep scan detached
    pub fn spawn_deep_scan(&self, target: Target) -> JoinHandle<TargetStatus> {
        self.set_status_now(&target, TargetStatus::DeepScanning);
        let scanner = self.clone();
        tokio::spawn(async move { scanner.run_deep_scan(&target).await })
    }

    async fn previous_snapshot(
        &self,
        url: &str,
        before: DateTime<Utc>,
    ) -> Option<ContentSnapshot> {
        let key = url.to_string();
        match self
            .with_store(move |store| store.latest_snapshot_before(&key, before))
            .await
        {
            Ok(previous) => previous,
            Err(e) => {
                warn!(url = %url, "Previous snapshot lookup failed: {}", e);
                None
            }
        }
    }

    /// Scheduled per-target task: reputation, fetch, diff, alert, persist
    pub async fn scan_target_with_diff(&self, target: &Target) -> TargetStatus {
        let url = target.url.as_str();

        let verdict = self.alerts.check_target(url).await;
        if verdict.is_malicious() {
            warn!(
                url = %url,
                "Target URL flagged malicious by {} engines",
                verdict.malicious
            );
            if let Err(e) = self.alerts.alert_malicious_domain(url, &verdict).await {
                warn!(url = %url, "Malicious domain alert failed: {}", e);
            }
        } else {
            debug!(url = %url, "Target reputation: {}", verdict.summary);
        }

        self.set_status(target, TargetStatus::Scanning).await;

        let mut snapshot = match self.capture(url).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                return self
                    .conclude(target, Err(e.into()), TargetStatus::Online)
                    .await
            }
        };

        let changes = match self.previous_snapshot(url, snapshot.captured_at).await {
            Some(prev) => {
                if prev.content_hash == snapshot.content_hash {
                    debug!(url = %url, "Content unchanged since last scan");
                }
                detect_new(&snapshot.entities, &prev.entities)
            }
            None => Vec::new(),
        };
        for change in &changes {
            info!(url = %url, "New entity: [{}] {}", change.entity_type, change.value);
        }

        match self
            .alerts
            .maybe_alert(url, &mut snapshot, &changes, &verdict)
            .await
        {
            Ok(true) => info!(url = %url, "Alert sent"),
            Ok(false) => {}
            Err(e) => warn!(url = %url, "Alert delivery failed: {}", e),
        }

        let result = self
            .persist(snapshot)
            .await
            .map(|_| ())
            .map_err(ScanError::from);
        let status = self.conclude(target, result, TargetStatus::Online).await;

        tokio::time::sleep(self.config.politeness_delay).await;
        status
    }

    /// Scan every target concurrently and wait for all of them
    pub async fn scan_all(&self) -> CycleSummary {
        let targets = match self.with_store(|store| store.all_targets()).await {
            Ok(targets) => targets,
            Err(e) => {
                error!("Failed to load targets: {}", e);
                return CycleSummary::default();
            }
        };

        if targets.is_empty() {
            info!("No targets to scan");
            return CycleSummary::default();
        }

        info!("Starting scan of {} targets", targets.len());

        let handles = targets.into_iter().map(|target| {
            let scanner = self.clone();
            tokio::spawn(async move { scanner.scan_target_with_diff(&target).await })
        });

        let mut summary = CycleSummary::default();
        for result in join_all(handles).await {
            match result {
                Ok(status) => summary.record(status),
                Err(e) => error!("Scan task panicked: {}", e),
            }
        }

        info!(
            "Scan cycle completed: {} online, {} failed, {} db errors",
            summary.online, summary.failed, summary.db_errors
        );
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{harness, harness_with_store, CannedFetcher, FailingStore, StubReputation};
    use std::sync::atomic::Ordering;
    use darkwatch_core::{EntityType, TargetSource};

    const BASE: &str = "http://marketabc.onion/";

    fn page(title: &str, body: &str) -> String {
        format!(
            "<html><head><title>{}</title></head><body>{}</body></html>",
            title, body
        )
    }

    fn add_target(store: &dyn Store, url: &str) -> Target {
        store.upsert_target(url, TargetSource::Manual).unwrap()
    }

    #[test]
    fn test_build_snapshot_fallbacks() {
        let rules = RuleStore::fallback();
        let fetched = FetchedPage {
            url: BASE.to_string(),
            title: "  ".to_string(),
            html: "<html>\n  <body>  contact   ops@market.io </body></html>".to_string(),
            screenshot: Some(vec![1, 2, 3]),
        };

        let snap = build_snapshot(&rules, fetched, Utc::now());

        assert_eq!(snap.title, format!("Tor Onion site: {}", BASE));
        assert_eq!(snap.source_name, "marketabc.onion");
        assert_eq!(snap.content, "<html> <body> contact ops@market.io </body></html>");
        assert_eq!(snap.screenshot.as_deref(), Some("AQID"));
        assert_eq!(snap.content_hash, content_hash(&snap.content));
        assert_eq!(snap.score, 4);
        assert_eq!(snap.entities.len(), 1);
    }

    #[test]
    fn test_fallback_title_is_not_scored() {
        let rules = RuleStore::fallback();
        let url = "http://ransomware-news.onion/";
        let fetched = FetchedPage {
            url: url.to_string(),
            title: String::new(),
            html: "<html><body>hello</body></html>".to_string(),
            screenshot: None,
        };

        let snap = build_snapshot(&rules, fetched, Utc::now());

        assert_eq!(snap.title, format!("Tor Onion site: {}", url));
        assert_eq!(snap.score, 1);
        assert_eq!(snap.category, "General Info");
        assert!(snap.screenshot.is_none());
    }

    #[tokio::test]
    async fn test_manual_scan_persists_and_marks_online() {
        let h = harness(
            CannedFetcher::default().with_page(BASE, &page("Garden", "ssn lists ops@market.io")),
            StubReputation::default(),
        );
        let target = add_target(h.store.as_ref(), BASE);

        let status = h.scanner.scan_target(&target).await;

        assert_eq!(status, TargetStatus::Online);
        let stored = h.store.get_target(target.id).unwrap().unwrap();
        assert_eq!(stored.status, TargetStatus::Online);

        let snap = h
            .store
            .latest_snapshot_before(BASE, Utc::now())
            .unwrap()
            .unwrap();
        assert_eq!(snap.score, 10);
        assert_eq!(snap.category, "Critical Threat");
        assert_eq!(snap.entities[0].entity_type, EntityType::Email);
        // Manual scans never alert
        assert!(h.notifier.sent.lock().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_failure_marks_failed_without_snapshot() {
        let h = harness(CannedFetcher::default(), StubReputation::default());
        let target = add_target(h.store.as_ref(), BASE);

        let status = h.scanner.scan_target(&target).await;

        assert_eq!(status, TargetStatus::Failed);
        assert_eq!(
            h.store.get_target(target.id).unwrap().unwrap().status,
            TargetStatus::Failed
        );
        assert!(h
            .store
            .latest_snapshot_before(BASE, Utc::now())
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_spawned_scan_marks_scanning_first() {
        let h = harness(
            CannedFetcher::default().with_page(BASE, &page("Garden", "hello")),
            StubReputation::default(),
        );
        let target = add_target(h.store.as_ref(), BASE);

        let handle = h.scanner.spawn_scan(target.clone());
        // Status is set before the task runs on this single-threaded runtime
        assert_eq!(
            h.store.get_target(target.id).unwrap().unwrap().status,
            TargetStatus::Scanning
        );

        assert_eq!(handle.await.unwrap(), TargetStatus::Online);
    }

    #[tokio::test]
    async fn test_store_failure_marks_db_error() {
        let h = harness_with_store(
            CannedFetcher::default().with_page(BASE, &page("Garden", "ops@market.io")),
            StubReputation::default(),
            FailingStore::default(),
        );
        let target = add_target(h.store.as_ref(), BASE);

        let status = h.scanner.scan_target(&target).await;

        assert_eq!(status, TargetStatus::DbError);
        assert_eq!(
            h.store.get_target(target.id).unwrap().unwrap().status,
            TargetStatus::DbError
        );
        assert_eq!(h.store.entity_writes.load(Ordering::SeqCst), 0);
        assert!(h
            .store
            .latest_snapshot_before(BASE, Utc::now())
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_scheduled_store_failure_still_alerts() {
        let h = harness_with_store(
            CannedFetcher::default().with_page(BASE, &page("Garden", "site was hacked")),
            StubReputation::default(),
            FailingStore::default(),
        );
        let target = add_target(h.store.as_ref(), BASE);

        let status = h.scanner.scan_target_with_diff(&target).await;

        assert_eq!(status, TargetStatus::DbError);
        assert_eq!(h.store.entity_writes.load(Ordering::SeqCst), 0);
        // Alerting runs before persistence and is unaffected by it
        assert_eq!(h.notifier.sent.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_scan_all_counts_db_errors() {
        let h = harness_with_store(
            CannedFetcher::default()
                .with_page("http://a.onion/", &page("A", "hello"))
                .with_page("http://b.onion/", &page("B", "hello")),
            StubReputation::default(),
            FailingStore::default(),
        );
        add_target(h.store.as_ref(), "http://a.onion/");
        add_target(h.store.as_ref(), "http://b.onion/");
        add_target(h.store.as_ref(), "http://down.onion/");

        let summary = h.scanner.scan_all().await;

        assert_eq!(
            summary,
            CycleSummary {
                scanned: 3,
                online: 0,
                failed: 1,
                db_errors: 2,
            }
        );
    }

    #[tokio::test]
    async fn test_spawned_deep_scan_marks_deep_scanning_first() {
        let h = harness(
            CannedFetcher::default().with_page(BASE, &page("Index", "no links")),
            StubReputation::default(),
        );
        let target = add_target(h.store.as_ref(), BASE);

        let handle = h.scanner.spawn_deep_scan(target.clone());
        assert_eq!(
            h.store.get_target(target.id).unwrap().unwrap().status,
            TargetStatus::DeepScanning
        );

        assert_eq!(handle.await.unwrap(), TargetStatus::OnlineDeepScanned);
        assert_eq!(
            h.store.get_target(target.id).unwrap().unwrap().status,
            TargetStatus::OnlineDeepScanned
        );
    }

    #[tokio::test]
    async fn test_high_score_alerts_without_previous_snapshot() {
        let h = harness(
            CannedFetcher::default().with_page(BASE, &page("Garden", "this site was hacked")),
            StubReputation::default(),
        );
        let target = add_target(h.store.as_ref(), BASE);

        let status = h.scanner.scan_target_with_diff(&target).await;

        assert_eq!(status, TargetStatus::Online);
        let sent = h.notifier.sent.lock();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("**Risk Score:** 7/10"));
        assert!(sent[0].contains("**New Entities:** 0"));
    }

    #[tokio::test]
    async fn test_deep_scan_records_links_and_sub_snapshots() {
        let links: String = (1..=7)
            .map(|i| format!(r#"<a href="/page{}">p{}</a>"#, i, i))
            .collect();
        let mut fetcher = CannedFetcher::default()
            .with_page(BASE, &page("Index", &format!("{}<a href=\"http://other.onion/\">x</a>", links)));
        for i in 1..=4 {
            fetcher = fetcher.with_page(
                &format!("{}page{}", BASE, i),
                &page(&format!("Page {}", i), "hello"),
            );
        }
        // page5 is missing: its fetch fails and is skipped

        let h = harness(fetcher, StubReputation::default());
        let target = add_target(h.store.as_ref(), BASE);

        let status = h.scanner.deep_scan(&target).await;

        assert_eq!(status, TargetStatus::OnlineDeepScanned);
        assert_eq!(h.store.graph_links().unwrap().len(), 7);
        // Main page plus five sub-link attempts
        assert_eq!(h.fetcher.calls(), 6);

        let sub = h
            .store
            .latest_snapshot_before(&format!("{}page2", BASE), Utc::now())
            .unwrap()
            .unwrap();
        assert_eq!(sub.title, "[SUB] Page 2");
        assert_eq!(sub.category, "General Info (DeepScan)");

        assert!(h
            .store
            .latest_snapshot_before(&format!("{}page6", BASE), Utc::now())
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_deep_scan_fetch_failure() {
        let h = harness(CannedFetcher::default(), StubReputation::default());
        let target = add_target(h.store.as_ref(), BASE);

        assert_eq!(h.scanner.deep_scan(&target).await, TargetStatus::Failed);
        assert!(h.store.graph_links().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_malicious_url_forces_max_severity_and_alerts() {
        let h = harness(
            CannedFetcher::default().with_page(BASE, &page("Garden", "hello")),
            StubReputation::default().flag(BASE, 4),
        );
        let target = add_target(h.store.as_ref(), BASE);

        let status = h.scanner.scan_target_with_diff(&target).await;

        assert_eq!(status, TargetStatus::Online);
        let snap = h
            .store
            .latest_snapshot_before(BASE, Utc::now())
            .unwrap()
            .unwrap();
        assert_eq!(snap.score, 10);
        assert_eq!(snap.category, "Known Malicious Site");

        let sent = h.notifier.sent.lock();
        // Immediate domain alert plus the composite report
        assert_eq!(sent.len(), 2);
        assert!(sent[0].contains("(MALICIOUS DOMAIN DETECTED)"));
        assert!(sent[1].contains("**Risk Score:** 10/10"));
    }

    #[tokio::test]
    async fn test_diff_alerts_only_on_new_entities() {
        let fetcher = CannedFetcher::default()
            .with_page(BASE, &page("Garden", "mirror at 203.0.113.7"));
        let h = harness(fetcher, StubReputation::default().flag("198.51.100.9", 3));
        let target = add_target(h.store.as_ref(), BASE);

        // First scan: low score, no previous snapshot, no alert
        h.scanner.scan_target_with_diff(&target).await;
        assert!(h.notifier.sent.lock().is_empty());

        // Same entities again: nothing new
        h.scanner.scan_target_with_diff(&target).await;
        assert!(h.notifier.sent.lock().is_empty());

        // A new IP appears and the old one disappears
        h.fetcher
            .set_page(BASE, &page("Garden", "mirror moved to 198.51.100.9"));
        let status = h.scanner.scan_target_with_diff(&target).await;

        assert_eq!(status, TargetStatus::Online);
        let sent = h.notifier.sent.lock();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("**New Entities:** 1"));
        assert!(sent[0].contains("🚫 **Malicious IP:** 198.51.100.9"));
        assert!(!sent[0].contains("203.0.113.7"));
    }

    #[tokio::test]
    async fn test_scheduled_fetch_failure() {
        let h = harness(CannedFetcher::default(), StubReputation::default());
        let target = add_target(h.store.as_ref(), BASE);

        assert_eq!(
            h.scanner.scan_target_with_diff(&target).await,
            TargetStatus::Failed
        );
        assert!(h.notifier.sent.lock().is_empty());
    }

    #[tokio::test]
    async fn test_scan_all_fans_out() {
        let fetcher = CannedFetcher::default()
            .with_page("http://a.onion/", &page("A", "hello"))
            .with_page("http://b.onion/", &page("B", "hello"));
        let h = harness(fetcher, StubReputation::default());
        add_target(h.store.as_ref(), "http://a.onion/");
        add_target(h.store.as_ref(), "http://b.onion/");
        add_target(h.store.as_ref(), "http://down.onion/");

        let summary = h.scanner.scan_all().await;

        assert_eq!(
            summary,
            CycleSummary {
                scanned: 3,
                online: 2,
                failed: 1,
                db_errors: 0,
            }
        );
        assert_eq!(h.fetcher.calls(), 3);
    }

    #[tokio::test]
    async fn test_scan_all_without_targets() {
        let h = harness(CannedFetcher::default(), StubReputation::default());
        assert_eq!(h.scanner.scan_all().await, CycleSummary::default());
    }
}
