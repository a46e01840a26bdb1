//! Test doubles for the scan pipeline

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use darkwatch_core::{
    ContentSnapshot, Entity, LinkRelationship, NodeRecord, RuleStore, SharedEntityLink, Target,
    TargetSource, TargetStatus,
};
use darkwatch_intel::{
    AlertDispatcher, AlertError, LookupKind, Notifier, ReputationError, ReputationReport,
    ReputationSource,
};
use darkwatch_store::{SqliteStore, Store, StoreError};
use darkwatch_tor::{extract_title, FetchError, FetchMode, FetchedPage, Fetcher};

use crate::{ScanConfig, Scanner};

/// Serves canned HTML per URL; unknown URLs fail navigation
#[derive(Default)]
pub struct CannedFetcher {
    pages: Mutex<HashMap<String, String>>,
    calls: AtomicUsize,
}

impl CannedFetcher {
    pub fn with_page(self, url: &str, html: &str) -> Self {
        self.pages.lock().insert(url.to_string(), html.to_string());
        self
    }

    pub fn set_page(&self, url: &str, html: &str) {
        self.pages.lock().insert(url.to_string(), html.to_string());
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for CannedFetcher {
    async fn fetch(&self, url: &str, _mode: FetchMode) -> Result<FetchedPage, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let html = self.pages.lock().get(url).cloned();
        match html {
            Some(html) => Ok(FetchedPage {
                url: url.to_string(),
                title: extract_title(&html),
                html,
                screenshot: Some(vec![0x89, b'P', b'N', b'G']),
            }),
            None => Err(FetchError::Navigation {
                url: url.to_string(),
                reason: "net::ERR_NAME_NOT_RESOLVED".to_string(),
            }),
        }
    }
}

/// Flags listed URLs and IPs as malicious, everything else clean
#[derive(Default)]
pub struct StubReputation {
    pub malicious: HashMap<String, u32>,
}

impl StubReputation {
    pub fn flag(mut self, value: &str, engines: u32) -> Self {
        self.malicious.insert(value.to_string(), engines);
        self
    }
}

#[async_trait]
impl ReputationSource for StubReputation {
    async fn check(
        &self,
        _kind: LookupKind,
        value: &str,
    ) -> Result<ReputationReport, ReputationError> {
        Ok(match self.malicious.get(value) {
            Some(&n) => ReputationReport::new(format!("Flagged - Malicious: {}", n), n),
            None => ReputationReport::new("Not Found / Clean", 0),
        })
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<String>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, text: &str) -> Result<(), AlertError> {
        self.sent.lock().push(text.to_string());
        Ok(())
    }
}

/// An in-memory store whose snapshot writes always fail
pub struct FailingStore {
    pub inner: SqliteStore,
    pub entity_writes: AtomicUsize,
}

impl Default for FailingStore {
    fn default() -> Self {
        Self {
            inner: SqliteStore::in_memory().unwrap(),
            entity_writes: AtomicUsize::new(0),
        }
    }
}

impl Store for FailingStore {
    fn upsert_target(&self, url: &str, source: TargetSource) -> Result<Target, StoreError> {
        self.inner.upsert_target(url, source)
    }

    fn update_target_status(&self, id: i64, status: TargetStatus) -> Result<(), StoreError> {
        self.inner.update_target_status(id, status)
    }

    fn get_target(&self, id: i64) -> Result<Option<Target>, StoreError> {
        self.inner.get_target(id)
    }

    fn get_target_by_url(&self, url: &str) -> Result<Option<Target>, StoreError> {
        self.inner.get_target_by_url(url)
    }

    fn all_targets(&self) -> Result<Vec<Target>, StoreError> {
        self.inner.all_targets()
    }

    fn delete_target(&self, id: i64) -> Result<bool, StoreError> {
        self.inner.delete_target(id)
    }

    fn append_snapshot(&self, _snapshot: &ContentSnapshot) -> Result<i64, StoreError> {
        Err(StoreError::Corrupt("disk I/O error".to_string()))
    }

    fn append_entities(&self, snapshot_id: i64, entities: &[Entity]) -> Result<(), StoreError> {
        self.entity_writes.fetch_add(1, Ordering::SeqCst);
        self.inner.append_entities(snapshot_id, entities)
    }

    fn latest_snapshot_before(
        &self,
        url: &str,
        before: DateTime<Utc>,
    ) -> Result<Option<ContentSnapshot>, StoreError> {
        self.inner.latest_snapshot_before(url, before)
    }

    fn append_relationship(&self, source: &str, target: &str) -> Result<bool, StoreError> {
        self.inner.append_relationship(source, target)
    }

    fn graph_nodes(&self) -> Result<Vec<NodeRecord>, StoreError> {
        self.inner.graph_nodes()
    }

    fn graph_links(&self) -> Result<Vec<LinkRelationship>, StoreError> {
        self.inner.graph_links()
    }

    fn shared_entity_links(&self) -> Result<Vec<SharedEntityLink>, StoreError> {
        self.inner.shared_entity_links()
    }

    fn recent_snapshots(&self, since: DateTime<Utc>) -> Result<Vec<ContentSnapshot>, StoreError> {
        self.inner.recent_snapshots(since)
    }

    fn search_snapshots(&self, query: &str) -> Result<Vec<ContentSnapshot>, StoreError> {
        self.inner.search_snapshots(query)
    }
}

pub struct Harness<S = SqliteStore> {
    pub scanner: Scanner,
    pub fetcher: Arc<CannedFetcher>,
    pub store: Arc<S>,
    pub notifier: Arc<RecordingNotifier>,
}

/// Scanner over `store` with fallback rules and no politeness delay
pub fn harness_with_store<S: Store + 'static>(
    fetcher: CannedFetcher,
    reputation: StubReputation,
    store: S,
) -> Harness<S> {
    let fetcher = Arc::new(fetcher);
    let store = Arc::new(store);
    let notifier = Arc::new(RecordingNotifier::default());
    let alerts = AlertDispatcher::new(Arc::new(reputation), notifier.clone());
    let config = ScanConfig {
        politeness_delay: std::time::Duration::ZERO,
        deep_scan_links: 5,
    };

    let scanner = Scanner::new(
        fetcher.clone(),
        store.clone(),
        Arc::new(RuleStore::fallback()),
        alerts,
        config,
    );

    Harness {
        scanner,
        fetcher,
        store,
        notifier,
    }
}

pub fn harness(fetcher: CannedFetcher, reputation: StubReputation) -> Harness {
    harness_with_store(fetcher, reputation, SqliteStore::in_memory().unwrap())
}
