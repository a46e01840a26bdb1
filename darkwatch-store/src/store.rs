//! Persistence capability used by the scan pipeline

use chrono::{DateTime, Utc};
use thiserror::Error;

use darkwatch_core::{
    ContentSnapshot, Entity, LinkRelationship, NodeRecord, SharedEntityLink, Target, TargetSource,
    TargetStatus,
};

/// Maximum rows returned by operator listing queries
pub const LISTING_LIMIT: i64 = 100;

/// Errors from the persistence layer
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Corrupt row: {0}")]
    Corrupt(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Store task failed: {0}")]
    Task(String),
}

/// Single-row persistence operations. No operation spans a transaction
/// visible to callers; concurrent status writes are last-write-wins.
pub trait Store: Send + Sync {
    /// Insert a target if its URL is unknown; returns the stored row either way
    fn upsert_target(&self, url: &str, source: TargetSource) -> Result<Target, StoreError>;

    /// Set the status and stamp `last_scanned_at`
    fn update_target_status(&self, id: i64, status: TargetStatus) -> Result<(), StoreError>;

    fn get_target(&self, id: i64) -> Result<Option<Target>, StoreError>;

    fn get_target_by_url(&self, url: &str) -> Result<Option<Target>, StoreError>;

    fn all_targets(&self) -> Result<Vec<Target>, StoreError>;

    /// Returns false when no such target existed
    fn delete_target(&self, id: i64) -> Result<bool, StoreError>;

    /// Persist snapshot fields (not entities); returns the new row id
    fn append_snapshot(&self, snapshot: &ContentSnapshot) -> Result<i64, StoreError>;

    /// Attach entities to a snapshot; duplicates by (type, value) are ignored
    fn append_entities(&self, snapshot_id: i64, entities: &[Entity]) -> Result<(), StoreError>;

    /// Most recent snapshot for `url` captured at or before `before`, with entities
    fn latest_snapshot_before(
        &self,
        url: &str,
        before: DateTime<Utc>,
    ) -> Result<Option<ContentSnapshot>, StoreError>;

    /// Record a hyperlink edge. Returns false for self-links and known pairs.
    fn append_relationship(&self, source: &str, target: &str) -> Result<bool, StoreError>;

    /// One record per distinct source URL from its latest snapshot
    fn graph_nodes(&self) -> Result<Vec<NodeRecord>, StoreError>;

    fn graph_links(&self) -> Result<Vec<LinkRelationship>, StoreError>;

    /// Source pairs whose latest snapshots share an identical entity,
    /// each pair reported once per entity type with `source_a < source_b`
    fn shared_entity_links(&self) -> Result<Vec<SharedEntityLink>, StoreError>;

    /// Snapshots captured at or after `since`, newest first
    fn recent_snapshots(&self, since: DateTime<Utc>) -> Result<Vec<ContentSnapshot>, StoreError>;

    /// Case-insensitive substring search over URL, title, body and findings
    fn search_snapshots(&self, query: &str) -> Result<Vec<ContentSnapshot>, StoreError>;
}
