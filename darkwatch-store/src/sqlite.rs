//! SQLite-backed store

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use tracing::{debug, warn};

use darkwatch_core::{
    ContentSnapshot, Entity, EntityType, LinkRelationship, NodeRecord, SharedEntityLink, Target,
    TargetSource, TargetStatus,
};

use crate::store::{Store, StoreError, LISTING_LIMIT};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS targets (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL UNIQUE,
    source TEXT NOT NULL DEFAULT 'manual',
    status TEXT NOT NULL DEFAULT 'Pending',
    created_at INTEGER NOT NULL,
    last_scanned_at INTEGER
);

CREATE TABLE IF NOT EXISTS snapshots (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source_name TEXT NOT NULL,
    source_url TEXT NOT NULL,
    title TEXT NOT NULL,
    content TEXT NOT NULL,
    content_hash TEXT NOT NULL,
    captured_at INTEGER NOT NULL,
    score INTEGER NOT NULL CHECK(score BETWEEN 1 AND 10),
    category TEXT NOT NULL,
    findings TEXT NOT NULL,
    screenshot TEXT
);

CREATE INDEX IF NOT EXISTS idx_snapshots_url_time ON snapshots(source_url, captured_at);

CREATE TABLE IF NOT EXISTS entities (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    snapshot_id INTEGER NOT NULL,
    entity_type TEXT NOT NULL,
    entity_value TEXT NOT NULL,
    UNIQUE(snapshot_id, entity_type, entity_value),
    FOREIGN KEY(snapshot_id) REFERENCES snapshots(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_entities_value ON entities(entity_type, entity_value);

CREATE TABLE IF NOT EXISTS link_relationships (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source_url TEXT NOT NULL,
    target_url TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    UNIQUE(source_url, target_url)
);
";

/// Snapshots that are the newest for their source URL
const LATEST_SNAPSHOTS: &str = "
    SELECT s.id, s.source_url FROM snapshots s
    WHERE s.id = (
        SELECT s2.id FROM snapshots s2
        WHERE s2.source_url = s.source_url
        ORDER BY s2.captured_at DESC, s2.id DESC
        LIMIT 1
    )";

const SNAPSHOT_COLUMNS: &str = "id, source_name, source_url, title, content, content_hash, \
     captured_at, score, category, findings, screenshot";

fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| StoreError::Corrupt(format!("timestamp out of range: {}", ms)))
}

struct TargetRow {
    id: i64,
    url: String,
    source: String,
    status: String,
    created_at: i64,
    last_scanned_at: Option<i64>,
}

impl TargetRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            url: row.get(1)?,
            source: row.get(2)?,
            status: row.get(3)?,
            created_at: row.get(4)?,
            last_scanned_at: row.get(5)?,
        })
    }

    fn into_target(self) -> Result<Target, StoreError> {
        Ok(Target {
            id: self.id,
            url: self.url,
            source: self
                .source
                .parse()
                .map_err(|e| StoreError::Corrupt(format!("{}", e)))?,
            status: self
                .status
                .parse()
                .map_err(|e| StoreError::Corrupt(format!("{}", e)))?,
            created_at: from_millis(self.created_at)?,
            last_scanned_at: self.last_scanned_at.map(from_millis).transpose()?,
        })
    }
}

const TARGET_COLUMNS: &str = "id, url, source, status, created_at, last_scanned_at";

struct SnapshotRow {
    id: i64,
    source_name: String,
    source_url: String,
    title: String,
    content: String,
    content_hash: String,
    captured_at: i64,
    score: i64,
    category: String,
    findings: String,
    screenshot: Option<String>,
}

impl SnapshotRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            source_name: row.get(1)?,
            source_url: row.get(2)?,
            title: row.get(3)?,
            content: row.get(4)?,
            content_hash: row.get(5)?,
            captured_at: row.get(6)?,
            score: row.get(7)?,
            category: row.get(8)?,
            findings: row.get(9)?,
            screenshot: row.get(10)?,
        })
    }

    fn into_snapshot(self, entities: Vec<Entity>) -> Result<ContentSnapshot, StoreError> {
        let score = u8::try_from(self.score)
            .map_err(|_| StoreError::Corrupt(format!("score out of range: {}", self.score)))?;

        Ok(ContentSnapshot {
            id: Some(self.id),
            source_name: self.source_name,
            source_url: self.source_url,
            title: self.title,
            content: self.content,
            content_hash: self.content_hash,
            captured_at: from_millis(self.captured_at)?,
            score,
            category: self.category,
            findings: self.findings,
            screenshot: self.screenshot,
            entities,
        })
    }
}

fn parse_entity_type(raw: &str) -> Result<EntityType, StoreError> {
    raw.parse()
        .map_err(|e| StoreError::Corrupt(format!("{}", e)))
}

fn load_entities(conn: &Connection, snapshot_id: i64) -> Result<Vec<Entity>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT entity_type, entity_value FROM entities WHERE snapshot_id = ?1 ORDER BY id",
    )?;
    let rows = stmt
        .query_map(params![snapshot_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(t, v)| Ok(Entity::new(parse_entity_type(&t)?, v)))
        .collect()
}

fn hydrate(conn: &Connection, rows: Vec<SnapshotRow>) -> Result<Vec<ContentSnapshot>, StoreError> {
    rows.into_iter()
        .map(|row| {
            let entities = load_entities(conn, row.id)?;
            row.into_snapshot(entities)
        })
        .collect()
}

fn escape_like(query: &str) -> String {
    let mut out = String::with_capacity(query.len() + 2);
    out.push('%');
    for c in query.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('%');
    out
}

/// Store backed by a single SQLite connection
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path`
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA busy_timeout = 5000;
            PRAGMA foreign_keys = ON;
            ",
        )?;
        debug!("Opened database at {}", path.display());
        Self::with_connection(conn)
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn query_target(
        conn: &Connection,
        clause: &str,
        param: &dyn rusqlite::ToSql,
    ) -> Result<Option<Target>, StoreError> {
        let sql = format!("SELECT {} FROM targets WHERE {}", TARGET_COLUMNS, clause);
        conn.query_row(&sql, [param], TargetRow::read)
            .optional()?
            .map(TargetRow::into_target)
            .transpose()
    }
}

impl Store for SqliteStore {
    fn upsert_target(&self, url: &str, source: TargetSource) -> Result<Target, StoreError> {
        let conn = self.conn.lock();
        let inserted = conn.execute(
            "INSERT INTO targets (url, source, status, created_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(url) DO NOTHING",
            params![
                url,
                source.as_str(),
                TargetStatus::Pending.as_str(),
                to_millis(Utc::now())
            ],
        )?;
        if inserted > 0 {
            debug!("Added target {} ({})", url, source.as_str());
        }

        Self::query_target(&conn, "url = ?1", &url)?
            .ok_or_else(|| StoreError::NotFound(url.to_string()))
    }

    fn update_target_status(&self, id: i64, status: TargetStatus) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        let updated = conn.execute(
            "UPDATE targets SET status = ?1, last_scanned_at = ?2 WHERE id = ?3",
            params![status.as_str(), to_millis(Utc::now()), id],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound(format!("target {}", id)));
        }
        Ok(())
    }

    fn get_target(&self, id: i64) -> Result<Option<Target>, StoreError> {
        let conn = self.conn.lock();
        Self::query_target(&conn, "id = ?1", &id)
    }

    fn get_target_by_url(&self, url: &str) -> Result<Option<Target>, StoreError> {
        let conn = self.conn.lock();
        Self::query_target(&conn, "url = ?1", &url)
    }

    fn all_targets(&self) -> Result<Vec<Target>, StoreError> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {} FROM targets ORDER BY created_at DESC, id DESC",
            TARGET_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], TargetRow::read)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(TargetRow::into_target).collect()
    }

    fn delete_target(&self, id: i64) -> Result<bool, StoreError> {
        let conn = self.conn.lock();
        let deleted = conn.execute("DELETE FROM targets WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }

    fn append_snapshot(&self, snapshot: &ContentSnapshot) -> Result<i64, StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO snapshots (
                source_name, source_url, title, content, content_hash,
                captured_at, score, category, findings, screenshot
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                &snapshot.source_name,
                &snapshot.source_url,
                &snapshot.title,
                &snapshot.content,
                &snapshot.content_hash,
                to_millis(snapshot.captured_at),
                snapshot.score,
                &snapshot.category,
                &snapshot.findings,
                &snapshot.screenshot,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn append_entities(&self, snapshot_id: i64, entities: &[Entity]) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "INSERT OR IGNORE INTO entities (snapshot_id, entity_type, entity_value)
             VALUES (?1, ?2, ?3)",
        )?;
        for entity in entities {
            if let Err(e) = stmt.execute(params![
                snapshot_id,
                entity.entity_type.as_str(),
                &entity.value
            ]) {
                warn!("Entity save error ({}): {}", entity.entity_type, e);
                return Err(e.into());
            }
        }
        Ok(())
    }

    fn latest_snapshot_before(
        &self,
        url: &str,
        before: DateTime<Utc>,
    ) -> Result<Option<ContentSnapshot>, StoreError> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {} FROM snapshots
             WHERE source_url = ?1 AND captured_at <= ?2
             ORDER BY captured_at DESC, id DESC
             LIMIT 1",
            SNAPSHOT_COLUMNS
        );
        let row = conn
            .query_row(&sql, params![url, to_millis(before)], SnapshotRow::read)
            .optional()?;

        match row {
            Some(row) => {
                let entities = load_entities(&conn, row.id)?;
                Ok(Some(row.into_snapshot(entities)?))
            }
            None => Ok(None),
        }
    }

    fn append_relationship(&self, source: &str, target: &str) -> Result<bool, StoreError> {
        if source == target {
            return Ok(false);
        }
        let conn = self.conn.lock();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO link_relationships (source_url, target_url, created_at)
             VALUES (?1, ?2, ?3)",
            params![source, target, to_millis(Utc::now())],
        )?;
        Ok(inserted > 0)
    }

    fn graph_nodes(&self) -> Result<Vec<NodeRecord>, StoreError> {
        let conn = self.conn.lock();
        let sql = format!(
            "WITH latest AS ({})
             SELECT s.source_url, s.title, s.score, s.category
             FROM snapshots s JOIN latest l ON s.id = l.id
             ORDER BY s.source_url",
            LATEST_SNAPSHOTS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(source_url, title, score, category)| {
                let score = u8::try_from(score)
                    .map_err(|_| StoreError::Corrupt(format!("score out of range: {}", score)))?;
                Ok(NodeRecord {
                    source_url,
                    title,
                    score,
                    category,
                })
            })
            .collect()
    }

    fn graph_links(&self) -> Result<Vec<LinkRelationship>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare("SELECT source_url, target_url FROM link_relationships ORDER BY id")?;
        let links = stmt
            .query_map([], |row| {
                Ok(LinkRelationship {
                    source_url: row.get(0)?,
                    target_url: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(links)
    }

    fn shared_entity_links(&self) -> Result<Vec<SharedEntityLink>, StoreError> {
        let conn = self.conn.lock();
        let sql = format!(
            "WITH latest AS ({})
             SELECT l1.source_url, l2.source_url, e1.entity_type
             FROM entities e1
             JOIN latest l1 ON e1.snapshot_id = l1.id
             JOIN entities e2
                 ON e2.entity_type = e1.entity_type AND e2.entity_value = e1.entity_value
             JOIN latest l2 ON e2.snapshot_id = l2.id
             WHERE l1.source_url < l2.source_url
             GROUP BY l1.source_url, l2.source_url, e1.entity_type
             ORDER BY l1.source_url, l2.source_url, e1.entity_type",
            LATEST_SNAPSHOTS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(source_a, source_b, t)| {
                Ok(SharedEntityLink {
                    source_a,
                    source_b,
                    entity_type: parse_entity_type(&t)?,
                })
            })
            .collect()
    }

    fn recent_snapshots(&self, since: DateTime<Utc>) -> Result<Vec<ContentSnapshot>, StoreError> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {} FROM snapshots
             WHERE captured_at >= ?1
             ORDER BY captured_at DESC, id DESC
             LIMIT ?2",
            SNAPSHOT_COLUMNS
        );
        let rows = {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![to_millis(since), LISTING_LIMIT], SnapshotRow::read)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };
        hydrate(&conn, rows)
    }

    fn search_snapshots(&self, query: &str) -> Result<Vec<ContentSnapshot>, StoreError> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {} FROM snapshots
             WHERE source_url LIKE ?1 ESCAPE '\\'
                OR title LIKE ?1 ESCAPE '\\'
                OR content LIKE ?1 ESCAPE '\\'
                OR findings LIKE ?1 ESCAPE '\\'
             ORDER BY captured_at DESC, id DESC
             LIMIT ?2",
            SNAPSHOT_COLUMNS
        );
        let rows = {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![escape_like(query), LISTING_LIMIT], SnapshotRow::read)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };
        hydrate(&conn, rows)
    }
}
