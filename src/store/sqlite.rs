use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row};
use tracing::warn;

use crate::error::{StoreError, StoreResult};
use crate::store::{EntityPage, GraphStore};
use crate::types::{Entity, LifecycleState, Rating};

const ENTITY_COLUMNS: &str = "id, name, summary, entity_type, importance, stability, \
     lifecycle_state, decay_score, created_at, last_accessed_at, access_count, state_changed_at";

pub struct SqliteGraphStore {
    conn: Mutex<Connection>,
}

impl SqliteGraphStore {
    pub fn open(db_path: &Path) -> StoreResult<Self> {
        Self::init(Connection::open(db_path)?)
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch("
            CREATE TABLE IF NOT EXISTS entities (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                summary TEXT,
                entity_type TEXT NOT NULL DEFAULT 'Entity',
                importance INTEGER,
                stability INTEGER,
                lifecycle_state TEXT NOT NULL DEFAULT 'ACTIVE',
                decay_score REAL NOT NULL DEFAULT 0.0,
                created_at TEXT NOT NULL,
                last_accessed_at TEXT,
                access_count INTEGER NOT NULL DEFAULT 0,
                state_changed_at TEXT
            );

            CREATE INDEX IF NOT EXISTS entities_unclassified
                ON entities(id) WHERE importance IS NULL OR stability IS NULL;
        ")?;

        Ok(Self { conn: Mutex::new(conn) })
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> StoreResult<T>) -> StoreResult<T> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("sqlite lock poisoned: {}", e)))?;
        f(&conn)
    }

    fn update_one(&self, id: &str, sql: &str, params: impl rusqlite::Params) -> StoreResult<()> {
        self.with_conn(|conn| {
            let changed = conn.execute(sql, params).map_err(|e| StoreError::WriteFailure {
                id: id.to_string(),
                reason: e.to_string(),
            })?;
            if changed == 0 {
                return Err(StoreError::NotFound(id.to_string()));
            }
            Ok(())
        })
    }
}

#[async_trait]
impl GraphStore for SqliteGraphStore {
    async fn find_unclassified_entities(&self, limit: usize) -> StoreResult<Vec<Entity>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ENTITY_COLUMNS} FROM entities \
                 WHERE importance IS NULL OR stability IS NULL \
                 ORDER BY id LIMIT ?1"
            ))?;
            let rows = stmt.query_map(rusqlite::params![limit as i64], entity_from_row)?;
            let mut results = Vec::new();
            for row in rows {
                results.push(row?);
            }
            Ok(results)
        })
    }

    async fn get_all_entities(&self, cursor: Option<&str>, limit: usize) -> StoreResult<EntityPage> {
        let limit = limit.max(1);
        let mut entities = self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ENTITY_COLUMNS} FROM entities \
                 WHERE id > ?1 ORDER BY id LIMIT ?2"
            ))?;
            let rows = stmt.query_map(
                rusqlite::params![cursor.unwrap_or(""), (limit + 1) as i64],
                entity_from_row,
            )?;
            let mut results = Vec::new();
            for row in rows {
                results.push(row?);
            }
            Ok(results)
        })?;

        let next_cursor = if entities.len() > limit {
            entities.truncate(limit);
            entities.last().map(|e| e.id.clone())
        } else {
            None
        };
        Ok(EntityPage { entities, next_cursor })
    }

    async fn get_entity(&self, id: &str) -> StoreResult<Option<Entity>> {
        self.with_conn(|conn| {
            let entity = conn
                .query_row(
                    &format!("SELECT {ENTITY_COLUMNS} FROM entities WHERE id = ?1"),
                    rusqlite::params![id],
                    entity_from_row,
                )
                .optional()?;
            Ok(entity)
        })
    }

    async fn write_classification(&self, id: &str, rating: Rating) -> StoreResult<bool> {
        self.with_conn(|conn| {
            let changed = conn
                .execute(
                    "UPDATE entities SET importance = ?1, stability = ?2 \
                     WHERE id = ?3 AND (importance IS NULL OR stability IS NULL)",
                    rusqlite::params![rating.importance, rating.stability, id],
                )
                .map_err(|e| StoreError::WriteFailure {
                    id: id.to_string(),
                    reason: e.to_string(),
                })?;
            if changed > 0 {
                return Ok(true);
            }
            let exists = conn
                .query_row("SELECT 1 FROM entities WHERE id = ?1", rusqlite::params![id], |_| Ok(()))
                .optional()?;
            match exists {
                Some(()) => Ok(false),
                None => Err(StoreError::NotFound(id.to_string())),
            }
        })
    }

    async fn write_decay_and_state(
        &self,
        id: &str,
        decay_score: f64,
        state: LifecycleState,
        state_changed_at: Option<DateTime<Utc>>,
    ) -> StoreResult<()> {
        self.update_one(
            id,
            "UPDATE entities SET decay_score = ?1, lifecycle_state = ?2, \
             state_changed_at = COALESCE(?3, state_changed_at) WHERE id = ?4",
            rusqlite::params![
                decay_score,
                state.as_str(),
                state_changed_at.map(|at| at.to_rfc3339()),
                id
            ],
        )
    }

    async fn record_access(&self, id: &str, at: DateTime<Utc>) -> StoreResult<Entity> {
        self.update_one(
            id,
            "UPDATE entities SET access_count = access_count + 1, \
             last_accessed_at = ?1 WHERE id = ?2",
            rusqlite::params![at.to_rfc3339(), id],
        )?;
        self.get_entity(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn create_entity(&self, entity: &Entity) -> StoreResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO entities \
                 (id, name, summary, entity_type, importance, stability, \
                  lifecycle_state, decay_score, created_at, last_accessed_at, access_count, \
                  state_changed_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                rusqlite::params![
                    entity.id,
                    entity.name,
                    entity.summary,
                    entity.entity_type,
                    entity.importance,
                    entity.stability,
                    entity.lifecycle_state.as_str(),
                    entity.decay_score,
                    entity.created_at.to_rfc3339(),
                    entity.last_accessed_at.map(|at| at.to_rfc3339()),
                    entity.access_count as i64,
                    entity.state_changed_at.map(|at| at.to_rfc3339()),
                ],
            )
            .map_err(|e| StoreError::WriteFailure {
                id: entity.id.clone(),
                reason: e.to_string(),
            })?;
            Ok(())
        })
    }
}

fn entity_from_row(row: &Row<'_>) -> rusqlite::Result<Entity> {
    let id: String = row.get(0)?;
    let created_at: String = row.get(8)?;
    let last_accessed_at: Option<String> = row.get(9)?;
    let access_count: i64 = row.get(10)?;
    let state_changed_at: Option<String> = row.get(11)?;
    let created_at = parse_dt(&created_at).unwrap_or_else(|| {
        warn!(entity_id = %id, raw = %created_at, "unparseable created_at, using now");
        Utc::now()
    });
    Ok(Entity {
        id,
        name: row.get(1)?,
        summary: row.get(2)?,
        entity_type: row.get(3)?,
        importance: row.get(4)?,
        stability: row.get(5)?,
        lifecycle_state: parse_state(row.get::<_, String>(6)?),
        decay_score: row.get(7)?,
        created_at,
        last_accessed_at: last_accessed_at.as_deref().and_then(parse_dt),
        access_count: access_count.max(0) as u64,
        state_changed_at: state_changed_at.as_deref().and_then(parse_dt),
    })
}

fn parse_dt(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

fn parse_state(s: String) -> LifecycleState {
    LifecycleState::from_str(&s).unwrap_or(LifecycleState::Active)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(id: &str) -> Entity {
        Entity::new(id, format!("name {}", id), Utc::now())
    }

    #[tokio::test]
    async fn create_and_read_back() {
        let store = SqliteGraphStore::open_in_memory().unwrap();
        let mut e = entity("a");
        e.summary = Some("a summary".into());
        e.entity_type = "ThreatActor".into();
        store.create_entity(&e).await.unwrap();

        let got = store.get_entity("a").await.unwrap().unwrap();
        assert_eq!(got.name, "name a");
        assert_eq!(got.entity_type, "ThreatActor");
        assert_eq!(got.importance, None);
        assert_eq!(got.lifecycle_state, LifecycleState::Active);
        assert!(store.get_entity("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn classification_removes_from_unclassified_set() {
        let store = SqliteGraphStore::open_in_memory().unwrap();
        for id in ["a", "b", "c"] {
            store.create_entity(&entity(id)).await.unwrap();
        }
        store
            .write_classification("b", Rating { importance: 5, stability: 4 })
            .await
            .unwrap();

        let pending = store.find_unclassified_entities(10).await.unwrap();
        let ids: Vec<_> = pending.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);

        let b = store.get_entity("b").await.unwrap().unwrap();
        assert_eq!(b.rating(), Some(Rating { importance: 5, stability: 4 }));
    }

    #[tokio::test]
    async fn classification_keeps_an_existing_rating() {
        let store = SqliteGraphStore::open_in_memory().unwrap();
        store.create_entity(&entity("a")).await.unwrap();

        assert!(store.write_classification("a", Rating { importance: 5, stability: 5 }).await.unwrap());
        assert!(!store.write_classification("a", Rating { importance: 3, stability: 3 }).await.unwrap());
        let a = store.get_entity("a").await.unwrap().unwrap();
        assert_eq!(a.rating(), Some(Rating { importance: 5, stability: 5 }));

        let err = store
            .write_classification("ghost", Rating { importance: 1, stability: 1 })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn paging_is_cursor_based() {
        let store = SqliteGraphStore::open_in_memory().unwrap();
        for id in ["a", "b", "c", "d", "e"] {
            store.create_entity(&entity(id)).await.unwrap();
        }
        let first = store.get_all_entities(None, 2).await.unwrap();
        assert_eq!(first.entities.len(), 2);
        assert_eq!(first.next_cursor.as_deref(), Some("b"));

        let last = store.get_all_entities(Some("d"), 2).await.unwrap();
        assert_eq!(last.entities.len(), 1);
        assert!(last.next_cursor.is_none());
    }

    #[tokio::test]
    async fn access_bumps_counter_and_timestamp() {
        let store = SqliteGraphStore::open_in_memory().unwrap();
        let mut e = entity("a");
        e.last_accessed_at = None;
        store.create_entity(&e).await.unwrap();

        let at = Utc::now();
        let touched = store.record_access("a", at).await.unwrap();
        assert_eq!(touched.access_count, 1);
        assert!(touched.last_accessed_at.is_some());
    }

    #[tokio::test]
    async fn state_change_stamp_is_kept_on_plain_rescore() {
        let store = SqliteGraphStore::open_in_memory().unwrap();
        store.create_entity(&entity("a")).await.unwrap();

        let moved = Utc::now();
        store
            .write_decay_and_state("a", 0.4, LifecycleState::Dormant, Some(moved))
            .await
            .unwrap();
        store
            .write_decay_and_state("a", 0.45, LifecycleState::Dormant, None)
            .await
            .unwrap();

        let a = store.get_entity("a").await.unwrap().unwrap();
        assert_eq!(a.lifecycle_state, LifecycleState::Dormant);
        assert_eq!(a.decay_score, 0.45);
        let stamped = a.state_changed_at.unwrap();
        assert!((stamped - moved).num_seconds().abs() <= 1);
    }

    #[tokio::test]
    async fn unreadable_created_at_falls_back_to_now() {
        let store = SqliteGraphStore::open_in_memory().unwrap();
        store
            .with_conn(|conn| {
                conn.execute(
                    "INSERT INTO entities (id, name, created_at) VALUES ('x', 'x', 'last tuesday')",
                    [],
                )?;
                Ok(())
            })
            .unwrap();

        let before = Utc::now();
        let x = store.get_entity("x").await.unwrap().unwrap();
        assert!(x.created_at >= before);
        assert!(x.days_in_state(Utc::now()) < 0.01);
    }

    #[tokio::test]
    async fn writes_to_missing_entities_fail() {
        let store = SqliteGraphStore::open_in_memory().unwrap();
        let err = store
            .write_decay_and_state("ghost", 0.2, LifecycleState::Dormant, None)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }
}
