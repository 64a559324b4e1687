use async_trait::async_trait;
use chrono::{DateTime, Utc};
use neo4rs::{query, Graph, Query, Row};

use crate::error::{StoreError, StoreResult};
use crate::store::{EntityPage, GraphStore};
use crate::types::{clamp_rating, Entity, LifecycleState, Rating};

/// Shared projection for every entity read. Timestamps come back as strings
/// whether they were stored as temporal values or text.
const ENTITY_RETURN: &str = "RETURN n.uuid AS id, \
            coalesce(n.name, '') AS name, \
            n.summary AS summary, \
            coalesce([l IN labels(n) WHERE l <> 'Entity'][0], 'Entity') AS entity_type, \
            n.importance AS importance, \
            n.stability AS stability, \
            coalesce(n.lifecycle_state, 'ACTIVE') AS lifecycle_state, \
            coalesce(n.decay_score, 0.0) AS decay_score, \
            toString(n.created_at) AS created_at, \
            toString(n.last_accessed_at) AS last_accessed_at, \
            coalesce(n.access_count, 0) AS access_count, \
            toString(n.state_changed_at) AS state_changed_at";

pub struct Neo4jGraphStore {
    graph: Graph,
}

impl Neo4jGraphStore {
    pub async fn connect() -> anyhow::Result<Self> {
        let uri = std::env::var("NEO4J_URI")
            .map_err(|_| anyhow::anyhow!("NEO4J_URI not set"))?;
        if uri.is_empty() || uri.starts_with('<') {
            anyhow::bail!("NEO4J_URI is not configured");
        }
        let user = std::env::var("NEO4J_USER")
            .unwrap_or_else(|_| "neo4j".into());
        let password = std::env::var("NEO4J_PASSWORD")
            .map_err(|_| anyhow::anyhow!("NEO4J_PASSWORD not set"))?;
        if password.is_empty() || password.starts_with('<') {
            anyhow::bail!("NEO4J_PASSWORD is not configured");
        }

        let graph = Graph::new(&uri, &user, &password).await?;

        graph.run(query(
            "CREATE INDEX entity_uuid IF NOT EXISTS \
             FOR (n:Entity) ON (n.uuid)"
        )).await?;

        graph.run(query(
            "CREATE INDEX entity_lifecycle_state IF NOT EXISTS \
             FOR (n:Entity) ON (n.lifecycle_state)"
        )).await?;

        Ok(Self { graph })
    }

    async fn fetch(&self, q: Query) -> StoreResult<Vec<Entity>> {
        let mut result = self.graph.execute(q).await?;
        let mut entities = Vec::new();
        while let Some(row) = result.next().await? {
            match entity_from_row(&row) {
                Ok(entity) => entities.push(entity),
                Err(e) => tracing::warn!("skipping unreadable entity row: {}", e),
            }
        }
        Ok(entities)
    }

    /// Run a single-node update, failing if the node does not exist.
    async fn update_one(&self, id: &str, q: Query) -> StoreResult<()> {
        let mut result = self.graph.execute(q).await.map_err(|e| StoreError::WriteFailure {
            id: id.to_string(),
            reason: e.to_string(),
        })?;
        match result.next().await {
            Ok(Some(_)) => Ok(()),
            Ok(None) => Err(StoreError::NotFound(id.to_string())),
            Err(e) => Err(StoreError::WriteFailure {
                id: id.to_string(),
                reason: e.to_string(),
            }),
        }
    }
}

#[async_trait]
impl GraphStore for Neo4jGraphStore {
    async fn find_unclassified_entities(&self, limit: usize) -> StoreResult<Vec<Entity>> {
        self.fetch(
            query(&format!(
                "MATCH (n:Entity) \
                 WHERE n.importance IS NULL OR n.stability IS NULL \
                 {ENTITY_RETURN} \
                 ORDER BY id LIMIT $limit"
            ))
            .param("limit", limit as i64),
        )
        .await
    }

    async fn get_all_entities(&self, cursor: Option<&str>, limit: usize) -> StoreResult<EntityPage> {
        let limit = limit.max(1);
        let mut entities = self
            .fetch(
                query(&format!(
                    "MATCH (n:Entity) WHERE n.uuid > $cursor \
                     {ENTITY_RETURN} \
                     ORDER BY id LIMIT $limit"
                ))
                .param("cursor", cursor.unwrap_or(""))
                .param("limit", (limit + 1) as i64),
            )
            .await?;

        let next_cursor = if entities.len() > limit {
            entities.truncate(limit);
            entities.last().map(|e| e.id.clone())
        } else {
            None
        };
        Ok(EntityPage { entities, next_cursor })
    }

    async fn get_entity(&self, id: &str) -> StoreResult<Option<Entity>> {
        let mut found = self
            .fetch(
                query(&format!("MATCH (n:Entity {{uuid: $id}}) {ENTITY_RETURN}"))
                    .param("id", id),
            )
            .await?;
        Ok(found.pop())
    }

    async fn write_classification(&self, id: &str, rating: Rating) -> StoreResult<bool> {
        let q = query(
            "MATCH (n:Entity {uuid: $id}) \
             WITH n, (n.importance IS NULL OR n.stability IS NULL) AS pending \
             FOREACH (_ IN CASE WHEN pending THEN [1] ELSE [] END | \
                 SET n.importance = $importance, n.stability = $stability) \
             RETURN pending"
        )
        .param("id", id)
        .param("importance", rating.importance as i64)
        .param("stability", rating.stability as i64);

        let write_failure = |e: neo4rs::Error| StoreError::WriteFailure {
            id: id.to_string(),
            reason: e.to_string(),
        };
        let mut result = self.graph.execute(q).await.map_err(write_failure)?;
        match result.next().await.map_err(write_failure)? {
            Some(row) => Ok(row.get::<bool>("pending").unwrap_or(false)),
            None => Err(StoreError::NotFound(id.to_string())),
        }
    }

    async fn write_decay_and_state(
        &self,
        id: &str,
        decay_score: f64,
        state: LifecycleState,
        state_changed_at: Option<DateTime<Utc>>,
    ) -> StoreResult<()> {
        let q = match state_changed_at {
            Some(at) => query(
                "MATCH (n:Entity {uuid: $id}) \
                 SET n.decay_score = $decay_score, n.lifecycle_state = $state, \
                     n.state_changed_at = datetime($changed_at) \
                 RETURN n.uuid AS id"
            )
            .param("changed_at", at.to_rfc3339()),
            None => query(
                "MATCH (n:Entity {uuid: $id}) \
                 SET n.decay_score = $decay_score, n.lifecycle_state = $state \
                 RETURN n.uuid AS id"
            ),
        };
        self.update_one(
            id,
            q.param("id", id)
                .param("decay_score", decay_score)
                .param("state", state.as_str()),
        )
        .await
    }

    async fn record_access(&self, id: &str, at: DateTime<Utc>) -> StoreResult<Entity> {
        self.update_one(
            id,
            query(
                "MATCH (n:Entity {uuid: $id}) \
                 SET n.access_count = coalesce(n.access_count, 0) + 1, \
                     n.last_accessed_at = datetime($at) \
                 RETURN n.uuid AS id"
            )
            .param("id", id)
            .param("at", at.to_rfc3339()),
        )
        .await?;
        self.get_entity(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn create_entity(&self, entity: &Entity) -> StoreResult<()> {
        // Type labels cannot be parameterised; keep them to identifier characters.
        let label: String = entity
            .entity_type
            .chars()
            .filter(|c| c.is_alphanumeric() || *c == '_')
            .collect();
        let set_label = if label.is_empty() || label == "Entity" {
            String::new()
        } else {
            format!("n:{label}, ")
        };

        let cypher = format!(
            "MERGE (n:Entity {{uuid: $id}}) \
             SET {set_label}n.name = $name, n.summary = $summary, \
                 n.lifecycle_state = $state, n.decay_score = $decay_score, \
                 n.created_at = datetime($created_at), \
                 n.last_accessed_at = datetime($last_accessed_at), \
                 n.access_count = $access_count"
        );
        let created_at = entity.created_at.to_rfc3339();
        let last_accessed_at = entity
            .last_accessed_at
            .unwrap_or(entity.created_at)
            .to_rfc3339();

        self.graph
            .run(
                query(&cypher)
                    .param("id", entity.id.as_str())
                    .param("name", entity.name.as_str())
                    .param("summary", entity.summary.clone().unwrap_or_default())
                    .param("state", entity.lifecycle_state.as_str())
                    .param("decay_score", entity.decay_score)
                    .param("created_at", created_at)
                    .param("last_accessed_at", last_accessed_at)
                    .param("access_count", entity.access_count as i64),
            )
            .await
            .map_err(|e| StoreError::WriteFailure {
                id: entity.id.clone(),
                reason: e.to_string(),
            })?;

        if let Some(rating) = entity.rating() {
            self.write_classification(&entity.id, rating).await?;
        }
        Ok(())
    }
}

fn entity_from_row(row: &Row) -> Result<Entity, String> {
    let id: String = row.get("id").map_err(|e| e.to_string())?;
    let summary: Option<String> = row.get("summary").unwrap_or(None);
    let importance: Option<i64> = row.get("importance").unwrap_or(None);
    let stability: Option<i64> = row.get("stability").unwrap_or(None);
    let state: String = row.get("lifecycle_state").unwrap_or_default();
    let created_at: Option<String> = row.get("created_at").unwrap_or(None);
    let last_accessed_at: Option<String> = row.get("last_accessed_at").unwrap_or(None);
    let access_count: i64 = row.get("access_count").unwrap_or(0);
    let state_changed_at: Option<String> = row.get("state_changed_at").unwrap_or(None);

    let created_at = created_at
        .as_deref()
        .and_then(parse_neo4j_datetime)
        .unwrap_or_else(|| {
            tracing::warn!(entity_id = %id, raw = ?created_at, "unparseable created_at, using now");
            Utc::now()
        });

    Ok(Entity {
        id,
        name: row.get("name").unwrap_or_default(),
        summary: summary.filter(|s| !s.is_empty()),
        entity_type: row.get("entity_type").unwrap_or_else(|_| "Entity".into()),
        importance: importance.map(clamp_rating),
        stability: stability.map(clamp_rating),
        lifecycle_state: LifecycleState::from_str(&state).unwrap_or(LifecycleState::Active),
        decay_score: row.get::<f64>("decay_score").unwrap_or(0.0).clamp(0.0, 1.0),
        created_at,
        last_accessed_at: last_accessed_at.as_deref().and_then(parse_neo4j_datetime),
        access_count: access_count.max(0) as u64,
        state_changed_at: state_changed_at.as_deref().and_then(parse_neo4j_datetime),
    })
}

/// Parse `toString(datetime)` output. Neo4j appends a `[Zone/Name]` suffix
/// for named zones and drops zero seconds (`10:00Z`); RFC 3339 allows neither.
fn parse_neo4j_datetime(s: &str) -> Option<DateTime<Utc>> {
    let trimmed = match s.find('[') {
        Some(idx) => &s[..idx],
        None => s,
    };
    DateTime::parse_from_rfc3339(trimmed)
        .ok()
        .or_else(|| {
            let minutes_end = trimmed.find('T')? + 6;
            if !trimmed.is_char_boundary(minutes_end) || trimmed[minutes_end..].starts_with(':') {
                return None;
            }
            let (head, tail) = trimmed.split_at(minutes_end);
            DateTime::parse_from_rfc3339(&format!("{head}:00{tail}")).ok()
        })
        .map(|dt| dt.with_timezone(&Utc))
}
