use anyhow::Result;
use chrono::Utc;

use graph_lifecycle::types::Entity;

use crate::server::LifecycleServer;

impl LifecycleServer {
    pub async fn do_add_entity(
        &self,
        name: &str,
        summary: Option<&str>,
        entity_type: Option<&str>,
    ) -> Result<String> {
        let name = name.trim();
        if name.is_empty() {
            anyhow::bail!("entity name must not be empty");
        }

        let now = Utc::now();
        let mut entity = Entity::new(uuid::Uuid::new_v4().to_string(), name, now);
        entity.summary = summary.map(|s| s.to_string()).filter(|s| !s.is_empty());
        if let Some(t) = entity_type.filter(|t| !t.is_empty()) {
            entity.entity_type = t.to_string();
        }

        self.engine.store.create_entity(&entity).await?;

        // Rated in the background; the next maintenance cycle catches misses.
        let id = entity.id.clone();
        let entity_type = entity.entity_type.clone();
        self.engine.trigger.spawn_tracked(vec![entity]).await;

        Ok(format!("Added [{}]: {} (id: {})", entity_type, name, id))
    }
}
