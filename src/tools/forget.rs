use anyhow::Result;
use chrono::Utc;
use tracing::info;

use graph_lifecycle::types::LifecycleState;

use crate::server::LifecycleServer;

impl LifecycleServer {
    pub async fn do_forget(&self, entity_id: &str, reason: &str) -> Result<String> {
        let entity = match self.engine.store.get_entity(entity_id).await? {
            Some(e) => e,
            None => return Ok(format!("No entity found with id: {}", entity_id)),
        };
        if entity.lifecycle_state == LifecycleState::SoftDeleted {
            return Ok(format!("Already forgotten: {}", entity_id));
        }

        // Operator action: bypasses decay rules and permanence.
        self.engine
            .store
            .write_decay_and_state(
                entity_id,
                entity.decay_score,
                LifecycleState::SoftDeleted,
                Some(Utc::now()),
            )
            .await?;
        info!(
            target: "lifecycle",
            entity_id,
            from_state = %entity.lifecycle_state,
            to_state = %LifecycleState::SoftDeleted,
            reason,
            "entity forgotten by operator"
        );

        Ok(format!(
            "Forgotten: {} (was {}, reason: {}). Soft-deleted, not removed.",
            entity_id, entity.lifecycle_state, reason
        ))
    }
}
