use anyhow::Result;
use chrono::Utc;

use graph_lifecycle::lifecycle::record_access;

use crate::server::LifecycleServer;

impl LifecycleServer {
    pub async fn do_access(&self, entity_id: &str) -> Result<String> {
        let outcome = record_access(
            self.engine.store.as_ref(),
            &self.engine.evaluator,
            entity_id,
            Utc::now(),
        )
        .await?;

        Ok(match outcome.reactivated_from {
            Some(from) => format!(
                "Accessed {} ({} accesses). Reactivated from {}.",
                entity_id, outcome.entity.access_count, from
            ),
            None => format!(
                "Accessed {} ({} accesses, {}).",
                entity_id, outcome.entity.access_count, outcome.entity.lifecycle_state
            ),
        })
    }
}
