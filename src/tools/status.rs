use anyhow::Result;
use chrono::Utc;

use crate::server::LifecycleServer;

impl LifecycleServer {
    pub async fn do_status(&self, entity_id: &str) -> Result<String> {
        let entity = match self.engine.store.get_entity(entity_id).await? {
            Some(e) => e,
            None => return Ok(format!("No entity found with id: {}", entity_id)),
        };
        let evaluation = self.engine.evaluator.evaluate(&entity, None, Utc::now());

        let status = serde_json::json!({
            "entity": entity,
            "current_decay_score": evaluation.decay_score,
            "is_permanent": evaluation.is_permanent,
            "next_state": evaluation.next_state,
            "would_transition": evaluation.transitioned,
        });
        Ok(serde_json::to_string_pretty(&status)?)
    }
}
