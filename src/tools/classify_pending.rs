use anyhow::Result;

use graph_lifecycle::trigger::TriggerOutcome;

use crate::server::LifecycleServer;

impl LifecycleServer {
    pub async fn do_classify_pending(&self) -> Result<String> {
        let outcome = self.engine.trigger.spawn(Vec::new()).await?;

        Ok(match outcome {
            TriggerOutcome::Completed(r) if r.found == 0 => "No unclassified entities.".into(),
            TriggerOutcome::Completed(r) => format!(
                "Rated {} entities: {} by model, {} with defaults{}.",
                r.found,
                r.classified,
                r.failed,
                if r.using_llm { "" } else { " (model unavailable)" },
            ),
            TriggerOutcome::TimedOut => {
                "Classification timed out; the rest will be handled by maintenance.".into()
            }
            TriggerOutcome::Failed(e) => format!("Classification failed: {}", e),
        })
    }
}
