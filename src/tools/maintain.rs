use anyhow::Result;

use crate::server::LifecycleServer;

impl LifecycleServer {
    pub async fn do_maintain(&self, dry_run: bool) -> Result<String> {
        let report = self.engine.orchestrator.run_maintenance_cycle(dry_run).await;
        Ok(serde_json::to_string_pretty(&report)?)
    }
}
