use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::lifecycle::MaintenanceOrchestrator;

/// Spawn the periodic maintenance task. The first cycle runs immediately.
pub fn spawn_maintenance_scheduler(
    orchestrator: Arc<MaintenanceOrchestrator>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("maintenance scheduler running every {:?}", interval);
        loop {
            ticker.tick().await;
            let report = orchestrator.run_maintenance_cycle(false).await;
            if report.errors > 0 {
                warn!(
                    cycle_id = %report.cycle_id,
                    errors = report.errors,
                    "maintenance cycle finished with errors"
                );
            }
        }
    })
}
