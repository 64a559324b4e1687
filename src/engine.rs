use std::sync::Arc;

use crate::classifier::{ImportanceClassifier, RatingClient};
use crate::config::EngineConfig;
use crate::lifecycle::{LifecycleEvaluator, MaintenanceOrchestrator};
use crate::store::GraphStore;
use crate::trigger::ImmediateClassificationTrigger;

/// All engine components bound to one store, rating provider and config.
#[derive(Clone)]
pub struct Engine {
    pub store: Arc<dyn GraphStore>,
    pub config: Arc<EngineConfig>,
    pub evaluator: LifecycleEvaluator,
    pub classifier: Arc<ImportanceClassifier>,
    pub orchestrator: Arc<MaintenanceOrchestrator>,
    pub trigger: ImmediateClassificationTrigger,
}

impl Engine {
    pub fn new(
        store: Arc<dyn GraphStore>,
        client: Arc<dyn RatingClient>,
        config: Arc<EngineConfig>,
    ) -> Self {
        let evaluator = LifecycleEvaluator::new(config.clone());
        let classifier = Arc::new(ImportanceClassifier::new(
            client,
            config.classification.batch_timeout(),
        ));
        let orchestrator = Arc::new(MaintenanceOrchestrator::new(
            store.clone(),
            classifier.clone(),
            evaluator.clone(),
        ));
        let trigger = ImmediateClassificationTrigger::new(
            store.clone(),
            classifier.clone(),
            config.classification.immediate_batch_size,
            config.classification.immediate_timeout(),
        );

        Self {
            store,
            config,
            evaluator,
            classifier,
            orchestrator,
            trigger,
        }
    }
}
