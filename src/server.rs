use rmcp::{
    ServerHandler,
    model::{ServerCapabilities, ServerInfo},
    tool,
    schemars,
};

use graph_lifecycle::Engine;

#[derive(Clone)]
pub struct LifecycleServer {
    pub engine: Engine,
}

// MCP request types

#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
pub struct AddEntityRequest {
    #[schemars(description = "Entity name")]
    pub name: String,
    #[schemars(description = "Short description of the entity (optional)")]
    pub summary: Option<String>,
    #[schemars(description = "Type label selecting decay parameters, e.g. Entity, ThreatActor, Indicator (optional)")]
    pub entity_type: Option<String>,
}

#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
pub struct AccessRequest {
    #[schemars(description = "ID of the entity that was read or matched by a search")]
    pub entity_id: String,
}

#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
pub struct MaintenanceRequest {
    #[schemars(description = "Compute everything but write nothing (default false)")]
    pub dry_run: Option<bool>,
}

#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
pub struct StatusRequest {
    #[schemars(description = "ID of the entity to inspect")]
    pub entity_id: String,
}

#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
pub struct ForgetRequest {
    #[schemars(description = "ID of the entity to soft-delete")]
    pub entity_id: String,
    #[schemars(description = "Why this entity should be forgotten")]
    pub reason: String,
}

#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
pub struct ClassifyPendingRequest {}

#[tool(tool_box)]
impl LifecycleServer {
    #[tool(description = "Add an entity to the knowledge graph. Importance and stability are rated in the background right after creation.")]
    async fn add_entity(
        &self, #[tool(aggr)] req: AddEntityRequest,
    ) -> String {
        match self.do_add_entity(
            &req.name, req.summary.as_deref(), req.entity_type.as_deref(),
        ).await {
            Ok(msg) => msg,
            Err(e) => format!("Error: {}", e),
        }
    }

    #[tool(description = "Record that an entity was read or returned by a search. Dormant and archived entities become active again.")]
    async fn access(
        &self, #[tool(aggr)] req: AccessRequest,
    ) -> String {
        match self.do_access(&req.entity_id).await {
            Ok(msg) => msg,
            Err(e) => format!("Error: {}", e),
        }
    }

    #[tool(description = "Run a maintenance cycle: classify unrated entities, recompute decay scores, apply lifecycle transitions. Returns the cycle report as JSON.")]
    async fn run_maintenance(
        &self, #[tool(aggr)] req: MaintenanceRequest,
    ) -> String {
        match self.do_maintain(req.dry_run.unwrap_or(false)).await {
            Ok(msg) => msg,
            Err(e) => format!("Error: {}", e),
        }
    }

    #[tool(description = "Show an entity with its current decay score, permanence and the lifecycle state the next cycle would assign.")]
    async fn entity_status(
        &self, #[tool(aggr)] req: StatusRequest,
    ) -> String {
        match self.do_status(&req.entity_id).await {
            Ok(msg) => msg,
            Err(e) => format!("Error: {}", e),
        }
    }

    #[tool(description = "Explicitly forget an entity. Requires the entity ID and a reason. The entity is soft-deleted, not removed, and this works even for permanent entities.")]
    async fn forget(
        &self, #[tool(aggr)] req: ForgetRequest,
    ) -> String {
        match self.do_forget(&req.entity_id, &req.reason).await {
            Ok(msg) => msg,
            Err(e) => format!("Error: {}", e),
        }
    }

    #[tool(description = "Rate one batch of unclassified entities now instead of waiting for the next maintenance cycle.")]
    async fn classify_pending(
        &self, #[tool(aggr)] _req: ClassifyPendingRequest,
    ) -> String {
        match self.do_classify_pending().await {
            Ok(msg) => msg,
            Err(e) => format!("Error: {}", e),
        }
    }
}

#[tool(tool_box)]
impl ServerHandler for LifecycleServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Lifecycle manager for knowledge graph entities. 6 tools: \
                 add_entity (create, rated in background), \
                 access (record a read, reactivates dormant/archived), \
                 run_maintenance (classify + rescore + transition, optional dry run), \
                 entity_status (decay score and next state), \
                 forget (soft delete with reason), \
                 classify_pending (rate one batch now). \
                 Call access whenever an entity is used so it stays fresh."
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}
