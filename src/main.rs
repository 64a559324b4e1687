mod server;
mod tools;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use rmcp::ServiceExt;
use tracing::info;

use graph_lifecycle::classifier::RatingClient;
use graph_lifecycle::config::EngineConfig;
use graph_lifecycle::llm::{AnthropicRatingClient, DisabledRatingClient};
use graph_lifecycle::scheduler::spawn_maintenance_scheduler;
use graph_lifecycle::{store, Engine};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("graph_lifecycle=info".parse()?)
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let engine = build_engine().await?;

    if args.iter().any(|a| a == "--maintain") {
        let dry_run = args.iter().any(|a| a == "--dry-run");
        return run_maintenance(engine, dry_run).await;
    }

    run_mcp_server(engine).await
}

async fn build_engine() -> Result<Engine> {
    let config = Arc::new(EngineConfig::load()?);
    let store = store::connect(&resolve_store_path()).await?;

    let api_key = std::env::var("ANTHROPIC_API_KEY").unwrap_or_default();
    let client: Arc<dyn RatingClient> = if api_key.is_empty() {
        tracing::warn!("ANTHROPIC_API_KEY not set, entities will get default ratings");
        Arc::new(DisabledRatingClient)
    } else {
        Arc::new(AnthropicRatingClient::new(
            api_key,
            config.classification.model.clone(),
            config.classification.batch_timeout(),
        ))
    };

    Ok(Engine::new(store, client, config))
}

async fn run_maintenance(engine: Engine, dry_run: bool) -> Result<()> {
    let report = engine.orchestrator.run_maintenance_cycle(dry_run).await;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn run_mcp_server(engine: Engine) -> Result<()> {
    let scheduler = spawn_maintenance_scheduler(
        engine.orchestrator.clone(),
        engine.config.maintenance.interval(),
    );

    let trigger = engine.trigger.clone();
    let server = server::LifecycleServer { engine };
    let transport = rmcp::transport::io::stdio();
    info!("starting graph-lifecycle MCP server (stdio)");

    let service = server.serve(transport).await
        .map_err(|e| anyhow::anyhow!("MCP server failed: {}", e))?;

    let _ = service.waiting().await;
    scheduler.abort();
    trigger.shutdown(Duration::from_secs(5)).await;
    Ok(())
}

fn resolve_store_path() -> PathBuf {
    PathBuf::from(
        std::env::var("LIFECYCLE_STORE_PATH").unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".into());
            format!("{}/.graph-lifecycle/entities.db", home)
        })
    )
}
