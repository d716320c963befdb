use envconfig::Envconfig;
use kube::Client;
use mcp_operator::{config::OperatorConfig, controller, init_tracing};
use tracing::info;

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    init_tracing("info");

    let cfg = OperatorConfig::init_from_env()?;
    // fail fast on bad defaults instead of rejecting every MCPServer later
    cfg.translator_defaults()?;
    info!(?cfg, "Starting mcp-operator");

    let client = Client::try_default().await?;
    controller::run_controller(client, cfg).await
}
