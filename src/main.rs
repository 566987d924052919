use anyhow::Context;
use bessa_lunch::{BessaClient, Config, Coordinator, LunchMcpServer};
use rmcp::transport::sse_server::{SseServer, SseServerConfig};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".to_string().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().context("Invalid configuration")?;

    let mut client = BessaClient::with_timeout(
        config.base_url.clone(),
        config.credentials.clone(),
        config.request_timeout,
    )?;

    // Validate credentials once before polling
    tracing::info!("Validating Bessa credentials...");
    match client.validate_credentials().await {
        Ok(true) => tracing::info!("Successfully authenticated with Bessa"),
        Ok(false) => tracing::warn!("Bessa not reachable at startup, retrying on first poll"),
        Err(e) => {
            tracing::error!("Authentication failed: {}", e);
            tracing::error!("Please verify:");
            tracing::error!("  - BESSA_BASE_URL is correct: {}", config.base_url);
            tracing::error!("  - BESSA_EMAIL is correct: {}", config.credentials.email);
            tracing::error!("  - BESSA_PASSWORD is correct");
            std::process::exit(1);
        }
    }

    let coordinator = Arc::new(Coordinator::new(
        client,
        config.venue_id,
        config.poll_interval,
    ));
    let ct = CancellationToken::new();

    let poller = {
        let coordinator = coordinator.clone();
        let ct = ct.clone();
        tokio::spawn(async move { coordinator.run(ct).await })
    };

    let sse_config = SseServerConfig {
        bind: config.bind_addr.parse()?,
        sse_path: "/sse".to_string(),
        post_path: "/message".to_string(),
        ct: ct.clone(),
        sse_keep_alive: None,
    };

    tracing::info!("Bessa Lunch MCP Server listening on {}", sse_config.bind);

    let sse_server = SseServer::serve_with_config(sse_config).await?;

    let entry_id = config.entry_id.clone();
    let service_ct = sse_server.with_service(move || LunchMcpServer::new(coordinator.clone(), &entry_id));

    tracing::info!("Bessa Lunch MCP Server started successfully");

    // Wait for Ctrl+C
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down...");
    service_ct.cancel();
    ct.cancel();
    poller.await?;

    Ok(())
}
