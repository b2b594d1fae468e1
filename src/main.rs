use anyhow::Result;
use ingress_gate::config::Config;
use ingress_gate::graceful::ShutdownCause;
use ingress_gate::routes::RouteTable;
use ingress_gate::server::Server;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    let config = Config::load().map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("ingress_gate={},tower_http=info", config.log_level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting ingress gate");
    tracing::info!(
        ingress = %config.ingress_addr,
        admin = %config.admin_addr,
        bucket_limit = config.bucket_limit,
        bucket_rate = config.bucket_rate,
        ip_limit = config.ip_limit,
        ip_duration = %humantime::format_duration(config.ip_duration),
        "Configuration loaded"
    );

    let routes = RouteTable::from_env(&config.route_prefix);
    tracing::info!(routes = routes.len(), "Route table built");

    let server = Server::new(config, routes)
        .map_err(|e| anyhow::anyhow!("Failed to create server: {}", e))?;

    let report = server.run().await;
    for failure in &report.failures {
        tracing::warn!("{}", failure);
    }

    match report.cause {
        ShutdownCause::Signal => Ok(()),
        ShutdownCause::StartupFailed(message) => Err(anyhow::anyhow!("Server error: {}", message)),
    }
}
