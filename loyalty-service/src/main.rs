use loyalty_service::config::LoyaltyConfig;
use loyalty_service::services::init_metrics;
use loyalty_service::startup::Application;
use service_core::observability::init_tracing;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let config = LoyaltyConfig::load().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        std::io::Error::other(format!("Configuration error: {}", e))
    })?;

    init_tracing(
        "loyalty-service",
        &config.common.log_level,
        config.common.otlp_endpoint.as_deref(),
    )
    .map_err(|e| std::io::Error::other(format!("Tracing error: {}", e)))?;

    init_metrics().map_err(|e| {
        tracing::error!("Failed to initialize metrics: {}", e);
        std::io::Error::other(format!("Metrics error: {}", e))
    })?;

    let application = Application::build(config).await.map_err(|e| {
        tracing::error!("Failed to build application: {}", e);
        std::io::Error::other(format!("Startup error: {}", e))
    })?;

    application.run_until_stopped().await
}
