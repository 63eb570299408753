use std::sync::Arc;

use anyhow::Context;

use tenantguard_infra::IsolationConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tenantguard_observability::init();

    let jwt_secret = std::env::var("TENANTGUARD_JWT_SECRET").unwrap_or_else(|_| {
        tracing::warn!("TENANTGUARD_JWT_SECRET not set; using insecure dev default");
        "dev-secret".to_string()
    });
    let bind_addr = std::env::var("TENANTGUARD_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

    let config = IsolationConfig::from_env().context("invalid configuration")?;
    let sweep_interval = config.sweep_interval();

    let services = Arc::new(tenantguard_api::app::services::build_services(config).context("invalid policy")?);
    let sweeper = services
        .layer
        .sweeper()
        .spawn(sweep_interval)
        .context("failed to start lifecycle sweeper")?;

    let app = tenantguard_api::app::build_router(jwt_secret, services);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;

    tracing::info!(addr = %listener.local_addr()?, "listening");

    let served = axum::serve(listener, app).await;
    sweeper.shutdown();
    served.context("server error")
}
