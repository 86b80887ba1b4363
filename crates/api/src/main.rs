use anyhow::Context;

use stockroom_infra::config::StockroomConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = StockroomConfig::load().context("failed to load configuration")?;
    stockroom_observability::init_with(&config.log.level, config.log.json);

    let app = stockroom_api::app::build_app(&config).await?;

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.server.bind))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for ctrl-c");
    }
}
