use anyhow::Context;

use routeforge_infra::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::from_env()?;
    routeforge_observability::init_with(config.log_format);

    let (app, _report) = routeforge_api::app::boot(&config, &routeforge_api::app::catalog()).await?;

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
