use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use server::{build_router, config::load_settings, AppState};
use server_api::ApiContext;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let settings = load_settings()?;
    let api = if settings.seed_demo_data {
        ApiContext::with_demo_data()
    } else {
        ApiContext::new()
    };
    let state = AppState {
        api,
        max_body_bytes: settings.max_body_bytes,
    };
    let app = build_router(Arc::new(state));

    let addr: SocketAddr = settings
        .server_bind
        .parse()
        .with_context(|| format!("invalid bind address '{}'", settings.server_bind))?;
    info!(%addr, seeded = settings.seed_demo_data, "server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown requested");
        })
        .await?;
    Ok(())
}
