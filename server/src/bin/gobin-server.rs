use std::sync::Arc;

use anyhow::{Context, Result};
use env_logger::Env;
use gobin_server::{app, AppState, Config};

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("warn")).init();

    if let Err(err) = run().await {
        log::error!("{err:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let config = Config::from_env().context("loading configuration")?;
    let addr = format!("0.0.0.0:{}", config.port);

    let state = Arc::new(AppState::from_config(&config).context("building application state")?);
    let router = app::build_router(state);

    let listener =
        tokio::net::TcpListener::bind(&addr).await.with_context(|| format!("binding {addr}"))?;

    log::info!("listening on {addr}");
    axum::serve(listener, router).await.context("serving")?;

    Ok(())
}
