use anyhow::{Context, Result};
use axum::Router;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod models;
mod routes;
mod state;
mod utils;

use crate::state::app_state::AppState;
use crate::utils::conf_helper::{get_cached_config, init_config_and_bind};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // === CONFIG + LISTENER ===
    let listener = init_config_and_bind().await.context("startup failed")?;

    let config = get_cached_config()
        .context("config missing after init")?
        .clone();

    info!(
        "Server initialized on {}:{}",
        config.connection.ip,
        config.connection.port
    );
    info!(
        "Frames under {}, packages under {}",
        config.data.gwf_dir.display(),
        config.data.scratch_dir.display()
    );

    let state = AppState::from_config(config).context("failed to build HTTP clients")?;

    let app = Router::new()
        .merge(routes::info_routes::health_routes())
        .merge(routes::gravfetch_routes::gravfetch_routes(state.clone()))
        .merge(routes::job_routes::job_routes(state.clone()))
        .merge(routes::config_routes::config_routes(state.clone()))
        .merge(routes::data_routes::data_routes(state));

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
