use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{anyhow, Context, Result};
use tokio::fs;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::models::config_model::ServerConfig;

static CONFIG_CACHE: OnceLock<ServerConfig> = OnceLock::new();

const DEFAULT_CONFIG_FILE: &str = "gwfetch.json";
const CONFIG_ENV: &str = "GWFETCH_CONFIG";

pub fn config_path() -> PathBuf {
    std::env::var_os(CONFIG_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
}

/// Reads the config file; a missing file yields the defaults.
pub async fn load_config(path: &Path) -> Result<ServerConfig> {
    match fs::read_to_string(path).await {
        Ok(data) => serde_json::from_str(&data)
            .with_context(|| format!("JSON parse error in {}", path.display())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!("{} not found, using defaults", path.display());
            Ok(ServerConfig::default())
        }
        Err(e) => Err(e).with_context(|| format!("File read error: {}", path.display())),
    }
}

pub async fn init_config_and_bind() -> Result<TcpListener> {
    let mut config = load_config(&config_path()).await?;

    let bind_addr = format!("{}:{}", config.connection.ip, config.connection.port);

    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Bind failed: {bind_addr}"))?;

    let actual_port = listener.local_addr().context("Addr error")?.port();

    // Port 0 in the file means "any"; keep the one we actually got.
    config.connection.port = actual_port;

    CONFIG_CACHE
        .set(config)
        .map_err(|_| anyhow!("Config already initialized"))?;

    info!("Config initialized with port: {}", actual_port);

    Ok(listener)
}

pub fn get_cached_config() -> Option<&'static ServerConfig> {
    CONFIG_CACHE.get()
}
