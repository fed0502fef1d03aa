use gwfetch::{NdsSettings, OmicronSettings, OsdfSettings};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use gwfetch::core::constants::{
    DEFAULT_COURTESY_DELAY, DEFAULT_JOB_RETENTION, DEFAULT_POLL_INTERVAL,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub name: String,
    pub version: String,
    pub connection: Connection,
    pub data: DataDirs,
    pub osdf: OsdfSettings,
    pub nds: NdsSettings,
    pub omicron: OmicronSettings,
    pub courtesy_delay_ms: u64,
    pub poll_interval_ms: u64,
    pub job_retention: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            connection: Connection::default(),
            data: DataDirs::default(),
            osdf: OsdfSettings::default(),
            nds: NdsSettings::default(),
            omicron: OmicronSettings::default(),
            courtesy_delay_ms: DEFAULT_COURTESY_DELAY.as_millis() as u64,
            poll_interval_ms: DEFAULT_POLL_INTERVAL.as_millis() as u64,
            job_retention: DEFAULT_JOB_RETENTION,
        }
    }
}

impl ServerConfig {
    pub fn courtesy_delay(&self) -> Duration {
        Duration::from_millis(self.courtesy_delay_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Connection {
    pub ip: String,
    /// 0 lets the OS pick; the bound port is written back at startup.
    pub port: u16,
}

impl Default for Connection {
    fn default() -> Self {
        Self {
            ip: "127.0.0.1".to_string(),
            port: 5000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataDirs {
    /// Manifest paths are written relative to this directory.
    pub base: PathBuf,
    /// One sub-directory per channel.
    pub gwf_dir: PathBuf,
    /// Finished archives.
    pub scratch_dir: PathBuf,
}

impl Default for DataDirs {
    fn default() -> Self {
        Self {
            base: PathBuf::from("."),
            gwf_dir: PathBuf::from("./uploads/GWFout"),
            scratch_dir: PathBuf::from("./uploads/packages"),
        }
    }
}
