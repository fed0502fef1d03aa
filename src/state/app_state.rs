use std::path::PathBuf;
use std::sync::Arc;

use gwfetch::{
    FetchOptions, JobDriver, JobRegistry, NdsBackend, OsdfBackend, ProcessRunner, SegmentBackend,
};

use crate::models::config_model::ServerConfig;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub driver: JobDriver,
    pub osdf: Arc<dyn SegmentBackend>,
    pub nds: Arc<dyn SegmentBackend>,
    pub runner: Arc<ProcessRunner>,
}

impl AppState {
    pub fn from_config(config: ServerConfig) -> gwfetch::Result<Self> {
        let osdf = Arc::new(OsdfBackend::new(config.osdf.clone())?);
        let nds = Arc::new(NdsBackend::new(config.nds.clone())?);
        let runner = Arc::new(ProcessRunner::new(config.omicron.clone()));
        Ok(Self::with_backends(config, osdf, nds, runner))
    }

    pub fn with_backends(
        config: ServerConfig,
        osdf: Arc<dyn SegmentBackend>,
        nds: Arc<dyn SegmentBackend>,
        runner: Arc<ProcessRunner>,
    ) -> Self {
        let registry = JobRegistry::with_retention(config.job_retention);
        Self {
            config: Arc::new(config),
            driver: JobDriver::new(registry),
            osdf,
            nds,
            runner,
        }
    }

    pub fn fetch_options(&self) -> FetchOptions {
        FetchOptions::new(&self.config.data.gwf_dir, &self.config.data.base)
            .with_courtesy_delay(self.config.courtesy_delay())
    }

    pub fn scratch_dir(&self) -> PathBuf {
        self.config.data.scratch_dir.clone()
    }

    pub fn registry(&self) -> &JobRegistry {
        self.driver.registry()
    }
}
