// OSDF backend: GWDataFind URL lookup, then HTTP download through the OSDF director

use crate::core::constants::DEFAULT_DOWNLOAD_TIMEOUT;
use crate::core::error::{GwError, Result};
use crate::core::fetch::{write_response, Location, SegmentBackend};
use crate::core::format::{Channel, Segment};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OsdfSettings {
    pub datafind_host: String,
    pub urltype: String,
    pub director: String,
    pub timeout_secs: u64,
    pub accept_invalid_certs: bool,
}

impl Default for OsdfSettings {
    fn default() -> Self {
        Self {
            datafind_host: "https://datafind.gwosc.org".to_string(),
            urltype: "osdf".to_string(),
            director: "https://osdf-director.osg-htc.org".to_string(),
            timeout_secs: DEFAULT_DOWNLOAD_TIMEOUT.as_secs(),
            accept_invalid_certs: false,
        }
    }
}

pub struct OsdfBackend {
    client: Client,
    settings: OsdfSettings,
}

impl OsdfBackend {
    pub fn new(settings: OsdfSettings) -> Result<Self> {
        let client = Client::builder()
            .danger_accept_invalid_certs(settings.accept_invalid_certs)
            .build()?;
        Ok(Self { client, settings })
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.settings.timeout_secs)
    }

    /// GWDataFind v1 query for the URLs of one frame type over `[start, end)`.
    pub fn datafind_url(&self, site: &str, frametype: &str, segment: &Segment) -> String {
        format!(
            "{}/api/v1/gwf/{}/{}/{},{}/{}.json",
            self.settings.datafind_host.trim_end_matches('/'),
            site,
            frametype,
            segment.start,
            segment.end,
            self.settings.urltype
        )
    }

    /// Maps `osdf:///path` onto the director; other schemes pass through.
    pub fn http_url(&self, url: &str) -> String {
        match url.strip_prefix("osdf://") {
            Some(rest) => {
                let path = rest.trim_start_matches('/');
                format!("{}/{}", self.settings.director.trim_end_matches('/'), path)
            }
            None => url.to_string(),
        }
    }
}

/// Splits `<site>:<frame type>`.
fn split_channel(channel: &Channel) -> Result<(&str, &str)> {
    channel
        .as_str()
        .split_once(':')
        .filter(|(site, ft)| !site.is_empty() && !ft.is_empty())
        .ok_or_else(|| GwError::Remote(format!("expected <site>:<frametype>, got {}", channel)))
}

#[async_trait]
impl SegmentBackend for OsdfBackend {
    fn name(&self) -> &str {
        "OSDF"
    }

    async fn resolve_locations(&self, channel: &Channel, segment: &Segment) -> Result<Vec<Location>> {
        let (site, frametype) = split_channel(channel)?;
        let url = self.datafind_url(site, frametype, segment);
        debug!("Querying {}", url);

        let urls: Vec<String> = self
            .client
            .get(&url)
            .timeout(self.timeout())
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(urls.iter().map(|u| Location::from_url(u)).collect())
    }

    async fn retrieve(&self, location: &Location, dest: &Path) -> Result<u64> {
        let url = self.http_url(&location.source);
        debug!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .timeout(self.timeout())
            .send()
            .await?;
        write_response(response, dest).await
    }
}
