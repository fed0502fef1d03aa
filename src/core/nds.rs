// NDS backend: one direct time-series fetch per segment, streamed to a frame file

use crate::core::constants::FRAME_EXT;
use crate::core::error::{GwError, Result};
use crate::core::fetch::{write_response, Location, SegmentBackend};
use crate::core::format::{Channel, Segment};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NdsSettings {
    /// HTTP gateway in front of the NDS server.
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for NdsSettings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:31200".to_string(),
            timeout_secs: 600,
        }
    }
}

pub struct NdsBackend {
    client: Client,
    settings: NdsSettings,
}

impl NdsBackend {
    pub fn new(settings: NdsSettings) -> Result<Self> {
        let client = Client::builder().build()?;
        Ok(Self { client, settings })
    }

    pub fn timeseries_url(&self, channel: &Channel, segment: &Segment) -> Result<Url> {
        let base = format!("{}/timeseries", self.settings.base_url.trim_end_matches('/'));
        Url::parse_with_params(
            &base,
            &[
                ("channel", channel.as_str().to_string()),
                ("start", segment.start.to_string()),
                ("end", segment.end.to_string()),
                ("format", FRAME_EXT.to_string()),
            ],
        )
        .map_err(|e| GwError::Remote(format!("bad NDS url {}: {}", base, e)))
    }
}

/// `<channel dir name>_<start>_<end>.gwf`
pub fn segment_file_name(channel: &Channel, segment: &Segment) -> String {
    format!("{}_{}.{}", channel.dir_name(), segment, FRAME_EXT)
}

#[async_trait]
impl SegmentBackend for NdsBackend {
    fn name(&self) -> &str {
        "NDS"
    }

    // The whole segment is served as a single file, so nothing is queried here.
    async fn resolve_locations(&self, channel: &Channel, segment: &Segment) -> Result<Vec<Location>> {
        let url = self.timeseries_url(channel, segment)?;
        Ok(vec![Location {
            source: url.to_string(),
            file_name: segment_file_name(channel, segment),
            span: Some((segment.start, segment.duration())),
        }])
    }

    async fn retrieve(&self, location: &Location, dest: &Path) -> Result<u64> {
        debug!("Fetching time series {}", location.source);
        let response = self
            .client
            .get(&location.source)
            .timeout(Duration::from_secs(self.settings.timeout_secs))
            .send()
            .await?;
        write_response(response, dest).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fetch::{fetch_segments, FetchOptions};
    use crate::core::joblog::VecSink;
    use axum::{extract::Query, routing::get, Router};
    use std::collections::HashMap;
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;

    #[test]
    fn test_segment_file_name() {
        let name = segment_file_name(
            &Channel::new("H1:GDS-CALIB_STRAIN"),
            &Segment::new(1126259446, 1126259478).unwrap(),
        );
        assert_eq!(name, "H1_GDS-CALIB_STRAIN_1126259446_1126259478.gwf");
    }

    #[tokio::test]
    async fn test_resolve_single_location() {
        let backend = NdsBackend::new(NdsSettings {
            base_url: "http://nds.example.org/".to_string(),
            ..Default::default()
        })
        .unwrap();

        let locations = backend
            .resolve_locations(&Channel::new("H1:TEST"), &Segment::new(100, 110).unwrap())
            .await
            .unwrap();

        assert_eq!(locations.len(), 1);
        assert_eq!(locations[0].span, Some((100, 10)));
        assert_eq!(
            locations[0].source,
            "http://nds.example.org/timeseries?channel=H1%3ATEST&start=100&end=110&format=gwf"
        );
    }

    #[tokio::test]
    async fn test_fetch_through_gateway_is_idempotent() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let app = Router::new().route(
            "/timeseries",
            get(|Query(q): Query<HashMap<String, String>>| async move {
                format!("{}:{}-{}", q["channel"], q["start"], q["end"])
            }),
        );
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let backend = NdsBackend::new(NdsSettings {
            base_url,
            ..Default::default()
        })
        .unwrap();
        let dir = TempDir::new().unwrap();
        let opts = FetchOptions::new(dir.path().join("GWFout"), dir.path())
            .with_courtesy_delay(Duration::ZERO);
        let channel = Channel::new("H1:TEST");
        let segments = vec!["100_110".to_string()];

        let summary = fetch_segments(&backend, &channel, &segments, &opts, &VecSink::new(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(summary.downloaded, 1);

        let file = opts.channel_dir(&channel).join("100_110/H1_TEST_100_110.gwf");
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "H1:TEST:100-110");

        let sink = VecSink::new();
        let again = fetch_segments(&backend, &channel, &segments, &opts, &sink, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(again.downloaded, 0);
        assert_eq!(again.skipped, 1);

        let manifest = std::fs::read_to_string(opts.channel_dir(&channel).join("fin.ffl")).unwrap();
        assert_eq!(manifest, "./GWFout/H1_TEST/100_110/H1_TEST_100_110.gwf 100 10 0 0\n");
    }
}
