// Data structures for segments, channels and frame file names

use crate::core::constants::*;
use crate::core::error::{GwError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path};
use std::str::FromStr;

/// A contiguous GPS interval `[start, end)`, written as `"start_end"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Segment {
    pub start: i64,
    pub end: i64,
}

impl Segment {
    pub fn new(start: i64, end: i64) -> Result<Self> {
        if start >= end {
            return Err(GwError::InvalidSegment(format!(
                "start {} is not before end {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    pub fn duration(&self) -> i64 {
        self.end - self.start
    }

    /// Directory name of this segment under its channel directory.
    pub fn dir_name(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.start, SEGMENT_SEPARATOR, self.end)
    }
}

impl FromStr for Segment {
    type Err = GwError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let mut parts = trimmed.split(SEGMENT_SEPARATOR);

        let (start, end) = match (parts.next(), parts.next(), parts.next()) {
            (Some(a), Some(b), None) => (a, b),
            _ => return Err(GwError::InvalidSegment(s.to_string())),
        };

        let start: i64 = start
            .parse()
            .map_err(|_| GwError::InvalidSegment(s.to_string()))?;
        let end: i64 = end
            .parse()
            .map_err(|_| GwError::InvalidSegment(s.to_string()))?;

        Segment::new(start, end)
    }
}

/// A detector data stream identifier, e.g. `H1:GDS-CALIB_STRAIN` or `H:H1_GWOSC_4KHZ_R1`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Channel(String);

impl Channel {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// OSDF channels are addressed as `<site>:<frame type>`.
    pub fn from_site_and_frametype(site: &str, frametype: &str) -> Self {
        Self(format!("{}{}{}", site, CHANNEL_SEPARATOR, frametype))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Replaces the first `:` with `_`.
    pub fn dir_name(&self) -> String {
        self.0
            .replacen(CHANNEL_SEPARATOR, &CHANNEL_DIR_SEPARATOR.to_string(), 1)
    }

    /// Refuses names whose directory would not be a single entry under the data root.
    pub fn validate(&self) -> Result<()> {
        if !is_plain_file_name(&self.dir_name()) {
            return Err(GwError::InvalidChannel(self.0.clone()));
        }
        Ok(())
    }

    /// Inverse of [`Channel::dir_name`]: replaces the first `_` with `:`.
    pub fn from_dir_name(dir: &str) -> Self {
        Self(dir.replacen(CHANNEL_DIR_SEPARATOR, &CHANNEL_SEPARATOR.to_string(), 1))
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// `name` is exactly one ordinary path component: no separators, `.` or `..`.
pub fn is_plain_file_name(name: &str) -> bool {
    if name.contains(['/', '\\']) {
        return false;
    }
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

/// Parses `<OBS>-<TAG>-<GPS>-<DUR>.gwf` into `(gps, duration)`.
///
/// Only the last two dash-separated fields are read, so tags containing
/// dashes are fine.
pub fn parse_frame_name(name: &str) -> Result<(i64, i64)> {
    let stem = name
        .strip_suffix(&format!(".{}", FRAME_EXT))
        .unwrap_or(name);

    let mut fields = stem.rsplit('-');
    let duration = fields.next();
    let timestamp = fields.next();

    match (timestamp, duration) {
        (Some(ts), Some(dur)) => {
            let ts = ts
                .parse::<i64>()
                .map_err(|_| GwError::InvalidFrameName(name.to_string()))?;
            let dur = dur
                .parse::<i64>()
                .map_err(|_| GwError::InvalidFrameName(name.to_string()))?;
            Ok((ts, dur))
        }
        _ => Err(GwError::InvalidFrameName(name.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_must_stay_under_root() {
        assert!(Channel::new("H1:GDS-CALIB_STRAIN").validate().is_ok());
        assert!(Channel::from_site_and_frametype("H", "H1_GWOSC_4KHZ_R1").validate().is_ok());
        assert!(Channel::new("../../escaped").validate().is_err());
        assert!(Channel::new("..").validate().is_err());
        assert!(Channel::new("H1:a/b").validate().is_err());
        assert!(Channel::new("").validate().is_err());
        assert!(Channel::from_site_and_frametype("..", "x/../..").validate().is_err());
    }

    #[test]
    fn test_plain_file_name() {
        assert!(is_plain_file_name("H-H1_TEST-100-10.gwf"));
        assert!(!is_plain_file_name("../H-H1_TEST-100-10.gwf"));
        assert!(!is_plain_file_name("a\\b.gwf"));
        assert!(!is_plain_file_name("."));
        assert!(!is_plain_file_name("/etc/passwd"));
    }

    #[test]
    fn test_segment_parse() {
        let seg: Segment = "1126259446_1126259478".parse().unwrap();
        assert_eq!(seg.start, 1126259446);
        assert_eq!(seg.end, 1126259478);
        assert_eq!(seg.duration(), 32);
        assert_eq!(seg.to_string(), "1126259446_1126259478");
    }

    #[test]
    fn test_segment_rejects_bad_input() {
        for bad in ["", "100", "abc_200", "100_abc", "200_100", "100_100", "1_2_3", "100-200"] {
            assert!(
                matches!(bad.parse::<Segment>(), Err(GwError::InvalidSegment(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_segment_trims_whitespace() {
        let seg: Segment = " 100_110 ".parse().unwrap();
        assert_eq!(seg, Segment { start: 100, end: 110 });
    }

    #[test]
    fn test_channel_dir_name_round_trip() {
        for name in ["H1:GDS-CALIB_STRAIN", "H:H1_GWOSC_4KHZ_R1", "L1:TEST", "V1:Hrec_hoft_16384Hz"] {
            let channel = Channel::new(name);
            let dir = channel.dir_name();
            assert!(!dir.contains(':'));
            assert_eq!(Channel::from_dir_name(&dir), channel);
        }
    }

    #[test]
    fn test_channel_dir_name_replaces_first_separator_only() {
        let channel = Channel::new("H1:A:B");
        assert_eq!(channel.dir_name(), "H1_A:B");
        assert_eq!(Channel::from_dir_name("H1_A:B").as_str(), "H1:A:B");
    }

    #[test]
    fn test_site_and_frametype() {
        let channel = Channel::from_site_and_frametype("H", "H1_GWOSC_4KHZ_R1");
        assert_eq!(channel.as_str(), "H:H1_GWOSC_4KHZ_R1");
        assert_eq!(channel.dir_name(), "H_H1_GWOSC_4KHZ_R1");
    }

    #[test]
    fn test_parse_frame_name() {
        let (ts, dur) = parse_frame_name("H-H1_GWOSC_4KHZ_R1-1126256640-4096.gwf").unwrap();
        assert_eq!(ts, 1126256640);
        assert_eq!(dur, 4096);

        let (ts, dur) = parse_frame_name("L-L1_HOFT-C00-1238163456-4096.gwf").unwrap();
        assert_eq!((ts, dur), (1238163456, 4096));

        assert!(parse_frame_name("no_dashes_here.gwf").is_err());
        assert!(parse_frame_name("H-H1-abc-4096.gwf").is_err());
    }
}
