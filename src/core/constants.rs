// Naming and layout constants shared by the fetchers, the manifest builder and the runner

use std::time::Duration;

/// Manifest file name, one per channel directory.
pub const MANIFEST_FILE: &str = "fin.ffl";

/// Extension of frame files written to segment directories.
pub const FRAME_EXT: &str = "gwf";

/// Suffix used while a download is in flight.
pub const PARTIAL_SUFFIX: &str = ".part";

/// Combined Omicron output, teed next to its results.
pub const OMICRON_LOG_FILE: &str = "omicron.out";

/// Separator between start and end in a segment name.
pub const SEGMENT_SEPARATOR: char = '_';

/// Channel identifier separator and its on-disk replacement.
pub const CHANNEL_SEPARATOR: char = ':';
pub const CHANNEL_DIR_SEPARATOR: char = '_';

// Trailing flag columns of every manifest line
pub const MANIFEST_FLAGS: &str = "0 0";

pub const DEFAULT_COURTESY_DELAY: Duration = Duration::from_millis(1500);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);
pub const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(180);

/// Finished jobs kept in the registry before the oldest are pruned.
pub const DEFAULT_JOB_RETENTION: usize = 32;
