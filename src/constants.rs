//! Application constants for parafetch
//!
//! Centralizes the defaults and tuning knobs used throughout the crate,
//! organized by functional domain.

use std::time::Duration;

/// HTTP client configuration constants
pub mod http {
    /// User agent sent with every request
    pub const USER_AGENT: &str = concat!("parafetch/", env!("CARGO_PKG_VERSION"));

    /// Default overall transfer timeout (seconds)
    pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

    /// Default connection establishment timeout (seconds)
    pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;
}

/// Retry and backoff configuration
pub mod limits {
    use super::Duration;

    /// Default number of retries after a transient failure
    pub const DEFAULT_RETRY_COUNT: u32 = 3;

    /// Cap applied to the exponential backoff delay
    pub const MAX_BACKOFF: Duration = Duration::from_secs(60);
}

/// Transfer engine constants
pub mod transfer {
    use super::Duration;

    /// Suffix appended to the destination path for in-flight bytes
    pub const PART_SUFFIX: &str = ".part";

    /// Minimum interval between progress display updates
    pub const PROGRESS_INTERVAL: Duration = Duration::from_millis(1000);

    /// Chunk size used when hashing files
    pub const HASH_CHUNK_SIZE: usize = 1024 * 1024;
}

/// Download manager constants
pub mod manager {
    use super::Duration;

    /// How long `pause_download` waits for the pause to be confirmed
    pub const PAUSE_CONFIRM_TIMEOUT: Duration = Duration::from_secs(5);

    /// Re-check interval for completion waiters
    pub const COMPLETION_POLL_INTERVAL: Duration = Duration::from_millis(200);
}

/// On-disk layout of the configuration directory
pub mod paths {
    /// Directory name under the OS configuration root
    pub const CONFIG_DIR_NAME: &str = "DownloadManager";

    /// Configuration file name
    pub const CONFIG_FILE_NAME: &str = "config.json";

    /// Log file name
    pub const LOG_FILE_NAME: &str = "download.log";

    /// Fallback output filename when the URL has no usable path segment
    pub const DEFAULT_OUTPUT_NAME: &str = "download.bin";
}

// Re-export commonly used constants for convenience
pub use http::{DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_TIMEOUT_SECS, USER_AGENT};
pub use limits::DEFAULT_RETRY_COUNT;
pub use transfer::PART_SUFFIX;
