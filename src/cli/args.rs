//! Command-line argument parsing for parafetch
//!
//! Defines the CLI surface with clap derive macros and the validation
//! that clap cannot express: URL shape, checksum format, and positive
//! timeouts. Values left unset here fall through to the configuration
//! file and then to the built-in defaults.

use std::path::PathBuf;

use clap::Parser;
use tracing::Level;
use url::Url;

use crate::app::hash::Sha256Digest;
use crate::constants::paths::DEFAULT_OUTPUT_NAME;
use crate::errors::{ArgError, ArgResult};

/// parafetch - concurrent, resumable HTTP(S) file downloader
#[derive(Parser, Debug)]
#[command(
    name = "parafetch",
    version,
    about = "Download a file over HTTP(S) with retry, resume, and SHA-256 verification",
    long_about = "A concurrent download manager: resumable transfers via HTTP range \
requests, transient-failure retry with exponential backoff, pause/resume control, \
and optional SHA-256 verification of the delivered bytes."
)]
pub struct Cli {
    /// URL to download (must start with http:// or https://)
    #[arg(value_name = "URL")]
    pub url: String,

    /// Output file path (default: last path segment of the URL)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Number of retries on transient failure (default: 3)
    #[arg(short, long = "retry-count", value_name = "N")]
    pub retry_count: Option<u32>,

    /// Download timeout in seconds (default: 300)
    #[arg(short, long, value_name = "SECONDS")]
    pub timeout: Option<u64>,

    /// Connection timeout in seconds (default: 30)
    #[arg(short = 'c', long = "connect-timeout", value_name = "SECONDS")]
    pub connect_timeout: Option<u64>,

    /// Expected SHA-256 hash for verification (optionally prefixed "sha256:")
    #[arg(long, value_name = "HASH")]
    pub checksum: Option<String>,

    /// Enable verbose (debug) logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long)]
    pub quiet: bool,
}

impl Cli {
    /// Minimum log level implied by the verbosity flags
    pub fn log_level(&self) -> Level {
        if self.quiet {
            Level::WARN
        } else if self.verbose {
            Level::DEBUG
        } else {
            Level::INFO
        }
    }
}

/// A URL is acceptable when it carries an http(s) scheme and names a host
pub fn validate_url(url: &str) -> ArgResult<()> {
    let well_prefixed =
        (url.starts_with("http://") || url.starts_with("https://")) && url.len() > 8;
    if !well_prefixed {
        return Err(ArgError::InvalidUrl {
            url: url.to_string(),
        });
    }
    Ok(())
}

/// Parse a checksum argument, stripping an optional `sha256:` prefix
pub fn parse_checksum(value: &str) -> ArgResult<Sha256Digest> {
    let hex = value.strip_prefix("sha256:").unwrap_or(value);
    Sha256Digest::from_hex(hex).map_err(|_| ArgError::InvalidChecksum {
        value: value.to_string(),
    })
}

/// Output filename derived from the URL's last path segment
pub fn default_output_name(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|parsed| {
            parsed
                .path_segments()
                .and_then(|segments| segments.last().map(str::to_string))
        })
        .filter(|segment| !segment.is_empty())
        .unwrap_or_else(|| DEFAULT_OUTPUT_NAME.to_string())
}

/// A timeout flag must be a positive number of seconds
pub fn validate_positive(flag: &'static str, value: u64) -> ArgResult<()> {
    if value == 0 {
        return Err(ArgError::InvalidValue {
            flag,
            reason: "must be positive".to_string(),
        });
    }
    Ok(())
}
