//! Error types for parafetch
//!
//! One enum per component domain, aggregated by a transparent [`AppError`].
//! Transfer errors distinguish the transient class (absorbed by the retry
//! loop) from permanent classes that surface to the orchestrator.

use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by a single URL -> file transfer
#[derive(Error, Debug)]
pub enum TransferError {
    /// Filesystem operation failed (create dir, open, write, remove)
    #[error("file I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Preflight found less free space than the announced content length
    #[error("insufficient disk space: {required} bytes required, {available} available")]
    DiskFull { required: u64, available: u64 },

    /// 4xx response, or a transport failure that retrying cannot fix
    #[error("permanent HTTP failure: {reason}")]
    HttpPermanent { reason: String },

    /// 5xx response or a network hiccup; absorbed by the retry loop
    #[error("transient HTTP failure: {reason}")]
    HttpTransient { reason: String },

    /// Every transient retry was consumed
    #[error("retries exhausted after {attempts} attempts; last error: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    /// Delivered bytes do not match the expected SHA-256
    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    /// Renaming the temp file onto the destination failed. The temp file is
    /// kept so the downloaded bytes can be recovered manually.
    #[error("could not finalize download: rename {} -> {} failed: {source}", temp.display(), dest.display())]
    FinalizeFailed {
        temp: PathBuf,
        dest: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl TransferError {
    /// Whether the retry loop may absorb this error
    pub fn is_transient(&self) -> bool {
        matches!(self, TransferError::HttpTransient { .. })
    }
}

/// Worker pool errors
#[derive(Error, Debug)]
pub enum PoolError {
    /// Submission refused or work item dropped because the pool shut down
    #[error("worker pool is stopped")]
    Stopped,

    /// A work item panicked; the worker survived and the panic was captured
    #[error("work item panicked: {detail}")]
    TaskPanicked { detail: String },
}

/// Configuration file errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Could not read or write the configuration file
    #[error("configuration I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration file is not valid JSON
    #[error("malformed configuration file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Command-line argument errors
#[derive(Error, Debug)]
pub enum ArgError {
    /// URL does not start with http:// or https://, or is too short
    #[error("invalid URL '{url}': must start with http:// or https:// and name a host")]
    InvalidUrl { url: String },

    /// Checksum is not a 64-character hex string (optionally prefixed "sha256:")
    #[error("invalid checksum '{value}': expected 64 hex characters, optionally prefixed 'sha256:'")]
    InvalidChecksum { value: String },

    /// A flag value is outside its accepted range
    #[error("invalid value for {flag}: {reason}")]
    InvalidValue { flag: &'static str, reason: String },
}

/// Hash parsing errors
#[derive(Error, Debug)]
pub enum HashError {
    /// Not a valid SHA-256 hex digest
    #[error("invalid SHA-256 hex digest: {value}")]
    InvalidDigest { value: String },
}

/// Top-level application error that can represent any component error
#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Args(#[from] ArgError),

    #[error(transparent)]
    Hash(#[from] HashError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Generic application error with context
    #[error("{message}")]
    Generic { message: String },
}

impl AppError {
    /// Create a generic application error with a message
    pub fn generic(message: impl Into<String>) -> Self {
        Self::Generic {
            message: message.into(),
        }
    }

    /// Error domain, for logging
    pub fn category(&self) -> &'static str {
        match self {
            AppError::Transfer(_) => "transfer",
            AppError::Pool(_) => "pool",
            AppError::Config(_) => "config",
            AppError::Args(_) => "arguments",
            AppError::Hash(_) => "hash",
            AppError::Io(_) => "io",
            AppError::Generic { .. } => "generic",
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;

/// Transfer result type alias
pub type TransferResult<T> = std::result::Result<T, TransferError>;

/// Pool result type alias
pub type PoolResult<T> = std::result::Result<T, PoolError>;

/// Configuration result type alias
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Argument result type alias
pub type ArgResult<T> = std::result::Result<T, ArgError>;
