//! Common imports for working with parafetch
//!
//! ```rust
//! use parafetch::prelude::*;
//! ```

pub use crate::app::{
    DownloadManager, DownloadState, DownloadTask, Sha256Digest, TransferEngine, TransferOutcome,
    TransferParams, WorkerPool,
};
pub use crate::config::FileConfig;
pub use crate::errors::{AppError, Result};
