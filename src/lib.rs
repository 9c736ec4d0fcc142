//! parafetch library
//!
//! A concurrent, resumable HTTP(S) file downloader. Given a set of URLs,
//! it fetches each to a local destination with bounded concurrency,
//! partial-file resume over HTTP range requests, retry with
//! transient/permanent error classification, pause/resume control, and
//! optional SHA-256 verification of the delivered bytes.
//!
//! # Key Features
//!
//! - **CAS-based task lifecycle** observable and controllable from any
//!   thread without locks
//! - **Bounded concurrency** over a fixed FIFO worker pool
//! - **Resumable transfers** that continue from the `.part` file on disk
//! - **Retry with exponential backoff** driven by error classification
//! - **Cooperative pause/cancel** honored between body chunks
//! - **Atomic finalization** (`.part` rename) and SHA-256 verification
//!
//! # Architecture Overview
//!
//! - [`app`] - core components: task, worker pool, transfer engine,
//!   download manager
//! - [`config`] - persistent JSON configuration and merge precedence
//! - [`logging`] - the process-wide log format and sinks
//! - [`errors`] - error types per component domain
//! - [`cli`] - the binary's argument surface (not re-exported)
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::path::PathBuf;
//! use std::time::Duration;
//!
//! use parafetch::{DownloadManager, TransferParams};
//!
//! #[tokio::main]
//! async fn main() {
//!     let manager = DownloadManager::new(4);
//!     let task = manager.add_download(TransferParams {
//!         url: "http://example.com/a.bin".to_string(),
//!         destination: PathBuf::from("a.bin"),
//!         retry_budget: 3,
//!         overall_timeout: Duration::from_secs(300),
//!         connect_timeout: Duration::from_secs(30),
//!         expected_checksum: None,
//!     });
//!
//!     manager.start();
//!     manager.wait_for_completion().await;
//!     println!("final state: {}", task.state());
//! }
//! ```
//!
//! # Pause and Resume
//!
//! ```rust,no_run
//! # async fn example(manager: &parafetch::DownloadManager) {
//! // Pausing keeps the partial file; resuming continues from its size
//! // via an HTTP range request.
//! manager.pause_download("http://example.com/a.bin").await;
//! manager.resume_download("http://example.com/a.bin").await;
//! # }
//! ```

pub mod app;
pub mod config;
pub mod constants;
pub mod errors;
pub mod logging;

// Prelude module for convenient imports
pub mod prelude;

// CLI module - public for main.rs access but contents not re-exported,
// keeping clap and indicatif out of library consumers' way.
pub mod cli;

// Re-export the most commonly used types at the top level
pub use errors::{AppError, Result};

pub use app::{
    hash_file,
    verify_file,
    classify_status,
    classify_transport,
    CompletionHandle,
    DownloadManager,
    DownloadState,
    DownloadTask,
    ErrorClass,
    Sha256Digest,
    TransferEngine,
    TransferOutcome,
    TransferParams,
    WorkerPool,
};

pub use config::FileConfig;

/// Library version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
