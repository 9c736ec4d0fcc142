//! Command-line interface for parafetch
//!
//! Parses and validates the arguments, merges them with the persistent
//! configuration, runs a single download through the manager, and shapes
//! the outcome into an exit status for `main`.

pub mod args;
pub mod progress;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::app::manager::DownloadManager;
use crate::app::task::{DownloadState, TransferParams};
use crate::config::{config_dir, FileConfig};
use crate::errors::{AppError, Result};

pub use args::Cli;
pub use progress::ProgressReporter;

/// Execute the download described by the CLI arguments.
///
/// Errors map to a nonzero exit status in `main`.
pub async fn run(cli: Cli) -> Result<()> {
    args::validate_url(&cli.url)?;

    let cfg_dir = config_dir();
    FileConfig::ensure_exists(&cfg_dir);
    let file_config = FileConfig::load_from(&cfg_dir);

    let params = resolve_params(&cli, &file_config)?;
    info!(
        "downloading {} -> {}",
        params.url,
        params.destination.display()
    );

    let manager = DownloadManager::new(1);
    let task = manager.add_download(params);
    let reporter = (!cli.quiet).then(|| ProgressReporter::attach(Arc::clone(&task)));

    manager.start();
    manager.shutdown().await;
    if let Some(reporter) = reporter {
        reporter.finish().await;
    }

    match task.state() {
        DownloadState::Completed => Ok(()),
        DownloadState::Failed => Err(AppError::generic(task.error_message())),
        state => Err(AppError::generic(format!(
            "download ended in unexpected state: {state}"
        ))),
    }
}

/// Merge CLI arguments, file configuration, and built-in defaults into
/// the transfer parameters (CLI > file > default).
fn resolve_params(cli: &Cli, file_config: &FileConfig) -> Result<TransferParams> {
    let timeout_seconds = file_config.effective_timeout_seconds(cli.timeout);
    args::validate_positive("--timeout", timeout_seconds)?;
    let connect_timeout_seconds =
        file_config.effective_connect_timeout_seconds(cli.connect_timeout);
    args::validate_positive("--connect-timeout", connect_timeout_seconds)?;

    let expected_checksum = cli
        .checksum
        .as_deref()
        .map(args::parse_checksum)
        .transpose()?;

    let destination = match &cli.output {
        Some(path) => path.clone(),
        None => {
            let name = args::default_output_name(&cli.url);
            match &file_config.default_download_dir {
                Some(dir) if !dir.is_empty() => PathBuf::from(dir).join(name),
                _ => PathBuf::from(name),
            }
        }
    };

    Ok(TransferParams {
        url: cli.url.clone(),
        destination,
        retry_budget: file_config.effective_retry_count(cli.retry_count),
        overall_timeout: Duration::from_secs(timeout_seconds),
        connect_timeout: Duration::from_secs(connect_timeout_seconds),
        expected_checksum,
    })
}
