//! Console progress rendering
//!
//! Drives an indicatif bar from a task handle's atomics. The renderer
//! only polls; it never feeds back into the task or the engine, so the
//! download behaves identically with the bar disabled.

use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tokio::task::JoinHandle;

use crate::app::task::{DownloadState, DownloadTask};

const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Polls a task and renders its progress until the task settles
pub struct ProgressReporter {
    poller: JoinHandle<()>,
}

impl ProgressReporter {
    /// Attach a progress bar to `task` and start polling it
    pub fn attach(task: Arc<DownloadTask>) -> Self {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template(
                "{bar:40.cyan/blue} {bytes}/{total_bytes} ({bytes_per_sec}, {eta}) {msg}",
            )
            .expect("progress template is valid")
            .progress_chars("=>-"),
        );
        bar.set_message(task.url().to_string());

        let poller = tokio::spawn(async move {
            loop {
                let total = task.total_bytes();
                if total > 0 && bar.length() != Some(total) {
                    bar.set_length(total);
                }
                bar.set_position(task.bytes_downloaded());

                if task.state().is_terminal() {
                    break;
                }
                tokio::time::sleep(POLL_INTERVAL).await;
            }

            match task.state() {
                DownloadState::Completed => bar.finish_with_message("done"),
                DownloadState::Canceled => bar.abandon_with_message("canceled"),
                _ => bar.abandon_with_message("failed"),
            }
        });

        Self { poller }
    }

    /// Wait for the final render
    pub async fn finish(self) {
        let _ = self.poller.await;
    }
}
