//! Download task lifecycle and progress tracking
//!
//! A [`DownloadTask`] is the shared record for one URL -> file transfer. It
//! is observed and controlled concurrently by the manager, the executing
//! worker, and any external holder of the handle, so every field is either
//! immutable, atomic, or behind its own small lock:
//!
//! - the lifecycle state lives in a single `AtomicU8` and every transition
//!   is a compare-and-swap from a specific expected state, which makes the
//!   transitions linearizable without a lock;
//! - byte counters are relaxed atomics, good enough for display;
//! - the error message is the only string and takes the only mutex. The
//!   message is stored before the `Failed` state, so an observer that reads
//!   `Failed` always reads the message that caused it.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};
use std::time::{Duration, Instant};

use tokio::sync::Notify;
use tracing::{info, warn};

use crate::app::hash::Sha256Digest;

/// Lifecycle state of a download task
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadState {
    Queued = 0,
    Downloading = 1,
    Paused = 2,
    Completed = 3,
    Failed = 4,
    Canceled = 5,
}

impl DownloadState {
    /// Terminal states admit no further transitions
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            DownloadState::Completed | DownloadState::Failed | DownloadState::Canceled
        )
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => DownloadState::Queued,
            1 => DownloadState::Downloading,
            2 => DownloadState::Paused,
            3 => DownloadState::Completed,
            4 => DownloadState::Failed,
            _ => DownloadState::Canceled,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DownloadState::Queued => "Queued",
            DownloadState::Downloading => "Downloading",
            DownloadState::Paused => "Paused",
            DownloadState::Completed => "Completed",
            DownloadState::Failed => "Failed",
            DownloadState::Canceled => "Canceled",
        }
    }
}

impl fmt::Display for DownloadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Plain-value snapshot of a task's transfer parameters
///
/// This is what the transfer engine consumes; it carries no live state.
#[derive(Debug, Clone)]
pub struct TransferParams {
    pub url: String,
    pub destination: PathBuf,
    /// Number of retries after the first attempt (0 = exactly one attempt)
    pub retry_budget: u32,
    pub overall_timeout: Duration,
    pub connect_timeout: Duration,
    /// `Some` enables whole-file SHA-256 verification after finalize
    pub expected_checksum: Option<Sha256Digest>,
}

/// One unit of intended transfer with its lifecycle state
#[derive(Debug)]
pub struct DownloadTask {
    params: TransferParams,
    state: AtomicU8,
    bytes_downloaded: AtomicU64,
    total_bytes: AtomicU64,
    error_message: Mutex<String>,
    start_time: OnceLock<Instant>,
    pause_confirmed: Notify,
}

impl DownloadTask {
    /// Create a task in the `Queued` state
    pub fn new(params: TransferParams) -> Self {
        info!(
            "created download task: {} -> {}",
            params.url,
            params.destination.display()
        );
        Self {
            params,
            state: AtomicU8::new(DownloadState::Queued as u8),
            bytes_downloaded: AtomicU64::new(0),
            total_bytes: AtomicU64::new(0),
            error_message: Mutex::new(String::new()),
            start_time: OnceLock::new(),
            pause_confirmed: Notify::new(),
        }
    }

    pub fn url(&self) -> &str {
        &self.params.url
    }

    pub fn destination(&self) -> &Path {
        &self.params.destination
    }

    /// Current lifecycle state (lock-free)
    pub fn state(&self) -> DownloadState {
        DownloadState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// `Queued -> Downloading`. Returns whether this call won the
    /// transition; repeated calls are no-ops with a warning.
    pub fn start(&self) -> bool {
        if self.transition(DownloadState::Queued, DownloadState::Downloading) {
            let _ = self.start_time.set(Instant::now());
            info!("download started: {}", self.url());
            true
        } else {
            warn!(
                "cannot start download, current state: {}",
                self.state()
            );
            false
        }
    }

    /// `Downloading -> Paused`, signaling the pause confirmation
    pub fn pause(&self) -> bool {
        if self.transition(DownloadState::Downloading, DownloadState::Paused) {
            info!("download paused: {}", self.url());
            self.pause_confirmed.notify_waiters();
            true
        } else {
            warn!("cannot pause download, current state: {}", self.state());
            false
        }
    }

    /// `Paused -> Downloading`
    pub fn resume(&self) -> bool {
        if self.transition(DownloadState::Paused, DownloadState::Downloading) {
            info!("download resumed: {}", self.url());
            true
        } else {
            warn!("cannot resume download, current state: {}", self.state());
            false
        }
    }

    /// Move to `Canceled` from any non-terminal state
    pub fn cancel(&self) -> bool {
        let mut current = self.state();
        while !current.is_terminal() {
            match self.state.compare_exchange(
                current as u8,
                DownloadState::Canceled as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    info!("download canceled: {}", self.url());
                    return true;
                }
                Err(observed) => current = DownloadState::from_u8(observed),
            }
        }
        warn!("cannot cancel download, current state: {}", current);
        false
    }

    /// Move to `Completed`. Logs a warning if the task is already terminal.
    pub fn mark_completed(&self) {
        let mut current = self.state();
        while !current.is_terminal() {
            match self.state.compare_exchange(
                current as u8,
                DownloadState::Completed as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    info!("download completed: {}", self.url());
                    return;
                }
                Err(observed) => current = DownloadState::from_u8(observed),
            }
        }
        warn!(
            "cannot mark download completed, state already terminal: {}",
            current
        );
    }

    /// Record the failure message, then move to `Failed`. The message store
    /// precedes the state store so a reader that observes `Failed` reads
    /// the message that caused it.
    pub fn mark_failed(&self, message: impl Into<String>) {
        let message = message.into();
        {
            let mut slot = self
                .error_message
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            *slot = message.clone();
        }

        let mut current = self.state();
        while !current.is_terminal() {
            match self.state.compare_exchange(
                current as u8,
                DownloadState::Failed as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    tracing::error!("download failed: {} error: {}", self.url(), message);
                    return;
                }
                Err(observed) => current = DownloadState::from_u8(observed),
            }
        }
        warn!(
            "cannot mark download failed, state already terminal: {}",
            current
        );
    }

    /// Failure message; meaningful only in the `Failed` state
    pub fn error_message(&self) -> String {
        self.error_message
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Store progress counters (relaxed; readers get a display-grade view)
    pub fn update_progress(&self, bytes_downloaded: u64, total_bytes: u64) {
        self.bytes_downloaded
            .store(bytes_downloaded, Ordering::Relaxed);
        self.total_bytes.store(total_bytes, Ordering::Relaxed);
    }

    pub fn bytes_downloaded(&self) -> u64 {
        self.bytes_downloaded.load(Ordering::Relaxed)
    }

    /// Total size in bytes; 0 while unknown
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes.load(Ordering::Relaxed)
    }

    /// Percentage in [0, 100]; 0.0 while the total is unknown
    pub fn progress_percentage(&self) -> f64 {
        let total = self.total_bytes();
        if total == 0 {
            return 0.0;
        }
        (self.bytes_downloaded() as f64 / total as f64) * 100.0
    }

    /// Cooperative interrupt probe for the transfer engine: the transfer
    /// keeps going only while the task is `Downloading`.
    pub fn should_continue(&self) -> bool {
        DownloadState::from_u8(self.state.load(Ordering::Relaxed)) == DownloadState::Downloading
    }

    /// Block until the state is observed as `Paused` or the timeout elapses
    pub async fn wait_for_pause(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            // Register before checking, so a pause between the check and the
            // await cannot be missed.
            let notified = self.pause_confirmed.notified();
            if self.state() == DownloadState::Paused {
                return true;
            }

            let now = tokio::time::Instant::now();
            if now >= deadline {
                warn!("pause timeout for: {}", self.url());
                return false;
            }
            if tokio::time::timeout(deadline - now, notified).await.is_err() {
                let paused = self.state() == DownloadState::Paused;
                if !paused {
                    warn!("pause timeout for: {}", self.url());
                }
                return paused;
            }
        }
    }

    /// Instant of the first `Queued -> Downloading` transition
    pub fn start_time(&self) -> Option<Instant> {
        self.start_time.get().copied()
    }

    /// Snapshot of the transfer parameters for the engine
    pub fn to_params(&self) -> TransferParams {
        self.params.clone()
    }

    fn transition(&self, from: DownloadState, to: DownloadState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}
