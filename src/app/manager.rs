//! Download orchestration
//!
//! The [`DownloadManager`] owns the set of download tasks, caps how many
//! transfers run at once, and dispatches runnable tasks to the worker
//! pool. Each work item drives the transfer engine for one task and writes
//! the outcome back onto it; pause, resume, and cancel flow through the
//! task's own state machine, with the engine observing it via the
//! `should_continue` probe handed over at dispatch time. Tasks never hold
//! a reference back to the manager.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::app::pool::WorkerPool;
use crate::app::task::{DownloadState, DownloadTask, TransferParams};
use crate::app::transfer::{TransferEngine, TransferOutcome};
use crate::constants::manager::{COMPLETION_POLL_INTERVAL, PAUSE_CONFIRM_TIMEOUT};
use crate::errors::PoolError;

/// Concurrent download orchestrator
#[derive(Debug)]
pub struct DownloadManager {
    inner: Arc<ManagerInner>,
}

#[derive(Debug)]
struct ManagerInner {
    /// Task registry in insertion order; tasks are never removed
    tasks: Mutex<Vec<Arc<DownloadTask>>>,
    /// Taken (and consumed) by shutdown; `None` afterwards refuses work
    pool: Mutex<Option<WorkerPool>>,
    engine: TransferEngine,
    max_concurrent: usize,
    /// Work items currently mid-flight (not task states)
    active_count: AtomicUsize,
    /// Terminal transitions observed by work items (success or failure,
    /// but never pause)
    completed_count: AtomicUsize,
    running: AtomicBool,
    /// Signaled whenever a work item finishes, for completion waiters
    work_available: Notify,
}

impl DownloadManager {
    /// Create a manager running at most `max_concurrent` transfers at once
    pub fn new(max_concurrent: usize) -> Self {
        assert!(max_concurrent > 0, "max_concurrent must be positive");
        info!(
            "created download manager with max {} concurrent downloads",
            max_concurrent
        );
        Self {
            inner: Arc::new(ManagerInner {
                tasks: Mutex::new(Vec::new()),
                pool: Mutex::new(Some(WorkerPool::new(max_concurrent))),
                engine: TransferEngine::new(),
                max_concurrent,
                active_count: AtomicUsize::new(0),
                completed_count: AtomicUsize::new(0),
                running: AtomicBool::new(false),
                work_available: Notify::new(),
            }),
        }
    }

    /// Register a new download in the `Queued` state and return its handle.
    ///
    /// Safe before or after [`start`](Self::start); once the manager is
    /// running, the task is considered for dispatch immediately.
    pub fn add_download(&self, params: TransferParams) -> Arc<DownloadTask> {
        let task = Arc::new(DownloadTask::new(params));
        {
            let mut tasks = self.inner.lock_tasks();
            tasks.push(Arc::clone(&task));
        }
        info!(
            "added download: {} -> {}",
            task.url(),
            task.destination().display()
        );
        if self.inner.running.load(Ordering::Acquire) {
            self.inner.dispatch_next();
        }
        task
    }

    /// Begin dispatching queued tasks, up to the concurrency cap
    pub fn start(&self) {
        self.inner.running.store(true, Ordering::Release);
        info!("starting download manager");
        for _ in 0..self.inner.max_concurrent {
            self.inner.dispatch_next();
        }
    }

    /// Pause the first task matching `url` (insertion order) and wait up
    /// to 5 s for the pause to be confirmed. Returns whether it was.
    pub async fn pause_download(&self, url: &str) -> bool {
        let Some(task) = self.find_task(url) else {
            warn!("cannot pause: task not found: {}", url);
            return false;
        };

        task.pause();
        let confirmed = task.wait_for_pause(PAUSE_CONFIRM_TIMEOUT).await;
        if !confirmed {
            tracing::error!("pause failed for: {}", url);
        }
        confirmed
    }

    /// Resume the first `Paused` task matching `url` (insertion order).
    ///
    /// The partial file on disk is the resume point; a fresh work item
    /// re-enters the transfer engine when capacity allows.
    pub async fn resume_download(&self, url: &str) -> bool {
        let task = {
            let tasks = self.inner.lock_tasks();
            tasks
                .iter()
                .find(|task| task.url() == url && task.state() == DownloadState::Paused)
                .cloned()
        };
        let Some(task) = task else {
            warn!("cannot resume: task not found or not paused: {}", url);
            return false;
        };
        self.inner.resume_task(&task)
    }

    /// Pause every downloading task and wait for each confirmation
    pub async fn pause_all(&self) {
        let downloading: Vec<_> = {
            let tasks = self.inner.lock_tasks();
            tasks
                .iter()
                .filter(|task| task.state() == DownloadState::Downloading)
                .cloned()
                .collect()
        };
        info!("pausing {} downloads", downloading.len());

        for task in &downloading {
            task.pause();
        }
        for task in &downloading {
            task.wait_for_pause(PAUSE_CONFIRM_TIMEOUT).await;
        }
    }

    /// Resume every paused task, capacity permitting
    pub async fn resume_all(&self) {
        let paused: Vec<_> = {
            let tasks = self.inner.lock_tasks();
            tasks
                .iter()
                .filter(|task| task.state() == DownloadState::Paused)
                .cloned()
                .collect()
        };
        info!("resuming {} downloads", paused.len());

        for task in &paused {
            self.inner.resume_task(task);
        }
    }

    /// Wait until no task is `Queued` or `Downloading`.
    ///
    /// Paused tasks count as settled: this returns as soon as nothing is
    /// actively running or waiting to run, even if everything is paused.
    /// Callers that want full drainage must resume first.
    pub async fn wait_for_completion(&self) {
        info!("waiting for all downloads to complete...");
        loop {
            let notified = self.inner.work_available.notified();
            if self.inner.is_settled() {
                break;
            }
            // The timeout guards against settling transitions that bypass
            // work items, such as canceling a still-queued task.
            let _ = tokio::time::timeout(COMPLETION_POLL_INTERVAL, notified).await;
        }
        self.inner.running.store(false, Ordering::Release);
        info!("all downloads complete");
    }

    /// Wait for completion, then tear the worker pool down
    pub async fn shutdown(self) {
        info!("shutting down download manager");
        self.wait_for_completion().await;
        // Taking the pool consumes it on shutdown; any straggling dispatch
        // now sees `None` and is refused.
        let pool = self.inner.lock_pool().take();
        if let Some(pool) = pool {
            pool.shutdown().await;
        }
    }

    /// Work items currently mid-flight
    pub fn active_count(&self) -> usize {
        self.inner.active_count.load(Ordering::Acquire)
    }

    /// Tasks that reached a terminal state through a work item
    pub fn completed_count(&self) -> usize {
        self.inner.completed_count.load(Ordering::Acquire)
    }

    /// Tasks still waiting to be dispatched
    pub fn queued_count(&self) -> usize {
        let tasks = self.inner.lock_tasks();
        tasks
            .iter()
            .filter(|task| task.state() == DownloadState::Queued)
            .count()
    }

    /// Total number of registered tasks
    pub fn total_count(&self) -> usize {
        self.inner.lock_tasks().len()
    }

    /// Snapshot of every task handle, in insertion order
    pub fn tasks(&self) -> Vec<Arc<DownloadTask>> {
        self.inner.lock_tasks().clone()
    }

    /// First task matching `url`, in insertion order
    pub fn find_task(&self, url: &str) -> Option<Arc<DownloadTask>> {
        let tasks = self.inner.lock_tasks();
        tasks.iter().find(|task| task.url() == url).cloned()
    }
}

impl ManagerInner {
    fn lock_tasks(&self) -> std::sync::MutexGuard<'_, Vec<Arc<DownloadTask>>> {
        self.tasks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_pool(&self) -> std::sync::MutexGuard<'_, Option<WorkerPool>> {
        self.pool
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn is_settled(&self) -> bool {
        let tasks = self.lock_tasks();
        tasks.iter().all(|task| {
            !matches!(
                task.state(),
                DownloadState::Queued | DownloadState::Downloading
            )
        })
    }

    /// Dispatch the first queued task if a concurrency slot is free
    fn dispatch_next(self: &Arc<Self>) {
        let task = {
            let tasks = self.lock_tasks();
            tasks
                .iter()
                .find(|task| task.state() == DownloadState::Queued)
                .cloned()
        };
        let Some(task) = task else {
            return;
        };

        if !self.try_reserve_slot() {
            return;
        }
        self.spawn_transfer(task, false);
    }

    /// Claim a concurrency slot; CAS so racing dispatchers cannot
    /// overshoot the cap
    fn try_reserve_slot(&self) -> bool {
        let mut current = self.active_count.load(Ordering::Acquire);
        loop {
            if current >= self.max_concurrent {
                return false;
            }
            match self.active_count.compare_exchange(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(observed) => current = observed,
            }
        }
    }

    /// `Paused -> Downloading`, then re-enter the engine if capacity allows
    fn resume_task(self: &Arc<Self>, task: &Arc<DownloadTask>) -> bool {
        if !task.resume() {
            return false;
        }
        if self.try_reserve_slot() {
            self.spawn_transfer(Arc::clone(task), true);
        } else {
            warn!(
                "no free capacity to resume {} immediately",
                task.url()
            );
        }
        true
    }

    fn spawn_transfer(self: &Arc<Self>, task: Arc<DownloadTask>, resumed: bool) {
        let inner = Arc::clone(self);
        let submitted = {
            let pool = self.lock_pool();
            match pool.as_ref() {
                Some(pool) => pool.submit(async move { inner.run_transfer(task, resumed).await }),
                None => Err(PoolError::Stopped),
            }
        };
        if let Err(error) = submitted {
            warn!("could not submit work item: {}", error);
            self.active_count.fetch_sub(1, Ordering::AcqRel);
            self.work_available.notify_waiters();
        }
    }

    /// The work item: claim the task, drive the engine, record the outcome
    async fn run_transfer(self: Arc<Self>, task: Arc<DownloadTask>, resumed: bool) {
        debug!("worker picked up {}", task.url());

        // A fresh dispatch must win the Queued -> Downloading transition;
        // a resumed dispatch was transitioned by resume() already. Either
        // way, only a Downloading task may drive the engine, which keeps a
        // single writer on the part file.
        let claimed = if resumed {
            task.state() == DownloadState::Downloading
        } else {
            task.start()
        };

        if claimed {
            let params = task.to_params();
            let probe = {
                let task = Arc::clone(&task);
                move || task.should_continue()
            };
            let progress = {
                let task = Arc::clone(&task);
                move |done, total| task.update_progress(done, total)
            };

            match self.engine.run(&params, probe, progress).await {
                Ok(TransferOutcome::Completed) => task.mark_completed(),
                Ok(TransferOutcome::Interrupted) => {
                    // Paused or canceled mid-flight; the task state already
                    // says which, and a paused task keeps its partial file.
                    debug!(
                        "transfer interrupted for {} (state: {})",
                        task.url(),
                        task.state()
                    );
                }
                Err(error) => {
                    if task.state().is_terminal() {
                        debug!(
                            "transfer for {} failed after the task settled: {}",
                            task.url(),
                            error
                        );
                    } else {
                        task.mark_failed(error.to_string());
                    }
                }
            }
        }

        self.active_count.fetch_sub(1, Ordering::AcqRel);

        let state = task.state();
        if claimed && state != DownloadState::Paused {
            self.completed_count.fetch_add(1, Ordering::AcqRel);
        }
        // A paused task frees its slot without chaining a dispatch; the
        // next dispatch happens when another item finishes or a resume
        // arrives.
        if state != DownloadState::Paused && self.running.load(Ordering::Acquire) {
            self.dispatch_next();
        }

        debug!(
            "download worker finished: {} (state: {})",
            task.url(),
            state
        );
        self.work_available.notify_waiters();
    }
}
