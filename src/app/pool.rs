//! Fixed-size worker pool with FIFO dispatch
//!
//! A [`WorkerPool`] owns `N` long-lived workers that pull submitted work
//! items off a shared FIFO queue. Each submission yields a
//! [`CompletionHandle`] through which the item's outcome (including a
//! captured panic) can be observed. Workers never hold the queue while
//! executing an item.
//!
//! Shutdown is an explicit consuming [`WorkerPool::shutdown`] (Rust has
//! no async destructor): it lets in-flight items run to completion,
//! drops queued-but-unstarted items (their handles resolve to
//! [`PoolError::Stopped`]), and joins every worker. Because shutdown
//! takes the pool by value, submitting after shutdown is impossible by
//! construction; an owner that must refuse late submissions at runtime
//! parks the pool behind an `Option` and answers [`PoolError::Stopped`]
//! once it has been taken.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::errors::{PoolError, PoolResult};

type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Observes the outcome of a submitted work item
#[derive(Debug)]
pub struct CompletionHandle<T> {
    rx: oneshot::Receiver<Result<T, PoolError>>,
}

impl<T> CompletionHandle<T> {
    /// Wait for the work item to finish.
    ///
    /// Resolves to the item's output, to [`PoolError::TaskPanicked`] if the
    /// item panicked, or to [`PoolError::Stopped`] if the item was dropped
    /// unstarted during shutdown.
    pub async fn wait(self) -> Result<T, PoolError> {
        match self.rx.await {
            Ok(outcome) => outcome,
            Err(_) => Err(PoolError::Stopped),
        }
    }
}

/// Fixed-size pool of workers executing submitted futures FIFO
#[derive(Debug)]
pub struct WorkerPool {
    sender: mpsc::UnboundedSender<Job>,
    workers: Vec<JoinHandle<()>>,
    stopped: Arc<AtomicBool>,
    size: usize,
}

impl WorkerPool {
    /// Create a pool with `size` workers (must be > 0)
    pub fn new(size: usize) -> Self {
        assert!(size > 0, "worker pool requires at least one worker");
        info!("creating worker pool with {} workers", size);

        let (tx, rx) = mpsc::unbounded_channel::<Job>();
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        let stopped = Arc::new(AtomicBool::new(false));

        let workers = (0..size)
            .map(|id| {
                let rx = Arc::clone(&rx);
                let stopped = Arc::clone(&stopped);
                tokio::spawn(worker_loop(id, rx, stopped))
            })
            .collect();

        Self {
            sender: tx,
            workers,
            stopped,
            size,
        }
    }

    /// Submit a work item for execution.
    ///
    /// Items are dispatched in submission order to the next idle worker.
    /// Fails with [`PoolError::Stopped`] if the pool's queue has closed.
    pub fn submit<F, T>(&self, work: F) -> PoolResult<CompletionHandle<T>>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let job: Job = Box::pin(async move {
            let outcome = match AssertUnwindSafe(work).catch_unwind().await {
                Ok(value) => Ok(value),
                Err(payload) => Err(PoolError::TaskPanicked {
                    detail: panic_detail(payload.as_ref()),
                }),
            };
            // The submitter may have dropped its handle; that is fine.
            let _ = tx.send(outcome);
        });

        self.sender.send(job).map_err(|_| PoolError::Stopped)?;
        Ok(CompletionHandle { rx })
    }

    /// Number of workers the pool was created with
    pub fn size(&self) -> usize {
        self.size
    }

    /// Stop intake, drop unstarted items, and join every worker.
    ///
    /// In-flight items run to completion first. Consuming the pool means
    /// no further submissions can follow the shutdown.
    pub async fn shutdown(self) {
        info!("shutting down worker pool");
        self.stopped.store(true, Ordering::Release);

        // Closing the channel wakes every idle worker; items still queued
        // are received and dropped unexecuted because the stop flag is set.
        drop(self.sender);

        for handle in self.workers {
            if handle.await.is_err() {
                warn!("worker terminated abnormally during shutdown");
            }
        }
        info!("worker pool shutdown complete");
    }
}

async fn worker_loop(
    id: usize,
    rx: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<Job>>>,
    stopped: Arc<AtomicBool>,
) {
    debug!("worker {} started", id);
    loop {
        // Hold the receiver only while claiming the next item, never while
        // executing it.
        let job = {
            let mut rx = rx.lock().await;
            rx.recv().await
        };

        match job {
            Some(job) => {
                if stopped.load(Ordering::Acquire) {
                    // Drained during shutdown: drop without running, which
                    // resolves the item's handle as Stopped.
                    continue;
                }
                job.await;
            }
            None => break,
        }
    }
    debug!("worker {} exiting", id);
}

fn panic_detail(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "opaque panic payload".to_string()
    }
}
