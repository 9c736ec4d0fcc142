//! Resumable HTTP transfer engine
//!
//! Performs one `(url, destination)` transfer with partial-file resume,
//! retry with exponential backoff, streamed progress, cooperative abort,
//! and optional SHA-256 verification of the delivered bytes.
//!
//! Bytes land in a sibling `<destination>.part` file and are renamed onto
//! the destination only after the body is complete, so a crash or abort
//! never leaves a truncated destination. The `.part` file doubles as the
//! resume state: a later attempt (or a paused task resumed much later)
//! picks up at its size via an HTTP `Range` request.
//!
//! The engine learns about pause and cancel solely through the
//! `should_continue` probe, consulted between body chunks. Transport
//! timeouts bound how long the engine can stay blocked between probes.

mod classify;

pub use classify::{classify_status, classify_transport, ErrorClass};

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures::StreamExt;
use reqwest::{header, Client, StatusCode};
use sysinfo::Disks;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::app::hash;
use crate::app::task::TransferParams;
use crate::constants::limits::MAX_BACKOFF;
use crate::constants::transfer::{PART_SUFFIX, PROGRESS_INTERVAL};
use crate::constants::USER_AGENT;
use crate::errors::{TransferError, TransferResult};

/// How a transfer ended when it did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOutcome {
    /// Bytes delivered, finalized, and (if configured) verified
    Completed,
    /// Cooperative abort: the task left `Downloading`. The partial file is
    /// kept so a later resume can continue from it.
    Interrupted,
}

/// One-shot URL -> file transfer engine
#[derive(Debug, Default)]
pub struct TransferEngine {
    _private: (),
}

impl TransferEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run the transfer described by `params`.
    ///
    /// `should_continue` is polled between body chunks; returning `false`
    /// aborts the attempt with [`TransferOutcome::Interrupted`] and keeps
    /// the partial file. `on_progress` receives
    /// `(total_observed_bytes, total_expected_bytes)` where the expected
    /// total is 0 while unknown.
    ///
    /// Transient failures (5xx, network hiccups) are retried up to
    /// `retry_budget` times with exponential backoff capped at 60 s.
    /// Permanent failures return immediately and remove the partial file,
    /// except a failed finalize rename, which keeps the temp file and
    /// reports its path.
    pub async fn run<C, P>(
        &self,
        params: &TransferParams,
        should_continue: C,
        mut on_progress: P,
    ) -> TransferResult<TransferOutcome>
    where
        C: Fn() -> bool,
        P: FnMut(u64, u64),
    {
        let destination = params.destination.as_path();
        let temp = part_path(destination);
        ensure_parent(destination).await?;
        let client = build_client(params)?;

        let attempts = params.retry_budget.saturating_add(1);
        let mut last_error = String::new();

        for attempt in 0..attempts {
            if attempt > 0 {
                let delay = backoff_delay(attempt - 1);
                debug!(
                    "backing off {:?} before attempt {}/{} for {}",
                    delay,
                    attempt + 1,
                    attempts,
                    params.url
                );
                tokio::time::sleep(delay).await;
            }

            match self
                .attempt(&client, params, destination, &temp, &should_continue, &mut on_progress)
                .await
            {
                Ok(outcome) => return Ok(outcome),
                Err(error) if error.is_transient() && attempt + 1 < attempts => {
                    warn!(
                        "attempt {}/{} for {} failed: {}",
                        attempt + 1,
                        attempts,
                        params.url,
                        error
                    );
                    last_error = error.to_string();
                }
                Err(error) if error.is_transient() => {
                    warn!(
                        "attempt {}/{} for {} failed: {}; retries exhausted",
                        attempt + 1,
                        attempts,
                        params.url,
                        error
                    );
                    return Err(TransferError::RetriesExhausted {
                        attempts,
                        last_error: error.to_string(),
                    });
                }
                Err(error) => {
                    self.discard_partial(&temp, &error).await;
                    return Err(error);
                }
            }
        }

        Err(TransferError::RetriesExhausted {
            attempts,
            last_error,
        })
    }

    /// One attempt: preflight, resume detection, ranged GET, stream to the
    /// part file, finalize, verify.
    async fn attempt<C, P>(
        &self,
        client: &Client,
        params: &TransferParams,
        destination: &Path,
        temp: &Path,
        should_continue: &C,
        on_progress: &mut P,
    ) -> TransferResult<TransferOutcome>
    where
        C: Fn() -> bool,
        P: FnMut(u64, u64),
    {
        // Preflight: learn the expected size if the server offers it. A
        // failed HEAD just skips the free-space check.
        let announced = probe_content_length(client, &params.url).await;
        let partial = partial_size(temp).await;
        if partial.is_none() {
            if let Some(required) = announced {
                check_free_space(destination, required)?;
            }
        }

        // Resume detection: a non-empty part file sets the range start; an
        // empty leftover is scrubbed.
        let mut resume_offset = match partial {
            Some(0) => {
                let _ = tokio::fs::remove_file(temp).await;
                0
            }
            Some(size) => size,
            None => 0,
        };

        let mut request = client.get(&params.url);
        if resume_offset > 0 {
            debug!("resuming {} from byte {}", params.url, resume_offset);
            request = request.header(header::RANGE, format!("bytes={resume_offset}-"));
        }

        let response = request
            .send()
            .await
            .map_err(|error| classify::transport_error(&error, &params.url))?;
        let status = response.status();

        if status == StatusCode::OK && resume_offset > 0 {
            // Full body answered to a range request: this server cannot
            // resume. The bytes on disk are unusable; start over with the
            // complete body we were just handed.
            warn!(
                "{} ignored the range request; restarting from scratch",
                params.url
            );
            resume_offset = 0;
        }
        if !status.is_success() {
            return Err(classify::status_error(status, &params.url));
        }

        let mut file = if resume_offset > 0 {
            OpenOptions::new().append(true).open(temp).await
        } else {
            File::create(temp).await
        }
        .map_err(|source| TransferError::Io {
            path: temp.to_path_buf(),
            source,
        })?;

        let body_length = response.content_length();
        let expected_total = body_length.map(|len| resume_offset + len).unwrap_or(0);
        on_progress(resume_offset, expected_total);

        let mut received: u64 = 0;
        // Backdated so the first chunk reports immediately
        let mut last_display = Instant::now()
            .checked_sub(PROGRESS_INTERVAL)
            .unwrap_or_else(Instant::now);
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|error| classify::transport_error(&error, &params.url))?;
            file.write_all(&chunk)
                .await
                .map_err(|source| TransferError::Io {
                    path: temp.to_path_buf(),
                    source,
                })?;
            received += chunk.len() as u64;

            let done = resume_offset + received;
            on_progress(done, expected_total);

            let final_tick = body_length.is_some_and(|len| received >= len);
            if final_tick || last_display.elapsed() >= PROGRESS_INTERVAL {
                if expected_total > 0 {
                    debug!(
                        "{}: {}/{} bytes ({:.1}%)",
                        params.url,
                        done,
                        expected_total,
                        done as f64 * 100.0 / expected_total as f64
                    );
                } else {
                    debug!("{}: {} bytes", params.url, done);
                }
                last_display = Instant::now();
            }

            if !should_continue() {
                let _ = file.flush().await;
                info!(
                    "transfer interrupted at {} bytes: {}",
                    done, params.url
                );
                return Ok(TransferOutcome::Interrupted);
            }
        }

        // A connection that closed early without a transport error still
        // means the body is incomplete.
        if let Some(len) = body_length {
            if received < len {
                return Err(TransferError::HttpTransient {
                    reason: format!(
                        "connection closed after {received} of {len} body bytes for {}",
                        params.url
                    ),
                });
            }
        }

        file.flush().await.map_err(|source| TransferError::Io {
            path: temp.to_path_buf(),
            source,
        })?;
        file.sync_all().await.map_err(|source| TransferError::Io {
            path: temp.to_path_buf(),
            source,
        })?;
        drop(file);

        tokio::fs::rename(temp, destination)
            .await
            .map_err(|source| TransferError::FinalizeFailed {
                temp: temp.to_path_buf(),
                dest: destination.to_path_buf(),
                source,
            })?;

        if let Some(expected) = &params.expected_checksum {
            let actual =
                hash::hash_file(destination)
                    .await
                    .map_err(|source| TransferError::Io {
                        path: destination.to_path_buf(),
                        source,
                    })?;
            if actual != *expected {
                warn!(
                    "checksum mismatch for {}: expected {}, got {}",
                    destination.display(),
                    expected,
                    actual
                );
                let _ = tokio::fs::remove_file(destination).await;
                return Err(TransferError::ChecksumMismatch {
                    expected: expected.to_hex(),
                    actual: actual.to_hex(),
                });
            }
            debug!("checksum verified for {}", destination.display());
        }

        info!(
            "download complete: {} -> {}",
            params.url,
            destination.display()
        );
        Ok(TransferOutcome::Completed)
    }

    async fn discard_partial(&self, temp: &Path, error: &TransferError) {
        // A failed finalize keeps the bytes so the operator can recover
        // them from the reported temp path.
        if matches!(error, TransferError::FinalizeFailed { .. }) {
            return;
        }
        if tokio::fs::remove_file(temp).await.is_ok() {
            debug!("removed partial file {}", temp.display());
        }
    }
}

/// Sibling path receiving in-flight bytes: `<destination>.part`
pub fn part_path(destination: &Path) -> PathBuf {
    let mut raw = destination.as_os_str().to_os_string();
    raw.push(PART_SUFFIX);
    PathBuf::from(raw)
}

fn backoff_delay(failed_attempts: u32) -> Duration {
    let seconds = 2u64
        .saturating_pow(failed_attempts)
        .min(MAX_BACKOFF.as_secs());
    Duration::from_secs(seconds)
}

fn build_client(params: &TransferParams) -> TransferResult<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(params.overall_timeout)
        .connect_timeout(params.connect_timeout)
        .build()
        .map_err(|error| TransferError::HttpPermanent {
            reason: format!("could not build HTTP client: {error}"),
        })
}

async fn ensure_parent(destination: &Path) -> TransferResult<()> {
    if let Some(parent) = destination.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| TransferError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }
    }
    Ok(())
}

/// HEAD the URL for its Content-Length; any failure is tolerated
async fn probe_content_length(client: &Client, url: &str) -> Option<u64> {
    match client.head(url).send().await {
        Ok(response) if response.status().is_success() => response
            .headers()
            .get(header::CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse().ok()),
        Ok(response) => {
            debug!(
                "HEAD {} returned {}; proceeding without preflight",
                url,
                response.status()
            );
            None
        }
        Err(error) => {
            debug!("HEAD {} failed: {}; proceeding without preflight", url, error);
            None
        }
    }
}

async fn partial_size(temp: &Path) -> Option<u64> {
    tokio::fs::metadata(temp).await.ok().map(|meta| meta.len())
}

fn check_free_space(destination: &Path, required: u64) -> TransferResult<()> {
    let parent = match destination.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let Some(available) = available_space(parent) else {
        debug!(
            "could not determine free space under {}; skipping preflight",
            parent.display()
        );
        return Ok(());
    };
    if available < required {
        return Err(TransferError::DiskFull {
            required,
            available,
        });
    }
    Ok(())
}

/// Free bytes on the disk whose mount point is the longest prefix of `dir`
fn available_space(dir: &Path) -> Option<u64> {
    let target = dir.canonicalize().ok()?;
    let disks = Disks::new_with_refreshed_list();
    disks
        .list()
        .iter()
        .filter(|disk| target.starts_with(disk.mount_point()))
        .max_by_key(|disk| disk.mount_point().as_os_str().len())
        .map(|disk| disk.available_space())
}
