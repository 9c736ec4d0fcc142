//! Integration tests for the transfer engine
//!
//! Each test runs the engine against a scriptable local HTTP server; no
//! network egress. Timing-sensitive cases use generous budgets so they
//! stay reliable on loaded machines.

mod support;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parafetch::errors::TransferError;
use parafetch::{Sha256Digest, TransferEngine, TransferOutcome, TransferParams};
use sha2::{Digest, Sha256};
use tempfile::TempDir;

use support::{patterned_body, Mode, ServerOptions, TestServer};

fn params(url: String, destination: PathBuf) -> TransferParams {
    TransferParams {
        url,
        destination,
        retry_budget: 3,
        overall_timeout: Duration::from_secs(30),
        connect_timeout: Duration::from_secs(5),
        expected_checksum: None,
    }
}

fn digest_of(data: &[u8]) -> Sha256Digest {
    Sha256Digest::from_bytes(Sha256::digest(data).into())
}

async fn read_file(path: &std::path::Path) -> Vec<u8> {
    tokio::fs::read(path).await.unwrap()
}

#[tokio::test]
async fn happy_path_downloads_and_removes_the_part_file() {
    let body = patterned_body(1_000_000);
    let server = TestServer::start(ServerOptions::new(Mode::Ranged, body.clone())).await;
    let dir = TempDir::new().unwrap();
    let dest = dir.path().join("a.bin");

    let engine = TransferEngine::new();
    let outcome = engine
        .run(&params(server.url("/a.bin"), dest.clone()), || true, |_, _| {})
        .await
        .unwrap();

    assert_eq!(outcome, TransferOutcome::Completed);
    assert_eq!(read_file(&dest).await, body);
    assert!(!dir.path().join("a.bin.part").exists());
    assert_eq!(server.get_count(), 1);
}

#[tokio::test]
async fn progress_reports_monotonic_bytes_up_to_the_total() {
    let body = patterned_body(300_000);
    let server = TestServer::start(ServerOptions::new(Mode::Ranged, body.clone())).await;
    let dir = TempDir::new().unwrap();
    let dest = dir.path().join("p.bin");

    let last_done = Arc::new(AtomicU64::new(0));
    let monotonic = Arc::new(AtomicBool::new(true));

    let engine = TransferEngine::new();
    {
        let last_done = Arc::clone(&last_done);
        let monotonic = Arc::clone(&monotonic);
        engine
            .run(
                &params(server.url("/p.bin"), dest.clone()),
                || true,
                move |done, total| {
                    if done < last_done.load(Ordering::SeqCst) {
                        monotonic.store(false, Ordering::SeqCst);
                    }
                    last_done.store(done, Ordering::SeqCst);
                    if total > 0 {
                        assert!(done <= total, "done {done} exceeded total {total}");
                        assert_eq!(total, 300_000);
                    }
                },
            )
            .await
            .unwrap();
    }

    assert!(monotonic.load(Ordering::SeqCst));
    assert_eq!(last_done.load(Ordering::SeqCst), 300_000);
}

#[tokio::test]
async fn resumes_from_an_existing_part_file_with_a_range_request() {
    let body = patterned_body(1000);
    let server = TestServer::start(ServerOptions::new(Mode::Ranged, body.clone())).await;
    let dir = TempDir::new().unwrap();
    let dest = dir.path().join("b.bin");

    // First 500 bytes already on disk from an interrupted run
    tokio::fs::write(dir.path().join("b.bin.part"), &body[..500])
        .await
        .unwrap();

    let first_report = Arc::new(AtomicU64::new(u64::MAX));
    let engine = TransferEngine::new();
    {
        let first_report = Arc::clone(&first_report);
        engine
            .run(
                &params(server.url("/b.bin"), dest.clone()),
                || true,
                move |done, _| {
                    first_report.fetch_min(done, Ordering::SeqCst);
                },
            )
            .await
            .unwrap();
    }

    // The engine asked for the tail and never re-reported below the offset
    assert_eq!(server.get_ranges(), vec![Some("bytes=500-".to_string())]);
    assert!(first_report.load(Ordering::SeqCst) >= 500);

    // Byte-identical to an uninterrupted transfer
    assert_eq!(read_file(&dest).await, body);
    assert!(!dir.path().join("b.bin.part").exists());
}

#[tokio::test]
async fn an_empty_part_file_is_scrubbed_and_fetched_fresh() {
    let body = patterned_body(2048);
    let server = TestServer::start(ServerOptions::new(Mode::Ranged, body.clone())).await;
    let dir = TempDir::new().unwrap();
    let dest = dir.path().join("e.bin");
    tokio::fs::write(dir.path().join("e.bin.part"), b"").await.unwrap();

    let engine = TransferEngine::new();
    engine
        .run(&params(server.url("/e.bin"), dest.clone()), || true, |_, _| {})
        .await
        .unwrap();

    // No range was requested for the zero-length leftover
    assert_eq!(server.get_ranges(), vec![None]);
    assert_eq!(read_file(&dest).await, body);
}

#[tokio::test]
async fn transient_errors_retry_with_backoff_until_success() {
    let body = patterned_body(4096);
    let server = TestServer::start(ServerOptions::new(
        Mode::FlakyThenOk {
            failures: 2,
            status: 503,
        },
        body.clone(),
    ))
    .await;
    let dir = TempDir::new().unwrap();
    let dest = dir.path().join("c.bin");

    let engine = TransferEngine::new();
    let started = Instant::now();
    let outcome = engine
        .run(&params(server.url("/c.bin"), dest.clone()), || true, |_, _| {})
        .await
        .unwrap();
    let elapsed = started.elapsed();

    assert_eq!(outcome, TransferOutcome::Completed);
    assert_eq!(server.get_count(), 3);
    assert_eq!(read_file(&dest).await, body);
    // Backoff slept ~1 s after the first failure and ~2 s after the second
    assert!(
        elapsed >= Duration::from_millis(2900),
        "expected two backoff sleeps, finished in {elapsed:?}"
    );
}

#[tokio::test]
async fn a_404_fails_permanently_without_retry_or_partial() {
    let server = TestServer::start(ServerOptions::new(Mode::Status(404), Vec::new())).await;
    let dir = TempDir::new().unwrap();
    let dest = dir.path().join("d.bin");

    let engine = TransferEngine::new();
    let error = engine
        .run(&params(server.url("/d.bin"), dest.clone()), || true, |_, _| {})
        .await
        .unwrap_err();

    match error {
        TransferError::HttpPermanent { reason } => assert!(reason.contains("404")),
        other => panic!("expected HttpPermanent, got {other:?}"),
    }
    assert_eq!(server.get_count(), 1);
    assert!(!dest.exists());
    assert!(!dir.path().join("d.bin.part").exists());
}

#[tokio::test]
async fn retry_budget_zero_means_exactly_one_attempt() {
    let server = TestServer::start(ServerOptions::new(Mode::Status(503), Vec::new())).await;
    let dir = TempDir::new().unwrap();

    let mut one_shot = params(server.url("/z.bin"), dir.path().join("z.bin"));
    one_shot.retry_budget = 0;

    let engine = TransferEngine::new();
    let started = Instant::now();
    let error = engine.run(&one_shot, || true, |_, _| {}).await.unwrap_err();

    match error {
        TransferError::RetriesExhausted {
            attempts,
            last_error,
        } => {
            assert_eq!(attempts, 1);
            assert!(last_error.contains("503"));
        }
        other => panic!("expected RetriesExhausted, got {other:?}"),
    }
    assert_eq!(server.get_count(), 1);
    // No backoff sleep happened
    assert!(started.elapsed() < Duration::from_millis(900));
}

#[tokio::test]
async fn exhausted_retries_surface_the_last_transient_error() {
    let server = TestServer::start(ServerOptions::new(Mode::Status(500), Vec::new())).await;
    let dir = TempDir::new().unwrap();

    let mut two_attempts = params(server.url("/x.bin"), dir.path().join("x.bin"));
    two_attempts.retry_budget = 1;

    let engine = TransferEngine::new();
    let error = engine.run(&two_attempts, || true, |_, _| {}).await.unwrap_err();

    match error {
        TransferError::RetriesExhausted { attempts, .. } => assert_eq!(attempts, 2),
        other => panic!("expected RetriesExhausted, got {other:?}"),
    }
    assert_eq!(server.get_count(), 2);
}

#[tokio::test]
async fn checksum_mismatch_fails_and_removes_the_destination() {
    let body = patterned_body(8192);
    let server = TestServer::start(ServerOptions::new(Mode::Ranged, body.clone())).await;
    let dir = TempDir::new().unwrap();
    let dest = dir.path().join("v.bin");

    let mut verified = params(server.url("/v.bin"), dest.clone());
    verified.expected_checksum = Some(digest_of(b"different content entirely"));

    let engine = TransferEngine::new();
    let error = engine.run(&verified, || true, |_, _| {}).await.unwrap_err();

    match error {
        TransferError::ChecksumMismatch { expected, actual } => {
            assert_eq!(expected, digest_of(b"different content entirely").to_hex());
            assert_eq!(actual, digest_of(&body).to_hex());
        }
        other => panic!("expected ChecksumMismatch, got {other:?}"),
    }
    assert!(!dest.exists());
}

#[tokio::test]
async fn matching_checksum_verifies_and_keeps_the_file() {
    let body = patterned_body(8192);
    let server = TestServer::start(ServerOptions::new(Mode::Ranged, body.clone())).await;
    let dir = TempDir::new().unwrap();
    let dest = dir.path().join("ok.bin");

    let mut verified = params(server.url("/ok.bin"), dest.clone());
    verified.expected_checksum = Some(digest_of(&body));

    let engine = TransferEngine::new();
    let outcome = engine.run(&verified, || true, |_, _| {}).await.unwrap();

    assert_eq!(outcome, TransferOutcome::Completed);
    assert_eq!(read_file(&dest).await, body);
}

#[tokio::test]
async fn a_200_answer_to_a_range_request_restarts_from_scratch() {
    let body = patterned_body(4000);
    let server = TestServer::start(ServerOptions::new(Mode::IgnoreRange, body.clone())).await;
    let dir = TempDir::new().unwrap();
    let dest = dir.path().join("r.bin");

    // Stale partial bytes that do NOT match the server's content
    tokio::fs::write(dir.path().join("r.bin.part"), vec![0xAA; 700])
        .await
        .unwrap();

    let engine = TransferEngine::new();
    let outcome = engine
        .run(&params(server.url("/r.bin"), dest.clone()), || true, |_, _| {})
        .await
        .unwrap();

    assert_eq!(outcome, TransferOutcome::Completed);
    // The range was requested, the server ignored it, and the delivered
    // file is the full body with no stale prefix appended.
    assert_eq!(server.get_ranges(), vec![Some("bytes=700-".to_string())]);
    assert_eq!(read_file(&dest).await, body);
}

#[tokio::test]
async fn head_failure_is_tolerated() {
    let body = patterned_body(2048);
    let mut options = ServerOptions::new(Mode::Ranged, body.clone());
    options.reject_head = true;
    let server = TestServer::start(options).await;
    let dir = TempDir::new().unwrap();
    let dest = dir.path().join("h.bin");

    let engine = TransferEngine::new();
    let outcome = engine
        .run(&params(server.url("/h.bin"), dest.clone()), || true, |_, _| {})
        .await
        .unwrap();

    assert_eq!(outcome, TransferOutcome::Completed);
    assert_eq!(read_file(&dest).await, body);
}

#[tokio::test]
async fn cooperative_abort_keeps_the_partial_file() {
    let body = patterned_body(400_000);
    let mut options = ServerOptions::new(Mode::Ranged, body.clone());
    options.throttle = Some((8 * 1024, Duration::from_millis(10)));
    let server = TestServer::start(options).await;
    let dir = TempDir::new().unwrap();
    let dest = dir.path().join("i.bin");

    // Allow roughly the first quarter of the body through, then stop
    let seen = Arc::new(AtomicU64::new(0));
    let probe_seen = Arc::clone(&seen);
    let progress_seen = Arc::clone(&seen);

    let engine = TransferEngine::new();
    let outcome = engine
        .run(
            &params(server.url("/i.bin"), dest.clone()),
            move || probe_seen.load(Ordering::SeqCst) < 100_000,
            move |done, _| {
                progress_seen.store(done, Ordering::SeqCst);
            },
        )
        .await
        .unwrap();

    assert_eq!(outcome, TransferOutcome::Interrupted);
    assert!(!dest.exists());

    let part = dir.path().join("i.bin.part");
    let part_len = tokio::fs::metadata(&part).await.unwrap().len() as usize;
    assert!(part_len > 0 && part_len < body.len());
    // The partial bytes are a clean prefix, ready for a later resume
    assert_eq!(read_file(&part).await, body[..part_len].to_vec());
}

#[tokio::test]
async fn interrupted_transfer_completes_after_resume() {
    let body = patterned_body(400_000);
    let dir = TempDir::new().unwrap();
    let dest = dir.path().join("j.bin");

    // Phase 1: throttled server, aborted mid-flight
    {
        let mut options = ServerOptions::new(Mode::Ranged, body.clone());
        options.throttle = Some((8 * 1024, Duration::from_millis(10)));
        let server = TestServer::start(options).await;

        let seen = Arc::new(AtomicU64::new(0));
        let probe_seen = Arc::clone(&seen);
        let progress_seen = Arc::clone(&seen);
        let engine = TransferEngine::new();
        let outcome = engine
            .run(
                &params(server.url("/j.bin"), dest.clone()),
                move || probe_seen.load(Ordering::SeqCst) < 80_000,
                move |done, _| progress_seen.store(done, Ordering::SeqCst),
            )
            .await
            .unwrap();
        assert_eq!(outcome, TransferOutcome::Interrupted);
    }

    // Phase 2: fresh engine run resumes from the part file and finishes
    let server = TestServer::start(ServerOptions::new(Mode::Ranged, body.clone())).await;
    let engine = TransferEngine::new();
    let outcome = engine
        .run(&params(server.url("/j.bin"), dest.clone()), || true, |_, _| {})
        .await
        .unwrap();

    assert_eq!(outcome, TransferOutcome::Completed);
    assert_eq!(read_file(&dest).await, body);
    let ranges = server.get_ranges();
    assert_eq!(ranges.len(), 1);
    assert!(
        ranges[0].is_some(),
        "the resumed transfer should have sent a Range header"
    );
}

#[tokio::test]
async fn connection_refused_is_transient_and_exhausts_retries() {
    // Bind-then-drop yields a port with nothing listening
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let dir = TempDir::new().unwrap();
    let mut unreachable = params(
        format!("http://{addr}/gone.bin"),
        dir.path().join("gone.bin"),
    );
    unreachable.retry_budget = 1;

    let engine = TransferEngine::new();
    let error = engine.run(&unreachable, || true, |_, _| {}).await.unwrap_err();

    assert!(matches!(error, TransferError::RetriesExhausted { .. }));
}
