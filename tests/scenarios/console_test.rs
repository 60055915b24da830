//! Console front-end driven end to end
#![cfg(unix)]

use relay_test_utils::{wait_until, FakeEncoder, RecordingNotifier, WAIT_TIMEOUT};
use relay_types::{DestinationId, Requester, StreamStatus};
use std::sync::Arc;
use stream_relay::{Console, MemoryStatsStore, StreamRunner};

fn console(encoder: &FakeEncoder) -> (Console, StreamRunner, Arc<MemoryStatsStore>, Arc<RecordingNotifier>) {
    let notifier = Arc::new(RecordingNotifier::new());
    let stats = Arc::new(MemoryStatsStore::new());
    let runner = StreamRunner::new(&encoder.config(), notifier.clone(), stats.clone());
    let console = Console::new(runner.clone(), stats.clone(), Requester::new(7, "operator"));
    (console, runner, stats, notifier)
}

#[tokio::test]
async fn test_play_local_file_streams_a_private_copy() {
    let encoder = FakeEncoder::new().unwrap();
    let (console, runner, stats, _notifier) = console(&encoder);
    let original = encoder.media_file("holiday.mp4").unwrap();

    assert_eq!(console.handle_line("setkey 10 secret").await, "RTMP key configured.");
    let reply = console
        .handle_line(&format!("play 10 {} Holiday Clip", original.display()))
        .await;
    assert_eq!(reply, "Queued: Holiday Clip");

    let stats_ref = &stats;
    assert!(wait_until(WAIT_TIMEOUT, || async move { stats_ref.total_streams().await == 1 }).await);

    // The encoder read a temp copy, which is gone; the operator's file is untouched
    let started = encoder.started();
    assert_eq!(started.len(), 1);
    assert_ne!(started[0], original.to_string_lossy());
    assert!(!std::path::Path::new(&started[0]).exists());
    assert!(original.exists());

    let runner_ref = &runner;
    assert!(
        wait_until(WAIT_TIMEOUT, || async move {
            runner_ref.status(DestinationId(10)).await == StreamStatus::Completed
        })
        .await
    );
    assert_eq!(console.handle_line("status 10").await, "Stream status: completed");

    let report = console.handle_line("stats").await;
    assert!(report.contains("Total Streams: 1"));
    assert!(report.contains("Successful Streams: 1"));
}

#[tokio::test]
async fn test_queue_listing_and_stop() {
    let encoder = FakeEncoder::new().unwrap();
    let (console, runner, stats, _notifier) = console(&encoder);
    let first = encoder.media_file("slow-one.mp4").unwrap();
    let second = encoder.media_file("two.mp4").unwrap();

    console.handle_line("setkey 11 k").await;
    console
        .handle_line(&format!("play 11 {} First", first.display()))
        .await;
    console
        .handle_line(&format!("playaudio 11 {} Second", second.display()))
        .await;

    assert_eq!(console.handle_line("queue 11").await, "QUEUE:\n1. Second (Unknown)");
    assert!(console
        .handle_line("status 11")
        .await
        .starts_with("Stream status: streaming\nNow playing: First"));

    let encoder_ref = &encoder;
    assert!(wait_until(WAIT_TIMEOUT, || async move { encoder_ref.started().len() == 1 }).await);

    assert_eq!(console.handle_line("stop 11").await, "Stream stopped.");
    assert_eq!(console.handle_line("queue 11").await, "Queue is empty.");
    assert_eq!(runner.status(DestinationId(11)).await, StreamStatus::Stopped);

    let user = stats.user_stats(7).await;
    assert_eq!(user.total_streams, 1);
    assert_eq!(user.stopped_streams, 1);
    assert_eq!(user.failed_streams, 0);
}

#[tokio::test]
async fn test_direct_url_play() {
    let encoder = FakeEncoder::new().unwrap();
    let (console, _runner, stats, notifier) = console(&encoder);

    console.handle_line("setkey 12 k").await;
    assert_eq!(
        console.handle_line("uaudio 12 https://radio.example/stream").await,
        "Queued: Direct URL"
    );

    let stats_ref = &stats;
    assert!(wait_until(WAIT_TIMEOUT, || async move { stats_ref.total_streams().await == 1 }).await);
    assert_eq!(encoder.started(), vec!["https://radio.example/stream".to_string()]);
    assert_eq!(
        notifier.starts()[0].1,
        "Streaming (Audio): Direct URL\nDuration: Unknown"
    );
}
