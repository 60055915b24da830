//! End-to-end scheduler scenarios
//!
//! Each test runs the full runner against a fake encoder script.
#![cfg(unix)]

use futures::future::join_all;
use relay_test_utils::{
    file_job, url_job, wait_until, FailingNotifier, FakeEncoder, RecordingNotifier, SlowNotifier,
    WAIT_TIMEOUT,
};
use relay_types::{DestinationId, OutcomeStatus, StreamKind, StreamStatus};
use std::sync::Arc;
use std::time::{Duration, Instant};
use stream_relay::{MemoryStatsStore, StreamRunner};

fn runner_with(encoder: &FakeEncoder) -> (StreamRunner, Arc<RecordingNotifier>, Arc<MemoryStatsStore>) {
    let notifier = Arc::new(RecordingNotifier::new());
    let stats = Arc::new(MemoryStatsStore::new());
    let runner = StreamRunner::new(&encoder.config(), notifier.clone(), stats.clone());
    (runner, notifier, stats)
}

async fn wait_for_outcomes(stats: &MemoryStatsStore, count: usize) -> bool {
    wait_until(WAIT_TIMEOUT, || async move { stats.total_streams().await >= count }).await
}

/// Encoder runs never overlap: every start is followed by its own end
fn assert_serialized(events: &[String]) {
    assert_eq!(events.len() % 2, 0, "unfinished run in {:?}", events);
    for pair in events.chunks(2) {
        let started = pair[0].strip_prefix("start ").expect("start event");
        let ended = pair[1].strip_prefix("end ").expect("end event");
        assert_eq!(started, ended, "overlapping runs in {:?}", events);
    }
}

#[tokio::test]
async fn test_jobs_run_in_enqueue_order() {
    let encoder = FakeEncoder::new().unwrap();
    let (runner, notifier, stats) = runner_with(&encoder);
    runner.set_key(DestinationId(1), "key");

    let paths: Vec<_> = (1..=3)
        .map(|i| encoder.media_file(&format!("job-{}.mp4", i)).unwrap())
        .collect();
    for (i, path) in paths.iter().enumerate() {
        runner
            .submit(file_job(1, path.clone(), StreamKind::Full, &format!("J{}", i + 1)))
            .await;
    }

    assert!(wait_for_outcomes(&stats, 3).await);

    let expected: Vec<String> = paths.iter().map(|p| p.to_string_lossy().into_owned()).collect();
    assert_eq!(encoder.started(), expected);
    assert_serialized(&encoder.events());

    let captions: Vec<String> = notifier.starts().into_iter().map(|(_, caption)| caption).collect();
    assert_eq!(
        captions,
        vec![
            "Streaming: J1\nDuration: Unknown",
            "Streaming: J2\nDuration: Unknown",
            "Streaming: J3\nDuration: Unknown",
        ]
    );

    let mut outcomes = stats.recent(10).await;
    outcomes.reverse();
    let titles: Vec<&str> = outcomes.iter().map(|o| o.title.as_str()).collect();
    assert_eq!(titles, vec!["J1", "J2", "J3"]);
    assert!(outcomes.iter().all(|o| o.status == OutcomeStatus::Completed));
    assert!(paths.iter().all(|p| !p.exists()));
}

#[tokio::test]
async fn test_completed_job_hands_off_to_next() {
    let encoder = FakeEncoder::new().unwrap();
    let (runner, notifier, stats) = runner_with(&encoder);
    let dest = DestinationId(-100200);
    runner.set_key(dest, "abc");

    let first = encoder.media_file("a.mp4").unwrap();
    let second = encoder.media_file("b.m4a").unwrap();
    runner.submit(file_job(dest.0, first.clone(), StreamKind::Full, "a")).await;
    runner
        .submit(file_job(dest.0, second.clone(), StreamKind::AudioOnly, "b").with_duration_secs(95))
        .await;

    // J1 is active, J2 waits
    assert_eq!(runner.now_playing(dest).await.map(|p| p.title), Some("a".to_string()));
    let queued = runner.list(dest).await;
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].title, "b");
    assert_eq!(queued[0].kind, StreamKind::AudioOnly);

    assert!(wait_for_outcomes(&stats, 1).await);
    let first_outcome = stats.recent(1).await.remove(0);
    assert_eq!(first_outcome.title, "a");
    assert_eq!(first_outcome.status, OutcomeStatus::Completed);
    assert_eq!(first_outcome.user_id, 42);
    assert!(!first.exists());

    let encoder_ref = &encoder;
    assert!(wait_until(WAIT_TIMEOUT, || async move { encoder_ref.started().len() == 2 }).await);
    let starts = notifier.starts();
    assert_eq!(starts[1], (dest, "Streaming (Audio): b\nDuration: 1:35".to_string()));

    assert!(wait_for_outcomes(&stats, 2).await);
    assert!(!second.exists());
    let runner_ref = &runner;
    assert!(
        wait_until(WAIT_TIMEOUT, || async move {
            runner_ref.status(dest).await == StreamStatus::Completed
        })
        .await
    );
}

#[tokio::test]
async fn test_missing_key_drops_job() {
    let encoder = FakeEncoder::new().unwrap();
    let (runner, notifier, stats) = runner_with(&encoder);
    let dest = DestinationId(77);
    let media = encoder.media_file("a.mp4").unwrap();

    runner.submit(file_job(dest.0, media.clone(), StreamKind::Full, "J1")).await;

    let errors = notifier.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].0, dest);
    assert!(errors[0].1.starts_with("Error: No RTMP key configured"));

    assert!(runner.list(dest).await.is_empty());
    assert!(runner.now_playing(dest).await.is_none());
    assert_eq!(runner.status(dest).await, StreamStatus::Idle);
    assert!(notifier.starts().is_empty());
    assert!(encoder.started().is_empty());
    assert_eq!(stats.total_streams().await, 0);
    assert!(!media.exists());

    // Once a key exists the destination works normally
    runner.set_key(dest, "late-key");
    let retry = encoder.media_file("retry.mp4").unwrap();
    runner.submit(file_job(dest.0, retry, StreamKind::Full, "J2")).await;
    assert!(wait_for_outcomes(&stats, 1).await);
}

#[tokio::test]
async fn test_destinations_are_independent() {
    let encoder = FakeEncoder::new().unwrap();
    let (runner, _notifier, stats) = runner_with(&encoder);
    let (busy, other) = (DestinationId(1), DestinationId(2));
    runner.set_key(busy, "one");
    runner.set_key(other, "two");

    let long = encoder.media_file("slow.mp4").unwrap();
    let short = encoder.media_file("short.mp4").unwrap();
    runner.submit(file_job(busy.0, long, StreamKind::Full, "long")).await;
    runner.submit(file_job(other.0, short, StreamKind::AudioOnly, "short")).await;

    assert!(wait_for_outcomes(&stats, 1).await);
    let outcome = stats.recent(1).await.remove(0);
    assert_eq!(outcome.destination, other);
    assert_eq!(outcome.status, OutcomeStatus::Completed);

    assert_eq!(runner.status(busy).await, StreamStatus::Streaming);
    assert!(runner.now_playing(busy).await.is_some());

    assert!(runner.stop(busy).await);
    assert_eq!(runner.status(busy).await, StreamStatus::Stopped);
    let other_status = runner.status(other).await;
    assert_eq!(other_status, StreamStatus::Completed);
}

#[tokio::test]
async fn test_concurrent_submits_keep_one_encoder_per_destination() {
    let encoder = FakeEncoder::new().unwrap();
    let (runner, _notifier, stats) = runner_with(&encoder);
    let dest = DestinationId(5);
    runner.set_key(dest, "k");

    let jobs: Vec<_> = (0..6)
        .map(|i| {
            let path = encoder.media_file(&format!("burst-{}.mp4", i)).unwrap();
            file_job(dest.0, path, StreamKind::Full, &format!("burst {}", i))
        })
        .collect();
    join_all(jobs.into_iter().map(|job| {
        let runner = runner.clone();
        async move { runner.submit(job).await }
    }))
    .await;

    assert!(wait_for_outcomes(&stats, 6).await);
    assert_eq!(encoder.started().len(), 6);
    assert_serialized(&encoder.events());
}

#[tokio::test]
async fn test_notifier_failures_do_not_stall_the_queue() {
    let encoder = FakeEncoder::new().unwrap();
    let stats = Arc::new(MemoryStatsStore::new());
    let runner = StreamRunner::new(&encoder.config(), Arc::new(FailingNotifier), stats.clone());
    runner.set_key(DestinationId(9), "k");

    for name in ["fail.mp4", "ok.mp4"] {
        let path = encoder.media_file(name).unwrap();
        runner.submit(file_job(9, path, StreamKind::Full, name)).await;
    }

    assert!(wait_for_outcomes(&stats, 2).await);
    let mut statuses: Vec<OutcomeStatus> = stats.recent(2).await.into_iter().map(|o| o.status).collect();
    statuses.reverse();
    assert_eq!(statuses, vec![OutcomeStatus::Error, OutcomeStatus::Completed]);
}

#[tokio::test]
async fn test_remote_sources_are_never_deleted() {
    let encoder = FakeEncoder::new().unwrap();
    let (runner, _notifier, stats) = runner_with(&encoder);
    runner.set_key(DestinationId(3), "k");

    // A URL source is borrowed even when it happens to name a local file
    let shared = encoder.media_file("shared.mp4").unwrap();
    let url = shared.to_string_lossy().into_owned();
    runner.submit(url_job(3, &url, StreamKind::Full, "remote")).await;

    assert!(wait_for_outcomes(&stats, 1).await);
    assert!(shared.exists());
    assert_eq!(encoder.started(), vec![url]);
}

#[tokio::test]
async fn test_shutdown_stops_every_destination() {
    let encoder = FakeEncoder::new().unwrap();
    let (runner, _notifier, stats) = runner_with(&encoder);

    for id in 1..=3 {
        runner.set_key(DestinationId(id), "k");
        let active = encoder.media_file(&format!("slow-{}.mp4", id)).unwrap();
        let queued = encoder.media_file(&format!("later-{}.mp4", id)).unwrap();
        runner.submit(file_job(id, active, StreamKind::Full, "active")).await;
        runner.submit(file_job(id, queued, StreamKind::Full, "later")).await;
    }

    let encoder_ref = &encoder;
    assert!(wait_until(WAIT_TIMEOUT, || async move { encoder_ref.started().len() == 3 }).await);

    tokio::time::timeout(Duration::from_secs(5), runner.shutdown())
        .await
        .expect("shutdown within grace");

    for id in 1..=3 {
        let dest = DestinationId(id);
        assert!(runner.now_playing(dest).await.is_none());
        assert!(runner.list(dest).await.is_empty());
        assert_eq!(runner.status(dest).await, StreamStatus::Stopped);
    }
    assert_eq!(stats.total_streams().await, 3);
    assert_eq!(encoder.started().len(), 3);
}

fn runner_with_slow_announcements(encoder: &FakeEncoder) -> (StreamRunner, Arc<SlowNotifier>, Arc<MemoryStatsStore>) {
    let notifier = Arc::new(SlowNotifier::new(Duration::from_secs(2)));
    let stats = Arc::new(MemoryStatsStore::new());
    let mut config = encoder.config();
    config.notify_timeout = Duration::from_secs(5);
    let runner = StreamRunner::new(&config, notifier.clone(), stats.clone());
    (runner, notifier, stats)
}

#[tokio::test]
async fn test_enqueue_does_not_wait_for_start_announcement() {
    let encoder = FakeEncoder::new().unwrap();
    let (runner, notifier, _stats) = runner_with_slow_announcements(&encoder);
    let dest = DestinationId(21);
    runner.set_key(dest, "k");

    let first = encoder.media_file("slow-first.mp4").unwrap();
    let second = encoder.media_file("second.mp4").unwrap();
    let submitting = tokio::spawn({
        let runner = runner.clone();
        async move { runner.submit(file_job(21, first, StreamKind::Full, "first")).await }
    });
    tokio::time::sleep(Duration::from_millis(200)).await;

    let begun = Instant::now();
    runner.queue().enqueue(file_job(21, second, StreamKind::Full, "second")).await;
    let queued = runner.list(dest).await;
    assert!(begun.elapsed() < Duration::from_millis(500), "enqueue took {:?}", begun.elapsed());

    let titles: Vec<&str> = queued.iter().map(|entry| entry.title.as_str()).collect();
    assert_eq!(titles, vec!["second"]);
    assert!(runner.now_playing(dest).await.is_none());

    submitting.await.unwrap();
    assert_eq!(runner.now_playing(dest).await.map(|p| p.title), Some("first".to_string()));
    assert_eq!(notifier.starts().len(), 1);

    runner.shutdown().await;
}

#[tokio::test]
async fn test_stop_during_start_announcement_cancels_job() {
    let encoder = FakeEncoder::new().unwrap();
    let (runner, notifier, stats) = runner_with_slow_announcements(&encoder);
    let dest = DestinationId(22);
    runner.set_key(dest, "k");

    let cancelled = encoder.media_file("slow-cancelled.mp4").unwrap();
    let after = encoder.media_file("after.mp4").unwrap();
    let submitting = tokio::spawn({
        let runner = runner.clone();
        let job = file_job(22, cancelled.clone(), StreamKind::Full, "cancelled");
        async move { runner.submit(job).await }
    });
    tokio::time::sleep(Duration::from_millis(200)).await;
    runner.queue().enqueue(file_job(22, after.clone(), StreamKind::Full, "after")).await;

    let begun = Instant::now();
    assert!(runner.stop(dest).await);
    assert!(begun.elapsed() < Duration::from_millis(500));
    assert_eq!(runner.status(dest).await, StreamStatus::Stopped);

    submitting.await.unwrap();
    assert!(!cancelled.exists());

    // The cancelled job never spawns; the next queued job takes its turn
    assert!(wait_for_outcomes(&stats, 1).await);
    let outcomes = stats.recent(10).await;
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].title, "after");
    assert_eq!(outcomes[0].status, OutcomeStatus::Completed);
    assert_eq!(encoder.started(), vec![after.to_string_lossy().into_owned()]);
    assert_eq!(notifier.starts().len(), 2);
}
