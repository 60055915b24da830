//! Test helpers for the stream relay
//!
//! Provides a fake encoder script that behaves like ffmpeg at the process
//! level, a notifier that captures messages, and a polling helper.
// Copyright 2025 Francisco F. Pinochet
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


use async_trait::async_trait;
use relay_config::RelayConfig;
use relay_types::{
    DestinationId, JobOrigin, MediaSource, NotifyError, Requester, StreamJob, StreamKind,
};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};
use stream_relay::Notifier;
use tempfile::TempDir;

/// Grace period used by test configurations
pub const TEST_STOP_GRACE: Duration = Duration::from_secs(1);

/// Generous upper bound for anything the tests wait on
pub const WAIT_TIMEOUT: Duration = Duration::from_secs(10);

/// Behavior is picked from the input name:
/// - `*stubborn*` ignores SIGTERM and runs until killed
/// - `*slow*` runs until terminated
/// - `*fail*` writes to stderr and exits 1
/// - anything else exits 0 after a short while
const SCRIPT: &str = r#"#!/bin/sh
input=""
prev=""
for arg in "$@"; do
    if [ "$prev" = "-i" ]; then
        input="$arg"
    fi
    prev="$arg"
done
echo "start $input" >> "__LOG__"
case "$input" in
    *stubborn*)
        trap '' TERM
        exec sleep 30
        ;;
    *slow*)
        exec sleep 30
        ;;
    *fail*)
        echo "fake encoder: input could not be opened" >&2
        exit 1
        ;;
    *)
        sleep 0.2
        echo "end $input" >> "__LOG__"
        exit 0
        ;;
esac
"#;

/// Shell script standing in for ffmpeg, living in its own temp dir
pub struct FakeEncoder {
    dir: TempDir,
    script: PathBuf,
    log: PathBuf,
}

impl FakeEncoder {
    pub fn new() -> std::io::Result<Self> {
        let dir = TempDir::new()?;
        let script = dir.path().join("fake-ffmpeg.sh");
        let log = dir.path().join("encoder.log");

        let body = SCRIPT.replace("__LOG__", &log.to_string_lossy());
        std::fs::write(&script, body)?;
        std::fs::write(&log, "")?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755))?;
        }

        Ok(Self { dir, script, log })
    }

    pub fn program(&self) -> String {
        self.script.to_string_lossy().into_owned()
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// Relay configuration that runs this encoder with short timeouts
    pub fn config(&self) -> RelayConfig {
        let mut config = RelayConfig::default();
        config.encoder.ffmpeg_path = self.program();
        config.encoder.stop_grace = TEST_STOP_GRACE;
        config.notify_timeout = Duration::from_secs(1);
        config
    }

    /// Create a media file the encoder can be pointed at
    pub fn media_file(&self, name: &str) -> std::io::Result<PathBuf> {
        let path = self.dir.path().join(name);
        std::fs::write(&path, b"not really media")?;
        Ok(path)
    }

    /// Raw log lines (`start <input>` / `end <input>`) in order
    pub fn events(&self) -> Vec<String> {
        std::fs::read_to_string(&self.log)
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    /// Inputs of every encoder started so far, in start order
    pub fn started(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|line| line.strip_prefix("start ").map(str::to_string))
            .collect()
    }
}

/// Job streaming an owned temp file
pub fn file_job(destination: i64, path: PathBuf, kind: StreamKind, title: &str) -> StreamJob {
    StreamJob::new(
        DestinationId(destination),
        MediaSource::TempFile(path),
        kind,
        Requester::new(42, "tester"),
        JobOrigin::LocalMedia,
    )
    .with_title(title)
}

/// Job streaming a remote URL
pub fn url_job(destination: i64, url: &str, kind: StreamKind, title: &str) -> StreamJob {
    StreamJob::new(
        DestinationId(destination),
        MediaSource::Url(url.to_string()),
        kind,
        Requester::new(42, "tester"),
        JobOrigin::DirectUrl,
    )
    .with_title(title)
}

/// Notifier that keeps every message it is asked to deliver
#[derive(Default)]
pub struct RecordingNotifier {
    starts: Mutex<Vec<(DestinationId, String)>>,
    errors: Mutex<Vec<(DestinationId, String)>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starts(&self) -> Vec<(DestinationId, String)> {
        self.starts.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn errors(&self) -> Vec<(DestinationId, String)> {
        self.errors.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify_start(
        &self,
        destination: DestinationId,
        caption: &str,
        _thumbnail: Option<&str>,
    ) -> Result<(), NotifyError> {
        self.starts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((destination, caption.to_string()));
        Ok(())
    }

    async fn notify_error(&self, destination: DestinationId, message: &str) -> Result<(), NotifyError> {
        self.errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((destination, message.to_string()));
        Ok(())
    }
}

/// Recording notifier that takes `delay` to deliver each start announcement
pub struct SlowNotifier {
    delay: Duration,
    inner: RecordingNotifier,
}

impl SlowNotifier {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            inner: RecordingNotifier::new(),
        }
    }

    pub fn starts(&self) -> Vec<(DestinationId, String)> {
        self.inner.starts()
    }
}

#[async_trait]
impl Notifier for SlowNotifier {
    async fn notify_start(
        &self,
        destination: DestinationId,
        caption: &str,
        thumbnail: Option<&str>,
    ) -> Result<(), NotifyError> {
        tokio::time::sleep(self.delay).await;
        self.inner.notify_start(destination, caption, thumbnail).await
    }

    async fn notify_error(&self, destination: DestinationId, message: &str) -> Result<(), NotifyError> {
        self.inner.notify_error(destination, message).await
    }
}

/// Notifier that always fails, for checking failures never stall a queue
#[derive(Default)]
pub struct FailingNotifier;

#[async_trait]
impl Notifier for FailingNotifier {
    async fn notify_start(&self, _: DestinationId, _: &str, _: Option<&str>) -> Result<(), NotifyError> {
        Err(NotifyError::Delivery("chat unreachable".to_string()))
    }

    async fn notify_error(&self, _: DestinationId, _: &str) -> Result<(), NotifyError> {
        Err(NotifyError::Delivery("chat unreachable".to_string()))
    }
}

/// Poll `condition` until it holds or `timeout` passes
pub async fn wait_until<F, Fut>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = Instant::now() + timeout;
    loop {
        if condition().await {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
