//! Interfaces to the collaborators around the scheduler
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
use relay_types::{
    format_duration, DestinationId, JobOrigin, MediaSource, NotifyError, RecordError, Requester,
    ResolutionError, StreamJob, StreamKind, StreamOutcome,
};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// User-facing messaging for a destination
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Announce that a job has started streaming
    async fn notify_start(
        &self,
        destination: DestinationId,
        caption: &str,
        thumbnail: Option<&str>,
    ) -> Result<(), NotifyError>;

    /// Report a short error message to the destination
    async fn notify_error(&self, destination: DestinationId, message: &str) -> Result<(), NotifyError>;
}

/// Await a notification for at most `limit`. Failures are logged and dropped.
pub(crate) async fn deliver<F>(limit: Duration, destination: DestinationId, notification: &str, send: F)
where
    F: Future<Output = Result<(), NotifyError>>,
{
    let result = match tokio::time::timeout(limit, send).await {
        Ok(result) => result,
        Err(_) => Err(NotifyError::Timeout),
    };

    if let Err(e) = result {
        warn!(
            destination = %destination,
            notification = notification,
            error = %e,
            "Notification failed"
        );
    }
}

/// Persistence of per-stream outcomes
#[async_trait]
pub trait OutcomeRecorder: Send + Sync {
    async fn record(&self, outcome: &StreamOutcome) -> Result<(), RecordError>;
}

/// A playable source together with its presentation metadata
#[derive(Debug)]
pub struct ResolvedMedia {
    pub source: MediaSource,
    pub title: String,
    pub duration_secs: Option<u64>,
    pub thumbnail: Option<String>,
    pub origin: JobOrigin,
}

impl ResolvedMedia {
    /// Turn the resolved media into a job for `destination`
    pub fn into_job(self, destination: DestinationId, kind: StreamKind, requester: Requester) -> StreamJob {
        let mut job = StreamJob::new(destination, self.source, kind, requester, self.origin)
            .with_title(self.title);
        if let Some(secs) = self.duration_secs {
            job = job.with_display_duration(format_duration(secs));
        }
        if let Some(thumbnail) = self.thumbnail {
            job = job.with_thumbnail(thumbnail);
        }
        job
    }
}

/// Turns a user request into a playable source. Runs before a job exists.
#[async_trait]
pub trait MediaResolver: Send + Sync {
    async fn resolve(&self, request: &str, kind: StreamKind) -> Result<ResolvedMedia, ResolutionError>;
}

const DIRECT_SCHEMES: &[&str] = &["http://", "https://", "rtmp://", "rtmps://", "srt://"];

/// Accepts stream URLs as-is and rejects everything else
#[derive(Debug, Default, Clone, Copy)]
pub struct DirectUrlResolver;

#[async_trait]
impl MediaResolver for DirectUrlResolver {
    async fn resolve(&self, request: &str, _kind: StreamKind) -> Result<ResolvedMedia, ResolutionError> {
        let url = request.trim();
        let lower = url.to_ascii_lowercase();
        let supported = DIRECT_SCHEMES
            .iter()
            .any(|scheme| lower.starts_with(scheme) && lower.len() > scheme.len());

        if !supported {
            return Err(ResolutionError::Unsupported(url.to_string()));
        }

        Ok(ResolvedMedia {
            source: MediaSource::Url(url.to_string()),
            title: "Direct URL".to_string(),
            duration_secs: None,
            thumbnail: None,
            origin: JobOrigin::DirectUrl,
        })
    }
}
