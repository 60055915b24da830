//! Stream job definitions
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


use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// Destinations
// ============================================================================

/// Identifier of a streaming destination (a chat or channel)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DestinationId(pub i64);

impl DestinationId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl From<i64> for DestinationId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl fmt::Display for DestinationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DestinationId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<i64>().map(Self)
    }
}

// ============================================================================
// Job fields
// ============================================================================

/// Where the encoder reads its input from.
///
/// A `TempFile` is owned by the job and is deleted once the job is finished
/// with it. A `Url` is only borrowed and is never touched.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "location", rename_all = "snake_case")]
pub enum MediaSource {
    TempFile(PathBuf),
    Url(String),
}

impl MediaSource {
    /// Input argument handed to the encoder
    pub fn input(&self) -> String {
        match self {
            MediaSource::TempFile(path) => path.to_string_lossy().into_owned(),
            MediaSource::Url(url) => url.clone(),
        }
    }

    /// Path of the owned temp file, if any
    pub fn temp_file(&self) -> Option<&Path> {
        match self {
            MediaSource::TempFile(path) => Some(path.as_path()),
            MediaSource::Url(_) => None,
        }
    }

    pub fn is_owned(&self) -> bool {
        matches!(self, MediaSource::TempFile(_))
    }
}

/// Selects the encode template
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    /// Audio and video
    Full,
    /// Video discarded
    AudioOnly,
}

impl StreamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamKind::Full => "full",
            StreamKind::AudioOnly => "audio_only",
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the media was obtained. Only used for outcome logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobOrigin {
    LocalMedia,
    DirectUrl,
    SearchVideo,
    SearchAudio,
}

impl JobOrigin {
    /// Action label used in the audit log and the stats store
    pub fn action_label(&self, kind: StreamKind) -> &'static str {
        match (self, kind) {
            (JobOrigin::LocalMedia, StreamKind::Full) => "PLAY",
            (JobOrigin::LocalMedia, StreamKind::AudioOnly) => "PLAYAUDIO",
            (JobOrigin::DirectUrl, _) => "UPLAY",
            (JobOrigin::SearchVideo, _) => "YTPLAY",
            (JobOrigin::SearchAudio, _) => "YTAUDIO",
        }
    }
}

/// The user who asked for the stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requester {
    pub user_id: i64,
    pub username: String,
}

impl Requester {
    pub fn new(user_id: i64, username: impl Into<String>) -> Self {
        let username = username.into();
        Self {
            user_id,
            username: if username.is_empty() {
                "unknown".to_string()
            } else {
                username
            },
        }
    }
}

// ============================================================================
// Stream job
// ============================================================================

/// One request to stream a media source to a destination.
///
/// Not `Clone`: a job owns its temp file, and exactly one copy of it may
/// reach the supervisor.
#[derive(Debug, Serialize)]
pub struct StreamJob {
    pub id: Uuid,
    pub destination: DestinationId,
    pub source: MediaSource,
    pub kind: StreamKind,
    pub title: String,
    pub display_duration: String,
    pub thumbnail: Option<String>,
    pub requested_by: Requester,
    pub origin: JobOrigin,
    pub queued_at: DateTime<Utc>,
}

impl StreamJob {
    /// Create a new job with placeholder presentation fields
    pub fn new(
        destination: DestinationId,
        source: MediaSource,
        kind: StreamKind,
        requested_by: Requester,
        origin: JobOrigin,
    ) -> Self {
        let title = match origin {
            JobOrigin::DirectUrl => "Direct URL",
            JobOrigin::LocalMedia => "Media",
            JobOrigin::SearchVideo | JobOrigin::SearchAudio => "Unknown",
        };

        Self {
            id: Uuid::new_v4(),
            destination,
            source,
            kind,
            title: title.to_string(),
            display_duration: "Unknown".to_string(),
            thumbnail: None,
            requested_by,
            origin,
            queued_at: Utc::now(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_duration_secs(mut self, seconds: u64) -> Self {
        self.display_duration = format_duration(seconds);
        self
    }

    pub fn with_display_duration(mut self, duration: impl Into<String>) -> Self {
        self.display_duration = duration.into();
        self
    }

    pub fn with_thumbnail(mut self, thumbnail: impl Into<String>) -> Self {
        self.thumbnail = Some(thumbnail.into());
        self
    }

    /// Caption shown to the destination when the job starts
    pub fn caption(&self) -> String {
        let prefix = match self.kind {
            StreamKind::Full => "Streaming",
            StreamKind::AudioOnly => "Streaming (Audio)",
        };
        format!("{}: {}\nDuration: {}", prefix, self.title, self.display_duration)
    }

    /// Display snapshot for queue listings
    pub fn entry(&self) -> QueueEntry {
        QueueEntry {
            job_id: self.id,
            title: self.title.clone(),
            display_duration: self.display_duration.clone(),
            kind: self.kind,
            origin: self.origin,
            requested_by: self.requested_by.clone(),
            queued_at: self.queued_at,
        }
    }
}

/// Read-only view of a queued job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub job_id: Uuid,
    pub title: String,
    pub display_duration: String,
    pub kind: StreamKind,
    pub origin: JobOrigin,
    pub requested_by: Requester,
    pub queued_at: DateTime<Utc>,
}

/// Render a queue listing the way it is shown to users
pub fn render_queue(entries: &[QueueEntry]) -> String {
    if entries.is_empty() {
        return "Queue is empty.".to_string();
    }

    let mut lines = vec!["QUEUE:".to_string()];
    for (idx, entry) in entries.iter().enumerate() {
        lines.push(format!(
            "{}. {} ({})",
            idx + 1,
            entry.title,
            entry.display_duration
        ));
    }
    lines.join("\n")
}

/// Format seconds as `M:SS`, or `H:MM:SS` once an hour is reached
pub fn format_duration(seconds: u64) -> String {
    let (mins, secs) = (seconds / 60, seconds % 60);
    let (hours, mins) = (mins / 60, mins % 60);
    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, mins, secs)
    } else {
        format!("{}:{:02}", mins, secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn requester() -> Requester {
        Requester::new(7, "alice")
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0), "0:00");
        assert_eq!(format_duration(59), "0:59");
        assert_eq!(format_duration(61), "1:01");
        assert_eq!(format_duration(3600), "1:00:00");
        assert_eq!(format_duration(3725), "1:02:05");
    }

    #[test]
    fn test_caption_by_kind() {
        let job = StreamJob::new(
            DestinationId(1),
            MediaSource::Url("https://example.com/a.m3u8".to_string()),
            StreamKind::AudioOnly,
            requester(),
            JobOrigin::SearchAudio,
        )
        .with_title("Song")
        .with_duration_secs(200);

        assert_eq!(job.caption(), "Streaming (Audio): Song\nDuration: 3:20");
    }

    #[test]
    fn test_default_titles() {
        let job = StreamJob::new(
            DestinationId(1),
            MediaSource::Url("https://example.com/live".to_string()),
            StreamKind::Full,
            requester(),
            JobOrigin::DirectUrl,
        );
        assert_eq!(job.title, "Direct URL");
        assert_eq!(job.display_duration, "Unknown");
    }

    #[test]
    fn test_media_source_ownership() {
        let local = MediaSource::TempFile(PathBuf::from("/tmp/a.mp4"));
        let remote = MediaSource::Url("https://example.com/a.mp4".to_string());

        assert!(local.is_owned());
        assert_eq!(local.temp_file(), Some(Path::new("/tmp/a.mp4")));
        assert!(!remote.is_owned());
        assert!(remote.temp_file().is_none());
        assert_eq!(remote.input(), "https://example.com/a.mp4");
    }

    #[test]
    fn test_render_queue() {
        assert_eq!(render_queue(&[]), "Queue is empty.");

        let a = StreamJob::new(
            DestinationId(1),
            MediaSource::Url("https://example.com/a".to_string()),
            StreamKind::Full,
            requester(),
            JobOrigin::DirectUrl,
        )
        .with_title("First")
        .with_duration_secs(90);
        let b = StreamJob::new(
            DestinationId(1),
            MediaSource::Url("https://example.com/b".to_string()),
            StreamKind::Full,
            requester(),
            JobOrigin::DirectUrl,
        );

        assert_eq!(
            render_queue(&[a.entry(), b.entry()]),
            "QUEUE:\n1. First (1:30)\n2. Direct URL (Unknown)"
        );
    }

    #[test]
    fn test_destination_id_parse() {
        assert_eq!("-100123".parse::<DestinationId>().unwrap(), DestinationId(-100123));
        assert!("chat".parse::<DestinationId>().is_err());
    }

    #[test]
    fn test_empty_username_falls_back() {
        assert_eq!(Requester::new(1, "").username, "unknown");
    }
}
