//! Line-oriented control console
//!
//! Stands in for a chat front-end: each stdin line is one command addressed to
//! a destination, and each command produces one text reply.
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


use crate::collaborators::{DirectUrlResolver, MediaResolver};
use crate::runner::StreamRunner;
use crate::stats::MemoryStatsStore;
use relay_types::{
    format_duration, render_queue, user_message, DestinationId, JobOrigin, MediaSource, Requester,
    StreamJob, StreamKind,
};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

pub const HELP_TEXT: &str = "\
Stream relay console

SETUP:
setkey <dest> <key> - Set the stream key of a destination

STREAMING:
play <dest> <file> [title] - Stream a local media file (video+audio)
playaudio <dest> <file> [title] - Stream a local media file (audio only)
uplay <dest> <url> - Stream a direct URL
uaudio <dest> <url> - Stream a direct URL (audio only)

CONTROL:
stop <dest> - Stop the stream and clear the queue
skip <dest> - Skip to the next queued stream
queue <dest> - View the queue

INFO:
status <dest> - Check stream status
stats [user_id] - View stream statistics
help - Show this help message
quit - Stop every stream and exit";

const NO_KEY_REPLY: &str = "Set RTMP key first using setkey.";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CommandError {
    #[error("Unknown command: {0}. Type help for the command list.")]
    Unknown(String),

    #[error("Usage: {0}")]
    Usage(&'static str),

    #[error("Invalid destination: {0}")]
    InvalidDestination(String),

    #[error("Invalid user id: {0}")]
    InvalidUser(String),
}

/// A parsed console line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    SetKey { destination: DestinationId, key: String },
    Play {
        destination: DestinationId,
        kind: StreamKind,
        path: PathBuf,
        title: Option<String>,
    },
    PlayUrl {
        destination: DestinationId,
        kind: StreamKind,
        url: String,
    },
    Stop(DestinationId),
    Skip(DestinationId),
    Queue(DestinationId),
    Status(DestinationId),
    Stats(Option<i64>),
    Help,
    Quit,
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let Some(name) = words.next() else {
            return Ok(Command::Help);
        };
        let rest: Vec<&str> = words.collect();

        let destination = |usage: &'static str| -> Result<DestinationId, CommandError> {
            let raw = rest.first().ok_or(CommandError::Usage(usage))?;
            raw.parse()
                .map_err(|_| CommandError::InvalidDestination(raw.to_string()))
        };

        match name.trim_start_matches('/').to_ascii_lowercase().as_str() {
            "setkey" => {
                const USAGE: &str = "setkey <dest> <key>";
                let destination = destination(USAGE)?;
                let key = rest.get(1).ok_or(CommandError::Usage(USAGE))?;
                Ok(Command::SetKey {
                    destination,
                    key: key.to_string(),
                })
            }
            cmd @ ("play" | "playaudio") => {
                let (usage, kind) = if cmd == "play" {
                    ("play <dest> <file> [title]", StreamKind::Full)
                } else {
                    ("playaudio <dest> <file> [title]", StreamKind::AudioOnly)
                };
                let destination = destination(usage)?;
                let path = rest.get(1).ok_or(CommandError::Usage(usage))?;
                let title = (rest.len() > 2).then(|| rest[2..].join(" "));
                Ok(Command::Play {
                    destination,
                    kind,
                    path: PathBuf::from(path),
                    title,
                })
            }
            cmd @ ("uplay" | "uaudio") => {
                let (usage, kind) = if cmd == "uplay" {
                    ("uplay <dest> <url>", StreamKind::Full)
                } else {
                    ("uaudio <dest> <url>", StreamKind::AudioOnly)
                };
                let destination = destination(usage)?;
                let url = rest.get(1).ok_or(CommandError::Usage(usage))?;
                Ok(Command::PlayUrl {
                    destination,
                    kind,
                    url: url.to_string(),
                })
            }
            "stop" => Ok(Command::Stop(destination("stop <dest>")?)),
            "skip" => Ok(Command::Skip(destination("skip <dest>")?)),
            "queue" => Ok(Command::Queue(destination("queue <dest>")?)),
            "status" => Ok(Command::Status(destination("status <dest>")?)),
            "stats" => match rest.first() {
                Some(raw) => raw
                    .parse()
                    .map(|id| Command::Stats(Some(id)))
                    .map_err(|_| CommandError::InvalidUser(raw.to_string())),
                None => Ok(Command::Stats(None)),
            },
            "help" | "start" => Ok(Command::Help),
            "quit" | "exit" => Ok(Command::Quit),
            other => Err(CommandError::Unknown(other.to_string())),
        }
    }
}

/// Executes console commands on behalf of a single operator
pub struct Console {
    runner: StreamRunner,
    stats: Arc<MemoryStatsStore>,
    resolver: Arc<dyn MediaResolver>,
    requester: Requester,
}

impl Console {
    pub fn new(runner: StreamRunner, stats: Arc<MemoryStatsStore>, requester: Requester) -> Self {
        Self {
            runner,
            stats,
            resolver: Arc::new(DirectUrlResolver),
            requester,
        }
    }

    /// Use a different resolver for URL requests
    pub fn with_resolver(mut self, resolver: Arc<dyn MediaResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Parse and run one line, returning the reply text
    pub async fn handle_line(&self, line: &str) -> String {
        match line.parse::<Command>() {
            Ok(command) => self.execute(command).await,
            Err(e) => e.to_string(),
        }
    }

    pub async fn execute(&self, command: Command) -> String {
        match command {
            Command::SetKey { destination, key } => {
                self.runner.set_key(destination, key);
                self.audit(destination, "SETKEY", "", "");
                "RTMP key configured.".to_string()
            }
            Command::Play {
                destination,
                kind,
                path,
                title,
            } => self.play_file(destination, kind, &path, title).await,
            Command::PlayUrl {
                destination,
                kind,
                url,
            } => self.play_url(destination, kind, &url).await,
            Command::Stop(destination) => {
                self.runner.stop_all(destination).await;
                self.audit(destination, "STOP", "", "");
                "Stream stopped.".to_string()
            }
            Command::Skip(destination) => {
                self.runner.skip(destination).await;
                self.audit(destination, "SKIP", "", "");
                "Stream skipped.".to_string()
            }
            Command::Queue(destination) => render_queue(&self.runner.list(destination).await),
            Command::Status(destination) => {
                let status = self.runner.status(destination).await;
                match self.runner.now_playing(destination).await {
                    Some(playing) => format!(
                        "Stream status: {}\nNow playing: {} ({})",
                        status,
                        playing.title,
                        format_duration(playing.elapsed_secs)
                    ),
                    None => format!("Stream status: {}", status),
                }
            }
            Command::Stats(user_id) => {
                let user_id = user_id.unwrap_or(self.requester.user_id);
                self.stats.user_stats(user_id).await.render()
            }
            Command::Help => HELP_TEXT.to_string(),
            Command::Quit => "Bye.".to_string(),
        }
    }

    async fn play_file(
        &self,
        destination: DestinationId,
        kind: StreamKind,
        path: &Path,
        title: Option<String>,
    ) -> String {
        if !self.runner.has_key(destination) {
            return NO_KEY_REPLY.to_string();
        }

        let owned = match copy_to_temp(path).await {
            Ok(owned) => owned,
            Err(e) => return user_message(&e),
        };

        let title = title.unwrap_or_else(|| {
            path.file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| "Media".to_string())
        });

        let job = StreamJob::new(
            destination,
            MediaSource::TempFile(owned),
            kind,
            self.requester.clone(),
            JobOrigin::LocalMedia,
        )
        .with_title(title);

        self.queue_job(job).await
    }

    async fn play_url(&self, destination: DestinationId, kind: StreamKind, url: &str) -> String {
        if !self.runner.has_key(destination) {
            return NO_KEY_REPLY.to_string();
        }

        match self.resolver.resolve(url, kind).await {
            Ok(media) => {
                let job = media.into_job(destination, kind, self.requester.clone());
                self.queue_job(job).await
            }
            Err(e) => user_message(&e),
        }
    }

    async fn queue_job(&self, job: StreamJob) -> String {
        let reply = format!("Queued: {}", job.title);
        let action = job.origin.action_label(job.kind);
        self.audit(job.destination, action, &job.title, &job.display_duration);
        self.runner.submit(job).await;
        reply
    }

    fn audit(&self, destination: DestinationId, action: &str, title: &str, duration: &str) {
        info!(
            target: "audit",
            action = action,
            user_id = self.requester.user_id,
            username = %self.requester.username,
            destination = %destination,
            title = title,
            duration = duration,
            "action"
        );
    }
}

/// Copy `path` into a temp file owned by the job
async fn copy_to_temp(path: &Path) -> std::io::Result<PathBuf> {
    let suffix = path
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_else(|| ".tmp".to_string());

    let prefix = match path.file_stem() {
        Some(stem) => format!("relay-{}-", stem.to_string_lossy()),
        None => "relay-".to_string(),
    };

    let temp = tempfile::Builder::new()
        .prefix(&prefix)
        .suffix(&suffix)
        .tempfile()?;
    let owned = temp.into_temp_path().keep().map_err(|e| e.error)?;

    if let Err(e) = tokio::fs::copy(path, &owned).await {
        let _ = tokio::fs::remove_file(&owned).await;
        return Err(e);
    }
    Ok(owned)
}
