//! Destination status and stream outcome records
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
use std::time::Duration;
use uuid::Uuid;

use crate::job::{DestinationId, JobOrigin, StreamJob, StreamKind};

/// Last known state of a destination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamStatus {
    #[default]
    Idle,
    Streaming,
    Completed,
    Error,
    Stopped,
}

impl StreamStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamStatus::Idle => "idle",
            StreamStatus::Streaming => "streaming",
            StreamStatus::Completed => "completed",
            StreamStatus::Error => "error",
            StreamStatus::Stopped => "stopped",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StreamStatus::Completed | StreamStatus::Error | StreamStatus::Stopped
        )
    }
}

impl fmt::Display for StreamStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How an encode ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    /// Encoder exited successfully on its own
    Completed,
    /// Encoder exited non-zero, crashed, or never started
    Error,
    /// Encoder was terminated on request
    Stopped,
}

impl OutcomeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeStatus::Completed => "completed",
            OutcomeStatus::Error => "error",
            OutcomeStatus::Stopped => "stopped",
        }
    }
}

impl From<OutcomeStatus> for StreamStatus {
    fn from(status: OutcomeStatus) -> Self {
        match status {
            OutcomeStatus::Completed => StreamStatus::Completed,
            OutcomeStatus::Error => StreamStatus::Error,
            OutcomeStatus::Stopped => StreamStatus::Stopped,
        }
    }
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Statistic written once per finished encode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamOutcome {
    pub job_id: Uuid,
    pub destination: DestinationId,
    pub user_id: i64,
    pub username: String,
    pub title: String,
    /// Wall-clock seconds the encoder ran
    pub duration_secs: f64,
    pub stream_kind: StreamKind,
    pub origin: JobOrigin,
    pub status: OutcomeStatus,
    pub recorded_at: DateTime<Utc>,
}

impl StreamOutcome {
    pub fn for_job(job: &StreamJob, duration: Duration, status: OutcomeStatus) -> Self {
        Self {
            job_id: job.id,
            destination: job.destination,
            user_id: job.requested_by.user_id,
            username: job.requested_by.username.clone(),
            title: job.title.clone(),
            duration_secs: duration.as_secs_f64(),
            stream_kind: job.kind,
            origin: job.origin,
            status,
            recorded_at: Utc::now(),
        }
    }

    /// Action label of the originating request (`PLAY`, `UPLAY`, ...)
    pub fn action_label(&self) -> &'static str {
        self.origin.action_label(self.stream_kind)
    }
}
