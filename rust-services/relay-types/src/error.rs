//! Error types for the stream relay
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


use std::fmt::Display;
use std::path::PathBuf;
use thiserror::Error;

use crate::job::DestinationId;

/// Longest error text ever shown to an end user
pub const USER_MESSAGE_MAX_CHARS: usize = 50;

/// Destination configuration problems
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("No RTMP key configured for destination {0}")]
    NoKeyConfigured(DestinationId),
}

/// Upstream media resolution failures
#[derive(Error, Debug)]
pub enum ResolutionError {
    #[error("Unsupported media reference: {0}")]
    Unsupported(String),

    #[error("Media resolver failed: {0}")]
    Upstream(String),
}

/// Encoder process failures
#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Failed to spawn encoder {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Encoder exited with code {0}")]
    Exited(i32),

    #[error("Encoder terminated by signal")]
    Signaled,

    #[error("Failed to wait on encoder: {0}")]
    Wait(#[source] std::io::Error),
}

/// Temp file removal failures. Logged, never fatal.
#[derive(Error, Debug)]
pub enum CleanupError {
    #[error("Failed to remove temp file {path}: {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Notifier failures. Best-effort, logged and dropped.
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Notification delivery failed: {0}")]
    Delivery(String),

    #[error("Notification timed out")]
    Timeout,
}

/// Outcome recorder failures. Logged and dropped.
#[derive(Error, Debug)]
pub enum RecordError {
    #[error("Failed to record stream outcome: {0}")]
    Store(String),
}

/// Short, truncated error text suitable for end users.
///
/// Full error details belong in the logs only.
pub fn user_message(err: &impl Display) -> String {
    let text = err.to_string();
    let truncated: String = text.chars().take(USER_MESSAGE_MAX_CHARS).collect();
    format!("Error: {}", truncated)
}
