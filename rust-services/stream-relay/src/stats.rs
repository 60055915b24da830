//! In-memory stream statistics
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


use crate::collaborators::OutcomeRecorder;
use async_trait::async_trait;
use relay_types::{OutcomeStatus, RecordError, StreamKind, StreamOutcome};
use serde::Serialize;
use std::collections::HashSet;
use tokio::sync::RwLock;
use tracing::debug;

/// Aggregated statistics of one user
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UserStats {
    pub user_id: i64,
    pub total_streams: usize,
    pub successful_streams: usize,
    pub failed_streams: usize,
    pub stopped_streams: usize,
    /// Seconds across every recorded stream
    pub total_duration: f64,
    /// Total duration divided by successful streams, 0 without any
    pub avg_duration: f64,
}

impl UserStats {
    /// Text block shown for the `stats` command
    pub fn render(&self) -> String {
        format!(
            "Stream Statistics\n\n\
             Total Streams: {}\n\
             Successful Streams: {}\n\
             Failed Streams: {}\n\
             Stopped Streams: {}\n\
             Total Stream Time: {} seconds\n\
             Average Stream Time: {} seconds",
            self.total_streams,
            self.successful_streams,
            self.failed_streams,
            self.stopped_streams,
            self.total_duration as u64,
            self.avg_duration as u64,
        )
    }
}

/// Outcome recorder keeping every outcome for the lifetime of the process
#[derive(Default)]
pub struct MemoryStatsStore {
    outcomes: RwLock<Vec<StreamOutcome>>,
}

impl MemoryStatsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn user_stats(&self, user_id: i64) -> UserStats {
        let outcomes = self.outcomes.read().await;
        let mut stats = UserStats {
            user_id,
            ..UserStats::default()
        };

        for outcome in outcomes.iter().filter(|o| o.user_id == user_id) {
            stats.total_streams += 1;
            stats.total_duration += outcome.duration_secs;
            match outcome.status {
                OutcomeStatus::Completed => stats.successful_streams += 1,
                OutcomeStatus::Error => stats.failed_streams += 1,
                OutcomeStatus::Stopped => stats.stopped_streams += 1,
            }
        }

        if stats.successful_streams > 0 {
            stats.avg_duration = stats.total_duration / stats.successful_streams as f64;
        }
        stats
    }

    /// Streams of `kind` requested by `user_id`
    pub async fn streams_by_kind(&self, user_id: i64, kind: StreamKind) -> usize {
        let outcomes = self.outcomes.read().await;
        outcomes
            .iter()
            .filter(|o| o.user_id == user_id && o.stream_kind == kind)
            .count()
    }

    pub async fn total_streams(&self) -> usize {
        self.outcomes.read().await.len()
    }

    /// Distinct users with at least one recorded stream
    pub async fn total_users(&self) -> usize {
        let outcomes = self.outcomes.read().await;
        outcomes.iter().map(|o| o.user_id).collect::<HashSet<_>>().len()
    }

    /// Most recent outcomes, newest first
    pub async fn recent(&self, limit: usize) -> Vec<StreamOutcome> {
        let outcomes = self.outcomes.read().await;
        outcomes.iter().rev().take(limit).cloned().collect()
    }
}

#[async_trait]
impl OutcomeRecorder for MemoryStatsStore {
    async fn record(&self, outcome: &StreamOutcome) -> Result<(), RecordError> {
        debug!(
            user_id = outcome.user_id,
            job_id = %outcome.job_id,
            status = %outcome.status,
            "Stream outcome recorded"
        );
        self.outcomes.write().await.push(outcome.clone());
        Ok(())
    }
}
