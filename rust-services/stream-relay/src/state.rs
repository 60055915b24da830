//! Per-destination scheduling state
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


use crate::queue::JobQueue;
use chrono::{DateTime, Utc};
use relay_types::{DestinationId, StreamKind, StreamStatus};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{oneshot, watch, Mutex};
use uuid::Uuid;

/// The running encoder bound to a destination
pub(crate) struct ActiveEncode {
    pub encode_id: u64,
    pub job_id: Uuid,
    pub title: String,
    pub kind: StreamKind,
    pub pid: Option<u32>,
    pub started_at: Instant,
    pub started_at_utc: DateTime<Utc>,
    /// Taken by the first stop request
    pub stop_tx: Option<oneshot::Sender<()>>,
    /// Flips to `true` once the encode has been fully finalized
    pub finished: watch::Receiver<bool>,
}

impl ActiveEncode {
    pub fn now_playing(&self) -> NowPlaying {
        NowPlaying {
            job_id: self.job_id,
            title: self.title.clone(),
            kind: self.kind,
            pid: self.pid,
            started_at: self.started_at_utc,
            elapsed_secs: self.started_at.elapsed().as_secs(),
            stopping: self.stop_tx.is_none(),
        }
    }
}

/// A job taken off the queue whose start announcement is still in flight
pub(crate) struct PendingStart {
    pub job_id: Uuid,
    /// Set by a stop that arrives before the encoder is spawned
    pub cancelled: bool,
    /// Flips to `true` once the job was handed to the supervisor or dropped
    pub done: watch::Receiver<bool>,
}

impl PendingStart {
    pub fn new(job_id: Uuid) -> (Self, watch::Sender<bool>) {
        let (done_tx, done) = watch::channel(false);
        let pending = Self {
            job_id,
            cancelled: false,
            done,
        };
        (pending, done_tx)
    }
}

/// Public view of the active encode
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NowPlaying {
    pub job_id: Uuid,
    pub title: String,
    pub kind: StreamKind,
    pub pid: Option<u32>,
    pub started_at: DateTime<Utc>,
    pub elapsed_secs: u64,
    /// A stop has been requested and termination is in progress
    pub stopping: bool,
}

/// Everything the scheduler knows about one destination.
///
/// Always accessed through the destination's mutex; every state transition
/// for a destination is serialized on it.
#[derive(Default)]
pub(crate) struct DestinationState {
    pub queue: JobQueue,
    pub active: Option<ActiveEncode>,
    pub starting: Option<PendingStart>,
    pub status: StreamStatus,
}

impl DestinationState {
    /// An encode is running or about to be spawned
    pub fn is_busy(&self) -> bool {
        self.active.is_some() || self.starting.is_some()
    }
}

pub(crate) type DestinationSlot = Arc<Mutex<DestinationState>>;

/// Lazily populated table of destination slots.
///
/// The table lock is only held long enough to look up or insert a slot, so
/// destinations never wait on each other.
#[derive(Default)]
pub(crate) struct Destinations {
    slots: Mutex<HashMap<DestinationId, DestinationSlot>>,
}

impl Destinations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Slot for `destination`, created on first use
    pub async fn slot(&self, destination: DestinationId) -> DestinationSlot {
        let mut slots = self.slots.lock().await;
        slots.entry(destination).or_default().clone()
    }

    /// Every destination seen so far
    pub async fn ids(&self) -> Vec<DestinationId> {
        let slots = self.slots.lock().await;
        let mut ids: Vec<DestinationId> = slots.keys().copied().collect();
        ids.sort();
        ids
    }
}
