//! Stream runner
//!
//! Drives each destination's queue: pops the next job once the destination is
//! idle, resolves its ingest URL, announces it and hands it to the process
//! supervisor. Every encoder exit re-enters [`StreamRunner::advance`] through
//! the supervisor's completion channel.
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


use crate::cleanup::release_source;
use crate::collaborators::{deliver, Notifier, OutcomeRecorder};
use crate::command::EncodeCommand;
use crate::queue::QueueManager;
use crate::resolver::DestinationResolver;
use crate::state::{Destinations, NowPlaying, PendingStart};
use crate::supervisor::ProcessSupervisor;
use futures::future::join_all;
use relay_config::RelayConfig;
use relay_types::{user_message, DestinationId, QueueEntry, StreamJob, StreamStatus};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Handle to the scheduler. Cheap to clone.
#[derive(Clone)]
pub struct StreamRunner {
    inner: Arc<RunnerInner>,
}

struct RunnerInner {
    destinations: Arc<Destinations>,
    queue: QueueManager,
    resolver: DestinationResolver,
    supervisor: ProcessSupervisor,
    notifier: Arc<dyn Notifier>,
    ffmpeg_path: String,
    notify_timeout: Duration,
}

impl StreamRunner {
    /// Create a runner and its completion driver.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        config: &RelayConfig,
        notifier: Arc<dyn Notifier>,
        recorder: Arc<dyn OutcomeRecorder>,
    ) -> Self {
        let destinations = Arc::new(Destinations::new());
        let (advance_tx, advance_rx) = mpsc::unbounded_channel();

        let supervisor = ProcessSupervisor::new(
            destinations.clone(),
            recorder,
            notifier.clone(),
            advance_tx,
            config.encoder.stop_grace,
            config.notify_timeout,
        );

        let inner = Arc::new(RunnerInner {
            queue: QueueManager::new(destinations.clone()),
            destinations,
            resolver: DestinationResolver::from_config(&config.ingest),
            supervisor,
            notifier,
            ffmpeg_path: config.encoder.ffmpeg_path.clone(),
            notify_timeout: config.notify_timeout,
        });

        tokio::spawn(drive(Arc::downgrade(&inner), advance_rx));

        Self { inner }
    }

    pub fn queue(&self) -> &QueueManager {
        &self.inner.queue
    }

    pub fn resolver(&self) -> &DestinationResolver {
        &self.inner.resolver
    }

    pub fn set_key(&self, destination: DestinationId, key: impl Into<String>) {
        self.inner.resolver.set_key(destination, key);
    }

    pub fn remove_key(&self, destination: DestinationId) -> bool {
        self.inner.resolver.remove_key(destination)
    }

    pub fn has_key(&self, destination: DestinationId) -> bool {
        self.inner.resolver.has_key(destination)
    }

    /// Queue a job and start it right away if its destination is idle
    pub async fn submit(&self, job: StreamJob) {
        let destination = job.destination;
        self.inner.queue.enqueue(job).await;
        self.inner.advance(destination).await;
    }

    /// Start the next queued job if nothing is streaming
    pub async fn advance(&self, destination: DestinationId) {
        self.inner.advance(destination).await;
    }

    /// Stop the active encode, or cancel a job still being announced.
    /// Returns whether either was found.
    pub async fn stop(&self, destination: DestinationId) -> bool {
        self.inner.supervisor.stop(destination).await
    }

    /// Stop the active encode and immediately start the next queued job.
    ///
    /// Returns once the next job, if any, has been handed to the supervisor.
    pub async fn skip(&self, destination: DestinationId) -> bool {
        let stopped = self.inner.supervisor.stop(destination).await;
        self.inner.advance(destination).await;
        self.inner.settle(destination).await;
        stopped
    }

    /// Drop every queued job, then stop the active encode
    pub async fn stop_all(&self, destination: DestinationId) -> bool {
        let removed = self.inner.queue.clear(destination).await;
        for job in removed {
            release_source(job.source).await;
        }
        self.inner.supervisor.stop(destination).await
    }

    pub async fn status(&self, destination: DestinationId) -> StreamStatus {
        let slot = self.inner.destinations.slot(destination).await;
        let state = slot.lock().await;
        state.status
    }

    pub async fn now_playing(&self, destination: DestinationId) -> Option<NowPlaying> {
        let slot = self.inner.destinations.slot(destination).await;
        let state = slot.lock().await;
        state.active.as_ref().map(|active| active.now_playing())
    }

    pub async fn list(&self, destination: DestinationId) -> Vec<QueueEntry> {
        self.inner.queue.list(destination).await
    }

    /// Clear every queue and stop every encode
    pub async fn shutdown(&self) {
        let destinations = self.inner.destinations.ids().await;
        info!(destinations = destinations.len(), "Shutting down stream runner");
        join_all(destinations.into_iter().map(|destination| self.stop_all(destination))).await;
    }
}

impl RunnerInner {
    async fn advance(&self, destination: DestinationId) {
        let slot = self.destinations.slot(destination).await;

        let (job, command, done_tx) = {
            let mut state = slot.lock().await;

            if state.is_busy() {
                debug!(destination = %destination, "Destination busy, not advancing");
                return;
            }

            let Some(job) = state.queue.pop_next() else {
                debug!(destination = %destination, status = %state.status, "Queue drained");
                return;
            };

            let ingest_url = match self.resolver.resolve(destination) {
                Ok(url) => url,
                Err(e) => {
                    drop(state);
                    warn!(destination = %destination, job_id = %job.id, error = %e, "Job dropped");
                    deliver(
                        self.notify_timeout,
                        destination,
                        "error",
                        self.notifier.notify_error(destination, &user_message(&e)),
                    )
                    .await;
                    release_source(job.source).await;
                    return;
                }
            };

            let command = EncodeCommand::build(&job.source, job.kind, &ingest_url)
                .with_program(self.ffmpeg_path.as_str());
            let (pending, done_tx) = PendingStart::new(job.id);
            state.starting = Some(pending);
            (job, command, done_tx)
        };

        // The destination stays busy but unlocked while the start is announced
        deliver(
            self.notify_timeout,
            destination,
            "start",
            self.notifier
                .notify_start(destination, &job.caption(), job.thumbnail.as_deref()),
        )
        .await;

        let mut state = slot.lock().await;
        let cancelled = state.starting.take().is_some_and(|pending| pending.cancelled);

        if cancelled {
            drop(state);
            let _ = done_tx.send(true);
            info!(destination = %destination, job_id = %job.id, "Job stopped before encoder start");
            release_source(job.source).await;
            self.supervisor.request_advance(destination);
            return;
        }

        let started = self.supervisor.start(&mut state, &command, job);
        drop(state);
        let _ = done_tx.send(true);

        if let Err(e) = started {
            deliver(
                self.notify_timeout,
                destination,
                "error",
                self.notifier.notify_error(destination, &user_message(&e)),
            )
            .await;
        }
    }

    /// Wait until a start announced by another advance has been handed off
    async fn settle(&self, destination: DestinationId) {
        let slot = self.destinations.slot(destination).await;
        let pending = {
            let state = slot.lock().await;
            state.starting.as_ref().map(|pending| pending.done.clone())
        };
        if let Some(mut done) = pending {
            let _ = done.wait_for(|done| *done).await;
        }
    }
}

/// Re-enter advance for every destination whose encoder has exited
async fn drive(runner: Weak<RunnerInner>, mut advance_rx: mpsc::UnboundedReceiver<DestinationId>) {
    while let Some(destination) = advance_rx.recv().await {
        let Some(inner) = runner.upgrade() else {
            break;
        };
        tokio::spawn(async move {
            inner.advance(destination).await;
        });
    }
    debug!("Advance driver stopped");
}
