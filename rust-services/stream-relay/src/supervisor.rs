//! Encoder process supervision
//!
//! Owns the lifecycle of the transcoder process bound to a destination:
//! spawning it, waiting for it in a detached task, stopping it on request and
//! finalizing every exit the same way (record, release, clear, advance).
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
use crate::state::{ActiveEncode, DestinationState, Destinations};
use chrono::Utc;
use relay_types::{
    user_message, DestinationId, OutcomeStatus, ProcessError, StreamJob, StreamOutcome,
    StreamStatus,
};
use std::collections::VecDeque;
use std::process::ExitStatus;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Lines of encoder stderr kept for failure diagnostics
const STDERR_TAIL_LINES: usize = 20;

/// How long to wait for the stderr reader after the process is gone
const STDERR_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// How a supervised process ended
enum Exit {
    Natural(std::io::Result<ExitStatus>),
    Stopped,
}

#[derive(Clone)]
pub(crate) struct ProcessSupervisor {
    destinations: Arc<Destinations>,
    recorder: Arc<dyn OutcomeRecorder>,
    notifier: Arc<dyn Notifier>,
    advance_tx: mpsc::UnboundedSender<DestinationId>,
    stop_grace: Duration,
    notify_timeout: Duration,
    next_encode_id: Arc<AtomicU64>,
}

impl ProcessSupervisor {
    pub fn new(
        destinations: Arc<Destinations>,
        recorder: Arc<dyn OutcomeRecorder>,
        notifier: Arc<dyn Notifier>,
        advance_tx: mpsc::UnboundedSender<DestinationId>,
        stop_grace: Duration,
        notify_timeout: Duration,
    ) -> Self {
        Self {
            destinations,
            recorder,
            notifier,
            advance_tx,
            stop_grace,
            notify_timeout,
            next_encode_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Spawn the encoder for `job` and make it the destination's active encode.
    ///
    /// The caller holds the destination lock and has checked that nothing is
    /// active. On spawn failure the job is still finalized as an error (outcome
    /// recorded, temp file released, advance requested) and the error is
    /// returned so the caller can tell the user.
    pub fn start(
        &self,
        state: &mut DestinationState,
        command: &EncodeCommand,
        job: StreamJob,
    ) -> Result<(), ProcessError> {
        let destination = job.destination;
        let encode_id = self.next_encode_id.fetch_add(1, Ordering::Relaxed);

        let mut child = match command.to_command().spawn() {
            Ok(child) => child,
            Err(source) => {
                let err = ProcessError::Spawn {
                    program: command.program().to_string(),
                    source,
                };
                error!(
                    destination = %destination,
                    job_id = %job.id,
                    error = %err,
                    "Encoder failed to start"
                );
                state.status = StreamStatus::Error;

                let supervisor = self.clone();
                tokio::spawn(async move {
                    supervisor
                        .finish(job, encode_id, Duration::ZERO, OutcomeStatus::Error, None)
                        .await;
                });
                return Err(err);
            }
        };

        let pid = child.id();
        let stderr = child.stderr.take();
        let (stop_tx, stop_rx) = oneshot::channel();
        let (finished_tx, finished_rx) = watch::channel(false);
        let started_at = Instant::now();

        state.active = Some(ActiveEncode {
            encode_id,
            job_id: job.id,
            title: job.title.clone(),
            kind: job.kind,
            pid,
            started_at,
            started_at_utc: Utc::now(),
            stop_tx: Some(stop_tx),
            finished: finished_rx,
        });
        state.status = StreamStatus::Streaming;

        info!(
            destination = %destination,
            job_id = %job.id,
            pid = ?pid,
            kind = %job.kind,
            command = %command,
            "Encoder started"
        );

        let supervisor = self.clone();
        tokio::spawn(async move {
            supervisor
                .supervise(child, stderr, stop_rx, finished_tx, job, encode_id, started_at)
                .await;
        });

        Ok(())
    }

    /// Stop the active encode of `destination` and wait until it is finalized.
    ///
    /// Returns `false` when nothing was active. Concurrent calls all wait on
    /// the same termination. A job whose start is still being announced is
    /// cancelled instead and never spawned.
    pub async fn stop(&self, destination: DestinationId) -> bool {
        let slot = self.destinations.slot(destination).await;
        let mut finished = {
            let mut state = slot.lock().await;
            if state.active.is_none() {
                let Some(pending) = state.starting.as_mut() else {
                    return false;
                };
                if !pending.cancelled {
                    info!(
                        destination = %destination,
                        job_id = %pending.job_id,
                        "Cancelling job before encoder start"
                    );
                    pending.cancelled = true;
                }
                state.status = StreamStatus::Stopped;
                return true;
            }
            let Some(active) = state.active.as_mut() else {
                return false;
            };
            if let Some(stop_tx) = active.stop_tx.take() {
                info!(destination = %destination, job_id = %active.job_id, "Stopping encoder");
                let _ = stop_tx.send(());
            }
            active.finished.clone()
        };

        // Sender side is dropped only after it has published `true`
        let _ = finished.wait_for(|done| *done).await;
        true
    }

    #[allow(clippy::too_many_arguments)]
    async fn supervise(
        self,
        mut child: Child,
        stderr: Option<ChildStderr>,
        mut stop_rx: oneshot::Receiver<()>,
        finished_tx: watch::Sender<bool>,
        job: StreamJob,
        encode_id: u64,
        started_at: Instant,
    ) {
        let destination = job.destination;
        let collector = stderr.map(|stderr| tokio::spawn(collect_stderr_tail(stderr)));

        let exit = tokio::select! {
            status = child.wait() => Exit::Natural(status),
            Ok(()) = &mut stop_rx => Exit::Stopped,
        };

        if matches!(exit, Exit::Stopped) {
            self.terminate(&mut child, destination).await;
        }

        let duration = started_at.elapsed();
        let (status, failure) = match exit {
            Exit::Natural(Ok(exit_status)) if exit_status.success() => (OutcomeStatus::Completed, None),
            Exit::Natural(Ok(exit_status)) => {
                let err = match exit_status.code() {
                    Some(code) => ProcessError::Exited(code),
                    None => ProcessError::Signaled,
                };
                (OutcomeStatus::Error, Some(err))
            }
            Exit::Natural(Err(e)) => (OutcomeStatus::Error, Some(ProcessError::Wait(e))),
            // A deliberate stop is never an error, whatever the exit code
            Exit::Stopped => (OutcomeStatus::Stopped, None),
        };

        let stderr_tail = drain_collector(collector).await;

        match &failure {
            Some(err) => {
                error!(
                    destination = %destination,
                    job_id = %job.id,
                    duration_secs = duration.as_secs_f64(),
                    error = %err,
                    stderr = %stderr_tail.join("\n"),
                    "Encoder failed"
                );
                deliver(
                    self.notify_timeout,
                    destination,
                    "error",
                    self.notifier.notify_error(destination, &user_message(err)),
                )
                .await;
            }
            None => info!(
                destination = %destination,
                job_id = %job.id,
                duration_secs = duration.as_secs_f64(),
                status = %status,
                "Encoder exited"
            ),
        }

        self.finish(job, encode_id, duration, status, Some(finished_tx)).await;
    }

    /// Ask the encoder to exit, escalating to a kill after the grace period
    async fn terminate(&self, child: &mut Child, destination: DestinationId) {
        if request_exit(child) {
            match tokio::time::timeout(self.stop_grace, child.wait()).await {
                Ok(_) => return,
                Err(_) => warn!(
                    destination = %destination,
                    grace_secs = self.stop_grace.as_secs_f64(),
                    "Encoder ignored stop request, killing"
                ),
            }
        }

        if let Err(e) = child.kill().await {
            debug!(destination = %destination, error = %e, "Encoder kill failed");
        }
    }

    /// Single exit path for every job handed to the supervisor
    async fn finish(
        &self,
        job: StreamJob,
        encode_id: u64,
        duration: Duration,
        status: OutcomeStatus,
        finished_tx: Option<watch::Sender<bool>>,
    ) {
        let destination = job.destination;
        let outcome = StreamOutcome::for_job(&job, duration, status);
        match tokio::time::timeout(self.notify_timeout, self.recorder.record(&outcome)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(destination = %destination, job_id = %job.id, error = %e, "Outcome not recorded")
            }
            Err(_) => warn!(
                destination = %destination,
                job_id = %job.id,
                timeout_secs = self.notify_timeout.as_secs_f64(),
                "Outcome recorder timed out"
            ),
        }

        release_source(job.source).await;

        {
            let slot = self.destinations.slot(destination).await;
            let mut state = slot.lock().await;
            let owned = match &state.active {
                Some(active) => active.encode_id == encode_id,
                None => true,
            };
            if owned {
                state.active = None;
                state.status = status.into();
            }
        }

        if let Some(finished_tx) = finished_tx {
            let _ = finished_tx.send(true);
        }

        self.request_advance(destination);
    }

    /// Ask the runner to start the next queued job of `destination`
    pub fn request_advance(&self, destination: DestinationId) {
        if self.advance_tx.send(destination).is_err() {
            debug!(destination = %destination, "Runner gone, not advancing");
        }
    }
}

#[cfg(unix)]
fn request_exit(child: &mut Child) -> bool {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    match child.id() {
        Some(pid) => kill(Pid::from_raw(pid as i32), Signal::SIGTERM).is_ok(),
        None => false,
    }
}

#[cfg(not(unix))]
fn request_exit(child: &mut Child) -> bool {
    child.start_kill().is_ok()
}

async fn collect_stderr_tail(stderr: ChildStderr) -> Vec<String> {
    let mut lines = BufReader::new(stderr).lines();
    let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
    while let Ok(Some(line)) = lines.next_line().await {
        if tail.len() == STDERR_TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(line);
    }
    tail.into()
}

async fn drain_collector(collector: Option<JoinHandle<Vec<String>>>) -> Vec<String> {
    let Some(mut handle) = collector else {
        return Vec::new();
    };
    match tokio::time::timeout(STDERR_DRAIN_TIMEOUT, &mut handle).await {
        Ok(Ok(lines)) => lines,
        Ok(Err(_)) => Vec::new(),
        Err(_) => {
            handle.abort();
            Vec::new()
        }
    }
}
