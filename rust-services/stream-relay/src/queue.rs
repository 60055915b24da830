//! Per-destination FIFO job queues
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


use crate::state::Destinations;
use relay_types::{DestinationId, QueueEntry, StreamJob};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::debug;

/// Ordered pending jobs of one destination
#[derive(Debug, Default)]
pub struct JobQueue {
    jobs: VecDeque<StreamJob>,
}

impl JobQueue {
    pub fn push(&mut self, job: StreamJob) {
        self.jobs.push_back(job);
    }

    pub fn pop_next(&mut self) -> Option<StreamJob> {
        self.jobs.pop_front()
    }

    pub fn entries(&self) -> Vec<QueueEntry> {
        self.jobs.iter().map(StreamJob::entry).collect()
    }

    pub fn drain(&mut self) -> Vec<StreamJob> {
        self.jobs.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

/// Queue operations scoped by destination.
///
/// Each call takes the destination's lock for the duration of the queue
/// operation only.
#[derive(Clone)]
pub struct QueueManager {
    destinations: Arc<Destinations>,
}

impl QueueManager {
    pub(crate) fn new(destinations: Arc<Destinations>) -> Self {
        Self { destinations }
    }

    /// Append a job to the tail of its destination's queue
    pub async fn enqueue(&self, job: StreamJob) {
        let destination = job.destination;
        let slot = self.destinations.slot(destination).await;
        let mut state = slot.lock().await;
        debug!(
            destination = %destination,
            job_id = %job.id,
            position = state.queue.len() + 1,
            "Job enqueued"
        );
        state.queue.push(job);
    }

    /// Remove and return the head job, or `None` when the queue is empty
    pub async fn dequeue_next(&self, destination: DestinationId) -> Option<StreamJob> {
        let slot = self.destinations.slot(destination).await;
        let mut state = slot.lock().await;
        state.queue.pop_next()
    }

    /// Ordered snapshot of the pending jobs
    pub async fn list(&self, destination: DestinationId) -> Vec<QueueEntry> {
        let slot = self.destinations.slot(destination).await;
        let state = slot.lock().await;
        state.queue.entries()
    }

    /// Empty the queue, handing the removed jobs back to the caller.
    ///
    /// The active encode is not touched.
    pub async fn clear(&self, destination: DestinationId) -> Vec<StreamJob> {
        let slot = self.destinations.slot(destination).await;
        let mut state = slot.lock().await;
        let removed = state.queue.drain();
        if !removed.is_empty() {
            debug!(destination = %destination, removed = removed.len(), "Queue cleared");
        }
        removed
    }

    pub async fn len(&self, destination: DestinationId) -> usize {
        let slot = self.destinations.slot(destination).await;
        let state = slot.lock().await;
        state.queue.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_types::{JobOrigin, MediaSource, Requester, StreamKind};

    fn job(destination: i64, title: &str) -> StreamJob {
        StreamJob::new(
            DestinationId(destination),
            MediaSource::Url(format!("https://example.com/{}", title)),
            StreamKind::Full,
            Requester::new(1, "tester"),
            JobOrigin::DirectUrl,
        )
        .with_title(title)
    }

    fn manager() -> QueueManager {
        QueueManager::new(Arc::new(Destinations::new()))
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let queue = manager();
        queue.enqueue(job(1, "a")).await;
        queue.enqueue(job(1, "b")).await;
        queue.enqueue(job(1, "c")).await;

        let titles: Vec<String> = queue.list(DestinationId(1)).await.into_iter().map(|e| e.title).collect();
        assert_eq!(titles, vec!["a", "b", "c"]);

        assert_eq!(queue.dequeue_next(DestinationId(1)).await.unwrap().title, "a");
        assert_eq!(queue.dequeue_next(DestinationId(1)).await.unwrap().title, "b");
        assert_eq!(queue.dequeue_next(DestinationId(1)).await.unwrap().title, "c");
        assert!(queue.dequeue_next(DestinationId(1)).await.is_none());
    }

    #[tokio::test]
    async fn test_queues_are_scoped_by_destination() {
        let queue = manager();
        queue.enqueue(job(1, "one")).await;
        queue.enqueue(job(2, "two")).await;

        assert_eq!(queue.len(DestinationId(1)).await, 1);
        assert_eq!(queue.dequeue_next(DestinationId(2)).await.unwrap().title, "two");
        assert_eq!(queue.len(DestinationId(1)).await, 1);
    }

    #[tokio::test]
    async fn test_list_does_not_mutate() {
        let queue = manager();
        queue.enqueue(job(1, "a")).await;
        let _ = queue.list(DestinationId(1)).await;
        assert_eq!(queue.len(DestinationId(1)).await, 1);
    }

    #[tokio::test]
    async fn test_clear_returns_removed_jobs() {
        let queue = manager();
        queue.enqueue(job(1, "a")).await;
        queue.enqueue(job(1, "b")).await;

        let removed = queue.clear(DestinationId(1)).await;
        assert_eq!(removed.len(), 2);
        assert!(queue.list(DestinationId(1)).await.is_empty());
        assert!(queue.clear(DestinationId(1)).await.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_enqueue_dequeue_exactly_once() {
        let queue = manager();
        let mut handles = Vec::new();
        for i in 0..50 {
            let queue = queue.clone();
            handles.push(tokio::spawn(async move {
                queue.enqueue(job(7, &format!("job-{}", i))).await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let mut takers = Vec::new();
        for _ in 0..10 {
            let queue = queue.clone();
            takers.push(tokio::spawn(async move {
                let mut taken = Vec::new();
                while let Some(job) = queue.dequeue_next(DestinationId(7)).await {
                    taken.push(job.id);
                }
                taken
            }));
        }

        let mut all = Vec::new();
        for taker in takers {
            all.extend(taker.await.unwrap());
        }
        let total = all.len();
        all.sort();
        all.dedup();
        assert_eq!(total, 50);
        assert_eq!(all.len(), 50);
    }
}
