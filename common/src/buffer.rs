// Bounded retry buffer for outbound batches that failed delivery
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// One buffered payload with its delivery bookkeeping. The buffer knows
/// nothing about the payload itself.
#[derive(Debug, Clone)]
pub struct BufferedBatch<T> {
    pub payload: T,
    pub attempts: u32,
    pub first_enqueued: Instant,
    pub last_attempt: Instant,
}

#[derive(Debug, Clone)]
pub struct BufferConfig {
    /// Oldest batches are dropped once the buffer would exceed this.
    pub capacity: usize,
    /// Batches older than this (since first enqueue) are discarded on cleanup.
    pub staleness: Duration,
    /// How many batches one retry pass takes off the head.
    pub drain_chunk: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            capacity: 100,
            staleness: Duration::from_secs(3600),
            drain_chunk: 10,
        }
    }
}

/// Ordered, capacity-bounded queue of batches awaiting redelivery.
/// All operations take the single internal lock, so they are linearizable.
#[derive(Debug)]
pub struct BoundedRetryBuffer<T> {
    config: BufferConfig,
    queue: Mutex<VecDeque<BufferedBatch<T>>>,
}

impl<T> BoundedRetryBuffer<T> {
    pub fn new(config: BufferConfig) -> Self {
        Self {
            config,
            queue: Mutex::new(VecDeque::new()),
        }
    }

    pub fn drain_chunk(&self) -> usize {
        self.config.drain_chunk
    }

    /// Append a batch that has just failed its first delivery attempt.
    /// Drops from the head when over capacity.
    pub fn add(&self, payload: T) {
        let now = Instant::now();
        let mut queue = self.queue.lock();
        queue.push_back(BufferedBatch {
            payload,
            attempts: 1,
            first_enqueued: now,
            last_attempt: now,
        });
        while queue.len() > self.config.capacity {
            queue.pop_front();
            warn!(capacity = self.config.capacity, "retry buffer full, dropped oldest batch");
        }
    }

    /// Remove and return up to `n` oldest batches. Ownership passes to the
    /// caller until a `requeue`.
    pub fn drain_n(&self, n: usize) -> Vec<BufferedBatch<T>> {
        let mut queue = self.queue.lock();
        let take = n.min(queue.len());
        queue.drain(..take).collect()
    }

    /// Put failed batches back at the head in their original order, bumping
    /// attempt counts, so older observations keep delivery priority.
    pub fn requeue(&self, records: Vec<BufferedBatch<T>>) {
        let now = Instant::now();
        let mut queue = self.queue.lock();
        for mut record in records.into_iter().rev() {
            record.attempts += 1;
            record.last_attempt = now;
            queue.push_front(record);
        }
        while queue.len() > self.config.capacity {
            queue.pop_back();
            warn!("retry buffer full on requeue, dropped newest batch");
        }
    }

    /// Discard every batch older than the staleness threshold. Returns the
    /// number removed.
    pub fn cleanup_stale(&self) -> usize {
        let staleness = self.config.staleness;
        let mut queue = self.queue.lock();
        let before = queue.len();
        queue.retain(|record| record.first_enqueued.elapsed() < staleness);
        let removed = before - queue.len();
        if removed > 0 {
            debug!(removed, "dropped stale batches from retry buffer");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }
}
