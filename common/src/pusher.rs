// Resilient metrics delivery: circuit breaker + bounded retry buffer +
// exponential backoff around a downstream pusher
use crate::buffer::{BoundedRetryBuffer, BufferConfig};
use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::error::{AgentError, Result};
use crate::retry::RetryPolicy;
use crate::types::MetricsBatch;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Downstream delivery collaborator. Any error counts as a breaker failure;
/// the pusher does not let callers classify.
#[async_trait]
pub trait MetricsPusher: Send + Sync + 'static {
    async fn push(&self, cancel: &CancellationToken, batch: &MetricsBatch) -> Result<PushResponse>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushResponse {
    pub success: bool,
    pub count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl PushResponse {
    pub fn delivered(count: usize) -> Self {
        Self {
            success: true,
            count,
            message: None,
        }
    }

    /// Non-error signal that the batch was parked in the retry buffer.
    pub fn buffered() -> Self {
        Self {
            success: true,
            count: 0,
            message: Some("buffered".to_string()),
        }
    }

    pub fn is_buffered(&self) -> bool {
        self.message.as_deref() == Some("buffered")
    }
}

#[derive(Debug, Clone)]
pub struct PusherConfig {
    pub backoff: RetryPolicy,
    pub breaker: CircuitBreakerConfig,
    pub buffer: BufferConfig,
    /// Cadence of the background redelivery pass.
    pub retry_interval: Duration,
    /// Cadence of stale-batch eviction. Independent of `retry_interval`.
    pub cleanup_interval: Duration,
    /// Per-record delivery attempts before a buffered batch is dropped.
    /// 0 keeps retrying until the batch goes stale.
    pub max_record_attempts: u32,
}

impl Default for PusherConfig {
    fn default() -> Self {
        Self {
            backoff: RetryPolicy {
                max_attempts: 3,
                initial_delay: Duration::from_millis(500),
                max_delay: Duration::from_secs(10),
                multiplier: 2.0,
                jitter: false,
            },
            breaker: CircuitBreakerConfig::default(),
            buffer: BufferConfig::default(),
            retry_interval: Duration::from_secs(30),
            cleanup_interval: Duration::from_secs(300),
            max_record_attempts: 0,
        }
    }
}

/// Read-only delivery statistics.
#[derive(Debug, Clone, Serialize)]
pub struct PusherStats {
    pub total_pushed: u64,
    pub total_failed: u64,
    pub total_buffered: u64,
    pub total_retried: u64,
    pub buffer_size: usize,
    pub breaker_state: String,
}

/// Wraps a downstream pusher so transient control-plane outages never drop
/// observations: rejected or failed batches go to the bounded buffer and a
/// background task redelivers them oldest-first.
pub struct ResilientPusher<P: MetricsPusher> {
    downstream: Arc<P>,
    breaker: Arc<CircuitBreaker>,
    buffer: Arc<BoundedRetryBuffer<MetricsBatch>>,
    config: PusherConfig,
    total_pushed: AtomicU64,
    total_failed: AtomicU64,
    total_buffered: AtomicU64,
    total_retried: AtomicU64,
    cancel: CancellationToken,
    loop_handle: Mutex<Option<JoinHandle<()>>>,
}

impl<P: MetricsPusher> ResilientPusher<P> {
    pub fn new(downstream: P, config: PusherConfig, cancel: CancellationToken) -> Arc<Self> {
        // Child token: process-wide cancellation propagates in, but stop()
        // only tears down this pusher.
        let cancel = cancel.child_token();
        Arc::new(Self {
            downstream: Arc::new(downstream),
            breaker: Arc::new(CircuitBreaker::new(config.breaker.clone())),
            buffer: Arc::new(BoundedRetryBuffer::new(config.buffer.clone())),
            config,
            total_pushed: AtomicU64::new(0),
            total_failed: AtomicU64::new(0),
            total_buffered: AtomicU64::new(0),
            total_retried: AtomicU64::new(0),
            cancel,
            loop_handle: Mutex::new(None),
        })
    }

    /// Deliver one batch, or park it when the breaker rejects or delivery
    /// keeps failing. Only a downstream error after all backoff attempts is
    /// surfaced to the caller.
    pub async fn push(&self, batch: MetricsBatch) -> Result<PushResponse> {
        if batch.is_empty() {
            return Ok(PushResponse::delivered(0));
        }

        if !self.breaker.admit() {
            debug!("breaker rejected push, buffering batch of {}", batch.len());
            self.enqueue(batch);
            return Ok(PushResponse::buffered());
        }

        let downstream = Arc::clone(&self.downstream);
        let result = self
            .config
            .backoff
            .execute(&self.cancel, || {
                let downstream = Arc::clone(&downstream);
                let batch = &batch;
                async move { downstream.push(&self.cancel, batch).await }
            })
            .await;

        match result {
            Ok(response) => {
                self.breaker.record_success();
                self.total_pushed.fetch_add(1, Ordering::Relaxed);
                Ok(response)
            }
            Err(AgentError::Cancelled) => {
                // Shutdown is not a downstream verdict; park the batch
                // without charging the breaker.
                self.enqueue(batch);
                Err(AgentError::Cancelled)
            }
            Err(e) => {
                self.breaker.record_failure();
                self.total_failed.fetch_add(1, Ordering::Relaxed);
                warn!("push failed after retries, buffering: {}", e);
                self.enqueue(batch);
                Err(e)
            }
        }
    }

    fn enqueue(&self, batch: MetricsBatch) {
        self.buffer.add(batch);
        self.total_buffered.fetch_add(1, Ordering::Relaxed);
    }

    /// Spawn the background redelivery/cleanup task. Idempotent.
    pub fn start(self: &Arc<Self>) {
        let mut guard = self.loop_handle.lock();
        if guard.is_some() {
            return;
        }
        let pusher = Arc::clone(self);
        *guard = Some(tokio::spawn(async move {
            pusher.run_loop().await;
        }));
    }

    async fn run_loop(&self) {
        let mut retry_tick = tokio::time::interval(self.config.retry_interval);
        let mut cleanup_tick = tokio::time::interval(self.config.cleanup_interval);
        retry_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        cleanup_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // Both tickers fire once at startup; swallow that so the first real
        // pass happens one interval in.
        retry_tick.tick().await;
        cleanup_tick.tick().await;

        info!(
            retry_interval = ?self.config.retry_interval,
            cleanup_interval = ?self.config.cleanup_interval,
            "resilient pusher loop started"
        );

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("resilient pusher loop stopping");
                    break;
                }
                _ = retry_tick.tick() => {
                    self.retry_pass().await;
                }
                _ = cleanup_tick.tick() => {
                    let removed = self.buffer.cleanup_stale();
                    if removed > 0 {
                        warn!(removed, "evicted stale batches before delivery");
                    }
                }
            }
        }
    }

    /// One redelivery pass: drain a chunk oldest-first and attempt each
    /// batch once. The breaker is consulted per batch so a HalfOpen failure
    /// stops the pass immediately.
    async fn retry_pass(&self) {
        if !self.breaker.admit() {
            return;
        }
        let mut records = self.buffer.drain_n(self.buffer.drain_chunk());
        if records.is_empty() {
            return;
        }
        debug!("retrying {} buffered batches", records.len());

        while !records.is_empty() {
            if !self.breaker.admit() {
                self.buffer.requeue(records);
                return;
            }
            let record = records.remove(0);
            match self.downstream.push(&self.cancel, &record.payload).await {
                Ok(_) => {
                    self.breaker.record_success();
                    self.total_retried.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    self.breaker.record_failure();
                    warn!(attempts = record.attempts, "buffered batch redelivery failed: {}", e);
                    let max = self.config.max_record_attempts;
                    let mut back = Vec::with_capacity(records.len() + 1);
                    if max == 0 || record.attempts < max {
                        back.push(record);
                    } else {
                        warn!(attempts = record.attempts, "dropping batch after max attempts");
                    }
                    back.extend(records);
                    self.buffer.requeue(back);
                    return;
                }
            }
        }
    }

    /// Cancel the background loop and wait for it to exit.
    pub async fn stop(&self) {
        self.cancel.cancel();
        let handle = self.loop_handle.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    pub fn stats(&self) -> PusherStats {
        PusherStats {
            total_pushed: self.total_pushed.load(Ordering::Relaxed),
            total_failed: self.total_failed.load(Ordering::Relaxed),
            total_buffered: self.total_buffered.load(Ordering::Relaxed),
            total_retried: self.total_retried.load(Ordering::Relaxed),
            buffer_size: self.buffer.len(),
            breaker_state: self.breaker.state().as_str().to_string(),
        }
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }
}
