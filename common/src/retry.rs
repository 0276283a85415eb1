// Retry logic with exponential backoff, cancellation-aware
use crate::error::{AgentError, Result};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// 0 means retry until cancelled.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    /// Add up to half the current delay as jitter so a fleet of agents
    /// does not reconnect in lockstep.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: false,
        }
    }
}

impl RetryPolicy {
    /// Run `f` until it succeeds, attempts run out, or the token fires.
    /// The delay doubles (by `multiplier`) per attempt, capped at `max_delay`.
    pub async fn execute<F, Fut, T>(&self, cancel: &CancellationToken, mut f: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut attempt: u32 = 0;
        let mut delay = self.initial_delay;

        loop {
            if cancel.is_cancelled() {
                return Err(AgentError::Cancelled);
            }
            attempt += 1;

            match f().await {
                Ok(result) => {
                    if attempt > 1 {
                        info!("retry succeeded after {} attempts", attempt);
                    }
                    return Ok(result);
                }
                Err(e) => {
                    if self.max_attempts > 0 && attempt >= self.max_attempts {
                        warn!("max retry attempts ({}) reached: {}", self.max_attempts, e);
                        return Err(e);
                    }

                    warn!(
                        "attempt {}/{} failed: {}. retrying in {:?}",
                        attempt,
                        if self.max_attempts == 0 {
                            "∞".to_string()
                        } else {
                            self.max_attempts.to_string()
                        },
                        e,
                        delay
                    );

                    let sleep_for = if self.jitter {
                        let jitter_ms = rand::Rng::gen_range(
                            &mut rand::thread_rng(),
                            0..=delay.as_millis() as u64 / 2,
                        );
                        delay + Duration::from_millis(jitter_ms)
                    } else {
                        delay
                    };
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(AgentError::Cancelled),
                        _ = tokio::time::sleep(sleep_for) => {}
                    }

                    if self.multiplier > 1.0 {
                        let next_ms = (delay.as_millis() as f64 * self.multiplier) as u64;
                        delay = Duration::from_millis(next_ms.min(self.max_delay.as_millis() as u64));
                    }
                }
            }
        }
    }
}

/// Sleep that returns `Cancelled` instead of completing when the token fires.
pub async fn sleep_cancellable(cancel: &CancellationToken, duration: Duration) -> Result<()> {
    tokio::select! {
        _ = cancel.cancelled() => Err(AgentError::Cancelled),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn retries_until_success_with_backoff() {
        let policy = RetryPolicy {
            max_attempts: 5,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(400),
            multiplier: 2.0,
            jitter: false,
        };
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();
        let result: Result<u32> = policy
            .execute(&cancel, || {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if n < 3 {
                        Err(AgentError::Transport {
                            equipment: "olt-1".into(),
                            detail: "refused".into(),
                        })
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_attempts_and_returns_last_error() {
        let policy = RetryPolicy {
            max_attempts: 2,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(10),
            multiplier: 2.0,
            jitter: false,
        };
        let cancel = CancellationToken::new();
        let result: Result<()> = policy
            .execute(&cancel, || async {
                Err(AgentError::Transport {
                    equipment: "olt-1".into(),
                    detail: "down".into(),
                })
            })
            .await;
        assert!(matches!(result, Err(AgentError::Transport { .. })));
    }

    #[tokio::test]
    async fn cancellation_stops_the_loop() {
        let policy = RetryPolicy {
            max_attempts: 0,
            initial_delay: Duration::from_secs(60),
            max_delay: Duration::from_secs(60),
            multiplier: 1.0,
            jitter: false,
        };
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result: Result<()> = policy
            .execute(&cancel, || async {
                Err(AgentError::Transport {
                    equipment: "olt-1".into(),
                    detail: "down".into(),
                })
            })
            .await;
        assert!(matches!(result, Err(AgentError::Cancelled)));
    }
}
