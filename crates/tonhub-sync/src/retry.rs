//! Retry policy for remote fetches
//!
//! Exponential backoff with optional jitter. The default policy never gives
//! up, matching a background balance poller; bounded policies exist so
//! tools and tests can assert termination.

use crate::cancel::CancelToken;
use crate::{Error, Result};
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tonhub_params::RetryParams;
use tracing::{debug, warn};

/// Retry policy built from [`RetryParams`]
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    params: RetryParams,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(RetryParams::default())
    }
}

impl RetryPolicy {
    /// Create policy
    pub fn new(params: RetryParams) -> Self {
        Self { params }
    }

    /// Policy parameters
    pub fn params(&self) -> &RetryParams {
        &self.params
    }

    /// Un-jittered delay before retry number `attempt` (1-based)
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let millis =
            self.params.initial_backoff.as_millis() as f64 * self.params.multiplier.powi(exponent);
        let capped = millis.min(self.params.max_backoff.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.backoff_for(attempt);
        if !self.params.jitter || base.is_zero() {
            return base;
        }
        let extra = rand::thread_rng().gen_range(0.0..=0.25);
        (base + base.mul_f64(extra)).min(self.params.max_backoff.max(base))
    }

    /// Run `op` until it succeeds, the policy gives up, or `cancel` fires
    pub async fn run<T, F, Fut>(&self, name: &str, cancel: &CancelToken, op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.run_with(name, cancel, op, |_, _, _| {}).await
    }

    /// Like [`RetryPolicy::run`], calling `on_retry(attempt, delay, error)`
    /// before each sleep
    pub async fn run_with<T, F, Fut, R>(
        &self,
        name: &str,
        cancel: &CancelToken,
        mut op: F,
        mut on_retry: R,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
        R: FnMut(u32, Duration, &Error),
    {
        let started = Instant::now();
        let mut attempt = 0u32;

        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            attempt += 1;

            let err = match op().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!("{} succeeded after {} attempts", name, attempt);
                    }
                    return Ok(value);
                }
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(e) => e,
            };

            let out_of_attempts = self.params.max_attempts.is_some_and(|max| attempt >= max);
            let out_of_time = self
                .params
                .max_elapsed
                .is_some_and(|max| started.elapsed() >= max);
            if out_of_attempts || out_of_time {
                warn!(
                    event = "retries_exhausted",
                    operation = %name,
                    attempts = attempt,
                    error = %err,
                    "Giving up"
                );
                return Err(Error::RetriesExhausted {
                    operation: name.to_string(),
                    attempts: attempt,
                    last_error: err.to_string(),
                });
            }

            let delay = self.delay_for(attempt);
            warn!(
                "{} attempt {} failed, retrying in {:?}: {}",
                name, attempt, delay, err
            );
            on_retry(attempt, delay, &err);

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => return Err(Error::Cancelled),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast(max_attempts: Option<u32>) -> RetryPolicy {
        RetryPolicy::new(RetryParams {
            max_attempts,
            max_elapsed: None,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(1),
            multiplier: 2.0,
            jitter: false,
        })
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let policy = fast(None);
        assert_eq!(policy.backoff_for(1), Duration::from_millis(100));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(200));
        assert_eq!(policy.backoff_for(4), Duration::from_millis(800));
        assert_eq!(policy.backoff_for(5), Duration::from_secs(1));
        assert_eq!(policy.backoff_for(1000), Duration::from_secs(1));
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let policy = RetryPolicy::new(RetryParams {
            jitter: true,
            ..fast(None).params.clone()
        });
        for _ in 0..50 {
            let d = policy.delay_for(1);
            assert!(d >= Duration::from_millis(100) && d <= Duration::from_millis(125));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let cancel = CancelToken::new();
        let mut retries = Vec::new();

        let value = fast(None)
            .run_with(
                "flaky",
                &cancel,
                || {
                    let calls = calls.clone();
                    async move {
                        if calls.fetch_add(1, Ordering::SeqCst) < 3 {
                            Err(Error::Network("timeout".into()))
                        } else {
                            Ok(7)
                        }
                    }
                },
                |attempt, delay, _| retries.push((attempt, delay)),
            )
            .await
            .unwrap();

        assert_eq!(value, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(
            retries,
            vec![
                (1, Duration::from_millis(100)),
                (2, Duration::from_millis(200)),
                (3, Duration::from_millis(400)),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_policy_terminates() {
        let calls = Arc::new(AtomicU32::new(0));
        let result: Result<()> = fast(Some(3))
            .run("always_down", &CancelToken::new(), || {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(Error::Api("down".into()))
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match result {
            Err(Error::RetriesExhausted {
                attempts,
                last_error,
                ..
            }) => {
                assert_eq!(attempts, 3);
                assert!(last_error.contains("down"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_elapsed_terminates() {
        let policy = RetryPolicy::new(RetryParams {
            max_elapsed: Some(Duration::from_secs(2)),
            ..fast(None).params.clone()
        });
        let result: Result<()> = policy
            .run("always_down", &CancelToken::new(), || async {
                Err(Error::Network("down".into()))
            })
            .await;
        assert!(matches!(result, Err(Error::RetriesExhausted { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_backoff() {
        let cancel = CancelToken::new();
        let policy = RetryPolicy::new(RetryParams {
            initial_backoff: Duration::from_secs(3600),
            max_backoff: Duration::from_secs(3600),
            ..fast(None).params.clone()
        });

        let task = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                policy
                    .run("slow", &cancel, || async { Err::<(), _>(Error::Network("down".into())) })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_secs(1)).await;
        cancel.cancel();

        assert!(matches!(task.await.unwrap(), Err(Error::Cancelled)));
    }
}
