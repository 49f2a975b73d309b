use crate::clock::Clock;
use crate::error::{ErrorRecord, StoreError, StoreResult};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Receives the structured record of every exhausted call.
pub type ErrorCallback = Arc<dyn Fn(&ErrorRecord) + Send + Sync>;

/// Retry budget and backoff shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles for each later attempt.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Optional ceiling for a single delay.
    #[serde(default)]
    pub max_delay_ms: Option<u64>,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1_000
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: None,
        }
    }
}

impl RetryPolicy {
    /// Shorter 500 ms base used by interactive stores.
    pub fn interactive() -> Self {
        Self {
            base_delay_ms: 500,
            ..Self::default()
        }
    }

    /// Policy that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay awaited after failed attempt number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        let mut delay_ms = self.base_delay_ms.saturating_mul(factor);
        if let Some(max_delay_ms) = self.max_delay_ms {
            delay_ms = delay_ms.min(max_delay_ms);
        }
        Duration::from_millis(delay_ms)
    }
}

/// Retry wrapper bound to one store.
#[derive(Clone)]
pub struct RetryMiddleware {
    store: String,
    policy: RetryPolicy,
    log_errors: bool,
    on_error: Option<ErrorCallback>,
    clock: Arc<dyn Clock>,
}

impl RetryMiddleware {
    pub fn new(store: impl Into<String>, policy: RetryPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            store: store.into(),
            policy,
            log_errors: true,
            on_error: None,
            clock,
        }
    }

    /// Routes exhausted-call records to `callback` in addition to the caller.
    pub fn with_error_callback(mut self, callback: ErrorCallback) -> Self {
        self.on_error = Some(callback);
        self
    }

    pub fn with_error_logging(mut self, enabled: bool) -> Self {
        self.log_errors = enabled;
        self
    }

    pub fn store(&self) -> &str {
        &self.store
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Runs `operation`, retrying transient failures.
    ///
    /// `operation` is invoked once per attempt and must build a fresh future
    /// each time.
    ///
    /// # Errors
    /// - Local errors from any attempt are returned unchanged.
    /// - `StoreError::RetryExhausted` once every attempt failed transiently.
    pub async fn run<T, F, Fut>(&self, action: &str, mut operation: F) -> StoreResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = StoreResult<T>>,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1u32;
        loop {
            match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        info!(
                            "event=store_retry module=middleware status=recovered store={} action={} attempt={}",
                            self.store, action, attempt
                        );
                    }
                    return Ok(value);
                }
                Err(err) if !err.is_retryable() => return Err(err),
                Err(err) => {
                    if attempt >= max_attempts {
                        return Err(self.exhausted(action, attempt, err));
                    }

                    let delay = self.policy.backoff(attempt);
                    warn!(
                        "event=store_retry module=middleware status=retrying store={} action={} attempt={} max_attempts={} backoff_ms={} error={}",
                        self.store,
                        action,
                        attempt,
                        max_attempts,
                        delay.as_millis(),
                        err
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    fn exhausted(&self, action: &str, attempts: u32, last: StoreError) -> StoreError {
        let record = ErrorRecord {
            code: last.code().to_string(),
            message: last.to_string(),
            store: self.store.clone(),
            action: action.to_string(),
            attempt: attempts,
            timestamp: self.clock.now(),
        };

        if self.log_errors {
            error!(
                "event=store_retry module=middleware status=exhausted store={} action={} attempt={} error_code={} error={}",
                record.store, record.action, record.attempt, record.code, record.message
            );
        }
        if let Some(callback) = &self.on_error {
            callback(&record);
        }

        StoreError::RetryExhausted {
            attempts,
            record: Box::new(record),
            last: Box::new(last),
        }
    }
}
