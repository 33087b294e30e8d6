//! Retry, timeout, and abort handling for a single logical task.
//!
//! Each attempt races the work against the caller's abort signal and an
//! optional deadline. Losing branches are dropped, so no timer outlives the
//! attempt. Work already handed to an execution context keeps running there;
//! only the caller's wait ends.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::task::TaskOptions;
use super::PoolError;

/// Wraps attempts of one task with abort, timeout, and immediate retry.
#[derive(Debug, Clone, Default)]
pub struct ExecutionControl {
    timeout: Option<Duration>,
    signal: Option<CancellationToken>,
    max_retries: u32,
}

impl ExecutionControl {
    /// Control with no deadline, no signal, and no retries.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Race every attempt against this deadline.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Stop waiting as soon as `signal` is cancelled.
    #[must_use]
    pub fn with_signal(mut self, signal: CancellationToken) -> Self {
        self.signal = Some(signal);
        self
    }

    /// Re-run failed attempts up to `max_retries` more times.
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Build from task options, filling gaps with pool defaults.
    pub(crate) fn from_options(
        options: &TaskOptions,
        default_timeout: Option<Duration>,
        default_max_retries: u32,
    ) -> Self {
        Self {
            timeout: options.timeout.or(default_timeout),
            signal: options.signal.clone(),
            max_retries: options.max_retries.unwrap_or(default_max_retries),
        }
    }

    /// Whether the signal has already fired.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.signal.as_ref().is_some_and(CancellationToken::is_cancelled)
    }

    /// Run `operation` until it succeeds, fails terminally, or the retry budget is spent.
    ///
    /// `operation` receives the zero-based attempt number. It is never invoked
    /// once the signal has fired.
    ///
    /// # Errors
    ///
    /// `PoolError::Aborted` when the signal fires (never retried),
    /// `PoolError::Timeout` when the last attempt hit its deadline, or the
    /// last attempt's own error.
    pub async fn run<F, Fut, T>(&self, mut operation: F) -> Result<T, PoolError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, PoolError>>,
    {
        let mut attempt = 0;
        loop {
            if self.is_aborted() {
                return Err(PoolError::Aborted);
            }
            match self.attempt(operation(attempt)).await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    debug!(attempt, max_retries = self.max_retries, error = %err, "retrying task");
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Race a single attempt against the signal and the deadline.
    ///
    /// # Errors
    ///
    /// `PoolError::Aborted`, `PoolError::Timeout`, or the attempt's own error.
    pub async fn attempt<Fut, T>(&self, work: Fut) -> Result<T, PoolError>
    where
        Fut: Future<Output = Result<T, PoolError>>,
    {
        if self.is_aborted() {
            return Err(PoolError::Aborted);
        }

        let aborted = async {
            match &self.signal {
                Some(signal) => signal.cancelled().await,
                None => std::future::pending().await,
            }
        };
        let expired = async {
            match self.timeout {
                Some(timeout) => tokio::time::sleep(timeout).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            biased;
            () = aborted => Err(PoolError::Aborted),
            () = expired => Err(PoolError::Timeout(self.timeout_ms())),
            result = work => result,
        }
    }

    fn timeout_ms(&self) -> u64 {
        self.timeout
            .map_or(0, |t| u64::try_from(t.as_millis()).unwrap_or(u64::MAX))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_success_passes_through() {
        let control = ExecutionControl::new();
        let result = control.run(|_| async { Ok::<_, PoolError>(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_pre_aborted_never_invokes() {
        let calls = Arc::new(AtomicU32::new(0));
        let signal = CancellationToken::new();
        signal.cancel();
        let control = ExecutionControl::new().with_signal(signal).with_max_retries(3);

        let counter = Arc::clone(&calls);
        let result = control
            .run(|_| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, PoolError>(()) }
            })
            .await;

        assert_eq!(result, Err(PoolError::Aborted));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_abort_during_attempt() {
        let signal = CancellationToken::new();
        let control = ExecutionControl::new().with_signal(signal.clone());
        let trigger = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            signal.cancel();
        });

        let result = control
            .attempt(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, PoolError>(1)
            })
            .await;
        trigger.await.unwrap();
        assert_eq!(result, Err(PoolError::Aborted));
    }

    #[tokio::test]
    async fn test_timeout_fires() {
        let control = ExecutionControl::new().with_timeout(Duration::from_millis(20));
        let result = control
            .attempt(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, PoolError>(1)
            })
            .await;
        assert_eq!(result, Err(PoolError::Timeout(20)));
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let control = ExecutionControl::new().with_max_retries(3);
        let counter = Arc::clone(&calls);
        let result = control
            .run(|attempt| {
                counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 2 {
                        Err(PoolError::Execution("flaky".into()))
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_budget_exhausted() {
        let calls = Arc::new(AtomicU32::new(0));
        let control = ExecutionControl::new().with_max_retries(2);
        let counter = Arc::clone(&calls);
        let result: Result<(), _> = control
            .run(|_| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err(PoolError::Execution("always".into())) }
            })
            .await;
        assert_eq!(result, Err(PoolError::Execution("always".into())));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_terminal_errors_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let control = ExecutionControl::new().with_max_retries(5);
        let counter = Arc::clone(&calls);
        let result: Result<(), _> = control
            .run(|_| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err(PoolError::QueueFull { limit: 1 }) }
            })
            .await;
        assert_eq!(result, Err(PoolError::QueueFull { limit: 1 }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_defaults_from_options() {
        let options = TaskOptions::new().with_max_retries(4);
        let control = ExecutionControl::from_options(&options, Some(Duration::from_secs(1)), 0);
        assert_eq!(control.max_retries, 4);
        assert_eq!(control.timeout, Some(Duration::from_secs(1)));
    }
}
