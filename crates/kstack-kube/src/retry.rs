//! Fixed-delay trials for flaky cluster operations
//!
//! Applying a chart right after its CRDs or webhooks were installed often fails until the API
//! server catches up, so the apply step is attempted a few times with a fixed pause.

use std::future::Future;
use std::time::Duration;
use tracing::{error, warn};

/// How many times to try and how long to wait in between
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrialConfig {
    /// Total attempts, including the first one (at least 1)
    pub tries: u32,
    pub delay: Duration,
}

impl Default for TrialConfig {
    fn default() -> Self {
        Self {
            tries: 3,
            delay: Duration::from_millis(2000),
        }
    }
}

impl TrialConfig {
    pub fn new(tries: u32, delay: Duration) -> Self {
        Self { tries, delay }
    }
}

/// Run `operation` until it succeeds or the trials are exhausted
///
/// The operation receives the 1-based attempt number. The last error is returned.
pub async fn run_with_trials<F, Fut, T, E>(
    config: &TrialConfig,
    operation_name: &str,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let tries = config.tries.max(1);
    let mut attempt = 1;

    loop {
        match operation(attempt).await {
            Ok(result) => return Ok(result),
            Err(e) if attempt >= tries => {
                error!(
                    operation = %operation_name,
                    attempt,
                    error = %e,
                    "Operation failed on last trial"
                );
                return Err(e);
            }
            Err(e) => {
                warn!(
                    operation = %operation_name,
                    attempt,
                    error = %e,
                    delay_ms = config.delay.as_millis() as u64,
                    "Operation failed, retrying"
                );
                tokio::time::sleep(config.delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    #[tokio::test]
    async fn test_succeeds_immediately() {
        let result: Result<i32, &str> =
            run_with_trials(&TrialConfig::default(), "op", |_| async { Ok(42) }).await;
        assert_eq!(result, Ok(42));
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn test_retries_after_fixed_delay() {
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();
        let start = Instant::now();

        let result: Result<u32, &str> = run_with_trials(&TrialConfig::default(), "apply", |attempt| {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                if attempt == 1 { Err("webhook not ready") } else { Ok(attempt) }
            }
        })
        .await;

        assert_eq!(result, Ok(2));
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert!(start.elapsed() >= Duration::from_millis(2000));
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn test_exhausts_trials_with_last_error() {
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();

        let result: Result<(), String> = run_with_trials(&TrialConfig::default(), "apply", |attempt| {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err(format!("failure {}", attempt))
            }
        })
        .await;

        assert_eq!(result, Err("failure 3".to_string()));
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_zero_tries_still_runs_once() {
        let config = TrialConfig::new(0, Duration::ZERO);
        let result: Result<(), &str> = run_with_trials(&config, "op", |_| async { Err("no") }).await;
        assert_eq!(result, Err("no"));
    }
}
