//! Bounded polling with exponential backoff.
//!
//! Long-running platform work (project upload, autopilot, settings
//! updates) is observed by polling. [`poll_until`] keeps calling a check
//! with increasing delays until it yields a value, the timeout elapses,
//! or the [`CancellationToken`] is triggered.

use std::future::Future;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

/// Tunable parameters for a polling loop.
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Delay after the first unsuccessful check.
    pub initial_delay: Duration,
    /// Upper bound on the delay between checks.
    pub max_delay: Duration,
    /// Factor by which the delay grows after each check.
    pub multiplier: f64,
    /// Give up once this much time has passed. `None` polls forever.
    pub timeout: Option<Duration>,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            timeout: Some(Duration::from_secs(600)),
        }
    }
}

impl PollConfig {
    /// Same backoff, different timeout.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            ..self.clone()
        }
    }
}

/// Why a polling loop stopped without a value.
#[derive(Debug, thiserror::Error)]
pub enum PollError<E> {
    #[error("gave up after {waited:?}")]
    TimedOut { waited: Duration },

    #[error("cancelled")]
    Cancelled,

    #[error(transparent)]
    Failed(E),
}

/// Calculate the next backoff delay from the current delay and config.
///
/// The result is clamped to [`PollConfig::max_delay`].
pub fn next_delay(current: Duration, config: &PollConfig) -> Duration {
    let next_ms = (current.as_millis() as f64 * config.multiplier) as u64;
    Duration::from_millis(next_ms).min(config.max_delay)
}

/// Call `check` until it returns `Ok(Some(value))`.
///
/// `Ok(None)` means "not yet". An `Err` from `check` stops the loop
/// immediately. The check always runs at least once, even with a zero
/// timeout, unless `cancel` is already triggered.
pub async fn poll_until<T, E, F, Fut>(
    what: &str,
    config: &PollConfig,
    cancel: &CancellationToken,
    mut check: F,
) -> Result<T, PollError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, E>>,
{
    let started = Instant::now();
    let mut delay = config.initial_delay;
    let mut attempt = 0u32;

    loop {
        if cancel.is_cancelled() {
            return Err(PollError::Cancelled);
        }
        attempt += 1;

        tokio::select! {
            _ = cancel.cancelled() => return Err(PollError::Cancelled),
            result = check() => match result {
                Ok(Some(value)) => return Ok(value),
                Ok(None) => {}
                Err(e) => return Err(PollError::Failed(e)),
            }
        }

        let waited = started.elapsed();
        let sleep_for = match config.timeout {
            Some(timeout) if waited >= timeout => {
                tracing::warn!(what, attempt, waited_secs = waited.as_secs(), "Polling timed out");
                return Err(PollError::TimedOut { waited });
            }
            Some(timeout) => delay.min(timeout - waited),
            None => delay,
        };

        tracing::debug!(what, attempt, delay_ms = sleep_for.as_millis() as u64, "Not ready yet");

        tokio::select! {
            _ = cancel.cancelled() => return Err(PollError::Cancelled),
            _ = tokio::time::sleep(sleep_for) => {}
        }

        delay = next_delay(delay, config);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(timeout: Option<Duration>) -> PollConfig {
        PollConfig {
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            multiplier: 2.0,
            timeout,
        }
    }

    #[test]
    fn full_backoff_sequence() {
        let config = PollConfig::default();
        let mut delay = config.initial_delay;
        for expected_secs in [1, 2, 4, 8, 16, 30, 30] {
            assert_eq!(delay.as_secs(), expected_secs);
            delay = next_delay(delay, &config);
        }
    }

    #[test]
    fn custom_multiplier_clamps() {
        let config = PollConfig {
            multiplier: 3.0,
            max_delay: Duration::from_secs(10),
            ..Default::default()
        };
        assert_eq!(next_delay(Duration::from_secs(2), &config), Duration::from_secs(6));
        assert_eq!(next_delay(Duration::from_secs(6), &config), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn returns_value_once_ready() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, PollError<()>> =
            poll_until("test", &fast(Some(Duration::from_secs(5))), &CancellationToken::new(), || {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move { Ok((n == 3).then_some(n)) }
            })
            .await;
        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn times_out_when_never_ready() {
        let result: Result<(), PollError<()>> = poll_until(
            "test",
            &fast(Some(Duration::from_millis(20))),
            &CancellationToken::new(),
            || async { Ok(None) },
        )
        .await;
        assert_matches!(result, Err(PollError::TimedOut { waited }) if waited >= Duration::from_millis(20));
    }

    #[tokio::test]
    async fn zero_timeout_still_checks_once() {
        let result: Result<&str, PollError<()>> = poll_until(
            "test",
            &fast(Some(Duration::ZERO)),
            &CancellationToken::new(),
            || async { Ok(Some("done")) },
        )
        .await;
        assert_eq!(result.unwrap(), "done");
    }

    #[tokio::test]
    async fn check_error_stops_loop() {
        let result: Result<(), PollError<&str>> = poll_until(
            "test",
            &fast(None),
            &CancellationToken::new(),
            || async { Err("boom") },
        )
        .await;
        assert_matches!(result, Err(PollError::Failed("boom")));
    }

    #[tokio::test]
    async fn cancellation_token_stops_polling() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let calls = AtomicU32::new(0);
        let result: Result<(), PollError<()>> = poll_until("test", &fast(None), &cancel, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(None) }
        })
        .await;
        assert_matches!(result, Err(PollError::Cancelled));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cancel_during_wait() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });

        let config = PollConfig {
            initial_delay: Duration::from_secs(60),
            max_delay: Duration::from_secs(60),
            multiplier: 1.0,
            timeout: None,
        };
        let result: Result<(), PollError<()>> =
            poll_until("test", &config, &cancel, || async { Ok(None) }).await;
        assert_matches!(result, Err(PollError::Cancelled));
    }
}
