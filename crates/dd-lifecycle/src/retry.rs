use std::future::Future;
use std::time::Duration;

use dd_registrar::Envelope;
use serde::Deserialize;

/// Retry for registrar reads.
///
/// Only envelopes failing with `TRANSPORT_FAILURE` are retried. Billed
/// mutations never go through this: their outcome is reconciled with a read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    #[serde(rename = "initial_delay_ms", with = "millis")]
    pub initial_delay: Duration,
    #[serde(rename = "max_delay_ms", with = "millis")]
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self { max_attempts: 1, ..Self::default() }
    }

    /// Delay before attempt `attempt + 1`, doubling from the initial delay.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_delay.saturating_mul(factor).min(self.max_delay)
    }

    pub async fn read<T, F, Fut>(&self, operation: &str, mut call: F) -> Envelope<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Envelope<T>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            let envelope = call().await;
            if envelope.is_success() || !envelope.is_transient() || attempt >= attempts {
                return envelope;
            }
            let delay = self.delay_after(attempt);
            tracing::warn!(operation, attempt, ?delay, error = envelope.message(), "registrar read failed, retrying");
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dd_registrar::error::RegistrarError;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn quick(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        }
    }

    #[test]
    fn backoff_doubles_up_to_the_cap() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(1), Duration::from_millis(500));
        assert_eq!(policy.delay_after(2), Duration::from_millis(1000));
        assert_eq!(policy.delay_after(3), Duration::from_millis(2000));
        assert_eq!(policy.delay_after(10), Duration::from_secs(8));
    }

    #[tokio::test]
    async fn transport_failures_are_retried() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let envelope = quick(3)
            .read("get_domain_info", move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Envelope::<u32>::failure(RegistrarError::Transport("connection reset".into()))
                } else {
                    Envelope::ok("ok", 7)
                }
            })
            .await;
        assert!(envelope.is_success());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn vendor_rejections_are_not_retried() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let envelope = quick(5)
            .read("get_domain_info", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Envelope::<u32>::failure(RegistrarError::vendor(Some("2303".into()), "object does not exist"))
            })
            .await;
        assert!(!envelope.is_success());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let envelope = quick(2)
            .read("check_availability", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Envelope::<u32>::failure(RegistrarError::Transport("timeout".into()))
            })
            .await;
        assert!(envelope.is_transient());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
