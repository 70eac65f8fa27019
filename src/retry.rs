//! Exponential backoff around a single provider.

use std::time::Duration;

use crate::observer::{Event, Observer};
use crate::provider::{Provider, ProviderResponse};
use crate::util::error_preview;

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(2);

/// Retry parameters. One initial call is followed by up to `max_retries`
/// retries; `0` disables retrying.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// Sleep before retry number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1u32 << exp)
    }

    /// Call `provider` until it succeeds, reports a quota error, returns a
    /// non-retryable error, or the attempt budget runs out. Returns the last
    /// response.
    pub async fn retry_with_backoff(
        &self,
        provider: &dyn Provider,
        prompt: &str,
        observer: &dyn Observer,
    ) -> ProviderResponse {
        let mut response = provider.ask(prompt).await;
        if response.is_success() || response.is_quota_error {
            return response;
        }

        let mut attempt = 0;
        while attempt < self.max_retries && response.is_retryable {
            attempt += 1;
            let delay = self.delay_for(attempt);
            let preview = error_preview(response.error.as_deref());
            observer.notify(&Event::RetryScheduled {
                provider: provider.name(),
                attempt,
                max_retries: self.max_retries,
                delay,
                error: &preview,
            });
            tokio::time::sleep(delay).await;

            response = provider.ask(prompt).await;
            if response.is_success() {
                observer.notify(&Event::RetrySucceeded {
                    provider: provider.name(),
                    attempt: attempt + 1,
                });
                break;
            }
            if response.is_quota_error {
                break;
            }
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::NoopObserver;
    use crate::observer::recording::RecordingObserver;
    use crate::provider::scripted::{Reply, ScriptedProvider};

    fn fast() -> RetryPolicy {
        RetryPolicy::new(3, Duration::ZERO)
    }

    #[test]
    fn test_delay_doubles() {
        let p = RetryPolicy::default();
        assert_eq!(p.delay_for(1), Duration::from_secs(2));
        assert_eq!(p.delay_for(2), Duration::from_secs(4));
        assert_eq!(p.delay_for(3), Duration::from_secs(8));
    }

    #[tokio::test]
    async fn test_success_first_call() {
        let p = ScriptedProvider::ok("a", "done");
        let r = fast().retry_with_backoff(&p, "hi", &NoopObserver).await;
        assert_eq!(r.content, "done");
        assert_eq!(p.calls(), 1);
    }

    #[tokio::test]
    async fn test_quota_error_not_retried() {
        let p = ScriptedProvider::failing("a", "quota exceeded");
        let r = fast().retry_with_backoff(&p, "hi", &NoopObserver).await;
        assert!(r.is_quota_error);
        assert_eq!(p.calls(), 1);
    }

    #[tokio::test]
    async fn test_retryable_error_bounded_by_max_retries() {
        let p = ScriptedProvider::failing("a", "connection reset");
        let r = fast().retry_with_backoff(&p, "hi", &NoopObserver).await;
        assert!(r.is_retryable);
        assert_eq!(p.calls(), 4);
    }

    #[tokio::test]
    async fn test_stops_at_first_success() {
        let p = ScriptedProvider::new(
            "a",
            vec![Reply::Fail("boom".into()), Reply::Ok("recovered".into())],
        );
        let obs = RecordingObserver::default();
        let r = fast().retry_with_backoff(&p, "hi", &obs).await;
        assert_eq!(r.content, "recovered");
        assert_eq!(p.calls(), 2);
        assert_eq!(obs.count_matching("RetryScheduled"), 1);
        assert_eq!(obs.count_matching("RetrySucceeded"), 1);
    }

    #[tokio::test]
    async fn test_quota_during_retry_stops() {
        let p = ScriptedProvider::new(
            "a",
            vec![Reply::Fail("boom".into()), Reply::Fail("429".into())],
        );
        let r = RetryPolicy::new(5, Duration::ZERO)
            .retry_with_backoff(&p, "hi", &NoopObserver)
            .await;
        assert!(r.is_quota_error);
        assert_eq!(p.calls(), 2);
    }

    #[tokio::test]
    async fn test_zero_retries_makes_one_call() {
        let p = ScriptedProvider::failing("a", "boom");
        RetryPolicy::new(0, Duration::ZERO)
            .retry_with_backoff(&p, "hi", &NoopObserver)
            .await;
        assert_eq!(p.calls(), 1);
    }

    #[tokio::test]
    async fn test_single_retry_budget() {
        let p = ScriptedProvider::failing("a", "boom");
        let obs = RecordingObserver::default();
        RetryPolicy::new(1, Duration::ZERO)
            .retry_with_backoff(&p, "hi", &obs)
            .await;
        assert_eq!(p.calls(), 2);
        assert_eq!(obs.count_matching("RetryScheduled"), 1);
    }
}
