//! Priority-ordered fallback across providers.
//!
//! Candidates are tried strictly in chain order, one at a time. Unknown or
//! unavailable names are skipped without counting as attempts. Each attempted
//! candidate gets a full [`RetryPolicy`] run; a quota error or exhausted
//! retries moves on to the next name.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::observer::{Event, SharedObserver};
use crate::provider::{ProviderRegistry, ProviderResponse};
use crate::retry::RetryPolicy;
use crate::util::error_preview;

/// Provider name reported when every candidate failed.
pub const NO_PROVIDER: &str = "none";

/// Outcome of a fallback run.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub response: ProviderResponse,
    /// Names actually called, in order.
    pub attempted: Vec<String>,
}

impl Resolution {
    pub fn is_success(&self) -> bool {
        self.response.has_usable_content()
    }
}

pub struct FallbackResolver {
    registry: Arc<ProviderRegistry>,
    policy: RetryPolicy,
    observer: SharedObserver,
}

impl FallbackResolver {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        policy: RetryPolicy,
        observer: SharedObserver,
    ) -> Self {
        Self {
            registry,
            policy,
            observer,
        }
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub async fn ask_with_fallback(
        &self,
        chain: &[String],
        prompt: &str,
        role: &str,
    ) -> Resolution {
        let start = Instant::now();
        let mut attempted: Vec<String> = Vec::new();
        let mut last_error: Option<String> = None;

        for name in chain {
            let provider = match self.registry.get(name) {
                Some(p) => p,
                None => {
                    self.observer.notify(&Event::CandidateSkipped {
                        role,
                        provider: name,
                        reason: "not configured",
                    });
                    continue;
                }
            };
            if !provider.is_available() {
                self.observer.notify(&Event::CandidateSkipped {
                    role,
                    provider: name,
                    reason: "not available",
                });
                continue;
            }

            self.observer.notify(&Event::CandidateStarted {
                role,
                provider: name,
                is_first: attempted.is_empty(),
            });
            attempted.push(name.clone());

            let response = self
                .policy
                .retry_with_backoff(provider.as_ref(), prompt, self.observer.as_ref())
                .await;

            if response.has_usable_content() {
                self.observer.notify(&Event::CandidateSucceeded {
                    role,
                    provider: name,
                    fell_back: attempted.len() > 1,
                    request: response.duration,
                    total: start.elapsed(),
                    chars: response.content.chars().count(),
                });
                return Resolution {
                    response,
                    attempted,
                };
            }

            let error = match &response.error {
                Some(e) => e.clone(),
                None => format!("Empty response from {}", name),
            };
            let preview = error_preview(Some(&error));
            self.observer.notify(&Event::CandidateFailed {
                role,
                provider: name,
                quota: response.is_quota_error,
                error: &preview,
            });
            last_error = Some(error);
        }

        Resolution {
            response: exhausted_response(role, &attempted, last_error.as_deref(), start.elapsed()),
            attempted,
        }
    }
}

fn exhausted_response(
    role: &str,
    attempted: &[String],
    last_error: Option<&str>,
    duration: Duration,
) -> ProviderResponse {
    let tried = if attempted.is_empty() {
        "none".to_string()
    } else {
        attempted.join(", ")
    };
    let mut message = format!("All providers failed for {}. Attempted: {}", role, tried);
    if let Some(e) = last_error {
        message.push_str(&format!(". Last error: {}", error_preview(Some(e))));
    }
    ProviderResponse::failure(NO_PROVIDER, message, duration, false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::noop;
    use crate::provider::scripted::ScriptedProvider;
    use crate::provider::Provider;

    fn resolver(providers: Vec<Arc<dyn Provider>>) -> FallbackResolver {
        let mut reg = ProviderRegistry::default();
        for p in providers {
            reg.insert(p);
        }
        FallbackResolver::new(
            Arc::new(reg),
            RetryPolicy::new(3, Duration::ZERO),
            noop(),
        )
    }

    fn chain(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_skips_unavailable_and_falls_through_failures() {
        let b = Arc::new(ScriptedProvider::failing("b", "connection reset"));
        let r = resolver(vec![
            Arc::new(ScriptedProvider::unavailable("a")),
            b.clone(),
            Arc::new(ScriptedProvider::ok("c", "answer")),
        ]);
        let res = r.ask_with_fallback(&chain(&["a", "b", "c"]), "q", "Planner").await;
        assert_eq!(res.response.provider_name, "c");
        assert_eq!(res.response.content, "answer");
        assert_eq!(res.attempted, vec!["b", "c"]);
        assert_eq!(b.calls(), 4);
    }

    #[tokio::test]
    async fn test_unavailable_then_ok() {
        let r = resolver(vec![
            Arc::new(ScriptedProvider::unavailable("p1")),
            Arc::new(ScriptedProvider::ok("p2", "ok")),
        ]);
        let res = r.ask_with_fallback(&chain(&["p1", "p2"]), "q", "Coder").await;
        assert_eq!(res.response.provider_name, "p2");
        assert_eq!(res.response.content, "ok");
        assert_eq!(res.response.error, None);
    }

    #[tokio::test]
    async fn test_quota_error_moves_on_without_retry() {
        let a = Arc::new(ScriptedProvider::failing("a", "Rate limit exceeded"));
        let r = resolver(vec![a.clone(), Arc::new(ScriptedProvider::ok("b", "fine"))]);
        let res = r.ask_with_fallback(&chain(&["a", "b"]), "q", "Tester").await;
        assert_eq!(res.response.provider_name, "b");
        assert_eq!(a.calls(), 1);
    }

    #[tokio::test]
    async fn test_empty_success_falls_through() {
        let a = Arc::new(ScriptedProvider::ok("a", "   "));
        let r = resolver(vec![a.clone(), Arc::new(ScriptedProvider::ok("b", "real"))]);
        let res = r.ask_with_fallback(&chain(&["a", "b"]), "q", "Reviewer").await;
        assert_eq!(res.response.content, "real");
        assert_eq!(res.attempted, vec!["a", "b"]);
        assert_eq!(a.calls(), 1);
    }

    #[tokio::test]
    async fn test_unknown_names_are_skipped() {
        let r = resolver(vec![Arc::new(ScriptedProvider::ok("b", "x"))]);
        let res = r.ask_with_fallback(&chain(&["ghost", "b"]), "q", "Planner").await;
        assert_eq!(res.attempted, vec!["b"]);
    }

    #[tokio::test]
    async fn test_all_failed_message() {
        let r = resolver(vec![
            Arc::new(ScriptedProvider::failing("a", "quota")),
            Arc::new(ScriptedProvider::failing("b", "429")),
        ]);
        let res = r.ask_with_fallback(&chain(&["a", "b"]), "q", "Planner").await;
        assert!(!res.is_success());
        assert_eq!(res.response.provider_name, NO_PROVIDER);
        let err = res.response.error.unwrap();
        assert!(err.starts_with("All providers failed for Planner. Attempted: a, b"));
        assert!(err.contains("Last error: 429"));
    }

    #[tokio::test]
    async fn test_nothing_available_reports_none() {
        let r = resolver(vec![Arc::new(ScriptedProvider::unavailable("a"))]);
        let res = r.ask_with_fallback(&chain(&["a"]), "q", "Documenter").await;
        assert!(res.attempted.is_empty());
        assert_eq!(
            res.response.error.as_deref(),
            Some("All providers failed for Documenter. Attempted: none")
        );
    }
}
