//! Provider capability contract.
//!
//! A provider wraps one external AI tool. It has a unique name, an
//! availability check, and an `ask` that always returns a
//! [`ProviderResponse`]. Failures are data, never `Err`.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `classify` | Quota/retryable classification of error text |
//! | `cli` | `CliProvider`, the subprocess-backed implementation |
//! | `registry` | Name-keyed provider ownership and duplicate naming |

pub mod classify;
pub mod cli;
pub mod registry;

#[cfg(test)]
pub(crate) mod scripted;

pub use classify::{Classification, classify};
pub use cli::{CliProvider, ProviderKind};
pub use registry::{DuplicateNaming, ProviderRegistry};

use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;

/// Default per-call timeout.
pub const DEFAULT_TIMEOUT_SECS: u64 = 900;

/// Prompt length limit for providers without a tighter bound.
pub const DEFAULT_MAX_PROMPT_CHARS: usize = crate::validation::DEFAULT_MAX_PROMPT_CHARS;

/// Gemini's CLI truncates long argument prompts; keep requests below this.
pub const GEMINI_MAX_PROMPT_CHARS: usize = 4_000;

/// Result of a single provider call.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderResponse {
    pub provider_name: String,
    pub content: String,
    pub error: Option<String>,
    pub duration: Duration,
    pub is_quota_error: bool,
    pub is_retryable: bool,
}

impl ProviderResponse {
    /// A successful response.
    pub fn ok(
        provider_name: impl Into<String>,
        content: impl Into<String>,
        duration: Duration,
    ) -> Self {
        Self {
            provider_name: provider_name.into(),
            content: content.into(),
            error: None,
            duration,
            is_quota_error: false,
            is_retryable: false,
        }
    }

    /// A failed response whose flags come from [`classify`].
    pub fn classified_failure(
        provider_name: impl Into<String>,
        error: impl Into<String>,
        duration: Duration,
    ) -> Self {
        let error = error.into();
        let Classification {
            is_quota,
            is_retryable,
        } = classify(&error);
        Self {
            provider_name: provider_name.into(),
            content: String::new(),
            error: Some(error),
            duration,
            is_quota_error: is_quota,
            is_retryable,
        }
    }

    /// A failed response with explicit flags.
    pub fn failure(
        provider_name: impl Into<String>,
        error: impl Into<String>,
        duration: Duration,
        is_retryable: bool,
    ) -> Self {
        Self {
            provider_name: provider_name.into(),
            content: String::new(),
            error: Some(error.into()),
            duration,
            is_quota_error: false,
            is_retryable,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// No error and non-blank content.
    pub fn has_usable_content(&self) -> bool {
        self.error.is_none() && !self.content.trim().is_empty()
    }
}

/// Static configuration of one provider instance.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderSettings {
    pub binary: PathBuf,
    pub model: Option<String>,
    pub timeout: Duration,
    pub max_prompt_chars: usize,
}

impl ProviderSettings {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            model: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_prompt_chars: DEFAULT_MAX_PROMPT_CHARS,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_prompt_chars(mut self, max: usize) -> Self {
        self.max_prompt_chars = max;
        self
    }
}

/// An external AI responder.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Unique registry key.
    fn name(&self) -> &str;

    /// Whether the backing tool can be invoked right now.
    fn is_available(&self) -> bool;

    /// Send one prompt. Never fails; errors are carried in the response.
    async fn ask(&self, prompt: &str) -> ProviderResponse;
}
