//! Progress notifications emitted by the orchestration core.
//!
//! Providers, the retry policy, the fallback resolver, the panel coordinator
//! and the pipeline engine report what they are doing through an
//! [`Observer`]. Observers only watch: nothing they do feeds back into a
//! decision.
//!
//! Two implementations ship with the crate: [`TracingObserver`] forwards
//! events to `tracing`, and `ui::ConsoleObserver` renders them for a
//! terminal.

use std::sync::Arc;
use std::time::Duration;

/// A single progress notification.
#[derive(Debug, Clone, PartialEq)]
pub enum Event<'a> {
    /// A provider is about to invoke its external tool.
    RequestStarted {
        provider: &'a str,
        model: Option<&'a str>,
        timeout: Duration,
    },
    /// A provider call returned (successfully or not).
    RequestFinished {
        provider: &'a str,
        duration: Duration,
        success: bool,
    },
    /// The retry policy will sleep and call the provider again.
    RetryScheduled {
        provider: &'a str,
        attempt: u32,
        max_retries: u32,
        delay: Duration,
        error: &'a str,
    },
    /// A retry produced a successful response.
    RetrySucceeded { provider: &'a str, attempt: u32 },
    /// The resolver is about to try a candidate.
    CandidateStarted {
        role: &'a str,
        provider: &'a str,
        is_first: bool,
    },
    /// The resolver skipped a candidate that is unknown or unavailable.
    CandidateSkipped {
        role: &'a str,
        provider: &'a str,
        reason: &'a str,
    },
    /// A candidate failed and the resolver moves on.
    CandidateFailed {
        role: &'a str,
        provider: &'a str,
        quota: bool,
        error: &'a str,
    },
    /// A candidate answered successfully.
    CandidateSucceeded {
        role: &'a str,
        provider: &'a str,
        fell_back: bool,
        request: Duration,
        total: Duration,
        chars: usize,
    },
    /// A pipeline stage began.
    StageStarted {
        number: usize,
        total: usize,
        label: &'a str,
    },
    /// A pipeline stage produced its result.
    StageCompleted {
        label: &'a str,
        provider: &'a str,
        duration: Duration,
    },
    /// A non-blocking stage failed and the pipeline continues without it.
    StageDegraded { label: &'a str, reason: &'a str },
    /// The review passed the LGTM gate, refinement is skipped.
    RefinementSkipped,
    /// A stage result was restored from a checkpoint instead of re-run.
    StageRestored { label: &'a str },
    /// Writing a workflow artifact failed; the run continues.
    ArtifactWriteFailed { name: &'a str, error: &'a str },
    /// Recording a checkpoint failed; the run continues.
    CheckpointWriteFailed { step_id: &'a str, error: &'a str },
    /// One panel worker finished.
    PanelDraft {
        provider: &'a str,
        duration: Duration,
        error: Option<&'a str>,
    },
    /// The panel curator started synthesizing.
    CurationStarted { curator: &'a str, drafts: usize },
}

/// Receives [`Event`]s from the orchestration core.
pub trait Observer: Send + Sync {
    fn notify(&self, event: &Event<'_>);
}

/// Observer that discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl Observer for NoopObserver {
    fn notify(&self, _event: &Event<'_>) {}
}

/// Observer that forwards events to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn notify(&self, event: &Event<'_>) {
        match event {
            Event::RequestStarted {
                provider,
                model,
                timeout,
            } => tracing::info!(
                provider,
                model = model.unwrap_or("-"),
                timeout_secs = timeout.as_secs(),
                "sending request"
            ),
            Event::RequestFinished {
                provider,
                duration,
                success,
            } => tracing::info!(
                provider,
                duration_secs = duration.as_secs_f64(),
                success,
                "request finished"
            ),
            Event::RetryScheduled {
                provider,
                attempt,
                max_retries,
                delay,
                error,
            } => tracing::warn!(
                provider,
                attempt,
                max_retries,
                delay_secs = delay.as_secs_f64(),
                error,
                "retrying after delay"
            ),
            Event::RetrySucceeded { provider, attempt } => {
                tracing::info!(provider, attempt, "retry succeeded")
            }
            Event::CandidateStarted { role, provider, .. } => {
                tracing::info!(role, provider, "trying provider")
            }
            Event::CandidateSkipped {
                role,
                provider,
                reason,
            } => tracing::debug!(role, provider, reason, "skipping provider"),
            Event::CandidateFailed {
                role,
                provider,
                quota,
                error,
            } => tracing::warn!(role, provider, quota, error, "provider failed, falling back"),
            Event::CandidateSucceeded {
                role,
                provider,
                fell_back,
                chars,
                ..
            } => tracing::info!(role, provider, fell_back, chars, "provider succeeded"),
            Event::StageStarted {
                number,
                total,
                label,
            } => tracing::info!(number, total, stage = label, "stage started"),
            Event::StageCompleted {
                label,
                provider,
                duration,
            } => tracing::info!(
                stage = label,
                provider,
                duration_secs = duration.as_secs_f64(),
                "stage completed"
            ),
            Event::StageDegraded { label, reason } => {
                tracing::warn!(stage = label, reason, "stage degraded")
            }
            Event::RefinementSkipped => tracing::info!("review passed, refinement skipped"),
            Event::StageRestored { label } => {
                tracing::info!(stage = label, "restored from checkpoint")
            }
            Event::ArtifactWriteFailed { name, error } => {
                tracing::warn!(artifact = name, error, "failed to write artifact")
            }
            Event::CheckpointWriteFailed { step_id, error } => {
                tracing::warn!(step_id, error, "failed to record checkpoint")
            }
            Event::PanelDraft {
                provider,
                duration,
                error,
            } => tracing::info!(
                provider,
                duration_secs = duration.as_secs_f64(),
                error = error.unwrap_or("-"),
                "panel draft finished"
            ),
            Event::CurationStarted { curator, drafts } => {
                tracing::info!(curator, drafts, "curator synthesizing")
            }
        }
    }
}

/// Fan one event out to several observers.
pub struct ObserverSet {
    observers: Vec<Arc<dyn Observer>>,
}

impl ObserverSet {
    pub fn new(observers: Vec<Arc<dyn Observer>>) -> Self {
        Self { observers }
    }
}

impl Observer for ObserverSet {
    fn notify(&self, event: &Event<'_>) {
        for observer in &self.observers {
            observer.notify(event);
        }
    }
}

/// Shared handle used throughout the crate.
pub type SharedObserver = Arc<dyn Observer>;

/// Convenience constructor for a no-op observer handle.
pub fn noop() -> SharedObserver {
    Arc::new(NoopObserver)
}
