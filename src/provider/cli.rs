//! Subprocess-backed provider.
//!
//! Each [`ProviderKind`] knows how to turn a prompt into an argument list for
//! its tool. Everything else (validation, availability, timeout, exit status
//! and output handling) is shared.

use async_trait::async_trait;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;

use super::{GEMINI_MAX_PROMPT_CHARS, Provider, ProviderResponse, ProviderSettings};
use crate::observer::{Event, SharedObserver, noop};
use crate::validation::{MAX_RESPONSE_CHARS, sanitize_response, validate_prompt};

/// Model used by the primary ollama instance when none is configured.
pub const DEFAULT_OLLAMA_MODEL: &str = "qwen3-coder:480b-cloud";

/// Model used by the secondary ollama instance.
pub const DEFAULT_FALLBACK_OLLAMA_MODEL: &str = "qwen3-coder:30b";

/// Error text for a binary that disappeared after registration.
pub const UNAVAILABLE_ERROR: &str = "Provider unavailable (binary not found)";

/// Error text for a call that exceeded its timeout.
pub const TIMEOUT_ERROR: &str = "Timeout exceeded";

/// Error text for a zero-exit call that printed nothing.
pub const EMPTY_RESPONSE_ERROR: &str =
    "Empty response received from provider (possible quota limit or error)";

const GEMINI_BANNER_MARKERS: &[&str] = &["YOLO mode", "Loaded cached"];

/// Which external tool a [`CliProvider`] drives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderKind {
    /// `ollama run <model> <prompt>`
    Ollama,
    /// `claude -p <prompt>`
    Claude,
    /// `gemini <prompt> --yolo`
    Gemini,
    /// A user-defined command. `{prompt}` and `{model}` in `args` are
    /// substituted; the prompt is appended when no argument mentions it.
    Command { args: Vec<String> },
}

impl ProviderKind {
    /// Registry name used when the configuration gives none.
    pub fn default_name(&self) -> &'static str {
        match self {
            ProviderKind::Ollama => "ollama",
            ProviderKind::Claude => "claude",
            ProviderKind::Gemini => "gemini",
            ProviderKind::Command { .. } => "command",
        }
    }

    pub fn default_binary(&self) -> &'static str {
        match self {
            ProviderKind::Ollama => "ollama",
            ProviderKind::Claude => "claude",
            ProviderKind::Gemini => "gemini",
            ProviderKind::Command { .. } => "sh",
        }
    }

    pub fn default_max_prompt_chars(&self) -> usize {
        match self {
            ProviderKind::Gemini => GEMINI_MAX_PROMPT_CHARS,
            _ => super::DEFAULT_MAX_PROMPT_CHARS,
        }
    }

    /// Argument list for one call.
    pub fn args(&self, prompt: &str, model: Option<&str>) -> Vec<String> {
        match self {
            ProviderKind::Ollama => vec![
                "run".to_string(),
                model.unwrap_or(DEFAULT_OLLAMA_MODEL).to_string(),
                prompt.to_string(),
            ],
            ProviderKind::Claude => vec!["-p".to_string(), prompt.to_string()],
            ProviderKind::Gemini => vec![prompt.to_string(), "--yolo".to_string()],
            ProviderKind::Command { args } => {
                let mut out: Vec<String> = args
                    .iter()
                    .map(|a| {
                        a.replace("{model}", model.unwrap_or(""))
                            .replace("{prompt}", prompt)
                    })
                    .collect();
                if !args.iter().any(|a| a.contains("{prompt}")) {
                    out.push(prompt.to_string());
                }
                out
            }
        }
    }

    /// Tool-specific cleanup of raw stdout.
    pub fn clean_output(&self, stdout: &str) -> String {
        match self {
            ProviderKind::Gemini => stdout
                .lines()
                .filter(|line| !GEMINI_BANNER_MARKERS.iter().any(|m| line.contains(m)))
                .collect::<Vec<_>>()
                .join("\n"),
            _ => stdout.to_string(),
        }
    }
}

/// A provider that runs an external CLI per request.
pub struct CliProvider {
    name: String,
    kind: ProviderKind,
    settings: ProviderSettings,
    observer: SharedObserver,
}

impl CliProvider {
    pub fn new(name: impl Into<String>, kind: ProviderKind, settings: ProviderSettings) -> Self {
        Self {
            name: name.into(),
            kind,
            settings,
            observer: noop(),
        }
    }

    /// Settings with the kind's default binary and prompt limit.
    pub fn default_settings(kind: &ProviderKind) -> ProviderSettings {
        ProviderSettings::new(kind.default_binary())
            .with_max_prompt_chars(kind.default_max_prompt_chars())
    }

    pub fn ollama(name: impl Into<String>, model: impl Into<String>) -> Self {
        let kind = ProviderKind::Ollama;
        let settings = Self::default_settings(&kind).with_model(model);
        Self::new(name, kind, settings)
    }

    pub fn claude() -> Self {
        let kind = ProviderKind::Claude;
        let settings = Self::default_settings(&kind);
        Self::new("claude", kind, settings)
    }

    pub fn gemini() -> Self {
        let kind = ProviderKind::Gemini;
        let settings = Self::default_settings(&kind);
        Self::new("gemini", kind, settings)
    }

    pub fn command(
        name: impl Into<String>,
        binary: impl Into<std::path::PathBuf>,
        args: Vec<String>,
    ) -> Self {
        Self::new(
            name,
            ProviderKind::Command { args },
            ProviderSettings::new(binary),
        )
    }

    pub fn with_observer(mut self, observer: SharedObserver) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.settings.timeout = timeout;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn kind(&self) -> &ProviderKind {
        &self.kind
    }

    pub fn settings(&self) -> &ProviderSettings {
        &self.settings
    }

    async fn execute(&self, prompt: &str) -> ProviderResponse {
        let mut cmd = Command::new(&self.settings.binary);
        cmd.args(self.kind.args(prompt, self.settings.model.as_deref()))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let start = Instant::now();
        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                return ProviderResponse::classified_failure(
                    &self.name,
                    format!("Failed to start {}: {}", self.name, e),
                    start.elapsed(),
                );
            }
        };

        // Dropping the pending future on timeout drops the child, which kills it.
        let waited = tokio::time::timeout(self.settings.timeout, child.wait_with_output()).await;
        let output = match waited {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return ProviderResponse::classified_failure(
                    &self.name,
                    format!("Failed to wait for {}: {}", self.name, e),
                    start.elapsed(),
                );
            }
            Err(_) => {
                return ProviderResponse::failure(&self.name, TIMEOUT_ERROR, start.elapsed(), true);
            }
        };
        let duration = start.elapsed();

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stderr = stderr.trim();

        if !output.status.success() {
            let message = if stderr.is_empty() {
                format!(
                    "{} exited with code {}",
                    self.name,
                    output.status.code().unwrap_or(-1)
                )
            } else {
                stderr.to_string()
            };
            return ProviderResponse::classified_failure(&self.name, message, duration);
        }

        if stdout.trim().is_empty() {
            let message = if stderr.is_empty() {
                EMPTY_RESPONSE_ERROR.to_string()
            } else {
                stderr.to_string()
            };
            return ProviderResponse::classified_failure(&self.name, message, duration);
        }

        let cleaned = self.kind.clean_output(&stdout);
        match sanitize_response(cleaned.trim(), MAX_RESPONSE_CHARS) {
            Ok(content) => ProviderResponse::ok(&self.name, content, duration),
            Err(e) => ProviderResponse::classified_failure(&self.name, e.to_string(), duration),
        }
    }
}

#[async_trait]
impl Provider for CliProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_available(&self) -> bool {
        which::which(&self.settings.binary).is_ok()
    }

    async fn ask(&self, prompt: &str) -> ProviderResponse {
        let prompt = match validate_prompt(prompt, self.settings.max_prompt_chars) {
            Ok(p) => p,
            Err(e) => {
                return ProviderResponse::failure(
                    &self.name,
                    format!("Invalid prompt: {}", e),
                    Duration::ZERO,
                    false,
                );
            }
        };

        if !self.is_available() {
            return ProviderResponse::failure(&self.name, UNAVAILABLE_ERROR, Duration::ZERO, false);
        }

        self.observer.notify(&Event::RequestStarted {
            provider: &self.name,
            model: self.settings.model.as_deref(),
            timeout: self.settings.timeout,
        });

        let response = self.execute(&prompt).await;

        self.observer.notify(&Event::RequestFinished {
            provider: &self.name,
            duration: response.duration,
            success: response.is_success(),
        });
        tracing::debug!(
            provider = %self.name,
            duration_ms = response.duration.as_millis() as u64,
            quota = response.is_quota_error,
            error = response.error.as_deref().unwrap_or(""),
            "provider call finished"
        );

        response
    }
}

impl std::fmt::Debug for CliProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CliProvider")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("settings", &self.settings)
            .finish()
    }
}
