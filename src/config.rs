//! Layered configuration for chorus.
//!
//! Settings are read from `chorus.toml`, then environment variables, then
//! CLI flags, each layer overriding the previous one.
//!
//! The file is looked up in this order: `--config PATH`, `$CHORUS_CONFIG`,
//! `./chorus.toml`, `~/.config/chorus/chorus.toml`. A missing file means
//! built-in defaults.
//!
//! # Configuration File Format
//!
//! ```toml
//! [defaults]
//! timeout_secs = 900
//! workflow_timeout_multiplier = 8
//! max_retries = 3
//! base_delay_secs = 2.0
//! ollama_model = "qwen3-coder:480b-cloud"
//! fallback_ollama_model = "qwen3-coder:30b"
//! duplicate_naming = "fallback-suffix"
//!
//! [[providers]]
//! kind = "command"
//! name = "echo"
//! binary = "sh"
//! args = ["-c", "echo \"$1\"", "sh", "{prompt}"]
//!
//! [roles]
//! planner = ["claude", "gemini"]
//!
//! [checkpoints]
//! enabled = true
//! dir = "checkpoints"
//! ```
//!
//! When `[[providers]]` is empty the default set is registered: `ollama`,
//! `claude`, `gemini` and a second ollama instance on the fallback model
//! (keyed `ollama_fallback` under the default naming policy).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::observer::SharedObserver;
use crate::pipeline::{Role, RolePriorities};
use crate::provider::cli::{DEFAULT_FALLBACK_OLLAMA_MODEL, DEFAULT_OLLAMA_MODEL};
use crate::provider::{
    CliProvider, DEFAULT_TIMEOUT_SECS, DuplicateNaming, ProviderKind, ProviderRegistry,
    ProviderSettings,
};
use crate::retry::{DEFAULT_MAX_RETRIES, RetryPolicy};

/// File name looked up in the project directory.
pub const CONFIG_FILE_NAME: &str = "chorus.toml";

/// Tool behind a `[[providers]]` entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKindName {
    Ollama,
    Claude,
    Gemini,
    Command,
}

/// One `[[providers]]` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderEntry {
    pub kind: ProviderKindName,
    /// Registry name; defaults to the kind name and is disambiguated when taken
    #[serde(default)]
    pub name: Option<String>,
    /// Executable; defaults to the kind's usual binary
    #[serde(default)]
    pub binary: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    /// Argument template for `command` providers
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub max_prompt_chars: Option<usize>,
}

impl ProviderEntry {
    fn builtin(kind: ProviderKindName, model: Option<String>) -> Self {
        Self {
            kind,
            name: None,
            binary: None,
            model,
            args: Vec::new(),
            timeout_secs: None,
            max_prompt_chars: None,
        }
    }
}

/// `[defaults]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefaultsSection {
    /// Per-call provider timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Overall workflow limit = timeout_secs * multiplier
    #[serde(default = "default_workflow_timeout_multiplier")]
    pub workflow_timeout_multiplier: u32,
    /// Retries after the first call; 0 disables retrying
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_delay_secs")]
    pub base_delay_secs: f64,
    #[serde(default = "default_ollama_model")]
    pub ollama_model: String,
    #[serde(default = "default_fallback_ollama_model")]
    pub fallback_ollama_model: String,
    #[serde(default)]
    pub duplicate_naming: DuplicateNaming,
    /// Minimum length of a workflow prompt typed by the user
    #[serde(default = "default_min_prompt_chars")]
    pub min_prompt_chars: usize,
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_workflow_timeout_multiplier() -> u32 {
    8
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_base_delay_secs() -> f64 {
    2.0
}

fn default_ollama_model() -> String {
    DEFAULT_OLLAMA_MODEL.to_string()
}

fn default_fallback_ollama_model() -> String {
    DEFAULT_FALLBACK_OLLAMA_MODEL.to_string()
}

fn default_min_prompt_chars() -> usize {
    10
}

impl Default for DefaultsSection {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            workflow_timeout_multiplier: default_workflow_timeout_multiplier(),
            max_retries: default_max_retries(),
            base_delay_secs: default_base_delay_secs(),
            ollama_model: default_ollama_model(),
            fallback_ollama_model: default_fallback_ollama_model(),
            duplicate_naming: DuplicateNaming::default(),
            min_prompt_chars: default_min_prompt_chars(),
        }
    }
}

/// `[checkpoints]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointsSection {
    #[serde(default = "default_checkpoints_enabled")]
    pub enabled: bool,
    /// Relative paths resolve against the project directory
    #[serde(default = "default_checkpoints_dir")]
    pub dir: PathBuf,
}

fn default_checkpoints_enabled() -> bool {
    true
}

fn default_checkpoints_dir() -> PathBuf {
    PathBuf::from("checkpoints")
}

impl Default for CheckpointsSection {
    fn default() -> Self {
        Self {
            enabled: default_checkpoints_enabled(),
            dir: default_checkpoints_dir(),
        }
    }
}

/// Contents of `chorus.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChorusToml {
    #[serde(default)]
    pub defaults: DefaultsSection,
    #[serde(default)]
    pub providers: Vec<ProviderEntry>,
    #[serde(default)]
    pub roles: RolePriorities,
    #[serde(default)]
    pub checkpoints: CheckpointsSection,
}

impl ChorusToml {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let toml: Self = toml::from_str(content).context("Failed to parse chorus.toml")?;
        for entry in &toml.providers {
            if entry.kind == ProviderKindName::Command && embeds_prompt_in_script(&entry.args) {
                anyhow::bail!(
                    "Command provider '{}' places {{prompt}} inside a shell script argument; \
                     pass it as a separate positional argument, \
                     e.g. [\"-c\", \"cmd \\\"$1\\\"\", \"sh\", \"{{prompt}}\"]",
                    entry.name.as_deref().unwrap_or("command")
                );
            }
        }
        Ok(toml)
    }

    /// Apply `OLLAMA_MODEL` and `CHORUS_TIMEOUT` from `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(model) = lookup("OLLAMA_MODEL").filter(|m| !m.trim().is_empty()) {
            self.defaults.ollama_model = model.trim().to_string();
        }
        if let Some(raw) = lookup("CHORUS_TIMEOUT") {
            self.defaults.timeout_secs = raw
                .trim()
                .parse()
                .with_context(|| {
                    format!("CHORUS_TIMEOUT must be a number of seconds, got '{}'", raw)
                })?;
        }
        Ok(())
    }

    /// Effective provider entries: the configured list, or the default set.
    pub fn provider_entries(&self) -> Vec<ProviderEntry> {
        if !self.providers.is_empty() {
            return self.providers.clone();
        }
        vec![
            ProviderEntry::builtin(
                ProviderKindName::Ollama,
                Some(self.defaults.ollama_model.clone()),
            ),
            ProviderEntry::builtin(ProviderKindName::Claude, None),
            ProviderEntry::builtin(ProviderKindName::Gemini, None),
            ProviderEntry::builtin(
                ProviderKindName::Ollama,
                Some(self.defaults.fallback_ollama_model.clone()),
            ),
        ]
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.defaults.timeout_secs == 0 {
            warnings.push(
                "defaults.timeout_secs is 0; every provider call will time out".to_string(),
            );
        }
        if self.defaults.base_delay_secs < 0.0 || !self.defaults.base_delay_secs.is_finite() {
            warnings.push(format!(
                "Invalid defaults.base_delay_secs {}; using 0",
                self.defaults.base_delay_secs
            ));
        }

        for entry in &self.providers {
            if entry.kind == ProviderKindName::Command && entry.binary.is_none() {
                warnings.push(format!(
                    "Command provider '{}' has no binary; defaulting to 'sh'",
                    entry.name.as_deref().unwrap_or("command")
                ));
            }
        }

        let registry = self.build_registry(crate::observer::noop());
        for role in Role::ALL {
            for name in self.roles.chain(role) {
                if !registry.contains(name) {
                    warnings.push(format!(
                        "Role '{}' references unknown provider '{}'",
                        role.key(),
                        name
                    ));
                }
            }
        }

        warnings
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        let secs = self.defaults.base_delay_secs;
        let base = if secs.is_finite() && secs > 0.0 {
            Duration::from_secs_f64(secs)
        } else {
            Duration::ZERO
        };
        RetryPolicy::new(self.defaults.max_retries, base)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.defaults.timeout_secs)
    }

    pub fn workflow_timeout(&self) -> Duration {
        self.timeout()
            .saturating_mul(self.defaults.workflow_timeout_multiplier.max(1))
    }

    /// Register every provider entry, in order.
    pub fn build_registry(&self, observer: SharedObserver) -> ProviderRegistry {
        let mut registry = ProviderRegistry::new(self.defaults.duplicate_naming);
        for entry in self.provider_entries() {
            let provider = self.build_provider(&entry).with_observer(observer.clone());
            registry.register(provider);
        }
        registry
    }

    fn build_provider(&self, entry: &ProviderEntry) -> CliProvider {
        let kind = match entry.kind {
            ProviderKindName::Ollama => ProviderKind::Ollama,
            ProviderKindName::Claude => ProviderKind::Claude,
            ProviderKindName::Gemini => ProviderKind::Gemini,
            ProviderKindName::Command => ProviderKind::Command {
                args: entry.args.clone(),
            },
        };

        let binary = entry
            .binary
            .clone()
            .unwrap_or_else(|| kind.default_binary().to_string());
        let mut settings = ProviderSettings::new(binary)
            .with_timeout(Duration::from_secs(
                entry.timeout_secs.unwrap_or(self.defaults.timeout_secs),
            ))
            .with_max_prompt_chars(
                entry
                    .max_prompt_chars
                    .unwrap_or_else(|| kind.default_max_prompt_chars()),
            );
        match (&entry.model, &kind) {
            (Some(model), _) => settings = settings.with_model(model.clone()),
            (None, ProviderKind::Ollama) => {
                settings = settings.with_model(self.defaults.ollama_model.clone())
            }
            _ => {}
        }

        let name = entry
            .name
            .clone()
            .unwrap_or_else(|| kind.default_name().to_string());
        CliProvider::new(name, kind, settings)
    }
}

/// Resolved runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub project_dir: PathBuf,
    /// File the settings came from, if any
    pub source: Option<PathBuf>,
    pub toml: ChorusToml,
}

impl Config {
    /// Resolve file → environment layers for `project_dir`.
    pub fn load(project_dir: &Path, explicit: Option<&Path>) -> Result<Self> {
        let project_dir = project_dir
            .canonicalize()
            .context("Failed to resolve project directory")?;

        let env_path = std::env::var_os("CHORUS_CONFIG").map(PathBuf::from);
        let source = match explicit.map(Path::to_path_buf).or(env_path) {
            Some(path) => Some(path),
            None => discover(&project_dir),
        };

        let mut toml = match &source {
            Some(path) => ChorusToml::load(path)?,
            None => ChorusToml::default(),
        };
        toml.apply_env(|key| std::env::var(key).ok())?;

        for warning in toml.validate() {
            tracing::warn!("{}", warning);
        }

        Ok(Self {
            project_dir,
            source,
            toml,
        })
    }

    /// CLI `--no-checkpoints`.
    pub fn with_checkpoints_disabled(mut self, disabled: bool) -> Self {
        if disabled {
            self.toml.checkpoints.enabled = false;
        }
        self
    }

    pub fn checkpoints_enabled(&self) -> bool {
        self.toml.checkpoints.enabled
    }

    pub fn checkpoint_dir(&self) -> PathBuf {
        if self.toml.checkpoints.dir.is_absolute() {
            self.toml.checkpoints.dir.clone()
        } else {
            self.project_dir.join(&self.toml.checkpoints.dir)
        }
    }

    pub fn roles(&self) -> &RolePriorities {
        &self.toml.roles
    }

    pub fn min_prompt_chars(&self) -> usize {
        self.toml.defaults.min_prompt_chars
    }
}

/// True when `{prompt}` is spliced into the script that follows a shell
/// `-c` style flag, where the shell would evaluate model text.
fn embeds_prompt_in_script(args: &[String]) -> bool {
    args.windows(2).any(|pair| {
        let flag = pair[0].as_str();
        let is_script_flag =
            flag.starts_with('-') && !flag.starts_with("--") && flag.ends_with('c');
        is_script_flag && pair[1].contains("{prompt}")
    })
}

fn discover(project_dir: &Path) -> Option<PathBuf> {
    let local = project_dir.join(CONFIG_FILE_NAME);
    if local.exists() {
        return Some(local);
    }
    let user = dirs::config_dir()?.join("chorus").join(CONFIG_FILE_NAME);
    user.exists().then_some(user)
}
