//! Input and output validation shared by providers and the CLI.
//!
//! Prompts are checked before any process is spawned, provider output is
//! sanitized before it is interpolated into the next stage's prompt, and the
//! workflow output directory must stay inside the project root.

use regex::Regex;
use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;

use crate::errors::ValidationError;

/// Default upper bound for prompts handed to a provider.
pub const DEFAULT_MAX_PROMPT_CHARS: usize = 100_000;

/// Upper bound for sanitized provider output.
pub const MAX_RESPONSE_CHARS: usize = 100_000;

static ANSI_ESCAPE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1b\[[0-9;]*[a-zA-Z]").unwrap());

// Control characters except \t, \n and \r.
static CONTROL_CHAR_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\x00-\x08\x0B\x0C\x0E-\x1F\x7F]").unwrap());

/// Validate a prompt and return its trimmed form.
pub fn validate_prompt(prompt: &str, max_chars: usize) -> Result<String, ValidationError> {
    let trimmed = prompt.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyPrompt);
    }
    let len = trimmed.chars().count();
    if len > max_chars {
        return Err(ValidationError::PromptTooLong {
            max: max_chars,
            len,
        });
    }
    if trimmed.contains('\0') {
        return Err(ValidationError::NullByte);
    }
    Ok(trimmed.to_string())
}

/// Validate a user-supplied workflow prompt, which has a minimum length on
/// top of the provider-level checks.
pub fn validate_user_prompt(prompt: &str, min_chars: usize) -> Result<String, ValidationError> {
    let prompt = validate_prompt(prompt, DEFAULT_MAX_PROMPT_CHARS)?;
    if prompt.chars().count() < min_chars {
        return Err(ValidationError::PromptTooShort { min: min_chars });
    }
    Ok(prompt)
}

/// Strip ANSI escapes and control characters from provider output and
/// enforce the response length cap.
pub fn sanitize_response(content: &str, max_chars: usize) -> Result<String, ValidationError> {
    if content.is_empty() {
        return Ok(String::new());
    }
    let without_ansi = ANSI_ESCAPE_REGEX.replace_all(content, "");
    let cleaned = CONTROL_CHAR_REGEX.replace_all(&without_ansi, "").into_owned();
    let len = cleaned.chars().count();
    if len > max_chars {
        return Err(ValidationError::ContentTooLong {
            max: max_chars,
            len,
        });
    }
    Ok(cleaned)
}

/// Resolve `path` against `root`, reject anything escaping `root` or passing
/// through a symlink, and create the directory if it does not exist.
pub fn validate_output_dir(path: &Path, root: &Path) -> Result<PathBuf, ValidationError> {
    let root = root.canonicalize().map_err(|e| ValidationError::Io {
        path: root.to_path_buf(),
        message: e.to_string(),
    })?;
    let candidate = normalize(&root.join(path));

    if !candidate.starts_with(&root) {
        return Err(ValidationError::PathEscapesRoot {
            path: path.to_path_buf(),
            root,
        });
    }

    let mut current = root.clone();
    if let Ok(relative) = candidate.strip_prefix(&root) {
        for component in relative.components() {
            current.push(component);
            match std::fs::symlink_metadata(&current) {
                Ok(meta) if meta.file_type().is_symlink() => {
                    return Err(ValidationError::Symlink { path: current });
                }
                Ok(_) => {}
                Err(_) => break,
            }
        }
    }

    std::fs::create_dir_all(&candidate).map_err(|e| ValidationError::Io {
        path: candidate.clone(),
        message: e.to_string(),
    })?;
    Ok(candidate)
}

/// Lexically resolve `.` and `..` components.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}
