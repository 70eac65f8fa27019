//! Shared utility functions for the chorus crate.

/// Maximum characters of a raw provider error shown to users and logs.
pub const ERROR_PREVIEW_CHARS: usize = 150;

/// Truncate `text` to at most `max_chars` characters without splitting a
/// UTF-8 sequence. Appends `...` when anything was cut.
pub fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

/// Preview of a provider error message, or `"Unknown error"` when absent.
pub fn error_preview(error: Option<&str>) -> String {
    match error {
        Some(e) if !e.is_empty() => preview(e, ERROR_PREVIEW_CHARS),
        _ => "Unknown error".to_string(),
    }
}
