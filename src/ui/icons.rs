//! Shared UI icons.
//!
//! Each icon has a plain-text fallback for terminals without emoji support.

use console::Emoji;

// Status indicators
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "[OK] ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "[ERR] ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "[!] ");
pub static SPARKLE: Emoji<'_, '_> = Emoji("✨ ", "* ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "[i] ");

// Request lifecycle
pub static HOURGLASS: Emoji<'_, '_> = Emoji("⏳ ", "");
pub static SEARCH: Emoji<'_, '_> = Emoji("🔍 ", "");
pub static RETRY: Emoji<'_, '_> = Emoji("🔄 ", "[retry] ");
pub static RESTORE: Emoji<'_, '_> = Emoji("♻️  ", "[cached] ");

// Stages
pub static PLAN: Emoji<'_, '_> = Emoji("🧠 ", "");
pub static CODE: Emoji<'_, '_> = Emoji("💻 ", "");
pub static TEST: Emoji<'_, '_> = Emoji("🧪 ", "");
pub static REVIEW: Emoji<'_, '_> = Emoji("🔍 ", "");
pub static DOCS: Emoji<'_, '_> = Emoji("📝 ", "");
pub static FOLDER: Emoji<'_, '_> = Emoji("📂 ", "");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "");
pub static PARTY: Emoji<'_, '_> = Emoji("🎉 ", "");
