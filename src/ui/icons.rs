//! Shared UI icons.
//!
//! Each icon falls back to a plain-text marker on terminals without emoji.

use console::Emoji;

// Status indicators
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "[OK]");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "[!]");

// Submission steps
pub static LOCK: Emoji<'_, '_> = Emoji("🔐 ", "[AUTH]");
pub static FORK: Emoji<'_, '_> = Emoji("🍴 ", "[FORK]");
pub static PAGE: Emoji<'_, '_> = Emoji("📄 ", "[FILE]");
pub static PULL: Emoji<'_, '_> = Emoji("🔀 ", "[PR]");

// Content
pub static UPLOAD: Emoji<'_, '_> = Emoji("📤 ", "[UP]");
pub static DOWNLOAD: Emoji<'_, '_> = Emoji("📥 ", "[DOWN]");
