//! Slug and session name derivation.

use crate::{AutocodeError, Result};
use autocode_types::ContextKind;
use once_cell::sync::Lazy;
use regex::Regex;

static DISALLOWED: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9\s-]").expect("valid regex"));
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));
static DASHES: Lazy<Regex> = Lazy::new(|| Regex::new(r"-+").expect("valid regex"));

/// Reduce a human name to a URL-safe slug. May return an empty string.
pub fn slugify(name: &str) -> String {
    let lowered = name.trim().to_lowercase();
    let stripped = DISALLOWED.replace_all(&lowered, "");
    let dashed = WHITESPACE.replace_all(&stripped, "-");
    let collapsed = DASHES.replace_all(&dashed, "-");
    collapsed.trim_matches('-').to_string()
}

/// Like [`slugify`], but rejects names that reduce to nothing.
pub fn require_slug(name: &str) -> Result<String> {
    let slug = slugify(name);
    if slug.is_empty() {
        return Err(AutocodeError::InvalidName(format!(
            "'{}' contains no usable characters",
            name
        )));
    }
    Ok(slug)
}

/// Multiplexer session name for a context: `<username>-<kind>-<slug>`.
pub fn session_name(username: &str, kind: ContextKind, slug: &str) -> String {
    format!("{}-{}-{}", username, kind.as_str(), slug)
}
