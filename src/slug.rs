//! URL-safe slugs for product SKUs and reference names.

use std::sync::LazyLock;

use regex::Regex;

static RE_NON_ALNUM: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-z0-9]+").unwrap());

/// Lower-cases `input` and collapses every run of non-alphanumerics into a
/// single `-`, trimming dashes from both ends. May return an empty string.
pub fn slugify(input: &str) -> String {
    let lowered = input.trim().to_lowercase();
    RE_NON_ALNUM
        .replace_all(&lowered, "-")
        .trim_matches('-')
        .to_string()
}

/// Case-insensitive lookup key for reference dictionaries.
pub fn name_key(name: &str) -> String {
    name.trim().to_lowercase()
}
