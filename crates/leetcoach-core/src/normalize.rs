//! Difficulty and slug normalization

use crate::Difficulty;
use regex::Regex;
use std::sync::OnceLock;

/// Canonicalize a free-text difficulty label.
///
/// Anything that is not recognizably easy, medium or hard becomes `Medium`.
pub fn normalize_difficulty(label: &str) -> Difficulty {
    match label.trim().to_lowercase().as_str() {
        "easy" => Difficulty::Easy,
        "medium" => Difficulty::Medium,
        "hard" => Difficulty::Hard,
        _ => Difficulty::Medium,
    }
}

/// Same as [`normalize_difficulty`] for optional input
pub fn normalize_difficulty_opt(label: Option<&str>) -> Difficulty {
    label.map(normalize_difficulty).unwrap_or_default()
}

/// Turn a title into a URL-safe slug: lowercase ASCII alphanumerics joined by `-`
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_dash = false;

    for ch in title.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch.to_ascii_lowercase());
        } else if ch == '\'' {
            continue;
        } else {
            pending_dash = true;
        }
    }

    slug
}

/// Readable text derived from a slug (`two-sum` -> `Two Sum`)
pub fn title_from_slug(slug: &str) -> String {
    slug.split('-')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Split a heading like `"1. Two Sum"` into its number and title
pub fn split_numbered_title(raw: &str) -> (Option<String>, String) {
    static NUMBERED: OnceLock<Option<Regex>> = OnceLock::new();
    let re = NUMBERED.get_or_init(|| Regex::new(r"^\s*(\d+)\.\s*(.+?)\s*$").ok());

    if let Some(caps) = re.as_ref().and_then(|re| re.captures(raw)) {
        return (Some(caps[1].to_string()), caps[2].to_string());
    }
    (None, raw.trim().to_string())
}

/// Collapse runs of whitespace into single spaces and trim
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
