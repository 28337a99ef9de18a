//! Extraction from the visible page elements

use crate::content::parse_content;
use crate::normalize::{collapse_whitespace, normalize_difficulty, slugify, split_numbered_title, title_from_slug};
use crate::page::PageSnapshot;
use crate::{Difficulty, ProblemDraft};
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

/// Title elements, newest layout first
const TITLE_SELECTORS: &[&str] = &[
    "[data-cy='question-title']",
    "div.text-title-large a",
    "div.text-title-large",
    "a[href^='/problems/'].truncate",
];

/// Statement containers, newest layout first
const DESCRIPTION_SELECTORS: &[&str] = &[
    "[data-track-load='description_content']",
    "div.elfjS",
    "div.question-content__JfgR",
    "div.question-content",
    "div.content__u3I1",
];

const DIFFICULTY_SELECTOR: &str = "[class*='difficulty'], [diff]";

/// Read the problem from the rendered document.
///
/// Requires a statement container. A missing title falls back to text
/// derived from the URL slug.
pub fn extract_dom(snapshot: &PageSnapshot) -> Option<ProblemDraft> {
    let document = Html::parse_document(&snapshot.html);

    let container = first_match(&document, DESCRIPTION_SELECTORS)?;
    debug!("DOM statement container found");

    let url_slug = snapshot.slug();
    let raw_title = first_match(&document, TITLE_SELECTORS)
        .map(|el| collapse_whitespace(&el.text().collect::<String>()))
        .filter(|t| !t.is_empty());

    let (number, title) = match raw_title {
        Some(raw) => split_numbered_title(&raw),
        None if !url_slug.is_empty() => (None, title_from_slug(&url_slug)),
        None => return None,
    };

    let slug = if url_slug.is_empty() {
        slugify(&title)
    } else {
        url_slug
    };
    let parsed = parse_content(&container.inner_html());

    Some(ProblemDraft {
        title,
        difficulty: find_difficulty(&document),
        description: parsed.description,
        examples: parsed.examples,
        constraints: parsed.constraints,
        url: snapshot.url.to_string(),
        problem_number: number.unwrap_or_else(|| slug.clone()),
        slug,
    })
}

fn first_match<'a>(document: &'a Html, selectors: &[&str]) -> Option<ElementRef<'a>> {
    selectors.iter().find_map(|selector_str| {
        let selector = Selector::parse(selector_str).ok()?;
        document.select(&selector).next()
    })
}

/// Difficulty badge text, or the easy/medium/hard hint in its class name
fn find_difficulty(document: &Html) -> Difficulty {
    let Ok(selector) = Selector::parse(DIFFICULTY_SELECTOR) else {
        return Difficulty::default();
    };

    for badge in document.select(&selector) {
        let text = badge.text().collect::<String>().trim().to_lowercase();
        if matches!(text.as_str(), "easy" | "medium" | "hard") {
            return normalize_difficulty(&text);
        }

        let hints = [
            badge.value().attr("class").unwrap_or_default(),
            badge.value().attr("diff").unwrap_or_default(),
        ]
        .join(" ")
        .to_lowercase();
        for level in ["easy", "medium", "hard"] {
            if hints.contains(level) {
                return normalize_difficulty(level);
            }
        }
    }

    Difficulty::default()
}
