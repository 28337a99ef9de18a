//! Extraction from the page's embedded application state

use crate::content::parse_content;
use crate::normalize::{normalize_difficulty_opt, slugify};
use crate::ProblemDraft;
use serde_json::Value;
use url::Url;

// Field synonyms, tried in order so that results stay deterministic when a
// node carries more than one shape.
const TITLE_PATHS: &[&[&str]] = &[&["title"], &["questionTitle"], &["question", "title"]];
const CONTENT_PATHS: &[&[&str]] = &[&["content"], &["body"], &["question", "content"]];
const DIFFICULTY_PATHS: &[&[&str]] = &[&["difficulty"], &["question", "difficulty"]];
const SLUG_PATHS: &[&[&str]] = &[&["titleSlug"], &["slug"], &["question", "titleSlug"]];
const NUMBER_PATHS: &[&[&str]] = &[
    &["questionFrontendId"],
    &["frontendQuestionId"],
    &["questionId"],
    &["question", "questionFrontendId"],
];

/// Walk `data` looking for a question record whose slug matches `active_slug`.
///
/// The walk is depth-first with an explicit stack, visiting children in
/// document order. The first record that passes the slug check wins. An empty
/// `active_slug` accepts the first question-shaped record.
pub fn extract_structured(data: &Value, page_url: &Url, active_slug: &str) -> Option<ProblemDraft> {
    let mut stack: Vec<&Value> = vec![data];

    while let Some(node) = stack.pop() {
        match node {
            Value::Object(map) => {
                if let Some(draft) = candidate(node, page_url, active_slug) {
                    return Some(draft);
                }
                let children: Vec<&Value> = map.values().collect();
                stack.extend(children.into_iter().rev().filter(|v| is_container(v)));
            }
            Value::Array(items) => {
                stack.extend(items.iter().rev().filter(|v| is_container(v)));
            }
            _ => {}
        }
    }

    None
}

fn is_container(value: &Value) -> bool {
    matches!(value, Value::Object(_) | Value::Array(_))
}

fn candidate(node: &Value, page_url: &Url, active_slug: &str) -> Option<ProblemDraft> {
    let title = lookup_text(node, TITLE_PATHS)?;
    let content = lookup_text(node, CONTENT_PATHS)?;

    let slug = lookup_text(node, SLUG_PATHS)
        .map(|slug| slug.to_lowercase())
        .unwrap_or_else(|| slugify(&title));
    if !active_slug.is_empty() && slug != active_slug {
        return None;
    }

    let difficulty = normalize_difficulty_opt(lookup_text(node, DIFFICULTY_PATHS).as_deref());
    let problem_number = lookup_text(node, NUMBER_PATHS).unwrap_or_else(|| slug.clone());
    let parsed = parse_content(&content);

    Some(ProblemDraft {
        title,
        difficulty,
        description: parsed.description,
        examples: parsed.examples,
        constraints: parsed.constraints,
        url: page_url.to_string(),
        slug,
        problem_number,
    })
}

/// First non-empty string (or number, stringified) found along `paths`
fn lookup_text(node: &Value, paths: &[&[&str]]) -> Option<String> {
    paths.iter().find_map(|path| {
        let value = path.iter().try_fold(node, |current, key| current.get(key))?;
        match value {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    })
}
