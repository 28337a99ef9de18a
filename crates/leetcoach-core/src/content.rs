//! Problem statement partitioning
//!
//! Splits a raw statement fragment into description, examples and
//! constraints. Markup on problem pages changes often, so every rule here
//! degrades to a sentinel rather than failing.

use crate::{CONSTRAINTS_NOT_DETECTED, DESCRIPTION_UNAVAILABLE};
use scraper::{ElementRef, Html, Selector};

/// The three text blocks of a problem statement
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedContent {
    pub description: String,
    pub examples: Vec<String>,
    pub constraints: String,
}

/// Partition a statement fragment into description, examples and constraints
pub fn parse_content(html: &str) -> ParsedContent {
    let fragment = Html::parse_fragment(html);
    let root = fragment.root_element();

    ParsedContent {
        description: extract_description(root),
        examples: extract_examples(root),
        constraints: extract_constraints(root),
    }
}

/// Text of every top-level child up to the first example/constraints label or code block
fn extract_description(root: ElementRef) -> String {
    let mut blocks = Vec::new();

    for child in root.children() {
        let text = match ElementRef::wrap(child) {
            Some(element) => {
                if is_section_boundary(element) {
                    break;
                }
                element_text(element)
            }
            None => child
                .value()
                .as_text()
                .map(|t| t.trim().to_string())
                .unwrap_or_default(),
        };

        if !text.is_empty() {
            blocks.push(text);
        }
    }

    if !blocks.is_empty() {
        return blocks.join("\n\n");
    }

    let whole = element_text(root);
    if whole.is_empty() {
        DESCRIPTION_UNAVAILABLE.to_string()
    } else {
        whole
    }
}

fn is_section_boundary(element: ElementRef) -> bool {
    if element.value().name() == "pre" {
        return true;
    }

    let label_selector = emphasis_selector();
    let is_label = |el: ElementRef| {
        let label = element_text(el).to_lowercase();
        label.starts_with("example") || label.starts_with("constraints")
    };

    if is_emphasis(element) && is_label(element) {
        return true;
    }
    element.select(&label_selector).any(is_label)
}

/// Text of each `<pre>` block in document order, empty ones dropped
fn extract_examples(root: ElementRef) -> Vec<String> {
    let pre = match Selector::parse("pre") {
        Ok(selector) => selector,
        Err(_) => return Vec::new(),
    };

    root.select(&pre)
        .map(|block| block.text().collect::<String>().trim().to_string())
        .filter(|text| !text.is_empty())
        .collect()
}

fn extract_constraints(root: ElementRef) -> String {
    let label = root
        .select(&emphasis_selector())
        .find(|el| element_text(*el).to_lowercase().contains("constraint"));

    let Some(label) = label else {
        return CONSTRAINTS_NOT_DETECTED.to_string();
    };

    // The label is usually wrapped in a <p>; the list follows that wrapper
    let anchor = match label.parent().and_then(ElementRef::wrap) {
        Some(parent) if parent.value().name() == "p" => parent,
        _ => label,
    };

    if let Some(list) = anchor
        .next_siblings()
        .filter_map(ElementRef::wrap)
        .next()
        .filter(|el| matches!(el.value().name(), "ul" | "ol"))
    {
        let items: Vec<String> = list
            .children()
            .filter_map(ElementRef::wrap)
            .filter(|el| el.value().name() == "li")
            .map(element_text)
            .filter(|text| !text.is_empty())
            .collect();
        if !items.is_empty() {
            return items.join("\n");
        }
    }

    let container = label.parent().and_then(ElementRef::wrap).unwrap_or(label);
    let text = element_text(container);
    if text.is_empty() {
        CONSTRAINTS_NOT_DETECTED.to_string()
    } else {
        text
    }
}

fn emphasis_selector() -> Selector {
    Selector::parse("strong, b, em").expect("static selector")
}

fn is_emphasis(element: ElementRef) -> bool {
    matches!(element.value().name(), "strong" | "b" | "em")
}

fn element_text(element: ElementRef) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
