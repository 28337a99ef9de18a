//! Last-resort extraction through the site's own GraphQL API

use crate::content::parse_content;
use crate::normalize::{normalize_difficulty_opt, title_from_slug};
use crate::page::PageSnapshot;
use crate::ProblemDraft;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;
use url::Url;

const QUESTION_QUERY: &str = "query questionContent($titleSlug: String!) { \
question(titleSlug: $titleSlug) { questionFrontendId title difficulty content } }";

#[derive(Debug, Deserialize)]
struct GraphqlResponse {
    data: Option<GraphqlData>,
}

#[derive(Debug, Deserialize)]
struct GraphqlData {
    question: Option<GraphqlQuestion>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphqlQuestion {
    question_frontend_id: Option<String>,
    title: Option<String>,
    difficulty: Option<String>,
    content: Option<String>,
}

/// Queries the host site's GraphQL endpoint for the active slug
#[derive(Debug, Clone)]
pub struct NetworkExtractor {
    client: Client,
}

impl NetworkExtractor {
    /// Query `/graphql` on the page's own origin
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub async fn extract(&self, snapshot: &PageSnapshot) -> Option<ProblemDraft> {
        let slug = snapshot.slug();
        if slug.is_empty() {
            return None;
        }

        let endpoint = snapshot.url.join("/graphql").ok()?;
        debug!("Querying {} for {}", endpoint, slug);

        let response = match self
            .client
            .post(endpoint)
            .header("Referer", snapshot.url.as_str())
            .json(&question_query(&slug))
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                debug!("GraphQL query returned {}", response.status());
                return None;
            }
            Err(e) => {
                debug!("GraphQL query failed: {}", e);
                return None;
            }
        };

        match response.json::<Value>().await {
            Ok(body) => draft_from_response(body, &snapshot.url, &slug),
            Err(e) => {
                debug!("GraphQL response was not JSON: {}", e);
                None
            }
        }
    }
}

/// Request body asking for one question by slug
pub fn question_query(slug: &str) -> Value {
    json!({
        "operationName": "questionContent",
        "query": QUESTION_QUERY,
        "variables": { "titleSlug": slug },
    })
}

/// Turn a GraphQL response body into a draft; `None` when the question is absent
pub fn draft_from_response(body: Value, page_url: &Url, slug: &str) -> Option<ProblemDraft> {
    let response: GraphqlResponse = serde_json::from_value(body).ok()?;
    let question = response.data?.question?;

    let content = question.content.filter(|c| !c.trim().is_empty())?;
    let parsed = parse_content(&content);
    let title = question
        .title
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| title_from_slug(slug));

    Some(ProblemDraft {
        title,
        difficulty: normalize_difficulty_opt(question.difficulty.as_deref()),
        description: parsed.description,
        examples: parsed.examples,
        constraints: parsed.constraints,
        url: page_url.to_string(),
        slug: slug.to_string(),
        problem_number: question
            .question_frontend_id
            .unwrap_or_else(|| slug.to_string()),
    })
}
