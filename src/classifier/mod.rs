//! LLM-backed classifier used for tool naming and endpoint grouping.
//!
//! Speaks the OpenAI-compatible `chat/completions` protocol, so any provider
//! exposing that surface works when `LLM`, `LLM_ENDPOINT` and `LLM_API_KEY`
//! are set.

mod prompts;

use futures::future::BoxFuture;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

use prompts::{GROUP_SYSTEM_PROMPT, NAME_SYSTEM_PROMPT};

/// Request bodies longer than this are cut before being sent to the classifier.
pub const BODY_PREFIX_LIMIT: usize = 500;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

static TOOL_NAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z0-9_]+$").expect("valid regex"));

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("classifier request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("classifier returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("classifier returned no content")]
    EmptyResponse,

    #[error("classifier returned an invalid tool name: {0:?}")]
    InvalidName(String),

    #[error("failed to decode classifier output: {0}")]
    Decode(#[from] serde_json::Error),
}

/// What the naming classifier sees about an endpoint.
#[derive(Debug, Clone, Copy)]
pub struct NameRequest<'a> {
    pub method: &'a str,
    pub path: &'a str,
    pub body: &'a str,
    pub headers: &'a BTreeMap<String, String>,
}

/// One tool as presented to the grouping classifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupCandidate {
    pub name: String,
    pub method: String,
    pub path: String,
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct GroupPlan {
    #[serde(default)]
    pub groups: Vec<PlannedGroup>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PlannedGroup {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tool_names: Vec<String>,
}

/// Naming and grouping service. Any error means "fall back".
pub trait Classifier: Send + Sync {
    fn name_tool<'a>(&'a self, request: NameRequest<'a>) -> BoxFuture<'a, Result<String, ClassifierError>>;

    fn group_tools<'a>(
        &'a self,
        tools: &'a [GroupCandidate],
    ) -> BoxFuture<'a, Result<GroupPlan, ClassifierError>>;
}

/// Connection settings for the chat-completions endpoint.
#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub model: String,
    pub endpoint: String,
    pub api_key: String,
}

pub struct LlmClient {
    http: reqwest::Client,
    settings: LlmSettings,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

impl LlmClient {
    pub fn new(settings: LlmSettings) -> Result<Self, ClassifierError> {
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { http, settings })
    }

    async fn chat(&self, system: &str, user: &str, temperature: f32) -> Result<String, ClassifierError> {
        let url = format!(
            "{}/chat/completions",
            self.settings.endpoint.trim_end_matches('/')
        );

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.settings.api_key)
            .json(&json!({
                "model": self.settings.model,
                "temperature": temperature,
                "messages": [
                    { "role": "system", "content": system },
                    { "role": "user", "content": user },
                ],
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClassifierError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(ClassifierError::EmptyResponse)
    }
}

impl Classifier for LlmClient {
    fn name_tool<'a>(&'a self, request: NameRequest<'a>) -> BoxFuture<'a, Result<String, ClassifierError>> {
        Box::pin(async move {
            let prompt = name_prompt(&request);
            let reply = self.chat(NAME_SYSTEM_PROMPT, &prompt, 0.0).await?;
            validate_tool_name(&reply)
        })
    }

    fn group_tools<'a>(
        &'a self,
        tools: &'a [GroupCandidate],
    ) -> BoxFuture<'a, Result<GroupPlan, ClassifierError>> {
        Box::pin(async move {
            let listing = serde_json::to_string_pretty(tools)?;
            let prompt = format!("Analyze and group these API tools:\n{listing}");
            let reply = self.chat(GROUP_SYSTEM_PROMPT, &prompt, 0.1).await?;
            parse_group_plan(&reply)
        })
    }
}

fn name_prompt(request: &NameRequest<'_>) -> String {
    let headers = request
        .headers
        .iter()
        .map(|(k, v)| format!("{k}: {v}"))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "HTTP Method: {}\nPath: {}\nRequest Body: {}\nHeaders: {}\nGenerate a descriptive tool name for this API endpoint.",
        request.method,
        request.path,
        body_prefix(request.body),
        headers
    )
}

/// Longest prefix of `body` within [`BODY_PREFIX_LIMIT`] bytes, on a char boundary.
pub fn body_prefix(body: &str) -> &str {
    if body.len() <= BODY_PREFIX_LIMIT {
        return body;
    }
    let mut end = BODY_PREFIX_LIMIT;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}

pub fn validate_tool_name(reply: &str) -> Result<String, ClassifierError> {
    let name = reply.trim();
    if TOOL_NAME_RE.is_match(name) {
        Ok(name.to_string())
    } else {
        Err(ClassifierError::InvalidName(name.to_string()))
    }
}

/// Decode a grouping reply, tolerating a surrounding Markdown code fence.
pub fn parse_group_plan(reply: &str) -> Result<GroupPlan, ClassifierError> {
    let trimmed = reply.trim();
    let json = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.trim_end().strip_suffix("```"))
        .unwrap_or(trimmed);

    Ok(serde_json::from_str(json.trim())?)
}
