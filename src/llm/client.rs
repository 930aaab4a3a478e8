//! Chat-completion client.
//!
//! Speaks the OpenAI chat-completions wire format, which Databricks model
//! serving endpoints also accept.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::debug;

use super::config::LlmConfig;

/// Errors that can occur during endpoint calls.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("API error: {0}")]
    Api(String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Request timed out after {0}s")]
    Timeout(u64),
    #[error("Endpoint returned no code")]
    EmptyResponse,
}

/// One chat-completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub system: String,
    pub user: String,
    /// Extra body fields forwarded verbatim
    pub params: Map<String, Value>,
}

/// Text returned by the endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatResponse {
    pub content: String,
    /// Completion token usage, when the endpoint reports it
    pub completion_tokens: Option<u32>,
}

/// A model endpoint that answers chat requests.
#[async_trait]
pub trait ChatEndpoint: Send + Sync {
    /// Endpoint identifier recorded on each row it processes.
    fn name(&self) -> &str;

    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError>;
}

/// HTTP client for a serving endpoint.
pub struct LlmClient {
    config: LlmConfig,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct Message {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    completion_tokens: Option<u32>,
}

impl LlmClient {
    pub fn new(config: LlmConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| LlmError::Connection(e.to_string()))?;
        Ok(Self { config, client })
    }

    fn request_body(&self, request: &ChatRequest) -> Value {
        let mut body = request.params.clone();
        if self.config.is_openai_route() && !body.contains_key("model") {
            body.insert("model".into(), Value::from(self.config.endpoint_name.clone()));
        }
        body.insert(
            "messages".into(),
            json!([
                {"role": "system", "content": request.system},
                {"role": "user", "content": request.user},
            ]),
        );
        Value::Object(body)
    }
}

#[async_trait]
impl ChatEndpoint for LlmClient {
    fn name(&self) -> &str {
        &self.config.endpoint_name
    }

    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        let url = self.config.invocation_url();
        debug!("POST {} ({} chars)", url, request.user.len());

        let mut builder = self.client.post(&url).json(&self.request_body(request));
        if let Some(token) = &self.config.api_token {
            builder = builder.bearer_auth(token);
        }
        let resp = builder
            .send()
            .await
            .map_err(|e| LlmError::Connection(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(LlmError::Api(format!("HTTP {}: {}", status, body)));
        }

        let parsed: CompletionResponse = resp
            .json()
            .await
            .map_err(|e| LlmError::Parse(e.to_string()))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        Ok(ChatResponse {
            content,
            completion_tokens: parsed.usage.and_then(|u| u.completion_tokens),
        })
    }
}

static FENCED_PYTHON: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:python|py)[ \t]*\r?\n(.*?)```").expect("valid regex")
});

static FENCED_ANY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```[^\n`]*\r?\n(.*?)```").expect("valid regex"));

/// Pull the program out of a model reply.
///
/// Prefers a ```python fence, then any fence, then the whole reply. Returns
/// `EmptyResponse` when nothing is left.
pub fn extract_code(reply: &str) -> Result<String, LlmError> {
    let code = FENCED_PYTHON
        .captures(reply)
        .or_else(|| FENCED_ANY.captures(reply))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .unwrap_or(reply)
        .trim();

    if code.is_empty() {
        return Err(LlmError::EmptyResponse);
    }
    Ok(format!("{}\n", code))
}
