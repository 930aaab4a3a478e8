//! Model serving endpoint configuration.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Configuration for a chat-completion endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Serving endpoint name, recorded on every row it touches
    #[serde(default)]
    pub endpoint_name: String,
    /// Workspace host, an OpenAI-compatible `/v1` base, or a full invocation URL
    #[serde(default = "default_endpoint_url")]
    pub endpoint_url: String,
    /// Bearer token for the endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,
    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Extra request body fields, merged verbatim into every request
    #[serde(default = "default_request_params")]
    pub request_params: Map<String, Value>,
}

fn default_endpoint_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_request_timeout_secs() -> u64 {
    300
}

pub fn default_request_params() -> Map<String, Value> {
    let mut params = Map::new();
    params.insert("max_tokens".to_string(), Value::from(4000));
    params.insert("temperature".to_string(), Value::from(0));
    params
}

/// Parse a timeout in whole seconds. Zero would fail every request, so it is
/// rejected along with anything unparsable.
pub(crate) fn parse_timeout_secs(value: &str) -> Option<u64> {
    value.trim().parse().ok().filter(|secs| *secs > 0)
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self::base_default().with_env_overrides()
    }
}

impl LlmConfig {
    /// Base default without env overrides.
    pub(crate) fn base_default() -> Self {
        Self {
            endpoint_name: String::new(),
            endpoint_url: default_endpoint_url(),
            api_token: None,
            request_timeout_secs: default_request_timeout_secs(),
            request_params: default_request_params(),
        }
    }

    /// Apply environment variable overrides.
    ///
    /// Supported env vars:
    /// - `SQLPORT_ENDPOINT_URL`: endpoint URL (falls back to `DATABRICKS_HOST`)
    /// - `SQLPORT_API_TOKEN`: bearer token (falls back to `DATABRICKS_TOKEN`, then `OPENAI_API_KEY`)
    /// - `SQLPORT_REQUEST_TIMEOUT_SECS`: per-request timeout
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(val) = std::env::var("SQLPORT_ENDPOINT_URL") {
            self.endpoint_url = val;
        } else if let Ok(host) = std::env::var("DATABRICKS_HOST") {
            self.endpoint_url = host;
        }

        if self.api_token.is_none() {
            self.api_token = ["SQLPORT_API_TOKEN", "DATABRICKS_TOKEN", "OPENAI_API_KEY"]
                .iter()
                .find_map(|key| std::env::var(key).ok().filter(|v| !v.is_empty()));
        }

        if let Some(secs) = std::env::var("SQLPORT_REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|val| parse_timeout_secs(&val))
        {
            self.request_timeout_secs = secs;
        }
        self
    }

    pub fn with_endpoint_name(mut self, name: &str) -> Self {
        self.endpoint_name = name.to_string();
        self
    }

    pub fn with_endpoint_url(mut self, url: &str) -> Self {
        self.endpoint_url = url.to_string();
        self
    }

    /// Whether requests use the OpenAI chat-completions route, which needs a
    /// `model` field in the body.
    pub fn is_openai_route(&self) -> bool {
        let url = self.endpoint_url.trim_end_matches('/');
        url.ends_with("/chat/completions") || url.ends_with("/v1")
    }

    /// Full URL requests are posted to.
    pub fn invocation_url(&self) -> String {
        let url = self.endpoint_url.trim_end_matches('/');
        if url.ends_with("/invocations") || url.ends_with("/chat/completions") {
            url.to_string()
        } else if url.ends_with("/v1") {
            format!("{}/chat/completions", url)
        } else {
            format!("{}/serving-endpoints/{}/invocations", url, self.endpoint_name)
        }
    }
}
