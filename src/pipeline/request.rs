//! Bounded endpoint calls that always produce a row update.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tracing::debug;

use crate::analysis::TokenCounter;
use crate::llm::{extract_code, ChatEndpoint, ChatRequest, LlmError};
use crate::models::RowErrorKind;
use crate::repository::ResultUpdate;

/// Sends requests to one endpoint with a timeout and turns every outcome,
/// including failures, into a [`ResultUpdate`].
#[derive(Clone)]
pub struct Requester {
    endpoint: Arc<dyn ChatEndpoint>,
    params: Map<String, Value>,
    timeout: Duration,
    counter: Arc<TokenCounter>,
}

impl Requester {
    pub fn new(
        endpoint: Arc<dyn ChatEndpoint>,
        params: Map<String, Value>,
        timeout: Duration,
        counter: Arc<TokenCounter>,
    ) -> Self {
        Self {
            endpoint,
            params,
            timeout,
            counter,
        }
    }

    pub fn endpoint_name(&self) -> &str {
        self.endpoint.name()
    }

    pub async fn request(&self, system: &str, user: &str) -> ResultUpdate {
        let request = ChatRequest {
            system: system.to_string(),
            user: user.to_string(),
            params: self.params.clone(),
        };

        let reply = match tokio::time::timeout(self.timeout, self.endpoint.complete(&request)).await
        {
            Ok(result) => result,
            Err(_) => Err(LlmError::Timeout(self.timeout.as_secs())),
        };

        match reply.and_then(|response| {
            debug!(
                "{} replied ({:?} completion tokens)",
                self.endpoint.name(),
                response.completion_tokens
            );
            extract_code(&response.content)
        }) {
            Ok(code) => {
                let tokens = i32::try_from(self.counter.count(&code)).unwrap_or(i32::MAX);
                ResultUpdate::converted(code, tokens)
            }
            Err(e) => ResultUpdate::failed(RowErrorKind::Endpoint.message(e)),
        }
    }
}
