//! Chat-completion client for model serving endpoints.

mod client;
mod config;
pub mod prompts;

pub use client::{extract_code, ChatEndpoint, ChatRequest, ChatResponse, LlmClient, LlmError};
pub use config::{default_request_params, LlmConfig};
