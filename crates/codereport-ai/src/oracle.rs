//! Structured-completion oracle.
//!
//! Every "ask the model" step goes through [`StructuredOracle::complete`]: a
//! system instruction, a user context and a JSON-schema output contract in,
//! a JSON object out. The value is untrusted; callers decode it with
//! [`decode_output`] and re-check ranges and memberships themselves.

use crate::llm_provider::{GenerationConfig, JsonSchema, LLMProvider, Message, MessageRole, ResponseFormat};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum OracleError {
    #[error("{request}: provider request failed: {message}")]
    Provider { request: String, message: String },

    #[error("{request}: response carried no structured output")]
    NoStructuredOutput { request: String },

    #[error("{request}: structured output violates its contract: {reason}")]
    Contract { request: String, reason: String },
}

pub type OracleResult<T> = std::result::Result<T, OracleError>;

/// One structured-completion call
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Stable request name, used for logging and as the schema name
    pub name: String,
    pub system: String,
    pub user: String,
    pub output_schema: Value,
}

impl CompletionRequest {
    pub fn new(
        name: impl Into<String>,
        system: impl Into<String>,
        user: impl Into<String>,
        output_schema: Value,
    ) -> Self {
        Self {
            name: name.into(),
            system: system.into(),
            user: user.into(),
            output_schema,
        }
    }
}

#[async_trait]
pub trait StructuredOracle: Send + Sync {
    /// Run one completion. `Ok` always holds a JSON object.
    async fn complete(&self, request: &CompletionRequest) -> OracleResult<Value>;
}

/// Oracle backed by any [`LLMProvider`], enforcing the schema as a strict
/// response format
pub struct LlmOracle {
    provider: Arc<dyn LLMProvider>,
    generation: GenerationConfig,
}

impl LlmOracle {
    pub fn new(provider: Arc<dyn LLMProvider>) -> Self {
        Self {
            provider,
            generation: GenerationConfig::default(),
        }
    }

    pub fn with_generation_config(mut self, generation: GenerationConfig) -> Self {
        self.generation = generation;
        self
    }

    fn generation_for(&self, request: &CompletionRequest) -> GenerationConfig {
        let mut config = self.generation.clone();
        config.response_format = Some(ResponseFormat::JsonSchema {
            json_schema: JsonSchema {
                name: request.name.replace('-', "_"),
                schema: request.output_schema.clone(),
                strict: true,
            },
        });
        config
    }
}

#[async_trait]
impl StructuredOracle for LlmOracle {
    async fn complete(&self, request: &CompletionRequest) -> OracleResult<Value> {
        let messages = vec![
            Message {
                role: MessageRole::System,
                content: request.system.clone(),
            },
            Message {
                role: MessageRole::User,
                content: request.user.clone(),
            },
        ];

        debug!(
            request = %request.name,
            provider = self.provider.provider_name(),
            model = self.provider.model_name(),
            context_chars = request.user.len(),
            "Sending structured completion"
        );

        let response = self
            .provider
            .generate_chat(&messages, &self.generation_for(request))
            .await
            .map_err(|e| OracleError::Provider {
                request: request.name.clone(),
                message: format!("{:#}", e),
            })?;

        debug!(
            request = %request.name,
            total_tokens = ?response.total_tokens,
            finish_reason = ?response.finish_reason,
            "Structured completion finished"
        );

        parse_structured_output(&response.content).ok_or_else(|| OracleError::NoStructuredOutput {
            request: request.name.clone(),
        })
    }
}

/// Parse model text as a JSON object, tolerating a surrounding markdown fence
pub fn parse_structured_output(content: &str) -> Option<Value> {
    let trimmed = content.trim();
    let body = trimmed
        .strip_prefix("```")
        .and_then(|rest| rest.strip_suffix("```"))
        .map(|inner| inner.trim_start_matches("json").trim())
        .unwrap_or(trimmed);

    match serde_json::from_str::<Value>(body) {
        Ok(value @ Value::Object(_)) => Some(value),
        _ => None,
    }
}

/// Decode an oracle value into its typed output shape
pub fn decode_output<T: DeserializeOwned>(request: &str, value: Value) -> OracleResult<T> {
    serde_json::from_value(value).map_err(|e| OracleError::Contract {
        request: request.to_string(),
        reason: e.to_string(),
    })
}
