use crate::llm_provider::*;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const OPENAI_API_BASE: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o";

/// Configuration for OpenAI provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIConfig {
    /// API key for OpenAI
    pub api_key: String,
    /// Base URL for API (default: https://api.openai.com/v1)
    pub base_url: String,
    /// Model to use (e.g., "gpt-4o", "gpt-4.1", "o3-mini")
    pub model: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Maximum retries for failed requests
    pub max_retries: u32,
    /// Optional organization ID
    pub organization: Option<String>,
}

impl Default for OpenAIConfig {
    fn default() -> Self {
        Self {
            api_key: std::env::var("OPENAI_API_KEY").unwrap_or_default(),
            base_url: OPENAI_API_BASE.to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout_secs: 120,
            max_retries: 3,
            organization: std::env::var("OPENAI_ORG_ID").ok(),
        }
    }
}

/// OpenAI LLM provider using the Responses API
pub struct OpenAIProvider {
    config: OpenAIConfig,
    client: Client,
}

impl OpenAIProvider {
    /// Create a new OpenAI provider
    pub fn new(config: OpenAIConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(anyhow!(
                "OpenAI API key is required. Set OPENAI_API_KEY environment variable."
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { config, client })
    }

    /// Check if this is a reasoning model
    fn is_reasoning_model(&self) -> bool {
        let model = self.config.model.to_lowercase();
        model.starts_with("gpt-5") || model.starts_with('o')
    }

    /// Send a request to OpenAI Responses API with retry logic
    async fn send_request(
        &self,
        messages: &[Message],
        config: &GenerationConfig,
    ) -> Result<OpenAIResponse> {
        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s
                let delay = Duration::from_secs(2u64.pow(attempt - 1));
                tokio::time::sleep(delay).await;
            }

            match self.try_request(messages, config).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    last_error = Some(e);
                    if attempt < self.config.max_retries {
                        tracing::warn!(
                            "OpenAI request failed (attempt {}/{}), retrying...",
                            attempt + 1,
                            self.config.max_retries + 1
                        );
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow!("All retry attempts failed")))
    }

    fn build_request(&self, messages: &[Message], config: &GenerationConfig) -> OpenAIRequest {
        let instructions = messages
            .iter()
            .find(|m| matches!(m.role, MessageRole::System))
            .map(|m| m.content.clone());

        let input = messages
            .iter()
            .filter(|m| !matches!(m.role, MessageRole::System))
            .map(|m| format!("{}: {}", m.role, m.content))
            .collect::<Vec<_>>()
            .join("\n\n");

        // OpenAI Responses API uses text.format instead of response_format
        let text = config
            .response_format
            .clone()
            .map(|rf| TextConfig { format: rf.into() });

        let mut request = OpenAIRequest {
            model: self.config.model.clone(),
            input,
            instructions,
            max_output_tokens: config.max_tokens,
            reasoning: None,
            temperature: None,
            text,
        };

        // Only add sampling parameters for non-reasoning models
        if self.is_reasoning_model() {
            request.reasoning = config
                .reasoning_effort
                .as_ref()
                .map(|effort| Reasoning {
                    effort: effort.clone(),
                });
        } else {
            request.temperature = Some(config.temperature);
        }

        request
    }

    /// Try a single request to OpenAI Responses API
    async fn try_request(
        &self,
        messages: &[Message],
        config: &GenerationConfig,
    ) -> Result<OpenAIResponse> {
        let request = self.build_request(messages, config);

        let mut request_builder = self
            .client
            .post(format!("{}/responses", self.config.base_url))
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json")
            .json(&request);

        if let Some(org) = &self.config.organization {
            request_builder = request_builder.header("OpenAI-Organization", org);
        }

        let response = request_builder
            .send()
            .await
            .context("Failed to send request to OpenAI Responses API")?;

        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());

            return Err(anyhow!("OpenAI API error ({}): {}", status, error_text));
        }

        let response_text = response
            .text()
            .await
            .context("Failed to read OpenAI Responses API response body")?;

        tracing::trace!(
            model = %self.config.model,
            response = %response_text,
            "Raw OpenAI Responses API response"
        );

        serde_json::from_str::<OpenAIResponse>(&response_text).context(format!(
            "Failed to parse OpenAI Responses API response. Raw response: {}",
            response_text
        ))
    }
}

#[async_trait]
impl LLMProvider for OpenAIProvider {
    async fn generate_chat(
        &self,
        messages: &[Message],
        config: &GenerationConfig,
    ) -> LLMResult<LLMResponse> {
        let response = self.send_request(messages, config).await?;

        Ok(LLMResponse {
            content: response.output_text(),
            total_tokens: response.usage.as_ref().map(|u| u.total_tokens),
            prompt_tokens: response.usage.as_ref().map(|u| u.input_tokens),
            completion_tokens: response.usage.as_ref().map(|u| u.output_tokens),
            finish_reason: response.status.clone(),
            model: self.config.model.clone(),
        })
    }

    fn provider_name(&self) -> &str {
        "openai"
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

// OpenAI Responses API request/response types

#[derive(Debug, Serialize)]
struct Reasoning {
    effort: String,
}

#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    input: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    instructions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reasoning: Option<Reasoning>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<TextConfig>,
}

/// OpenAI Responses API text format - flattened structure
/// OpenAI expects: {"type": "json_schema", "name": "...", "schema": {...}, "strict": true}
/// NOT: {"type": "json_schema", "json_schema": {...}}
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum OpenAITextFormat {
    JsonSchema {
        name: String,
        schema: serde_json::Value,
        strict: bool,
    },
}

impl From<ResponseFormat> for OpenAITextFormat {
    fn from(rf: ResponseFormat) -> Self {
        match rf {
            ResponseFormat::JsonSchema { json_schema } => OpenAITextFormat::JsonSchema {
                name: json_schema.name,
                schema: json_schema.schema,
                strict: json_schema.strict,
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct TextConfig {
    format: OpenAITextFormat,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    output: Vec<OutputItem>,
    #[serde(default)]
    usage: Option<OpenAIUsage>,
}

impl OpenAIResponse {
    /// Concatenated `output_text` parts of every message item
    fn output_text(&self) -> String {
        self.output
            .iter()
            .filter(|item| item.output_type == "message")
            .flat_map(|item| &item.content)
            .filter(|c| c.content_type == "output_text")
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Deserialize)]
struct OutputItem {
    #[serde(rename = "type")]
    output_type: String,
    #[serde(default)]
    content: Vec<OutputContent>,
}

#[derive(Debug, Deserialize)]
struct OutputContent {
    #[serde(rename = "type")]
    content_type: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct OpenAIUsage {
    input_tokens: usize,
    output_tokens: usize,
    total_tokens: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(model: &str) -> OpenAIProvider {
        OpenAIProvider::new(OpenAIConfig {
            api_key: "test".to_string(),
            model: model.to_string(),
            organization: None,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_provider_creation_requires_api_key() {
        let config = OpenAIConfig {
            api_key: String::new(),
            ..Default::default()
        };
        assert!(OpenAIProvider::new(config).is_err());
    }

    #[test]
    fn test_reasoning_model_detection() {
        assert!(provider("o3-mini").is_reasoning_model());
        assert!(provider("gpt-5.1").is_reasoning_model());
        assert!(!provider("gpt-4o").is_reasoning_model());
    }

    #[test]
    fn test_request_splits_instructions_and_input() {
        let messages = vec![
            Message {
                role: MessageRole::System,
                content: "You are an expert software architect.".to_string(),
            },
            Message {
                role: MessageRole::User,
                content: "Component c1 - 'Parser'".to_string(),
            },
        ];
        let request = provider("gpt-4o").build_request(&messages, &GenerationConfig::default());

        assert_eq!(
            request.instructions.as_deref(),
            Some("You are an expert software architect.")
        );
        assert_eq!(request.input, "user: Component c1 - 'Parser'");
        assert_eq!(request.temperature, Some(0.1));
        assert!(request.reasoning.is_none());
    }

    #[test]
    fn test_reasoning_model_request_carries_effort() {
        let config = GenerationConfig {
            reasoning_effort: Some("low".to_string()),
            ..Default::default()
        };
        let messages = vec![Message {
            role: MessageRole::User,
            content: "snippets".to_string(),
        }];

        let json = serde_json::to_value(provider("o3-mini").build_request(&messages, &config)).unwrap();
        assert_eq!(json["reasoning"]["effort"], "low");
        assert!(json.get("temperature").is_none());
    }

    #[test]
    fn text_format_flattens_json_schema() {
        let response_format = ResponseFormat::JsonSchema {
            json_schema: JsonSchema {
                name: "test_schema".to_string(),
                schema: serde_json::json!({"type": "object"}),
                strict: true,
            },
        };

        let text_config = TextConfig {
            format: response_format.into(),
        };

        let json = serde_json::to_string(&text_config).unwrap();

        assert!(json.contains("\"name\":\"test_schema\""));
        assert!(json.contains("\"strict\":true"));
        assert!(json.contains("\"type\":\"json_schema\""));
        assert!(
            !json.contains("\"json_schema\":{"),
            "Should not have nested json_schema object"
        );
    }

    #[test]
    fn test_output_text_joins_message_parts() {
        let raw = r#"{
            "status": "completed",
            "output": [
                {"type": "reasoning", "content": []},
                {"type": "message", "content": [{"type": "output_text", "text": "{\"title\":"}]},
                {"type": "message", "content": [{"type": "output_text", "text": "\"X\"}"}]}
            ],
            "usage": {"input_tokens": 10, "output_tokens": 5, "total_tokens": 15}
        }"#;

        let response: OpenAIResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(response.output_text(), "{\"title\":\n\"X\"}");
        assert_eq!(response.usage.unwrap().total_tokens, 15);
    }
}
