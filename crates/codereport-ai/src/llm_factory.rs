use crate::llm_provider::*;
use anyhow::{anyhow, Result};
use codereport_core::config_manager::LLMConfig;
use std::sync::Arc;

#[cfg(feature = "openai-llm")]
use crate::openai_llm_provider::{OpenAIConfig, OpenAIProvider};

#[cfg(feature = "openai-compatible")]
use crate::openai_compatible_provider::{OpenAICompatibleConfig, OpenAICompatibleProvider};

/// Factory for creating LLM providers based on configuration
pub struct LLMProviderFactory;

impl LLMProviderFactory {
    /// Create an LLM provider from configuration
    pub fn create_from_config(config: &LLMConfig) -> Result<Arc<dyn LLMProvider>> {
        let provider_name = config.provider.to_lowercase();

        match provider_name.as_str() {
            #[cfg(feature = "openai-llm")]
            "openai" => Self::create_openai_provider(config),
            #[cfg(feature = "openai-compatible")]
            "lmstudio" => Self::create_local_provider(config, OpenAICompatibleConfig::lm_studio),
            #[cfg(feature = "openai-compatible")]
            "ollama" => Self::create_local_provider(config, OpenAICompatibleConfig::ollama),
            #[cfg(feature = "openai-compatible")]
            "openai-compatible" => Self::create_openai_compatible_provider(config),
            _ => Err(anyhow!(
                "Unsupported LLM provider: {}. Available providers: {}",
                provider_name,
                Self::supported_providers().join(", ")
            )),
        }
    }

    /// Create an OpenAI provider
    #[cfg(feature = "openai-llm")]
    fn create_openai_provider(config: &LLMConfig) -> Result<Arc<dyn LLMProvider>> {
        let api_key = config
            .openai_api_key
            .clone()
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .ok_or_else(|| {
                anyhow!(
                    "OpenAI API key not found. Set 'openai_api_key' in config \
                     or OPENAI_API_KEY environment variable"
                )
            })?;

        let defaults = OpenAIConfig::default();
        let openai_config = OpenAIConfig {
            api_key,
            base_url: config.base_url.clone().unwrap_or(defaults.base_url),
            model: config.model.clone(),
            timeout_secs: config.timeout_secs,
            max_retries: config.max_retries,
            organization: defaults.organization,
        };

        Ok(Arc::new(OpenAIProvider::new(openai_config)?))
    }

    /// Create a provider for a local OpenAI-compatible server (LM Studio, Ollama)
    #[cfg(feature = "openai-compatible")]
    fn create_local_provider(
        config: &LLMConfig,
        preset: fn(String) -> OpenAICompatibleConfig,
    ) -> Result<Arc<dyn LLMProvider>> {
        let mut compat_config = preset(config.model.clone());
        if let Some(base_url) = &config.base_url {
            compat_config.base_url = base_url.trim_end_matches('/').to_string();
        }
        compat_config.timeout_secs = config.timeout_secs;
        compat_config.max_retries = config.max_retries;

        Ok(Arc::new(OpenAICompatibleProvider::new(compat_config)?))
    }

    /// Create an OpenAI-compatible provider for a custom endpoint
    #[cfg(feature = "openai-compatible")]
    fn create_openai_compatible_provider(config: &LLMConfig) -> Result<Arc<dyn LLMProvider>> {
        let base_url = config.base_url.clone().ok_or_else(|| {
            anyhow!("OpenAI-compatible base URL not found. Set 'base_url' in the [llm] config")
        })?;

        let mut compat_config = OpenAICompatibleConfig::custom(
            base_url.trim_end_matches('/').to_string(),
            config.model.clone(),
            "openai-compatible".to_string(),
        );
        compat_config.api_key = config.openai_api_key.clone();
        compat_config.timeout_secs = config.timeout_secs;
        compat_config.max_retries = config.max_retries;

        Ok(Arc::new(OpenAICompatibleProvider::new(compat_config)?))
    }

    /// Get a list of supported providers (based on enabled features)
    pub fn supported_providers() -> Vec<&'static str> {
        #[allow(unused_mut)]
        let mut providers = Vec::new();

        #[cfg(feature = "openai-llm")]
        providers.push("openai");

        #[cfg(feature = "openai-compatible")]
        providers.extend(["lmstudio", "ollama", "openai-compatible"]);

        providers
    }
}
