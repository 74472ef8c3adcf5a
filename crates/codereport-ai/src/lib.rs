pub mod llm_factory;
pub mod llm_provider;
pub mod oracle;

// Cloud and local LLM providers
#[cfg(feature = "openai-compatible")]
pub mod openai_compatible_provider;
#[cfg(feature = "openai-llm")]
pub mod openai_llm_provider;

pub use llm_factory::LLMProviderFactory;
pub use llm_provider::*;
pub use oracle::*;
