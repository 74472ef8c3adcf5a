use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Failed to read config: {0}")]
    ReadError(String),

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Main configuration for CodeReport
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CodeReportConfig {
    /// LLM used for every ranking and synthesis step
    #[serde(default)]
    pub llm: LLMConfig,

    /// Report shaping
    #[serde(default)]
    pub report: ReportConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// LLM configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMConfig {
    /// LLM provider: "openai", "openai-compatible", "lmstudio", "ollama"
    #[serde(default = "default_llm_provider")]
    pub provider: String,

    /// Model identifier (e.g., "gpt-4o" for OpenAI, "qwen2.5-coder:14b" for Ollama)
    #[serde(default = "default_model")]
    pub model: String,

    /// OpenAI API key
    #[serde(default)]
    pub openai_api_key: Option<String>,

    /// Base URL override; providers fall back to their own defaults
    #[serde(default)]
    pub base_url: Option<String>,

    /// Temperature for generation
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    /// Reasoning effort for reasoning models: "minimal", "low", "medium", "high"
    #[serde(default)]
    pub reasoning_effort: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Maximum retries for failed requests
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            model: default_model(),
            openai_api_key: None,
            base_url: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            reasoning_effort: None,
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

/// Report shaping configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Number of top-level subsystems described in the report
    #[serde(default = "default_num_critical_components")]
    pub num_critical_components: usize,

    /// Constructs highlighted per subsystem
    #[serde(default = "default_constructs_per_subsystem")]
    pub constructs_per_subsystem: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            num_critical_components: default_num_critical_components(),
            constructs_per_subsystem: default_constructs_per_subsystem(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "pretty", "json", "compact"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

// Default value functions
fn default_llm_provider() -> String {
    "openai".to_string()
}
fn default_model() -> String {
    "gpt-4o".to_string()
}
fn default_temperature() -> f32 {
    0.1
}
fn default_max_tokens() -> usize {
    4096
}
fn default_timeout_secs() -> u64 {
    120
}
fn default_max_retries() -> u32 {
    3
}
fn default_num_critical_components() -> usize {
    5
}
fn default_constructs_per_subsystem() -> usize {
    3
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "pretty".to_string()
}

const SUPPORTED_PROVIDERS: &[&str] = &["openai", "openai-compatible", "lmstudio", "ollama"];

/// Configuration manager with smart defaults
pub struct ConfigManager {
    config: CodeReportConfig,
    config_path: Option<PathBuf>,
}

impl ConfigManager {
    /// Load configuration with the following precedence:
    /// 1. Environment variables (.env file)
    /// 2. Config file (.codereport.toml)
    /// 3. Sensible defaults
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_dotenv();
        let (config, config_path) = Self::load_config_file()?;
        Self::finish(config, config_path)
    }

    /// Load from an explicit config file, still honouring env overrides
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        Self::load_dotenv();
        let config = Self::read_toml_file(path)?;
        Self::finish(config, Some(path.to_path_buf()))
    }

    fn finish(config: CodeReportConfig, config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let config = Self::apply_env_overrides(config);
        Self::validate_config(&config)?;

        match config_path {
            Some(ref path) => info!("Config file: {}", path.display()),
            None => info!("Config file: NONE (using defaults)"),
        }
        info!(
            provider = %config.llm.provider,
            model = %config.llm.model,
            components = config.report.num_critical_components,
            "Configuration loaded"
        );

        Ok(Self {
            config,
            config_path,
        })
    }

    /// Load .env file if it exists
    fn load_dotenv() {
        if Path::new(".env").exists() {
            if let Err(e) = dotenv::from_filename(".env") {
                warn!("Failed to load .env file: {}", e);
            }
            return;
        }

        if let Some(home) = dirs::home_dir() {
            let home_env = home.join(".codereport.env");
            if home_env.exists() {
                if let Err(e) = dotenv::from_path(&home_env) {
                    warn!("Failed to load .codereport.env: {}", e);
                }
            }
        }
    }

    /// Find and load config file
    /// Search order:
    /// 1. ./.codereport.toml (current directory)
    /// 2. ~/.codereport/config.toml (user config)
    /// 3. Use defaults
    fn load_config_file() -> Result<(CodeReportConfig, Option<PathBuf>), ConfigError> {
        let local_config = Path::new(".codereport.toml");
        if local_config.exists() {
            let config = Self::read_toml_file(local_config)?;
            return Ok((config, Some(local_config.to_path_buf())));
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".codereport").join("config.toml");
            if user_config.exists() {
                let config = Self::read_toml_file(&user_config)?;
                return Ok((config, Some(user_config)));
            }
        }

        Ok((CodeReportConfig::default(), None))
    }

    fn read_toml_file(path: &Path) -> Result<CodeReportConfig, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError(e.to_string()))?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    fn apply_env_overrides(config: CodeReportConfig) -> CodeReportConfig {
        Self::apply_overrides(config, |key| std::env::var(key).ok())
    }

    fn apply_overrides(
        mut config: CodeReportConfig,
        var: impl Fn(&str) -> Option<String>,
    ) -> CodeReportConfig {
        if let Some(provider) = var("CODEREPORT_LLM_PROVIDER").or_else(|| var("LLM_PROVIDER")) {
            config.llm.provider = provider;
        }
        if let Some(model) = var("CODEREPORT_MODEL") {
            config.llm.model = model;
        }
        if let Some(key) = var("OPENAI_API_KEY") {
            config.llm.openai_api_key = Some(key);
        }
        if let Some(url) = var("CODEREPORT_LLM_BASE_URL") {
            config.llm.base_url = Some(url);
        }
        if let Some(timeout) = var("CODEREPORT_TIMEOUT_SECS") {
            if let Ok(secs) = timeout.parse() {
                config.llm.timeout_secs = secs;
            }
        }
        if let Some(count) = var("CODEREPORT_NUM_COMPONENTS") {
            if let Ok(n) = count.parse() {
                config.report.num_critical_components = n;
            }
        }
        config
    }

    fn validate_config(config: &CodeReportConfig) -> Result<(), ConfigError> {
        let provider = config.llm.provider.to_lowercase();
        if !SUPPORTED_PROVIDERS.contains(&provider.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid LLM provider: {}. Must be one of: {}",
                config.llm.provider,
                SUPPORTED_PROVIDERS.join(", ")
            )));
        }

        if config.report.num_critical_components == 0 {
            return Err(ConfigError::ValidationError(
                "report.num_critical_components must be at least 1".to_string(),
            ));
        }

        if config.report.constructs_per_subsystem == 0 {
            return Err(ConfigError::ValidationError(
                "report.constructs_per_subsystem must be at least 1".to_string(),
            ));
        }

        match config.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                    other
                )))
            }
        }

        if let Some(effort) = &config.llm.reasoning_effort {
            if !matches!(effort.as_str(), "minimal" | "low" | "medium" | "high") {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid reasoning effort: {}. Must be one of: minimal, low, medium, high",
                    effort
                )));
            }
        }

        match config.logging.format.as_str() {
            "pretty" | "json" | "compact" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid log format: {}. Must be one of: pretty, json, compact",
                    other
                )))
            }
        }

        Ok(())
    }

    pub fn config(&self) -> &CodeReportConfig {
        &self.config
    }

    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    /// Create a default config file
    pub fn create_default_config(path: &Path) -> Result<(), ConfigError> {
        let config = CodeReportConfig::default();
        let toml_str =
            toml::to_string_pretty(&config).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::ReadError(e.to_string()))?;
        }

        std::fs::write(path, toml_str).map_err(|e| ConfigError::ReadError(e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = CodeReportConfig::default();
        assert_eq!(config.llm.provider, "openai");
        assert_eq!(config.llm.model, "gpt-4o");
        assert_eq!(config.report.num_critical_components, 5);
        assert_eq!(config.report.constructs_per_subsystem, 3);
    }

    #[test]
    fn test_config_validation() {
        let config = CodeReportConfig::default();
        assert!(ConfigManager::validate_config(&config).is_ok());

        let mut bad_provider = config.clone();
        bad_provider.llm.provider = "invalid".to_string();
        assert!(ConfigManager::validate_config(&bad_provider).is_err());

        let mut zero_components = config.clone();
        zero_components.report.num_critical_components = 0;
        assert!(ConfigManager::validate_config(&zero_components).is_err());

        let mut bad_level = config.clone();
        bad_level.logging.level = "loud".to_string();
        assert!(ConfigManager::validate_config(&bad_level).is_err());

        let mut bad_effort = config.clone();
        bad_effort.llm.reasoning_effort = Some("maximal".to_string());
        assert!(ConfigManager::validate_config(&bad_effort).is_err());

        let mut bad_format = config;
        bad_format.logging.format = "xml".to_string();
        assert!(ConfigManager::validate_config(&bad_format).is_err());
    }

    #[test]
    fn test_overrides_apply() {
        let vars: HashMap<&str, &str> = [
            ("CODEREPORT_LLM_PROVIDER", "ollama"),
            ("CODEREPORT_MODEL", "qwen2.5-coder:14b"),
            ("CODEREPORT_NUM_COMPONENTS", "7"),
            ("CODEREPORT_TIMEOUT_SECS", "not-a-number"),
        ]
        .into_iter()
        .collect();

        let config = ConfigManager::apply_overrides(CodeReportConfig::default(), |key| {
            vars.get(key).map(|v| v.to_string())
        });

        assert_eq!(config.llm.provider, "ollama");
        assert_eq!(config.llm.model, "qwen2.5-coder:14b");
        assert_eq!(config.report.num_critical_components, 7);
        assert_eq!(config.llm.timeout_secs, 120);
    }
}
