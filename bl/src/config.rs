//! Benchloop configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::RunMode;
use crate::llm::{DecodingConfig, RetryPolicy};
use crate::r#loop::LoopConfig;
use crate::quality::QualityWeights;
use crate::tools::{ToolKind, ToolLimits};

/// System prompt used when the config names none
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a software engineering agent working inside a repository checkout. \
Inspect the workspace with the tools you are given, make the requested change, and finish by calling \
`submit` with the final artifact. For patch tasks the artifact is a unified diff against the repository root.";

/// Main benchloop configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Generation endpoint configuration
    pub llm: LlmConfig,

    /// Turn loop budgets and tool policy
    pub runtime: RuntimeConfig,

    /// Limits applied by the sandboxed tools
    pub tools: ToolLimits,

    /// Tool-quality scoring
    #[serde(rename = "tool-quality")]
    pub tool_quality: ToolQualityConfig,

    /// Decoding overrides sent with every request
    pub decoding: DecodingConfig,

    /// System prompt source
    pub prompt: PromptConfig,

    /// Log level (trace, debug, info, warn, error)
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,
}

impl Config {
    /// Validate configuration before use
    pub fn validate(&self) -> Result<()> {
        self.tool_quality.weights.validate()?;
        if self.prompt.system.is_some() && self.prompt.system_file.is_some() {
            return Err(eyre::eyre!("prompt: set either 'system' or 'system-file', not both"));
        }
        if self.runtime.termination_tool.trim().is_empty() {
            return Err(eyre::eyre!("runtime: termination-tool must not be empty"));
        }
        if ToolKind::from_name(&self.runtime.termination_tool).is_none() {
            return Err(eyre::eyre!(
                "runtime: unknown termination-tool '{}'",
                self.runtime.termination_tool
            ));
        }
        if self.tools.search_max_matches == 0 {
            return Err(eyre::eyre!("tools: search-max-matches must be at least 1"));
        }
        Ok(())
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .benchloop.yml
        let local_config = PathBuf::from(".benchloop.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/benchloop/benchloop.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("benchloop").join("benchloop.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Resolve the system prompt text
    pub fn system_prompt(&self) -> Result<String> {
        match (&self.prompt.system, &self.prompt.system_file) {
            (Some(text), None) => Ok(text.clone()),
            (None, Some(path)) => {
                fs::read_to_string(path).context(format!("Failed to read system prompt from {}", path.display()))
            }
            (None, None) => Ok(DEFAULT_SYSTEM_PROMPT.to_string()),
            (Some(_), Some(_)) => Err(eyre::eyre!("prompt: set either 'system' or 'system-file', not both")),
        }
    }
}

/// Generation endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider name ("openrouter" or "no-tool")
    pub provider: String,

    /// Model identifier
    pub model: String,

    /// Environment variable containing the API key
    #[serde(rename = "api-key-env")]
    pub api_key_env: String,

    /// API base URL
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,

    /// Retries after the first attempt
    #[serde(rename = "max-retries")]
    pub max_retries: u32,

    #[serde(rename = "initial-backoff-ms")]
    pub initial_backoff_ms: u64,

    #[serde(rename = "max-backoff-ms")]
    pub max_backoff_ms: u64,

    /// Seed for reproducible backoff jitter
    #[serde(rename = "jitter-seed")]
    pub jitter_seed: Option<u64>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openrouter".to_string(),
            model: "qwen2.5-coder-0.5b-instruct".to_string(),
            api_key_env: "OPENROUTER_API_KEY".to_string(),
            base_url: "https://openrouter.ai/api/v1".to_string(),
            timeout_ms: 60_000,
            max_retries: 8,
            initial_backoff_ms: 1000,
            max_backoff_ms: 10_000,
            jitter_seed: None,
        }
    }
}

impl LlmConfig {
    /// Read the API key from the configured environment variable
    pub fn get_api_key(&self) -> Result<String> {
        match std::env::var(&self.api_key_env) {
            Ok(key) if !key.trim().is_empty() => Ok(key),
            _ => Err(eyre::eyre!(
                "API key not found. Set the {} environment variable.",
                self.api_key_env
            )),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_retries,
            Duration::from_millis(self.initial_backoff_ms),
            Duration::from_millis(self.max_backoff_ms),
        )
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Turn loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub mode: RunMode,

    #[serde(rename = "max-tool-calls")]
    pub max_tool_calls: u32,

    #[serde(rename = "max-wall-time-s")]
    pub max_wall_time_s: u64,

    /// Tool whose acceptance ends the loop
    #[serde(rename = "termination-tool")]
    pub termination_tool: String,

    /// Tools offered in tools_enabled mode (all tools when absent)
    #[serde(rename = "allowed-tools")]
    pub allowed_tools: Option<Vec<String>>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            mode: RunMode::PatchOnly,
            max_tool_calls: 20,
            max_wall_time_s: 600,
            termination_tool: "submit".to_string(),
            allowed_tools: None,
        }
    }
}

impl RuntimeConfig {
    /// Loop settings for the given mode
    ///
    /// Patch-only runs may only submit; tools-enabled runs use the configured
    /// allow-list, or every builtin tool.
    pub fn loop_config(&self, mode: RunMode) -> LoopConfig {
        let allowed_tools = match mode {
            RunMode::PatchOnly => Some(HashSet::from([self.termination_tool.clone()])),
            RunMode::ToolsEnabled => Some(match &self.allowed_tools {
                Some(names) => names.iter().cloned().collect::<HashSet<_>>(),
                None => ToolKind::ALL.iter().map(|kind| kind.name().to_string()).collect(),
            }),
        };
        LoopConfig {
            max_tool_calls: self.max_tool_calls,
            max_wall_time: Duration::from_secs(self.max_wall_time_s),
            termination_tool: self.termination_tool.clone(),
            allowed_tools,
            mode,
        }
    }
}

/// Tool-quality scoring configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolQualityConfig {
    pub enabled: bool,
    pub weights: QualityWeights,
}

impl Default for ToolQualityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            weights: QualityWeights::default(),
        }
    }
}

/// System prompt source
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptConfig {
    /// Inline prompt text
    pub system: Option<String>,

    /// File holding the prompt text
    #[serde(rename = "system-file")]
    pub system_file: Option<PathBuf>,
}
