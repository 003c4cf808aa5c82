use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use scout_core::{EarlyStopping, ExecutorConfig};
use scout_tools::persist::{DEFAULT_JSON_STORE, DEFAULT_TEXT_LOG};
use scout_tools::{HttpConfig, PersistConfig};

/// Environment variable consulted when no API key is configured.
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

const ENV_PREFIX: &str = "SCOUT_";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub provider: ProviderSection,

    #[serde(default)]
    pub agent: AgentSection,

    #[serde(default)]
    pub tools: ToolsSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSection {
    /// Gemini API key (falls back to GEMINI_API_KEY)
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default)]
    pub base_url: Option<String>,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for ProviderSection {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: None,
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

fn default_model() -> String {
    scout_providers::gemini::DEFAULT_MODEL.to_string()
}

fn default_temperature() -> f32 {
    0.3
}

fn default_max_tokens() -> u32 {
    4096
}

/// Budgets for the research loop
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSection {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    #[serde(default = "default_max_execution_time")]
    pub max_execution_time_secs: u64,

    #[serde(default)]
    pub early_stopping: EarlyStopping,

    /// Grace period for the final answer request after a budget stop
    #[serde(default = "default_final_answer_timeout")]
    pub final_answer_timeout_secs: u64,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            max_execution_time_secs: default_max_execution_time(),
            early_stopping: EarlyStopping::default(),
            final_answer_timeout_secs: default_final_answer_timeout(),
        }
    }
}

fn default_max_iterations() -> usize {
    scout_core::DEFAULT_MAX_ITERATIONS
}

fn default_max_execution_time() -> u64 {
    scout_core::DEFAULT_MAX_EXECUTION_TIME.as_secs()
}

fn default_final_answer_timeout() -> u64 {
    scout_core::DEFAULT_FINAL_ANSWER_TIMEOUT.as_secs()
}

/// Tools configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsSection {
    /// Fixed delay before every outbound request
    #[serde(default = "default_min_delay_ms")]
    pub min_delay_ms: u64,

    /// Upper bound of the random delay added on top
    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Text log used by save_text_to_file (supports ~)
    #[serde(default = "default_text_log")]
    pub text_log: String,

    /// JSON store used by save_json_to_file (supports ~)
    #[serde(default = "default_json_store")]
    pub json_store: String,

    #[serde(default)]
    pub user_agent: Option<String>,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            min_delay_ms: default_min_delay_ms(),
            jitter_ms: default_jitter_ms(),
            request_timeout_secs: default_request_timeout(),
            text_log: default_text_log(),
            json_store: default_json_store(),
            user_agent: None,
        }
    }
}

fn default_min_delay_ms() -> u64 {
    1000
}

fn default_jitter_ms() -> u64 {
    1000
}

fn default_request_timeout() -> u64 {
    15
}

fn default_text_log() -> String {
    DEFAULT_TEXT_LOG.to_string()
}

fn default_json_store() -> String {
    DEFAULT_JSON_STORE.to_string()
}

/// Expand a leading `~` to the home directory.
pub fn expand_path(path: &str) -> PathBuf {
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    } else if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

impl Config {
    /// Load defaults, then the config file, then `SCOUT_` environment overrides.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        let mut config = Self::from_figment(Self::figment(&config_path, ENV_PREFIX))
            .with_context(|| format!("Invalid configuration in {}", config_path.display()))?;
        config.fill_api_key_from_env();
        Ok(config)
    }

    /// Layered sources; nested keys in the environment use `__`.
    pub fn figment(config_path: &Path, env_prefix: &str) -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(config_path))
            .merge(Env::prefixed(env_prefix).split("__"))
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        Ok(figment.extract()?)
    }

    fn fill_api_key_from_env(&mut self) {
        let configured = self
            .provider
            .api_key
            .as_deref()
            .is_some_and(|key| !key.trim().is_empty());
        if !configured {
            self.provider.api_key = std::env::var(API_KEY_ENV)
                .ok()
                .filter(|key| !key.trim().is_empty());
        }
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    pub fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        Ok(config_dir.join("scout"))
    }

    pub fn api_key(&self) -> Result<&str> {
        self.provider
            .api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "No Gemini API key configured. Set {} or add api_key under [provider] in {}",
                    API_KEY_ENV,
                    Self::config_path()
                        .map(|p| p.display().to_string())
                        .unwrap_or_else(|_| "~/.config/scout/config.toml".to_string())
                )
            })
    }

    /// The API key for display: first and last four characters only.
    pub fn masked_api_key(&self) -> String {
        match self.provider.api_key.as_deref() {
            None => "(not set)".to_string(),
            Some(key) => mask_key(key),
        }
    }

    pub fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig::default()
            .with_max_iterations(self.agent.max_iterations)
            .with_max_execution_time(Duration::from_secs(self.agent.max_execution_time_secs))
            .with_early_stopping(self.agent.early_stopping)
            .with_final_answer_timeout(Duration::from_secs(self.agent.final_answer_timeout_secs))
            .with_model(self.provider.model.clone())
            .with_temperature(self.provider.temperature)
            .with_max_tokens(self.provider.max_tokens)
    }

    pub fn http_config(&self) -> HttpConfig {
        let mut http = HttpConfig::new()
            .with_min_delay(Duration::from_millis(self.tools.min_delay_ms))
            .with_jitter(Duration::from_millis(self.tools.jitter_ms))
            .with_timeout(Duration::from_secs(self.tools.request_timeout_secs));
        if let Some(agent) = &self.tools.user_agent {
            http = http.with_user_agent(agent.clone());
        }
        http
    }

    pub fn persist_config(&self) -> PersistConfig {
        PersistConfig {
            text_log: expand_path(&self.tools.text_log),
            json_store: expand_path(&self.tools.json_store),
        }
    }
}

fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 12 {
        return "****".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}
