//! Application configuration.
//!
//! Loaded from a TOML file (every field has a default, so a missing file is
//! not an error unless the path was given explicitly) and then overlaid with
//! credentials from the environment.

use crate::request::DEFAULT_SUBREDDITS;
use crate::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

pub const DEFAULT_CONFIG_FILE: &str = "snooze.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub reddit: RedditConfig,
    pub llm: LlmConfig,
    pub cache: CacheConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedditConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub user_agent: String,
    pub default_subreddits: Vec<String>,
    /// Posts from these communities skip the keyword check.
    pub always_relevant_subreddits: Vec<String>,
    pub relevance_keywords: Vec<String>,
    pub comments_per_post: usize,
    pub requests_per_minute: u32,
    pub burst_allowance: u32,
    pub max_retries: u32,
}

impl Default for RedditConfig {
    fn default() -> Self {
        let defaults: Vec<String> = DEFAULT_SUBREDDITS.iter().map(|s| s.to_string()).collect();
        Self {
            client_id: None,
            client_secret: None,
            user_agent: "snooze/0.1.0".to_string(),
            always_relevant_subreddits: defaults.clone(),
            default_subreddits: defaults,
            relevance_keywords: [
                "copilot",
                "claude",
                "chatgpt",
                "cursor",
                "coding",
                "code",
                "programming",
                "debug",
                "script",
                "ai assistant",
                "coding assistant",
                "pair programming",
                "code generation",
                "autocomplete",
                "intellisense",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            comments_per_post: 10,
            requests_per_minute: 100,
            burst_allowance: 10,
            max_retries: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// `azure` or `openai`
    pub provider: String,
    pub api_key: Option<String>,
    pub endpoint: String,
    pub deployment: String,
    pub api_version: String,
    pub max_concurrent: usize,
    pub max_retries: u32,
    pub request_timeout_secs: u64,
    pub max_completion_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "azure".to_string(),
            api_key: None,
            endpoint: String::new(),
            deployment: String::new(),
            api_version: "2024-12-01-preview".to_string(),
            max_concurrent: 5,
            max_retries: 1,
            request_timeout_secs: 120,
            max_completion_tokens: 16384,
        }
    }
}

impl LlmConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub database_url: String,
    /// Unset by default: a post summary stays valid until a forced refresh.
    pub post_summary_max_age_hours: Option<u64>,
    pub posts_max_age_hours: Option<u64>,
    pub discussion_max_age_hours: Option<u64>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://data/snooze-cache.db".to_string(),
            post_summary_max_age_hours: None,
            posts_max_age_hours: Some(6),
            discussion_max_age_hours: Some(144),
        }
    }
}

fn hours(value: Option<u64>) -> Option<Duration> {
    value.map(|h| Duration::from_secs(h * 3600))
}

impl CacheConfig {
    pub fn post_summary_max_age(&self) -> Option<Duration> {
        hours(self.post_summary_max_age_hours)
    }

    pub fn posts_max_age(&self) -> Option<Duration> {
        hours(self.posts_max_age_hours)
    }

    pub fn discussion_max_age(&self) -> Option<Duration> {
        hours(self.discussion_max_age_hours)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Capacity of the live event channel, and the number of events kept
    /// per async run for late subscribers.
    pub event_buffer: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            event_buffer: 256,
        }
    }
}

impl AppConfig {
    /// Load from `path`, or from `snooze.toml` in the working directory if present.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigError::FileNotFound {
                        path: path.display().to_string(),
                    });
                }
                Self::from_file(path)?
            }
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::from_file(default_path)?
                } else {
                    debug!("No {} found, using defaults", DEFAULT_CONFIG_FILE);
                    Self::default()
                }
            }
        };

        config.apply_env(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
            path: path.display().to_string(),
        })?;
        info!("Loaded configuration from {}", path.display());
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    /// Overlay credentials and endpoints from environment variables.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        if let Some(value) = non_empty("REDDIT_CLIENT_ID") {
            self.reddit.client_id = Some(value);
        }
        if let Some(value) = non_empty("REDDIT_CLIENT_SECRET") {
            self.reddit.client_secret = Some(value);
        }
        if let Some(value) = non_empty("REDDIT_USER_AGENT") {
            self.reddit.user_agent = value;
        }
        if let Some(value) = non_empty("AZURE_API_KEY") {
            self.llm.api_key = Some(value);
        }
        if let Some(value) = non_empty("AZURE_ENDPOINT") {
            self.llm.endpoint = value;
        }
        if let Some(value) = non_empty("AZURE_DEPLOYMENT") {
            self.llm.deployment = value;
        }
        if let Some(value) = non_empty("AZURE_API_VERSION") {
            self.llm.api_version = value;
        }
        if let Some(value) = non_empty("SNOOZE_DATABASE_URL") {
            self.cache.database_url = value;
        }
    }

    /// Structural checks that do not depend on which command runs.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.llm.max_concurrent == 0 {
            return Err(ConfigError::InvalidValue {
                field: "llm.max_concurrent".to_string(),
                value: "0".to_string(),
            });
        }
        if !matches!(self.llm.provider.as_str(), "azure" | "openai") {
            return Err(ConfigError::InvalidValue {
                field: "llm.provider".to_string(),
                value: self.llm.provider.clone(),
            });
        }
        if self.reddit.requests_per_minute == 0 || self.reddit.burst_allowance == 0 {
            return Err(ConfigError::InvalidValue {
                field: "reddit.requests_per_minute".to_string(),
                value: self.reddit.requests_per_minute.to_string(),
            });
        }
        if self.cache.database_url.trim().is_empty() {
            return Err(ConfigError::MissingField {
                field: "cache.database_url".to_string(),
            });
        }
        Ok(())
    }

    /// Reddit credentials, required by any command that fetches posts.
    pub fn reddit_credentials(&self) -> Result<(String, String), ConfigError> {
        let client_id = self.reddit.client_id.clone().ok_or_else(|| {
            ConfigError::MissingEnvironmentVariable {
                var_name: "REDDIT_CLIENT_ID".to_string(),
            }
        })?;
        let client_secret = self.reddit.client_secret.clone().ok_or_else(|| {
            ConfigError::MissingEnvironmentVariable {
                var_name: "REDDIT_CLIENT_SECRET".to_string(),
            }
        })?;
        Ok((client_id, client_secret))
    }

    /// LLM settings, required by any command that summarizes.
    pub fn require_llm(&self) -> Result<(), ConfigError> {
        if self.llm.api_key.is_none() {
            return Err(ConfigError::MissingEnvironmentVariable {
                var_name: "AZURE_API_KEY".to_string(),
            });
        }
        if self.llm.endpoint.trim().is_empty() {
            return Err(ConfigError::MissingEnvironmentVariable {
                var_name: "AZURE_ENDPOINT".to_string(),
            });
        }
        if self.llm.provider == "azure" && self.llm.deployment.trim().is_empty() {
            return Err(ConfigError::MissingEnvironmentVariable {
                var_name: "AZURE_DEPLOYMENT".to_string(),
            });
        }
        Ok(())
    }
}
