use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Errors that can occur when loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read the config file.
    ReadFile { path: PathBuf, source: std::io::Error },
    /// Failed to parse JSON.
    ParseJson { path: PathBuf, source: serde_json::Error },
    /// Required environment variable is not set.
    MissingVar(&'static str),
    /// Environment variable is set but could not be parsed.
    InvalidVar { name: &'static str, value: String },
    /// Validation error.
    Validation(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadFile { path, source } => {
                write!(f, "failed to read config file '{}': {}", path.display(), source)
            }
            Self::ParseJson { path, source } => {
                write!(f, "failed to parse config file '{}': {}", path.display(), source)
            }
            Self::MissingVar(name) => write!(f, "environment variable {} is not set", name),
            Self::InvalidVar { name, value } => {
                write!(f, "environment variable {} has invalid value '{}'", name, value)
            }
            Self::Validation(msg) => write!(f, "config validation error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ReadFile { source, .. } => Some(source),
            Self::ParseJson { source, .. } => Some(source),
            Self::MissingVar(_) | Self::InvalidVar { .. } | Self::Validation(_) => None,
        }
    }
}

#[derive(Deserialize)]
struct ConfigFile {
    telegram_bot_token: String,
    /// Completion API keys, rotated round-robin.
    openai_api_keys: Vec<String>,
    #[serde(default = "default_openai_base_url")]
    openai_base_url: String,
    /// Directory for the log file. Defaults to current directory.
    data_dir: Option<String>,
    #[serde(default = "default_max_text_length")]
    max_text_length: usize,
    #[serde(default = "default_daily_request_limit")]
    daily_request_limit: u32,
    #[serde(default = "default_pre_call_delay_ms")]
    pre_call_delay_ms: u64,
    #[serde(default = "default_rate_limit_cooldown_secs")]
    rate_limit_cooldown_secs: u64,
    #[serde(default = "default_max_rate_limit_retries")]
    max_rate_limit_retries: u32,
    #[serde(default = "default_search_url")]
    search_url: String,
    #[serde(default = "default_search_timeout_secs")]
    search_timeout_secs: u64,
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_max_text_length() -> usize {
    200
}

fn default_daily_request_limit() -> u32 {
    50
}

fn default_pre_call_delay_ms() -> u64 {
    1000
}

fn default_rate_limit_cooldown_secs() -> u64 {
    60
}

fn default_max_rate_limit_retries() -> u32 {
    3
}

fn default_search_url() -> String {
    crate::search::DEFAULT_SEARCH_URL.to_string()
}

fn default_search_timeout_secs() -> u64 {
    15
}

#[derive(Debug, Clone)]
pub struct Config {
    pub telegram_bot_token: String,
    pub openai_api_keys: Vec<String>,
    pub openai_base_url: String,
    /// Directory for the log file.
    pub data_dir: PathBuf,
    /// Longest accepted message, in characters.
    pub max_text_length: usize,
    pub daily_request_limit: u32,
    /// Pause before every completion request.
    pub pre_call_delay: Duration,
    /// Wait after a 429 from the completion API before retrying.
    pub rate_limit_cooldown: Duration,
    pub max_rate_limit_retries: u32,
    /// DuckDuckGo-compatible HTML search endpoint.
    pub search_url: String,
    pub search_timeout: Duration,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config_path = path.as_ref().to_path_buf();
        let content = std::fs::read_to_string(&config_path)
            .map_err(|e| ConfigError::ReadFile { path: config_path.clone(), source: e })?;
        let file: ConfigFile = serde_json::from_str(&content)
            .map_err(|e| ConfigError::ParseJson { path: config_path.clone(), source: e })?;

        Self::from_file(file)
    }

    /// Build config from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build config from an arbitrary variable lookup.
    ///
    /// `OPENAI_TOKEN` holds one or more comma-separated keys.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let telegram_bot_token = lookup("TELEGRAM_TOKEN").ok_or(ConfigError::MissingVar("TELEGRAM_TOKEN"))?;
        let openai_api_keys = lookup("OPENAI_TOKEN")
            .ok_or(ConfigError::MissingVar("OPENAI_TOKEN"))?
            .split(',')
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();

        let file = ConfigFile {
            telegram_bot_token,
            openai_api_keys,
            openai_base_url: lookup("OPENAI_BASE_URL").unwrap_or_else(default_openai_base_url),
            data_dir: lookup("BOLTUN_DATA_DIR"),
            max_text_length: parse_var(&lookup, "BOLTUN_MAX_TEXT_LENGTH")?.unwrap_or_else(default_max_text_length),
            daily_request_limit: parse_var(&lookup, "BOLTUN_DAILY_LIMIT")?.unwrap_or_else(default_daily_request_limit),
            pre_call_delay_ms: default_pre_call_delay_ms(),
            rate_limit_cooldown_secs: default_rate_limit_cooldown_secs(),
            max_rate_limit_retries: default_max_rate_limit_retries(),
            search_url: lookup("BOLTUN_SEARCH_URL").unwrap_or_else(default_search_url),
            search_timeout_secs: default_search_timeout_secs(),
        };

        Self::from_file(file)
    }

    fn from_file(file: ConfigFile) -> Result<Self, ConfigError> {
        if file.telegram_bot_token.is_empty() {
            return Err(ConfigError::Validation("telegram_bot_token is required".into()));
        }
        // Telegram tokens are formatted as {bot_id}:{secret} where bot_id is numeric
        let token_parts: Vec<&str> = file.telegram_bot_token.split(':').collect();
        if token_parts.len() != 2 || token_parts[0].parse::<u64>().is_err() || token_parts[1].is_empty() {
            return Err(ConfigError::Validation(
                "telegram_bot_token appears invalid (expected format: 123456789:ABCdefGHI...)".into()
            ));
        }
        if file.openai_api_keys.iter().all(|k| k.trim().is_empty()) {
            return Err(ConfigError::Validation("at least one completion API key is required".into()));
        }
        if file.max_text_length == 0 {
            return Err(ConfigError::Validation("max_text_length must be positive".into()));
        }

        let data_dir = file
            .data_dir
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));

        Ok(Self {
            telegram_bot_token: file.telegram_bot_token,
            openai_api_keys: file.openai_api_keys.into_iter().filter(|k| !k.trim().is_empty()).collect(),
            openai_base_url: file.openai_base_url.trim_end_matches('/').to_string(),
            data_dir,
            max_text_length: file.max_text_length,
            daily_request_limit: file.daily_request_limit,
            pre_call_delay: Duration::from_millis(file.pre_call_delay_ms),
            rate_limit_cooldown: Duration::from_secs(file.rate_limit_cooldown_secs),
            max_rate_limit_retries: file.max_rate_limit_retries,
            search_url: file.search_url,
            search_timeout: Duration::from_secs(file.search_timeout_secs.max(1)),
        })
    }
}

fn parse_var<T, F>(lookup: &F, name: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidVar { name, value }),
        None => Ok(None),
    }
}
