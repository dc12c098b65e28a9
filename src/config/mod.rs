//! Configuration (layered: code > env > config file).
//!
//! [`Config`] is a plain value: nothing here is global, and a registry keeps
//! the config it was built with for its whole life.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ColloquyError, Result};
use crate::models::ProviderKey;
use crate::util::retry::RetryPolicy;

pub const DEFAULT_MODEL: &str = "gpt-4.1-nano";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
pub const DEFAULT_IMAGE_MODEL: &str = "dall-e-3";

/// Credentials and endpoint for one provider.
///
/// For Bedrock, `api_key` is the AWS access key id and `secret_key` the
/// secret access key.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_token: Option<String>,
}

impl fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "<redacted>");
        f.debug_struct("ProviderSettings")
            .field("api_key", &redact(&self.api_key))
            .field("base_url", &self.base_url)
            .field("secret_key", &redact(&self.secret_key))
            .field("region", &self.region)
            .field("session_token", &redact(&self.session_token))
            .finish()
    }
}

/// Immutable library configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    providers: BTreeMap<ProviderKey, ProviderSettings>,
    pub default_model: String,
    pub default_embedding_model: String,
    pub default_image_model: String,
    /// Per-attempt bound on a provider request, in seconds in files.
    #[serde(with = "secs_f64")]
    pub request_timeout: Duration,
    pub max_retries: u32,
    /// Wait before the first retry, in seconds in files.
    #[serde(with = "secs_f64")]
    pub retry_interval: Duration,
    pub retry_backoff_factor: f64,
    pub retry_interval_randomness: f64,
    /// Tool rounds allowed per `ask` before the turn fails.
    pub max_tool_turns: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            providers: BTreeMap::new(),
            default_model: DEFAULT_MODEL.to_string(),
            default_embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            default_image_model: DEFAULT_IMAGE_MODEL.to_string(),
            request_timeout: Duration::from_secs(120),
            max_retries: 3,
            retry_interval: Duration::from_millis(100),
            retry_backoff_factor: 2.0,
            retry_interval_randomness: 0.5,
            max_tool_turns: 20,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    // Builders

    fn settings_mut(&mut self, key: ProviderKey) -> &mut ProviderSettings {
        self.providers.entry(key).or_default()
    }

    pub fn with_api_key(mut self, key: ProviderKey, api_key: impl Into<String>) -> Self {
        self.settings_mut(key).api_key = Some(api_key.into());
        self
    }

    pub fn with_base_url(mut self, key: ProviderKey, url: impl Into<String>) -> Self {
        self.settings_mut(key).base_url = Some(url.into());
        self
    }

    pub fn with_provider(mut self, key: ProviderKey, settings: ProviderSettings) -> Self {
        self.providers.insert(key, settings);
        self
    }

    /// AWS credentials for Bedrock.
    pub fn with_bedrock(
        mut self,
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        let settings = self.settings_mut(ProviderKey::Bedrock);
        settings.api_key = Some(access_key_id.into());
        settings.secret_key = Some(secret_access_key.into());
        settings.region = Some(region.into());
        self
    }

    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    pub fn with_default_embedding_model(mut self, model: impl Into<String>) -> Self {
        self.default_embedding_model = model.into();
        self
    }

    pub fn with_default_image_model(mut self, model: impl Into<String>) -> Self {
        self.default_image_model = model.into();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    pub fn with_retry_backoff_factor(mut self, factor: f64) -> Self {
        self.retry_backoff_factor = factor;
        self
    }

    pub fn with_retry_interval_randomness(mut self, ratio: f64) -> Self {
        self.retry_interval_randomness = ratio;
        self
    }

    pub fn with_max_tool_turns(mut self, turns: usize) -> Self {
        self.max_tool_turns = turns;
        self
    }

    // Accessors

    pub fn provider(&self, key: ProviderKey) -> Option<&ProviderSettings> {
        self.providers.get(&key)
    }

    pub fn api_key(&self, key: ProviderKey) -> Option<&str> {
        self.provider(key).and_then(|s| s.api_key.as_deref())
    }

    pub fn base_url(&self, key: ProviderKey) -> Option<&str> {
        self.provider(key).and_then(|s| s.base_url.as_deref())
    }

    /// Check if a provider has credentials configured.
    pub fn has_credentials(&self, key: ProviderKey) -> bool {
        self.api_key(key).is_some()
    }

    /// Retry policy derived from the retry settings.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_interval: self.retry_interval,
            backoff_factor: self.retry_backoff_factor,
            jitter_ratio: self.retry_interval_randomness,
        }
    }

    /// Reject settings the retry and tool loops cannot honor.
    pub fn validate(&self) -> Result<()> {
        if !(self.retry_backoff_factor >= 1.0 && self.retry_backoff_factor.is_finite()) {
            return Err(ColloquyError::Configuration(format!(
                "retry_backoff_factor must be at least 1, got {}",
                self.retry_backoff_factor
            )));
        }
        if !(0.0..=1.0).contains(&self.retry_interval_randomness) {
            return Err(ColloquyError::Configuration(format!(
                "retry_interval_randomness must be within [0, 1], got {}",
                self.retry_interval_randomness
            )));
        }
        if self.request_timeout.is_zero() {
            return Err(ColloquyError::Configuration(
                "request_timeout must be positive".into(),
            ));
        }
        Ok(())
    }

    // Loading

    /// Load from environment variables, reading `.env` first when present.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv(); // load .env if present, ignore error
        Self::default().merge_env(|name| std::env::var(name).ok())
    }

    /// Load from an arbitrary variable lookup instead of the process environment.
    pub fn from_env_with(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        Self::default().merge_env(lookup)
    }

    /// Overlay environment variables onto this config.
    pub fn merge_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let key_mappings = [
            ("OPENAI_API_KEY", ProviderKey::OpenAi),
            ("ANTHROPIC_API_KEY", ProviderKey::Anthropic),
            ("GOOGLE_API_KEY", ProviderKey::Gemini),
            ("GEMINI_API_KEY", ProviderKey::Gemini),
            ("DEEPSEEK_API_KEY", ProviderKey::DeepSeek),
            ("AWS_ACCESS_KEY_ID", ProviderKey::Bedrock),
        ];
        for (var, key) in key_mappings {
            if let Some(value) = get(var) {
                self.settings_mut(key).api_key = Some(value);
            }
        }

        let url_mappings = [
            ("OPENAI_API_BASE", ProviderKey::OpenAi),
            ("OPENAI_BASE_URL", ProviderKey::OpenAi),
            ("ANTHROPIC_BASE_URL", ProviderKey::Anthropic),
            ("GEMINI_API_BASE", ProviderKey::Gemini),
            ("DEEPSEEK_API_BASE", ProviderKey::DeepSeek),
        ];
        for (var, key) in url_mappings {
            if let Some(value) = get(var) {
                self.settings_mut(key).base_url = Some(value);
            }
        }

        if let Some(secret) = get("AWS_SECRET_ACCESS_KEY") {
            self.settings_mut(ProviderKey::Bedrock).secret_key = Some(secret);
        }
        if let Some(region) = get("AWS_REGION").or_else(|| get("AWS_DEFAULT_REGION")) {
            self.settings_mut(ProviderKey::Bedrock).region = Some(region);
        }
        if let Some(token) = get("AWS_SESSION_TOKEN") {
            self.settings_mut(ProviderKey::Bedrock).session_token = Some(token);
        }

        if let Some(model) = get("COLLOQUY_DEFAULT_MODEL") {
            self.default_model = model;
        }
        if let Some(raw) = get("COLLOQUY_REQUEST_TIMEOUT") {
            let secs = parse_number("COLLOQUY_REQUEST_TIMEOUT", &raw)?;
            self.request_timeout = Duration::try_from_secs_f64(secs).map_err(|_| {
                ColloquyError::Configuration(format!("COLLOQUY_REQUEST_TIMEOUT is out of range: {raw}"))
            })?;
        }
        if let Some(raw) = get("COLLOQUY_MAX_RETRIES") {
            self.max_retries = raw.trim().parse().map_err(|_| {
                ColloquyError::Configuration(format!("COLLOQUY_MAX_RETRIES is not a count: {raw}"))
            })?;
        }

        self.validate()?;
        Ok(self)
    }

    /// Parse a TOML document.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Config = toml::from_str(raw)
            .map_err(|e| ColloquyError::Configuration(format!("invalid config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ColloquyError::Configuration(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&raw)
    }

    /// User config file (when it exists) overlaid with the environment.
    pub fn load() -> Result<Self> {
        let base = match default_config_path() {
            Some(path) if path.is_file() => Self::from_file(&path)?,
            _ => Self::default(),
        };
        let _ = dotenvy::dotenv();
        base.merge_env(|name| std::env::var(name).ok())
    }

    /// Serialize to TOML, e.g. to seed a config file.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| ColloquyError::Configuration(format!("failed to serialize config: {e}")))
    }
}

/// `<platform config dir>/colloquy/config.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "colloquy").map(|dirs| dirs.config_dir().join("config.toml"))
}

fn parse_number(name: &str, raw: &str) -> Result<f64> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v > 0.0)
        .ok_or_else(|| ColloquyError::Configuration(format!("{name} is not a positive number: {raw}")))
}

mod secs_f64 {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        if !secs.is_finite() || secs < 0.0 {
            return Err(serde::de::Error::custom("duration must be a non-negative number of seconds"));
        }
        Duration::try_from_secs_f64(secs)
            .map_err(|_| serde::de::Error::custom(format!("duration of {secs} seconds is out of range")))
    }
}
