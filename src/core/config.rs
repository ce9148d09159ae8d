//! Configuration management for the chat gateway.
//!
//! The model catalog is read from a JSON file (`MODELS_CONFIG`, default
//! `config/models.json`) with environment variable expansion. Provider
//! credentials, base URLs and server settings come from the environment.
//! The resulting [`GatewayConfig`] is immutable; a reload builds a new value.

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::str::FromStr;

pub const DEFAULT_CATALOG_PATH: &str = "config/models.json";
pub const DEFAULT_MODEL_ID: &str = "glm-4";
pub const THINKING_FEATURE: &str = "thinking";

/// Main gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub server: ServerConfig,

    /// Model used when a request does not name one
    pub default_model: String,

    /// Known models and their capabilities
    #[serde(default)]
    pub catalog: ModelCatalog,

    #[serde(default)]
    pub providers: ProvidersConfig,

    /// Whether to verify SSL certificates for upstream requests
    #[serde(default = "default_verify_ssl")]
    pub verify_ssl: bool,

    /// Pause between tokens of the simulated fallback stream
    #[serde(default = "default_fallback_token_delay_ms")]
    pub fallback_token_delay_ms: u64,

    #[serde(default)]
    pub wire_format: WireFormat,
}

/// Server-specific configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Representation used for each NDJSON line sent to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireFormat {
    /// `{"content","finished"}`, with a JSON-encoded envelope in `content`
    /// while thinking mode is active.
    #[default]
    Legacy,
    /// Flat `{"content","type","finished"}` for every chunk.
    Typed,
}

impl FromStr for WireFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "legacy" => Ok(WireFormat::Legacy),
            "typed" => Ok(WireFormat::Typed),
            other => Err(anyhow::anyhow!("Unknown wire format: {}", other)),
        }
    }
}

/// The `models.json` catalog.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelCatalog {
    #[serde(default)]
    pub models: Vec<ModelConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

impl ModelCatalog {
    /// Case-insensitive lookup by model id.
    pub fn find(&self, model_id: &str) -> Option<&ModelConfig> {
        let needle = model_id.trim();
        self.models
            .iter()
            .find(|m| m.id.eq_ignore_ascii_case(needle))
    }

    /// Whether the catalog declares the thinking capability for a model.
    pub fn supports_thinking(&self, model_id: &str) -> bool {
        self.find(model_id)
            .map(ModelConfig::supports_thinking)
            .unwrap_or(false)
    }

    pub fn enabled_models(&self) -> impl Iterator<Item = &ModelConfig> {
        self.models.iter().filter(|m| m.enabled)
    }

    /// Built-in catalog used when no `models.json` is present.
    pub fn builtin() -> Self {
        let glm = |id: &str, name: &str, features: &[&str]| ModelConfig {
            id: id.to_string(),
            name: name.to_string(),
            provider: "Zhipu AI".to_string(),
            description: "Zhipu AI large model, supports Chinese and English dialogue".to_string(),
            model_type: "glm".to_string(),
            env_key: "GLM_API_KEY".to_string(),
            enabled: true,
            max_tokens: Some(8192),
            temperature: Some(TemperatureConfig {
                min: 0.0,
                max: 1.0,
                default: 0.7,
            }),
            features: features.iter().map(|f| f.to_string()).collect(),
            has_api_key: false,
        };
        let kimi = |id: &str, name: &str, features: &[&str]| ModelConfig {
            id: id.to_string(),
            name: name.to_string(),
            provider: "Moonshot AI".to_string(),
            description: "Moonshot AI Kimi model with long context support".to_string(),
            model_type: "kimi".to_string(),
            env_key: "MOONSHOT_API_KEY".to_string(),
            enabled: true,
            max_tokens: Some(8192),
            temperature: Some(TemperatureConfig {
                min: 0.0,
                max: 1.0,
                default: 0.6,
            }),
            features: features.iter().map(|f| f.to_string()).collect(),
            has_api_key: false,
        };

        Self {
            models: vec![
                glm("glm-4", "GLM-4", &["chat", "streaming", "multilingual"]),
                glm("glm-4.5", "GLM-4.5", &["chat", "streaming", THINKING_FEATURE]),
                kimi(
                    "kimi-k2-turbo-preview",
                    "Kimi K2 Turbo",
                    &["chat", "streaming", "long-context"],
                ),
                kimi(
                    "kimi-k2-thinking",
                    "Kimi K2 Thinking",
                    &["chat", "streaming", THINKING_FEATURE],
                ),
            ],
            default_model: Some(DEFAULT_MODEL_ID.to_string()),
        }
    }
}

/// One entry of the model catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelConfig {
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub provider: String,

    #[serde(default)]
    pub description: String,

    /// Provider type tag, e.g. "glm" or "kimi"
    #[serde(rename = "type", default)]
    pub model_type: String,

    /// Environment variable holding the credential for this model
    #[serde(default)]
    pub env_key: String,

    #[serde(default)]
    pub enabled: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<TemperatureConfig>,

    #[serde(default)]
    pub features: Vec<String>,

    /// Computed at load time from `env_key`
    #[serde(default)]
    pub has_api_key: bool,
}

impl ModelConfig {
    pub fn supports_thinking(&self) -> bool {
        self.features
            .iter()
            .any(|f| f.eq_ignore_ascii_case(THINKING_FEATURE))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TemperatureConfig {
    pub min: f32,
    pub max: f32,
    pub default: f32,
}

/// Credentials and endpoints for every supported provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    pub glm: ProviderSettings,
    pub kimi: ProviderSettings,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            glm: ProviderSettings::new("GLM_API_KEY", "https://open.bigmodel.cn/api/paas/v4/"),
            kimi: ProviderSettings::new("MOONSHOT_API_KEY", "https://api.moonshot.cn/v1"),
        }
    }
}

/// Settings for a single provider.
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    /// Bearer token; `None` when the environment variable is unset or blank
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    /// Name of the environment variable the key is read from
    pub api_key_env: String,

    pub base_url: String,

    /// Request timeout for plain chat
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Request timeout when reasoning output is requested
    #[serde(default = "default_reasoning_timeout_secs")]
    pub reasoning_timeout_secs: u64,
}

impl ProviderSettings {
    pub fn new(api_key_env: &str, base_url: &str) -> Self {
        Self {
            api_key: None,
            api_key_env: api_key_env.to_string(),
            base_url: base_url.to_string(),
            timeout_secs: default_timeout_secs(),
            reasoning_timeout_secs: default_reasoning_timeout_secs(),
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn has_credentials(&self) -> bool {
        self.api_key
            .as_deref()
            .map(|k| !k.trim().is_empty())
            .unwrap_or(false)
    }

    /// Join the base URL with an API path, tolerating a trailing slash on either side.
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    pub fn timeout_for(&self, reasoning: bool) -> u64 {
        if reasoning {
            self.reasoning_timeout_secs
        } else {
            self.timeout_secs
        }
    }
}

// Keeps the key out of debug logs.
impl std::fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("api_key", &self.api_key.as_ref().map(|_| "****"))
            .field("api_key_env", &self.api_key_env)
            .field("base_url", &self.base_url)
            .field("timeout_secs", &self.timeout_secs)
            .field("reasoning_timeout_secs", &self.reasoning_timeout_secs)
            .finish()
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_verify_ssl() -> bool {
    true
}

fn default_fallback_token_delay_ms() -> u64 {
    500
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_reasoning_timeout_secs() -> u64 {
    300
}

impl GatewayConfig {
    /// Build a configuration around a catalog, with default server and provider settings.
    pub fn with_catalog(catalog: ModelCatalog) -> Self {
        let default_model = catalog
            .default_model
            .clone()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_MODEL_ID.to_string());

        Self {
            server: ServerConfig::default(),
            default_model,
            catalog,
            providers: ProvidersConfig::default(),
            verify_ssl: default_verify_ssl(),
            fallback_token_delay_ms: default_fallback_token_delay_ms(),
            wire_format: WireFormat::default(),
        }
    }

    /// Load configuration using `MODELS_CONFIG` (or the default path) for the catalog.
    pub fn from_env() -> Result<Self> {
        let path =
            std::env::var("MODELS_CONFIG").unwrap_or_else(|_| DEFAULT_CATALOG_PATH.to_string());
        Self::load(&path)
    }

    /// Load the catalog from `catalog_path` and apply environment overrides.
    ///
    /// A missing catalog file falls back to [`ModelCatalog::builtin`]; a file that
    /// exists but cannot be parsed is an error.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use chat_gateway::core::config::GatewayConfig;
    ///
    /// let config = GatewayConfig::load("config/models.json").expect("Failed to load config");
    /// ```
    pub fn load(catalog_path: &str) -> Result<Self> {
        let mut catalog = if Path::new(catalog_path).exists() {
            let content = fs::read_to_string(catalog_path)
                .with_context(|| format!("Failed to read model catalog: {}", catalog_path))?;
            let expanded = expand_env_vars(&content);
            serde_json::from_str::<ModelCatalog>(&expanded)
                .with_context(|| format!("Failed to parse model catalog: {}", catalog_path))?
        } else {
            tracing::warn!(
                path = %catalog_path,
                "Model catalog not found, using built-in catalog"
            );
            ModelCatalog::builtin()
        };

        for model in &mut catalog.models {
            model.has_api_key = env_has_value(&model.env_key);
        }

        let mut config = Self::with_catalog(catalog);
        config.apply_env_overrides()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(host) = std::env::var("HOST") {
            self.server.host = host;
        }

        if let Ok(port_str) = std::env::var("PORT") {
            if let Ok(port) = port_str.parse::<u16>() {
                self.server.port = port;
            }
        }

        if let Ok(model) = std::env::var("DEFAULT_MODEL") {
            if !model.trim().is_empty() {
                self.default_model = model.trim().to_string();
            }
        }

        if let Ok(verify_ssl_str) = std::env::var("VERIFY_SSL") {
            self.verify_ssl = str_to_bool(&verify_ssl_str);
        }

        if let Ok(delay_str) = std::env::var("FALLBACK_TOKEN_DELAY_MS") {
            if let Ok(delay) = delay_str.parse::<u64>() {
                self.fallback_token_delay_ms = delay;
            }
        }

        if let Ok(format) = std::env::var("WIRE_FORMAT") {
            self.wire_format = format.parse()?;
        }

        for (settings, base_url_var) in [
            (&mut self.providers.glm, "GLM_BASE_URL"),
            (&mut self.providers.kimi, "KIMI_BASE_URL"),
        ] {
            settings.api_key = std::env::var(&settings.api_key_env)
                .ok()
                .filter(|k| !k.trim().is_empty());
            if let Ok(base_url) = std::env::var(base_url_var) {
                settings.base_url = base_url;
            }
        }

        Ok(())
    }
}

/// Expand environment variables in configuration content.
///
/// Supports patterns: ${VAR}, ${VAR:-default}, ${VAR:default}
fn expand_env_vars(content: &str) -> String {
    let re = match Regex::new(r"\$\{([^}:]+)(?::-?([^}]*))?\}") {
        Ok(re) => re,
        Err(_) => return content.to_string(),
    };

    re.replace_all(content, |caps: &regex::Captures| {
        let var_name = &caps[1];
        let default_value = caps.get(2).map(|m| m.as_str()).unwrap_or("");
        std::env::var(var_name).unwrap_or_else(|_| default_value.to_string())
    })
    .to_string()
}

fn env_has_value(key: &str) -> bool {
    !key.is_empty()
        && std::env::var(key)
            .map(|v| !v.trim().is_empty())
            .unwrap_or(false)
}

/// Convert string to boolean.
///
/// Accepts: "true", "1", "yes", "on" (case-insensitive)
fn str_to_bool(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "true" | "1" | "yes" | "on")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn clear_env() {
        for var in [
            "HOST",
            "PORT",
            "DEFAULT_MODEL",
            "VERIFY_SSL",
            "FALLBACK_TOKEN_DELAY_MS",
            "WIRE_FORMAT",
            "GLM_API_KEY",
            "MOONSHOT_API_KEY",
            "GLM_BASE_URL",
            "KIMI_BASE_URL",
        ] {
            std::env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_expand_env_vars() {
        std::env::set_var("TEST_CATALOG_VAR", "test_value");
        let output = expand_env_vars(r#"{"envKey": "${TEST_CATALOG_VAR}"}"#);
        assert_eq!(output, r#"{"envKey": "test_value"}"#);
        std::env::remove_var("TEST_CATALOG_VAR");
    }

    #[test]
    #[serial]
    fn test_expand_env_vars_with_default() {
        std::env::remove_var("MISSING_CATALOG_VAR");
        assert_eq!(expand_env_vars("${MISSING_CATALOG_VAR:-glm-4}"), "glm-4");
        assert_eq!(expand_env_vars("${MISSING_CATALOG_VAR:glm-4}"), "glm-4");
        assert_eq!(expand_env_vars("${MISSING_CATALOG_VAR:-}"), "");
    }

    #[test]
    fn test_str_to_bool() {
        assert!(str_to_bool("true"));
        assert!(str_to_bool("YES"));
        assert!(str_to_bool("1"));
        assert!(str_to_bool("On"));
        assert!(!str_to_bool("false"));
        assert!(!str_to_bool("0"));
        assert!(!str_to_bool(""));
    }

    #[test]
    fn test_wire_format_parse() {
        assert_eq!("legacy".parse::<WireFormat>().unwrap(), WireFormat::Legacy);
        assert_eq!("Typed".parse::<WireFormat>().unwrap(), WireFormat::Typed);
        assert!("xml".parse::<WireFormat>().is_err());
    }

    #[test]
    fn test_endpoint_join() {
        let glm = ProviderSettings::new("GLM_API_KEY", "https://open.bigmodel.cn/api/paas/v4/");
        assert_eq!(
            glm.endpoint("chat/completions"),
            "https://open.bigmodel.cn/api/paas/v4/chat/completions"
        );
        let kimi = ProviderSettings::new("MOONSHOT_API_KEY", "https://api.moonshot.cn/v1");
        assert_eq!(
            kimi.endpoint("/chat/completions"),
            "https://api.moonshot.cn/v1/chat/completions"
        );
    }

    #[test]
    fn test_has_credentials_ignores_blank_key() {
        let settings = ProviderSettings::new("GLM_API_KEY", "http://localhost");
        assert!(!settings.has_credentials());
        assert!(!settings.clone().with_api_key("   ").has_credentials());
        assert!(settings.with_api_key("sk-test").has_credentials());
    }

    #[test]
    fn test_debug_hides_api_key() {
        let settings = ProviderSettings::new("GLM_API_KEY", "http://localhost").with_api_key("secret");
        let rendered = format!("{:?}", settings);
        assert!(!rendered.contains("secret"));
        assert!(rendered.contains("****"));
    }

    #[test]
    fn test_builtin_catalog_capabilities() {
        let catalog = ModelCatalog::builtin();
        assert!(catalog.supports_thinking("kimi-k2-thinking"));
        assert!(catalog.supports_thinking("KIMI-K2-THINKING"));
        assert!(!catalog.supports_thinking("kimi-k2-turbo-preview"));
        assert!(!catalog.supports_thinking("glm-4"));
        assert!(!catalog.supports_thinking("unknown"));
        assert_eq!(catalog.default_model.as_deref(), Some("glm-4"));
    }

    #[test]
    #[serial]
    fn test_load_catalog_from_file() {
        clear_env();
        std::env::set_var("GLM_API_KEY", "glm-secret");

        let mut temp_file = NamedTempFile::new().unwrap();
        let content = r#"{
            "models": [
                {
                    "id": "glm-4",
                    "name": "GLM-4",
                    "provider": "Zhipu AI",
                    "type": "glm",
                    "envKey": "GLM_API_KEY",
                    "enabled": true,
                    "maxTokens": 8192,
                    "temperature": {"min": 0.0, "max": 2.0, "default": 0.7},
                    "features": ["chat", "streaming"]
                },
                {
                    "id": "kimi-k2-thinking",
                    "type": "kimi",
                    "envKey": "MOONSHOT_API_KEY",
                    "enabled": true,
                    "features": ["chat", "thinking"]
                }
            ],
            "defaultModel": "kimi-k2-thinking"
        }"#;
        temp_file.write_all(content.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        let config = GatewayConfig::load(temp_file.path().to_str().unwrap()).unwrap();

        assert_eq!(config.catalog.models.len(), 2);
        assert_eq!(config.default_model, "kimi-k2-thinking");
        assert!(config.catalog.models[0].has_api_key);
        assert!(!config.catalog.models[1].has_api_key);
        assert!(config.catalog.supports_thinking("kimi-k2-thinking"));
        assert_eq!(config.providers.glm.api_key.as_deref(), Some("glm-secret"));
        assert!(!config.providers.kimi.has_credentials());

        clear_env();
    }

    #[test]
    #[serial]
    fn test_load_missing_catalog_uses_builtin() {
        clear_env();
        let config = GatewayConfig::load("nonexistent_models.json").unwrap();
        assert_eq!(config.default_model, DEFAULT_MODEL_ID);
        assert!(config.catalog.find("kimi-k2-thinking").is_some());
        assert_eq!(config.fallback_token_delay_ms, 500);
        assert_eq!(config.wire_format, WireFormat::Legacy);
    }

    #[test]
    #[serial]
    fn test_load_invalid_catalog() {
        clear_env();
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"{ not json").unwrap();
        temp_file.flush().unwrap();

        let result = GatewayConfig::load(temp_file.path().to_str().unwrap());
        assert!(result.is_err());
    }

    #[test]
    #[serial]
    fn test_env_var_overrides() {
        clear_env();
        std::env::set_var("HOST", "127.0.0.1");
        std::env::set_var("PORT", "9999");
        std::env::set_var("DEFAULT_MODEL", "kimi-k2-turbo-preview");
        std::env::set_var("VERIFY_SSL", "false");
        std::env::set_var("FALLBACK_TOKEN_DELAY_MS", "0");
        std::env::set_var("WIRE_FORMAT", "typed");
        std::env::set_var("KIMI_BASE_URL", "http://localhost:9000/v1");
        std::env::set_var("MOONSHOT_API_KEY", "kimi-secret");

        let config = GatewayConfig::load("nonexistent_models.json").unwrap();

        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 9999);
        assert_eq!(config.default_model, "kimi-k2-turbo-preview");
        assert!(!config.verify_ssl);
        assert_eq!(config.fallback_token_delay_ms, 0);
        assert_eq!(config.wire_format, WireFormat::Typed);
        assert_eq!(config.providers.kimi.base_url, "http://localhost:9000/v1");
        assert!(config.providers.kimi.has_credentials());

        clear_env();
    }

    #[test]
    #[serial]
    fn test_invalid_wire_format_is_error() {
        clear_env();
        std::env::set_var("WIRE_FORMAT", "xml");
        let result = GatewayConfig::load("nonexistent_models.json");
        assert!(result.is_err());
        clear_env();
    }
}
