//! Configuration parsing and validation.
//!
//! Docsplorer is configured either by a TOML file (`--config`) or, when no
//! file is given, from process environment variables. Both paths produce
//! the same [`Config`] and go through the same validation.
//!
//! # Example
//!
//! ```toml
//! environment = "development"
//!
//! [store]
//! url = "http://localhost:6333"
//! timeout_secs = 30
//! default_vector_size = 1024
//!
//! [store.production]
//! url = "https://qdrant.internal:6333"
//! api_key = "..."
//!
//! [embedding]
//! url = "http://localhost:11434"
//! model = "mxbai-embed-large"
//!
//! [search]
//! default_limit = 5
//! context_window = 5
//!
//! [server]
//! bind = "127.0.0.1:8000"
//! ```
//!
//! # Environment variables
//!
//! | Variable | Field |
//! |----------|-------|
//! | `ENVIRONMENT` | `environment` (`production` or anything else for development) |
//! | `QDRANT_URL`, `QDRANT_API_KEY`, `QDRANT_VERIFY_SSL` | `[store]` |
//! | `DEV_QDRANT_URL`, `DEV_QDRANT_API_KEY`, `DEV_QDRANT_VERIFY_SSL` | `[store.development]` |
//! | `PROD_QDRANT_URL`, `PROD_QDRANT_API_KEY`, `PROD_QDRANT_VERIFY_SSL` | `[store.production]` |
//! | `QDRANT_FORCE_IGNORE_SSL` | `store.force_insecure` |
//! | `QDRANT_TIMEOUT_SECS` | `store.timeout_secs` |
//! | `DEFAULT_VECTOR_SIZE` | `store.default_vector_size` |
//! | `OLLAMA_URL`, `OLLAMA_API_KEY` | `[embedding]` |
//! | `DEFAULT_EMBEDDING_MODEL` | `embedding.model` |
//! | `EMBEDDING_TIMEOUT_SECS` | `embedding.timeout_secs` |
//! | `DEFAULT_LIMIT`, `CONTEXT_WINDOW_SIZE` | `[search]` |
//! | `BIND_ADDR` | `server.bind` |

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::info;

use crate::connection::resolve;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub environment: Environment,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

/// Deployment tag selecting the pooled store and its settings.
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    pub fn is_production(self) -> bool {
        matches!(self, Environment::Production)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Production => "production",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One layer of store endpoint settings. Unset fields fall through to the
/// next layer during resolution.
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
pub struct EndpointSettings {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub verify_tls: Option<bool>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub verify_tls: Option<bool>,
    /// Disable certificate verification even for `https` endpoints.
    #[serde(default)]
    pub force_insecure: bool,
    #[serde(default = "default_store_timeout")]
    pub timeout_secs: u64,
    /// Dimension used when a missing collection is created on first use.
    #[serde(default = "default_vector_size")]
    pub default_vector_size: usize,
    #[serde(default)]
    pub development: EndpointSettings,
    #[serde(default)]
    pub production: EndpointSettings,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: None,
            api_key: None,
            verify_tls: None,
            force_insecure: false,
            timeout_secs: default_store_timeout(),
            default_vector_size: default_vector_size(),
            development: EndpointSettings::default(),
            production: EndpointSettings::default(),
        }
    }
}

impl StoreConfig {
    /// The untagged `[store]` layer.
    pub fn generic(&self) -> EndpointSettings {
        EndpointSettings {
            url: self.url.clone(),
            api_key: self.api_key.clone(),
            verify_tls: self.verify_tls,
        }
    }

    pub fn tagged(&self, environment: Environment) -> &EndpointSettings {
        match environment {
            Environment::Development => &self.development,
            Environment::Production => &self.production,
        }
    }
}

fn default_store_timeout() -> u64 {
    30
}
fn default_vector_size() -> usize {
    1024
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_url")]
    pub url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            url: default_embedding_url(),
            api_key: None,
            model: default_embedding_model(),
            timeout_secs: default_embedding_timeout(),
        }
    }
}

fn default_embedding_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_embedding_model() -> String {
    "mxbai-embed-large".to_string()
}
fn default_embedding_timeout() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_limit")]
    pub default_limit: usize,
    #[serde(default = "default_context_window")]
    pub context_window: u32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            context_window: default_context_window(),
        }
    }
}

fn default_limit() -> usize {
    5
}
fn default_context_window() -> u32 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

impl Config {
    /// Build a configuration from process environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let endpoint = |prefix: &str| -> Result<EndpointSettings> {
            let verify_key = format!("{}QDRANT_VERIFY_SSL", prefix);
            Ok(EndpointSettings {
                url: var(&format!("{}QDRANT_URL", prefix)),
                api_key: var(&format!("{}QDRANT_API_KEY", prefix)),
                verify_tls: var(&verify_key)
                    .map(|raw| parse_bool(&verify_key, &raw))
                    .transpose()?,
            })
        };

        let generic = endpoint("")?;
        let mut config = Config {
            environment: match var("ENVIRONMENT") {
                Some(raw) if raw.trim().eq_ignore_ascii_case("production") => {
                    Environment::Production
                }
                _ => Environment::Development,
            },
            store: StoreConfig {
                url: generic.url,
                api_key: generic.api_key,
                verify_tls: generic.verify_tls,
                development: endpoint("DEV_")?,
                production: endpoint("PROD_")?,
                ..StoreConfig::default()
            },
            ..Config::default()
        };

        if let Some(raw) = var("QDRANT_FORCE_IGNORE_SSL") {
            config.store.force_insecure = parse_bool("QDRANT_FORCE_IGNORE_SSL", &raw)?;
        }
        if let Some(raw) = var("QDRANT_TIMEOUT_SECS") {
            config.store.timeout_secs = parse_num("QDRANT_TIMEOUT_SECS", &raw)?;
        }
        if let Some(raw) = var("DEFAULT_VECTOR_SIZE") {
            config.store.default_vector_size = parse_num("DEFAULT_VECTOR_SIZE", &raw)?;
        }
        if let Some(url) = var("OLLAMA_URL") {
            config.embedding.url = url;
        }
        config.embedding.api_key = var("OLLAMA_API_KEY");
        if let Some(model) = var("DEFAULT_EMBEDDING_MODEL") {
            config.embedding.model = model;
        }
        if let Some(raw) = var("EMBEDDING_TIMEOUT_SECS") {
            config.embedding.timeout_secs = parse_num("EMBEDDING_TIMEOUT_SECS", &raw)?;
        }
        if let Some(raw) = var("DEFAULT_LIMIT") {
            config.search.default_limit = parse_num("DEFAULT_LIMIT", &raw)?;
        }
        if let Some(raw) = var("CONTEXT_WINDOW_SIZE") {
            config.search.context_window = parse_num("CONTEXT_WINDOW_SIZE", &raw)?;
        }
        if let Some(bind) = var("BIND_ADDR") {
            config.server.bind = bind;
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.store.timeout_secs == 0 {
            bail!("store.timeout_secs must be > 0");
        }
        if self.store.default_vector_size == 0 {
            bail!("store.default_vector_size must be > 0");
        }
        if self.embedding.timeout_secs == 0 {
            bail!("embedding.timeout_secs must be > 0");
        }
        if self.embedding.model.trim().is_empty() {
            bail!("embedding.model must not be empty");
        }
        if self.search.default_limit < 1 {
            bail!("search.default_limit must be >= 1");
        }
        Ok(())
    }
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("{} must be a boolean, got '{}'", key, other),
    }
}

fn parse_num<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| anyhow!("{} must be a non-negative integer: {}", key, e))
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;

    Ok(config)
}

/// Check that the configured environment is safe to start in.
///
/// In production the production endpoint chain must resolve to an `https`
/// URL with a credential.
pub fn validate_environment(config: &Config) -> Result<()> {
    if !config.environment.is_production() {
        return Ok(());
    }

    let profile = resolve(None, Environment::Production, &config.store)
        .map_err(|e| anyhow!("invalid production store configuration: {}", e))?;

    if profile.scheme != "https" {
        bail!(
            "production store endpoint must use https, got '{}'",
            profile.scheme
        );
    }
    if profile.api_key.is_none() {
        bail!("production store endpoint requires an API key");
    }

    info!(host = %profile.host, "production environment validated");
    Ok(())
}
