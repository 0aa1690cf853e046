//! Store connection resolution.
//!
//! Each field of a connection (url, credential, verify flag) is resolved
//! independently through the chain
//!
//! ```text
//! request override → [store.<environment>] → [store] → default
//! ```
//!
//! Empty strings count as unset. The resulting [`ConnectionProfile`] also
//! records whether the client may come from the shared pool or must be
//! exclusive to one session.

use docsplorer_core::{SearchError, SearchResult};
use reqwest::Url;
use serde::Deserialize;
use std::fmt;
use tracing::debug;

use crate::config::{EndpointSettings, Environment, StoreConfig};

pub const DEFAULT_STORE_URL: &str = "http://localhost:6333";

/// Per-request connection parameters.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ConnectionOverrides {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub verify_tls: Option<bool>,
}

impl ConnectionOverrides {
    /// True when no field carries a value.
    pub fn is_empty(&self) -> bool {
        non_empty(&self.url).is_none()
            && non_empty(&self.api_key).is_none()
            && self.verify_tls.is_none()
    }
}

/// Whether a client may be shared across sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolKind {
    Shared(Environment),
    Exclusive,
}

#[derive(Clone, PartialEq)]
pub struct ConnectionProfile {
    pub url: String,
    pub scheme: String,
    pub host: String,
    pub port: Option<u16>,
    pub api_key: Option<String>,
    pub verify_tls: bool,
    pub pool: PoolKind,
}

impl fmt::Debug for ConnectionProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionProfile")
            .field("url", &self.url)
            .field("scheme", &self.scheme)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("verify_tls", &self.verify_tls)
            .field("pool", &self.pool)
            .finish()
    }
}

/// Where a resolved field came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Request,
    Tagged(Environment),
    Generic,
    Default,
}

impl Source {
    pub fn as_str(self) -> &'static str {
        match self {
            Source::Request => "request",
            Source::Tagged(env) => env.as_str(),
            Source::Generic => "generic",
            Source::Default => "default",
        }
    }
}

/// Resolve a connection profile.
///
/// With non-empty `overrides` the profile is exclusive and resolves through
/// the development chain; combining overrides with the production
/// environment is rejected.
pub fn resolve(
    overrides: Option<&ConnectionOverrides>,
    environment: Environment,
    settings: &StoreConfig,
) -> SearchResult<ConnectionProfile> {
    let overrides = overrides.filter(|o| !o.is_empty());
    if overrides.is_some() && environment.is_production() {
        return Err(SearchError::Config(
            "custom connection parameters cannot be combined with the production environment"
                .to_string(),
        ));
    }

    let request = overrides
        .map(|o| EndpointSettings {
            url: o.url.clone(),
            api_key: o.api_key.clone(),
            verify_tls: o.verify_tls,
        })
        .unwrap_or_default();
    let generic = settings.generic();
    let layers = [
        (Source::Request, &request),
        (Source::Tagged(environment), settings.tagged(environment)),
        (Source::Generic, &generic),
    ];

    let (url, url_source) = layers
        .iter()
        .find_map(|(source, layer)| non_empty(&layer.url).map(|u| (u.to_string(), *source)))
        .unwrap_or_else(|| (DEFAULT_STORE_URL.to_string(), Source::Default));
    let (api_key, key_source) = layers
        .iter()
        .find_map(|(source, layer)| {
            non_empty(&layer.api_key).map(|k| (Some(k.to_string()), *source))
        })
        .unwrap_or((None, Source::Default));
    let (verify_flag, verify_source) = layers
        .iter()
        .find_map(|(source, layer)| layer.verify_tls.map(|v| (v, *source)))
        .unwrap_or((true, Source::Default));

    let parsed = Url::parse(&url)
        .map_err(|e| SearchError::Config(format!("invalid store url '{}': {}", url, e)))?;
    let host = parsed
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| SearchError::Config(format!("store url '{}' has no host", url)))?
        .to_string();
    let scheme = parsed.scheme().to_string();

    // Plain transports never verify; force_insecure overrides any flag.
    let verify_tls = scheme == "https" && !settings.force_insecure && verify_flag;

    debug!(
        environment = %environment,
        url_source = url_source.as_str(),
        api_key_source = key_source.as_str(),
        verify_source = verify_source.as_str(),
        host = %host,
        verify_tls,
        "resolved store connection"
    );

    Ok(ConnectionProfile {
        url: url.trim_end_matches('/').to_string(),
        scheme,
        host,
        port: parsed.port(),
        api_key,
        verify_tls,
        pool: if overrides.is_some() {
            PoolKind::Exclusive
        } else {
            PoolKind::Shared(environment)
        },
    })
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> StoreConfig {
        StoreConfig {
            url: Some("http://generic:6333".to_string()),
            api_key: Some("generic-key".to_string()),
            development: EndpointSettings {
                url: Some("https://dev.example.com".to_string()),
                ..EndpointSettings::default()
            },
            production: EndpointSettings {
                url: Some("https://prod.example.com:6334".to_string()),
                api_key: Some("prod-key".to_string()),
                verify_tls: Some(false),
            },
            ..StoreConfig::default()
        }
    }

    #[test]
    fn test_defaults_when_nothing_configured() {
        let profile = resolve(None, Environment::Development, &StoreConfig::default()).unwrap();
        assert_eq!(profile.url, DEFAULT_STORE_URL);
        assert_eq!(profile.host, "localhost");
        assert_eq!(profile.port, Some(6333));
        assert_eq!(profile.api_key, None);
        // Plain http never verifies.
        assert!(!profile.verify_tls);
        assert_eq!(profile.pool, PoolKind::Shared(Environment::Development));
    }

    #[test]
    fn test_tagged_layer_wins_per_field() {
        let profile = resolve(None, Environment::Development, &settings()).unwrap();
        assert_eq!(profile.url, "https://dev.example.com");
        // No dev key configured: falls through to the generic layer.
        assert_eq!(profile.api_key.as_deref(), Some("generic-key"));
        assert!(profile.verify_tls);

        let profile = resolve(None, Environment::Production, &settings()).unwrap();
        assert_eq!(profile.host, "prod.example.com");
        assert_eq!(profile.port, Some(6334));
        assert_eq!(profile.api_key.as_deref(), Some("prod-key"));
        assert!(!profile.verify_tls);
    }

    #[test]
    fn test_request_overrides_are_exclusive() {
        let overrides = ConnectionOverrides {
            url: Some("https://custom.example.com/".to_string()),
            api_key: Some(String::new()),
            verify_tls: None,
        };
        let profile = resolve(Some(&overrides), Environment::Development, &settings()).unwrap();
        assert_eq!(profile.url, "https://custom.example.com");
        // Empty strings count as unset.
        assert_eq!(profile.api_key.as_deref(), Some("generic-key"));
        assert_eq!(profile.pool, PoolKind::Exclusive);
    }

    #[test]
    fn test_request_verify_flag_wins_over_layers() {
        let mut settings = settings();
        settings.verify_tls = Some(true);
        settings.development.verify_tls = Some(true);
        let overrides = ConnectionOverrides {
            url: Some("https://custom.example.com".to_string()),
            verify_tls: Some(false),
            ..ConnectionOverrides::default()
        };
        let profile = resolve(Some(&overrides), Environment::Development, &settings).unwrap();
        assert_eq!(profile.scheme, "https");
        assert!(!profile.verify_tls);

        // A verify flag alone is a custom connection on the development chain.
        let overrides = ConnectionOverrides {
            verify_tls: Some(false),
            ..ConnectionOverrides::default()
        };
        assert!(!overrides.is_empty());
        let profile = resolve(Some(&overrides), Environment::Development, &settings).unwrap();
        assert_eq!(profile.url, "https://dev.example.com");
        assert!(!profile.verify_tls);
        assert_eq!(profile.pool, PoolKind::Exclusive);
    }

    #[test]
    fn test_plain_http_never_verifies() {
        let overrides = ConnectionOverrides {
            url: Some("http://custom.example.com:6333".to_string()),
            verify_tls: Some(true),
            ..ConnectionOverrides::default()
        };
        let profile = resolve(Some(&overrides), Environment::Development, &settings()).unwrap();
        assert_eq!(profile.scheme, "http");
        assert!(!profile.verify_tls);
    }

    #[test]
    fn test_empty_overrides_use_the_pool() {
        let overrides = ConnectionOverrides {
            url: Some("  ".to_string()),
            ..ConnectionOverrides::default()
        };
        assert!(overrides.is_empty());
        let profile = resolve(Some(&overrides), Environment::Production, &settings()).unwrap();
        assert_eq!(profile.pool, PoolKind::Shared(Environment::Production));
    }

    #[test]
    fn test_production_with_overrides_is_rejected() {
        let overrides = ConnectionOverrides {
            url: Some("https://custom.example.com".to_string()),
            ..ConnectionOverrides::default()
        };
        let err = resolve(Some(&overrides), Environment::Production, &settings()).unwrap_err();
        assert!(matches!(err, SearchError::Config(_)));
    }

    #[test]
    fn test_force_insecure_disables_verification() {
        let mut settings = settings();
        settings.force_insecure = true;
        let profile = resolve(None, Environment::Development, &settings).unwrap();
        assert_eq!(profile.scheme, "https");
        assert!(!profile.verify_tls);
    }

    #[test]
    fn test_invalid_urls() {
        for url in ["not a url", "unix:/tmp/qdrant.sock"] {
            let overrides = ConnectionOverrides {
                url: Some(url.to_string()),
                ..ConnectionOverrides::default()
            };
            let err = resolve(Some(&overrides), Environment::Development, &settings()).unwrap_err();
            assert!(matches!(err, SearchError::Config(_)), "{}", url);
        }
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let profile = resolve(None, Environment::Production, &settings()).unwrap();
        let debug = format!("{:?}", profile);
        assert!(!debug.contains("prod-key"));
        assert!(debug.contains("<redacted>"));
    }
}
