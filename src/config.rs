//! Environment configuration.
//!
//! Configuration-file loading lives outside this crate; whatever loads it
//! deserializes into [`EnvironmentConfig`] and hands it to
//! [`init_http_client`].

use serde::{Deserialize, Serialize};

use crate::document::Headers;
use crate::transport::{http_client_factory, HttpClient};

/// Environment-level request defaults. Every field overrides the built-in
/// transport defaults and is itself overridden by per-request fields.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestOverrides {
    pub headers: Headers,
    pub proxy: Option<String>,
    pub decompress: Option<bool>,
    pub retry: Option<u32>,
    pub throw_http_errors: Option<bool>,
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentConfig {
    pub request: Option<RequestOverrides>,
    /// Environment-wide proxy, used when the request overrides carry none.
    pub proxy: Option<String>,
}

/// Builds the HTTP client from an environment configuration.
pub fn init_http_client(config: &EnvironmentConfig) -> HttpClient {
    let mut overrides = config.request.clone().unwrap_or_default();
    if overrides.proxy.is_none() {
        overrides.proxy = config.proxy.clone();
    }
    http_client_factory(Some(overrides))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_with_defaults() {
        let config: EnvironmentConfig = serde_json::from_str(
            r#"{"request": {"headers": [["authorization", "Bearer x"]]}, "proxy": "http://proxy:3128"}"#,
        )
        .unwrap();
        let request = config.request.as_ref().unwrap();
        assert_eq!(request.headers[0].0, "authorization");
        assert_eq!(request.retry, None);
        assert_eq!(config.proxy.as_deref(), Some("http://proxy:3128"));

        let empty: EnvironmentConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(empty, EnvironmentConfig::default());
    }
}
