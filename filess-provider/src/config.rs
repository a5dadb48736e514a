//! Provider configuration

use thiserror::Error;

use crate::client::{ApiClient, ClientError};

/// Environment variable holding the API token
pub const API_TOKEN_ENV: &str = "FILESS_API_TOKEN";
/// Environment variable overriding the API base URL
pub const API_URL_ENV: &str = "FILESS_API_URL";
/// Base URL used when none is configured
pub const DEFAULT_API_URL: &str = "https://backend.filess.io";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("api_token cannot be empty")]
    EmptyToken,

    #[error("api_url cannot be empty")]
    EmptyUrl,

    #[error(transparent)]
    Client(#[from] ClientError),
}

/// Settings needed to open an API session
#[derive(Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    pub api_url: String,
    pub api_token: String,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_url", &self.api_url)
            .field("api_token", &"<redacted>")
            .finish()
    }
}

impl ProviderConfig {
    pub fn new(api_url: impl Into<String>, api_token: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            api_token: api_token.into(),
        }
    }

    /// Read `FILESS_API_TOKEN` and `FILESS_API_URL`, falling back to the default URL
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            api_url: lookup(API_URL_ENV).unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            api_token: lookup(API_TOKEN_ENV).unwrap_or_default(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_token.is_empty() {
            return Err(ConfigError::EmptyToken);
        }
        if self.api_url.is_empty() {
            return Err(ConfigError::EmptyUrl);
        }
        Ok(())
    }

    /// Validate and open a session
    pub fn connect(&self) -> Result<ApiClient, ConfigError> {
        self.validate()?;
        Ok(ApiClient::new(&self.api_url, &self.api_token)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_url_when_unset() {
        let env = HashMap::from([(API_TOKEN_ENV, "secret")]);
        let config = ProviderConfig::from_lookup(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert_eq!(config.api_token, "secret");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_empty_values() {
        assert!(matches!(
            ProviderConfig::new(DEFAULT_API_URL, "").validate(),
            Err(ConfigError::EmptyToken)
        ));
        assert!(matches!(
            ProviderConfig::new("", "secret").connect(),
            Err(ConfigError::EmptyUrl)
        ));
    }

    #[test]
    fn debug_hides_token() {
        let config = ProviderConfig::new(DEFAULT_API_URL, "secret");
        assert!(!format!("{:?}", config).contains("secret"));
    }
}
