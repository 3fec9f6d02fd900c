//! Client configuration.
//!
//! A `ClientConfig` is built once and handed to `Connection::new`; nothing in
//! the crate reads ambient state after that. Loading the key from the
//! environment is offered as a convenience for binaries and tests.

use std::fmt;

use log::debug;
use url::Url;

use crate::error::ConfigError;

pub const API_KEY_ENV: &str = "MAILCHIMP_APIKEY";
pub const ENDPOINT_ENV: &str = "MAILCHIMP_ENDPOINT";
pub const DEFAULT_DATACENTER: &str = "us1";
pub const API_VERSION: &str = "1.3";

#[derive(Clone, PartialEq, Eq)]
pub struct ClientConfig {
    api_key: String,
    endpoint: Option<String>,
}

impl ClientConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            endpoint: None,
        }
    }

    /// Point the client at a different base URL instead of the one derived
    /// from the key's datacenter.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Read `MAILCHIMP_APIKEY` and, if set, `MAILCHIMP_ENDPOINT`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key =
            std::env::var(API_KEY_ENV).map_err(|_| ConfigError::MissingEnv(API_KEY_ENV))?;
        let mut config = Self::new(api_key);
        if let Ok(endpoint) = std::env::var(ENDPOINT_ENV) {
            debug!("Using endpoint override from {ENDPOINT_ENV}: {endpoint}");
            config = config.with_endpoint(endpoint);
        }
        Ok(config)
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// The datacenter suffix of the key (`abc-us2` -> `us2`), or the default
    /// datacenter when the key has none.
    pub fn datacenter(&self) -> &str {
        match self.api_key.rsplit_once('-') {
            Some((_, dc)) if !dc.is_empty() => dc,
            _ => DEFAULT_DATACENTER,
        }
    }

    /// Resolve and validate the endpoint URL.
    pub fn endpoint(&self) -> Result<Url, ConfigError> {
        let raw = match &self.endpoint {
            Some(endpoint) => endpoint.clone(),
            None => format!(
                "https://{}.api.mailchimp.com/{API_VERSION}/",
                self.datacenter()
            ),
        };
        Url::parse(&raw).map_err(|source| ConfigError::InvalidEndpoint { url: raw, source })
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("api_key", &mask_key(&self.api_key))
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

/// Keep the first and last four characters of a key for log lines.
pub fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}
