use std::env;
use std::time::Duration;

use dotenvy::dotenv;
use reqwest::Client;

use crate::constants::{
    DEFAULT_HTTP_TIMEOUT, ENV_HTTP_TIMEOUT_SECS, ENV_SERVER_URL, ENV_SYSTEM_TOKEN,
};
use crate::error::{OneApiError, Result};

/// Connection settings. Unset server URL, system token and timeout fall back
/// to `ONE_API_URL`, `ONE_API_SYSTEM_TOKEN` and `ONE_API_HTTP_TIMEOUT_SECS`
/// when the client is built; the timeout then defaults to 60s.
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub server_url: Option<String>,
    pub system_token: Option<String>,
    pub timeout: Option<Duration>,
    /// Transport override; its own settings are kept, `timeout` still applies per request
    pub http_client: Option<Client>,
}

impl ClientConfig {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: Some(server_url.into()),
            ..Self::default()
        }
    }

    /// Everything from the environment (and `.env`, if present).
    pub fn from_env() -> Self {
        dotenv().ok();
        Self::from_lookup(non_empty_env)
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let timeout = lookup(ENV_HTTP_TIMEOUT_SECS)
            .and_then(|s| s.trim().parse::<u64>().ok())
            .map(Duration::from_secs);

        Self {
            server_url: lookup(ENV_SERVER_URL),
            system_token: lookup(ENV_SYSTEM_TOKEN),
            timeout,
            http_client: None,
        }
    }

    pub fn with_system_token(mut self, token: impl Into<String>) -> Self {
        self.system_token = Some(token.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_http_client(mut self, client: Client) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Fill unset fields from the environment and validate.
    pub(crate) fn resolve(self) -> Result<ResolvedConfig> {
        if self.server_url.is_some() && self.system_token.is_some() && self.timeout.is_some() {
            return self.finish();
        }
        dotenv().ok();
        self.resolve_with(non_empty_env)
    }

    /// Explicit values win; `lookup` supplies the rest by env var name.
    fn resolve_with(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<ResolvedConfig> {
        let fallback = Self::from_lookup(lookup);
        self.server_url = self.server_url.or(fallback.server_url);
        self.system_token = self.system_token.or(fallback.system_token);
        self.timeout = self.timeout.or(fallback.timeout);
        self.finish()
    }

    fn finish(self) -> Result<ResolvedConfig> {
        let server_url = self
            .server_url
            .map(|u| u.trim().trim_end_matches('/').to_string())
            .filter(|u| !u.is_empty())
            .ok_or_else(|| {
                OneApiError::Config(format!(
                    "server URL not set (pass it explicitly or set {ENV_SERVER_URL})"
                ))
            })?;
        url::Url::parse(&server_url)?;

        let timeout = self.timeout.unwrap_or(DEFAULT_HTTP_TIMEOUT);
        if timeout.is_zero() {
            return Err(OneApiError::Config("timeout must be non-zero".into()));
        }

        let http_client = match self.http_client {
            Some(client) => client,
            None => Client::builder().timeout(timeout).build()?,
        };

        Ok(ResolvedConfig {
            server_url,
            system_token: self.system_token.filter(|t| !t.is_empty()),
            timeout,
            http_client,
        })
    }
}

#[derive(Debug, Clone)]
pub(crate) struct ResolvedConfig {
    /// Validated, without trailing slash; endpoints are appended verbatim
    pub server_url: String,
    pub system_token: Option<String>,
    pub timeout: Duration,
    pub http_client: Client,
}

fn non_empty_env(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}
