use std::collections::BTreeMap;
use std::fmt;
use std::sync::Mutex;

use rand::distr::Alphanumeric;
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use reqwest::Method;
use reqwest::header::{
    AUTHORIZATION, CONTENT_TYPE, COOKIE, HeaderMap, HeaderName, HeaderValue, SET_COOKIE,
};
use serde::Serialize;
use tracing::{debug, warn};
use url::Url;

use crate::config::{ClientConfig, ResolvedConfig};
use crate::constants::{CONTENT_TYPE_JSON, SESSION_COOKIE};
use crate::envelope::{ApiResponse, Envelope, parse_set_cookie};
use crate::error::{OneApiError, Result};

/// How a request authenticates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Auth<'a> {
    None,
    /// `Authorization: Bearer <token>` (system token or a user's access token)
    Bearer(&'a str),
    /// `Cookie: session=<id>`
    Session(&'a str),
}

/// One call against the API. GET requests carry their payload as query
/// parameters and never send a body; every other method sends `body` as JSON
/// (`null` when unset) and ignores `query`.
#[derive(Debug, Clone)]
pub struct Request<'a> {
    pub method: Method,
    pub endpoint: String,
    pub auth: Auth<'a>,
    pub query: BTreeMap<String, String>,
    pub body: Option<Vec<u8>>,
    /// Applied last, replacing any header set from `auth` or `body`
    pub headers: HeaderMap,
}

impl<'a> Request<'a> {
    pub fn new(method: Method, endpoint: impl Into<String>) -> Self {
        Self {
            method,
            endpoint: endpoint.into(),
            auth: Auth::None,
            query: BTreeMap::new(),
            body: None,
            headers: HeaderMap::new(),
        }
    }

    pub fn get(endpoint: impl Into<String>) -> Self {
        Self::new(Method::GET, endpoint)
    }

    pub fn post(endpoint: impl Into<String>) -> Self {
        Self::new(Method::POST, endpoint)
    }

    pub fn put(endpoint: impl Into<String>) -> Self {
        Self::new(Method::PUT, endpoint)
    }

    pub fn auth(mut self, auth: Auth<'a>) -> Self {
        self.auth = auth;
        self
    }

    /// Query parameter, only sent on GET.
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    pub fn json<T: Serialize + ?Sized>(mut self, payload: &T) -> Result<Self> {
        self.body = Some(serde_json::to_vec(payload).map_err(OneApiError::Encode)?);
        Ok(self)
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }
}

/// Client for a one-api server.
///
/// Holds no per-call state besides the random source used for generated
/// usernames and passwords, so one instance can be shared across tasks.
pub struct OneApiClient {
    config: ResolvedConfig,
    rng: Mutex<Box<dyn RngCore + Send>>,
}

impl fmt::Debug for OneApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OneApiClient")
            .field("server_url", &self.config.server_url)
            .field("timeout", &self.config.timeout)
            .field("has_system_token", &self.config.system_token.is_some())
            .finish_non_exhaustive()
    }
}

impl OneApiClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let config = config.resolve()?;
        Ok(Self {
            config,
            rng: Mutex::new(Box::new(StdRng::from_os_rng())),
        })
    }

    /// Build entirely from `ONE_API_URL` / `ONE_API_SYSTEM_TOKEN`.
    pub fn from_env() -> Result<Self> {
        Self::new(ClientConfig::from_env())
    }

    /// Replace the random source (e.g. a seeded `StdRng` in tests).
    pub fn with_rng(self, rng: impl RngCore + Send + 'static) -> Self {
        Self {
            rng: Mutex::new(Box::new(rng)),
            ..self
        }
    }

    pub fn server_url(&self) -> &str {
        &self.config.server_url
    }

    pub(crate) fn system_auth(&self) -> Result<Auth<'_>> {
        self.config
            .system_token
            .as_deref()
            .map(Auth::Bearer)
            .ok_or(OneApiError::MissingSystemToken)
    }

    /// Send one request and decode the envelope.
    ///
    /// `success: false` is an error whatever the HTTP status; the error keeps
    /// the decoded response so a session cookie or partial data stay visible.
    pub async fn send_request(&self, request: Request<'_>) -> Result<ApiResponse> {
        let mut url = Url::parse(&format!("{}{}", self.config.server_url, request.endpoint))?;

        let mut headers = HeaderMap::new();
        let mut body = None;
        if request.method == Method::GET {
            if !request.query.is_empty() {
                url.query_pairs_mut().extend_pairs(request.query.iter());
            }
        } else {
            // A missing payload still goes out as JSON `null`
            headers.insert(CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE_JSON));
            body = Some(request.body.unwrap_or_else(|| b"null".to_vec()));
        }
        match request.auth {
            Auth::None => {}
            Auth::Bearer(token) => {
                headers.insert(AUTHORIZATION, header_value(&format!("Bearer {token}"))?);
            }
            Auth::Session(session_id) => {
                headers.insert(COOKIE, header_value(&format!("{SESSION_COOKIE}={session_id}"))?);
            }
        }
        for (name, value) in request.headers.iter() {
            headers.insert(name.clone(), value.clone());
        }

        debug!(method = %request.method, endpoint = %request.endpoint, "Sending one-api request");

        let mut builder = self
            .config
            .http_client
            .request(request.method.clone(), url)
            .timeout(self.config.timeout)
            .headers(headers);
        if let Some(bytes) = body {
            builder = builder.body(bytes);
        }

        let response = builder.send().await?;
        let status = response.status();
        let session_id = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .find_map(|h| parse_set_cookie(h, SESSION_COOKIE));
        let bytes = response.bytes().await?;

        let envelope: Envelope = match serde_json::from_slice(&bytes) {
            Ok(envelope) => envelope,
            Err(source) => {
                warn!(endpoint = %request.endpoint, %status, "Undecodable one-api response: {source}");
                return Err(OneApiError::Decode { source, session_id });
            }
        };

        let response = ApiResponse {
            session_id,
            envelope,
        };
        if !response.envelope.success {
            warn!(
                endpoint = %request.endpoint,
                %status,
                "one-api request failed: {}",
                response.envelope.message
            );
            return Err(OneApiError::Api {
                message: response.envelope.message.clone(),
                response: Box::new(response),
            });
        }
        Ok(response)
    }

    pub(crate) fn random_string(&self, len: usize) -> String {
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        (0..len)
            .map(|_| char::from(rng.sample(Alphanumeric)))
            .collect()
    }
}

fn header_value(value: &str) -> Result<HeaderValue> {
    Ok(HeaderValue::from_str(value)?)
}
