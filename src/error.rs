use crate::envelope::ApiResponse;

#[derive(Debug, thiserror::Error)]
pub enum OneApiError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Failed to encode request: {0}")]
    Encode(#[source] serde_json::Error),

    /// The body was not a valid envelope. The session cookie, if any, is kept.
    #[error("Failed to decode response: {source}")]
    Decode {
        #[source]
        source: serde_json::Error,
        session_id: Option<String>,
    },

    /// The server answered `success: false`. Displays as the server message.
    #[error("{message}")]
    Api {
        message: String,
        response: Box<ApiResponse>,
    },

    /// `data` did not have the shape expected for `context`
    #[error("Unexpected {context} payload: {source}")]
    Shape {
        context: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// A step of a multi-call operation failed; nothing already committed is undone.
    #[error("{step} failed: {source}")]
    Step {
        step: &'static str,
        #[source]
        source: Box<OneApiError>,
    },

    #[error("Invalid header value: {0}")]
    InvalidHeader(#[from] reqwest::header::InvalidHeaderValue),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("System token is not configured")]
    MissingSystemToken,

    #[error("Login response carried no session cookie")]
    MissingSession,

    #[error("No key named {0:?} found after creation")]
    KeyNotFound(String),
}

impl OneApiError {
    /// Session id observed on the failed response, if the body got that far.
    pub fn session_id(&self) -> Option<&str> {
        match self {
            OneApiError::Api { response, .. } => response.session_id.as_deref(),
            OneApiError::Decode { session_id, .. } => session_id.as_deref(),
            OneApiError::Step { source, .. } => source.session_id(),
            _ => None,
        }
    }

    /// The partially decoded response of a business failure.
    pub fn response(&self) -> Option<&ApiResponse> {
        match self {
            OneApiError::Api { response, .. } => Some(response),
            OneApiError::Step { source, .. } => source.response(),
            _ => None,
        }
    }

    pub(crate) fn step(step: &'static str) -> impl FnOnce(OneApiError) -> OneApiError {
        move |source| OneApiError::Step {
            step,
            source: Box::new(source),
        }
    }
}

pub type Result<T> = std::result::Result<T, OneApiError>;
