use thiserror::Error;

/// Errors raised by the NVR client.
///
/// `is_retryable()` separates transient conditions (file not yet published,
/// rate limits, server errors, dropped connections) from permanent ones so the
/// download step can keep waiting on the former and give up on the latter.
#[derive(Debug, Error)]
pub enum NvrError {
    #[error("HTTP 401 Unauthorized ({0})")]
    Unauthorized(String),

    #[error("HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("{cmd} failed: {detail}")]
    Api { cmd: String, detail: String },

    #[error("Login failed: {0}")]
    Login(String),

    #[error("Request failed after session refresh retry")]
    SessionExpired,

    #[error("Export never became available for download (last HTTP {status})")]
    NotReady { status: u16 },

    #[error("Response missing field '{0}'")]
    MissingField(&'static str),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl NvrError {
    pub fn is_retryable(&self) -> bool {
        match self {
            NvrError::NotReady { .. } => true,
            NvrError::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            NvrError::Http(e) => e.is_timeout() || e.is_connect() || e.is_body(),
            NvrError::Unauthorized(_)
            | NvrError::Api { .. }
            | NvrError::Login(_)
            | NvrError::SessionExpired
            | NvrError::MissingField(_)
            | NvrError::Io(_)
            | NvrError::Json(_) => false,
        }
    }
}
