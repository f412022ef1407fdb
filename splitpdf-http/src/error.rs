use splitpdf_core::EngineError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HttpError {
    #[error("failed to build HTTP client: {0}")]
    Client(String),
    #[error("`{url}` is not a valid URL: {message}")]
    InvalidUrl { url: String, message: String },
    #[error("invalid HTTP header `{name}`")]
    InvalidHeader { name: String },
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },
    #[error("{url} answered HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("{url} is {length} bytes, above the {limit} byte limit")]
    TooLarge { url: String, length: u64, limit: u64 },
    #[error("{url} returned {received} bytes, expected {expected}")]
    Truncated {
        url: String,
        received: u64,
        expected: u64,
    },
}

impl HttpError {
    pub(crate) fn transport(url: &str, err: reqwest::Error) -> Self {
        HttpError::Transport {
            url: url.to_owned(),
            message: err.to_string(),
        }
    }
}

impl From<HttpError> for EngineError {
    fn from(err: HttpError) -> Self {
        EngineError::new(err.to_string())
    }
}
