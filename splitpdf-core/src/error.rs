use thiserror::Error;

/// Failure reported by the rendering engine. The engine's own error types stay
/// opaque; only the message crosses into this crate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct EngineError {
    message: String,
}

impl EngineError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ManifestLoadError {
    #[error("failed to load manifest from {url}: HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("failed to load manifest from {url}: {message}")]
    Transport { url: String, message: String },
    #[error("manifest from {url} is not valid JSON: {message}")]
    Decode { url: String, message: String },
    #[error("manifest is inconsistent: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to load page {page} from {url}: {source}")]
pub struct PageLoadError {
    pub page: usize,
    pub url: String,
    pub source: EngineError,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DocumentError {
    #[error("page {page} is outside 1..={page_count}")]
    PageNotFound { page: usize, page_count: usize },
    #[error(transparent)]
    PageLoad(#[from] PageLoadError),
    #[error("document has been destroyed")]
    Destroyed,
    #[error("load of page {page} was cancelled by cleanup")]
    Cancelled { page: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to scan destinations of page {page}: {source}")]
pub struct DestinationScanError {
    pub page: usize,
    pub source: EngineError,
}

pub type DocumentResult<T> = Result<T, DocumentError>;
