//! reqwest-backed manifest and per-page document fetching.

mod error;
mod loader;
mod manifest;
mod reachability;

#[cfg(test)]
mod test_server;

use std::time::Duration;

pub use error::HttpError;
pub use loader::{chunk_ranges, HttpDocumentLoader};
pub use manifest::HttpManifestSource;
pub use reachability::{check_pages, PageCheck};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Client shared by the manifest source, the page loader and the reachability check.
pub fn build_client() -> Result<reqwest::Client, HttpError> {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|err| HttpError::Client(err.to_string()))
}
