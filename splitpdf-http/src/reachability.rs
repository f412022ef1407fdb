use std::sync::Arc;

use reqwest::header::{HeaderMap, RANGE};
use reqwest::{Client, StatusCode};
use splitpdf_core::{LoadingParams, Manifest};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::error::HttpError;
use crate::loader::header_map;

/// Reachability of one page file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageCheck {
    pub page: usize,
    pub url: String,
    pub outcome: Result<u16, HttpError>,
}

impl PageCheck {
    pub fn is_reachable(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Issues a `HEAD` for every page of `manifest`, at most `concurrency` at a
/// time. Results are ordered by page number.
pub async fn check_pages(
    client: &Client,
    manifest: &Manifest,
    params: &LoadingParams,
    concurrency: usize,
) -> Result<Vec<PageCheck>, HttpError> {
    let headers = header_map(params)?;
    let limit = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut tasks = JoinSet::new();

    for entry in &manifest.pages {
        let Ok(permit) = Arc::clone(&limit).acquire_owned().await else {
            break;
        };
        let client = client.clone();
        let headers = headers.clone();
        let page = entry.n;
        let url = entry.pdf_url.clone();
        tasks.spawn(async move {
            let _permit = permit;
            let outcome = check_one(&client, &url, headers).await;
            PageCheck { page, url, outcome }
        });
    }

    let mut checks = Vec::with_capacity(manifest.pages.len());
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(check) => checks.push(check),
            Err(err) => warn!(%err, "page check task failed"),
        }
    }
    checks.sort_by_key(|check| check.page);
    Ok(checks)
}

async fn check_one(client: &Client, url: &str, headers: HeaderMap) -> Result<u16, HttpError> {
    let response = client
        .head(url)
        .headers(headers.clone())
        .send()
        .await
        .map_err(|err| HttpError::transport(url, err))?;

    let response = if response.status() == StatusCode::METHOD_NOT_ALLOWED {
        debug!(url, "HEAD not allowed; probing with a one-byte range");
        client
            .get(url)
            .headers(headers)
            .header(RANGE, "bytes=0-0")
            .send()
            .await
            .map_err(|err| HttpError::transport(url, err))?
    } else {
        response
    };

    let status = response.status();
    if status.is_success() {
        Ok(status.as_u16())
    } else {
        Err(HttpError::Status {
            url: url.to_owned(),
            status: status.as_u16(),
        })
    }
}
