use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_LENGTH, RANGE};
use reqwest::{Client, StatusCode};
use splitpdf_core::{
    DocumentLoader, EngineError, LoadMode, LoadingParams, PageDocument, PdfEngine,
};
use tracing::{debug, instrument};
use url::Url;

use crate::error::HttpError;

/// Chunks reserved up front for a ranged download; the buffer grows past that.
const INITIAL_CHUNKS: u64 = 16;

/// Fetches page files over HTTP and opens them with a [`PdfEngine`].
pub struct HttpDocumentLoader {
    client: Client,
    engine: Arc<dyn PdfEngine>,
}

impl HttpDocumentLoader {
    pub fn new(client: Client, engine: Arc<dyn PdfEngine>) -> Self {
        Self { client, engine }
    }

    /// Downloads `url` according to `params` without opening it.
    pub async fn fetch(&self, url: &str, params: &LoadingParams) -> Result<Bytes, HttpError> {
        Url::parse(url).map_err(|err| HttpError::InvalidUrl {
            url: url.to_owned(),
            message: err.to_string(),
        })?;
        let request = PageRequest {
            url,
            headers: header_map(params)?,
            max_size: params.max_file_size,
        };
        match params.mode {
            LoadMode::Whole => self.fetch_whole(&request).await,
            LoadMode::Range => {
                self.fetch_ranged(&request, params.effective_chunk_size())
                    .await
            }
        }
    }

    async fn fetch_whole(&self, request: &PageRequest<'_>) -> Result<Bytes, HttpError> {
        let url = request.url;
        let response = self
            .client
            .get(url)
            .headers(request.headers.clone())
            .send()
            .await
            .map_err(|err| HttpError::transport(url, err))?;
        if let Some(length) = response.content_length() {
            request.check_size(length)?;
        }
        let data = read_success(url, response).await?;
        request.check_size(data.len() as u64)?;
        Ok(data)
    }

    async fn fetch_ranged(
        &self,
        request: &PageRequest<'_>,
        chunk_size: usize,
    ) -> Result<Bytes, HttpError> {
        let url = request.url;
        let head = self
            .client
            .head(url)
            .headers(request.headers.clone())
            .send()
            .await
            .map_err(|err| HttpError::transport(url, err))?;
        let length = head
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<u64>().ok())
            .filter(|length| *length > 0);
        let Some(length) = length.filter(|_| head.status().is_success()) else {
            debug!(url, status = %head.status(), "no usable length; reading whole file");
            return self.fetch_whole(request).await;
        };
        request.check_size(length)?;

        let initial = length.min(chunk_size as u64 * INITIAL_CHUNKS);
        let mut data = BytesMut::with_capacity(initial as usize);
        for (start, end) in chunk_ranges(length, chunk_size) {
            let response = self
                .client
                .get(url)
                .headers(request.headers.clone())
                .header(RANGE, format!("bytes={start}-{end}"))
                .send()
                .await
                .map_err(|err| HttpError::transport(url, err))?;
            match response.status() {
                StatusCode::PARTIAL_CONTENT => {
                    let chunk = response
                        .bytes()
                        .await
                        .map_err(|err| HttpError::transport(url, err))?;
                    data.extend_from_slice(&chunk);
                    request.check_size(data.len() as u64)?;
                }
                StatusCode::OK => {
                    debug!(url, "server ignored range request");
                    let data = read_success(url, response).await?;
                    request.check_size(data.len() as u64)?;
                    return Ok(data);
                }
                status => {
                    return Err(HttpError::Status {
                        url: url.to_owned(),
                        status: status.as_u16(),
                    })
                }
            }
        }

        if data.len() as u64 != length {
            return Err(HttpError::Truncated {
                url: url.to_owned(),
                received: data.len() as u64,
                expected: length,
            });
        }
        Ok(data.freeze())
    }
}

struct PageRequest<'a> {
    url: &'a str,
    headers: HeaderMap,
    max_size: u64,
}

impl PageRequest<'_> {
    fn check_size(&self, length: u64) -> Result<(), HttpError> {
        if length > self.max_size {
            return Err(HttpError::TooLarge {
                url: self.url.to_owned(),
                length,
                limit: self.max_size,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentLoader for HttpDocumentLoader {
    #[instrument(skip(self, params), fields(mode = ?params.mode))]
    async fn load(
        &self,
        url: &str,
        params: &LoadingParams,
    ) -> Result<Arc<dyn PageDocument>, EngineError> {
        let data = self.fetch(url, params).await?;
        debug!(url, bytes = data.len(), "page file fetched");
        self.engine.open_document(data, url).await
    }
}

async fn read_success(url: &str, response: reqwest::Response) -> Result<Bytes, HttpError> {
    let status = response.status();
    if !status.is_success() {
        return Err(HttpError::Status {
            url: url.to_owned(),
            status: status.as_u16(),
        });
    }
    response
        .bytes()
        .await
        .map_err(|err| HttpError::transport(url, err))
}

pub(crate) fn header_map(params: &LoadingParams) -> Result<HeaderMap, HttpError> {
    let mut headers = HeaderMap::with_capacity(params.http_headers.len());
    for (name, value) in &params.http_headers {
        let invalid = || HttpError::InvalidHeader { name: name.clone() };
        let key = HeaderName::from_bytes(name.as_bytes()).map_err(|_| invalid())?;
        let value = HeaderValue::from_str(value).map_err(|_| invalid())?;
        headers.insert(key, value);
    }
    Ok(headers)
}

/// Inclusive byte ranges covering `length` bytes in `chunk_size` pieces.
pub fn chunk_ranges(length: u64, chunk_size: usize) -> Vec<(u64, u64)> {
    let chunk = chunk_size.max(1) as u64;
    (0..length)
        .step_by(chunk as usize)
        .map(|start| (start, (start + chunk).min(length) - 1))
        .collect()
}
