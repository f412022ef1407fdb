use async_trait::async_trait;
use reqwest::Client;
use splitpdf_core::{Manifest, ManifestLoadError, ManifestSource};
use tracing::{debug, instrument};
use url::Url;

/// Fetches manifests with a plain `GET`.
#[derive(Clone)]
pub struct HttpManifestSource {
    client: Client,
}

impl HttpManifestSource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ManifestSource for HttpManifestSource {
    #[instrument(skip(self))]
    async fn fetch(&self, url: &str) -> Result<Manifest, ManifestLoadError> {
        let transport = |err: reqwest::Error| ManifestLoadError::Transport {
            url: url.to_owned(),
            message: err.to_string(),
        };

        let response = self.client.get(url).send().await.map_err(transport)?;
        let status = response.status();
        if !status.is_success() {
            return Err(ManifestLoadError::Status {
                url: url.to_owned(),
                status: status.as_u16(),
            });
        }
        let payload = response.text().await.map_err(transport)?;
        let mut manifest = Manifest::from_json(url, &payload)?;
        resolve_page_urls(url, &mut manifest)?;
        debug!(
            doc_id = %manifest.doc_id,
            page_count = manifest.page_count,
            "manifest fetched"
        );
        Ok(manifest)
    }
}

/// Rewrites every `pdfUrl` as an absolute URL relative to the manifest location.
fn resolve_page_urls(base: &str, manifest: &mut Manifest) -> Result<(), ManifestLoadError> {
    let base = Url::parse(base).map_err(|err| {
        ManifestLoadError::Invalid(format!("manifest URL `{base}` is invalid: {err}"))
    })?;
    for page in &mut manifest.pages {
        let resolved = base.join(&page.pdf_url).map_err(|err| {
            ManifestLoadError::Invalid(format!(
                "page {} has an invalid pdfUrl `{}`: {err}",
                page.n, page.pdf_url
            ))
        })?;
        page.pdf_url = resolved.into();
    }
    Ok(())
}
