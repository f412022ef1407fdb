use serde::{Deserialize, Serialize};

use crate::error::ManifestLoadError;

/// A document that was split into one PDF file per page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub doc_id: String,
    pub filename: String,
    pub page_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    pub pages: Vec<PageEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageEntry {
    pub n: usize,
    pub pdf_url: String,
}

impl Manifest {
    pub fn from_json(url: &str, payload: &str) -> Result<Self, ManifestLoadError> {
        let manifest: Manifest =
            serde_json::from_str(payload).map_err(|err| ManifestLoadError::Decode {
                url: url.to_owned(),
                message: err.to_string(),
            })?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Checks that pages are numbered `1..=page_count` in order.
    pub fn validate(&self) -> Result<(), ManifestLoadError> {
        if self.page_count == 0 {
            return Err(ManifestLoadError::Invalid(
                "manifest declares zero pages".to_owned(),
            ));
        }
        if self.pages.len() != self.page_count {
            return Err(ManifestLoadError::Invalid(format!(
                "pageCount is {} but {} page entries are listed",
                self.page_count,
                self.pages.len()
            )));
        }
        for (index, entry) in self.pages.iter().enumerate() {
            if entry.n != index + 1 {
                return Err(ManifestLoadError::Invalid(format!(
                    "page entry {} is numbered {}, expected {}",
                    index,
                    entry.n,
                    index + 1
                )));
            }
            if entry.pdf_url.trim().is_empty() {
                return Err(ManifestLoadError::Invalid(format!(
                    "page {} has an empty pdfUrl",
                    entry.n
                )));
            }
        }
        Ok(())
    }

    pub fn page_url(&self, page: usize) -> Option<&str> {
        page.checked_sub(1)
            .and_then(|index| self.pages.get(index))
            .map(|entry| entry.pdf_url.as_str())
    }

    pub fn contains_page(&self, page: usize) -> bool {
        (1..=self.page_count).contains(&page)
    }
}
