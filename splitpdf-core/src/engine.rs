//! Contract between this crate and an external PDF rendering engine.
//!
//! The engine side supplies [`PdfEngine`], [`DocumentLoader`], [`PageDocument`]
//! and [`PageProxy`]. The adapter side implements [`DocumentProxy`], which is the
//! whole-document surface the engine's viewer and link service drive.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::destination::ExplicitDestination;
use crate::error::{DocumentResult, EngineError, ManifestLoadError};
use crate::manifest::Manifest;
use crate::reference::PageRef;

pub const DEFAULT_RANGE_CHUNK_SIZE: usize = 65_536;
/// Largest single-page file a loader accepts, in bytes.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 256 * 1024 * 1024;

/// How single-page files are fetched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LoadMode {
    /// One request for the whole file.
    #[default]
    Whole,
    /// Sequential byte-range requests of `chunk_size` bytes.
    Range,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct LoadingParams {
    pub mode: LoadMode,
    pub chunk_size: usize,
    /// Page files announcing a larger size are refused before download.
    pub max_file_size: u64,
    pub http_headers: BTreeMap<String, String>,
}

impl Default for LoadingParams {
    fn default() -> Self {
        Self {
            mode: LoadMode::Whole,
            chunk_size: DEFAULT_RANGE_CHUNK_SIZE,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            http_headers: BTreeMap::new(),
        }
    }
}

impl LoadingParams {
    pub fn ranged(chunk_size: usize) -> Self {
        Self {
            mode: LoadMode::Range,
            chunk_size: chunk_size.max(1),
            ..Self::default()
        }
    }

    pub fn effective_chunk_size(&self) -> usize {
        self.chunk_size.max(1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderIntent {
    Display,
    Print,
}

pub trait PageProxy: Send + Sync + fmt::Debug {
    /// Zero-based index of the page inside the file it came from.
    fn page_index_in_file(&self) -> usize;
    fn reference(&self) -> PageRef;
    /// `[x0, y0, x1, y1]` in PDF user space.
    fn view(&self) -> [f32; 4];
    fn rotation(&self) -> u16;
}

/// A document opened by the engine from one single-page file.
#[async_trait]
pub trait PageDocument: Send + Sync {
    fn num_pages(&self) -> usize;
    fn fingerprint(&self) -> Option<String>;
    async fn get_page(&self, index: usize) -> Result<Arc<dyn PageProxy>, EngineError>;
    async fn get_destinations(&self) -> Result<Vec<(String, ExplicitDestination)>, EngineError>;
    async fn destroy(&self);
}

/// Opens parsed documents from raw bytes.
#[async_trait]
pub trait PdfEngine: Send + Sync {
    async fn open_document(
        &self,
        data: Bytes,
        source_url: &str,
    ) -> Result<Arc<dyn PageDocument>, EngineError>;
}

/// The engine's document-loading primitive: fetch a URL and open it.
#[async_trait]
pub trait DocumentLoader: Send + Sync {
    async fn load(
        &self,
        url: &str,
        params: &LoadingParams,
    ) -> Result<Arc<dyn PageDocument>, EngineError>;
}

#[async_trait]
pub trait ManifestSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Manifest, ManifestLoadError>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DocumentInfo {
    pub title: Option<String>,
    pub creation_date: Option<String>,
    pub page_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DocumentMetadata {
    pub info: DocumentInfo,
    pub content_disposition_filename: Option<String>,
    pub content_length: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutlineNode {
    pub title: String,
    pub destination: Option<ExplicitDestination>,
    pub children: Vec<OutlineNode>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Print,
    ModifyContents,
    Copy,
    ModifyAnnotations,
    FillInteractiveForms,
    CopyForAccessibility,
    Assemble,
    PrintHighQuality,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub content: Bytes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PageMode {
    #[default]
    UseNone,
    UseOutlines,
    UseThumbs,
    FullScreen,
    UseOC,
    UseAttachments,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageLayout {
    SinglePage,
    OneColumn,
    TwoColumnLeft,
    TwoColumnRight,
    TwoPageLeft,
    TwoPageRight,
}

pub type ViewerPreferences = HashMap<String, String>;

#[derive(Debug, Clone, PartialEq)]
pub struct OpenAction {
    pub destination: Option<ExplicitDestination>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldObject {
    pub id: String,
    pub page_index: usize,
    pub value: serde_json::Value,
}

/// Optional-content (layer) configuration handed to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionalContentConfig {
    pub name: Option<String>,
    pub creator: Option<String>,
    pub rendering_intent: RenderIntent,
    groups: HashMap<String, bool>,
}

impl OptionalContentConfig {
    /// A configuration with no layers in which everything is visible.
    pub fn all_visible(rendering_intent: RenderIntent) -> Self {
        Self {
            name: None,
            creator: None,
            rendering_intent,
            groups: HashMap::new(),
        }
    }

    pub fn has_groups(&self) -> bool {
        !self.groups.is_empty()
    }

    pub fn is_visible(&self, group_id: &str) -> bool {
        self.groups.get(group_id).copied().unwrap_or(true)
    }

    pub fn matches_intent(&self, _intent: RenderIntent) -> bool {
        true
    }
}

/// Form values the engine stores while the user edits fields.
#[derive(Debug, Default)]
pub struct AnnotationStorage {
    values: Mutex<HashMap<String, serde_json::Value>>,
}

impl AnnotationStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_value(&self, key: impl Into<String>, value: serde_json::Value) {
        self.values.lock().insert(key.into(), value);
    }

    pub fn get_value(&self, key: &str) -> Option<serde_json::Value> {
        self.values.lock().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.values.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.lock().is_empty()
    }

    pub fn reset(&self) {
        self.values.lock().clear();
    }
}

/// Filter factory that never installs a filter.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopFilterFactory;

impl NoopFilterFactory {
    pub const NONE: &'static str = "none";

    pub fn add_filter(&self, _map: &[u8]) -> &'static str {
        Self::NONE
    }

    pub fn add_hcm_filter(&self, _foreground: &str, _background: &str) -> &'static str {
        Self::NONE
    }

    pub fn add_alpha_filter(&self, _map: &[u8]) -> &'static str {
        Self::NONE
    }

    pub fn add_luminosity_filter(&self, _map: &[u8]) -> &'static str {
        Self::NONE
    }

    pub fn destroy(&self, _keep_hcm: bool) {}
}

/// Everything the engine expects of a loaded document. No method has a default
/// body, so an implementation must spell out the whole surface.
#[async_trait]
pub trait DocumentProxy: Send + Sync {
    fn num_pages(&self) -> usize;
    fn fingerprints(&self) -> [Option<String>; 2];
    fn annotation_storage(&self) -> &AnnotationStorage;
    fn filter_factory(&self) -> &NoopFilterFactory;
    fn loading_params(&self) -> &LoadingParams;

    async fn get_page(&self, page_number: usize) -> DocumentResult<Arc<dyn PageProxy>>;
    async fn get_page_index(&self, reference: PageRef) -> usize;
    fn cached_page_number(&self, reference: PageRef) -> Option<usize>;

    async fn get_destinations(&self) -> HashMap<String, ExplicitDestination>;
    async fn get_destination(&self, name: &str) -> Option<ExplicitDestination>;

    async fn get_metadata(&self) -> DocumentMetadata;
    async fn get_optional_content_config(
        &self,
        intent: RenderIntent,
    ) -> Arc<OptionalContentConfig>;

    async fn get_outline(&self) -> Option<Vec<OutlineNode>>;
    async fn get_permissions(&self) -> Option<Vec<Permission>>;
    async fn get_attachments(&self) -> Option<HashMap<String, Attachment>>;
    async fn get_js_actions(&self) -> Option<HashMap<String, Vec<String>>>;
    async fn has_js_actions(&self) -> bool;
    async fn get_page_labels(&self) -> Option<Vec<String>>;
    async fn get_page_mode(&self) -> PageMode;
    async fn get_page_layout(&self) -> Option<PageLayout>;
    async fn get_viewer_preferences(&self) -> Option<ViewerPreferences>;
    async fn get_open_action(&self) -> Option<OpenAction>;
    async fn get_field_objects(&self) -> Option<HashMap<String, Vec<FieldObject>>>;

    async fn cleanup(&self);
    async fn destroy(&self);
}
