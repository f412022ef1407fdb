//! Lazy whole-document facade over a manifest of single-page PDF files.
//!
//! Pages are fetched the first time the engine asks for them. The reference and
//! destination indices grow as pages arrive; lookups that miss walk the
//! remaining pages in manifest order, so the worst case costs one load per page.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::destination::{DestinationEntry, DestinationIndex, ExplicitDestination};
use crate::engine::{
    AnnotationStorage, Attachment, DocumentInfo, DocumentLoader, DocumentMetadata,
    DocumentProxy, FieldObject, LoadingParams, NoopFilterFactory, OpenAction,
    OptionalContentConfig, OutlineNode, PageDocument, PageLayout, PageMode, PageProxy,
    Permission, RenderIntent, ViewerPreferences,
};
use crate::error::{
    DestinationScanError, DocumentError, DocumentResult, EngineError, PageLoadError,
};
use crate::manifest::Manifest;
use crate::reference::{PageRef, ReferenceIndex};

static FINGERPRINT_NAMESPACE: Lazy<Uuid> = Lazy::new(|| {
    Uuid::parse_str("3f1d1c52-6c0e-5b8e-9a57-2f5b0c8d4e21").expect("valid namespace UUID")
});

/// Stable fingerprint for a split document, derived from its manifest id.
pub fn fingerprint_for_doc_id(doc_id: &str) -> String {
    Uuid::new_v5(&*FINGERPRINT_NAMESPACE, doc_id.as_bytes())
        .simple()
        .to_string()
}

type PageOutcome = DocumentResult<Arc<dyn PageProxy>>;

struct PendingLoad {
    generation: u64,
    outcome: watch::Receiver<Option<PageOutcome>>,
}

struct CacheState {
    documents: Vec<Option<Arc<dyn PageDocument>>>,
    pages: Vec<Option<Arc<dyn PageProxy>>>,
    in_flight: HashMap<usize, PendingLoad>,
    references: ReferenceIndex,
    destinations: DestinationIndex,
}

impl CacheState {
    fn new(page_count: usize) -> Self {
        Self {
            documents: (0..page_count).map(|_| None).collect(),
            pages: (0..page_count).map(|_| None).collect(),
            in_flight: HashMap::new(),
            references: ReferenceIndex::new(),
            destinations: DestinationIndex::new(page_count),
        }
    }
}

struct Inner {
    manifest: Arc<Manifest>,
    loader: Arc<dyn DocumentLoader>,
    params: LoadingParams,
    fingerprint: String,
    annotation_storage: AnnotationStorage,
    filter_factory: NoopFilterFactory,
    generation: AtomicU64,
    destroyed: AtomicBool,
    state: Mutex<CacheState>,
    optional_content: Mutex<HashMap<RenderIntent, Arc<OptionalContentConfig>>>,
}

/// Document proxy that loads each page's file on first use.
///
/// Cloning is cheap and every clone shares the same caches.
#[derive(Clone)]
pub struct LazyDocument {
    inner: Arc<Inner>,
}

impl LazyDocument {
    pub fn new(
        manifest: impl Into<Arc<Manifest>>,
        loader: Arc<dyn DocumentLoader>,
        params: LoadingParams,
    ) -> Self {
        let manifest = manifest.into();
        let fingerprint = fingerprint_for_doc_id(&manifest.doc_id);
        let state = CacheState::new(manifest.page_count);
        Self {
            inner: Arc::new(Inner {
                manifest,
                loader,
                params,
                fingerprint,
                annotation_storage: AnnotationStorage::new(),
                filter_factory: NoopFilterFactory,
                generation: AtomicU64::new(0),
                destroyed: AtomicBool::new(false),
                state: Mutex::new(state),
                optional_content: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn manifest(&self) -> &Manifest {
        &self.inner.manifest
    }

    pub fn num_pages(&self) -> usize {
        self.inner.manifest.page_count
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.load(Ordering::SeqCst)
    }

    /// Number of pages whose single-page document is currently held.
    pub fn loaded_page_count(&self) -> usize {
        self.inner
            .state
            .lock()
            .documents
            .iter()
            .filter(|slot| slot.is_some())
            .count()
    }

    #[instrument(skip(self), fields(doc = %self.inner.manifest.doc_id))]
    pub async fn get_page(&self, page_number: usize) -> PageOutcome {
        if self.is_destroyed() {
            return Err(DocumentError::Destroyed);
        }
        if !self.inner.manifest.contains_page(page_number) {
            return Err(DocumentError::PageNotFound {
                page: page_number,
                page_count: self.num_pages(),
            });
        }

        let mut pending = {
            let mut state = self.inner.state.lock();
            if let Some(page) = &state.pages[page_number - 1] {
                debug!(page_number, "page cache hit");
                return Ok(Arc::clone(page));
            }
            match state.in_flight.get(&page_number) {
                Some(load) => {
                    debug!(page_number, "joining in-flight page load");
                    load.outcome.clone()
                }
                None => {
                    let generation = self.inner.generation.load(Ordering::SeqCst);
                    let (sender, receiver) = watch::channel(None);
                    state.in_flight.insert(
                        page_number,
                        PendingLoad {
                            generation,
                            outcome: receiver.clone(),
                        },
                    );
                    let slot = InFlightSlot {
                        inner: Arc::clone(&self.inner),
                        page_number,
                        generation,
                        sender: Some(sender),
                    };
                    tokio::spawn(async move {
                        let outcome = slot.inner.load_page(page_number, generation).await;
                        slot.complete(outcome);
                    });
                    receiver
                }
            }
        };

        let outcome = match pending.wait_for(Option::is_some).await {
            Ok(value) => value.clone(),
            Err(_) => None,
        };
        outcome.unwrap_or_else(|| Err(self.inner.abandoned(page_number).into()))
    }

    /// Zero-based index of the page whose own reference is `reference`.
    ///
    /// Unknown references trigger loads of the pages not seen yet, in order.
    /// Falls back to `0` when no page matches.
    pub async fn get_page_index(&self, reference: PageRef) -> usize {
        for page_number in 1..=self.num_pages() {
            if let Some(found) = self.cached_page_number(reference) {
                return found - 1;
            }
            if self.is_destroyed() {
                break;
            }
            if self.inner.is_loaded(page_number) {
                continue;
            }
            if let Err(err) = self.get_page(page_number).await {
                debug!(%err, page_number, "skipping page while resolving reference");
            }
        }
        if let Some(found) = self.cached_page_number(reference) {
            return found - 1;
        }
        debug!(%reference, "reference not found on any page");
        0
    }

    pub fn cached_page_number(&self, reference: PageRef) -> Option<usize> {
        self.inner.state.lock().references.page_number(reference)
    }

    pub async fn get_destinations(&self) -> HashMap<String, ExplicitDestination> {
        self.inner.state.lock().destinations.snapshot()
    }

    pub async fn get_destination(&self, name: &str) -> Option<ExplicitDestination> {
        self.find_destination(name)
            .await
            .map(|entry| entry.destination)
    }

    /// Page number on which the named destination was declared.
    pub async fn destination_page(&self, name: &str) -> Option<usize> {
        self.find_destination(name)
            .await
            .map(|entry| entry.page_number)
    }

    async fn find_destination(&self, name: &str) -> Option<DestinationEntry> {
        if let Some(entry) = self.inner.state.lock().destinations.get(name) {
            return Some(entry);
        }
        for page_number in 1..=self.num_pages() {
            if self.is_destroyed() {
                break;
            }
            if self.inner.is_scanned(page_number) {
                continue;
            }
            if let Err(err) = self.get_page(page_number).await {
                debug!(%err, page_number, "skipping page while resolving destination");
                continue;
            }
            if let Some(entry) = self.inner.state.lock().destinations.get(name) {
                return Some(entry);
            }
        }
        debug!(name, "named destination not found");
        None
    }

    pub async fn get_metadata(&self) -> DocumentMetadata {
        let manifest = &self.inner.manifest;
        DocumentMetadata {
            info: DocumentInfo {
                title: Some(manifest.filename.clone()),
                creation_date: manifest.created_at.clone(),
                page_count: manifest.page_count,
            },
            content_disposition_filename: Some(manifest.filename.clone()),
            content_length: None,
        }
    }

    pub async fn get_optional_content_config(
        &self,
        intent: RenderIntent,
    ) -> Arc<OptionalContentConfig> {
        let mut configs = self.inner.optional_content.lock();
        let config = configs
            .entry(intent)
            .or_insert_with(|| Arc::new(OptionalContentConfig::all_visible(intent)));
        Arc::clone(config)
    }

    /// Releases every page document. The document stays usable and reloads
    /// pages on demand.
    pub async fn cleanup(&self) {
        self.inner.release().await;
    }

    /// Releases every page document and refuses further loads.
    pub async fn destroy(&self) {
        if !self.inner.destroyed.swap(true, Ordering::SeqCst) {
            debug!(doc = %self.inner.manifest.doc_id, "destroying lazy document");
        }
        self.inner.release().await;
    }
}

/// Owns a page's `in_flight` entry for the lifetime of its load task.
///
/// Dropping the slot without completing it (the loader panicked or the task
/// was aborted) still clears the entry, so the next request starts a fresh load.
struct InFlightSlot {
    inner: Arc<Inner>,
    page_number: usize,
    generation: u64,
    sender: Option<watch::Sender<Option<PageOutcome>>>,
}

impl InFlightSlot {
    fn complete(mut self, outcome: PageOutcome) {
        self.inner.finish_load(self.page_number, self.generation);
        if let Some(sender) = self.sender.take() {
            let _ = sender.send(Some(outcome));
        }
    }
}

impl Drop for InFlightSlot {
    fn drop(&mut self) {
        if self.sender.is_some() {
            warn!(page_number = self.page_number, "page load ended without an outcome");
            self.inner.finish_load(self.page_number, self.generation);
        }
    }
}

impl Inner {
    fn is_loaded(&self, page_number: usize) -> bool {
        self.state
            .lock()
            .pages
            .get(page_number - 1)
            .map_or(false, Option::is_some)
    }

    fn is_scanned(&self, page_number: usize) -> bool {
        self.state.lock().destinations.is_scanned(page_number)
    }

    fn is_current(&self, generation: u64) -> bool {
        !self.destroyed.load(Ordering::SeqCst)
            && self.generation.load(Ordering::SeqCst) == generation
    }

    fn abandoned(&self, page_number: usize) -> PageLoadError {
        PageLoadError {
            page: page_number,
            url: self
                .manifest
                .page_url(page_number)
                .unwrap_or_default()
                .to_owned(),
            source: EngineError::new("page load was abandoned"),
        }
    }

    fn stale_outcome(&self, page_number: usize) -> DocumentError {
        if self.destroyed.load(Ordering::SeqCst) {
            DocumentError::Destroyed
        } else {
            DocumentError::Cancelled { page: page_number }
        }
    }

    async fn load_page(&self, page_number: usize, generation: u64) -> PageOutcome {
        let url = self
            .manifest
            .page_url(page_number)
            .ok_or(DocumentError::PageNotFound {
                page: page_number,
                page_count: self.manifest.page_count,
            })?
            .to_owned();
        debug!(page_number, %url, "loading page document");

        let document = self
            .loader
            .load(&url, &self.params)
            .await
            .map_err(|source| PageLoadError {
                page: page_number,
                url: url.clone(),
                source,
            })?;

        let page = match document.get_page(0).await {
            Ok(page) => page,
            Err(source) => {
                document.destroy().await;
                return Err(PageLoadError {
                    page: page_number,
                    url,
                    source,
                }
                .into());
            }
        };

        let destinations = match document.get_destinations().await {
            Ok(destinations) => destinations,
            Err(source) => {
                let err = DestinationScanError {
                    page: page_number,
                    source,
                };
                warn!(%err, "ignoring destinations of page");
                Vec::new()
            }
        };

        let stale = {
            let mut state = self.state.lock();
            if self.is_current(generation) {
                let slot = page_number - 1;
                state.references.record(page.reference(), page_number);
                state.destinations.record_page(page_number, destinations);
                state.pages[slot] = Some(Arc::clone(&page));
                state.documents[slot] = Some(document);
                None
            } else {
                Some(document)
            }
        };

        if let Some(document) = stale {
            debug!(page_number, "discarding page loaded after release");
            document.destroy().await;
            return Err(self.stale_outcome(page_number));
        }
        Ok(page)
    }

    fn finish_load(&self, page_number: usize, generation: u64) {
        let mut state = self.state.lock();
        let owned = state
            .in_flight
            .get(&page_number)
            .map_or(false, |load| load.generation == generation);
        if owned {
            state.in_flight.remove(&page_number);
        }
    }

    async fn release(&self) {
        let documents: Vec<Arc<dyn PageDocument>> = {
            let mut state = self.state.lock();
            self.generation.fetch_add(1, Ordering::SeqCst);
            state.in_flight.clear();
            state.references.clear();
            state.destinations.clear();
            state.pages.iter_mut().for_each(|slot| *slot = None);
            state.documents.iter_mut().filter_map(Option::take).collect()
        };
        self.optional_content.lock().clear();
        self.annotation_storage.reset();

        if !documents.is_empty() {
            debug!(count = documents.len(), "releasing page documents");
        }
        for document in documents {
            document.destroy().await;
        }
    }
}

#[async_trait]
impl DocumentProxy for LazyDocument {
    fn num_pages(&self) -> usize {
        LazyDocument::num_pages(self)
    }

    fn fingerprints(&self) -> [Option<String>; 2] {
        [Some(self.inner.fingerprint.clone()), None]
    }

    fn annotation_storage(&self) -> &AnnotationStorage {
        &self.inner.annotation_storage
    }

    fn filter_factory(&self) -> &NoopFilterFactory {
        &self.inner.filter_factory
    }

    fn loading_params(&self) -> &LoadingParams {
        &self.inner.params
    }

    async fn get_page(&self, page_number: usize) -> DocumentResult<Arc<dyn PageProxy>> {
        LazyDocument::get_page(self, page_number).await
    }

    async fn get_page_index(&self, reference: PageRef) -> usize {
        LazyDocument::get_page_index(self, reference).await
    }

    fn cached_page_number(&self, reference: PageRef) -> Option<usize> {
        LazyDocument::cached_page_number(self, reference)
    }

    async fn get_destinations(&self) -> HashMap<String, ExplicitDestination> {
        LazyDocument::get_destinations(self).await
    }

    async fn get_destination(&self, name: &str) -> Option<ExplicitDestination> {
        LazyDocument::get_destination(self, name).await
    }

    async fn get_metadata(&self) -> DocumentMetadata {
        LazyDocument::get_metadata(self).await
    }

    async fn get_optional_content_config(
        &self,
        intent: RenderIntent,
    ) -> Arc<OptionalContentConfig> {
        LazyDocument::get_optional_content_config(self, intent).await
    }

    async fn get_outline(&self) -> Option<Vec<OutlineNode>> {
        None
    }

    async fn get_permissions(&self) -> Option<Vec<Permission>> {
        None
    }

    async fn get_attachments(&self) -> Option<HashMap<String, Attachment>> {
        None
    }

    async fn get_js_actions(&self) -> Option<HashMap<String, Vec<String>>> {
        None
    }

    async fn has_js_actions(&self) -> bool {
        false
    }

    async fn get_page_labels(&self) -> Option<Vec<String>> {
        None
    }

    async fn get_page_mode(&self) -> PageMode {
        PageMode::UseNone
    }

    async fn get_page_layout(&self) -> Option<PageLayout> {
        None
    }

    async fn get_viewer_preferences(&self) -> Option<ViewerPreferences> {
        None
    }

    async fn get_open_action(&self) -> Option<OpenAction> {
        None
    }

    async fn get_field_objects(&self) -> Option<HashMap<String, Vec<FieldObject>>> {
        None
    }

    async fn cleanup(&self) {
        LazyDocument::cleanup(self).await;
    }

    async fn destroy(&self) {
        LazyDocument::destroy(self).await;
    }
}
