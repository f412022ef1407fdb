//! Deterministic in-memory engine used by tests across the workspace.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Semaphore;

use crate::destination::{DestinationTarget, ExplicitDestination};
use crate::engine::{DocumentLoader, LoadingParams, ManifestSource, PageDocument, PageProxy};
use crate::error::{EngineError, ManifestLoadError};
use crate::manifest::{Manifest, PageEntry};
use crate::reference::PageRef;

pub fn sample_manifest(page_count: usize) -> Manifest {
    Manifest {
        doc_id: "sample-doc".to_owned(),
        filename: "sample.pdf".to_owned(),
        page_count,
        created_at: Some("2024-01-01T00:00:00Z".to_owned()),
        pages: (1..=page_count)
            .map(|n| PageEntry {
                n,
                pdf_url: format!("https://pages.test/sample/{n}.pdf"),
            })
            .collect(),
    }
}

/// Reference that the fake engine assigns to page `n`.
pub fn page_ref_for(page: usize) -> PageRef {
    PageRef::new(page as u32 * 10 + 1, 0)
}

#[derive(Debug)]
pub struct FakePage {
    reference: PageRef,
}

impl PageProxy for FakePage {
    fn page_index_in_file(&self) -> usize {
        0
    }

    fn reference(&self) -> PageRef {
        self.reference
    }

    fn view(&self) -> [f32; 4] {
        [0.0, 0.0, 612.0, 792.0]
    }

    fn rotation(&self) -> u16 {
        0
    }
}

#[derive(Debug, Clone, Default)]
struct PagePlan {
    destinations: Vec<(String, ExplicitDestination)>,
    fail_load: bool,
    fail_scan: bool,
}

#[derive(Default)]
struct Journal {
    loads: Mutex<Vec<usize>>,
    scans: Mutex<Vec<usize>>,
    destroyed: Mutex<Vec<usize>>,
}

pub struct FakeDocument {
    page_number: usize,
    page: Arc<FakePage>,
    destinations: Vec<(String, ExplicitDestination)>,
    fail_scan: bool,
    journal: Arc<Journal>,
}

#[async_trait]
impl PageDocument for FakeDocument {
    fn num_pages(&self) -> usize {
        1
    }

    fn fingerprint(&self) -> Option<String> {
        Some(format!("fake-{}", self.page.reference))
    }

    async fn get_page(&self, index: usize) -> Result<Arc<dyn PageProxy>, EngineError> {
        if index != 0 {
            return Err(EngineError::new(format!("no page at index {index}")));
        }
        Ok(Arc::clone(&self.page) as Arc<dyn PageProxy>)
    }

    async fn get_destinations(&self) -> Result<Vec<(String, ExplicitDestination)>, EngineError> {
        self.journal.scans.lock().push(self.page_number);
        if self.fail_scan {
            return Err(EngineError::new("corrupt name tree"));
        }
        Ok(self.destinations.clone())
    }

    async fn destroy(&self) {
        self.journal.destroyed.lock().push(self.page_number);
    }
}

/// Loader that serves the pages of one manifest from memory and journals
/// every load, destination scan and release.
pub struct FakeLoader {
    pages: HashMap<String, (usize, PagePlan)>,
    journal: Arc<Journal>,
    gate: Mutex<Option<Arc<Semaphore>>>,
}

impl FakeLoader {
    pub fn for_manifest(manifest: &Manifest) -> Self {
        let pages = manifest
            .pages
            .iter()
            .map(|entry| (entry.pdf_url.clone(), (entry.n, PagePlan::default())))
            .collect();
        Self {
            pages,
            journal: Arc::new(Journal::default()),
            gate: Mutex::new(None),
        }
    }

    fn plan_mut(&mut self, page: usize) -> &mut PagePlan {
        self.pages
            .values_mut()
            .find(|(n, _)| *n == page)
            .map(|(_, plan)| plan)
            .unwrap_or_else(|| panic!("manifest has no page {page}"))
    }

    /// Declares `name` on `page`, pointing at the reference of `target_page`.
    pub fn with_destination(mut self, page: usize, name: &str, target_page: usize) -> Self {
        let destination =
            ExplicitDestination::fit(DestinationTarget::Ref(page_ref_for(target_page)));
        self.plan_mut(page)
            .destinations
            .push((name.to_owned(), destination));
        self
    }

    pub fn failing_load(mut self, page: usize) -> Self {
        self.plan_mut(page).fail_load = true;
        self
    }

    pub fn failing_scan(mut self, page: usize) -> Self {
        self.plan_mut(page).fail_scan = true;
        self
    }

    /// Parks every subsequent load until [`FakeLoader::release`] is called.
    pub fn hold(&self) {
        *self.gate.lock() = Some(Arc::new(Semaphore::new(0)));
    }

    pub fn release(&self) {
        if let Some(gate) = self.gate.lock().take() {
            gate.add_permits(1024);
        }
    }

    pub fn load_log(&self) -> Vec<usize> {
        self.journal.loads.lock().clone()
    }

    pub fn scan_log(&self) -> Vec<usize> {
        self.journal.scans.lock().clone()
    }

    pub fn destroyed_pages(&self) -> Vec<usize> {
        self.journal.destroyed.lock().clone()
    }
}

#[async_trait]
impl DocumentLoader for FakeLoader {
    async fn load(
        &self,
        url: &str,
        _params: &LoadingParams,
    ) -> Result<Arc<dyn PageDocument>, EngineError> {
        let (page_number, plan) = self
            .pages
            .get(url)
            .cloned()
            .ok_or_else(|| EngineError::new(format!("404 for {url}")))?;
        self.journal.loads.lock().push(page_number);

        let gate = self.gate.lock().clone();
        if let Some(gate) = gate {
            let _permit = gate
                .acquire()
                .await
                .map_err(|_| EngineError::new("loader gate closed"))?;
        }

        if plan.fail_load {
            return Err(EngineError::new(format!("HTTP 500 while fetching {url}")));
        }
        Ok(Arc::new(FakeDocument {
            page_number,
            page: Arc::new(FakePage {
                reference: page_ref_for(page_number),
            }),
            destinations: plan.destinations,
            fail_scan: plan.fail_scan,
            journal: Arc::clone(&self.journal),
        }))
    }
}

pub struct FakeManifestSource {
    outcome: Result<Manifest, ManifestLoadError>,
    fetches: AtomicUsize,
}

impl FakeManifestSource {
    pub fn serving(manifest: Manifest) -> Self {
        Self {
            outcome: Ok(manifest),
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn failing(err: ManifestLoadError) -> Self {
        Self {
            outcome: Err(err),
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ManifestSource for FakeManifestSource {
    async fn fetch(&self, _url: &str) -> Result<Manifest, ManifestLoadError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.outcome.clone()
    }
}
