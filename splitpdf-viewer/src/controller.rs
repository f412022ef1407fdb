//! Page and zoom state for one mounted viewer session.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use splitpdf_core::{
    DocumentError, DocumentLoader, DocumentProxy, EngineError, LazyDocument, ManifestLoadError,
    ManifestSource,
};
use thiserror::Error;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, instrument, warn};

use crate::config::ViewerConfig;
use crate::events::{EventBus, Subscription, ViewerEvent};
use crate::scale::{step_zoom, ScaleToken, ScaleValue, ZoomDirection};

/// The engine's page viewer, as driven by the controller.
pub trait PdfViewer: Send + Sync {
    fn set_document(&self, document: Option<Arc<dyn DocumentProxy>>) -> Result<(), EngineError>;
    fn set_current_page_number(&self, page_number: usize);
    fn set_current_scale_value(&self, value: ScaleValue);
    /// Scale at which the current page fills the container width, once laid out.
    fn width_fit_scale(&self) -> Option<f32>;
    fn cleanup(&self) -> Result<(), EngineError>;
}

/// Resolves internal links against the bound document.
pub trait LinkService: Send + Sync {
    fn set_document(&self, document: Option<Arc<dyn DocumentProxy>>) -> Result<(), EngineError>;
}

pub struct Collaborators {
    pub viewer: Arc<dyn PdfViewer>,
    pub link_service: Arc<dyn LinkService>,
    pub manifests: Arc<dyn ManifestSource>,
    pub loader: Arc<dyn DocumentLoader>,
}

#[derive(Debug, Clone, Error)]
pub enum LoadError {
    #[error(transparent)]
    Manifest(#[from] ManifestLoadError),
    #[error("failed to load the first page: {0}")]
    FirstPage(#[source] DocumentError),
    #[error("failed to bind the document to the viewer: {0}")]
    Bind(#[source] EngineError),
    #[error("load was superseded before it finished")]
    Cancelled,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ViewerState {
    pub page_num: usize,
    pub page_count: usize,
    pub scale: ScaleValue,
    pub scale_token: ScaleToken,
    /// Last numeric scale reported by the engine.
    pub current_scale: f32,
    pub loading: bool,
    pub pages_loaded: bool,
    pub error: Option<String>,
    /// Largest scale reported by a render the controller did not auto-fit.
    pub max_genuine_scale: Option<f32>,
}

impl ViewerState {
    fn initial(config: &ViewerConfig) -> Self {
        let scale = match config.default_scale {
            ScaleValue::Numeric(value) => ScaleValue::Numeric(config.bounds().clamp(value)),
            preset => preset,
        };
        Self {
            page_num: 1,
            page_count: 0,
            scale,
            scale_token: ScaleToken::for_value(scale),
            current_scale: match scale {
                ScaleValue::Numeric(value) => value,
                ScaleValue::Preset(_) => 1.0,
            },
            loading: false,
            pages_loaded: false,
            error: None,
            max_genuine_scale: None,
        }
    }

    fn clamp_page(&self, page: usize) -> usize {
        page.clamp(1, self.page_count.max(1))
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct FrameTasks {
    apply_initial_scale: bool,
    refit: bool,
}

struct SessionState {
    view: ViewerState,
    pending_auto_fit: Option<f32>,
    queued: FrameTasks,
}

impl SessionState {
    fn new(config: &ViewerConfig) -> Self {
        Self {
            view: ViewerState::initial(config),
            pending_auto_fit: None,
            queued: FrameTasks::default(),
        }
    }
}

struct Shared {
    config: ViewerConfig,
    collaborators: Collaborators,
    epoch: AtomicU64,
    unmounted: AtomicBool,
    session: Mutex<SessionState>,
    document: Mutex<Option<LazyDocument>>,
    subscription: Mutex<Option<Subscription>>,
}

/// Cloneable handle; every clone drives the same session.
#[derive(Clone)]
pub struct ViewerController {
    shared: Arc<Shared>,
}

impl ViewerController {
    pub fn new(config: ViewerConfig, collaborators: Collaborators) -> Self {
        let session = SessionState::new(&config);
        Self {
            shared: Arc::new(Shared {
                config,
                collaborators,
                epoch: AtomicU64::new(0),
                unmounted: AtomicBool::new(false),
                session: Mutex::new(session),
                document: Mutex::new(None),
                subscription: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.shared.config
    }

    pub fn state(&self) -> ViewerState {
        self.shared.session.lock().view.clone()
    }

    pub fn document(&self) -> Option<LazyDocument> {
        self.shared.document.lock().clone()
    }

    /// Starts receiving engine events from `bus`, replacing any earlier source.
    pub fn attach(&self, bus: &EventBus) {
        *self.shared.subscription.lock() = Some(bus.subscribe());
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.shared.epoch.load(Ordering::SeqCst) == epoch
    }

    /// Fetches a manifest and binds a fresh lazy document to the viewer.
    ///
    /// Any previously loaded document is torn down first. Failures are also
    /// recorded as the user-visible error in [`ViewerState`].
    #[instrument(skip(self))]
    pub async fn load(&self, manifest_url: &str) -> Result<(), LoadError> {
        let epoch = self.shared.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        self.release_document().await;
        if !self.is_current(epoch) {
            return Err(LoadError::Cancelled);
        }
        {
            let mut session = self.shared.session.lock();
            *session = SessionState::new(&self.shared.config);
            session.view.loading = true;
        }

        let manifest = match self.shared.collaborators.manifests.fetch(manifest_url).await {
            Ok(manifest) => manifest,
            Err(err) => return Err(self.fail(epoch, err.into())),
        };
        if !self.is_current(epoch) {
            return Err(LoadError::Cancelled);
        }

        let page_count = manifest.page_count;
        let document = LazyDocument::new(
            manifest,
            Arc::clone(&self.shared.collaborators.loader),
            self.shared.config.loading.clone(),
        );
        if let Err(err) = document.get_page(1).await {
            document.destroy().await;
            return Err(self.fail(epoch, LoadError::FirstPage(err)));
        }
        if !self.is_current(epoch) {
            debug!("discarding document loaded for a torn-down view");
            document.destroy().await;
            return Err(LoadError::Cancelled);
        }

        let proxy: Arc<dyn DocumentProxy> = Arc::new(document.clone());
        if let Err(err) = self
            .shared
            .collaborators
            .viewer
            .set_document(Some(Arc::clone(&proxy)))
        {
            document.destroy().await;
            return Err(self.fail(epoch, LoadError::Bind(err)));
        }
        if let Err(err) = self
            .shared
            .collaborators
            .link_service
            .set_document(Some(proxy))
        {
            warn!(%err, "link service rejected the document; internal links are disabled");
        }

        self.shared.session.lock().view.page_count = page_count;
        *self.shared.document.lock() = Some(document);
        info!(page_count, "document ready");
        Ok(())
    }

    fn fail(&self, epoch: u64, err: LoadError) -> LoadError {
        if !self.is_current(epoch) {
            return LoadError::Cancelled;
        }
        warn!(%err, "document load failed");
        let mut session = self.shared.session.lock();
        session.view.error = Some(err.to_string());
        session.view.loading = false;
        err
    }

    pub fn go_to_next_page(&self) {
        let target = {
            let session = self.shared.session.lock();
            if session.view.page_num >= session.view.page_count {
                return;
            }
            session.view.page_num + 1
        };
        self.go_to_page(target);
    }

    pub fn go_to_prev_page(&self) {
        let target = {
            let session = self.shared.session.lock();
            if session.view.page_num <= 1 {
                return;
            }
            session.view.page_num - 1
        };
        self.go_to_page(target);
    }

    /// Moves to `page`, clamped to the document. Returns the resulting page.
    pub fn go_to_page(&self, page: usize) -> usize {
        let target = {
            let mut session = self.shared.session.lock();
            if session.view.page_count == 0 {
                return session.view.page_num;
            }
            let target = session.view.clamp_page(page);
            if target == session.view.page_num {
                return target;
            }
            session.view.page_num = target;
            target
        };
        self.shared
            .collaborators
            .viewer
            .set_current_page_number(target);
        target
    }

    pub fn zoom_in(&self) -> f32 {
        self.zoom(ZoomDirection::In)
    }

    pub fn zoom_out(&self) -> f32 {
        self.zoom(ZoomDirection::Out)
    }

    fn zoom(&self, direction: ZoomDirection) -> f32 {
        let bounds = self.shared.config.bounds();
        let next = {
            let session = self.shared.session.lock();
            step_zoom(session.view.current_scale, direction, bounds)
        };
        self.set_scale(ScaleValue::Numeric(next));
        next
    }

    /// Selects a preset or a numeric scale (clamped to the configured bounds).
    pub fn set_scale(&self, value: ScaleValue) {
        let value = match value {
            ScaleValue::Numeric(scale) => ScaleValue::Numeric(self.shared.config.bounds().clamp(scale)),
            preset => preset,
        };
        {
            let mut session = self.shared.session.lock();
            session.view.scale = value;
            session.view.scale_token = ScaleToken::for_value(value);
            if let ScaleValue::Numeric(scale) = value {
                session.view.current_scale = scale;
            }
        }
        self.shared
            .collaborators
            .viewer
            .set_current_scale_value(value);
    }

    /// Marks the container as resized; recomputation happens on the next frame.
    pub fn notify_resize(&self) {
        self.shared.session.lock().queued.refit = true;
    }

    pub fn handle_event(&self, event: ViewerEvent) {
        let mut session = self.shared.session.lock();
        match event {
            ViewerEvent::PageChanging { page_number } => {
                session.view.page_num = session.view.clamp_page(page_number);
            }
            ViewerEvent::ScaleChanging {
                scale,
                preset_value,
            } => {
                let token = ScaleToken::for_engine_scale(scale, preset_value.as_deref());
                session.view.current_scale = scale;
                session.view.scale_token = token;
                session.view.scale = match token {
                    ScaleToken::Preset(preset) => ScaleValue::Preset(preset),
                    _ => ScaleValue::Numeric(scale),
                };

                let from_auto_fit = session
                    .pending_auto_fit
                    .map_or(false, |expected| (expected - scale).abs() < 1e-4);
                if from_auto_fit {
                    session.pending_auto_fit = None;
                } else {
                    let max = session.view.max_genuine_scale.map_or(scale, |max| max.max(scale));
                    session.view.max_genuine_scale = Some(max);
                }
            }
            ViewerEvent::PagesInit => {
                session.view.loading = false;
                session.queued.apply_initial_scale = true;
            }
            ViewerEvent::PagesLoaded { pages_count } => {
                debug!(pages_count, "all pages laid out");
                session.view.pages_loaded = true;
            }
            ViewerEvent::DocumentError { message } => {
                warn!(%message, "engine reported a document error");
                session.view.error = Some(message);
                session.view.loading = false;
            }
        }
    }

    /// Runs once per paint frame: first the work queued by earlier frames,
    /// then the engine events that arrived since the last frame.
    pub fn on_animation_frame(&self) {
        let tasks = std::mem::take(&mut self.shared.session.lock().queued);
        if tasks.apply_initial_scale {
            self.apply_initial_scale();
        }
        if tasks.refit {
            self.refit();
        }

        let events = self
            .shared
            .subscription
            .lock()
            .as_mut()
            .map(Subscription::drain)
            .unwrap_or_default();
        for event in events {
            self.handle_event(event);
        }
    }

    fn apply_initial_scale(&self) {
        if self.shared.config.auto_fit {
            self.refit();
            return;
        }
        let scale = self.shared.session.lock().view.scale;
        debug!(%scale, "applying initial scale");
        self.shared
            .collaborators
            .viewer
            .set_current_scale_value(scale);
    }

    fn refit(&self) {
        if self.shared.document.lock().is_none() {
            return;
        }
        let viewer = &self.shared.collaborators.viewer;
        if !self.shared.config.auto_fit {
            let scale = self.shared.session.lock().view.scale;
            if let ScaleValue::Preset(_) = scale {
                viewer.set_current_scale_value(scale);
            }
            return;
        }

        let Some(fit) = viewer.width_fit_scale() else {
            return;
        };
        let target = {
            let mut session = self.shared.session.lock();
            let bounded = session
                .view
                .max_genuine_scale
                .map_or(fit, |max| fit.min(max));
            let target = self.shared.config.bounds().clamp(bounded);
            session.pending_auto_fit = Some(target);
            target
        };
        debug!(fit, target, "auto-fitting page width");
        viewer.set_current_scale_value(ScaleValue::Numeric(target));
    }

    /// Ticks [`ViewerController::on_animation_frame`] at the configured frame
    /// interval until the controller is unmounted.
    pub async fn run(&self) {
        let mut frames = tokio::time::interval(self.shared.config.frame_interval());
        frames.set_missed_tick_behavior(MissedTickBehavior::Skip);
        while !self.shared.unmounted.load(Ordering::SeqCst) {
            frames.tick().await;
            if self.shared.unmounted.load(Ordering::SeqCst) {
                break;
            }
            self.on_animation_frame();
        }
    }

    /// Tears the session down. Each step runs even if an earlier one fails.
    pub async fn unmount(&self) {
        self.shared.unmounted.store(true, Ordering::SeqCst);
        self.shared.epoch.fetch_add(1, Ordering::SeqCst);

        drop(self.shared.subscription.lock().take());
        self.shared.session.lock().queued = FrameTasks::default();

        if let Err(err) = self.shared.collaborators.viewer.cleanup() {
            warn!(%err, "viewer cleanup failed");
        }
        self.release_document().await;
    }

    async fn release_document(&self) {
        let Some(document) = self.shared.document.lock().take() else {
            return;
        };
        if let Err(err) = self.shared.collaborators.link_service.set_document(None) {
            warn!(%err, "failed to detach document from link service");
        }
        if let Err(err) = self.shared.collaborators.viewer.set_document(None) {
            warn!(%err, "failed to detach document from viewer");
        }
        document.destroy().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scale::ScalePreset;
    use splitpdf_core::testing::{sample_manifest, FakeLoader, FakeManifestSource};

    type Journal = Arc<Mutex<Vec<String>>>;

    #[derive(Debug, Clone, PartialEq)]
    enum ViewerCall {
        Page(usize),
        Scale(ScaleValue),
    }

    #[derive(Default)]
    struct RecordingViewer {
        journal: Journal,
        calls: Mutex<Vec<ViewerCall>>,
        width_fit: Mutex<Option<f32>>,
        fail_cleanup: bool,
    }

    impl RecordingViewer {
        fn calls(&self) -> Vec<ViewerCall> {
            self.calls.lock().clone()
        }

        fn scale_calls(&self) -> Vec<ScaleValue> {
            self.calls()
                .into_iter()
                .filter_map(|call| match call {
                    ViewerCall::Scale(value) => Some(value),
                    ViewerCall::Page(_) => None,
                })
                .collect()
        }
    }

    impl PdfViewer for RecordingViewer {
        fn set_document(
            &self,
            document: Option<Arc<dyn DocumentProxy>>,
        ) -> Result<(), EngineError> {
            let entry = if document.is_some() {
                "viewer:attach"
            } else {
                "viewer:detach"
            };
            self.journal.lock().push(entry.to_owned());
            Ok(())
        }

        fn set_current_page_number(&self, page_number: usize) {
            self.calls.lock().push(ViewerCall::Page(page_number));
        }

        fn set_current_scale_value(&self, value: ScaleValue) {
            self.calls.lock().push(ViewerCall::Scale(value));
        }

        fn width_fit_scale(&self) -> Option<f32> {
            *self.width_fit.lock()
        }

        fn cleanup(&self) -> Result<(), EngineError> {
            self.journal.lock().push("viewer:cleanup".to_owned());
            if self.fail_cleanup {
                return Err(EngineError::new("canvas already released"));
            }
            Ok(())
        }
    }

    struct RecordingLinks {
        journal: Journal,
    }

    impl LinkService for RecordingLinks {
        fn set_document(
            &self,
            document: Option<Arc<dyn DocumentProxy>>,
        ) -> Result<(), EngineError> {
            let entry = if document.is_some() {
                "links:attach"
            } else {
                "links:detach"
            };
            self.journal.lock().push(entry.to_owned());
            Ok(())
        }
    }

    struct Harness {
        controller: ViewerController,
        viewer: Arc<RecordingViewer>,
        loader: Arc<FakeLoader>,
        manifests: Arc<FakeManifestSource>,
        journal: Journal,
        bus: EventBus,
    }

    fn harness_with(
        config: ViewerConfig,
        manifests: FakeManifestSource,
        loader: FakeLoader,
        fail_cleanup: bool,
    ) -> Harness {
        let journal: Journal = Arc::new(Mutex::new(Vec::new()));
        let viewer = Arc::new(RecordingViewer {
            journal: Arc::clone(&journal),
            fail_cleanup,
            ..RecordingViewer::default()
        });
        let loader = Arc::new(loader);
        let manifests = Arc::new(manifests);
        let controller = ViewerController::new(
            config,
            Collaborators {
                viewer: Arc::clone(&viewer) as Arc<dyn PdfViewer>,
                link_service: Arc::new(RecordingLinks {
                    journal: Arc::clone(&journal),
                }),
                manifests: Arc::clone(&manifests) as Arc<dyn ManifestSource>,
                loader: Arc::clone(&loader) as Arc<dyn DocumentLoader>,
            },
        );
        let bus = EventBus::new();
        controller.attach(&bus);
        Harness {
            controller,
            viewer,
            loader,
            manifests,
            journal,
            bus,
        }
    }

    fn harness(pages: usize, config: ViewerConfig) -> Harness {
        let manifest = sample_manifest(pages);
        let loader = FakeLoader::for_manifest(&manifest);
        harness_with(config, FakeManifestSource::serving(manifest), loader, false)
    }

    #[tokio::test]
    async fn load_binds_document_and_starts_on_page_one() {
        let h = harness(3, ViewerConfig::default());
        h.controller.load("https://pages.test/manifest.json").await.unwrap();

        let state = h.controller.state();
        assert_eq!(state.page_num, 1);
        assert_eq!(state.page_count, 3);
        assert!(state.loading);
        assert!(state.error.is_none());
        assert_eq!(h.loader.load_log(), vec![1]);
        assert_eq!(
            *h.journal.lock(),
            vec!["viewer:attach".to_owned(), "links:attach".to_owned()]
        );
        assert_eq!(h.controller.document().map(|doc| doc.num_pages()), Some(3));
    }

    #[tokio::test]
    async fn manifest_http_error_surfaces_status_and_builds_nothing() {
        let h = harness_with(
            ViewerConfig::default(),
            FakeManifestSource::failing(ManifestLoadError::Status {
                url: "https://pages.test/missing.json".to_owned(),
                status: 404,
            }),
            FakeLoader::for_manifest(&sample_manifest(1)),
            false,
        );

        let err = h
            .controller
            .load("https://pages.test/missing.json")
            .await
            .unwrap_err();
        assert!(matches!(err, LoadError::Manifest(_)));

        let state = h.controller.state();
        assert!(state.error.as_deref().unwrap().contains("404"));
        assert!(!state.loading);
        assert!(h.controller.document().is_none());
        assert!(h.loader.load_log().is_empty());
        assert!(h.journal.lock().is_empty());
        assert_eq!(h.manifests.fetch_count(), 1);
    }

    #[tokio::test]
    async fn first_page_failure_is_reported_and_not_bound() {
        let manifest = sample_manifest(2);
        let loader = FakeLoader::for_manifest(&manifest).failing_load(1);
        let h = harness_with(
            ViewerConfig::default(),
            FakeManifestSource::serving(manifest),
            loader,
            false,
        );

        let err = h.controller.load("m").await.unwrap_err();
        assert!(matches!(err, LoadError::FirstPage(_)));
        let state = h.controller.state();
        assert!(state.error.as_deref().unwrap().contains("page 1"));
        assert!(!state.loading);
        assert!(h.controller.document().is_none());
    }

    #[tokio::test]
    async fn page_navigation_is_clamped_at_both_ends() {
        let h = harness(2, ViewerConfig::default());
        h.controller.load("m").await.unwrap();

        h.controller.go_to_prev_page();
        assert!(h.viewer.calls().is_empty());

        h.controller.go_to_next_page();
        assert_eq!(h.controller.state().page_num, 2);
        h.controller.go_to_next_page();
        assert_eq!(h.viewer.calls(), vec![ViewerCall::Page(2)]);

        assert_eq!(h.controller.go_to_page(40), 2);
        assert_eq!(h.controller.go_to_page(0), 1);
        assert_eq!(
            h.viewer.calls(),
            vec![ViewerCall::Page(2), ViewerCall::Page(1)]
        );
    }

    #[tokio::test]
    async fn page_changes_from_the_engine_are_echoed_into_state() {
        let h = harness(3, ViewerConfig::default());
        h.controller.load("m").await.unwrap();

        h.bus.dispatch(ViewerEvent::PageChanging { page_number: 3 });
        assert_eq!(h.controller.state().page_num, 1);
        h.controller.on_animation_frame();
        assert_eq!(h.controller.state().page_num, 3);

        h.controller.handle_event(ViewerEvent::PageChanging { page_number: 99 });
        assert_eq!(h.controller.state().page_num, 3);
    }

    #[tokio::test]
    async fn zoom_steps_snap_to_deciles() {
        let h = harness(1, ViewerConfig::default());
        h.controller.load("m").await.unwrap();
        h.controller.handle_event(ViewerEvent::ScaleChanging {
            scale: 1.0,
            preset_value: None,
        });
        assert_eq!(h.controller.state().scale_token, ScaleToken::Percent(100));

        assert_eq!(h.controller.zoom_in(), 1.1);
        assert_eq!(h.controller.state().scale_token, ScaleToken::Custom);
        assert_eq!(h.controller.zoom_out(), 1.0);
        assert_eq!(h.controller.state().scale_token, ScaleToken::Percent(100));

        h.controller.handle_event(ViewerEvent::ScaleChanging {
            scale: 0.95,
            preset_value: None,
        });
        assert_eq!(h.controller.zoom_in(), 1.1);
        assert_eq!(
            h.viewer.scale_calls(),
            vec![
                ScaleValue::Numeric(1.1),
                ScaleValue::Numeric(1.0),
                ScaleValue::Numeric(1.1)
            ]
        );
    }

    #[tokio::test]
    async fn engine_preset_is_adopted_over_numeric_scale() {
        let h = harness(1, ViewerConfig::default());
        h.controller.handle_event(ViewerEvent::ScaleChanging {
            scale: 1.337,
            preset_value: Some("page-fit".to_owned()),
        });
        let state = h.controller.state();
        assert_eq!(state.scale, ScaleValue::Preset(ScalePreset::PageFit));
        assert_eq!(state.scale_token, ScaleToken::Preset(ScalePreset::PageFit));
        assert_eq!(state.current_scale, 1.337);

        h.controller.set_scale(ScaleValue::Numeric(12.0));
        assert_eq!(h.controller.state().scale, ScaleValue::Numeric(5.0));
    }

    #[tokio::test]
    async fn initial_scale_waits_for_the_frame_after_pages_init() {
        let config = ViewerConfig {
            default_scale: ScaleValue::Preset(ScalePreset::PageWidth),
            ..ViewerConfig::default()
        };
        let h = harness(2, config);
        h.controller.load("m").await.unwrap();

        h.bus.dispatch(ViewerEvent::PagesInit);
        h.controller.on_animation_frame();
        assert!(!h.controller.state().loading);
        assert!(h.viewer.scale_calls().is_empty());

        h.controller.on_animation_frame();
        assert_eq!(
            h.viewer.scale_calls(),
            vec![ScaleValue::Preset(ScalePreset::PageWidth)]
        );
    }

    #[tokio::test]
    async fn resize_reapplies_preset_once_per_frame() {
        let config = ViewerConfig {
            default_scale: ScaleValue::Preset(ScalePreset::PageWidth),
            ..ViewerConfig::default()
        };
        let h = harness(1, config);
        h.controller.load("m").await.unwrap();

        h.controller.notify_resize();
        h.controller.notify_resize();
        h.controller.on_animation_frame();
        h.controller.on_animation_frame();

        assert_eq!(
            h.viewer.scale_calls(),
            vec![ScaleValue::Preset(ScalePreset::PageWidth)]
        );
    }

    #[tokio::test]
    async fn auto_fit_is_bounded_by_largest_genuine_scale() {
        let config = ViewerConfig {
            auto_fit: true,
            ..ViewerConfig::default()
        };
        let h = harness(1, config);
        h.controller.load("m").await.unwrap();

        h.controller.handle_event(ViewerEvent::ScaleChanging {
            scale: 1.5,
            preset_value: None,
        });
        *h.viewer.width_fit.lock() = Some(2.4);
        for _ in 0..3 {
            h.controller.notify_resize();
        }
        h.controller.on_animation_frame();
        assert_eq!(h.viewer.scale_calls(), vec![ScaleValue::Numeric(1.5)]);

        h.controller.handle_event(ViewerEvent::ScaleChanging {
            scale: 1.5,
            preset_value: None,
        });
        *h.viewer.width_fit.lock() = Some(1.2);
        h.controller.notify_resize();
        h.controller.on_animation_frame();
        h.controller.handle_event(ViewerEvent::ScaleChanging {
            scale: 1.2,
            preset_value: None,
        });
        assert_eq!(h.controller.state().max_genuine_scale, Some(1.5));

        *h.viewer.width_fit.lock() = Some(3.0);
        h.controller.notify_resize();
        h.controller.on_animation_frame();
        assert_eq!(
            h.viewer.scale_calls(),
            vec![
                ScaleValue::Numeric(1.5),
                ScaleValue::Numeric(1.2),
                ScaleValue::Numeric(1.5)
            ]
        );
    }

    #[tokio::test]
    async fn document_error_event_becomes_user_visible() {
        let h = harness(1, ViewerConfig::default());
        h.controller.load("m").await.unwrap();

        h.bus.dispatch(ViewerEvent::DocumentError {
            message: "Invalid PDF structure".to_owned(),
        });
        h.controller.on_animation_frame();

        let state = h.controller.state();
        assert_eq!(state.error.as_deref(), Some("Invalid PDF structure"));
        assert!(!state.loading);
    }

    #[tokio::test]
    async fn unmount_runs_every_teardown_step_in_order() {
        let manifest = sample_manifest(2);
        let loader = FakeLoader::for_manifest(&manifest);
        let h = harness_with(
            ViewerConfig::default(),
            FakeManifestSource::serving(manifest),
            loader,
            true,
        );
        h.controller.load("m").await.unwrap();
        h.journal.lock().clear();

        h.controller.unmount().await;

        assert_eq!(
            *h.journal.lock(),
            vec![
                "viewer:cleanup".to_owned(),
                "links:detach".to_owned(),
                "viewer:detach".to_owned()
            ]
        );
        assert_eq!(h.bus.listener_count(), 0);
        assert_eq!(h.loader.destroyed_pages(), vec![1]);
        assert!(h.controller.document().is_none());

        h.controller.unmount().await;
    }

    #[tokio::test]
    async fn unmount_during_load_leaves_state_untouched() {
        let h = harness(2, ViewerConfig::default());
        h.loader.hold();

        let pending = tokio::spawn({
            let controller = h.controller.clone();
            async move { controller.load("m").await }
        });
        while h.loader.load_log().is_empty() {
            tokio::task::yield_now().await;
        }

        h.controller.unmount().await;
        h.loader.release();

        assert!(matches!(pending.await.unwrap(), Err(LoadError::Cancelled)));
        assert!(h.controller.state().error.is_none());
        assert!(h.controller.document().is_none());
        assert_eq!(h.loader.destroyed_pages(), vec![1]);
        assert!(!h.journal.lock().iter().any(|entry| entry.ends_with(":attach")));
    }

    #[tokio::test]
    async fn loading_a_new_manifest_releases_the_previous_document() {
        let h = harness(3, ViewerConfig::default());
        h.controller.load("first").await.unwrap();
        h.controller.go_to_page(3);

        h.controller.load("second").await.unwrap();

        assert_eq!(h.controller.state().page_num, 1);
        assert_eq!(h.loader.destroyed_pages(), vec![1]);
        assert_eq!(h.loader.load_log(), vec![1, 1]);
    }

    #[tokio::test(start_paused = true)]
    async fn run_ticks_frames_until_unmounted() {
        let h = harness(2, ViewerConfig::default());
        h.controller.load("m").await.unwrap();

        let frames = tokio::spawn({
            let controller = h.controller.clone();
            async move { controller.run().await }
        });
        h.bus.dispatch(ViewerEvent::PageChanging { page_number: 2 });
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(h.controller.state().page_num, 2);

        h.controller.unmount().await;
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        frames.await.unwrap();
    }
}
