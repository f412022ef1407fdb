pub mod config;
pub mod controller;
pub mod events;
pub mod scale;

pub use config::{ConfigError, ViewerConfig};
pub use controller::{Collaborators, LinkService, LoadError, PdfViewer, ViewerController, ViewerState};
pub use events::{EventBus, Subscription, ViewerEvent};
pub use scale::{
    step_zoom, ScaleBounds, ScaleParseError, ScalePreset, ScaleToken, ScaleValue, ZoomDirection,
    KNOWN_PERCENTAGES, MAX_SCALE, MIN_SCALE,
};
