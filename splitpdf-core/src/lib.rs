pub mod adapter;
pub mod destination;
pub mod engine;
pub mod error;
pub mod manifest;
pub mod reference;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use adapter::{fingerprint_for_doc_id, LazyDocument};
pub use destination::{
    DestinationEntry, DestinationIndex, DestinationTarget, DestinationView, ExplicitDestination,
};
pub use engine::{
    AnnotationStorage, DocumentInfo, DocumentLoader, DocumentMetadata, DocumentProxy,
    LoadMode, LoadingParams, ManifestSource, NoopFilterFactory, OptionalContentConfig,
    PageDocument, PageProxy, PdfEngine, RenderIntent, DEFAULT_MAX_FILE_SIZE,
    DEFAULT_RANGE_CHUNK_SIZE,
};
pub use error::{
    DestinationScanError, DocumentError, DocumentResult, EngineError, ManifestLoadError,
    PageLoadError,
};
pub use manifest::{Manifest, PageEntry};
pub use reference::{PageRef, ReferenceIndex};
