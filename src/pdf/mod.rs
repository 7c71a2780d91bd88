//! PDF viewing session infrastructure

mod cache;
mod engine;
mod loader;
#[cfg(feature = "pdf")]
mod mupdf_engine;
mod navigation;
mod pipeline;
mod request;
mod session;
mod source;
mod state;
mod surface;
mod worker;

pub use cache::{CacheKey, FrameCache};
pub use engine::{
    DEFAULT_MAX_RENDER_DIMENSION, EngineConfig, EngineError, PageSize, PdfDocument, PdfEngine,
    PdfPage, Viewport,
};
pub use loader::{ContentLoader, LoadOutcome, OwnedDocument};
#[cfg(feature = "pdf")]
pub use mupdf_engine::{MupdfDocument, MupdfEngine};
pub use navigation::{Command, Effect, InvalidZoomRange, Navigation, ZoomRange};
pub use pipeline::{Dispatch, RenderOutcome, RenderPipeline};
pub use request::{
    CancelFlag, Generation, RenderJob, RenderRequest, RenderTicket, RequestId, WorkerEvent,
    zoom_key,
};
pub use session::{DEFAULT_CACHE_SIZE, DEFAULT_RENDER_WORKERS, Session, SessionConfig};
pub use source::{ByteSource, FileSource, MemorySource, SourceError};
pub use state::{Phase, SessionState};
pub use surface::{Frame, PixelSurface, Surface};
