//! Document engine abstraction
//!
//! The session never parses PDF bytes itself. An engine turns bytes into a
//! [`PdfDocument`], which hands out transient [`PdfPage`]s that rasterize
//! into a [`Frame`] for a given [`Viewport`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::surface::Frame;

/// Largest raster edge the default configuration will produce
pub const DEFAULT_MAX_RENDER_DIMENSION: u32 = 8192;

/// Engine configuration, handed to the engine on every open
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Viewports larger than this on either edge are scaled down to fit
    pub max_render_dimension: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_render_dimension: DEFAULT_MAX_RENDER_DIMENSION,
        }
    }
}

/// Intrinsic page size in PDF points
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PageSize {
    pub width: f32,
    pub height: f32,
}

impl PageSize {
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

/// Pixel dimensions for a page at a zoom factor
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
    /// Requested zoom factor
    pub zoom: f32,
    /// Points-to-pixels factor actually used (differs from `zoom` only when capped)
    pub scale: f32,
}

impl Viewport {
    /// Compute the viewport for `size` at `zoom`
    ///
    /// Dimensions scale linearly with zoom; an edge beyond `max_dimension`
    /// shrinks both edges by the same factor.
    #[must_use]
    pub fn for_page(size: PageSize, zoom: f32, max_dimension: u32) -> Self {
        let page_width = size.width.max(1.0);
        let page_height = size.height.max(1.0);

        let mut scale = zoom;
        let longest = page_width.max(page_height) * scale;
        let max_dimension = max_dimension.max(1) as f32;
        if longest > max_dimension {
            scale *= max_dimension / longest;
        }

        Self {
            width: ((page_width * scale).floor() as u32).max(1),
            height: ((page_height * scale).floor() as u32).max(1),
            zoom,
            scale,
        }
    }
}

/// Errors reported by an engine
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("document has been disposed")]
    Disposed,

    #[error("page {page} is out of range (document has {page_count} pages)")]
    PageOutOfRange { page: usize, page_count: usize },

    #[error("{0}")]
    Malformed(String),

    #[error("{0}")]
    Render(String),

    #[cfg(feature = "pdf")]
    #[error("PDF engine: {0}")]
    Pdf(#[from] mupdf::error::Error),
}

/// Turns raw bytes into a document handle
pub trait PdfEngine: Send + Sync {
    fn open(&self, bytes: Vec<u8>, config: &EngineConfig)
    -> Result<Arc<dyn PdfDocument>, EngineError>;
}

/// A parsed document
///
/// Shared with render workers for the duration of a single render call.
/// `dispose` releases engine resources; afterwards `page` fails with
/// [`EngineError::Disposed`].
pub trait PdfDocument: Send + Sync {
    fn page_count(&self) -> usize;

    /// Fetch a page by 1-based number
    fn page(&self, number: usize) -> Result<Box<dyn PdfPage + '_>, EngineError>;

    fn dispose(&self);
}

/// Transient per-page handle, used on a single worker thread
pub trait PdfPage {
    fn size(&self) -> PageSize;

    fn render(&self, viewport: &Viewport) -> Result<Frame, EngineError>;
}
