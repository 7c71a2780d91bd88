//! Request, ticket and worker event types

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;

use super::engine::{EngineError, PdfDocument};
use super::loader::OwnedDocument;
use super::surface::Frame;
use crate::error::LoadFailure;

/// Session generation, minted once per locator change
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Generation(pub u64);

impl Generation {
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "g{}", self.0)
    }
}

/// Unique identifier for render requests
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RequestId(pub u64);

impl RequestId {
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }
}

/// Zoom factor stored as ten-thousandths for stable comparison and hashing
#[must_use]
pub fn zoom_key(zoom: f32) -> u32 {
    (zoom * 10_000.0).round() as u32
}

/// Identity of one render request
///
/// A completion is only presented when its ticket equals the pipeline's
/// latest ticket, which pins document generation, page and zoom together.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RenderTicket {
    pub generation: Generation,
    pub id: RequestId,
    /// 1-based page number
    pub page: usize,
    pub zoom_key: u32,
}

impl RenderTicket {
    #[must_use]
    pub fn zoom(&self) -> f32 {
        self.zoom_key as f32 / 10_000.0
    }
}

/// Cooperative cancellation flag shared with a worker
///
/// Clones observe the same state. Workers check it at each suspension
/// point and drop their result once it is set.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag {
    cancelled: Arc<AtomicBool>,
}

impl CancelFlag {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// A page render handed to the worker pool
///
/// The document is lent for this call only.
pub struct RenderJob {
    pub ticket: RenderTicket,
    pub document: Arc<dyn PdfDocument>,
    pub max_dimension: u32,
    pub cancel: CancelFlag,
}

impl fmt::Debug for RenderJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderJob")
            .field("ticket", &self.ticket)
            .field("max_dimension", &self.max_dimension)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// Request sent to render workers
#[derive(Debug)]
pub enum RenderRequest {
    /// Render a page
    Page(RenderJob),

    /// Shutdown the worker
    Shutdown,
}

/// Completion reported back to the control thread
#[derive(Debug)]
pub enum WorkerEvent {
    /// A load attempt finished
    Loaded {
        generation: Generation,
        result: Result<OwnedDocument, LoadFailure>,
    },

    /// A page render finished
    Rendered {
        ticket: RenderTicket,
        result: Result<Arc<Frame>, EngineError>,
    },
}
