//! Observable session snapshot

use serde::Serialize;

use super::request::Generation;
use crate::error::{ErrorKind, SessionError};

/// Lifecycle phase of a viewing session
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// No locator opened yet, or the session is closed
    #[default]
    Idle,
    /// A document is being fetched and parsed
    Loading,
    /// A document is live and navigable
    Ready,
    /// The last load failed
    Error,
}

impl Phase {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Loading => "loading",
            Self::Ready => "ready",
            Self::Error => "error",
        }
    }
}

/// Snapshot of everything a presentation layer needs
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SessionState {
    pub phase: Phase,
    pub error: Option<SessionError>,
    pub locator: Option<String>,
    pub generation: Generation,

    /// 0 unless `Ready`
    pub page_count: usize,

    /// 1-based; 0 when there is no document
    pub current_page: usize,

    pub zoom: f32,

    /// Whether a page render is in flight
    pub is_rendering: bool,

    pub can_go_previous: bool,
    pub can_go_next: bool,
    pub can_zoom_in: bool,
    pub can_zoom_out: bool,
}

impl SessionState {
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.phase == Phase::Ready
    }

    #[must_use]
    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }

    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        self.error.as_ref().map(|e| e.message.as_str())
    }

    /// Zoom as a whole percentage, e.g. `120`
    #[must_use]
    pub fn zoom_percent(&self) -> u32 {
        (self.zoom * 100.0).round() as u32
    }

    /// "Page N of M", or `None` without a document
    #[must_use]
    pub fn page_label(&self) -> Option<String> {
        if self.page_count == 0 {
            return None;
        }
        Some(format!("Page {} of {}", self.current_page, self.page_count))
    }
}
