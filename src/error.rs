//! Error taxonomy for viewing sessions

use std::fmt;

use serde::Serialize;

/// Kind of failure a session can report
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// No locator was supplied
    NoLocator,
    /// The byte source could not be fetched
    Unreachable,
    /// The bytes could not be parsed, or the document has no pages
    MalformedDocument,
    /// A single page failed to render
    RenderFailed,
    /// Page input text was rejected by the navigation controller
    InvalidPageInput,
}

impl ErrorKind {
    /// Whether this kind ends the current generation (moves the session to `Error`)
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::NoLocator | Self::Unreachable | Self::MalformedDocument
        )
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NoLocator => "no_locator",
            Self::Unreachable => "unreachable",
            Self::MalformedDocument => "malformed_document",
            Self::RenderFailed => "render_failed",
            Self::InvalidPageInput => "invalid_page_input",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error surfaced through the session snapshot
#[derive(Clone, Debug, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("{message}")]
pub struct SessionError {
    pub kind: ErrorKind,
    pub message: String,
    /// Locator that was being loaded or rendered when the error happened
    pub locator: Option<String>,
}

impl SessionError {
    pub fn new(kind: ErrorKind, message: impl Into<String>, locator: Option<&str>) -> Self {
        Self {
            kind,
            message: message.into(),
            locator: locator.map(str::to_owned),
        }
    }

    pub fn render_failed(page: usize, detail: impl fmt::Display, locator: Option<&str>) -> Self {
        Self::new(
            ErrorKind::RenderFailed,
            format!("Failed to render page {page}: {detail}"),
            locator,
        )
    }
}

/// Terminal failure of a single load attempt
#[derive(Debug, thiserror::Error)]
pub enum LoadFailure {
    #[error("No locator provided to the viewer")]
    NoLocator,

    #[error("Failed to load PDF from {locator}. {source}")]
    Unreachable {
        locator: String,
        #[source]
        source: crate::pdf::SourceError,
    },

    #[error("Failed to load PDF from {locator}. {detail}")]
    Malformed { locator: String, detail: String },

    #[error("Failed to load PDF from {locator}. The document is empty (0 pages)")]
    Empty { locator: String },
}

impl LoadFailure {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NoLocator => ErrorKind::NoLocator,
            Self::Unreachable { .. } => ErrorKind::Unreachable,
            Self::Malformed { .. } | Self::Empty { .. } => ErrorKind::MalformedDocument,
        }
    }

    #[must_use]
    pub fn locator(&self) -> Option<&str> {
        match self {
            Self::NoLocator => None,
            Self::Unreachable { locator, .. }
            | Self::Malformed { locator, .. }
            | Self::Empty { locator } => Some(locator),
        }
    }

    #[must_use]
    pub fn to_session_error(&self) -> SessionError {
        SessionError::new(self.kind(), self.to_string(), self.locator())
    }
}

/// Page input rejected by the navigation controller
///
/// Never reaches the session snapshot; the caller redisplays the current page.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("Invalid page input {input:?}")]
pub struct InvalidPageInput {
    pub input: String,
}

impl InvalidPageInput {
    pub fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
        }
    }

    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        ErrorKind::InvalidPageInput
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::SourceError;

    #[test]
    fn terminal_kinds() {
        assert!(ErrorKind::NoLocator.is_terminal());
        assert!(ErrorKind::Unreachable.is_terminal());
        assert!(ErrorKind::MalformedDocument.is_terminal());
        assert!(!ErrorKind::RenderFailed.is_terminal());
        assert!(!ErrorKind::InvalidPageInput.is_terminal());
    }

    #[test]
    fn load_failure_carries_locator_and_kind() {
        let failure = LoadFailure::Unreachable {
            locator: "/sample.pdf".to_string(),
            source: SourceError::NotFound {
                locator: "/sample.pdf".to_string(),
            },
        };
        let err = failure.to_session_error();
        assert_eq!(err.kind, ErrorKind::Unreachable);
        assert_eq!(err.locator.as_deref(), Some("/sample.pdf"));
        assert!(err.message.starts_with("Failed to load PDF from /sample.pdf."));
        assert!(err.message.contains("missing"));
    }

    #[test]
    fn empty_document_is_malformed() {
        let failure = LoadFailure::Empty {
            locator: "a.pdf".to_string(),
        };
        assert_eq!(failure.kind(), ErrorKind::MalformedDocument);
        assert!(failure.to_string().contains("empty"));
    }

    #[test]
    fn no_locator_has_no_locator() {
        let err = LoadFailure::NoLocator.to_session_error();
        assert_eq!(err.kind, ErrorKind::NoLocator);
        assert_eq!(err.locator, None);
    }

    #[test]
    fn render_failed_message_names_page() {
        let err = SessionError::render_failed(3, "boom", Some("x.pdf"));
        assert_eq!(err.kind, ErrorKind::RenderFailed);
        assert_eq!(err.to_string(), "Failed to render page 3: boom");
    }
}
