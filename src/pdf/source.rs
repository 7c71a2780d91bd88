//! Byte sources that resolve a locator into document bytes

use std::collections::HashMap;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, RwLock};

/// Resolves a locator into raw bytes
///
/// Called on a loader thread, never on the control thread.
pub trait ByteSource: Send + Sync {
    fn fetch(&self, locator: &str) -> Result<Vec<u8>, SourceError>;
}

/// Errors from a byte source
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("The source {locator} is missing. Ensure the file exists and is accessible.")]
    NotFound { locator: String },

    #[error("Could not read {locator}: {source}")]
    Io {
        locator: String,
        #[source]
        source: io::Error,
    },

    #[error("Locator {locator} is not valid: {reason}")]
    Invalid { locator: String, reason: String },
}

/// Reads documents from the local filesystem
///
/// Accepts plain paths and `file://` locators. With a root configured,
/// locators are resolved beneath it (a leading `/` refers to the root) and
/// may not escape it.
#[derive(Clone, Debug, Default)]
pub struct FileSource {
    root: Option<PathBuf>,
}

impl FileSource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    /// Map a locator to a filesystem path
    pub fn resolve(&self, locator: &str) -> Result<PathBuf, SourceError> {
        let raw = locator.strip_prefix("file://").unwrap_or(locator);
        if raw.is_empty() {
            return Err(SourceError::Invalid {
                locator: locator.to_string(),
                reason: "empty path".to_string(),
            });
        }

        let Some(root) = &self.root else {
            return Ok(PathBuf::from(raw));
        };

        let relative = Path::new(raw.trim_start_matches('/'));
        let escapes = relative
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)));
        if escapes {
            return Err(SourceError::Invalid {
                locator: locator.to_string(),
                reason: "path escapes the source root".to_string(),
            });
        }

        Ok(root.join(relative))
    }
}

impl ByteSource for FileSource {
    fn fetch(&self, locator: &str) -> Result<Vec<u8>, SourceError> {
        let path = self.resolve(locator)?;
        std::fs::read(&path).map_err(|source| {
            if source.kind() == io::ErrorKind::NotFound {
                SourceError::NotFound {
                    locator: locator.to_string(),
                }
            } else {
                SourceError::Io {
                    locator: locator.to_string(),
                    source,
                }
            }
        })
    }
}

/// In-process byte map, keyed by locator
#[derive(Clone, Debug, Default)]
pub struct MemorySource {
    entries: Arc<RwLock<HashMap<String, Arc<Vec<u8>>>>>,
}

impl MemorySource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, locator: impl Into<String>, bytes: Vec<u8>) {
        self.entries
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(locator.into(), Arc::new(bytes));
    }

    pub fn remove(&self, locator: &str) -> bool {
        self.entries
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(locator)
            .is_some()
    }
}

impl ByteSource for MemorySource {
    fn fetch(&self, locator: &str) -> Result<Vec<u8>, SourceError> {
        self.entries
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(locator)
            .map(|bytes| bytes.as_ref().clone())
            .ok_or_else(|| SourceError::NotFound {
                locator: locator.to_string(),
            })
    }
}
