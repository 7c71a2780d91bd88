//! Content loader
//!
//! Turns a locator into a live document, once per generation. At most one
//! document is live at a time; it is disposed when superseded, abandoned
//! or when the loader is dropped.

use std::fmt;
use std::sync::Arc;

use flume::Sender;
use log::{debug, info};

use super::engine::{EngineConfig, PdfDocument, PdfEngine};
use super::request::{CancelFlag, Generation, WorkerEvent};
use super::source::{ByteSource, SourceError};
use super::worker::{LoadJob, load_worker};
use crate::error::LoadFailure;

/// Exclusive owner of a parsed document
///
/// Disposes the document exactly once, when dropped. Dropping a stale or
/// undeliverable load result therefore always releases the engine handle.
pub struct OwnedDocument {
    document: Arc<dyn PdfDocument>,
    locator: String,
    page_count: usize,
}

impl OwnedDocument {
    pub fn new(document: Arc<dyn PdfDocument>, locator: impl Into<String>) -> Self {
        let page_count = document.page_count();
        Self {
            document,
            locator: locator.into(),
            page_count,
        }
    }

    #[must_use]
    pub fn document(&self) -> &Arc<dyn PdfDocument> {
        &self.document
    }

    #[must_use]
    pub fn page_count(&self) -> usize {
        self.page_count
    }

    #[must_use]
    pub fn locator(&self) -> &str {
        &self.locator
    }
}

impl Drop for OwnedDocument {
    fn drop(&mut self) {
        debug!("Disposing document {}", self.locator);
        self.document.dispose();
    }
}

impl fmt::Debug for OwnedDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OwnedDocument")
            .field("locator", &self.locator)
            .field("page_count", &self.page_count)
            .finish()
    }
}

/// Result of handing a load completion to the loader
#[derive(Debug)]
pub enum LoadOutcome {
    /// Completion belongs to an abandoned generation and was dropped
    Stale,
    /// Document is now live
    Ready { page_count: usize },
    /// Load failed for the current generation
    Failed(LoadFailure),
}

#[derive(Debug)]
struct PendingLoad {
    generation: Generation,
    locator: String,
    cancel: CancelFlag,
}

/// Loads documents on background threads and owns the live document
pub struct ContentLoader {
    source: Arc<dyn ByteSource>,
    engine: Arc<dyn PdfEngine>,
    config: EngineConfig,
    events: Sender<WorkerEvent>,
    pending: Option<PendingLoad>,
    live: Option<OwnedDocument>,
}

impl ContentLoader {
    pub fn new(
        source: Arc<dyn ByteSource>,
        engine: Arc<dyn PdfEngine>,
        config: EngineConfig,
        events: Sender<WorkerEvent>,
    ) -> Self {
        Self {
            source,
            engine,
            config,
            events,
            pending: None,
            live: None,
        }
    }

    /// Start loading `locator` for `generation`
    ///
    /// Disposes the live document and voids any pending load first. An
    /// empty locator fails immediately without touching the source.
    pub fn load(&mut self, locator: &str, generation: Generation) -> Result<(), LoadFailure> {
        self.abandon();

        if locator.trim().is_empty() {
            return Err(LoadFailure::NoLocator);
        }

        let cancel = CancelFlag::new();
        let job = LoadJob {
            generation,
            locator: locator.to_string(),
            source: Arc::clone(&self.source),
            engine: Arc::clone(&self.engine),
            config: self.config.clone(),
            cancel: cancel.clone(),
        };
        let events = self.events.clone();

        std::thread::Builder::new()
            .name(format!("pdfview-load-{}", generation.0))
            .spawn(move || load_worker(job, events))
            .map_err(|source| LoadFailure::Unreachable {
                locator: locator.to_string(),
                source: SourceError::Io {
                    locator: locator.to_string(),
                    source,
                },
            })?;

        debug!("Started load of {locator} ({generation})");
        self.pending = Some(PendingLoad {
            generation,
            locator: locator.to_string(),
            cancel,
        });
        Ok(())
    }

    /// Apply a load completion
    ///
    /// Completions for anything other than the pending generation are
    /// dropped, which disposes any document they carry.
    pub fn accept(
        &mut self,
        generation: Generation,
        result: Result<OwnedDocument, LoadFailure>,
    ) -> LoadOutcome {
        let is_current = self
            .pending
            .as_ref()
            .is_some_and(|pending| pending.generation == generation);
        if !is_current {
            debug!("Dropping load completion for abandoned {generation}");
            return LoadOutcome::Stale;
        }

        let Some(pending) = self.pending.take() else {
            return LoadOutcome::Stale;
        };

        match result {
            Ok(document) => {
                let page_count = document.page_count();
                info!(
                    "Loaded {} ({page_count} pages, {generation})",
                    pending.locator
                );
                self.live = Some(document);
                LoadOutcome::Ready { page_count }
            }
            Err(failure) => LoadOutcome::Failed(failure),
        }
    }

    /// Void the pending load and dispose the live document
    pub fn abandon(&mut self) {
        if let Some(pending) = self.pending.take() {
            debug!(
                "Abandoning load of {} ({})",
                pending.locator, pending.generation
            );
            pending.cancel.cancel();
        }
        self.live = None;
    }

    /// The live document, lent out for rendering
    #[must_use]
    pub fn document(&self) -> Option<&Arc<dyn PdfDocument>> {
        self.live.as_ref().map(OwnedDocument::document)
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.pending.is_some()
    }

    #[must_use]
    pub fn has_document(&self) -> bool {
        self.live.is_some()
    }
}

impl Drop for ContentLoader {
    fn drop(&mut self) {
        self.abandon();
    }
}
