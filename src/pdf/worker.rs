//! Load and render workers - run in separate threads

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use flume::{Receiver, Sender};
use log::{debug, trace, warn};

use super::engine::{EngineConfig, EngineError, PdfEngine, Viewport};
use super::loader::OwnedDocument;
use super::request::{CancelFlag, Generation, RenderJob, RenderRequest, WorkerEvent};
use super::source::ByteSource;
use super::surface::Frame;
use crate::error::LoadFailure;

/// One load attempt, moved onto its own thread
pub struct LoadJob {
    pub generation: Generation,
    pub locator: String,
    pub source: Arc<dyn ByteSource>,
    pub engine: Arc<dyn PdfEngine>,
    pub config: EngineConfig,
    pub cancel: CancelFlag,
}

/// Run a load to completion and report it, unless cancelled on the way
pub fn load_worker(job: LoadJob, events: Sender<WorkerEvent>) {
    let generation = job.generation;
    let Some(result) = load_document(&job) else {
        debug!("Load of {} ({generation}) cancelled", job.locator);
        return;
    };

    // Receiver gone means the session is closed; the document is disposed
    // when the unsent event is dropped.
    let _ = events.send(WorkerEvent::Loaded { generation, result });
}

/// Fetch and parse a document
///
/// Returns `None` once the job is cancelled. A document parsed before the
/// cancellation is noticed is disposed here.
pub fn load_document(job: &LoadJob) -> Option<Result<OwnedDocument, LoadFailure>> {
    let bytes = match job.source.fetch(&job.locator) {
        Ok(bytes) => bytes,
        Err(source) => {
            if job.cancel.is_cancelled() {
                return None;
            }
            warn!("Failed to fetch {}: {source}", job.locator);
            return Some(Err(LoadFailure::Unreachable {
                locator: job.locator.clone(),
                source,
            }));
        }
    };

    if job.cancel.is_cancelled() {
        return None;
    }

    trace!("Fetched {} bytes from {}", bytes.len(), job.locator);
    let document = match job.engine.open(bytes, &job.config) {
        Ok(document) => OwnedDocument::new(document, job.locator.clone()),
        Err(e) => {
            if job.cancel.is_cancelled() {
                return None;
            }
            warn!("Failed to parse {}: {e}", job.locator);
            return Some(Err(LoadFailure::Malformed {
                locator: job.locator.clone(),
                detail: e.to_string(),
            }));
        }
    };

    if job.cancel.is_cancelled() {
        return None;
    }

    if document.page_count() == 0 {
        return Some(Err(LoadFailure::Empty {
            locator: job.locator.clone(),
        }));
    }

    Some(Ok(document))
}

/// Serve render requests until shutdown or until the pool's sender is gone
pub fn render_worker(requests: Receiver<RenderRequest>, events: Sender<WorkerEvent>) {
    for request in requests {
        match request {
            RenderRequest::Page(job) => handle_page_request(job, &events),
            RenderRequest::Shutdown => break,
        }
    }
}

fn handle_page_request(job: RenderJob, events: &Sender<WorkerEvent>) {
    let ticket = job.ticket;
    if job.cancel.is_cancelled() {
        trace!("Skipping cancelled render of page {}", ticket.page);
        return;
    }

    let result = catch_unwind(AssertUnwindSafe(|| render_page(&job)))
        .unwrap_or_else(|_| Err(EngineError::Render("engine panicked".to_string())));

    if job.cancel.is_cancelled() {
        trace!("Dropping cancelled render of page {}", ticket.page);
        return;
    }

    let _ = events.send(WorkerEvent::Rendered {
        ticket,
        result: result.map(Arc::new),
    });
}

/// Rasterize one page of the lent document
pub fn render_page(job: &RenderJob) -> Result<Frame, EngineError> {
    let page = job.document.page(job.ticket.page)?;
    let viewport = Viewport::for_page(page.size(), job.ticket.zoom(), job.max_dimension);

    if job.cancel.is_cancelled() {
        return Err(EngineError::Render("cancelled".to_string()));
    }

    trace!(
        "Rendering page {} at {}x{} (scale {:.4})",
        job.ticket.page, viewport.width, viewport.height, viewport.scale
    );
    let frame = page.render(&viewport)?;
    if (frame.width, frame.height) != (viewport.width, viewport.height) {
        trace!(
            "Fitting {}x{} raster of page {} to viewport",
            frame.width, frame.height, job.ticket.page
        );
    }
    Ok(frame.fit_to(viewport.width, viewport.height))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::pdf::request::{RenderTicket, RequestId, zoom_key};
    use crate::test_utils::{ScriptedEngine, ScriptedSource, scripted_pdf};

    fn job(engine: &ScriptedEngine, pages: usize, page: usize) -> RenderJob {
        RenderJob {
            ticket: RenderTicket {
                generation: Generation(1),
                id: RequestId::new(1),
                page,
                zoom_key: zoom_key(1.0),
            },
            document: engine.open_scripted(pages),
            max_dimension: 4096,
            cancel: CancelFlag::new(),
        }
    }

    #[test]
    fn render_page_sizes_frame_from_viewport() {
        let engine = ScriptedEngine::new();
        let frame = render_page(&job(&engine, 3, 2)).unwrap();
        assert_eq!((frame.width, frame.height), engine.frame_size(1.0));
        assert_eq!(frame.pixel(0, 0), Some([2, 2, 2]));
    }

    #[test]
    fn render_page_fits_oversized_raster_to_viewport() {
        let engine = ScriptedEngine::new();
        engine.overshoot_frames(1);
        let frame = render_page(&job(&engine, 3, 3)).unwrap();
        assert_eq!((frame.width, frame.height), engine.frame_size(1.0));
        assert_eq!(frame.byte_len(), (frame.width * frame.height * 3) as usize);
        assert_eq!(frame.pixel(0, 0), Some([3, 3, 3]));
    }

    #[test]
    fn engine_panic_reports_render_failure() {
        let engine = ScriptedEngine::new();
        engine.panic_pages(&[2]);

        let (tx, rx) = flume::unbounded();
        handle_page_request(job(&engine, 3, 2), &tx);

        match rx.try_recv().unwrap() {
            WorkerEvent::Rendered { ticket, result } => {
                assert_eq!(ticket.page, 2);
                let err = result.unwrap_err();
                assert!(matches!(&err, EngineError::Render(msg) if msg == "engine panicked"));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn render_page_out_of_range_fails() {
        let engine = ScriptedEngine::new();
        let err = render_page(&job(&engine, 3, 7)).unwrap_err();
        assert!(matches!(err, EngineError::PageOutOfRange { page: 7, .. }));
    }

    #[test]
    fn cancelled_job_reports_nothing() {
        let engine = ScriptedEngine::new();
        let job = job(&engine, 2, 1);
        job.cancel.cancel();

        let (tx, rx) = flume::unbounded();
        handle_page_request(job, &tx);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn worker_stops_on_shutdown() {
        let engine = ScriptedEngine::new();
        let (req_tx, req_rx) = flume::unbounded();
        let (ev_tx, ev_rx) = flume::unbounded();
        let handle = std::thread::spawn(move || render_worker(req_rx, ev_tx));

        req_tx.send(RenderRequest::Page(job(&engine, 2, 1))).unwrap();
        req_tx.send(RenderRequest::Shutdown).unwrap();
        handle.join().unwrap();

        match ev_rx.recv_timeout(Duration::from_secs(1)).unwrap() {
            WorkerEvent::Rendered { ticket, result } => {
                assert_eq!(ticket.page, 1);
                assert!(result.is_ok());
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn load_maps_parse_errors_to_malformed() {
        let source = Arc::new(ScriptedSource::new());
        source.insert("bad.pdf", b"not a pdf".to_vec());
        let job = LoadJob {
            generation: Generation(1),
            locator: "bad.pdf".to_string(),
            source,
            engine: Arc::new(ScriptedEngine::new()),
            config: EngineConfig::default(),
            cancel: CancelFlag::new(),
        };

        let failure = load_document(&job).unwrap().unwrap_err();
        assert!(matches!(failure, LoadFailure::Malformed { .. }));
    }

    #[test]
    fn cancelled_load_disposes_parsed_document() {
        let source = Arc::new(ScriptedSource::new());
        source.insert("a.pdf", scripted_pdf(2));
        let engine = Arc::new(ScriptedEngine::new());
        let cancel = CancelFlag::new();
        let job = LoadJob {
            generation: Generation(1),
            locator: "a.pdf".to_string(),
            source,
            engine: engine.clone(),
            config: EngineConfig::default(),
            cancel: cancel.clone(),
        };

        engine.cancel_on_open(cancel);
        assert!(load_document(&job).is_none());
        assert_eq!(engine.opened_count(), 1);
        assert_eq!(engine.disposed_count(), 1);
    }

    #[test]
    fn load_finishing_after_close_disposes_document() {
        let source = Arc::new(ScriptedSource::new());
        source.insert("a.pdf", scripted_pdf(2));
        let engine = Arc::new(ScriptedEngine::new());
        let job = LoadJob {
            generation: Generation(1),
            locator: "a.pdf".to_string(),
            source,
            engine: engine.clone(),
            config: EngineConfig::default(),
            cancel: CancelFlag::new(),
        };

        // the session dropped its receiver while the load was running
        let (tx, rx) = flume::unbounded();
        drop(rx);
        load_worker(job, tx);

        assert_eq!(engine.opened_count(), 1);
        assert_eq!(engine.live_count(), 0);
    }
}
