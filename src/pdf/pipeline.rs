//! Render pipeline - manages the worker pool, frame cache and presentation
//!
//! At most one render is active. Starting a new one cancels the previous,
//! and a completion is only painted when its ticket is still the active one.

use std::sync::Arc;

use flume::Sender;
use log::{debug, error, trace};

use super::cache::{CacheKey, FrameCache};
use super::engine::{EngineError, PdfDocument};
use super::request::{
    CancelFlag, Generation, RenderJob, RenderRequest, RenderTicket, RequestId, WorkerEvent,
    zoom_key,
};
use super::surface::{Frame, Surface};
use super::worker::render_worker;

#[derive(Debug)]
struct ActiveRender {
    ticket: RenderTicket,
    cancel: CancelFlag,
}

/// How a render request was dispatched
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dispatch {
    /// Served from the frame cache and painted immediately
    Cached(RenderTicket),
    /// Handed to the worker pool
    Queued(RenderTicket),
}

impl Dispatch {
    #[must_use]
    pub const fn ticket(&self) -> RenderTicket {
        match self {
            Self::Cached(ticket) | Self::Queued(ticket) => *ticket,
        }
    }
}

/// Result of handing a render completion to the pipeline
#[derive(Debug)]
pub enum RenderOutcome {
    /// Frame was painted onto the surface
    Presented(RenderTicket),
    /// The active render failed; the surface keeps its previous frame
    Failed {
        ticket: RenderTicket,
        error: EngineError,
    },
    /// Completion was superseded and discarded
    Stale,
}

/// Worker pool plus latest-request-wins bookkeeping
pub struct RenderPipeline {
    requests: Sender<RenderRequest>,
    num_workers: usize,
    next_request_id: u64,
    active: Option<ActiveRender>,
    cache: FrameCache,
    presented: Option<RenderTicket>,
    shut_down: bool,
}

impl RenderPipeline {
    /// Spawn `num_workers` render threads reporting into `events`
    #[must_use]
    pub fn new(num_workers: usize, cache_size: usize, events: Sender<WorkerEvent>) -> Self {
        // flume because workers share one request queue; std mpsc receivers
        // cannot be cloned.
        let (request_tx, request_rx) = flume::unbounded();

        let mut spawned = 0;
        for index in 0..num_workers.max(1) {
            let rx = request_rx.clone();
            let tx = events.clone();
            let builder = std::thread::Builder::new().name(format!("pdfview-render-{index}"));
            match builder.spawn(move || render_worker(rx, tx)) {
                Ok(_) => spawned += 1,
                Err(e) => error!("Failed to spawn render worker {index}: {e}"),
            }
        }

        Self {
            requests: request_tx,
            num_workers: spawned,
            next_request_id: 1,
            active: None,
            cache: FrameCache::new(cache_size),
            presented: None,
            shut_down: false,
        }
    }

    /// Render `page` of `document` at `zoom`, superseding any active render
    pub fn render<S: Surface + ?Sized>(
        &mut self,
        document: &Arc<dyn PdfDocument>,
        page: usize,
        zoom: f32,
        generation: Generation,
        max_dimension: u32,
        surface: Option<&mut S>,
    ) -> Result<Dispatch, EngineError> {
        self.cancel();

        let ticket = RenderTicket {
            generation,
            id: self.next_id(),
            page,
            zoom_key: zoom_key(zoom),
        };

        if let Some(frame) = self.cache.get(&CacheKey::from_ticket(&ticket)) {
            trace!("Cache hit for page {page} at {zoom}");
            paint(surface, &frame);
            self.presented = Some(ticket);
            return Ok(Dispatch::Cached(ticket));
        }

        if self.shut_down || self.num_workers == 0 {
            return Err(EngineError::Render(
                "render workers are not running".to_string(),
            ));
        }

        let cancel = CancelFlag::new();
        let job = RenderJob {
            ticket,
            document: Arc::clone(document),
            max_dimension,
            cancel: cancel.clone(),
        };
        self.requests
            .send(RenderRequest::Page(job))
            .map_err(|_| EngineError::Render("render workers are not running".to_string()))?;

        debug!("Queued render of page {page} at {zoom} ({})", ticket.id.0);
        self.active = Some(ActiveRender { ticket, cancel });
        Ok(Dispatch::Queued(ticket))
    }

    /// Apply a render completion
    pub fn complete<S: Surface + ?Sized>(
        &mut self,
        ticket: RenderTicket,
        result: Result<Arc<Frame>, EngineError>,
        surface: Option<&mut S>,
    ) -> RenderOutcome {
        let is_active = self
            .active
            .as_ref()
            .is_some_and(|active| active.ticket == ticket);
        if !is_active {
            trace!("Discarding superseded render of page {}", ticket.page);
            return RenderOutcome::Stale;
        }
        self.active = None;

        match result {
            Ok(frame) => {
                self.cache
                    .insert(CacheKey::from_ticket(&ticket), Arc::clone(&frame));
                paint(surface, &frame);
                self.presented = Some(ticket);
                RenderOutcome::Presented(ticket)
            }
            Err(error) => RenderOutcome::Failed { ticket, error },
        }
    }

    /// Cancel the active render, if any
    pub fn cancel(&mut self) {
        if let Some(active) = self.active.take() {
            trace!("Cancelling render of page {}", active.ticket.page);
            active.cancel.cancel();
        }
    }

    /// Forget everything tied to the current document
    pub fn reset(&mut self) {
        self.cancel();
        self.cache.invalidate_all();
        self.presented = None;
    }

    #[must_use]
    pub fn is_rendering(&self) -> bool {
        self.active.is_some()
    }

    /// Ticket of the frame currently on the surface
    #[must_use]
    pub fn presented(&self) -> Option<RenderTicket> {
        self.presented
    }

    #[must_use]
    pub fn cached_frames(&self) -> usize {
        self.cache.len()
    }

    #[must_use]
    pub fn num_workers(&self) -> usize {
        self.num_workers
    }

    /// Shutdown all workers
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.cancel();
        for _ in 0..self.num_workers {
            let _ = self.requests.send(RenderRequest::Shutdown);
        }
        self.shut_down = true;
    }

    fn next_id(&mut self) -> RequestId {
        let id = RequestId::new(self.next_request_id);
        self.next_request_id += 1;
        id
    }
}

impl Drop for RenderPipeline {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn paint<S: Surface + ?Sized>(surface: Option<&mut S>, frame: &Frame) {
    if let Some(surface) = surface {
        surface.resize(frame.width, frame.height);
        surface.paint(frame);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use flume::Receiver;

    use super::*;
    use crate::pdf::surface::PixelSurface;
    use crate::test_utils::ScriptedEngine;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn pipeline(workers: usize) -> (RenderPipeline, Receiver<WorkerEvent>) {
        let (tx, rx) = flume::unbounded();
        (RenderPipeline::new(workers, 4, tx), rx)
    }

    fn next_render(rx: &Receiver<WorkerEvent>) -> (RenderTicket, Result<Arc<Frame>, EngineError>) {
        match rx.recv_timeout(TIMEOUT).expect("render event") {
            WorkerEvent::Rendered { ticket, result } => (ticket, result),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn completed_render_is_painted_and_cached() {
        let engine = ScriptedEngine::new();
        let doc = engine.open_scripted(3);
        let (mut pipeline, rx) = pipeline(1);
        let mut surface = PixelSurface::new();

        let dispatch = pipeline
            .render(&doc, 2, 1.0, Generation(1), 4096, Some(&mut surface))
            .unwrap();
        assert!(matches!(dispatch, Dispatch::Queued(_)));
        assert!(pipeline.is_rendering());

        let (ticket, result) = next_render(&rx);
        let outcome = pipeline.complete(ticket, result, Some(&mut surface));
        assert!(matches!(outcome, RenderOutcome::Presented(t) if t == dispatch.ticket()));
        assert!(!pipeline.is_rendering());
        assert_eq!(surface.paint_count(), 1);
        assert_eq!(surface.pixel(0, 0), Some([2, 2, 2]));
        assert_eq!(pipeline.cached_frames(), 1);
    }

    #[test]
    fn superseded_completion_is_discarded() {
        let engine = ScriptedEngine::new();
        let doc = engine.open_scripted(3);
        let gate = engine.gate_page(1);
        let (mut pipeline, rx) = pipeline(2);
        let mut surface = PixelSurface::new();

        let first = pipeline
            .render(&doc, 1, 1.0, Generation(1), 4096, Some(&mut surface))
            .unwrap()
            .ticket();
        let second = pipeline
            .render(&doc, 2, 1.0, Generation(1), 4096, Some(&mut surface))
            .unwrap()
            .ticket();

        let (ticket, result) = next_render(&rx);
        assert_eq!(ticket, second);
        assert!(matches!(
            pipeline.complete(ticket, result, Some(&mut surface)),
            RenderOutcome::Presented(_)
        ));

        // A late completion for the first ticket must not repaint.
        let late = Arc::new(Frame::filled(1, 1, [1, 1, 1]));
        assert!(matches!(
            pipeline.complete(first, Ok(late), Some(&mut surface)),
            RenderOutcome::Stale
        ));
        gate.open();

        assert_eq!(surface.paint_count(), 1);
        assert_eq!(surface.pixel(0, 0), Some([2, 2, 2]));
        assert_eq!(pipeline.presented(), Some(second));
    }

    #[test]
    fn cache_hit_paints_without_worker() {
        let engine = ScriptedEngine::new();
        let doc = engine.open_scripted(2);
        let (mut pipeline, rx) = pipeline(1);
        let mut surface = PixelSurface::new();

        for page in [1, 2] {
            pipeline
                .render(&doc, page, 1.0, Generation(1), 4096, Some(&mut surface))
                .unwrap();
            let (ticket, result) = next_render(&rx);
            pipeline.complete(ticket, result, Some(&mut surface));
        }
        let renders = engine.render_count();

        let dispatch = pipeline
            .render(&doc, 1, 1.0, Generation(1), 4096, Some(&mut surface))
            .unwrap();
        assert!(matches!(dispatch, Dispatch::Cached(_)));
        assert!(!pipeline.is_rendering());
        assert_eq!(surface.paint_count(), 3);
        assert_eq!(surface.pixel(0, 0), Some([1, 1, 1]));
        assert_eq!(engine.render_count(), renders);
    }

    #[test]
    fn failed_render_keeps_previous_frame() {
        let engine = ScriptedEngine::new();
        let doc = engine.open_failing(3, &[2]);
        let (mut pipeline, rx) = pipeline(1);
        let mut surface = PixelSurface::new();

        pipeline
            .render(&doc, 1, 1.0, Generation(1), 4096, Some(&mut surface))
            .unwrap();
        let (ticket, result) = next_render(&rx);
        pipeline.complete(ticket, result, Some(&mut surface));

        pipeline
            .render(&doc, 2, 1.0, Generation(1), 4096, Some(&mut surface))
            .unwrap();
        let (ticket, result) = next_render(&rx);
        let outcome = pipeline.complete(ticket, result, Some(&mut surface));

        assert!(matches!(outcome, RenderOutcome::Failed { ticket: t, .. } if t.page == 2));
        assert_eq!(surface.paint_count(), 1);
        assert_eq!(surface.pixel(0, 0), Some([1, 1, 1]));
        assert_eq!(pipeline.presented().map(|t| t.page), Some(1));
    }

    #[test]
    fn reset_forgets_cache_and_presentation() {
        let engine = ScriptedEngine::new();
        let doc = engine.open_scripted(1);
        let (mut pipeline, rx) = pipeline(1);

        pipeline
            .render::<PixelSurface>(&doc, 1, 1.0, Generation(1), 4096, None)
            .unwrap();
        let (ticket, result) = next_render(&rx);
        pipeline.complete::<PixelSurface>(ticket, result, None);
        assert_eq!(pipeline.cached_frames(), 1);

        pipeline.reset();
        assert_eq!(pipeline.cached_frames(), 0);
        assert_eq!(pipeline.presented(), None);
    }

    #[test]
    fn render_after_shutdown_fails() {
        let engine = ScriptedEngine::new();
        let doc = engine.open_scripted(1);
        let (mut pipeline, _rx) = pipeline(1);
        pipeline.shutdown();
        pipeline.shutdown();

        let err = pipeline
            .render::<PixelSurface>(&doc, 1, 1.0, Generation(1), 4096, None)
            .unwrap_err();
        assert!(matches!(err, EngineError::Render(_)));
    }
}
