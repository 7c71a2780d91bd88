//! Viewing session - orchestrates loader, navigation and render pipeline
//!
//! All state lives on the thread that owns the [`Session`]. Loads and
//! renders run on worker threads and report back through one event
//! channel; nothing changes until the owner pumps it.

use std::sync::Arc;
use std::time::{Duration, Instant};

use flume::{Receiver, RecvTimeoutError, Sender};
use log::{debug, error, info, warn};

use super::engine::{EngineConfig, EngineError, PdfEngine};
use super::loader::{ContentLoader, LoadOutcome, OwnedDocument};
use super::navigation::{Command, Effect, InvalidZoomRange, Navigation, ZoomRange};
use super::pipeline::{Dispatch, RenderOutcome, RenderPipeline};
use super::request::{Generation, RenderTicket, WorkerEvent};
use super::source::ByteSource;
use super::state::{Phase, SessionState};
use super::surface::{Frame, Surface};
use crate::error::{ErrorKind, InvalidPageInput, LoadFailure, SessionError};

pub const DEFAULT_RENDER_WORKERS: usize = 2;
pub const DEFAULT_CACHE_SIZE: usize = 8;

/// Explicit session configuration
#[derive(Clone, Debug, PartialEq)]
pub struct SessionConfig {
    pub zoom: ZoomRange,
    /// Render worker threads; 0 is treated as 1
    pub render_workers: usize,
    /// Frames kept in the LRU cache; 0 is treated as 1
    pub cache_size: usize,
    pub engine: EngineConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            zoom: ZoomRange::default(),
            render_workers: DEFAULT_RENDER_WORKERS,
            cache_size: DEFAULT_CACHE_SIZE,
            engine: EngineConfig::default(),
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<(), InvalidZoomRange> {
        self.zoom.validate()
    }
}

/// A PDF viewing session painting onto a caller-owned surface
pub struct Session<S: Surface> {
    config: SessionConfig,
    generation: Generation,
    phase: Phase,
    error: Option<SessionError>,
    locator: Option<String>,
    navigation: Navigation,
    loader: ContentLoader,
    pipeline: RenderPipeline,
    surface: Option<S>,
    events: Receiver<WorkerEvent>,
    subscribers: Vec<Sender<SessionState>>,
    closed: bool,
}

impl<S: Surface> Session<S> {
    /// Create an idle session
    pub fn new(
        config: SessionConfig,
        source: Arc<dyn ByteSource>,
        engine: Arc<dyn PdfEngine>,
        surface: S,
    ) -> Result<Self, InvalidZoomRange> {
        config.validate()?;

        let (event_tx, event_rx) = flume::unbounded();
        let loader = ContentLoader::new(source, engine, config.engine.clone(), event_tx.clone());
        let pipeline = RenderPipeline::new(config.render_workers, config.cache_size, event_tx);
        let navigation = Navigation::new(config.zoom);

        Ok(Self {
            config,
            generation: Generation::default(),
            phase: Phase::Idle,
            error: None,
            locator: None,
            navigation,
            loader,
            pipeline,
            surface: Some(surface),
            events: event_rx,
            subscribers: Vec::new(),
            closed: false,
        })
    }

    /// Create a session and start loading `locator` right away
    pub fn with_locator(
        config: SessionConfig,
        source: Arc<dyn ByteSource>,
        engine: Arc<dyn PdfEngine>,
        surface: S,
        locator: &str,
    ) -> Result<Self, InvalidZoomRange> {
        let mut session = Self::new(config, source, engine, surface)?;
        session.open(locator);
        Ok(session)
    }

    /// Switch to `locator`, starting a fresh generation
    ///
    /// The live document is disposed and every in-flight load or render of
    /// the previous generation becomes void.
    pub fn open(&mut self, locator: &str) {
        if self.closed {
            debug!("Ignoring open of {locator} on a closed session");
            return;
        }

        self.generation = self.generation.next();
        self.pipeline.reset();
        self.navigation.reset(0);
        self.error = None;
        self.locator = (!locator.trim().is_empty()).then(|| locator.to_string());

        info!("Opening {locator:?} ({})", self.generation);
        match self.loader.load(locator, self.generation) {
            Ok(()) => self.phase = Phase::Loading,
            Err(failure) => self.fail_load(&failure),
        }
        self.publish();
    }

    /// Resubmit the current locator as a new generation
    pub fn retry(&mut self) {
        let locator = self.locator.clone().unwrap_or_default();
        self.open(&locator);
    }

    pub fn next_page(&mut self) -> usize {
        self.apply_command(Command::NextPage);
        self.navigation.current_page()
    }

    pub fn previous_page(&mut self) -> usize {
        self.apply_command(Command::PreviousPage);
        self.navigation.current_page()
    }

    /// Jump to a 1-based page, clamped to the document
    pub fn go_to_page(&mut self, page: i64) -> usize {
        self.apply_command(Command::GoToPage(page));
        self.navigation.current_page()
    }

    pub fn zoom_in(&mut self) -> f32 {
        self.apply_command(Command::ZoomIn);
        self.navigation.zoom()
    }

    pub fn zoom_out(&mut self) -> f32 {
        self.apply_command(Command::ZoomOut);
        self.navigation.zoom()
    }

    pub fn set_zoom(&mut self, zoom: f32) -> f32 {
        self.apply_command(Command::SetZoom(zoom));
        self.navigation.zoom()
    }

    /// Commit text typed into a page field
    ///
    /// On rejection nothing changes and the caller should redisplay
    /// the current page.
    pub fn submit_page_input(&mut self, text: &str) -> Result<usize, InvalidPageInput> {
        let page = self.navigation.parse_page_input(text)?;
        Ok(self.go_to_page(i64::try_from(page).unwrap_or(i64::MAX)))
    }

    /// Apply a navigation command to the session
    pub fn apply_command(&mut self, cmd: Command) {
        let effects = self.navigation.apply(cmd);
        if effects.is_empty() {
            return;
        }
        self.execute_effects(effects);
        self.publish();
    }

    fn execute_effects(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::RenderCurrentPage => self.render_current_page(),
            }
        }
    }

    fn render_current_page(&mut self) {
        if self.phase != Phase::Ready {
            return;
        }
        let Some(document) = self.loader.document().cloned() else {
            return;
        };

        let page = self.navigation.current_page();
        let dispatch = self.pipeline.render(
            &document,
            page,
            self.navigation.zoom(),
            self.generation,
            self.config.engine.max_render_dimension,
            self.surface.as_mut(),
        );

        match dispatch {
            Ok(Dispatch::Cached(_)) => self.clear_render_error(),
            Ok(Dispatch::Queued(_)) => {}
            Err(e) => self.fail_render(page, &e),
        }
    }

    /// Snapshot of the externally visible state
    #[must_use]
    pub fn state(&self) -> SessionState {
        let ready = self.phase == Phase::Ready;
        SessionState {
            phase: self.phase,
            error: self.error.clone(),
            locator: self.locator.clone(),
            generation: self.generation,
            page_count: self.navigation.page_count(),
            current_page: self.navigation.current_page(),
            zoom: self.navigation.zoom(),
            is_rendering: self.pipeline.is_rendering(),
            can_go_previous: ready && self.navigation.can_go_previous(),
            can_go_next: ready && self.navigation.can_go_next(),
            can_zoom_in: ready && self.navigation.can_zoom_in(),
            can_zoom_out: ready && self.navigation.can_zoom_out(),
        }
    }

    /// Receive a snapshot after every transition, starting with the current one
    pub fn subscribe(&mut self) -> Receiver<SessionState> {
        let (tx, rx) = flume::unbounded();
        let _ = tx.send(self.state());
        if !self.closed {
            self.subscribers.push(tx);
        }
        rx
    }

    /// Apply every completion already reported, without blocking
    ///
    /// Returns the number of events handled.
    pub fn pump(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.events.try_recv() {
            self.handle_event(event);
            handled += 1;
        }
        handled
    }

    /// Wait up to `timeout` for one completion, then drain the rest
    pub fn pump_blocking(&mut self, timeout: Duration) -> usize {
        match self.events.recv_timeout(timeout) {
            Ok(event) => {
                self.handle_event(event);
                1 + self.pump()
            }
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => 0,
        }
    }

    /// Pump until no load or render is in flight
    ///
    /// Returns `false` if `timeout` elapsed first.
    pub fn wait_idle(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        self.pump();
        while self.is_busy() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            self.pump_blocking(remaining);
        }
        true
    }

    /// Whether a load or render is in flight
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.phase == Phase::Loading || self.pipeline.is_rendering()
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    #[must_use]
    pub fn generation(&self) -> Generation {
        self.generation
    }

    #[must_use]
    pub fn locator(&self) -> Option<&str> {
        self.locator.as_deref()
    }

    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Ticket of the frame currently on the surface
    #[must_use]
    pub fn presented(&self) -> Option<RenderTicket> {
        self.pipeline.presented()
    }

    #[must_use]
    pub fn surface(&self) -> Option<&S> {
        self.surface.as_ref()
    }

    /// Take the surface back; later renders are not painted anywhere
    pub fn detach_surface(&mut self) -> Option<S> {
        self.surface.take()
    }

    /// Close the session and hand back the surface
    pub fn into_surface(mut self) -> Option<S> {
        self.close();
        self.surface.take()
    }

    /// Tear down: cancel all work and dispose the live document
    ///
    /// Safe to call in any phase, any number of times.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        debug!("Closing session at {}", self.generation);

        self.generation = self.generation.next();
        self.pipeline.shutdown();
        self.pipeline.reset();
        self.loader.abandon();

        // Swap in a receiver with no sender so reports still in flight fail
        // to send. Documents in unsent or drained load results are disposed
        // on drop.
        let (_, closed) = flume::unbounded();
        let reported = std::mem::replace(&mut self.events, closed);
        for event in reported.drain() {
            drop(event);
        }
        drop(reported);

        self.phase = Phase::Idle;
        self.error = None;
        self.navigation.reset(0);
        self.publish();
        self.subscribers.clear();
    }

    fn handle_event(&mut self, event: WorkerEvent) {
        let changed = match event {
            WorkerEvent::Loaded { generation, result } => self.on_loaded(generation, result),
            WorkerEvent::Rendered { ticket, result } => self.on_rendered(ticket, result),
        };
        if changed {
            self.publish();
        }
    }

    fn on_loaded(
        &mut self,
        generation: Generation,
        result: Result<OwnedDocument, LoadFailure>,
    ) -> bool {
        if generation != self.generation {
            debug!("Discarding load result for {generation} (current {})", self.generation);
            return false;
        }

        match self.loader.accept(generation, result) {
            LoadOutcome::Stale => false,
            LoadOutcome::Ready { page_count } => {
                self.navigation.reset(page_count);
                self.phase = Phase::Ready;
                self.error = None;
                self.render_current_page();
                true
            }
            LoadOutcome::Failed(failure) => {
                self.fail_load(&failure);
                true
            }
        }
    }

    fn on_rendered(&mut self, ticket: RenderTicket, result: Result<Arc<Frame>, EngineError>) -> bool {
        if ticket.generation != self.generation {
            debug!(
                "Discarding render of page {} for {} (current {})",
                ticket.page, ticket.generation, self.generation
            );
            return false;
        }

        match self.pipeline.complete(ticket, result, self.surface.as_mut()) {
            RenderOutcome::Presented(_) => {
                self.clear_render_error();
                true
            }
            RenderOutcome::Failed { ticket, error } => {
                self.fail_render(ticket.page, &error);
                true
            }
            RenderOutcome::Stale => false,
        }
    }

    fn fail_load(&mut self, failure: &LoadFailure) {
        error!("{failure}");
        self.phase = Phase::Error;
        self.error = Some(failure.to_session_error());
    }

    fn fail_render(&mut self, page: usize, e: &EngineError) {
        warn!("Failed to render page {page}: {e}");
        self.error = Some(SessionError::render_failed(
            page,
            e,
            self.locator.as_deref(),
        ));
    }

    fn clear_render_error(&mut self) {
        if self
            .error
            .as_ref()
            .is_some_and(|e| e.kind == ErrorKind::RenderFailed)
        {
            self.error = None;
        }
    }

    fn publish(&mut self) {
        if self.subscribers.is_empty() {
            return;
        }
        let state = self.state();
        self.subscribers.retain(|tx| tx.send(state.clone()).is_ok());
    }
}

impl<S: Surface> Drop for Session<S> {
    fn drop(&mut self) {
        self.close();
    }
}
