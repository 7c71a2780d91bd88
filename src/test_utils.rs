//! Scripted collaborators for driving sessions in tests
//!
//! [`ScriptedEngine`] understands byte strings made by [`scripted_pdf`] and
//! counts every open, dispose and render. [`Gate`]s hold a fetch or a page
//! render until the test opens them, which forces out-of-order completion.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::pdf::{
    ByteSource, CancelFlag, DEFAULT_MAX_RENDER_DIMENSION, EngineConfig, EngineError, Frame,
    MemorySource, PageSize, PdfDocument, PdfEngine, PdfPage, SourceError, Viewport,
};

/// How long a gate waits before giving up, so a broken test cannot hang
pub const GATE_TIMEOUT: Duration = Duration::from_secs(5);

/// Intrinsic size of every scripted page, in points
pub const SCRIPTED_PAGE_SIZE: PageSize = PageSize::new(60.0, 80.0);

const SCRIPTED_HEADER: &str = "%PDF-scripted pages=";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// Bytes the scripted engine parses as a document with `pages` pages
#[must_use]
pub fn scripted_pdf(pages: usize) -> Vec<u8> {
    format!("{SCRIPTED_HEADER}{pages}").into_bytes()
}

/// Poll `condition` until it holds or `timeout` elapses
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
}

/// One-shot latch shared between a test and a worker
#[derive(Clone, Debug, Default)]
pub struct Gate {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl Gate {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&self) {
        let (open, cvar) = &*self.inner;
        *lock(open) = true;
        cvar.notify_all();
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        *lock(&self.inner.0)
    }

    /// Block until opened; returns `false` on timeout
    pub fn wait(&self) -> bool {
        let (open, cvar) = &*self.inner;
        let guard = lock(open);
        let (guard, _) = cvar
            .wait_timeout_while(guard, GATE_TIMEOUT, |open| !*open)
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *guard
    }
}

/// In-memory byte source with per-locator gates and failures
#[derive(Default)]
pub struct ScriptedSource {
    bytes: MemorySource,
    failures: Mutex<HashMap<String, String>>,
    gates: Mutex<HashMap<String, Gate>>,
    fetches: AtomicUsize,
}

impl ScriptedSource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, locator: &str, bytes: Vec<u8>) {
        self.bytes.insert(locator, bytes);
    }

    /// Make fetches of `locator` fail with `reason`
    pub fn fail(&self, locator: &str, reason: &str) {
        lock(&self.failures).insert(locator.to_string(), reason.to_string());
    }

    /// Hold fetches of `locator` until the returned gate opens
    pub fn gate(&self, locator: &str) -> Gate {
        lock(&self.gates)
            .entry(locator.to_string())
            .or_default()
            .clone()
    }

    /// Number of fetches that have finished waiting on their gate
    #[must_use]
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl ByteSource for ScriptedSource {
    fn fetch(&self, locator: &str) -> Result<Vec<u8>, SourceError> {
        let gate = lock(&self.gates).get(locator).cloned();
        if let Some(gate) = gate {
            gate.wait();
        }
        self.fetches.fetch_add(1, Ordering::SeqCst);

        if let Some(reason) = lock(&self.failures).get(locator).cloned() {
            return Err(SourceError::Invalid {
                locator: locator.to_string(),
                reason,
            });
        }
        self.bytes.fetch(locator)
    }
}

#[derive(Default)]
struct EngineShared {
    opened: AtomicUsize,
    disposed: AtomicUsize,
    renders: AtomicUsize,
    failing_pages: Mutex<HashSet<usize>>,
    panicking_pages: Mutex<HashSet<usize>>,
    frame_overshoot: AtomicU32,
    page_gates: Mutex<HashMap<usize, Gate>>,
    open_gate: Mutex<Option<Gate>>,
    cancel_on_open: Mutex<Option<CancelFlag>>,
}

/// Engine for [`scripted_pdf`] bytes
///
/// Page `n` renders as a frame filled with RGB `[n, n, n]`.
#[derive(Default)]
pub struct ScriptedEngine {
    shared: Arc<EngineShared>,
}

impl ScriptedEngine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A document created directly, bypassing byte parsing
    #[must_use]
    pub fn open_scripted(&self, pages: usize) -> Arc<dyn PdfDocument> {
        self.shared.opened.fetch_add(1, Ordering::SeqCst);
        Arc::new(ScriptedDocument {
            pages,
            disposed: AtomicBool::new(false),
            shared: Arc::clone(&self.shared),
        })
    }

    /// A document whose listed pages fail to render
    #[must_use]
    pub fn open_failing(&self, pages: usize, failing: &[usize]) -> Arc<dyn PdfDocument> {
        self.fail_pages(failing);
        self.open_scripted(pages)
    }

    /// Make renders of these pages fail, for every document
    pub fn fail_pages(&self, pages: &[usize]) {
        lock(&self.shared.failing_pages).extend(pages.iter().copied());
    }

    /// Make renders of these pages panic inside the engine
    pub fn panic_pages(&self, pages: &[usize]) {
        lock(&self.shared.panicking_pages).extend(pages.iter().copied());
    }

    /// Render frames `extra` pixels wider and taller than the viewport
    pub fn overshoot_frames(&self, extra: u32) {
        self.shared.frame_overshoot.store(extra, Ordering::SeqCst);
    }

    /// Hold renders of `page` until the returned gate opens
    pub fn gate_page(&self, page: usize) -> Gate {
        lock(&self.shared.page_gates)
            .entry(page)
            .or_default()
            .clone()
    }

    /// Hold every parse until the returned gate opens
    pub fn gate_open(&self) -> Gate {
        lock(&self.shared.open_gate).get_or_insert_with(Gate::new).clone()
    }

    /// Set `flag` during the next open, as if the load were abandoned mid-parse
    pub fn cancel_on_open(&self, flag: CancelFlag) {
        *lock(&self.shared.cancel_on_open) = Some(flag);
    }

    /// Frame size of a scripted page at `zoom`
    #[must_use]
    pub fn frame_size(&self, zoom: f32) -> (u32, u32) {
        let viewport = Viewport::for_page(SCRIPTED_PAGE_SIZE, zoom, DEFAULT_MAX_RENDER_DIMENSION);
        (viewport.width, viewport.height)
    }

    #[must_use]
    pub fn opened_count(&self) -> usize {
        self.shared.opened.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn disposed_count(&self) -> usize {
        self.shared.disposed.load(Ordering::SeqCst)
    }

    /// Documents opened and not yet disposed
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.opened_count().saturating_sub(self.disposed_count())
    }

    #[must_use]
    pub fn render_count(&self) -> usize {
        self.shared.renders.load(Ordering::SeqCst)
    }
}

impl PdfEngine for ScriptedEngine {
    fn open(
        &self,
        bytes: Vec<u8>,
        _config: &EngineConfig,
    ) -> Result<Arc<dyn PdfDocument>, EngineError> {
        let gate = lock(&self.shared.open_gate).clone();
        if let Some(gate) = gate {
            gate.wait();
        }

        let text = String::from_utf8_lossy(&bytes);
        let pages = text
            .strip_prefix(SCRIPTED_HEADER)
            .and_then(|count| count.trim().parse::<usize>().ok())
            .ok_or_else(|| EngineError::Malformed("Invalid PDF structure".to_string()))?;

        let document = self.open_scripted(pages);
        if let Some(flag) = lock(&self.shared.cancel_on_open).take() {
            flag.cancel();
        }
        Ok(document)
    }
}

struct ScriptedDocument {
    pages: usize,
    disposed: AtomicBool,
    shared: Arc<EngineShared>,
}

impl PdfDocument for ScriptedDocument {
    fn page_count(&self) -> usize {
        self.pages
    }

    fn page(&self, number: usize) -> Result<Box<dyn PdfPage + '_>, EngineError> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(EngineError::Disposed);
        }
        if number == 0 || number > self.pages {
            return Err(EngineError::PageOutOfRange {
                page: number,
                page_count: self.pages,
            });
        }
        Ok(Box::new(ScriptedPage {
            number,
            shared: &self.shared,
        }))
    }

    fn dispose(&self) {
        if !self.disposed.swap(true, Ordering::SeqCst) {
            self.shared.disposed.fetch_add(1, Ordering::SeqCst);
        }
    }
}

struct ScriptedPage<'a> {
    number: usize,
    shared: &'a EngineShared,
}

impl PdfPage for ScriptedPage<'_> {
    fn size(&self) -> PageSize {
        SCRIPTED_PAGE_SIZE
    }

    fn render(&self, viewport: &Viewport) -> Result<Frame, EngineError> {
        let gate = lock(&self.shared.page_gates).get(&self.number).cloned();
        if let Some(gate) = gate {
            gate.wait();
        }
        self.shared.renders.fetch_add(1, Ordering::SeqCst);

        let panics = lock(&self.shared.panicking_pages).contains(&self.number);
        if panics {
            panic!("scripted panic on page {}", self.number);
        }

        if lock(&self.shared.failing_pages).contains(&self.number) {
            return Err(EngineError::Render(format!(
                "scripted failure on page {}",
                self.number
            )));
        }

        let shade = u8::try_from(self.number).unwrap_or(u8::MAX);
        let extra = self.shared.frame_overshoot.load(Ordering::SeqCst);
        Ok(Frame::filled(
            viewport.width + extra,
            viewport.height + extra,
            [shade; 3],
        ))
    }
}
