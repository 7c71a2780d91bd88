//! MuPDF-backed engine
//!
//! MuPDF documents are not thread-safe. [`MupdfDocument`] only keeps the
//! source bytes and opens a fresh `mupdf::Document` for every page fetch,
//! on whichever worker thread asks for it.

use std::sync::{Arc, RwLock};

use log::trace;
use mupdf::{Colorspace, Document, Matrix, Page, Pixmap};

use super::engine::{EngineConfig, EngineError, PageSize, PdfDocument, PdfEngine, PdfPage, Viewport};
use super::surface::Frame;

const PDF_MAGIC: &str = "application/pdf";

/// Engine parsing PDF bytes with MuPDF
#[derive(Clone, Copy, Debug, Default)]
pub struct MupdfEngine;

impl MupdfEngine {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl PdfEngine for MupdfEngine {
    fn open(
        &self,
        bytes: Vec<u8>,
        _config: &EngineConfig,
    ) -> Result<Arc<dyn PdfDocument>, EngineError> {
        let document = Document::from_bytes(&bytes, PDF_MAGIC)?;
        let page_count = usize::try_from(document.page_count()?).unwrap_or(0);
        trace!("MuPDF opened {} bytes, {page_count} pages", bytes.len());

        Ok(Arc::new(MupdfDocument {
            bytes: RwLock::new(Some(Arc::new(bytes))),
            page_count,
        }))
    }
}

/// Parsed document; releases its bytes on dispose
pub struct MupdfDocument {
    bytes: RwLock<Option<Arc<Vec<u8>>>>,
    page_count: usize,
}

impl PdfDocument for MupdfDocument {
    fn page_count(&self) -> usize {
        self.page_count
    }

    fn page(&self, number: usize) -> Result<Box<dyn PdfPage + '_>, EngineError> {
        let bytes = self
            .bytes
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
            .ok_or(EngineError::Disposed)?;

        if number == 0 || number > self.page_count {
            return Err(EngineError::PageOutOfRange {
                page: number,
                page_count: self.page_count,
            });
        }

        let document = Document::from_bytes(&bytes, PDF_MAGIC)?;
        let index = i32::try_from(number - 1).map_err(|_| EngineError::PageOutOfRange {
            page: number,
            page_count: self.page_count,
        })?;
        let page = document.load_page(index)?;
        let bounds = page.bounds()?;
        let size = PageSize::new(bounds.x1 - bounds.x0, bounds.y1 - bounds.y0);

        Ok(Box::new(MupdfPage {
            page,
            size,
            _document: document,
        }))
    }

    fn dispose(&self) {
        self.bytes
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
    }
}

/// One loaded page; keeps its document open until dropped
struct MupdfPage {
    page: Page,
    size: PageSize,
    _document: Document,
}

impl PdfPage for MupdfPage {
    fn size(&self) -> PageSize {
        self.size
    }

    fn render(&self, viewport: &Viewport) -> Result<Frame, EngineError> {
        let matrix = Matrix::new_scale(viewport.scale, viewport.scale);
        let pixmap = self
            .page
            .to_pixmap(&matrix, &Colorspace::device_rgb(), false, false)?;
        pixmap_to_frame(&pixmap)
    }
}

/// Copy pixmap samples into a tightly packed RGB frame
fn pixmap_to_frame(pixmap: &Pixmap) -> Result<Frame, EngineError> {
    let n = pixmap.n() as usize;
    if n < 3 {
        return Err(EngineError::Render(format!(
            "Unsupported pixmap format: {n} channels"
        )));
    }

    let width = pixmap.width() as usize;
    let height = pixmap.height() as usize;
    let stride = pixmap.stride() as usize;
    let samples = pixmap.samples();
    let row_bytes = width * n;
    if samples.len() < stride.saturating_mul(height) || row_bytes > stride {
        return Err(EngineError::Render("Pixmap buffer size mismatch".to_string()));
    }

    let mut pixels = Vec::with_capacity(width * height * 3);
    for row in samples.chunks(stride).take(height) {
        let row = &row[..row_bytes];
        if n == 3 {
            pixels.extend_from_slice(row);
        } else {
            for px in row.chunks_exact(n) {
                pixels.extend_from_slice(&px[..3]);
            }
        }
    }

    Ok(Frame {
        width: pixmap.width(),
        height: pixmap.height(),
        pixels,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn garbage_bytes_are_malformed() {
        let result = MupdfEngine::new().open(b"definitely not a pdf".to_vec(), &EngineConfig::default());
        assert!(result.is_err());
    }
}
