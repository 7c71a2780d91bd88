//! Raster frames and caller-owned render targets

use image::RgbImage;

/// Off-screen RGB raster produced by a page render
///
/// 3 bytes per pixel, rows tightly packed.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl Frame {
    /// Frame of the given size filled with one RGB color
    #[must_use]
    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let count = width as usize * height as usize;
        let mut pixels = Vec::with_capacity(count * 3);
        for _ in 0..count {
            pixels.extend_from_slice(&rgb);
        }
        Self {
            width,
            height,
            pixels,
        }
    }

    /// RGB value at `(x, y)`, if inside the frame
    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * 3;
        self.pixels
            .get(offset..offset + 3)
            .map(|px| [px[0], px[1], px[2]])
    }

    #[must_use]
    pub fn byte_len(&self) -> usize {
        self.pixels.len()
    }

    /// Crop or pad with white to exactly `width` x `height`
    ///
    /// Engines may round a raster edge differently from the viewport.
    #[must_use]
    pub fn fit_to(self, width: u32, height: u32) -> Self {
        if self.width == width && self.height == height {
            return self;
        }

        let mut fitted = Self::filled(width, height, [0xFF; 3]);
        let row_bytes = width.min(self.width) as usize * 3;
        for y in 0..height.min(self.height) as usize {
            let src = y * self.width as usize * 3;
            let dst = y * width as usize * 3;
            let Some(row) = self.pixels.get(src..src + row_bytes) else {
                break;
            };
            fitted.pixels[dst..dst + row_bytes].copy_from_slice(row);
        }
        fitted
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.pixels.len())
            .finish()
    }
}

/// Target the render pipeline paints onto
///
/// Owned by the caller of the session. Only the pipeline's paint step writes
/// to it, always on the control thread.
pub trait Surface {
    /// Resize to the viewport of the frame about to be painted
    fn resize(&mut self, width: u32, height: u32);

    /// Paint a frame whose size matches the last `resize`
    fn paint(&mut self, frame: &Frame);
}

/// In-memory surface holding the last painted frame
#[derive(Debug, Default)]
pub struct PixelSurface {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
    paints: usize,
}

impl PixelSurface {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Number of frames painted so far
    #[must_use]
    pub fn paint_count(&self) -> usize {
        self.paints
    }

    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.paints == 0
    }

    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * 3;
        self.pixels
            .get(offset..offset + 3)
            .map(|px| [px[0], px[1], px[2]])
    }

    /// Copy the surface into an image buffer
    #[must_use]
    pub fn to_image(&self) -> Option<RgbImage> {
        if self.is_blank() {
            return None;
        }
        RgbImage::from_raw(self.width, self.height, self.pixels.clone())
    }
}

impl Surface for PixelSurface {
    fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.pixels.clear();
        self.pixels.resize(width as usize * height as usize * 3, 0xFF);
    }

    fn paint(&mut self, frame: &Frame) {
        if frame.width != self.width || frame.height != self.height {
            self.resize(frame.width, frame.height);
        }
        let len = self.pixels.len().min(frame.pixels.len());
        self.pixels[..len].copy_from_slice(&frame.pixels[..len]);
        self.paints += 1;
    }
}
