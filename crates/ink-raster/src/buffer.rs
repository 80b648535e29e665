//! Pixel Buffer
//!
//! Owned 2-D array of premultiplied pixels positioned on the logical plane.
//! Storage is a tiny-skia `Pixmap`: 4 bytes per pixel, row-major, no padding.

use ink_render::{Point, Rect};
use tiny_skia::{IntSize, Pixmap, PremultipliedColorU8};

use crate::RasterError;

/// Bytes per pixel
pub const BYTES_PER_PIXEL: usize = 4;

/// Pixel buffer with a logical origin
#[derive(Debug, Clone)]
pub struct PixelBuffer {
    pixmap: Pixmap,
    origin: Point,
}

impl PixelBuffer {
    /// Allocate a transparent buffer covering `rect`
    ///
    /// Out-of-memory is reported as `AllocationFailed` instead of aborting.
    pub fn allocate(rect: Rect) -> Result<Self, RasterError> {
        let failed = RasterError::AllocationFailed {
            width: rect.width,
            height: rect.height,
        };
        if rect.is_empty() {
            return Err(failed);
        }
        let size = IntSize::from_wh(rect.width as u32, rect.height as u32).ok_or(failed.clone())?;
        let len = (rect.width as usize)
            .checked_mul(rect.height as usize)
            .and_then(|n| n.checked_mul(BYTES_PER_PIXEL))
            .ok_or(failed.clone())?;

        let mut data = Vec::new();
        data.try_reserve_exact(len).map_err(|_| failed.clone())?;
        data.resize(len, 0);

        let pixmap = Pixmap::from_vec(data, size).ok_or(failed)?;
        Ok(Self {
            pixmap,
            origin: rect.origin(),
        })
    }

    /// Wrap an existing pixmap placed at `origin`
    pub fn from_pixmap(pixmap: Pixmap, origin: Point) -> Self {
        Self { pixmap, origin }
    }

    pub fn origin(&self) -> Point {
        self.origin
    }

    pub(crate) fn set_origin(&mut self, origin: Point) {
        self.origin = origin;
    }

    pub fn width(&self) -> u32 {
        self.pixmap.width()
    }

    pub fn height(&self) -> u32 {
        self.pixmap.height()
    }

    /// Bytes per row
    pub fn stride(&self) -> usize {
        self.pixmap.width() as usize * BYTES_PER_PIXEL
    }

    /// Logical rectangle covered by the buffer
    pub fn rect(&self) -> Rect {
        Rect::from_origin_size(self.origin, self.width() as i32, self.height() as i32)
    }

    pub fn pixmap(&self) -> &Pixmap {
        &self.pixmap
    }

    pub fn pixmap_mut(&mut self) -> &mut Pixmap {
        &mut self.pixmap
    }

    pub fn memory_size(&self) -> usize {
        self.pixmap.data().len()
    }

    /// Reset every pixel to transparent
    pub fn clear(&mut self) {
        self.pixmap.data_mut().fill(0);
    }

    fn index(&self, x: i32, y: i32) -> Option<usize> {
        if !self.rect().contains_point(x, y) {
            return None;
        }
        let lx = (x - self.origin.x) as usize;
        let ly = (y - self.origin.y) as usize;
        Some(ly * self.width() as usize + lx)
    }

    /// Pixel at a logical position
    pub fn pixel(&self, x: i32, y: i32) -> Option<PremultipliedColorU8> {
        let index = self.index(x, y)?;
        self.pixmap.pixels().get(index).copied()
    }

    /// Set the pixel at a logical position
    pub fn set_pixel(&mut self, x: i32, y: i32, color: PremultipliedColorU8) -> bool {
        match self.index(x, y) {
            Some(index) => {
                self.pixmap.pixels_mut()[index] = color;
                true
            }
            None => false,
        }
    }

    fn row_range(&self, span: Rect, y: i32) -> std::ops::Range<usize> {
        debug_assert!(self.rect().contains(&span));
        let lx = (span.x - self.origin.x) as usize;
        let ly = (y - self.origin.y) as usize;
        let start = ly * self.stride() + lx * BYTES_PER_PIXEL;
        start..start + span.width as usize * BYTES_PER_PIXEL
    }

    /// Raw bytes of row `y` restricted to the columns of `span` (logical coordinates)
    pub fn row_bytes(&self, span: Rect, y: i32) -> &[u8] {
        let range = self.row_range(span, y);
        &self.pixmap.data()[range]
    }

    /// Mutable raw bytes of row `y` restricted to the columns of `span`
    pub fn row_bytes_mut(&mut self, span: Rect, y: i32) -> &mut [u8] {
        let range = self.row_range(span, y);
        &mut self.pixmap.data_mut()[range]
    }

    /// Mutable pixels of row `y` restricted to the columns of `span`
    pub fn row_pixels_mut(&mut self, span: Rect, y: i32) -> &mut [PremultipliedColorU8] {
        let range = self.row_range(span, y);
        let (start, end) = (range.start / BYTES_PER_PIXEL, range.end / BYTES_PER_PIXEL);
        &mut self.pixmap.pixels_mut()[start..end]
    }

    /// Copy the overlapping part of `other` at matching logical coordinates
    pub fn copy_from(&mut self, other: &PixelBuffer) {
        let overlap = self.rect().intersection(&other.rect());
        if overlap.is_empty() {
            return;
        }
        for y in overlap.top()..overlap.bottom() {
            let src = other.row_bytes(overlap, y);
            self.row_bytes_mut(overlap, y).copy_from_slice(src);
        }
    }

    /// Copy the pixels inside `rect` into a new pixmap
    pub fn copy_rect(&self, rect: Rect) -> Option<Pixmap> {
        let local = rect
            .intersection(&self.rect())
            .translated(-self.origin.x, -self.origin.y);
        self.pixmap.clone_rect(local.to_int_rect()?)
    }
}
