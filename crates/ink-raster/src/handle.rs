//! Access Handles
//!
//! Scoped access to a surface's pixels. Each handle holds the surface lock
//! for its whole lifetime: `PaintHandle` and `BitWriter` exclusively,
//! `BitReader` shared. Releasing a writing handle emits `changed(area)`.

use std::sync::{RwLockReadGuard, RwLockWriteGuard};

use ink_render::{CompositionMode, Point, Rect, RenderContext};
use tiny_skia::{Color, Paint, Path, PixmapRef, PremultipliedColorU8};

use crate::buffer::{BYTES_PER_PIXEL, PixelBuffer};
use crate::surface::{RasterSurface, SurfaceState};

/// Drawing access to a region of a surface
///
/// Drawing calls take logical coordinates and are clipped to `area()`.
/// Pixel accessors take coordinates local to the area's top-left.
pub struct PaintHandle<'a> {
    surface: &'a RasterSurface,
    guard: Option<RwLockWriteGuard<'a, SurfaceState>>,
    area: Rect,
}

impl<'a> PaintHandle<'a> {
    pub(crate) fn new(
        surface: &'a RasterSurface,
        guard: RwLockWriteGuard<'a, SurfaceState>,
        area: Rect,
    ) -> Self {
        Self {
            surface,
            guard: Some(guard),
            area,
        }
    }

    /// Locked region (logical coordinates)
    pub fn area(&self) -> Rect {
        self.area
    }

    /// Logical position of local pixel (0, 0)
    pub fn offset(&self) -> Point {
        self.area.origin()
    }

    fn buffer(&self) -> Option<&PixelBuffer> {
        self.guard.as_ref()?.buffer.as_ref()
    }

    fn buffer_mut(&mut self) -> Option<&mut PixelBuffer> {
        self.guard.as_mut()?.buffer.as_mut()
    }

    fn local_bounds(&self) -> Rect {
        Rect::new(0, 0, self.area.width, self.area.height)
    }

    pub fn pixel(&self, x: i32, y: i32) -> Option<PremultipliedColorU8> {
        if !self.local_bounds().contains_point(x, y) {
            return None;
        }
        self.buffer()?.pixel(x + self.area.x, y + self.area.y)
    }

    pub fn set_pixel(&mut self, x: i32, y: i32, color: PremultipliedColorU8) -> bool {
        if !self.local_bounds().contains_point(x, y) {
            return false;
        }
        let (ax, ay) = (self.area.x, self.area.y);
        self.buffer_mut()
            .is_some_and(|buffer| buffer.set_pixel(x + ax, y + ay, color))
    }

    /// Pixels of local row `y`
    pub fn row_mut(&mut self, y: i32) -> Option<&mut [PremultipliedColorU8]> {
        if y < 0 || y >= self.area.height {
            return None;
        }
        let area = self.area;
        Some(self.buffer_mut()?.row_pixels_mut(area, area.y + y))
    }

    /// Overwrite the whole area with `color`
    pub fn fill(&mut self, color: Color) {
        let area = self.area;
        self.fill_rect(area, color, CompositionMode::Source);
    }

    pub fn fill_rect(&mut self, rect: Rect, color: Color, mode: CompositionMode) {
        self.with_context(|ctx| ctx.fill_rect(rect, color, mode));
    }

    pub fn fill_path(&mut self, path: &Path, paint: &Paint) {
        self.with_context(|ctx| ctx.fill_path(path, paint));
    }

    pub fn draw_pixmap(&mut self, at: Point, src: PixmapRef<'_>, mode: CompositionMode, alpha: u8) {
        self.with_context(|ctx| ctx.draw_pixmap(at, src, mode, alpha));
    }

    fn with_context(&mut self, draw: impl FnOnce(&mut RenderContext<'_>)) {
        let area = self.area;
        if area.is_empty() {
            return;
        }
        let Some(buffer) = self.buffer_mut() else {
            return;
        };
        let whole = buffer.rect() == area;
        let origin = buffer.origin();
        let mut ctx = RenderContext::new(buffer.pixmap_mut(), origin);
        if !whole {
            ctx.push_clip_rect(area);
        }
        draw(&mut ctx);
    }
}

impl Drop for PaintHandle<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.surface.notify_changed(self.area);
    }
}

/// Read-only raw row access
pub struct BitReader<'a> {
    guard: RwLockReadGuard<'a, SurfaceState>,
    area: Rect,
}

impl<'a> BitReader<'a> {
    pub(crate) fn new(guard: RwLockReadGuard<'a, SurfaceState>, area: Rect) -> Self {
        Self { guard, area }
    }

    /// Readable region, clipped to the allocated buffer
    pub fn area(&self) -> Rect {
        self.area
    }

    pub fn is_empty(&self) -> bool {
        self.area.is_empty()
    }

    pub fn bytes_per_row(&self) -> usize {
        self.area.width.max(0) as usize * BYTES_PER_PIXEL
    }

    pub fn row_count(&self) -> usize {
        self.area.height.max(0) as usize
    }

    /// Bytes of the `index`-th row of the area
    pub fn row(&self, index: usize) -> Option<&[u8]> {
        if index >= self.row_count() {
            return None;
        }
        let buffer = self.guard.buffer.as_ref()?;
        Some(buffer.row_bytes(self.area, self.area.y + index as i32))
    }

    pub fn rows(&self) -> impl Iterator<Item = &[u8]> + '_ {
        (0..self.row_count()).filter_map(move |index| self.row(index))
    }
}

/// Exclusive raw row access
pub struct BitWriter<'a> {
    surface: &'a RasterSurface,
    guard: Option<RwLockWriteGuard<'a, SurfaceState>>,
    area: Rect,
}

impl<'a> BitWriter<'a> {
    pub(crate) fn new(
        surface: &'a RasterSurface,
        guard: RwLockWriteGuard<'a, SurfaceState>,
        area: Rect,
    ) -> Self {
        Self {
            surface,
            guard: Some(guard),
            area,
        }
    }

    pub fn area(&self) -> Rect {
        self.area
    }

    pub fn bytes_per_row(&self) -> usize {
        self.area.width.max(0) as usize * BYTES_PER_PIXEL
    }

    pub fn row_count(&self) -> usize {
        self.area.height.max(0) as usize
    }

    pub fn row(&self, index: usize) -> Option<&[u8]> {
        if index >= self.row_count() {
            return None;
        }
        let buffer = self.guard.as_ref()?.buffer.as_ref()?;
        Some(buffer.row_bytes(self.area, self.area.y + index as i32))
    }

    /// Mutable bytes of the `index`-th row of the area
    pub fn row_mut(&mut self, index: usize) -> Option<&mut [u8]> {
        if index >= self.row_count() {
            return None;
        }
        let area = self.area;
        let buffer = self.guard.as_mut()?.buffer.as_mut()?;
        Some(buffer.row_bytes_mut(area, area.y + index as i32))
    }
}

impl Drop for BitWriter<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.surface.notify_changed(self.area);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::SurfaceFlags;

    fn surface() -> Arc<RasterSurface> {
        let surface = RasterSurface::new();
        surface
            .initialize(None, CompositionMode::SourceOver, SurfaceFlags::NONE)
            .unwrap();
        surface
    }

    #[test]
    fn test_paint_local_coordinates() {
        let surface = surface();
        let mut handle = surface.paint_handle(Rect::new(10, 20, 4, 4)).unwrap();
        assert_eq!(handle.offset(), Point::new(10, 20));
        let green = PremultipliedColorU8::from_rgba(0, 255, 0, 255).unwrap();
        assert!(handle.set_pixel(0, 0, green));
        assert!(!handle.set_pixel(4, 0, green));
        drop(handle);
        assert_eq!(surface.pixel(10, 20), Some(green));
    }

    #[test]
    fn test_drawing_is_clipped_to_area() {
        let surface = surface();
        drop(surface.paint_handle(Rect::new(0, 0, 10, 10)).unwrap());
        let mut handle = surface.paint_handle(Rect::new(0, 0, 5, 5)).unwrap();
        handle.fill_rect(Rect::new(0, 0, 10, 10), Color::BLACK, CompositionMode::SourceOver);
        drop(handle);
        assert_eq!(surface.pixel(2, 2).unwrap().alpha(), 255);
        assert_eq!(surface.pixel(7, 7).unwrap().alpha(), 0);
    }

    #[test]
    fn test_row_mut() {
        let surface = surface();
        let mut handle = surface.paint_handle(Rect::new(0, 0, 3, 2)).unwrap();
        let blue = PremultipliedColorU8::from_rgba(0, 0, 255, 255).unwrap();
        handle.row_mut(1).unwrap().fill(blue);
        assert!(handle.row_mut(2).is_none());
        drop(handle);
        assert_eq!(surface.pixel(2, 1), Some(blue));
        assert_eq!(surface.pixel(2, 0).unwrap().alpha(), 0);
    }

    #[test]
    fn test_drop_emits_changed() {
        let surface = surface();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let id = surface.on_changed(move |area| {
            assert_eq!(area, Rect::new(1, 1, 2, 2));
            counter.fetch_add(1, Ordering::SeqCst);
        });
        drop(surface.paint_handle(Rect::new(1, 1, 2, 2)).unwrap());
        drop(surface.bit_writer(Rect::new(1, 1, 2, 2)).unwrap());
        assert_eq!(seen.load(Ordering::SeqCst), 2);

        assert!(surface.disconnect(id));
        drop(surface.paint_handle(Rect::new(1, 1, 2, 2)).unwrap());
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_reader_clips_to_buffer() {
        let surface = surface();
        drop(surface.paint_handle(Rect::new(0, 0, 4, 4)).unwrap());
        let reader = surface.bit_reader(Rect::new(2, 2, 10, 10)).unwrap();
        assert_eq!(reader.area(), Rect::new(2, 2, 2, 2));
        assert_eq!(reader.bytes_per_row(), 8);
        assert_eq!(reader.rows().count(), 2);
        drop(reader);
        assert_eq!(surface.buffer_rect(), Rect::new(0, 0, 4, 4));
    }

    #[test]
    fn test_reader_before_allocation_is_empty() {
        let surface = surface();
        let reader = surface.bit_reader(Rect::new(0, 0, 4, 4)).unwrap();
        assert!(reader.is_empty());
        assert!(reader.row(0).is_none());
    }

    #[test]
    fn test_concurrent_readers() {
        let surface = surface();
        drop(surface.paint_handle(Rect::new(0, 0, 4, 4)).unwrap());
        let a = surface.bit_reader(Rect::new(0, 0, 4, 4)).unwrap();
        let b = surface.bit_reader(Rect::new(0, 0, 2, 2)).unwrap();
        assert_eq!(a.row_count() + b.row_count(), 6);
    }

    #[test]
    fn test_writer_rows() {
        let surface = surface();
        let mut writer = surface.bit_writer(Rect::new(5, 5, 2, 2)).unwrap();
        writer.row_mut(0).unwrap().copy_from_slice(&[9, 9, 9, 9, 0, 0, 0, 0]);
        assert_eq!(writer.row(0).unwrap()[0], 9);
        drop(writer);
        let pixel = surface.pixel(5, 5).unwrap();
        assert_eq!(pixel.alpha(), 9);
    }
}
