//! Raster Surface
//!
//! A dynamically growing pixel buffer with a logical area, composition
//! parameters and scoped read/write access.
//!
//! A single read/write lock guards the `(area, buffer)` pair. Write access
//! (`paint_handle`, `bit_writer`) grows storage before the area is updated,
//! so the area always lies inside the buffer. Change observers run after the
//! write lock is released, with no surface lock held.
//!
//! Pixels inside the buffer but outside the area are kept transparent (or
//! seeded from the linked surface), so a freshly grown region never exposes
//! stale content.

use std::ops::BitOr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

use ink_render::{CompositionMode, Point, Rect, RenderContext, RenderStep};
use tiny_skia::{Pixmap, PixmapRef, PremultipliedColorU8};

use crate::buffer::PixelBuffer;
use crate::handle::{BitReader, BitWriter, PaintHandle};
use crate::{RasterConfig, RasterError};

/// Surface flags (bitfield)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SurfaceFlags(u8);

impl SurfaceFlags {
    /// No flags
    pub const NONE: Self = Self(0);
    /// The surface's area hides everything composed beneath it
    pub const REPLACE: Self = Self(1 << 0);

    /// Check if flag is set
    pub fn contains(self, flag: SurfaceFlags) -> bool {
        (self.0 & flag.0) == flag.0
    }

    /// Set flag
    pub fn set(&mut self, flag: SurfaceFlags) {
        self.0 |= flag.0;
    }

    pub fn bits(self) -> u8 {
        self.0
    }
}

impl BitOr for SurfaceFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// State guarded by the surface lock
pub(crate) struct SurfaceState {
    pub(crate) initialized: bool,
    pub(crate) buffer: Option<PixelBuffer>,
    pub(crate) area: Rect,
    pub(crate) mode: CompositionMode,
    pub(crate) alpha: u8,
    pub(crate) replace: bool,
    pub(crate) linked: Option<Weak<RasterSurface>>,
}

impl Default for SurfaceState {
    fn default() -> Self {
        Self {
            initialized: false,
            buffer: None,
            area: Rect::EMPTY,
            mode: CompositionMode::SourceOver,
            alpha: 255,
            replace: false,
            linked: None,
        }
    }
}

/// Handle identifying a change observer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

type ChangeCallback = Arc<dyn Fn(Rect) + Send + Sync>;

/// Growable raster surface
pub struct RasterSurface {
    state: RwLock<SurfaceState>,
    config: RasterConfig,
    observers: Mutex<Vec<(ObserverId, ChangeCallback)>>,
    next_observer: AtomicU64,
    allocations: AtomicUsize,
    this: Weak<RasterSurface>,
}

impl RasterSurface {
    /// Create an uninitialized surface with default configuration
    pub fn new() -> Arc<Self> {
        Self::with_config(RasterConfig::default())
    }

    pub fn with_config(config: RasterConfig) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            state: RwLock::new(SurfaceState::default()),
            config,
            observers: Mutex::new(Vec::new()),
            next_observer: AtomicU64::new(0),
            allocations: AtomicUsize::new(0),
            this: this.clone(),
        })
    }

    pub(crate) fn read_state(&self) -> RwLockReadGuard<'_, SurfaceState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn write_state(&self) -> RwLockWriteGuard<'_, SurfaceState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Set up an empty surface, optionally with storage for `area`
    pub fn initialize(
        &self,
        area: Option<Rect>,
        mode: CompositionMode,
        flags: SurfaceFlags,
    ) -> Result<(), RasterError> {
        let mut state = self.write_state();
        if state.initialized {
            tracing::error!("Raster surface initialized twice");
            return Err(RasterError::AlreadyInitialized);
        }
        if let Some(area) = area.filter(|a| !a.is_empty()) {
            state.buffer = Some(PixelBuffer::allocate(area)?);
            state.area = area;
            self.allocations.fetch_add(1, Ordering::Relaxed);
        }
        state.initialized = true;
        state.mode = mode;
        state.replace = flags.contains(SurfaceFlags::REPLACE);
        Ok(())
    }

    /// Set up a surface pre-seeded with `image` placed at `offset`
    pub fn initialize_with_image(
        &self,
        image: PixmapRef<'_>,
        offset: Point,
        mode: CompositionMode,
        flags: SurfaceFlags,
    ) -> Result<(), RasterError> {
        let mut state = self.write_state();
        if state.initialized {
            tracing::error!("Raster surface initialized twice");
            return Err(RasterError::AlreadyInitialized);
        }
        let rect = Rect::from_origin_size(offset, image.width() as i32, image.height() as i32);
        let mut buffer = PixelBuffer::allocate(rect)?;
        buffer.pixmap_mut().data_mut().copy_from_slice(image.data());
        self.allocations.fetch_add(1, Ordering::Relaxed);

        state.buffer = Some(buffer);
        state.area = rect;
        state.initialized = true;
        state.mode = mode;
        state.replace = flags.contains(SurfaceFlags::REPLACE);
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.read_state().initialized
    }

    pub fn config(&self) -> &RasterConfig {
        &self.config
    }

    /// Currently populated bounds (empty when cleared)
    pub fn area(&self) -> Rect {
        self.read_state().area
    }

    /// Allocated bounds (empty before the first allocation)
    pub fn buffer_rect(&self) -> Rect {
        self.read_state()
            .buffer
            .as_ref()
            .map(PixelBuffer::rect)
            .unwrap_or(Rect::EMPTY)
    }

    /// Number of buffer allocations performed so far
    pub fn allocation_count(&self) -> usize {
        self.allocations.load(Ordering::Relaxed)
    }

    pub fn composition_mode(&self) -> CompositionMode {
        self.read_state().mode
    }

    pub fn set_composition_mode(&self, mode: CompositionMode) {
        let area = {
            let mut state = self.write_state();
            state.mode = mode;
            state.area
        };
        self.notify_changed(area);
    }

    pub fn alpha(&self) -> u8 {
        self.read_state().alpha
    }

    pub fn set_alpha(&self, alpha: u8) {
        let area = {
            let mut state = self.write_state();
            state.alpha = alpha;
            state.area
        };
        self.notify_changed(area);
    }

    pub fn replace_mode(&self) -> bool {
        self.read_state().replace
    }

    pub fn set_replace_mode(&self, replace: bool) {
        let area = {
            let mut state = self.write_state();
            state.replace = replace;
            state.area
        };
        self.notify_changed(area);
    }

    /// Reset the area to empty, keeping the buffer for reuse
    pub fn clear(&self) {
        let old = {
            let mut state = self.write_state();
            let old = state.area;
            state.area = Rect::EMPTY;
            let linked = upgrade_link(&state);
            if let Some(buffer) = state.buffer.as_mut() {
                buffer.clear();
                self.seed(linked.as_deref(), buffer);
            }
            old
        };
        self.notify_changed(old);
    }

    /// Seed newly allocated regions from `other`. Not retroactive.
    ///
    /// While linked, `other` must not be write-locked by the thread that
    /// grows this surface.
    pub fn link(&self, other: &Arc<RasterSurface>) {
        self.write_state().linked = Some(Arc::downgrade(other));
    }

    pub fn unlink(&self) {
        self.write_state().linked = None;
    }

    /// Linked surface, if set and still alive
    pub fn linked(&self) -> Option<Arc<RasterSurface>> {
        upgrade_link(&self.read_state())
    }

    /// Grow storage over `area` and lock it for drawing
    pub fn paint_handle(&self, area: Rect) -> Result<PaintHandle<'_>, RasterError> {
        let area = area.normalized();
        let guard = self.acquire_for_write(area)?;
        tracing::trace!("Paint handle acquired over {:?}", area);
        Ok(PaintHandle::new(self, guard, area))
    }

    /// Lock the allocated part of `area` for raw reading (never grows)
    pub fn bit_reader(&self, area: Rect) -> Result<BitReader<'_>, RasterError> {
        let guard = self.read_state();
        if !guard.initialized {
            tracing::error!("Bit reader requested on an uninitialized surface");
            return Err(RasterError::NotInitialized);
        }
        let clipped = guard
            .buffer
            .as_ref()
            .map(|buffer| area.intersection(&buffer.rect()))
            .unwrap_or(Rect::EMPTY);
        tracing::trace!("Bit reader acquired over {:?}", clipped);
        Ok(BitReader::new(guard, clipped))
    }

    /// Grow storage over `area` and lock it for raw writing
    pub fn bit_writer(&self, area: Rect) -> Result<BitWriter<'_>, RasterError> {
        let area = area.normalized();
        let guard = self.acquire_for_write(area)?;
        tracing::trace!("Bit writer acquired over {:?}", area);
        Ok(BitWriter::new(self, guard, area))
    }

    fn acquire_for_write(&self, area: Rect) -> Result<RwLockWriteGuard<'_, SurfaceState>, RasterError> {
        let mut guard = self.write_state();
        if !guard.initialized {
            tracing::error!("Write access requested on an uninitialized surface");
            return Err(RasterError::NotInitialized);
        }
        self.ensure_storage(&mut guard, area)?;
        Ok(guard)
    }

    /// Make the buffer cover `requested`, then extend the area over it.
    ///
    /// On failure nothing is changed: a grown buffer is only swapped in once
    /// fully built.
    fn ensure_storage(&self, state: &mut SurfaceState, requested: Rect) -> Result<(), RasterError> {
        if requested.is_empty() {
            return Ok(());
        }
        let failed = RasterError::AllocationFailed {
            width: requested.width,
            height: requested.height,
        };
        if !requested.has_exact_edges() {
            tracing::error!("Raster request {:?} overflows the logical plane", requested);
            return Err(failed);
        }
        let chunk = self.config.chunk_size.min(i32::MAX as u32) as i32;
        let linked = upgrade_link(state);

        match state.buffer.as_mut() {
            None => {
                let mut buffer = PixelBuffer::allocate(requested)?;
                self.seed(linked.as_deref(), &mut buffer);
                self.allocations.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("Allocated raster buffer {:?}", requested);
                state.buffer = Some(buffer);
            }
            Some(buffer) if buffer.rect().contains(&requested) => {}
            Some(buffer)
                if state.area.is_empty()
                    && buffer.width() as i32 >= requested.width
                    && buffer.height() as i32 >= requested.height =>
            {
                let origin = recentered_origin(buffer.rect(), requested);
                buffer.set_origin(origin);
                buffer.clear();
                self.seed(linked.as_deref(), buffer);
                tracing::debug!("Re-centered cleared raster buffer at {:?}", buffer.rect());
            }
            Some(buffer) if state.area.is_empty() => {
                // Stale cleared content is not carried over
                let target = padded_rect(requested, chunk);
                if !target.contains(&requested) {
                    return Err(failed);
                }
                let mut fresh = PixelBuffer::allocate(target)?;
                self.seed(linked.as_deref(), &mut fresh);
                tracing::debug!("Replaced cleared raster buffer {:?} -> {:?}", buffer.rect(), target);
                *buffer = fresh;
                self.allocations.fetch_add(1, Ordering::Relaxed);
            }
            Some(buffer) => {
                let target = grown_rect(buffer.rect(), requested, chunk);
                if !target.contains(&requested) {
                    return Err(failed);
                }
                let mut grown = PixelBuffer::allocate(target)?;
                self.seed(linked.as_deref(), &mut grown);
                grown.copy_from(buffer);
                tracing::debug!("Grew raster buffer {:?} -> {:?}", buffer.rect(), target);
                *buffer = grown;
                self.allocations.fetch_add(1, Ordering::Relaxed);
            }
        }

        state.area = state.area.union(&requested);
        Ok(())
    }

    /// Render the linked surface into a fresh buffer region
    fn seed(&self, linked: Option<&RasterSurface>, buffer: &mut PixelBuffer) {
        let Some(link) = linked else {
            return;
        };
        if std::ptr::eq(link, self) {
            return;
        }
        let origin = buffer.origin();
        link.render_into(buffer.pixmap_mut(), origin);
    }

    /// Compose the populated area onto `target`, whose top-left sits at `origin`
    pub fn render_into(&self, target: &mut Pixmap, origin: Point) {
        let mut ctx = RenderContext::new(target, origin);
        self.draw(&mut ctx);
    }

    fn draw(&self, ctx: &mut RenderContext<'_>) {
        let state = self.read_state();
        if state.area.is_empty() {
            return;
        }
        let Some(part) = state.buffer.as_ref().and_then(|b| b.copy_rect(state.area)) else {
            return;
        };
        ctx.draw_pixmap(state.area.origin(), part.as_ref(), state.mode, state.alpha);
    }

    /// Copy of the allocated pixels inside `rect`
    pub fn snapshot(&self, rect: Rect) -> Option<Pixmap> {
        self.read_state().buffer.as_ref()?.copy_rect(rect)
    }

    /// Pixel at a logical position (`None` outside the allocated buffer)
    pub fn pixel(&self, x: i32, y: i32) -> Option<PremultipliedColorU8> {
        self.read_state().buffer.as_ref()?.pixel(x, y)
    }

    /// This surface's participation token in a render stack
    pub fn render_step(&self) -> Weak<dyn RenderStep> {
        let step: Weak<dyn RenderStep> = self.this.clone();
        step
    }

    /// Register a callback for `changed(area)` notifications
    ///
    /// Callbacks run on the thread that released the handle, after every lock
    /// on this surface has been released, so they may read or paint it again.
    pub fn on_changed<F>(&self, callback: F) -> ObserverId
    where
        F: Fn(Rect) + Send + Sync + 'static,
    {
        let id = ObserverId(self.next_observer.fetch_add(1, Ordering::Relaxed));
        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(callback)));
        id
    }

    /// Remove a change callback
    pub fn disconnect(&self, id: ObserverId) -> bool {
        let mut observers = self.observers.lock().unwrap_or_else(PoisonError::into_inner);
        let before = observers.len();
        observers.retain(|(oid, _)| *oid != id);
        observers.len() != before
    }

    /// Emit `changed(area)`; the caller must not hold the surface lock
    pub(crate) fn notify_changed(&self, area: Rect) {
        if area.is_empty() {
            return;
        }
        let callbacks: Vec<ChangeCallback> = self
            .observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();
        for callback in callbacks {
            callback(area);
        }
    }
}

impl RenderStep for RasterSurface {
    fn area_hint(&self) -> Rect {
        self.area()
    }

    fn on_push(&self, ctx: &mut RenderContext<'_>) {
        let (replace, area) = {
            let state = self.read_state();
            (state.replace, state.area)
        };
        if replace && !area.is_empty() {
            ctx.push_exclude(area);
        } else {
            ctx.save();
        }
    }

    fn on_pop(&self, ctx: &mut RenderContext<'_>) {
        ctx.pop_clip();
        self.draw(ctx);
    }
}

fn upgrade_link(state: &SurfaceState) -> Option<Arc<RasterSurface>> {
    state.linked.as_ref().and_then(Weak::upgrade)
}

/// Union of `current` and `requested`, pushed out by `chunk` on every side that had to grow
fn grown_rect(current: Rect, requested: Rect, chunk: i32) -> Rect {
    let chunk = chunk.max(0);
    let mut left = current.left();
    let mut top = current.top();
    let mut right = current.right();
    let mut bottom = current.bottom();
    if requested.left() < left {
        left = requested.left().saturating_sub(chunk);
    }
    if requested.top() < top {
        top = requested.top().saturating_sub(chunk);
    }
    if requested.right() > right {
        right = requested.right().saturating_add(chunk);
    }
    if requested.bottom() > bottom {
        bottom = requested.bottom().saturating_add(chunk);
    }
    Rect::from_ltrb(left, top, right, bottom)
}

/// `rect` pushed out by `chunk` on every side
fn padded_rect(rect: Rect, chunk: i32) -> Rect {
    let chunk = chunk.max(0);
    Rect::from_ltrb(
        rect.left().saturating_sub(chunk),
        rect.top().saturating_sub(chunk),
        rect.right().saturating_add(chunk),
        rect.bottom().saturating_add(chunk),
    )
}

/// Origin that centers a buffer of `current`'s size on `requested`, keeping it inside
fn recentered_origin(current: Rect, requested: Rect) -> Point {
    let center = requested.center();
    let x = center.x.saturating_sub(current.width / 2).clamp(
        requested.right().saturating_sub(current.width),
        requested.left().min(i32::MAX - current.width),
    );
    let y = center.y.saturating_sub(current.height / 2).clamp(
        requested.bottom().saturating_sub(current.height),
        requested.top().min(i32::MAX - current.height),
    );
    Point::new(x, y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tiny_skia::Color;

    fn surface() -> Arc<RasterSurface> {
        let surface = RasterSurface::new();
        surface
            .initialize(None, CompositionMode::SourceOver, SurfaceFlags::NONE)
            .unwrap();
        surface
    }

    #[test]
    fn test_grown_rect_adds_chunk_only_where_needed() {
        let grown = grown_rect(Rect::new(0, 0, 10, 10), Rect::new(100, 100, 10, 10), 64);
        assert_eq!(grown, Rect::from_ltrb(0, 0, 174, 174));
        let grown = grown_rect(Rect::new(0, 0, 10, 10), Rect::new(-5, 2, 3, 3), 64);
        assert_eq!(grown, Rect::from_ltrb(-69, 0, 10, 10));
    }

    #[test]
    fn test_grown_rect_saturates_at_plane_edge() {
        let current = Rect::new(i32::MAX - 20, 0, 10, 10);
        let grown = grown_rect(current, Rect::new(i32::MAX - 10, 0, 10, 10), 64);
        assert_eq!(grown.right(), i32::MAX);
        assert!(grown.contains(&Rect::new(i32::MAX - 10, 0, 10, 10)));
        assert_eq!(padded_rect(Rect::new(0, 0, 4, 4), 2), Rect::new(-2, -2, 8, 8));
    }

    #[test]
    fn test_recentered_origin_contains_request() {
        let origin = recentered_origin(Rect::new(0, 0, 64, 64), Rect::new(500, 500, 10, 10));
        let rect = Rect::from_origin_size(origin, 64, 64);
        assert!(rect.contains(&Rect::new(500, 500, 10, 10)));
        assert_eq!(rect.center(), Rect::new(500, 500, 10, 10).center());
    }

    #[test]
    fn test_double_initialize_fails() {
        let surface = surface();
        assert!(matches!(
            surface.initialize(None, CompositionMode::SourceOver, SurfaceFlags::NONE),
            Err(RasterError::AlreadyInitialized)
        ));
    }

    #[test]
    fn test_uninitialized_access_fails() {
        let surface = RasterSurface::new();
        assert!(matches!(
            surface.paint_handle(Rect::new(0, 0, 1, 1)),
            Err(RasterError::NotInitialized)
        ));
        assert!(matches!(
            surface.bit_reader(Rect::new(0, 0, 1, 1)),
            Err(RasterError::NotInitialized)
        ));
        assert!(matches!(
            surface.bit_writer(Rect::new(0, 0, 1, 1)),
            Err(RasterError::NotInitialized)
        ));
    }

    #[test]
    fn test_first_allocation_is_exact() {
        let surface = surface();
        drop(surface.paint_handle(Rect::new(3, 4, 10, 10)).unwrap());
        assert_eq!(surface.buffer_rect(), Rect::new(3, 4, 10, 10));
        assert_eq!(surface.area(), Rect::new(3, 4, 10, 10));
        assert_eq!(surface.allocation_count(), 1);
    }

    #[test]
    fn test_area_is_union_of_requests() {
        let surface = surface();
        drop(surface.paint_handle(Rect::new(0, 0, 10, 10)).unwrap());
        drop(surface.paint_handle(Rect::new(20, 0, 5, 5)).unwrap());
        assert_eq!(surface.area(), Rect::from_ltrb(0, 0, 25, 10));
        assert!(surface.buffer_rect().contains(&surface.area()));
    }

    #[test]
    fn test_flags() {
        let mut flags = SurfaceFlags::NONE;
        assert!(!flags.contains(SurfaceFlags::REPLACE));
        flags.set(SurfaceFlags::REPLACE);
        assert!(flags.contains(SurfaceFlags::REPLACE));
        assert_eq!((SurfaceFlags::NONE | SurfaceFlags::REPLACE).bits(), 1);
    }

    #[test]
    fn test_replace_flag_initializes_replace_mode() {
        let surface = RasterSurface::new();
        surface
            .initialize(None, CompositionMode::SourceOver, SurfaceFlags::REPLACE)
            .unwrap();
        assert!(surface.replace_mode());
    }

    #[test]
    fn test_clear_reseeds_from_link() {
        let base = surface();
        base.paint_handle(Rect::new(0, 0, 4, 4))
            .unwrap()
            .fill(Color::from_rgba8(0, 0, 255, 255));

        let preview = surface();
        preview.link(&base);
        drop(preview.paint_handle(Rect::new(0, 0, 4, 4)).unwrap());
        assert_eq!(preview.pixel(1, 1).unwrap().blue(), 255);

        preview.clear();
        assert_eq!(preview.area(), Rect::EMPTY);
        assert_eq!(preview.pixel(1, 1).unwrap().blue(), 255);

        preview.unlink();
        assert!(preview.linked().is_none());
    }

    #[test]
    fn test_render_step_expires_with_surface() {
        let surface = surface();
        let step = surface.render_step();
        assert!(step.upgrade().is_some());
        drop(surface);
        assert!(step.upgrade().is_none());
    }
}
