//! Edge case tests for ink-raster
//!
//! Growth policy, clearing, linking, replace mode and diff corner cases.

use std::sync::Arc;

use ink_raster::ink_render::{
    CompositionMode, FillStep, GroupAddress, Point, Rect, RenderStack,
};
use ink_raster::*;
use tiny_skia::{Color, Pixmap, PremultipliedColorU8};

fn surface() -> Arc<RasterSurface> {
    let surface = RasterSurface::new();
    surface
        .initialize(None, CompositionMode::SourceOver, SurfaceFlags::NONE)
        .unwrap();
    surface
}

fn opaque(r: u8, g: u8, b: u8) -> PremultipliedColorU8 {
    PremultipliedColorU8::from_rgba(r, g, b, 255).unwrap()
}

// ============================================================================
// GROWTH
// ============================================================================

#[test]
fn test_growth_preserves_content() {
    let surface = surface();
    surface
        .paint_handle(Rect::new(0, 0, 10, 10))
        .unwrap()
        .set_pixel(5, 5, opaque(255, 0, 0));

    drop(surface.paint_handle(Rect::new(-50, -50, 10, 10)).unwrap());
    assert!(surface.buffer_rect().contains(&Rect::new(-50, -50, 60, 60)));
    assert_eq!(surface.pixel(5, 5), Some(opaque(255, 0, 0)));
    assert_eq!(surface.pixel(-45, -45).unwrap().alpha(), 0);
}

#[test]
fn test_growth_is_chunked() {
    let config = RasterConfig {
        chunk_size: 32,
        ..RasterConfig::default()
    };
    let surface = RasterSurface::with_config(config);
    surface
        .initialize(None, CompositionMode::SourceOver, SurfaceFlags::NONE)
        .unwrap();

    drop(surface.paint_handle(Rect::new(0, 0, 10, 10)).unwrap());
    drop(surface.paint_handle(Rect::new(10, 0, 1, 1)).unwrap());
    assert_eq!(surface.buffer_rect(), Rect::from_ltrb(0, 0, 43, 10));
    assert_eq!(surface.allocation_count(), 2);

    // Stroke continues into the slack without reallocating
    for x in 11..40 {
        drop(surface.paint_handle(Rect::new(x, 0, 1, 1)).unwrap());
    }
    assert_eq!(surface.allocation_count(), 2);
}

#[test]
fn test_initialize_with_area_allocates() {
    let surface = RasterSurface::new();
    surface
        .initialize(
            Some(Rect::new(0, 0, 16, 16)),
            CompositionMode::SourceOver,
            SurfaceFlags::NONE,
        )
        .unwrap();
    assert_eq!(surface.area(), Rect::new(0, 0, 16, 16));
    assert_eq!(surface.buffer_rect(), Rect::new(0, 0, 16, 16));
    assert_eq!(surface.allocation_count(), 1);
}

#[test]
fn test_initialize_with_image() {
    let mut image = Pixmap::new(3, 2).unwrap();
    image.fill(Color::from_rgba8(0, 0, 255, 255));

    let surface = RasterSurface::new();
    surface
        .initialize_with_image(
            image.as_ref(),
            Point::new(7, 8),
            CompositionMode::SourceOver,
            SurfaceFlags::NONE,
        )
        .unwrap();
    assert_eq!(surface.area(), Rect::new(7, 8, 3, 2));
    assert_eq!(surface.pixel(9, 9), Some(opaque(0, 0, 255)));
    assert_eq!(surface.pixel(6, 8), None);
}

#[test]
fn test_empty_request_does_not_allocate() {
    let surface = surface();
    let handle = surface.paint_handle(Rect::EMPTY).unwrap();
    assert!(handle.area().is_empty());
    drop(handle);
    assert_eq!(surface.allocation_count(), 0);
    assert_eq!(surface.area(), Rect::EMPTY);
}

#[test]
fn test_negative_size_request_is_normalized() {
    let surface = surface();
    drop(surface.paint_handle(Rect::new(0, 0, -4, 4)).unwrap());
    assert_eq!(surface.allocation_count(), 0);
}

#[test]
fn test_failed_growth_leaves_surface_untouched() {
    let surface = surface();
    surface
        .paint_handle(Rect::new(0, 0, 10, 10))
        .unwrap()
        .set_pixel(3, 3, opaque(255, 0, 0));

    let result = surface.paint_handle(Rect::new(0, 0, 1 << 30, 1 << 30));
    assert!(matches!(result, Err(RasterError::AllocationFailed { .. })));
    drop(result);

    assert_eq!(surface.buffer_rect(), Rect::new(0, 0, 10, 10));
    assert_eq!(surface.area(), Rect::new(0, 0, 10, 10));
    assert_eq!(surface.pixel(3, 3), Some(opaque(255, 0, 0)));
    assert_eq!(surface.allocation_count(), 1);
}

#[test]
fn test_request_past_plane_edge_fails() {
    let surface = surface();
    assert!(matches!(
        surface.paint_handle(Rect::new(i32::MAX - 10, 0, 100, 5)),
        Err(RasterError::AllocationFailed { .. })
    ));
    assert!(matches!(
        surface.bit_writer(Rect::new(0, i32::MAX - 1, 1, 2)),
        Err(RasterError::AllocationFailed { .. })
    ));
    assert_eq!(surface.allocation_count(), 0);
    assert_eq!(surface.area(), Rect::EMPTY);
}

// ============================================================================
// CLEARING
// ============================================================================

#[test]
fn test_clear_keeps_buffer() {
    let surface = surface();
    surface
        .paint_handle(Rect::new(0, 0, 64, 64))
        .unwrap()
        .fill(Color::BLACK);
    surface.clear();

    assert_eq!(surface.area(), Rect::EMPTY);
    assert_eq!(surface.buffer_rect(), Rect::new(0, 0, 64, 64));
    assert_eq!(surface.pixel(10, 10).unwrap().alpha(), 0);

    // A smaller request far away re-centers the existing buffer
    drop(surface.paint_handle(Rect::new(1000, 1000, 8, 8)).unwrap());
    assert_eq!(surface.allocation_count(), 1);
    assert!(surface.buffer_rect().contains(&Rect::new(1000, 1000, 8, 8)));
    assert_eq!(surface.area(), Rect::new(1000, 1000, 8, 8));
}

#[test]
fn test_growth_after_clear_ignores_stale_buffer() {
    let surface = surface();
    surface
        .paint_handle(Rect::new(0, 0, 64, 64))
        .unwrap()
        .fill(Color::BLACK);
    surface.clear();

    drop(surface.paint_handle(Rect::new(5000, 5000, 100, 100)).unwrap());
    assert_eq!(surface.allocation_count(), 2);
    assert_eq!(surface.buffer_rect(), Rect::new(5000 - 64, 5000 - 64, 228, 228));
    assert_eq!(surface.area(), Rect::new(5000, 5000, 100, 100));
    assert_eq!(surface.pixel(5050, 5050).unwrap().alpha(), 0);
}

#[test]
fn test_clear_uninitialized_is_noop() {
    let surface = RasterSurface::new();
    surface.clear();
    assert!(!surface.is_initialized());
}

#[test]
fn test_clear_emits_changed_for_old_area() {
    let surface = surface();
    drop(surface.paint_handle(Rect::new(0, 0, 4, 4)).unwrap());
    let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    surface.on_changed(move |area| sink.lock().unwrap().push(area));
    surface.clear();
    assert_eq!(*seen.lock().unwrap(), vec![Rect::new(0, 0, 4, 4)]);
}

// ============================================================================
// LINKING
// ============================================================================

#[test]
fn test_link_seeds_new_regions_only() {
    let layer = surface();
    layer
        .paint_handle(Rect::new(0, 0, 8, 8))
        .unwrap()
        .fill(Color::from_rgba8(255, 0, 0, 255));

    let preview = surface();
    drop(preview.paint_handle(Rect::new(0, 0, 2, 2)).unwrap());
    preview.link(&layer);
    // Already allocated pixels are not retroactively seeded
    assert_eq!(preview.pixel(1, 1).unwrap().alpha(), 0);

    drop(preview.paint_handle(Rect::new(4, 4, 2, 2)).unwrap());
    assert_eq!(preview.pixel(5, 5), Some(opaque(255, 0, 0)));
    assert_eq!(preview.pixel(1, 1).unwrap().alpha(), 0);
}

#[test]
fn test_expired_link_is_ignored() {
    let layer = surface();
    layer
        .paint_handle(Rect::new(0, 0, 4, 4))
        .unwrap()
        .fill(Color::BLACK);
    let preview = surface();
    preview.link(&layer);
    drop(layer);

    drop(preview.paint_handle(Rect::new(0, 0, 4, 4)).unwrap());
    assert!(preview.linked().is_none());
    assert_eq!(preview.pixel(1, 1).unwrap().alpha(), 0);
}

// ============================================================================
// COMPOSITION
// ============================================================================

#[test]
fn test_surface_alpha_and_mode_in_render() {
    let surface = surface();
    surface
        .paint_handle(Rect::new(0, 0, 2, 2))
        .unwrap()
        .fill(Color::from_rgba8(0, 0, 0, 255));
    surface.set_alpha(0);

    let mut target = Pixmap::new(2, 2).unwrap();
    surface.render_into(&mut target, Point::ZERO);
    assert_eq!(target.pixel(0, 0).unwrap().alpha(), 0);

    surface.set_alpha(255);
    surface.render_into(&mut target, Point::ZERO);
    assert_eq!(target.pixel(0, 0).unwrap().alpha(), 255);

    surface.set_composition_mode(CompositionMode::DestinationOut);
    surface.render_into(&mut target, Point::ZERO);
    assert_eq!(target.pixel(0, 0).unwrap().alpha(), 0);
}

#[test]
fn test_replace_surface_hides_steps_beneath() {
    let background = Arc::new(FillStep::new(Rect::new(0, 0, 8, 8), Color::from_rgba8(255, 0, 0, 255)));

    let overlay = RasterSurface::new();
    overlay
        .initialize(None, CompositionMode::SourceOver, SurfaceFlags::REPLACE)
        .unwrap();
    overlay
        .paint_handle(Rect::new(0, 0, 4, 8))
        .unwrap()
        .fill(Color::from_rgba8(0, 0, 255, 128));

    let mut stack = RenderStack::new();
    let step = overlay.render_step();
    let bg = Arc::clone(&background);
    stack.connect(move |builder| {
        builder.add_weak_step(step.clone(), GroupAddress::root(), 0.0);
        builder.add_step(&bg, GroupAddress::root(), 1.0);
    });

    let pixmap = stack.flatten(Rect::new(0, 0, 8, 8)).unwrap();
    // Inside the replace area only the translucent overlay shows
    let inside = pixmap.pixel(1, 1).unwrap();
    assert_eq!(inside.red(), 0);
    assert_eq!(inside.alpha(), 128);
    assert_eq!(pixmap.pixel(6, 1).unwrap().red(), 255);
}

#[test]
fn test_snapshot_of_unallocated_region() {
    let surface = surface();
    assert!(surface.snapshot(Rect::new(0, 0, 4, 4)).is_none());
    drop(surface.paint_handle(Rect::new(0, 0, 4, 4)).unwrap());
    let part = surface.snapshot(Rect::new(2, 2, 10, 10)).unwrap();
    assert_eq!((part.width(), part.height()), (2, 2));
}

// ============================================================================
// DIFFS
// ============================================================================

#[test]
fn test_diff_over_partially_allocated_destination() {
    let destination = surface();
    destination
        .paint_handle(Rect::new(0, 0, 4, 4))
        .unwrap()
        .fill(Color::from_rgba8(255, 0, 0, 255));

    let stroke = surface();
    stroke
        .paint_handle(Rect::new(2, 2, 4, 4))
        .unwrap()
        .fill(Color::from_rgba8(0, 255, 0, 255));

    let diff = RasterDiff::new(&stroke, &destination).unwrap();
    diff.apply().unwrap();
    assert_eq!(destination.pixel(3, 3), Some(opaque(0, 255, 0)));
    assert_eq!(destination.pixel(5, 5), Some(opaque(0, 255, 0)));
    assert_eq!(destination.pixel(1, 1), Some(opaque(255, 0, 0)));

    diff.apply().unwrap();
    assert_eq!(destination.pixel(3, 3), Some(opaque(255, 0, 0)));
    assert_eq!(destination.pixel(5, 5).unwrap().alpha(), 0);
}

#[test]
fn test_empty_source_diff() {
    let destination = surface();
    let diff = RasterDiff::new(&surface(), &destination).unwrap();
    assert!(diff.is_empty());
    assert_eq!(diff.memory_size(), 0);
    diff.apply().unwrap();
    assert_eq!(destination.allocation_count(), 0);
}

#[test]
fn test_history_survives_destination_drop() {
    let destination = surface();
    let stroke = surface();
    stroke
        .paint_handle(Rect::new(0, 0, 2, 2))
        .unwrap()
        .fill(Color::BLACK);

    let mut history = DiffHistory::default();
    history.push(RasterDiff::new(&stroke, &destination).unwrap()).unwrap();
    drop(destination);
    assert!(history.undo().unwrap());
    assert!(history.redo().unwrap());
}
