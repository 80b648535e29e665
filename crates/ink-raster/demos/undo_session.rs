//! Example: paint a stroke onto a layer, compose it, then undo and redo

use std::sync::Arc;

use anyhow::Context;
use ink_raster::ink_render::{
    CompositionMode, FillStep, GroupAddress, Rect, RenderStack, tiny_skia::{Color, Paint, PathBuilder},
};
use ink_raster::{DiffHistory, RasterConfig, RasterDiff, RasterSurface, SurfaceFlags};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    // Initialize logging (override with RUST_LOG)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();

    let config = RasterConfig::from_json(r#"{ "chunk_size": 32 }"#)?;
    let canvas = Rect::new(0, 0, 64, 64);

    let background = Arc::new(FillStep::new(canvas, Color::WHITE));
    let layer = RasterSurface::with_config(config.clone());
    layer.initialize(Some(canvas), CompositionMode::SourceOver, SurfaceFlags::NONE)?;

    let mut stack = RenderStack::new();
    let (bg, step) = (Arc::clone(&background), layer.render_step());
    stack.connect(move |builder| {
        builder.add_weak_step(step.clone(), GroupAddress::root(), 0.0);
        builder.add_step(&bg, GroupAddress::root(), 1.0);
    });

    // The tool paints into a scratch surface first
    let scratch = RasterSurface::with_config(config.clone());
    scratch.initialize(None, CompositionMode::SourceOver, SurfaceFlags::NONE)?;
    {
        let mut handle = scratch.paint_handle(Rect::new(8, 8, 40, 40))?;
        let path = PathBuilder::from_circle(28.0, 28.0, 18.0).context("degenerate stroke")?;
        let mut paint = Paint::default();
        paint.set_color_rgba8(200, 30, 30, 255);
        handle.fill_path(&path, &paint);
    }

    let mut history = DiffHistory::new(&config);
    history.push(RasterDiff::new(&scratch, &layer)?)?;
    report("after stroke", &mut stack, canvas)?;

    history.undo()?;
    report("after undo", &mut stack, canvas)?;

    history.redo()?;
    report("after redo", &mut stack, canvas)?;

    println!(
        "History: {} undo step(s), {} bytes; layer allocations: {}",
        history.undo_len(),
        history.memory_size(),
        layer.allocation_count()
    );
    Ok(())
}

fn report(label: &str, stack: &mut RenderStack, canvas: Rect) -> anyhow::Result<()> {
    let image = stack.flatten(canvas)?;
    let center = image.pixel(28, 28).context("center outside image")?;
    println!(
        "{label}: center = rgba({}, {}, {}, {})",
        center.red(),
        center.green(),
        center.blue(),
        center.alpha()
    );
    Ok(())
}
