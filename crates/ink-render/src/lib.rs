//! Ink Render - Composition Pipeline
//!
//! Ordered visual contributions ("render steps") composed into a target
//! pixmap using tiny-skia.
//!
//! This crate provides:
//! - Integer geometry on the unbounded logical plane
//! - Composition modes mapped onto tiny-skia blend modes
//! - A render context with a push/pop clip stack
//! - The `RenderStep` trait and a rebuildable `RenderStack`

mod composition;
mod context;
mod geometry;
mod step;
pub mod stack;

pub use composition::CompositionMode;
pub use context::RenderContext;
pub use geometry::{Point, Rect};
pub use stack::{
    ContributorId, GroupAddress, MaskShape, RenderResult, RenderStack, StackBuilder, StackMask,
    StackSnapshot,
};
pub use step::{FillStep, RenderStep};

pub use tiny_skia;

/// Render error
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("Invalid render target: {width}x{height}")]
    InvalidTarget { width: i32, height: i32 },
}
