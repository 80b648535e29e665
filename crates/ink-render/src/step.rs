//! Render Steps
//!
//! A render step is one visual contribution to a composed image. Steps are
//! visited twice per render: `on_push` in stack order (install state such as
//! clips), then `on_pop` in reverse order (restore that state and draw).

use crate::{Rect, RenderContext};

/// Unit of visual contribution with push/pop composition semantics
pub trait RenderStep: Send + Sync {
    /// Advisory bounds of what this step may touch, for invalidation
    fn area_hint(&self) -> Rect;

    /// Called top-to-bottom before anything is drawn
    fn on_push(&self, _ctx: &mut RenderContext<'_>) {}

    /// Called bottom-to-top; draws the step and undoes `on_push`
    fn on_pop(&self, ctx: &mut RenderContext<'_>);
}

/// Solid color step, used for backgrounds and checkerboard fills
#[derive(Debug, Clone)]
pub struct FillStep {
    pub rect: Rect,
    pub color: tiny_skia::Color,
    pub mode: crate::CompositionMode,
}

impl FillStep {
    pub fn new(rect: Rect, color: tiny_skia::Color) -> Self {
        Self {
            rect,
            color,
            mode: crate::CompositionMode::SourceOver,
        }
    }
}

impl RenderStep for FillStep {
    fn area_hint(&self) -> Rect {
        self.rect
    }

    fn on_pop(&self, ctx: &mut RenderContext<'_>) {
        ctx.fill_rect(self.rect, self.color, self.mode);
    }
}
