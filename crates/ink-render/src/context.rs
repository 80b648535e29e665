//! Render Context
//!
//! The target a render stack composes into: a pixmap positioned on the
//! logical plane plus a save/restore style clip stack.

use tiny_skia::{
    Color, FillRule, FilterQuality, Mask, Paint, Path, Pixmap, PixmapPaint, PixmapRef, Transform,
};

use crate::{CompositionMode, Point, Rect};

/// Render target with clip state
pub struct RenderContext<'a> {
    target: &'a mut Pixmap,
    origin: Point,
    /// Nested clips pushed by steps. `None` entries mean "unclipped".
    clips: Vec<Option<Mask>>,
    /// Clip installed by the stack for the step currently being visited
    step_clip: Option<Mask>,
    mode_override: Option<CompositionMode>,
}

impl<'a> RenderContext<'a> {
    /// Create a context whose target's top-left sits at `origin`
    pub fn new(target: &'a mut Pixmap, origin: Point) -> Self {
        Self {
            target,
            origin,
            clips: Vec::new(),
            step_clip: None,
            mode_override: None,
        }
    }

    pub fn origin(&self) -> Point {
        self.origin
    }

    /// Logical rectangle covered by the target
    pub fn bounds(&self) -> Rect {
        Rect::from_origin_size(
            self.origin,
            self.target.width() as i32,
            self.target.height() as i32,
        )
    }

    pub fn target(&self) -> &Pixmap {
        &*self.target
    }

    pub fn target_mut(&mut self) -> &mut Pixmap {
        &mut *self.target
    }

    /// Depth of the step-managed clip stack
    pub fn clip_depth(&self) -> usize {
        self.clips.len()
    }

    /// Mode to draw with, honoring a group override
    pub fn effective_mode(&self, own: CompositionMode) -> CompositionMode {
        self.mode_override.unwrap_or(own)
    }

    pub(crate) fn set_mode_override(&mut self, mode: Option<CompositionMode>) {
        self.mode_override = mode;
    }

    pub(crate) fn set_step_clip(&mut self, clip: Option<Mask>) {
        self.step_clip = clip;
    }

    /// Current clip of the nesting stack
    fn top_clip(&self) -> Option<&Mask> {
        self.clips.last().and_then(|m| m.as_ref())
    }

    /// Start a new clip level from the current one
    fn derive_clip(&self) -> Option<Mask> {
        match self.top_clip() {
            Some(mask) => Some(mask.clone()),
            None => full_mask(self.target.width(), self.target.height()),
        }
    }

    /// Push a copy of the current clip, to be undone by `pop_clip`
    pub fn save(&mut self) {
        let current = self.clips.last().cloned().flatten();
        self.clips.push(current);
    }

    /// Push a clip that hides `rect` (logical coordinates)
    pub fn push_exclude(&mut self, rect: Rect) {
        let mut mask = self.derive_clip();
        if let Some(mask) = mask.as_mut() {
            let local = rect.translated(-self.origin.x, -self.origin.y);
            set_rect(mask, local, 0);
        }
        self.clips.push(mask);
    }

    /// Push a clip that keeps only `rect` (logical coordinates)
    pub fn push_clip_rect(&mut self, rect: Rect) {
        let mut mask = self.derive_clip();
        if let Some(mask) = mask.as_mut() {
            let local = rect.translated(-self.origin.x, -self.origin.y);
            let keep = local.intersection(&Rect::new(
                0,
                0,
                mask.width() as i32,
                mask.height() as i32,
            ));
            let width = mask.width() as usize;
            for (y, row) in mask.data_mut().chunks_exact_mut(width).enumerate() {
                let y = y as i32;
                for (x, value) in row.iter_mut().enumerate() {
                    if !keep.contains_point(x as i32, y) {
                        *value = 0;
                    }
                }
            }
        }
        self.clips.push(mask);
    }

    /// Push a clip from a prebuilt coverage mask (must match target size)
    pub fn push_mask(&mut self, coverage: &Mask) {
        let mut mask = self.derive_clip();
        if let Some(mask) = mask.as_mut() {
            intersect_masks(mask, coverage);
        }
        self.clips.push(mask);
    }

    /// Restore the clip that was active before the matching push
    pub fn pop_clip(&mut self) -> bool {
        self.clips.pop().is_some()
    }

    /// Clip combining the nesting stack and the per-step clip
    fn effective_clip(&self) -> Option<Mask> {
        match (self.top_clip(), self.step_clip.as_ref()) {
            (None, None) => None,
            (Some(a), None) => Some(a.clone()),
            (None, Some(b)) => Some(b.clone()),
            (Some(a), Some(b)) => {
                let mut combined = a.clone();
                intersect_masks(&mut combined, b);
                Some(combined)
            }
        }
    }

    /// Draw a pixmap whose top-left lands at `at` (logical coordinates)
    pub fn draw_pixmap(&mut self, at: Point, src: PixmapRef, mode: CompositionMode, alpha: u8) {
        let clip = self.effective_clip();
        let paint = PixmapPaint {
            opacity: alpha as f32 / 255.0,
            blend_mode: self.effective_mode(mode).blend_mode(),
            quality: FilterQuality::Nearest,
        };
        self.target.draw_pixmap(
            at.x - self.origin.x,
            at.y - self.origin.y,
            src,
            &paint,
            Transform::identity(),
            clip.as_ref(),
        );
    }

    /// Fill a logical rectangle with a solid color
    pub fn fill_rect(&mut self, rect: Rect, color: Color, mode: CompositionMode) {
        let Some(local) = rect.translated(-self.origin.x, -self.origin.y).to_skia_rect() else {
            return;
        };
        let clip = self.effective_clip();
        let mut paint = Paint::default();
        paint.set_color(color);
        paint.anti_alias = false;
        paint.blend_mode = self.effective_mode(mode).blend_mode();
        self.target.fill_rect(local, &paint, Transform::identity(), clip.as_ref());
    }

    /// Fill a path given in logical coordinates
    pub fn fill_path(&mut self, path: &Path, paint: &Paint) {
        let clip = self.effective_clip();
        let transform = Transform::from_translate(-self.origin.x as f32, -self.origin.y as f32);
        self.target
            .fill_path(path, paint, FillRule::Winding, transform, clip.as_ref());
    }

    /// Build a subtractive mask for `path` (logical coordinates) sized to the target
    pub fn exclusion_mask_for_path(&self, path: &Path) -> Option<Mask> {
        let mut mask = Mask::new(self.target.width(), self.target.height())?;
        mask.fill_path(
            path,
            FillRule::Winding,
            true,
            Transform::from_translate(-self.origin.x as f32, -self.origin.y as f32),
        );
        invert_mask(&mut mask);
        Some(mask)
    }

    /// Build a subtractive mask for a set of rectangles sized to the target
    pub fn exclusion_mask_for_region(&self, region: &[Rect]) -> Option<Mask> {
        let mut mask = full_mask(self.target.width(), self.target.height())?;
        for rect in region {
            set_rect(&mut mask, rect.translated(-self.origin.x, -self.origin.y), 0);
        }
        Some(mask)
    }
}

/// Mask that lets everything through
pub(crate) fn full_mask(width: u32, height: u32) -> Option<Mask> {
    let mut mask = Mask::new(width, height)?;
    mask.data_mut().fill(255);
    Some(mask)
}

/// Set every coverage value inside `local` (mask coordinates) to `value`
fn set_rect(mask: &mut Mask, local: Rect, value: u8) {
    let width = mask.width() as i32;
    let bounds = Rect::new(0, 0, width, mask.height() as i32);
    let hit = local.intersection(&bounds);
    if hit.is_empty() {
        return;
    }
    let data = mask.data_mut();
    for y in hit.top()..hit.bottom() {
        let start = (y * width + hit.left()) as usize;
        data[start..start + hit.width as usize].fill(value);
    }
}

/// Multiply coverage of `dst` by `src` (same dimensions)
pub(crate) fn intersect_masks(dst: &mut Mask, src: &Mask) {
    debug_assert_eq!((dst.width(), dst.height()), (src.width(), src.height()));
    for (d, s) in dst.data_mut().iter_mut().zip(src.data()) {
        *d = ((*d as u16 * *s as u16 + 127) / 255) as u8;
    }
}

fn invert_mask(mask: &mut Mask) {
    for v in mask.data_mut() {
        *v = 255 - *v;
    }
}
