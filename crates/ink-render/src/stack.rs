//! Render Stack
//!
//! Ordered, rebuildable collection of render steps.
//!
//! Contributors are connected once and asked to fill a [`StackBuilder`]
//! whenever the stack is rebuilt. The builder is frozen into an immutable
//! [`StackSnapshot`]; renders iterate a snapshot, so a rebuild never mutates
//! an ordering that is being rendered, and snapshots can be handed to other
//! threads for background composition.
//!
//! Ordering: every step has a key made of its group path followed by its
//! priority, compared lexicographically (a shorter prefix sorts first, ties
//! keep registration order). A child group at index `i` therefore orders
//! like a step of priority `i` inside its parent.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, Weak};

use tiny_skia::{Mask, Path, Pixmap};

use crate::context::{full_mask, intersect_masks};
use crate::{CompositionMode, Rect, RenderContext, RenderError, RenderStep};

/// Hierarchical group path (e.g. layer-group nesting)
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupAddress(Vec<u32>);

impl GroupAddress {
    /// The top-level group
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn from_path(path: impl Into<Vec<u32>>) -> Self {
        Self(path.into())
    }

    /// Address of the child group at `index`
    pub fn child(&self, index: u32) -> Self {
        let mut path = self.0.clone();
        path.push(index);
        Self(path)
    }

    pub fn parent(&self) -> Option<Self> {
        let (_, rest) = self.0.split_last()?;
        Some(Self(rest.to_vec()))
    }

    pub fn path(&self) -> &[u32] {
        &self.0
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    /// Check if `other` is this group or nested inside it
    pub fn contains(&self, other: &GroupAddress) -> bool {
        other.0.starts_with(&self.0)
    }

    fn sort_key(&self, priority: f64) -> Vec<f64> {
        self.0.iter().map(|&i| i as f64).chain(std::iter::once(priority)).collect()
    }
}

fn compare_keys(a: &[f64], b: &[f64]) -> Ordering {
    for (x, y) in a.iter().zip(b) {
        match x.total_cmp(y) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    a.len().cmp(&b.len())
}

/// Shape removed from the clip of the steps a mask applies to
#[derive(Debug, Clone)]
pub enum MaskShape {
    /// Union of rectangles in logical coordinates
    Region(Vec<Rect>),
    /// Filled path in logical coordinates
    Path(Path),
}

/// Subtractive clip scoped to a group and priority
#[derive(Debug, Clone)]
pub struct StackMask {
    pub group: GroupAddress,
    pub priority: f64,
    pub shape: MaskShape,
}

impl StackMask {
    fn exclusion(&self, ctx: &RenderContext<'_>) -> Option<Mask> {
        match &self.shape {
            MaskShape::Region(rects) => ctx.exclusion_mask_for_region(rects),
            MaskShape::Path(path) => ctx.exclusion_mask_for_path(path),
        }
    }
}

struct PendingStep {
    step: Weak<dyn RenderStep>,
    group: GroupAddress,
    priority: f64,
}

/// Transient collector filled by contributors during a rebuild
#[derive(Default)]
pub struct StackBuilder {
    steps: Vec<PendingStep>,
    masks: Vec<StackMask>,
    modes: HashMap<GroupAddress, CompositionMode>,
}

impl StackBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a step (held weakly)
    pub fn add_step<S: RenderStep + 'static>(&mut self, step: &Arc<S>, group: GroupAddress, priority: f64) {
        let weak = Arc::downgrade(step);
        let weak: Weak<dyn RenderStep> = weak;
        self.add_weak_step(weak, group, priority);
    }

    /// Register an already-downgraded step
    pub fn add_weak_step(&mut self, step: Weak<dyn RenderStep>, group: GroupAddress, priority: f64) {
        self.steps.push(PendingStep { step, group, priority });
    }

    /// Register a subtractive mask for lower-priority steps of `group` and its descendants
    pub fn add_mask(&mut self, group: GroupAddress, priority: f64, shape: MaskShape) {
        self.masks.push(StackMask { group, priority, shape });
    }

    /// Override the composition mode of every step in `group` and its descendants
    pub fn set_composition_mode(&mut self, group: GroupAddress, mode: CompositionMode) {
        self.modes.insert(group, mode);
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// Freeze into an immutable ordering
    pub fn freeze(self, generation: u64) -> StackSnapshot {
        let mask_keys: Vec<Vec<f64>> = self
            .masks
            .iter()
            .map(|m| m.group.sort_key(m.priority))
            .collect();

        let mut entries: Vec<ResolvedStep> = self
            .steps
            .into_iter()
            .map(|pending| {
                let key = pending.group.sort_key(pending.priority);
                let masks = self
                    .masks
                    .iter()
                    .zip(&mask_keys)
                    .enumerate()
                    .filter(|(_, (mask, mask_key))| {
                        mask.group.contains(&pending.group)
                            && compare_keys(&key, mask_key) == Ordering::Less
                    })
                    .map(|(index, _)| index)
                    .collect();
                let mode = nearest_override(&self.modes, &pending.group);
                ResolvedStep {
                    step: pending.step,
                    group: pending.group,
                    priority: pending.priority,
                    key,
                    masks,
                    mode,
                }
            })
            .collect();

        // Stable: equal keys keep registration order
        entries.sort_by(|a, b| compare_keys(&a.key, &b.key));

        StackSnapshot {
            entries,
            masks: self.masks,
            generation,
        }
    }
}

fn nearest_override(
    modes: &HashMap<GroupAddress, CompositionMode>,
    group: &GroupAddress,
) -> Option<CompositionMode> {
    let mut current = Some(group.clone());
    while let Some(address) = current {
        if let Some(mode) = modes.get(&address) {
            return Some(*mode);
        }
        current = address.parent();
    }
    None
}

struct ResolvedStep {
    step: Weak<dyn RenderStep>,
    group: GroupAddress,
    priority: f64,
    key: Vec<f64>,
    masks: Vec<usize>,
    mode: Option<CompositionMode>,
}

/// Outcome of one render pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderResult {
    pub steps_rendered: usize,
    pub steps_skipped: usize,
}

/// Immutable, frozen step ordering
pub struct StackSnapshot {
    entries: Vec<ResolvedStep>,
    masks: Vec<StackMask>,
    generation: u64,
}

impl StackSnapshot {
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
            masks: Vec::new(),
            generation: 0,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn masks(&self) -> &[StackMask] {
        &self.masks
    }

    /// Group and priority of every entry in push order
    pub fn order(&self) -> Vec<(GroupAddress, f64)> {
        self.entries
            .iter()
            .map(|e| (e.group.clone(), e.priority))
            .collect()
    }

    /// Number of entries whose step has been dropped
    pub fn expired_count(&self) -> usize {
        self.entries.iter().filter(|e| e.step.strong_count() == 0).count()
    }

    /// Union of the area hints of all live steps
    pub fn area_hint(&self) -> Rect {
        self.entries
            .iter()
            .filter_map(|e| e.step.upgrade())
            .fold(Rect::EMPTY, |acc, step| acc.union(&step.area_hint()))
    }

    fn step_clip(&self, entry: &ResolvedStep, ctx: &RenderContext<'_>) -> Option<Mask> {
        if entry.masks.is_empty() {
            return None;
        }
        let target = ctx.target();
        let mut clip = full_mask(target.width(), target.height())?;
        for &index in &entry.masks {
            if let Some(exclusion) = self.masks[index].exclusion(ctx) {
                intersect_masks(&mut clip, &exclusion);
            }
        }
        Some(clip)
    }

    /// Visit `on_push` in order, then `on_pop` in reverse order
    pub fn render(&self, ctx: &mut RenderContext<'_>) -> RenderResult {
        // Hold strong references for the whole pass so nothing vanishes between push and pop
        let live: Vec<(&ResolvedStep, Arc<dyn RenderStep>)> = self
            .entries
            .iter()
            .filter_map(|e| e.step.upgrade().map(|step| (e, step)))
            .collect();
        let skipped = self.entries.len() - live.len();
        if skipped > 0 {
            tracing::trace!("Skipping {} vanished render steps", skipped);
        }

        let clips: Vec<Option<Mask>> = live
            .iter()
            .map(|(entry, _)| self.step_clip(entry, ctx))
            .collect();

        for ((entry, step), clip) in live.iter().zip(&clips) {
            ctx.set_step_clip(clip.clone());
            ctx.set_mode_override(entry.mode);
            step.on_push(ctx);
        }
        for ((entry, step), clip) in live.iter().zip(&clips).rev() {
            ctx.set_step_clip(clip.clone());
            ctx.set_mode_override(entry.mode);
            step.on_pop(ctx);
        }
        ctx.set_step_clip(None);
        ctx.set_mode_override(None);

        RenderResult {
            steps_rendered: live.len(),
            steps_skipped: skipped,
        }
    }

    /// Copy without expired entries
    fn pruned(&self, generation: u64) -> Self {
        Self {
            entries: self
                .entries
                .iter()
                .filter(|e| e.step.strong_count() > 0)
                .map(|e| ResolvedStep {
                    step: e.step.clone(),
                    group: e.group.clone(),
                    priority: e.priority,
                    key: e.key.clone(),
                    masks: e.masks.clone(),
                    mode: e.mode,
                })
                .collect(),
            masks: self.masks.clone(),
            generation,
        }
    }
}

/// Handle identifying a connected contributor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContributorId(u64);

type Contributor = Box<dyn FnMut(&mut StackBuilder) + Send>;

/// Ordered, rebuildable stack of render steps
pub struct RenderStack {
    contributors: Vec<(ContributorId, Contributor)>,
    next_id: u64,
    committed: Arc<StackSnapshot>,
    needs_rebuild: bool,
    generation: u64,
}

impl Default for RenderStack {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderStack {
    pub fn new() -> Self {
        Self {
            contributors: Vec::new(),
            next_id: 0,
            committed: Arc::new(StackSnapshot::empty()),
            needs_rebuild: false,
            generation: 0,
        }
    }

    /// Connect a contributor that registers steps on every rebuild
    pub fn connect<F>(&mut self, contributor: F) -> ContributorId
    where
        F: FnMut(&mut StackBuilder) + Send + 'static,
    {
        let id = ContributorId(self.next_id);
        self.next_id += 1;
        self.contributors.push((id, Box::new(contributor)));
        self.needs_rebuild = true;
        id
    }

    /// Disconnect a contributor
    pub fn disconnect(&mut self, id: ContributorId) -> bool {
        let before = self.contributors.len();
        self.contributors.retain(|(cid, _)| *cid != id);
        let removed = self.contributors.len() != before;
        if removed {
            self.needs_rebuild = true;
        }
        removed
    }

    /// Mark the ordering stale; the next render rebuilds it
    pub fn request_rebuild(&mut self) {
        self.needs_rebuild = true;
    }

    pub fn needs_rebuild(&self) -> bool {
        self.needs_rebuild
    }

    /// Collect contributions and commit a new ordering
    pub fn rebuild(&mut self) {
        let mut builder = StackBuilder::new();
        for (_, contributor) in self.contributors.iter_mut() {
            contributor(&mut builder);
        }
        self.generation += 1;
        let snapshot = builder.freeze(self.generation);
        tracing::debug!(
            "Rebuilt render stack: {} steps, {} masks (generation {})",
            snapshot.len(),
            snapshot.masks.len(),
            self.generation
        );
        self.committed = Arc::new(snapshot);
        self.needs_rebuild = false;
    }

    /// Committed ordering, usable from any thread
    pub fn snapshot(&self) -> Arc<StackSnapshot> {
        Arc::clone(&self.committed)
    }

    /// Drop entries whose step has been destroyed
    pub fn prune(&mut self) -> usize {
        let expired = self.committed.expired_count();
        if expired > 0 {
            self.generation += 1;
            self.committed = Arc::new(self.committed.pruned(self.generation));
        }
        expired
    }

    pub fn area_hint(&self) -> Rect {
        self.committed.area_hint()
    }

    /// Render the current ordering, rebuilding first if requested
    pub fn render(&mut self, ctx: &mut RenderContext<'_>) -> RenderResult {
        if self.needs_rebuild {
            self.rebuild();
        }
        let snapshot = self.snapshot();
        snapshot.render(ctx)
    }

    /// Render `rect` into a new transparent pixmap
    pub fn flatten(&mut self, rect: Rect) -> Result<Pixmap, RenderError> {
        let mut pixmap = new_pixmap(rect)?;
        let mut ctx = RenderContext::new(&mut pixmap, rect.origin());
        self.render(&mut ctx);
        Ok(pixmap)
    }
}

fn new_pixmap(rect: Rect) -> Result<Pixmap, RenderError> {
    let invalid = RenderError::InvalidTarget {
        width: rect.width,
        height: rect.height,
    };
    if rect.is_empty() {
        return Err(invalid);
    }
    Pixmap::new(rect.width as u32, rect.height as u32).ok_or(invalid)
}
