//! Diff History
//!
//! Undo/redo stacks of `RasterDiff`s under a memory budget.

use std::collections::VecDeque;

use crate::{RasterConfig, RasterDiff, RasterError};

/// Undo/redo history
#[derive(Debug)]
pub struct DiffHistory {
    undo: VecDeque<RasterDiff>,
    redo: Vec<RasterDiff>,
    limit_bytes: usize,
    compress: bool,
}

impl DiffHistory {
    pub fn new(config: &RasterConfig) -> Self {
        Self {
            undo: VecDeque::new(),
            redo: Vec::new(),
            limit_bytes: config.history_limit_bytes,
            compress: config.compress_history,
        }
    }

    /// Commit `diff` onto its destination and record it
    ///
    /// Clears the redo stack. The oldest entries are evicted while the
    /// history exceeds its budget; the newest entry is always kept.
    pub fn push(&mut self, mut diff: RasterDiff) -> Result<(), RasterError> {
        diff.apply()?;
        if self.compress {
            diff.compress();
        }
        self.redo.clear();
        self.undo.push_back(diff);
        self.enforce_budget();
        Ok(())
    }

    /// Revert the most recent change; `false` when there is nothing to undo
    pub fn undo(&mut self) -> Result<bool, RasterError> {
        let Some(diff) = self.undo.pop_back() else {
            return Ok(false);
        };
        if let Err(e) = diff.apply() {
            self.undo.push_back(diff);
            return Err(e);
        }
        self.redo.push(diff);
        Ok(true)
    }

    /// Re-apply the most recently undone change
    pub fn redo(&mut self) -> Result<bool, RasterError> {
        let Some(diff) = self.redo.pop() else {
            return Ok(false);
        };
        if let Err(e) = diff.apply() {
            self.redo.push(diff);
            return Err(e);
        }
        self.undo.push_back(diff);
        Ok(true)
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    pub fn undo_len(&self) -> usize {
        self.undo.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo.len()
    }

    /// Bytes held by all recorded diffs
    pub fn memory_size(&self) -> usize {
        self.undo
            .iter()
            .chain(self.redo.iter())
            .map(RasterDiff::memory_size)
            .sum()
    }

    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }

    fn enforce_budget(&mut self) {
        let mut evicted = 0;
        while self.undo.len() > 1 && self.memory_size() > self.limit_bytes {
            self.undo.pop_front();
            evicted += 1;
        }
        if evicted > 0 {
            tracing::debug!(
                "Evicted {} diff(s) from history, {} bytes retained",
                evicted,
                self.memory_size()
            );
        }
    }
}

impl Default for DiffHistory {
    fn default() -> Self {
        Self::new(&RasterConfig::default())
    }
}
