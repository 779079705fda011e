use std::collections::VecDeque;

use crate::layer::LayerStack;
use crate::log_info;

/// Default undo depth.
pub const DEFAULT_MAX_UNDO_STEPS: usize = 50;
/// Default memory cap for stored snapshots (100 MB).
pub const DEFAULT_MAX_HISTORY_BYTES: usize = 100 * 1024 * 1024;

// ============================================================================
// SNAPSHOT ENTRY
// ============================================================================

/// Full copy of the layer stack (current index included) taken before a
/// mutation.  Raster payloads are shared `Arc`s, so a snapshot is cheap.
#[derive(Clone, Debug)]
pub struct Snapshot {
    stack: LayerStack,
    description: String,
    memory: usize,
}

impl Snapshot {
    pub fn new(stack: LayerStack, description: impl Into<String>) -> Self {
        Self {
            memory: stack.memory_bytes(),
            stack,
            description: description.into(),
        }
    }

    pub fn capture(stack: &LayerStack, description: impl Into<String>) -> Self {
        Self::new(stack.clone(), description)
    }

    pub fn into_stack(self) -> LayerStack {
        self.stack
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn stack(&self) -> &LayerStack {
        &self.stack
    }

    /// Swap the snapshot's state into `stack`, returning the state it replaced.
    fn restore_into(self, stack: &mut LayerStack) -> Snapshot {
        let previous = std::mem::replace(stack, self.stack);
        Snapshot::new(previous, self.description)
    }
}

// ============================================================================
// HISTORY MANAGER
// ============================================================================

/// Linear undo/redo over layer-stack snapshots.
///
/// The undo list holds states *before* each mutation; the present state is
/// never in it.  Any new mutation clears the redo list.
pub struct HistoryManager {
    undo_stack: VecDeque<Snapshot>,
    redo_stack: VecDeque<Snapshot>,
    max_history_size: usize,
    /// Optional memory cap in bytes.
    max_memory_bytes: Option<usize>,
    /// Running memory total across both stacks.
    total_memory: usize,
}

impl Default for HistoryManager {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_UNDO_STEPS)
    }
}

impl HistoryManager {
    pub fn new(max_history_size: usize) -> Self {
        Self {
            undo_stack: VecDeque::new(),
            redo_stack: VecDeque::new(),
            max_history_size,
            max_memory_bytes: Some(DEFAULT_MAX_HISTORY_BYTES),
            total_memory: 0,
        }
    }

    pub fn with_memory_limit(mut self, max_bytes: Option<usize>) -> Self {
        self.max_memory_bytes = max_bytes;
        self
    }

    /// Snapshot `stack` as it is right now, before the caller mutates it.
    pub fn record_before_mutation(&mut self, stack: &LayerStack) {
        self.push(Snapshot::capture(stack, "Edit"));
    }

    /// Push a snapshot captured earlier (e.g. when a gesture began).
    pub fn push(&mut self, snapshot: Snapshot) {
        // Clear redo stack when a new action is performed
        for s in self.redo_stack.drain(..) {
            self.total_memory = self.total_memory.saturating_sub(s.memory);
        }

        self.total_memory += snapshot.memory;
        self.undo_stack.push_back(snapshot);

        self.prune();
    }

    /// Restore the most recent snapshot.  `false` (and no change) when empty.
    pub fn undo(&mut self, stack: &mut LayerStack) -> bool {
        let Some(snapshot) = self.undo_stack.pop_back() else {
            return false;
        };
        self.total_memory = self.total_memory.saturating_sub(snapshot.memory);
        let current = snapshot.restore_into(stack);
        self.total_memory += current.memory;
        self.redo_stack.push_back(current);
        true
    }

    /// Re-apply the most recently undone state.  `false` (and no change) when empty.
    pub fn redo(&mut self, stack: &mut LayerStack) -> bool {
        let Some(snapshot) = self.redo_stack.pop_back() else {
            return false;
        };
        self.total_memory = self.total_memory.saturating_sub(snapshot.memory);
        let current = snapshot.restore_into(stack);
        self.total_memory += current.memory;
        self.undo_stack.push_back(current);
        true
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_count(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_count(&self) -> usize {
        self.redo_stack.len()
    }

    pub fn undo_description(&self) -> Option<&str> {
        self.undo_stack.back().map(Snapshot::description)
    }

    pub fn redo_description(&self) -> Option<&str> {
        self.redo_stack.back().map(Snapshot::description)
    }

    /// Get all undo descriptions (most recent first)
    pub fn undo_history(&self) -> Vec<&str> {
        self.undo_stack.iter().rev().map(Snapshot::description).collect()
    }

    /// Approximate bytes held by both stacks.
    pub fn memory_usage(&self) -> usize {
        self.total_memory
    }

    /// Prune old snapshots to stay within limits
    fn prune(&mut self) {
        let mut pruned = 0;
        while self.undo_stack.len() > self.max_history_size {
            if let Some(removed) = self.undo_stack.pop_front() {
                self.total_memory = self.total_memory.saturating_sub(removed.memory);
                pruned += 1;
            }
        }

        if let Some(max_bytes) = self.max_memory_bytes {
            while self.total_memory > max_bytes && self.undo_stack.len() > 1 {
                if let Some(removed) = self.undo_stack.pop_front() {
                    self.total_memory = self.total_memory.saturating_sub(removed.memory);
                    pruned += 1;
                }
            }
        }

        if pruned > 0 {
            log_info!("History: pruned {} oldest snapshot(s), {} remain", pruned, self.undo_stack.len());
        }
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.total_memory = 0;
    }
}
