//! Moderate-binding management for recently visible sandboxed workers.
//!
//! The manager keeps a recency list of workers that were brought to the
//! foreground, bounded by the sandboxed slot capacity. Every tracked worker
//! holds one extra moderate binding owned by the manager while the application
//! is in the foreground. Sending the application to the background drops those
//! bindings in bulk; bringing it back restores them.
//!
//! The manager never touches connections itself. Each operation returns the
//! binding changes for the launcher to apply, in order.

use super::slots::SlotKey;
use std::collections::VecDeque;

/// A binding change the launcher must apply to a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingAction {
    /// Add the manager's moderate binding.
    Add(SlotKey),
    /// Remove the manager's moderate binding.
    Remove(SlotKey),
}

#[derive(Debug)]
pub struct BindingManager {
    capacity: usize,
    /// Most recent first.
    recent: VecDeque<SlotKey>,
    in_background: bool,
}

impl BindingManager {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            recent: VecDeque::with_capacity(capacity + 1),
            in_background: false,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_in_background(&self) -> bool {
        self.in_background
    }

    /// Tracked workers, most recent first.
    pub fn tracked(&self) -> impl Iterator<Item = &SlotKey> {
        self.recent.iter()
    }

    /// Mark `key` as the most recently foregrounded worker.
    pub fn increase_recency(&mut self, key: SlotKey) -> Vec<BindingAction> {
        if let Some(pos) = self.recent.iter().position(|k| *k == key) {
            self.recent.remove(pos);
            self.recent.push_front(key);
            return Vec::new();
        }

        let mut actions = Vec::with_capacity(2);
        self.recent.push_front(key);
        if !self.in_background {
            actions.push(BindingAction::Add(key));
        }
        if self.recent.len() > self.capacity
            && let Some(evicted) = self.recent.pop_back()
            && !self.in_background
        {
            actions.push(BindingAction::Remove(evicted));
        }
        actions
    }

    /// Stop tracking `key`, typically because its worker died.
    pub fn drop_recency(&mut self, key: SlotKey) -> Option<BindingAction> {
        let pos = self.recent.iter().position(|k| *k == key)?;
        self.recent.remove(pos);
        (!self.in_background).then_some(BindingAction::Remove(key))
    }

    /// The application went to the background.
    pub fn on_sent_to_background(&mut self) -> Vec<BindingAction> {
        if self.in_background {
            return Vec::new();
        }
        self.in_background = true;
        self.recent.iter().copied().map(BindingAction::Remove).collect()
    }

    /// The application came back to the foreground.
    pub fn on_brought_to_foreground(&mut self) -> Vec<BindingAction> {
        if !self.in_background {
            return Vec::new();
        }
        self.in_background = false;
        self.recent.iter().copied().map(BindingAction::Add).collect()
    }
}
