//! At most one pre-warmed connection per worker class.
//!
//! The pool only tracks which slot holds the spare and whether its handshake
//! has finished; the connection itself lives in the slot arena.

use super::slots::SlotKey;
use super::types::{ByClass, WorkerClass};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Spare {
    key: SlotKey,
    ready: bool,
}

#[derive(Debug, Default)]
pub struct SpareConnectionPool {
    spares: ByClass<Option<Spare>>,
}

impl SpareConnectionPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `class` has a spare, ready or still connecting.
    pub fn has_spare(&self, class: WorkerClass) -> bool {
        self.spares.get(class).is_some()
    }

    /// Record a spare whose handshake is in flight.
    ///
    /// Returns `false` if the class already has one.
    pub fn begin(&mut self, key: SlotKey) -> bool {
        let slot = self.spares.get_mut(key.class);
        if slot.is_some() {
            return false;
        }
        *slot = Some(Spare { key, ready: false });
        true
    }

    /// Mark the spare in `key` as connected. Returns `false` if `key` is not
    /// the current spare.
    pub fn mark_ready(&mut self, key: SlotKey) -> bool {
        match self.spares.get_mut(key.class) {
            Some(spare) if spare.key == key => {
                spare.ready = true;
                true
            }
            _ => false,
        }
    }

    /// Take the spare if it is connected. A taken spare is gone for good.
    pub fn claim_if_available(&mut self, class: WorkerClass) -> Option<SlotKey> {
        if !self.spares.get(class).is_some_and(|spare| spare.ready) {
            return None;
        }
        self.spares.get_mut(class).take().map(|spare| spare.key)
    }

    /// Forget the spare in `key` (it died or failed to connect).
    pub fn discard(&mut self, key: SlotKey) -> bool {
        let slot = self.spares.get_mut(key.class);
        if slot.is_some_and(|spare| spare.key == key) {
            *slot = None;
            true
        } else {
            false
        }
    }

    pub fn is_spare(&self, key: SlotKey) -> bool {
        self.spares
            .get(key.class)
            .is_some_and(|spare| spare.key == key)
    }
}
