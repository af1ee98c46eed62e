//! Fixed-capacity slot arena for one worker class.
//!
//! Slots are addressed by [`SlotKey`]: an index plus a generation counter that
//! is bumped whenever a slot is freed. Other launcher structures hold keys, not
//! connections, so a key that outlived its occupant simply fails to resolve.

use super::types::WorkerClass;

/// Generational index of a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotKey {
    pub class: WorkerClass,
    pub index: usize,
    pub generation: u64,
}

impl std::fmt::Display for SlotKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}.{}", self.class, self.index, self.generation)
    }
}

#[derive(Debug)]
struct Slot<T> {
    generation: u64,
    occupant: Option<T>,
}

/// Owns every occupant of one class. Capacity never changes.
#[derive(Debug)]
pub struct SlotAllocator<T> {
    class: WorkerClass,
    slots: Vec<Slot<T>>,
    free: Vec<usize>,
}

impl<T> SlotAllocator<T> {
    pub fn new(class: WorkerClass, capacity: usize) -> Self {
        let slots = (0..capacity)
            .map(|_| Slot {
                generation: 0,
                occupant: None,
            })
            .collect();
        // Pop from the back so the lowest index is handed out first.
        let free = (0..capacity).rev().collect();
        Self { class, slots, free }
    }

    pub fn class(&self) -> WorkerClass {
        self.class
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn allocated_count(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn is_full(&self) -> bool {
        self.free.is_empty()
    }

    /// Place `occupant` in a free slot.
    ///
    /// Hands the occupant back untouched when every slot is taken; the caller
    /// decides whether to evict.
    pub fn try_claim(&mut self, occupant: T) -> Result<SlotKey, T> {
        let Some(index) = self.free.pop() else {
            return Err(occupant);
        };
        let slot = &mut self.slots[index];
        slot.occupant = Some(occupant);
        Ok(SlotKey {
            class: self.class,
            index,
            generation: slot.generation,
        })
    }

    /// Free the slot and return its occupant. Stale keys return `None`.
    pub fn release(&mut self, key: SlotKey) -> Option<T> {
        let slot = self.live_slot_mut(key)?;
        let occupant = slot.occupant.take();
        slot.generation += 1;
        self.free.push(key.index);
        occupant
    }

    pub fn get(&self, key: SlotKey) -> Option<&T> {
        if key.class != self.class {
            return None;
        }
        let slot = self.slots.get(key.index)?;
        if slot.generation != key.generation {
            return None;
        }
        slot.occupant.as_ref()
    }

    pub fn get_mut(&mut self, key: SlotKey) -> Option<&mut T> {
        self.live_slot_mut(key)?.occupant.as_mut()
    }

    pub fn contains(&self, key: SlotKey) -> bool {
        self.get(key).is_some()
    }

    /// Iterate over occupied slots.
    pub fn iter(&self) -> impl Iterator<Item = (SlotKey, &T)> {
        let class = self.class;
        self.slots.iter().enumerate().filter_map(move |(index, slot)| {
            slot.occupant.as_ref().map(|occupant| {
                (
                    SlotKey {
                        class,
                        index,
                        generation: slot.generation,
                    },
                    occupant,
                )
            })
        })
    }

    /// Keys of occupied slots.
    pub fn keys(&self) -> Vec<SlotKey> {
        self.iter().map(|(key, _)| key).collect()
    }

    fn live_slot_mut(&mut self, key: SlotKey) -> Option<&mut Slot<T>> {
        if key.class != self.class {
            return None;
        }
        let slot = self.slots.get_mut(key.index)?;
        if slot.generation != key.generation || slot.occupant.is_none() {
            return None;
        }
        Some(slot)
    }
}
