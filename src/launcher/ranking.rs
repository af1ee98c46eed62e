//! Priority order over live connections, used to pick eviction victims.
//!
//! Entries sort most important first: importance descending, foreground before
//! background, shallow before deep, recently touched before stale. The last
//! entry of a class is the cheapest one to kill.
//!
//! Each class keeps a `BTreeMap` keyed by the full rank tuple plus a side index
//! from slot key to rank key, so insert, update, remove and the lowest-ranked
//! lookup are all O(log n).

use super::slots::SlotKey;
use super::types::{ByClass, ChildImportance, WorkerClass};
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};

/// A ranked connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankingEntry {
    pub key: SlotKey,
    pub foreground: bool,
    pub depth: u32,
    pub importance: ChildImportance,
    /// Bumped on every insert and update; higher is more recent.
    pub recency: u64,
}

/// Sort key: smaller means more important. Field order is the comparison order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct RankKey {
    importance: Reverse<ChildImportance>,
    foreground: Reverse<bool>,
    depth: u32,
    recency: Reverse<u64>,
}

impl RankKey {
    fn of(entry: &RankingEntry) -> Self {
        Self {
            importance: Reverse(entry.importance),
            foreground: Reverse(entry.foreground),
            depth: entry.depth,
            recency: Reverse(entry.recency),
        }
    }
}

#[derive(Debug, Default)]
struct ClassRanking {
    order: BTreeMap<RankKey, RankingEntry>,
    index: HashMap<SlotKey, RankKey>,
}

/// Ranking over all live connections, partitioned by class.
#[derive(Debug, Default)]
pub struct ProcessRanking {
    classes: ByClass<ClassRanking>,
    next_recency: u64,
}

impl ProcessRanking {
    pub fn new() -> Self {
        Self::default()
    }

    fn bump(&mut self) -> u64 {
        self.next_recency += 1;
        self.next_recency
    }

    /// Add a connection. Re-inserting an existing key acts as an update.
    pub fn insert(
        &mut self,
        key: SlotKey,
        foreground: bool,
        depth: u32,
        importance: ChildImportance,
    ) {
        self.remove(key);
        let entry = RankingEntry {
            key,
            foreground,
            depth,
            importance,
            recency: self.bump(),
        };
        let rank = RankKey::of(&entry);
        let class = self.classes.get_mut(key.class);
        class.order.insert(rank, entry);
        class.index.insert(key, rank);
    }

    /// Change a connection's rank inputs. Unknown keys are ignored.
    pub fn update(
        &mut self,
        key: SlotKey,
        foreground: bool,
        depth: u32,
        importance: ChildImportance,
    ) {
        if self.contains(key) {
            self.insert(key, foreground, depth, importance);
        }
    }

    /// Drop a connection. Returns its last entry, if it was ranked.
    pub fn remove(&mut self, key: SlotKey) -> Option<RankingEntry> {
        let class = self.classes.get_mut(key.class);
        let rank = class.index.remove(&key)?;
        class.order.remove(&rank)
    }

    pub fn contains(&self, key: SlotKey) -> bool {
        self.classes.get(key.class).index.contains_key(&key)
    }

    pub fn entry(&self, key: SlotKey) -> Option<&RankingEntry> {
        let class = self.classes.get(key.class);
        let rank = class.index.get(&key)?;
        class.order.get(rank)
    }

    /// The best eviction candidate of `class`.
    pub fn lowest_ranked(&self, class: WorkerClass) -> Option<&RankingEntry> {
        self.classes
            .get(class)
            .order
            .last_key_value()
            .map(|(_, entry)| entry)
    }

    /// Entries of `class`, most important first.
    pub fn iter(&self, class: WorkerClass) -> impl Iterator<Item = &RankingEntry> {
        self.classes.get(class).order.values()
    }

    pub fn len(&self, class: WorkerClass) -> usize {
        self.classes.get(class).order.len()
    }

    pub fn is_empty(&self, class: WorkerClass) -> bool {
        self.len(class) == 0
    }
}
