//! In-flight observations indexed by k-mer for adjacency lookups

use crate::kmer::{Direction, KmerEncoding};
use crate::node::NodeId;
use crate::types::Observation;
use fnv::FnvHashMap;

/// Slot index of a work item in the window
pub(crate) type ItemId = usize;

/// Processing state of a work item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ItemState {
    Unprocessed,
    /// Wants to continue its run into the given successor
    MergePending(ItemId),
    /// Its run was continued by its successor
    Merged,
    /// Tail of a node waiting in the ready queue
    Finalized,
}

#[derive(Debug)]
pub(crate) struct WorkItem {
    pub observation: Observation,
    /// Arrival index
    pub seq: u64,
    pub node: Option<NodeId>,
    pub state: ItemState,
    /// Previous item of the same run
    pub back_link: Option<ItemId>,
}

impl WorkItem {
    pub fn merge_target(&self) -> Option<ItemId> {
        match self.state {
            ItemState::MergePending(target) => Some(target),
            _ => None,
        }
    }
}

/// Work items keyed by k-mer. Slots are recycled once a run is retired.
#[derive(Debug, Default)]
pub(crate) struct WindowIndex {
    slots: Vec<Option<WorkItem>>,
    free: Vec<ItemId>,
    by_kmer: FnvHashMap<u64, Vec<ItemId>>,
    len: usize,
}

impl WindowIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn register(&mut self, observation: Observation, seq: u64) -> ItemId {
        let kmer = observation.kmer();
        let item = WorkItem {
            observation,
            seq,
            node: None,
            state: ItemState::Unprocessed,
            back_link: None,
        };
        let id = match self.free.pop() {
            Some(id) => {
                self.slots[id] = Some(item);
                id
            }
            None => {
                self.slots.push(Some(item));
                self.slots.len() - 1
            }
        };
        self.by_kmer.entry(kmer).or_default().push(id);
        self.len += 1;
        id
    }

    pub fn get(&self, id: ItemId) -> Option<&WorkItem> {
        self.slots.get(id).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, id: ItemId) -> Option<&mut WorkItem> {
        self.slots.get_mut(id).and_then(Option::as_mut)
    }

    /// Items whose k-mer is a one-base extension of `id`'s k-mer in the
    /// given direction and whose interval overlaps `id`'s interval shifted
    /// one position that way. Exact unit-shift adjacency is left to the
    /// caller.
    pub fn adjacent(&self, id: ItemId, encoding: &KmerEncoding, direction: Direction) -> Vec<ItemId> {
        let mut adj = Vec::with_capacity(4);
        let Some(item) = self.get(id) else {
            return adj;
        };
        let delta = match direction {
            Direction::Forward => 1,
            Direction::Backward => -1,
        };
        let target = item.observation.interval().shifted(delta);
        for kmer in encoding.states(item.observation.kmer(), direction) {
            if let Some(ids) = self.by_kmer.get(&kmer) {
                adj.extend(ids.iter().copied().filter(|&other| {
                    self.get(other)
                        .map_or(false, |o| o.observation.interval().overlaps(&target))
                }));
            }
        }
        adj
    }

    /// Remove `tail` and every item of its run, following back-links.
    /// Returns the number of items removed.
    pub fn retire(&mut self, tail: ItemId) -> usize {
        let mut removed = 0;
        let mut cursor = Some(tail);
        while let Some(id) = cursor {
            let Some(item) = self.slots.get_mut(id).and_then(Option::take) else {
                break;
            };
            let kmer = item.observation.kmer();
            if let Some(ids) = self.by_kmer.get_mut(&kmer) {
                if let Some(pos) = ids.iter().position(|&other| other == id) {
                    ids.remove(pos);
                }
                if ids.is_empty() {
                    self.by_kmer.remove(&kmer);
                }
            }
            self.free.push(id);
            self.len -= 1;
            removed += 1;
            cursor = item.back_link;
        }
        removed
    }
}
