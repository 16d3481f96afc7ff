//! Compacted path nodes and the arena holding nodes under construction

use crate::error::{CompactError, CompactResult};
use crate::kmer::KmerEncoding;
use crate::types::{Observation, Position};
use fnv::FnvHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Identifier of a compacted node: the arrival index of its first observation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u64);

/// An unbranched run of observations with its graph edges
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompactedNode {
    id: NodeId,
    observations: Vec<Observation>,
    predecessors: BTreeSet<NodeId>,
    successors: BTreeSet<NodeId>,
}

impl CompactedNode {
    fn new(id: NodeId, first: Observation) -> Self {
        Self {
            id,
            observations: vec![first],
            predecessors: BTreeSet::new(),
            successors: BTreeSet::new(),
        }
    }

    /// Assemble a node from its parts, e.g. when reloading a dumped graph.
    /// No run or edge invariants are checked; see [`crate::verify`].
    pub fn from_parts(
        id: NodeId,
        observations: Vec<Observation>,
        predecessors: BTreeSet<NodeId>,
        successors: BTreeSet<NodeId>,
    ) -> Self {
        Self {
            id,
            observations,
            predecessors,
            successors,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Observations of the run in path order
    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn predecessors(&self) -> &BTreeSet<NodeId> {
        &self.predecessors
    }

    pub fn successors(&self) -> &BTreeSet<NodeId> {
        &self.successors
    }

    fn first(&self) -> &Observation {
        &self.observations[0]
    }

    fn last(&self) -> &Observation {
        &self.observations[self.observations.len() - 1]
    }

    pub fn first_start(&self) -> Position {
        self.first().start()
    }

    pub fn first_end(&self) -> Position {
        self.first().end()
    }

    pub fn last_start(&self) -> Position {
        self.last().start()
    }

    pub fn last_end(&self) -> Position {
        self.last().end()
    }

    pub fn is_reference(&self) -> bool {
        self.first().is_reference()
    }

    pub fn total_weight(&self) -> u64 {
        self.observations.iter().map(|o| o.weight() as u64).sum()
    }

    /// True if the node has an edge to itself
    pub fn is_self_adjacent(&self) -> bool {
        self.successors.contains(&self.id)
    }

    /// Sequence spelled by the run: the first k-mer followed by the last
    /// base of each subsequent k-mer.
    pub fn bases(&self, encoding: &KmerEncoding) -> Vec<u8> {
        let mut seq = Vec::with_capacity(encoding.k() + self.len() - 1);
        seq.extend(encoding.decode(self.first().kmer()));
        seq.extend(self.observations[1..].iter().map(|o| encoding.last_base(o.kmer())));
        seq
    }
}

/// Nodes still reachable by the compactor, indexed by id
#[derive(Debug, Default)]
pub(crate) struct NodeArena {
    nodes: FnvHashMap<NodeId, CompactedNode>,
}

impl NodeArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn create(&mut self, id: NodeId, first: Observation) -> CompactResult<()> {
        if self.nodes.contains_key(&id) {
            return Err(CompactError::internal(format!("node {:?} created twice", id)));
        }
        self.nodes.insert(id, CompactedNode::new(id, first));
        Ok(())
    }

    pub fn get(&self, id: NodeId) -> CompactResult<&CompactedNode> {
        self.nodes
            .get(&id)
            .ok_or_else(|| CompactError::internal(format!("node {:?} is not in the arena", id)))
    }

    fn get_mut(&mut self, id: NodeId) -> CompactResult<&mut CompactedNode> {
        self.nodes
            .get_mut(&id)
            .ok_or_else(|| CompactError::internal(format!("node {:?} is not in the arena", id)))
    }

    /// Extend a run by one observation
    pub fn append(&mut self, id: NodeId, observation: Observation, max_len: usize) -> CompactResult<()> {
        let node = self.get_mut(id)?;
        if node.len() >= max_len {
            return Err(CompactError::internal(format!(
                "node {:?} would exceed the maximum run length of {}",
                id, max_len
            )));
        }
        node.observations.push(observation);
        Ok(())
    }

    /// Add a directed edge. Edge sets deduplicate so self edges reached from
    /// both directions are stored once.
    pub fn add_edge(&mut self, from: NodeId, to: NodeId) -> CompactResult<()> {
        if !self.nodes.contains_key(&to) {
            return Err(CompactError::internal(format!(
                "edge {:?} -> {:?} targets a released node",
                from, to
            )));
        }
        self.get_mut(from)?.successors.insert(to);
        self.get_mut(to)?.predecessors.insert(from);
        Ok(())
    }

    pub fn take(&mut self, id: NodeId) -> CompactResult<CompactedNode> {
        self.nodes
            .remove(&id)
            .ok_or_else(|| CompactError::internal(format!("node {:?} released twice", id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(kmer: u64, start: Position, weight: u32) -> Observation {
        Observation::new(kmer, start, start, false, weight)
    }

    #[test]
    fn test_node_accessors() {
        let enc = KmerEncoding::new(3).unwrap();
        let mut arena = NodeArena::new();
        let id = NodeId(7);
        arena.create(id, obs(enc.encode(b"ACG").unwrap(), 10, 2)).unwrap();
        arena.append(id, obs(enc.encode(b"CGT").unwrap(), 11, 3), 4).unwrap();
        arena.append(id, obs(enc.encode(b"GTT").unwrap(), 12, 5), 4).unwrap();

        let node = arena.take(id).unwrap();
        assert_eq!(node.len(), 3);
        assert_eq!(node.first_start(), 10);
        assert_eq!(node.last_end(), 12);
        assert_eq!(node.total_weight(), 10);
        assert_eq!(node.bases(&enc), b"ACGTT");
        assert!(arena.take(id).is_err());
    }

    #[test]
    fn test_append_respects_cap() {
        let mut arena = NodeArena::new();
        arena.create(NodeId(0), obs(0, 0, 1)).unwrap();
        arena.append(NodeId(0), obs(0, 1, 1), 2).unwrap();
        let err = arena.append(NodeId(0), obs(0, 2, 1), 2).unwrap_err();
        assert!(!err.is_precondition());
    }

    #[test]
    fn test_edges_are_symmetric_and_deduplicated() {
        let mut arena = NodeArena::new();
        arena.create(NodeId(0), obs(0, 0, 1)).unwrap();
        arena.create(NodeId(1), obs(0, 1, 1)).unwrap();
        arena.add_edge(NodeId(0), NodeId(1)).unwrap();
        arena.add_edge(NodeId(0), NodeId(1)).unwrap();
        arena.add_edge(NodeId(1), NodeId(1)).unwrap();

        let a = arena.take(NodeId(0)).unwrap();
        assert_eq!(a.successors().len(), 1);
        assert!(a.predecessors().is_empty());
        assert!(arena.add_edge(NodeId(1), NodeId(0)).is_err());

        let b = arena.take(NodeId(1)).unwrap();
        assert!(b.is_self_adjacent());
        assert_eq!(b.predecessors().iter().copied().collect::<Vec<_>>(), vec![NodeId(0), NodeId(1)]);
    }
}
