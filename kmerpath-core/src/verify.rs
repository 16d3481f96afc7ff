//! Verification of compacted graphs
//!
//! Checks an emitted node sequence for run contiguity, the run length cap,
//! output order, edge symmetry and edge soundness, and checks that every
//! input observation was emitted exactly once.

use crate::kmer::KmerEncoding;
use crate::node::{CompactedNode, NodeId};
use crate::types::Observation;
use fnv::FnvHashMap;
use std::collections::BTreeSet;
use thiserror::Error;

/// A property of the compacted graph that does not hold
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Violation {
    #[error("Node {0:?} has no observations")]
    EmptyNode(NodeId),

    #[error("Node {0:?} emitted more than once")]
    DuplicateNode(NodeId),

    #[error("Node {node:?} has {len} observations, maximum is {max}")]
    RunTooLong { node: NodeId, len: usize, max: usize },

    #[error("Node {node:?} breaks its run at observation {index}")]
    BrokenRun { node: NodeId, index: usize },

    #[error("Node {node:?} emitted after {previous:?}")]
    OutOfOrder { previous: NodeId, node: NodeId },

    #[error("Edge {from:?} -> {to:?} points outside the graph")]
    DanglingEdge { from: NodeId, to: NodeId },

    #[error("Edge {from:?} -> {to:?} is missing its reverse entry")]
    AsymmetricEdge { from: NodeId, to: NodeId },

    #[error("Adjacent nodes {from:?} -> {to:?} have no edge")]
    MissingEdge { from: NodeId, to: NodeId },

    #[error("Edge {from:?} -> {to:?} joins non-adjacent nodes")]
    SpuriousEdge { from: NodeId, to: NodeId },

    #[error("Observation {0:?} was not emitted")]
    MissingObservation(Observation),

    #[error("Observation {0:?} was emitted but never read")]
    ExtraObservation(Observation),
}

/// Check the structural properties of an emitted node sequence
pub fn verify_graph(
    nodes: &[CompactedNode],
    encoding: &KmerEncoding,
    max_run_length: usize,
) -> Vec<Violation> {
    let mut violations = Vec::new();
    let mut index: FnvHashMap<NodeId, &CompactedNode> = FnvHashMap::default();

    for node in nodes {
        if index.insert(node.id(), node).is_some() {
            violations.push(Violation::DuplicateNode(node.id()));
        }
        if node.is_empty() {
            violations.push(Violation::EmptyNode(node.id()));
            continue;
        }
        if node.len() > max_run_length {
            violations.push(Violation::RunTooLong {
                node: node.id(),
                len: node.len(),
                max: max_run_length,
            });
        }
        for (i, pair) in node.observations().windows(2).enumerate() {
            if !pair[0].is_unit_shift_of(&pair[1]) || !encoding.is_next(pair[0].kmer(), pair[1].kmer()) {
                violations.push(Violation::BrokenRun { node: node.id(), index: i + 1 });
            }
        }
    }

    for pair in nodes.windows(2) {
        if pair[0].is_empty() || pair[1].is_empty() {
            continue;
        }
        if (pair[0].first_start(), pair[0].id()) >= (pair[1].first_start(), pair[1].id()) {
            violations.push(Violation::OutOfOrder {
                previous: pair[0].id(),
                node: pair[1].id(),
            });
        }
    }

    for node in nodes {
        for &to in node.successors() {
            match index.get(&to) {
                None => violations.push(Violation::DanglingEdge { from: node.id(), to }),
                Some(target) if !target.predecessors().contains(&node.id()) => {
                    violations.push(Violation::AsymmetricEdge { from: node.id(), to })
                }
                Some(_) => {}
            }
        }
        for &from in node.predecessors() {
            match index.get(&from) {
                None => violations.push(Violation::DanglingEdge { from, to: node.id() }),
                Some(source) if !source.successors().contains(&node.id()) => {
                    violations.push(Violation::AsymmetricEdge { from, to: node.id() })
                }
                Some(_) => {}
            }
        }
    }

    let expected = expected_edges(nodes, encoding);
    let actual: BTreeSet<(NodeId, NodeId)> = nodes
        .iter()
        .flat_map(|n| n.successors().iter().map(move |&to| (n.id(), to)))
        .collect();
    for &(from, to) in expected.difference(&actual) {
        violations.push(Violation::MissingEdge { from, to });
    }
    for &(from, to) in actual.difference(&expected) {
        if index.contains_key(&to) {
            violations.push(Violation::SpuriousEdge { from, to });
        }
    }

    violations
}

/// Edges implied by observation adjacency. Consecutive observations of the
/// same run are joined by the run itself, not by an edge.
fn expected_edges(nodes: &[CompactedNode], encoding: &KmerEncoding) -> BTreeSet<(NodeId, NodeId)> {
    let mut by_kmer: FnvHashMap<u64, Vec<(NodeId, usize, &Observation)>> = FnvHashMap::default();
    for node in nodes {
        for (i, o) in node.observations().iter().enumerate() {
            by_kmer.entry(o.kmer()).or_default().push((node.id(), i, o));
        }
    }

    let mut edges = BTreeSet::new();
    for node in nodes {
        for (i, o) in node.observations().iter().enumerate() {
            let target = o.interval().shifted(1);
            for kmer in encoding.next_states(o.kmer()) {
                let Some(candidates) = by_kmer.get(&kmer) else {
                    continue;
                };
                for &(other, j, next) in candidates {
                    if !next.interval().overlaps(&target) {
                        continue;
                    }
                    if other == node.id() && j == i + 1 {
                        continue;
                    }
                    edges.insert((node.id(), other));
                }
            }
        }
    }
    edges
}

/// Check that the emitted nodes hold exactly the input observations
pub fn verify_coverage(input: &[Observation], nodes: &[CompactedNode]) -> Vec<Violation> {
    let mut counts: FnvHashMap<&Observation, i64> = FnvHashMap::default();
    for o in input {
        *counts.entry(o).or_insert(0) += 1;
    }
    for o in nodes.iter().flat_map(|n| n.observations()) {
        *counts.entry(o).or_insert(0) -= 1;
    }

    let mut violations = Vec::new();
    for (o, count) in counts {
        for _ in 0..count.max(0) {
            violations.push(Violation::MissingObservation(o.clone()));
        }
        for _ in 0..(-count).max(0) {
            violations.push(Violation::ExtraObservation(o.clone()));
        }
    }
    violations
}
