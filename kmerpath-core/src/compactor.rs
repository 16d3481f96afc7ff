//! Streaming path node compaction
//!
//! Transforms a start position sorted stream of k-mer observations into a
//! first position sorted stream of [`CompactedNode`]s with graph edges.
//!
//! Observations are held in a window until no unseen observation can be
//! adjacent to them. With a maximum interval width `W`, once every
//! observation starting before `S` has arrived, an observation ending before
//! `S - W - 2` is processed: it either continues the run of its unique
//! predecessor, starts a new node, or proposes to continue into its unique
//! successor. A proposal is only realised when the successor is processed
//! and confirms it has no other predecessor. Finished nodes wait in a ready
//! queue until their last position is another `W + 2` behind the horizon,
//! at which point all of their edges are known.

use crate::config::CompactorConfig;
use crate::error::{CompactError, CompactResult};
use crate::kmer::{Direction, KmerEncoding};
use crate::node::{CompactedNode, NodeArena, NodeId};
use crate::types::{Observation, Position};
use crate::window::{ItemId, ItemState, WindowIndex, WorkItem};
use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap};
use std::iter::{FusedIterator, Peekable};

/// Counters describing a compaction run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompactorStats {
    /// Observations read from the input
    pub observations: u64,
    /// Nodes yielded to the caller
    pub nodes_emitted: u64,
    /// Observations appended to an existing run
    pub merges: u64,
    /// Merge proposals withdrawn because the successor had several predecessors
    pub revoked_merges: u64,
    /// Largest number of observations held in the window at once
    pub peak_window: usize,
}

/// Iterator adapter compacting observations into path nodes
pub struct PathNodeCompactor<I: Iterator<Item = Observation>> {
    input: Peekable<I>,
    config: CompactorConfig,
    encoding: KmerEncoding,
    window: WindowIndex,
    /// Unprocessed items by (end, arrival)
    active: BinaryHeap<Reverse<(Position, u64, ItemId)>>,
    /// Finished nodes by (first start, id) with the tail item of their run
    ready: BinaryHeap<Reverse<(Position, NodeId, ItemId)>>,
    /// (start, arrival) keys of unprocessed items and of nodes still under
    /// construction. Nothing sorting after the smallest key may be released.
    open: BTreeSet<(Position, u64)>,
    nodes: NodeArena,
    last_start: Option<Position>,
    /// Every item ending before this position has been processed
    horizon: Position,
    next_seq: u64,
    exhausted: bool,
    failed: bool,
    stats: CompactorStats,
}

impl<I: Iterator<Item = Observation>> PathNodeCompactor<I> {
    pub fn new<T>(input: T, config: CompactorConfig) -> CompactResult<Self>
    where
        T: IntoIterator<Item = Observation, IntoIter = I>,
    {
        config.validate()?;
        let encoding = KmerEncoding::new(config.key_length as usize)?;
        Ok(Self {
            input: input.into_iter().peekable(),
            config,
            encoding,
            window: WindowIndex::new(),
            active: BinaryHeap::new(),
            ready: BinaryHeap::new(),
            open: BTreeSet::new(),
            nodes: NodeArena::new(),
            last_start: None,
            horizon: Position::MIN,
            next_seq: 0,
            exhausted: false,
            failed: false,
            stats: CompactorStats::default(),
        })
    }

    pub fn encoding(&self) -> &KmerEncoding {
        &self.encoding
    }

    pub fn stats(&self) -> CompactorStats {
        self.stats
    }

    /// Number of observations currently held in the window
    pub fn buffered(&self) -> usize {
        self.window.len()
    }

    fn item(&self, id: ItemId) -> CompactResult<&WorkItem> {
        self.window
            .get(id)
            .ok_or_else(|| CompactError::internal(format!("work item {} is not in the window", id)))
    }

    fn item_mut(&mut self, id: ItemId) -> CompactResult<&mut WorkItem> {
        self.window
            .get_mut(id)
            .ok_or_else(|| CompactError::internal(format!("work item {} is not in the window", id)))
    }

    fn node_of(&self, id: ItemId) -> CompactResult<NodeId> {
        let item = self.item(id)?;
        item.node.ok_or_else(|| {
            CompactError::internal(format!("observation {} has no path node", item.seq))
        })
    }

    /// Pull input until the head of the ready queue can be released or the
    /// input runs out.
    fn fill(&mut self) -> CompactResult<()> {
        while !self.exhausted && !self.head_releasable()? {
            match self.input.next() {
                Some(first) => {
                    let start = first.start();
                    self.admit(first)?;
                    while let Some(next) = self.input.next_if(|o| o.start() == start) {
                        self.admit(next)?;
                    }
                    self.advance_horizon(start)?;
                }
                None => self.finish_input()?,
            }
        }
        Ok(())
    }

    fn admit(&mut self, observation: Observation) -> CompactResult<()> {
        let (start, end) = (observation.start(), observation.end());
        if end < start {
            return Err(CompactError::InvertedInterval { start, end });
        }
        let max_width = self.config.max_observation_width;
        match end.checked_sub(start) {
            Some(width) if width <= max_width as Position => {}
            width => {
                return Err(CompactError::WidthExceeded {
                    start,
                    end,
                    width: width.unwrap_or(Position::MAX),
                    max_width,
                })
            }
        }
        let margin = self.config.margin();
        if start < Position::MIN + margin || end > Position::MAX - margin {
            return Err(CompactError::PositionOutOfRange { start, end, margin });
        }
        if !self.encoding.is_valid(observation.kmer()) {
            return Err(CompactError::KmerOutOfRange {
                kmer: observation.kmer(),
                k: self.encoding.k(),
            });
        }
        if let Some(previous) = self.last_start {
            if start < previous {
                return Err(CompactError::UnsortedInput { previous, start });
            }
        }
        self.last_start = Some(start);

        let seq = self.next_seq;
        self.next_seq += 1;
        let id = self.window.register(observation, seq);
        self.active.push(Reverse((end, seq, id)));
        self.open.insert((start, seq));
        self.stats.observations += 1;
        self.stats.peak_window = self.stats.peak_window.max(self.window.len());
        Ok(())
    }

    /// All observations starting at or before `latest_start` have arrived
    fn advance_horizon(&mut self, latest_start: Position) -> CompactResult<()> {
        let horizon = latest_start.saturating_sub(self.config.margin());
        self.drain(Some(horizon))?;
        self.horizon = horizon;
        Ok(())
    }

    fn finish_input(&mut self) -> CompactResult<()> {
        self.exhausted = true;
        self.drain(None)?;
        self.horizon = Position::MAX;
        log::debug!(
            "Compacted {} observations: {} merges, {} revoked merges, peak window {}",
            self.stats.observations,
            self.stats.merges,
            self.stats.revoked_merges,
            self.stats.peak_window
        );
        Ok(())
    }

    /// Process active items ending before `before`, or all of them
    fn drain(&mut self, before: Option<Position>) -> CompactResult<()> {
        while let Some(&Reverse((end, _, id))) = self.active.peek() {
            if before.map_or(false, |horizon| end >= horizon) {
                break;
            }
            self.active.pop();
            self.process(id)?;
        }
        Ok(())
    }

    fn process(&mut self, g: ItemId) -> CompactResult<()> {
        let (observation, seq) = {
            let item = self.item(g)?;
            if item.state != ItemState::Unprocessed {
                return Err(CompactError::internal(format!(
                    "observation {} processed twice",
                    item.seq
                )));
            }
            (item.observation.clone(), item.seq)
        };
        // Active is ordered by end position so every exact predecessor has
        // already been processed, but wider overlapping neighbours on either
        // side may not have been.
        let prevs = self.window.adjacent(g, &self.encoding, Direction::Backward);
        let nexts = self.window.adjacent(g, &self.encoding, Direction::Forward);

        let merged_from = self.resolve_proposals(g, &observation, &prevs)?;
        let node = match merged_from {
            Some(p) => {
                self.open.remove(&(observation.start(), seq));
                self.node_of(p)?
            }
            None => {
                let id = NodeId(seq);
                self.nodes.create(id, observation.clone())?;
                self.item_mut(g)?.node = Some(id);
                id
            }
        };

        for &q in &prevs {
            if Some(q) == merged_from {
                continue;
            }
            if let Some(from) = self.item(q)?.node {
                self.nodes.add_edge(from, node)?;
            }
        }
        for &s in &nexts {
            if let Some(to) = self.item(s)?.node {
                self.nodes.add_edge(node, to)?;
            }
        }

        let run_len = self.nodes.get(node)?.len();
        let target = match nexts.as_slice() {
            [s] if run_len < self.config.max_run_length as usize => {
                let next = self.item(*s)?;
                if observation.is_unit_shift_of(&next.observation) {
                    if next.state != ItemState::Unprocessed {
                        return Err(CompactError::internal(format!(
                            "observation {} proposes to merge into already processed observation {}",
                            seq, next.seq
                        )));
                    }
                    Some(*s)
                } else {
                    None
                }
            }
            _ => None,
        };
        match target {
            Some(s) => self.item_mut(g)?.state = ItemState::MergePending(s),
            None => {
                self.item_mut(g)?.state = ItemState::Finalized;
                self.push_ready(g)?;
            }
        }
        Ok(())
    }

    /// Realise a predecessor's merge proposal into `g` when that predecessor
    /// is the only one. Proposals into a `g` with several predecessors are
    /// withdrawn and their runs finished.
    fn resolve_proposals(
        &mut self,
        g: ItemId,
        observation: &Observation,
        prevs: &[ItemId],
    ) -> CompactResult<Option<ItemId>> {
        if let [p] = *prevs {
            let pred = self.item(p)?;
            if pred.merge_target() != Some(g) {
                return Ok(None);
            }
            let node = pred.node.ok_or_else(|| {
                CompactError::internal(format!("merge source {} has no path node", pred.seq))
            })?;
            if !pred.observation.is_unit_shift_of(observation)
                || !self.encoding.is_next(pred.observation.kmer(), observation.kmer())
            {
                return Err(CompactError::internal(format!(
                    "merge source {} is not a unit shift predecessor of {:?}",
                    pred.seq, observation.interval()
                )));
            }
            self.nodes
                .append(node, observation.clone(), self.config.max_run_length as usize)?;
            self.item_mut(p)?.state = ItemState::Merged;
            let item = self.item_mut(g)?;
            item.node = Some(node);
            item.back_link = Some(p);
            self.stats.merges += 1;
            log::trace!("Extended node {:?} to {:?}", node, observation.interval());
            return Ok(Some(p));
        }

        let mut withdrawn = Vec::new();
        for &q in prevs {
            if self.item(q)?.merge_target() == Some(g) {
                withdrawn.push((self.node_of(q)?, q));
            }
        }
        withdrawn.sort_unstable();
        for (node, q) in withdrawn {
            log::trace!("Withdrew merge of node {:?}: successor has multiple predecessors", node);
            self.item_mut(q)?.state = ItemState::Finalized;
            self.push_ready(q)?;
            self.stats.revoked_merges += 1;
        }
        Ok(None)
    }

    fn push_ready(&mut self, tail: ItemId) -> CompactResult<()> {
        let node = self.node_of(tail)?;
        let first_start = self.nodes.get(node)?.first_start();
        self.open.remove(&(first_start, node.0));
        self.ready.push(Reverse((first_start, node, tail)));
        Ok(())
    }

    /// The ready head can be released once no later observation can attach
    /// an edge to it and no unfinished node can still sort ahead of it.
    fn head_releasable(&self) -> CompactResult<bool> {
        let Some(&Reverse((first_start, id, _))) = self.ready.peek() else {
            return Ok(false);
        };
        if self.exhausted {
            return Ok(true);
        }
        let edges_complete =
            self.nodes.get(id)?.last_end() < self.horizon.saturating_sub(self.config.margin());
        let ahead_of_open = self
            .open
            .first()
            .map_or(true, |&key| (first_start, id.0) < key);
        Ok(edges_complete && ahead_of_open)
    }

    fn release(&mut self) -> CompactResult<Option<CompactedNode>> {
        let Some(Reverse((_, id, tail))) = self.ready.pop() else {
            return Ok(None);
        };
        let node = self.nodes.take(id)?;
        let retired = self.window.retire(tail);
        if retired != node.len() {
            return Err(CompactError::internal(format!(
                "node {:?} has {} observations but {} were retired from the window",
                id,
                node.len(),
                retired
            )));
        }
        self.stats.nodes_emitted += 1;
        log::trace!(
            "Released node {:?} [{}, {}] length {}",
            id,
            node.first_start(),
            node.last_end(),
            node.len()
        );
        Ok(Some(node))
    }

    fn advance(&mut self) -> CompactResult<Option<CompactedNode>> {
        self.fill()?;
        if self.ready.is_empty() {
            if !self.window.is_empty() || !self.nodes.is_empty() {
                return Err(CompactError::internal(format!(
                    "input exhausted with {} observations and {} nodes unreleased",
                    self.window.len(),
                    self.nodes.len()
                )));
            }
            return Ok(None);
        }
        self.release()
    }
}

impl<I: Iterator<Item = Observation>> Iterator for PathNodeCompactor<I> {
    type Item = CompactResult<CompactedNode>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.advance() {
            Ok(node) => node.map(Ok),
            Err(err) => {
                self.failed = true;
                log::error!("Path node compaction aborted: {}", err);
                Some(Err(err))
            }
        }
    }
}

impl<I: Iterator<Item = Observation>> FusedIterator for PathNodeCompactor<I> {}

/// Compact a complete observation stream into a vector of nodes
pub fn compact_all<T>(input: T, config: CompactorConfig) -> CompactResult<Vec<CompactedNode>>
where
    T: IntoIterator<Item = Observation>,
{
    PathNodeCompactor::new(input, config)?.collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::iter::Empty;

    type TestCompactor = PathNodeCompactor<Empty<Observation>>;

    fn compactor(width: u32, max_run_length: u32) -> TestCompactor {
        PathNodeCompactor::new(std::iter::empty(), CompactorConfig::new(3, width, max_run_length)).unwrap()
    }

    fn obs(c: &TestCompactor, bases: &[u8], start: Position, end: Position) -> Observation {
        Observation::new(c.encoding().encode(bases).unwrap(), start, end, false, 1)
    }

    fn state_of(c: &TestCompactor, seq: u64) -> ItemState {
        (0..64)
            .filter_map(|id| c.window.get(id))
            .find(|item| item.seq == seq)
            .map(|item| item.state)
            .unwrap()
    }

    #[test]
    fn test_horizon_boundary() {
        let width = 2;
        let mut c = compactor(width, 16);
        let s: Position = 20;
        let margin = width as Position + 2;
        let below = obs(&c, b"AAC", s - margin - 3, s - margin - 1);
        let at = obs(&c, b"CCG", s - margin - 2, s - margin);
        let above = obs(&c, b"GGT", s - margin - 1, s - margin + 1);
        for o in [below, at, above] {
            c.admit(o).unwrap();
        }

        c.advance_horizon(s).unwrap();
        assert_eq!(state_of(&c, 0), ItemState::Finalized);
        assert_eq!(state_of(&c, 1), ItemState::Unprocessed);
        assert_eq!(state_of(&c, 2), ItemState::Unprocessed);

        c.advance_horizon(s + 1).unwrap();
        assert_eq!(state_of(&c, 1), ItemState::Finalized);
        assert_eq!(state_of(&c, 2), ItemState::Unprocessed);

        c.advance_horizon(s + 2).unwrap();
        assert_eq!(state_of(&c, 2), ItemState::Finalized);
    }

    #[test]
    fn test_release_waits_for_edge_completion() {
        let width = 1;
        let mut c = compactor(width, 16);
        let margin = width as Position + 2;
        c.admit(obs(&c, b"ACG", 10, 11)).unwrap();

        // processed once the horizon passes its end
        c.advance_horizon(11 + margin + 1).unwrap();
        assert_eq!(state_of(&c, 0), ItemState::Finalized);
        assert!(!c.head_releasable().unwrap());

        // released once its end is a further margin behind the horizon
        c.advance_horizon(11 + 2 * margin).unwrap();
        assert!(!c.head_releasable().unwrap());
        c.advance_horizon(11 + 2 * margin + 1).unwrap();
        assert!(c.head_releasable().unwrap());
        let node = c.release().unwrap().unwrap();
        assert_eq!(node.first_start(), 10);
        assert!(c.window.is_empty());
    }

    #[test]
    fn test_merge_proposal_confirmed() {
        let mut c = compactor(0, 16);
        c.admit(obs(&c, b"ACG", 1, 1)).unwrap();
        c.admit(obs(&c, b"CGT", 2, 2)).unwrap();

        c.advance_horizon(4).unwrap();
        assert!(matches!(state_of(&c, 0), ItemState::MergePending(_)));
        assert_eq!(state_of(&c, 1), ItemState::Unprocessed);

        c.advance_horizon(5).unwrap();
        assert_eq!(state_of(&c, 0), ItemState::Merged);
        assert_eq!(state_of(&c, 1), ItemState::Finalized);
        assert_eq!(c.stats().merges, 1);
        assert_eq!(c.ready.len(), 1);
    }

    #[test]
    fn test_merge_proposal_withdrawn_on_branch() {
        let mut c = compactor(0, 16);
        c.admit(obs(&c, b"ACG", 1, 1)).unwrap();
        c.admit(obs(&c, b"TCG", 1, 1)).unwrap();
        c.admit(obs(&c, b"CGT", 2, 2)).unwrap();

        c.advance_horizon(4).unwrap();
        assert!(matches!(state_of(&c, 0), ItemState::MergePending(_)));
        assert!(matches!(state_of(&c, 1), ItemState::MergePending(_)));

        c.advance_horizon(5).unwrap();
        assert_eq!(state_of(&c, 0), ItemState::Finalized);
        assert_eq!(state_of(&c, 1), ItemState::Finalized);
        assert_eq!(state_of(&c, 2), ItemState::Finalized);
        assert_eq!(c.stats().revoked_merges, 2);
        assert_eq!(c.stats().merges, 0);
    }

    #[test]
    fn test_open_run_blocks_later_nodes() {
        let mut c = compactor(0, 16);
        let chain: Vec<&[u8]> = b"AACGAGCATC".windows(3).collect();
        for (i, kmer) in chain[..3].iter().enumerate() {
            c.admit(obs(&c, kmer, i as Position, i as Position)).unwrap();
        }
        // an unrelated single node starting inside the run
        c.admit(obs(&c, b"TTT", 2, 2)).unwrap();
        for (i, kmer) in chain.iter().enumerate().skip(3) {
            c.admit(obs(&c, kmer, i as Position, i as Position)).unwrap();
        }

        c.advance_horizon(9).unwrap();
        assert_eq!(state_of(&c, 3), ItemState::Finalized);
        assert!(matches!(state_of(&c, 7), ItemState::MergePending(_)));
        // TTT is edge complete but the run starting at 0 is still open
        assert!(!c.head_releasable().unwrap());

        c.advance_horizon(12).unwrap();
        assert!(c.head_releasable().unwrap());
        let run = c.release().unwrap().unwrap();
        assert_eq!((run.first_start(), run.len()), (0, 8));
        assert!(c.head_releasable().unwrap());
        let single = c.release().unwrap().unwrap();
        assert_eq!((single.first_start(), single.len()), (2, 1));
        assert!(c.window.is_empty());
    }

    #[test]
    fn test_precondition_errors() {
        let mut c = compactor(2, 16);
        let wide = obs(&c, b"ACG", 0, 3);
        assert!(matches!(c.admit(wide), Err(CompactError::WidthExceeded { .. })));
        let inverted = obs(&c, b"ACG", 5, 4);
        assert!(matches!(c.admit(inverted), Err(CompactError::InvertedInterval { .. })));
        assert!(matches!(
            c.admit(Observation::new(1 << 6, 0, 0, false, 1)),
            Err(CompactError::KmerOutOfRange { .. })
        ));
        c.admit(obs(&c, b"ACG", 5, 5)).unwrap();
        let unsorted = obs(&c, b"ACG", 4, 4);
        assert!(matches!(c.admit(unsorted), Err(CompactError::UnsortedInput { previous: 5, start: 4 })));
    }

    #[test]
    fn test_extreme_positions_rejected() {
        let mut c = compactor(4, 16);
        let huge = obs(&c, b"ACG", Position::MIN, Position::MAX);
        assert!(matches!(
            c.admit(huge),
            Err(CompactError::WidthExceeded { width: Position::MAX, max_width: 4, .. })
        ));
        let low = obs(&c, b"ACG", Position::MIN + 5, Position::MIN + 5);
        assert!(matches!(c.admit(low), Err(CompactError::PositionOutOfRange { margin: 6, .. })));

        let enc = KmerEncoding::new(3).unwrap();
        let last = Observation::new(enc.encode(b"ACG").unwrap(), Position::MAX, Position::MAX, false, 1);
        let err = compact_all(vec![last], CompactorConfig::new(3, 0, 8)).unwrap_err();
        assert_eq!(
            err,
            CompactError::PositionOutOfRange { start: Position::MAX, end: Position::MAX, margin: 2 }
        );
        assert!(err.is_precondition());

        let near = Position::MAX - 2;
        let nodes = compact_all(
            vec![Observation::new(enc.encode(b"ACG").unwrap(), near, near, false, 1)],
            CompactorConfig::new(3, 0, 8),
        )
        .unwrap();
        assert_eq!(nodes.len(), 1);
    }

    #[test]
    fn test_iterator_fuses_after_error() {
        let enc = KmerEncoding::new(3).unwrap();
        let input = vec![
            Observation::new(enc.encode(b"ACG").unwrap(), 5, 5, false, 1),
            Observation::new(enc.encode(b"CGT").unwrap(), 1, 1, false, 1),
        ];
        let mut it = PathNodeCompactor::new(input, CompactorConfig::new(3, 0, 8)).unwrap();
        let err = it.next().unwrap().unwrap_err();
        assert!(err.is_precondition());
        assert!(it.next().is_none());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = PathNodeCompactor::new(Vec::<Observation>::new(), CompactorConfig::new(0, 1, 1));
        assert!(matches!(result, Err(CompactError::InvalidConfig(_))));
    }
}
