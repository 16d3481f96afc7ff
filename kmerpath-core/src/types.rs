use serde::{Deserialize, Serialize};

/// Genomic offset of a k-mer. Signed so that horizon arithmetic near the
/// start of a contig can go negative without wrapping.
pub type Position = i64;

/// Closed interval `[start, end]` of positions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Interval {
    pub start: Position,
    pub end: Position,
}

impl Interval {
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    /// `end - start`, saturating at the `Position` limits
    pub fn width(&self) -> Position {
        self.end.saturating_sub(self.start)
    }

    /// Interval moved by `delta` positions, saturating at the `Position` limits
    pub fn shifted(&self, delta: Position) -> Self {
        Self::new(self.start.saturating_add(delta), self.end.saturating_add(delta))
    }

    /// Closed interval overlap test
    pub fn overlaps(&self, other: &Interval) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

/// One interval-weighted k-mer record from the input stream. Immutable once
/// constructed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Observation {
    kmer: u64,
    interval: Interval,
    reference: bool,
    weight: u32,
}

impl Observation {
    pub fn new(kmer: u64, start: Position, end: Position, reference: bool, weight: u32) -> Self {
        Self {
            kmer,
            interval: Interval::new(start, end),
            reference,
            weight,
        }
    }

    /// 2-bit packed k-mer
    pub fn kmer(&self) -> u64 {
        self.kmer
    }

    pub fn interval(&self) -> Interval {
        self.interval
    }

    /// Whether the k-mer supports the reference allele
    pub fn is_reference(&self) -> bool {
        self.reference
    }

    /// Supporting evidence weight
    pub fn weight(&self) -> u32 {
        self.weight
    }

    pub fn start(&self) -> Position {
        self.interval.start
    }

    pub fn end(&self) -> Position {
        self.interval.end
    }

    pub fn width(&self) -> Position {
        self.interval.width()
    }

    /// True if `next` continues this observation in a compacted run: same
    /// reference flag and an interval shifted by exactly one position.
    pub fn is_unit_shift_of(&self, next: &Observation) -> bool {
        self.reference == next.reference && self.interval.shifted(1) == next.interval
    }
}
