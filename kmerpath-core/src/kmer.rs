//! 2-bit k-mer encoding and de Bruijn adjacency
//!
//! K-mers are packed with the first base in the most significant position,
//! so a forward extension shifts left and appends the new base in the low
//! bits.

use crate::error::{CompactError, CompactResult};

/// Largest k that fits in a `u64`
pub const MAX_K: usize = 32;

const BASES: [u8; 4] = [b'A', b'C', b'G', b'T'];

/// Encode a nucleotide to 2-bit representation
pub fn encode_nucleotide(nucleotide: u8) -> Option<u64> {
    match nucleotide.to_ascii_uppercase() {
        b'A' => Some(0),
        b'C' => Some(1),
        b'G' => Some(2),
        b'T' => Some(3),
        _ => None,
    }
}

/// Direction of a one-base extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Forward,
    Backward,
}

/// Fixed-length k-mer encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KmerEncoding {
    k: usize,
    mask: u64,
}

impl KmerEncoding {
    pub fn new(k: usize) -> CompactResult<Self> {
        if k == 0 || k > MAX_K {
            return Err(CompactError::invalid_config(format!(
                "k-mer length must be between 1 and {}, got {}",
                MAX_K, k
            )));
        }
        let mask = if k == MAX_K { u64::MAX } else { (1u64 << (2 * k)) - 1 };
        Ok(Self { k, mask })
    }

    pub fn k(&self) -> usize {
        self.k
    }

    /// True if `kmer` has no bits set beyond the k-mer length
    pub fn is_valid(&self, kmer: u64) -> bool {
        kmer & !self.mask == 0
    }

    /// K-mers reachable by appending one base
    pub fn next_states(&self, kmer: u64) -> [u64; 4] {
        let shifted = (kmer << 2) & self.mask;
        [shifted, shifted | 1, shifted | 2, shifted | 3]
    }

    /// K-mers reachable by prepending one base
    pub fn prev_states(&self, kmer: u64) -> [u64; 4] {
        let shifted = kmer >> 2;
        let high = 2 * (self.k - 1);
        [
            shifted,
            shifted | (1 << high),
            shifted | (2 << high),
            shifted | (3 << high),
        ]
    }

    pub fn states(&self, kmer: u64, direction: Direction) -> [u64; 4] {
        match direction {
            Direction::Forward => self.next_states(kmer),
            Direction::Backward => self.prev_states(kmer),
        }
    }

    /// True if `next` is a one-base forward extension of `kmer`
    pub fn is_next(&self, kmer: u64, next: u64) -> bool {
        (kmer << 2) & self.mask == next & !3 & self.mask
    }

    /// Pack the first k bases of `sequence`. Returns `None` for short
    /// sequences or ambiguous bases.
    pub fn encode(&self, sequence: &[u8]) -> Option<u64> {
        if sequence.len() < self.k {
            return None;
        }
        sequence[..self.k]
            .iter()
            .try_fold(0u64, |acc, &b| encode_nucleotide(b).map(|v| (acc << 2) | v))
    }

    /// Unpack a k-mer into uppercase bases
    pub fn decode(&self, kmer: u64) -> Vec<u8> {
        (0..self.k)
            .rev()
            .map(|i| BASES[((kmer >> (2 * i)) & 3) as usize])
            .collect()
    }

    /// Last base of a k-mer
    pub fn last_base(&self, kmer: u64) -> u8 {
        BASES[(kmer & 3) as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nucleotide_encoding() {
        assert_eq!(encode_nucleotide(b'A'), Some(0));
        assert_eq!(encode_nucleotide(b'c'), Some(1));
        assert_eq!(encode_nucleotide(b'G'), Some(2));
        assert_eq!(encode_nucleotide(b'T'), Some(3));
        assert_eq!(encode_nucleotide(b'N'), None);
    }

    #[test]
    fn test_encode_decode() {
        let enc = KmerEncoding::new(4).unwrap();
        let kmer = enc.encode(b"ACGT").unwrap();
        assert_eq!(kmer, 0b00_01_10_11);
        assert_eq!(enc.decode(kmer), b"ACGT");
        assert_eq!(enc.encode(b"ACNT"), None);
        assert_eq!(enc.encode(b"ACG"), None);
    }

    #[test]
    fn test_adjacent_states() {
        let enc = KmerEncoding::new(3).unwrap();
        let acg = enc.encode(b"ACG").unwrap();
        let next: Vec<Vec<u8>> = enc.next_states(acg).iter().map(|&s| enc.decode(s)).collect();
        assert_eq!(next, vec![b"CGA".to_vec(), b"CGC".to_vec(), b"CGG".to_vec(), b"CGT".to_vec()]);
        let prev: Vec<Vec<u8>> = enc.prev_states(acg).iter().map(|&s| enc.decode(s)).collect();
        assert_eq!(prev, vec![b"AAC".to_vec(), b"CAC".to_vec(), b"GAC".to_vec(), b"TAC".to_vec()]);
        assert!(enc.is_next(acg, enc.encode(b"CGT").unwrap()));
        assert!(!enc.is_next(acg, enc.encode(b"GGT").unwrap()));
    }

    #[test]
    fn test_homopolymer_is_self_adjacent() {
        let enc = KmerEncoding::new(5).unwrap();
        let aaaaa = enc.encode(b"AAAAA").unwrap();
        assert!(enc.next_states(aaaaa).contains(&aaaaa));
        assert!(enc.prev_states(aaaaa).contains(&aaaaa));
    }

    #[test]
    fn test_full_width_k() {
        let enc = KmerEncoding::new(MAX_K).unwrap();
        let all_t = u64::MAX;
        assert!(enc.is_valid(all_t));
        assert_eq!(enc.next_states(all_t)[3], all_t);
        assert_eq!(enc.prev_states(all_t)[3], all_t);
        assert!(KmerEncoding::new(33).is_err());
        assert!(KmerEncoding::new(0).is_err());
    }

    #[test]
    fn test_validity_mask() {
        let enc = KmerEncoding::new(2).unwrap();
        assert!(enc.is_valid(15));
        assert!(!enc.is_valid(16));
    }
}
