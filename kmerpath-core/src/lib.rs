//! kmerpath core library
//!
//! Streaming compaction of positional k-mer observations into a de Bruijn
//! path graph for local breakpoint assembly.

pub mod types;
pub mod error;
pub mod config;
pub mod kmer;
pub mod node;
mod window;
pub mod compactor;
pub mod verify;

// Re-export commonly used types and functions
pub use types::{Interval, Observation, Position};
pub use error::{CompactError, CompactResult};
pub use config::CompactorConfig;
pub use kmer::{Direction, KmerEncoding};
pub use node::{CompactedNode, NodeId};
pub use compactor::{compact_all, CompactorStats, PathNodeCompactor};
pub use verify::{verify_coverage, verify_graph, Violation};

/// Version information for the kmerpath core library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
