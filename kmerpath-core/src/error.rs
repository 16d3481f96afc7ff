//! Error types for path node compaction

use crate::types::Position;
use thiserror::Error;

/// Errors that can occur while compacting an observation stream
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompactError {
    #[error("Input not sorted by start position: {start} follows {previous}")]
    UnsortedInput { previous: Position, start: Position },

    #[error("Observation [{start}, {end}] has width {width}, maximum is {max_width}")]
    WidthExceeded {
        start: Position,
        end: Position,
        width: Position,
        max_width: u32,
    },

    #[error("Observation [{start}, {end}] lies within {margin} of the position limits")]
    PositionOutOfRange { start: Position, end: Position, margin: Position },

    #[error("Observation interval [{start}, {end}] ends before it starts")]
    InvertedInterval { start: Position, end: Position },

    #[error("K-mer {kmer:#x} does not fit in {k} bases")]
    KmerOutOfRange { kmer: u64, k: usize },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Internal consistency failure: {0}")]
    Internal(String),
}

impl CompactError {
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal(message.into())
    }

    pub fn invalid_config<S: Into<String>>(message: S) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// True when the error was caused by the caller's input or configuration
    /// rather than by the engine itself.
    pub fn is_precondition(&self) -> bool {
        !matches!(self, Self::Internal(_))
    }
}

pub type CompactResult<T> = Result<T, CompactError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precondition_classification() {
        assert!(CompactError::UnsortedInput { previous: 5, start: 4 }.is_precondition());
        assert!(CompactError::invalid_config("k").is_precondition());
        assert!(!CompactError::internal("merge target without node").is_precondition());
    }

    #[test]
    fn test_error_messages() {
        let err = CompactError::WidthExceeded { start: 1, end: 9, width: 8, max_width: 4 };
        assert_eq!(err.to_string(), "Observation [1, 9] has width 8, maximum is 4");
    }
}
