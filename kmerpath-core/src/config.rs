//! Compactor configuration

use crate::error::{CompactError, CompactResult};
use crate::kmer::MAX_K;
use serde::{Deserialize, Serialize};

/// Parameters fixed at compactor construction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompactorConfig {
    /// K-mer length of the observation keys
    #[serde(default = "default_key_length")]
    pub key_length: u32,

    /// Maximum `end - start` of an observation interval
    #[serde(default = "default_max_observation_width")]
    pub max_observation_width: u32,

    /// Maximum number of observations compacted into a single node
    #[serde(default = "default_max_run_length")]
    pub max_run_length: u32,
}

fn default_key_length() -> u32 { 25 }
fn default_max_observation_width() -> u32 { 16 }
fn default_max_run_length() -> u32 { 1024 }

impl Default for CompactorConfig {
    fn default() -> Self {
        Self {
            key_length: default_key_length(),
            max_observation_width: default_max_observation_width(),
            max_run_length: default_max_run_length(),
        }
    }
}

impl CompactorConfig {
    pub fn new(key_length: u32, max_observation_width: u32, max_run_length: u32) -> Self {
        Self {
            key_length,
            max_observation_width,
            max_run_length,
        }
    }

    pub fn validate(&self) -> CompactResult<()> {
        if self.key_length == 0 || self.key_length as usize > MAX_K {
            return Err(CompactError::invalid_config(format!(
                "key_length must be between 1 and {}, got {}",
                MAX_K, self.key_length
            )));
        }
        if self.max_run_length == 0 {
            return Err(CompactError::invalid_config("max_run_length must be at least 1"));
        }
        Ok(())
    }

    /// Distance behind the latest arrival at which nodes become safe
    pub(crate) fn margin(&self) -> i64 {
        self.max_observation_width as i64 + 2
    }
}
