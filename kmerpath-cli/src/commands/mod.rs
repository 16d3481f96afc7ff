//! Command implementations for the kmerpath CLI

pub mod compact;
pub mod config;
