//! Realpolitik order decoder library.
//!
//! Turns per-step policy scores into complete, destination-consistent
//! Diplomacy order sets: greedy and teacher-forced decoding, beam search,
//! top-k sampling and a deduplicated candidate pool. Used by the binary entry
//! point and by integration tests.

pub mod board;
pub mod config;
pub mod engine;
pub mod error;
pub mod nn;
pub mod search;

pub use config::DecodeConfig;
pub use engine::Decoder;
pub use error::DecodeError;
