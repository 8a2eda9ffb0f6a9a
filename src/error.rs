//! Crate-level decode errors.

use thiserror::Error;

use crate::nn::scorer::ScorerError;
use crate::nn::vocab::VocabError;

/// Errors returned by the decoding entrypoints.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The caller violated an entrypoint precondition.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("scorer failed: {0}")]
    Scorer(#[from] ScorerError),

    /// The scorer returned a vector that does not respect the vocabulary layout.
    #[error("invalid scores at step {step}: {reason}")]
    InvalidScores { step: usize, reason: String },

    /// Every vocabulary entry was -inf, even with the destination constraint relaxed.
    #[error("no selectable order at step {step}")]
    DegenerateDistribution { step: usize },

    #[error(transparent)]
    Vocab(#[from] VocabError),

    #[error("invalid config: {0}")]
    Config(#[from] serde_json::Error),
}

impl DecodeError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        DecodeError::InvalidArgument(msg.into())
    }
}
