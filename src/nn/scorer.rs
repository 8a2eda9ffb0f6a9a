//! The scoring oracle consumed by the decoder.
//!
//! A scorer maps (board context, unit prefix, orders chosen so far) to one
//! score per vocabulary entry for the last unit of the prefix. Scores are
//! unnormalized logits; the decoder applies softmax itself.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::board::order::{Area, OrderToken};

/// Errors reported by a scorer. Any of them ends the current decode call.
#[derive(Debug, Error)]
pub enum ScorerError {
    /// No model is loaded (or the crate was built without it).
    #[error("scorer unavailable: {0}")]
    Unavailable(String),

    #[error("inference failed: {0}")]
    Inference(String),

    /// The scorer has no scores for this step.
    #[error("no scores for step {0}")]
    MissingStep(usize),
}

/// Scoring oracle for one decoding step.
///
/// `units` is the prefix of the sorted unit list up to and including the unit
/// being decoded, so `units.len() - 1` is the step index. `prior` holds the
/// orders chosen for `units[..units.len() - 1]`. Implementations must be
/// causal: the result may depend only on `board`, `units` and `prior`.
pub trait Scorer: Sync {
    /// Static context shared by every step of a position.
    type Board: ?Sized + Sync;

    fn score(
        &self,
        board: &Self::Board,
        units: &[Area],
        prior: &[OrderToken],
    ) -> Result<Vec<f64>, ScorerError>;
}

impl<S: Scorer + ?Sized> Scorer for &S {
    type Board = S::Board;

    fn score(
        &self,
        board: &Self::Board,
        units: &[Area],
        prior: &[OrderToken],
    ) -> Result<Vec<f64>, ScorerError> {
        (**self).score(board, units, prior)
    }
}

/// A scorer backed by a fixed table of per-step logits.
///
/// Row `i` is returned for step `i` regardless of the orders chosen before
/// it, which is how an independent (non-autoregressive) policy head behaves.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StaticScorer {
    pub logits: Vec<Vec<f64>>,
}

impl StaticScorer {
    pub fn new(logits: Vec<Vec<f64>>) -> Self {
        Self { logits }
    }
}

impl Scorer for StaticScorer {
    type Board = ();

    fn score(
        &self,
        _board: &(),
        units: &[Area],
        _prior: &[OrderToken],
    ) -> Result<Vec<f64>, ScorerError> {
        let step = units.len().saturating_sub(1);
        self.logits
            .get(step)
            .cloned()
            .ok_or(ScorerError::MissingStep(step))
    }
}
