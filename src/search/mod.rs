//! Sequential order decoding.
//!
//! Builds a complete order set one unit at a time: greedy and teacher-forced
//! stepping, beam search, stochastic top-k sampling, and the candidate pool
//! that merges and rescores their outputs under the destination constraint.

pub mod beam;
pub mod candidates;
pub mod constraint;
pub mod greedy;
pub mod logits;
pub mod sampling;

pub use beam::{beam_search, Beam, BeamSearchOutput};
pub use candidates::{build_pool, generate_candidates, rescore, Candidate, Origin, PoolParams};
pub use constraint::{ChosenOrder, DestinationTracker, SequenceState};
pub use greedy::{evaluate_targets, greedy_decode, greedy_step, StepRunner, TeacherForcedReport};
pub use sampling::{sample, SampleParams};

use rayon::prelude::*;

use crate::error::DecodeError;

/// Maps `f` over independent per-sequence work, on the current rayon pool
/// when `parallel` is set. Output order always matches input order.
pub(crate) fn fork_join<T, U, F>(parallel: bool, items: Vec<T>, f: F) -> Result<Vec<U>, DecodeError>
where
    T: Send,
    U: Send,
    F: Fn(T) -> Result<U, DecodeError> + Sync + Send,
{
    if parallel {
        items.into_par_iter().map(f).collect()
    } else {
        items.into_iter().map(f).collect()
    }
}

/// Rejects temperatures no decoding mode can use. Values `<= 0` are allowed
/// and mean "unscaled" (greedy) or "clamped" (sampling).
pub(crate) fn check_temperature(temperature: f64) -> Result<(), DecodeError> {
    if !temperature.is_finite() {
        return Err(DecodeError::invalid(format!(
            "temperature must be finite, got {}",
            temperature
        )));
    }
    Ok(())
}
