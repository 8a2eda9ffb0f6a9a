//! Candidate order sets and the candidate pool.
//!
//! The pool merges beam and sampled order sets, drops duplicates by their
//! vocabulary-index signature and rescores the survivors by teacher-forced
//! replay, so scores are comparable whatever strategy produced a candidate.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::board::order::OrderToken;
use crate::error::DecodeError;
use crate::nn::scorer::Scorer;
use crate::search::beam::beam_search;
use crate::search::constraint::ChosenOrder;
use crate::search::fork_join;
use crate::search::greedy::StepRunner;
use crate::search::sampling::{sample, SampleParams};

/// Which strategy produced a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Beam,
    Sample,
    Greedy,
}

/// A complete order set: one chosen order per unit, in unit order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    orders: Vec<ChosenOrder>,
    pub score: f64,
    pub origin: Origin,
}

impl Candidate {
    pub fn new(orders: Vec<ChosenOrder>, score: f64, origin: Origin) -> Self {
        Self {
            orders,
            score,
            origin,
        }
    }

    pub fn orders(&self) -> &[ChosenOrder] {
        &self.orders
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    /// The chosen vocabulary indices. Two candidates are duplicates exactly
    /// when their signatures are equal.
    pub fn signature(&self) -> Vec<usize> {
        self.orders.iter().map(|c| c.index).collect()
    }

    pub fn tokens(&self) -> Vec<OrderToken> {
        self.orders.iter().map(|c| c.order).collect()
    }

    /// The orders padded with `None` up to `max_units`, ready for
    /// `Vocabulary::encode_padded`.
    pub fn padded(&self, max_units: usize) -> Vec<Option<OrderToken>> {
        let mut out: Vec<Option<OrderToken>> =
            self.orders.iter().take(max_units).map(|c| Some(c.order)).collect();
        out.resize(max_units, None);
        out
    }
}

/// Rescores each candidate with its teacher-forced log-probability.
pub fn rescore<S: Scorer>(
    runner: &StepRunner<'_, S>,
    candidates: Vec<Candidate>,
) -> Result<Vec<Candidate>, DecodeError> {
    fork_join(runner.is_parallel(), candidates, |mut cand: Candidate| {
        cand.score = runner.sequence_log_prob(&cand.orders)?;
        Ok(cand)
    })
}

/// Merges `beam` and `sampled` into at most `num_candidates` unique
/// candidates.
///
/// Beam candidates come first, then samples in draw order. Of duplicate
/// signatures the first occurrence is kept, whatever its score. If nothing is
/// kept but the inputs were not empty, the first input is returned alone.
pub fn build_pool<S: Scorer>(
    runner: &StepRunner<'_, S>,
    beam: Vec<Candidate>,
    sampled: Vec<Candidate>,
    num_candidates: usize,
) -> Result<Vec<Candidate>, DecodeError> {
    let total = beam.len() + sampled.len();
    let mut seen = HashSet::new();
    let mut all = beam.into_iter().chain(sampled);
    let first = all.next();

    let mut kept: Vec<Candidate> = first
        .iter()
        .cloned()
        .chain(all)
        .filter(|c| seen.insert(c.signature()))
        .take(num_candidates)
        .collect();
    if kept.is_empty() {
        kept.extend(first);
    }

    tracing::debug!(total, unique = kept.len(), "candidate pool");
    rescore(runner, kept)
}

/// Parameters of [`generate_candidates`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoolParams {
    pub num_candidates: usize,
    pub beam_width: usize,
    pub temperature: f64,
    pub top_k: usize,
    pub constrain_destinations: bool,
    /// Samples drawn per missing candidate, to make up for duplicates.
    pub oversample: usize,
    pub seed: u64,
}

impl Default for PoolParams {
    fn default() -> Self {
        Self {
            num_candidates: 10,
            beam_width: 5,
            temperature: 1.0,
            top_k: 20,
            constrain_destinations: true,
            oversample: 2,
            seed: 0,
        }
    }
}

/// Builds a diverse candidate pool: beam search of width
/// `min(beam_width, num_candidates)`, topped up with samples when the beams
/// fall short of `num_candidates`.
pub fn generate_candidates<S: Scorer>(
    runner: &StepRunner<'_, S>,
    params: &PoolParams,
) -> Result<Vec<Candidate>, DecodeError> {
    if params.num_candidates == 0 {
        return Err(DecodeError::invalid("num_candidates must be at least 1"));
    }

    let width = params.beam_width.min(params.num_candidates);
    let beams = beam_search(runner, width, params.constrain_destinations)?.into_candidates();

    let missing = params.num_candidates.saturating_sub(beams.len());
    let num_samples = missing * params.oversample;
    let sampled = if num_samples > 0 {
        sample(
            runner,
            &SampleParams {
                num_samples,
                temperature: params.temperature,
                top_k: params.top_k,
                constrain_destinations: params.constrain_destinations,
                seed: params.seed,
            },
        )?
    } else {
        Vec::new()
    };

    build_pool(runner, beams, sampled, params.num_candidates)
}
