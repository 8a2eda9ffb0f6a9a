//! Step runner: one scorer query per unit, greedy decoding and
//! teacher-forced replay.
//!
//! Step `i` queries the scorer with units `0..=i` and the orders committed at
//! steps `0..i`. Nothing about later steps is ever passed in, so replaying a
//! fixed sequence yields the same scores at step `i` whatever follows it.

use serde::Serialize;

use crate::board::order::OrderToken;
use crate::board::units::UnitList;
use crate::error::DecodeError;
use crate::nn::scorer::Scorer;
use crate::nn::vocab::Vocabulary;
use crate::search::candidates::{Candidate, Origin};
use crate::search::constraint::{ChosenOrder, DestinationTracker, SequenceState};
use crate::search::check_temperature;
use crate::search::logits::{argmax, log_softmax, top_k};

/// Binds a scorer to one position and validates what it returns.
pub struct StepRunner<'a, S: Scorer> {
    scorer: &'a S,
    board: &'a S::Board,
    units: &'a UnitList,
    vocab: Vocabulary,
    parallel: bool,
}

impl<'a, S: Scorer> StepRunner<'a, S> {
    /// Fails if a unit lies outside the vocabulary's map.
    pub fn new(
        scorer: &'a S,
        board: &'a S::Board,
        units: &'a UnitList,
        vocab: Vocabulary,
    ) -> Result<Self, DecodeError> {
        if let Some(&area) = units.areas().iter().find(|&&a| a >= vocab.num_areas()) {
            return Err(DecodeError::invalid(format!(
                "unit area {} out of range for a {}-area map",
                area,
                vocab.num_areas()
            )));
        }
        Ok(Self {
            scorer,
            board,
            units,
            vocab,
            parallel: false,
        })
    }

    /// Scores independent beams, samples and pool entries on the current
    /// rayon pool instead of the caller's thread.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn is_parallel(&self) -> bool {
        self.parallel
    }

    pub fn vocab(&self) -> Vocabulary {
        self.vocab
    }

    pub fn units(&self) -> &UnitList {
        self.units
    }

    /// Number of decoding steps (one per unit).
    pub fn num_steps(&self) -> usize {
        self.units.len()
    }

    /// Raw scores for the next step of `state`.
    pub fn scores(&self, state: &SequenceState) -> Result<Vec<f64>, DecodeError> {
        self.scores_with_history(state.len(), &state.orders())
    }

    fn scores_with_history(
        &self,
        step: usize,
        prior: &[OrderToken],
    ) -> Result<Vec<f64>, DecodeError> {
        if step >= self.units.len() {
            return Err(DecodeError::invalid(format!(
                "step {} past the last of {} units",
                step,
                self.units.len()
            )));
        }
        let scores = self.scorer.score(self.board, self.units.prefix(step), prior)?;
        self.validate(step, &scores)?;
        Ok(scores)
    }

    fn validate(&self, step: usize, scores: &[f64]) -> Result<(), DecodeError> {
        if scores.len() != self.vocab.size() {
            return Err(DecodeError::InvalidScores {
                step,
                reason: format!(
                    "expected {} entries, got {}",
                    self.vocab.size(),
                    scores.len()
                ),
            });
        }
        if let Some(i) = scores.iter().position(|s| s.is_nan() || *s == f64::INFINITY) {
            return Err(DecodeError::InvalidScores {
                step,
                reason: format!("entry {} is {}", i, scores[i]),
            });
        }
        Ok(())
    }

    /// Reads a chosen index as the order for the unit at `step`.
    pub fn choose(&self, step: usize, index: usize) -> Result<ChosenOrder, DecodeError> {
        let unit = self.units.areas()[step];
        let order = self.vocab.token_at(index, unit, self.units.phase())?;
        Ok(ChosenOrder { index, order })
    }

    /// Teacher-forced replay: raw scores for each step of a fixed order
    /// sequence, each step conditioned only on the orders before it.
    pub fn replay(&self, orders: &[OrderToken]) -> Result<Vec<Vec<f64>>, DecodeError> {
        if orders.len() > self.units.len() {
            return Err(DecodeError::invalid(format!(
                "{} orders for {} units",
                orders.len(),
                self.units.len()
            )));
        }
        (0..orders.len())
            .map(|step| self.scores_with_history(step, &orders[..step]))
            .collect()
    }

    /// Log-probability the model assigns to a fixed sequence of choices: the
    /// sum over its steps of the log-softmax at each chosen index.
    ///
    /// Every choice must be a valid index whose order is what that index reads
    /// as for its unit.
    pub fn sequence_log_prob(&self, chosen: &[ChosenOrder]) -> Result<f64, DecodeError> {
        if chosen.len() > self.units.len() {
            return Err(DecodeError::invalid(format!(
                "{} orders for {} units",
                chosen.len(),
                self.units.len()
            )));
        }
        for (step, c) in chosen.iter().enumerate() {
            if c.index >= self.vocab.size() {
                return Err(DecodeError::invalid(format!(
                    "step {}: index {} outside a {}-entry vocabulary",
                    step,
                    c.index,
                    self.vocab.size()
                )));
            }
            if self.choose(step, c.index)?.order != c.order {
                return Err(DecodeError::invalid(format!(
                    "step {}: order {:?} does not match index {}",
                    step, c.order, c.index
                )));
            }
        }
        let orders: Vec<OrderToken> = chosen.iter().map(|c| c.order).collect();
        let rows = self.replay(&orders)?;
        Ok(rows
            .iter()
            .zip(chosen)
            .map(|(row, c)| log_softmax(row)[c.index])
            .sum())
    }
}

/// Greedy choice for one step: arg max with ties going to the lowest index.
/// None if nothing is selectable.
///
/// Dividing by a positive temperature keeps the ordering, so the scores are
/// compared unscaled. Scaling a finite row by a tiny temperature would
/// overflow it to infinities and lose the maximum.
pub fn greedy_step(scores: &[f64]) -> Option<usize> {
    argmax(scores)
}

/// Deterministic decode: one greedy choice per unit.
///
/// `temperature` must be finite; it never changes which index wins.
/// The candidate's score is the summed model log-probability of its choices.
pub fn greedy_decode<S: Scorer>(
    runner: &StepRunner<'_, S>,
    temperature: f64,
    constrain_destinations: bool,
) -> Result<Candidate, DecodeError> {
    check_temperature(temperature)?;
    let tracker = DestinationTracker::new(runner.vocab(), constrain_destinations);
    let mut state = SequenceState::new();
    let mut score = 0.0;

    for step in 0..runner.num_steps() {
        let raw = runner.scores(&state)?;
        let (masked, _relaxed) = tracker.constrain(&raw, &state);
        let index = greedy_step(&masked)
            .ok_or(DecodeError::DegenerateDistribution { step })?;
        score += log_softmax(&raw)[index];
        let chosen = runner.choose(step, index)?;
        tracing::trace!(step, index, order = ?chosen.order, "greedy step");
        state = tracker.register(state, chosen);
    }

    Ok(Candidate::new(state.into_chosen(), score, Origin::Greedy))
}

/// Teacher-forced metrics of a model against a ground-truth order set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct TeacherForcedReport {
    /// Number of scored steps.
    pub steps: usize,
    /// Summed log-probability of each target's type slot.
    pub log_likelihood: f64,
    /// Mean KL divergence between the normalized multi-hot target and the
    /// predicted distribution.
    pub loss: f64,
    /// Fraction of steps whose arg max is the target's type slot.
    pub top1_accuracy: f64,
    /// Fraction of steps whose top-k contains the target's type slot.
    pub topk_accuracy: f64,
}

/// Replays `targets` and scores the model's prediction at every step.
pub fn evaluate_targets<S: Scorer>(
    runner: &StepRunner<'_, S>,
    targets: &[OrderToken],
    k: usize,
) -> Result<TeacherForcedReport, DecodeError> {
    let rows = runner.replay(targets)?;
    if rows.is_empty() {
        return Ok(TeacherForcedReport::default());
    }

    let vocab = runner.vocab();
    let mut loss = 0.0;
    let mut log_likelihood = 0.0;
    let mut top1 = 0usize;
    let mut topk = 0usize;

    for (row, target) in rows.iter().zip(targets) {
        let lp = log_softmax(row);
        let hot: Vec<usize> = vocab
            .encode(Some(target))?
            .iter()
            .enumerate()
            .filter(|(_, &v)| v > 0.0)
            .map(|(i, _)| i)
            .collect();
        let weight = 1.0 / hot.len() as f64;
        loss += hot
            .iter()
            .map(|&j| weight * (weight.ln() - lp[j]))
            .sum::<f64>();

        let target_idx = vocab.target_index(target);
        log_likelihood += lp[target_idx];
        if argmax(row) == Some(target_idx) {
            top1 += 1;
        }
        if top_k(row, k).contains(&target_idx) {
            topk += 1;
        }
    }

    let n = rows.len() as f64;
    Ok(TeacherForcedReport {
        steps: rows.len(),
        log_likelihood,
        loss: loss / n,
        top1_accuracy: top1 as f64 / n,
        topk_accuracy: topk as f64 / n,
    })
}
