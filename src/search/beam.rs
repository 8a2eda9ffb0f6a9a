//! Beam search over the unit sequence.
//!
//! K hypotheses advance in lockstep, one unit per step. At every step each
//! beam scores its own prefix and applies its own destination mask, then the
//! K*V extensions compete for the K slots of the next step.

use crate::error::DecodeError;
use crate::nn::scorer::Scorer;
use crate::search::candidates::{Candidate, Origin};
use crate::search::constraint::{DestinationTracker, SequenceState};
use crate::search::fork_join;
use crate::search::greedy::StepRunner;
use crate::search::logits::{has_mass, log_softmax, top_k};

/// A partial hypothesis and its cumulative log-probability.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Beam {
    pub state: SequenceState,
    pub log_prob: f64,
}

impl Beam {
    pub fn into_candidate(self) -> Candidate {
        Candidate::new(self.state.into_chosen(), self.log_prob, Origin::Beam)
    }
}

/// Final beams, best first.
#[derive(Debug, Clone, PartialEq)]
pub struct BeamSearchOutput {
    pub best: Candidate,
    pub beams: Vec<Candidate>,
}

impl BeamSearchOutput {
    pub fn into_candidates(self) -> Vec<Candidate> {
        self.beams
    }
}

/// Runs beam search of width `width` over every unit of `runner`.
///
/// Scores are summed log-softmax values; masked entries are `-inf` and are
/// never extended, so fewer than `width` beams survive only when fewer than
/// `width` finite extensions exist. Ties go to the lower flattened index
/// (lower parent beam, then lower vocabulary index).
pub fn beam_search<S: Scorer>(
    runner: &StepRunner<'_, S>,
    width: usize,
    constrain_destinations: bool,
) -> Result<BeamSearchOutput, DecodeError> {
    let v = runner.vocab().size();
    if width == 0 || width > v {
        return Err(DecodeError::invalid(format!(
            "beam width {} outside 1..={}",
            width, v
        )));
    }

    tracing::debug!(units = runner.num_steps(), width, "beam search");

    if runner.num_steps() == 0 {
        let empty = Beam::default().into_candidate();
        return Ok(BeamSearchOutput {
            best: empty.clone(),
            beams: vec![empty; width],
        });
    }

    let tracker = DestinationTracker::new(runner.vocab(), constrain_destinations);
    let mut beams = vec![Beam::default()];

    for step in 0..runner.num_steps() {
        let rows = fork_join(runner.is_parallel(), beams.iter().collect(), |beam: &Beam| {
            let raw = runner.scores(&beam.state)?;
            let (masked, _relaxed) = tracker.constrain(&log_softmax(&raw), &beam.state);
            if !has_mass(&masked) {
                return Err(DecodeError::DegenerateDistribution { step });
            }
            Ok(masked)
        })?;

        let mut flat = Vec::with_capacity(beams.len() * v);
        for (beam, row) in beams.iter().zip(&rows) {
            flat.extend(row.iter().map(|lp| beam.log_prob + lp));
        }

        let mut next = Vec::with_capacity(width);
        for idx in top_k(&flat, width) {
            let score = flat[idx];
            if score == f64::NEG_INFINITY {
                break;
            }
            let (parent, index) = (idx / v, idx % v);
            let chosen = runner.choose(step, index)?;
            next.push(Beam {
                state: tracker.register(beams[parent].state.clone(), chosen),
                log_prob: score,
            });
        }
        tracing::trace!(step, beams = next.len(), best = next[0].log_prob, "beam step");
        beams = next;
    }

    let beams: Vec<Candidate> = beams.into_iter().map(Beam::into_candidate).collect();
    Ok(BeamSearchOutput {
        best: beams[0].clone(),
        beams,
    })
}
