//! Stochastic top-k sampling of whole order sets.
//!
//! Each sample is an independent walk with its own state, score and RNG
//! stream. Sample `i` draws from `SmallRng::seed_from_u64(seed + i)`, so a
//! fixed seed reproduces the same candidates however the walks are scheduled.

use rand::rngs::SmallRng;
use rand::SeedableRng;

use crate::error::DecodeError;
use crate::nn::scorer::Scorer;
use crate::search::candidates::{Candidate, Origin};
use crate::search::constraint::{DestinationTracker, SequenceState};
use crate::search::{check_temperature, fork_join};
use crate::search::greedy::StepRunner;
use crate::search::logits::{has_mass, log_softmax, retain_top_k, scale, softmax, weighted_sample};

/// Smallest temperature used for scaling; lower values are clamped to it.
pub const MIN_TEMPERATURE: f64 = 1e-8;

/// Sampling parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleParams {
    pub num_samples: usize,
    pub temperature: f64,
    /// Restrict each draw to the `top_k` best entries. 0 or >= V disables.
    pub top_k: usize,
    pub constrain_destinations: bool,
    /// Base seed of the per-sample RNG streams.
    pub seed: u64,
}

impl Default for SampleParams {
    fn default() -> Self {
        Self {
            num_samples: 10,
            temperature: 1.0,
            top_k: 20,
            constrain_destinations: true,
            seed: 0,
        }
    }
}

struct Walker {
    state: SequenceState,
    log_prob: f64,
    rng: SmallRng,
}

/// Draws one index from a masked score row.
///
/// The row is scaled by `1/max(temperature, 1e-8)` and cut to its top `k`
/// entries (ties at the threshold kept) before the softmax draw. Masked
/// entries are never drawn; None if nothing is left to draw from.
pub fn draw(masked: &[f64], temperature: f64, k: usize, rng: &mut SmallRng) -> Option<usize> {
    let mut scaled = masked.to_vec();
    scale(&mut scaled, temperature.max(MIN_TEMPERATURE));
    retain_top_k(&mut scaled, k);
    let probs = softmax(&scaled)?;
    weighted_sample(&probs, rng)
}

/// Samples `params.num_samples` complete order sets.
///
/// Each candidate's score is the summed log-softmax of the masked but
/// unscaled, unfiltered scores at its drawn indices. Candidates come back in
/// sample order.
pub fn sample<S: Scorer>(
    runner: &StepRunner<'_, S>,
    params: &SampleParams,
) -> Result<Vec<Candidate>, DecodeError> {
    if params.num_samples == 0 {
        return Err(DecodeError::invalid("num_samples must be at least 1"));
    }
    check_temperature(params.temperature)?;

    tracing::debug!(
        units = runner.num_steps(),
        samples = params.num_samples,
        temperature = params.temperature,
        top_k = params.top_k,
        "sampling"
    );

    let tracker = DestinationTracker::new(runner.vocab(), params.constrain_destinations);
    let mut walkers: Vec<Walker> = (0..params.num_samples as u64)
        .map(|i| Walker {
            state: SequenceState::new(),
            log_prob: 0.0,
            rng: SmallRng::seed_from_u64(params.seed.wrapping_add(i)),
        })
        .collect();

    for step in 0..runner.num_steps() {
        walkers = fork_join(runner.is_parallel(), walkers, |mut walker: Walker| {
            let raw = runner.scores(&walker.state)?;
            let (masked, _relaxed) = tracker.constrain(&raw, &walker.state);
            if !has_mass(&masked) {
                return Err(DecodeError::DegenerateDistribution { step });
            }
            let index = draw(&masked, params.temperature, params.top_k, &mut walker.rng)
                .ok_or(DecodeError::DegenerateDistribution { step })?;
            walker.log_prob += log_softmax(&masked)[index];
            let chosen = runner.choose(step, index)?;
            walker.state = tracker.register(walker.state, chosen);
            Ok(walker)
        })?;
        tracing::trace!(step, "sample step");
    }

    Ok(walkers
        .into_iter()
        .map(|w| Candidate::new(w.state.into_chosen(), w.log_prob, Origin::Sample))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::order::OrderKind;
    use crate::board::units::UnitList;
    use crate::nn::scorer::StaticScorer;
    use crate::nn::vocab::Vocabulary;

    fn vocab() -> Vocabulary {
        Vocabulary::new(4)
    }

    fn params(n: usize, seed: u64) -> SampleParams {
        SampleParams {
            num_samples: n,
            seed,
            ..SampleParams::default()
        }
    }

    fn uniform_scorer(steps: usize) -> StaticScorer {
        StaticScorer::new(vec![vec![0.0; vocab().size()]; steps])
    }

    #[test]
    fn zero_samples_rejected() {
        let scorer = uniform_scorer(1);
        let units = UnitList::new([0]).unwrap();
        let runner = StepRunner::new(&scorer, &(), &units, vocab()).unwrap();
        assert!(matches!(
            sample(&runner, &params(0, 1)).unwrap_err(),
            DecodeError::InvalidArgument(_)
        ));
    }

    #[test]
    fn zero_units_give_empty_samples() {
        let scorer = StaticScorer::default();
        let units = UnitList::new([]).unwrap();
        let runner = StepRunner::new(&scorer, &(), &units, vocab()).unwrap();
        let out = sample(&runner, &params(4, 1)).unwrap();
        assert_eq!(out.len(), 4);
        assert!(out.iter().all(|c| c.orders().is_empty() && c.score == 0.0));
    }

    #[test]
    fn same_seed_same_samples() {
        let scorer = uniform_scorer(3);
        let units = UnitList::new([0, 1, 2]).unwrap();
        let runner = StepRunner::new(&scorer, &(), &units, vocab()).unwrap();
        let a = sample(&runner, &params(8, 99)).unwrap();
        let b = sample(&runner, &params(8, 99)).unwrap();
        assert_eq!(a, b);

        let par = StepRunner::new(&scorer, &(), &units, vocab())
            .unwrap()
            .with_parallel(true);
        assert_eq!(a, sample(&par, &params(8, 99)).unwrap());
    }

    #[test]
    fn top_one_is_greedy() {
        let v = vocab();
        let mut row = vec![0.0; v.size()];
        row[OrderKind::Convoy.index()] = 2.0;
        let scorer = StaticScorer::new(vec![row]);
        let units = UnitList::new([2]).unwrap();
        let runner = StepRunner::new(&scorer, &(), &units, v).unwrap();
        let p = SampleParams {
            num_samples: 20,
            top_k: 1,
            seed: 5,
            ..SampleParams::default()
        };
        for cand in sample(&runner, &p).unwrap() {
            assert_eq!(cand.orders()[0].index, OrderKind::Convoy.index());
        }
    }

    #[test]
    fn scores_ignore_temperature() {
        let v = vocab();
        let mut row = vec![f64::NEG_INFINITY; v.size()];
        row[OrderKind::Hold.index()] = 1.0;
        row[OrderKind::Move.index()] = 0.0;
        let scorer = StaticScorer::new(vec![row.clone()]);
        let units = UnitList::new([0]).unwrap();
        let runner = StepRunner::new(&scorer, &(), &units, v).unwrap();
        let p = SampleParams {
            num_samples: 30,
            temperature: 0.0,
            seed: 3,
            ..SampleParams::default()
        };
        let lp = log_softmax(&row);
        for cand in sample(&runner, &p).unwrap() {
            // Near-zero temperature makes the draw greedy but the score is
            // still the unscaled log-probability.
            assert_eq!(cand.orders()[0].index, OrderKind::Hold.index());
            assert!((cand.score - lp[OrderKind::Hold.index()]).abs() < 1e-12);
        }
    }

    #[test]
    fn samples_respect_destination_constraint() {
        let v = vocab();
        let mut row = vec![f64::NEG_INFINITY; v.size()];
        for area in 0..v.num_areas() {
            row[v.destination_index(area)] = 0.0;
        }
        let scorer = StaticScorer::new(vec![row; 4]);
        let units = UnitList::new([0, 1, 2, 3]).unwrap();
        let runner = StepRunner::new(&scorer, &(), &units, v).unwrap();
        for cand in sample(&runner, &params(25, 11)).unwrap() {
            let mut dests: Vec<_> = cand
                .orders()
                .iter()
                .filter_map(|c| c.order.claimed_destination())
                .collect();
            dests.sort_unstable();
            dests.dedup();
            assert_eq!(dests.len(), 4);
        }
    }

    #[test]
    fn exhausted_destinations_relax_instead_of_failing() {
        // Three units but only two destinations with any mass.
        let v = Vocabulary::new(3);
        let mut row = vec![f64::NEG_INFINITY; v.size()];
        row[v.destination_index(0)] = 0.0;
        row[v.destination_index(1)] = 0.0;
        let scorer = StaticScorer::new(vec![row; 3]);
        let units = UnitList::new([0, 1, 2]).unwrap();
        let runner = StepRunner::new(&scorer, &(), &units, v).unwrap();
        for cand in sample(&runner, &params(10, 2)).unwrap() {
            assert!(cand.score.is_finite());
            let first_two: Vec<_> = cand.orders()[..2]
                .iter()
                .filter_map(|c| c.order.claimed_destination())
                .collect();
            assert_ne!(first_two[0], first_two[1]);
        }
    }

    #[test]
    fn draw_never_picks_masked_entries() {
        let mut rng = SmallRng::seed_from_u64(17);
        let masked = [f64::NEG_INFINITY, 0.5, f64::NEG_INFINITY, 0.4];
        for _ in 0..200 {
            let i = draw(&masked, 1.0, 0, &mut rng).unwrap();
            assert!(i == 1 || i == 3);
        }
        assert!(draw(&[f64::NEG_INFINITY; 2], 1.0, 0, &mut rng).is_none());
    }

    #[test]
    fn draw_keeps_the_mask_when_scaling_overflows() {
        let mut rng = SmallRng::seed_from_u64(4);
        let masked = [f64::NEG_INFINITY, 1e300, f64::NEG_INFINITY, -1e300, 5.0];
        for _ in 0..50 {
            assert_eq!(draw(&masked, 1e-8, 0, &mut rng), Some(1));
        }
    }

    #[test]
    fn non_finite_temperature_rejected() {
        let scorer = uniform_scorer(1);
        let units = UnitList::new([0]).unwrap();
        let runner = StepRunner::new(&scorer, &(), &units, vocab()).unwrap();
        for temperature in [f64::INFINITY, f64::NAN] {
            let p = SampleParams {
                temperature,
                ..params(3, 1)
            };
            assert!(matches!(
                sample(&runner, &p).unwrap_err(),
                DecodeError::InvalidArgument(_)
            ));
        }
    }

    #[test]
    fn huge_temperature_keeps_destinations_unique() {
        let v = vocab();
        let mut first = vec![f64::NEG_INFINITY; v.size()];
        first[v.destination_index(3)] = 0.0;
        let scorer = StaticScorer::new(vec![first, vec![0.0; v.size()]]);
        let units = UnitList::new([0, 1]).unwrap();
        let runner = StepRunner::new(&scorer, &(), &units, v).unwrap();
        let p = SampleParams {
            temperature: f64::MAX,
            top_k: 0,
            ..params(40, 8)
        };
        for cand in sample(&runner, &p).unwrap() {
            assert_eq!(cand.orders()[0].order.claimed_destination(), Some(3));
            assert_ne!(cand.orders()[1].order.claimed_destination(), Some(3));
        }
    }
}
