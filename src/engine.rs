//! Decoder state management.
//!
//! Holds the scorer, the decode configuration, the RNG used to seed sampling
//! when no fixed seed is configured, and an optional dedicated rayon pool.
//! Every entrypoint takes exactly one board and one unit list.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::board::order::OrderToken;
use crate::board::units::UnitList;
use crate::config::DecodeConfig;
use crate::error::DecodeError;
use crate::nn::scorer::Scorer;
use crate::search::beam::{beam_search, BeamSearchOutput};
use crate::search::candidates::{generate_candidates, rescore, Candidate};
use crate::search::greedy::{evaluate_targets, greedy_decode, StepRunner, TeacherForcedReport};
use crate::search::sampling::sample;

/// Decodes order sets for one scorer under one configuration.
pub struct Decoder<S: Scorer> {
    scorer: S,
    config: DecodeConfig,
    rng: SmallRng,
    pool: Option<rayon::ThreadPool>,
}

impl<S: Scorer> Decoder<S> {
    /// Creates a decoder. Fails if the configuration is invalid or the
    /// thread pool cannot be built.
    pub fn new(scorer: S, config: DecodeConfig) -> Result<Self, DecodeError> {
        config.validate()?;
        let rng = if config.seed != 0 {
            SmallRng::seed_from_u64(config.seed)
        } else {
            SmallRng::from_entropy()
        };
        let pool = if config.threads > 1 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(config.threads)
                .build()
                .map_err(|e| DecodeError::invalid(format!("cannot build thread pool: {}", e)))?;
            Some(pool)
        } else {
            None
        };
        tracing::debug!(threads = config.threads, seed = config.seed, "decoder ready");
        Ok(Decoder {
            scorer,
            config,
            rng,
            pool,
        })
    }

    pub fn config(&self) -> &DecodeConfig {
        &self.config
    }

    pub fn scorer(&self) -> &S {
        &self.scorer
    }

    fn runner<'a>(
        &'a self,
        board: &'a S::Board,
        units: &'a UnitList,
    ) -> Result<StepRunner<'a, S>, DecodeError> {
        if units.len() > self.config.max_units {
            return Err(DecodeError::invalid(format!(
                "{} units exceed the limit of {}",
                units.len(),
                self.config.max_units
            )));
        }
        Ok(
            StepRunner::new(&self.scorer, board, units, self.config.vocabulary())?
                .with_parallel(self.pool.is_some()),
        )
    }

    /// Runs `f` on the dedicated pool if there is one.
    fn run<T, F>(&self, f: F) -> T
    where
        T: Send,
        F: FnOnce() -> T + Send,
    {
        match &self.pool {
            Some(pool) => pool.install(f),
            None => f(),
        }
    }

    /// Base seed for the next sampling call: the configured seed, or a fresh
    /// draw when seeded from entropy.
    fn next_seed(&mut self) -> u64 {
        if self.config.seed != 0 {
            self.config.seed
        } else {
            self.rng.gen()
        }
    }

    /// Deterministic decode: the greedy choice at every step.
    pub fn greedy_decode(
        &self,
        board: &S::Board,
        units: &UnitList,
    ) -> Result<Candidate, DecodeError> {
        let runner = self.runner(board, units)?;
        greedy_decode(
            &runner,
            self.config.temperature,
            self.config.constrain_destinations,
        )
    }

    /// Beam search with `config.beam_width` beams.
    pub fn beam_decode(
        &self,
        board: &S::Board,
        units: &UnitList,
    ) -> Result<BeamSearchOutput, DecodeError> {
        let runner = self.runner(board, units)?;
        self.run(|| {
            beam_search(
                &runner,
                self.config.beam_width,
                self.config.constrain_destinations,
            )
        })
    }

    /// Draws `config.num_samples` independent order sets.
    pub fn sample_decode(
        &mut self,
        board: &S::Board,
        units: &UnitList,
    ) -> Result<Vec<Candidate>, DecodeError> {
        let seed = self.next_seed();
        let params = self.config.sample_params(self.config.num_samples, seed);
        let runner = self.runner(board, units)?;
        self.run(|| sample(&runner, &params))
    }

    /// Beam search topped up with samples, deduplicated and rescored.
    pub fn generate_candidates(
        &mut self,
        board: &S::Board,
        units: &UnitList,
    ) -> Result<Vec<Candidate>, DecodeError> {
        let seed = self.next_seed();
        let params = self.config.pool_params(seed);
        let runner = self.runner(board, units)?;
        let pool = self.run(|| generate_candidates(&runner, &params))?;
        tracing::debug!(units = units.len(), candidates = pool.len(), "generated candidates");
        Ok(pool)
    }

    /// Replaces each candidate's score with its teacher-forced
    /// log-probability.
    pub fn score_candidates(
        &self,
        board: &S::Board,
        units: &UnitList,
        candidates: Vec<Candidate>,
    ) -> Result<Vec<Candidate>, DecodeError> {
        let runner = self.runner(board, units)?;
        self.run(|| rescore(&runner, candidates))
    }

    /// Teacher-forced evaluation of the scorer against ground-truth orders.
    pub fn evaluate(
        &self,
        board: &S::Board,
        units: &UnitList,
        targets: &[OrderToken],
        top_k: usize,
    ) -> Result<TeacherForcedReport, DecodeError> {
        let runner = self.runner(board, units)?;
        evaluate_targets(&runner, targets, top_k)
    }
}
