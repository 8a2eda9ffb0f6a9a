//! Decoder configuration.
//!
//! Loaded from JSON (missing fields take their defaults) and layered under
//! CLI flags by the binary.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::DecodeError;
use crate::nn::vocab::{Vocabulary, MAX_UNITS, NUM_AREAS};
use crate::search::candidates::PoolParams;
use crate::search::sampling::SampleParams;

/// Options for every decoding entrypoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecodeConfig {
    /// Hypotheses kept per beam-search step.
    pub beam_width: usize,
    /// Independent stochastic candidates per `sample_decode` call.
    pub num_samples: usize,
    /// Final candidate pool size.
    pub num_candidates: usize,
    /// Logit temperature. Values <= 0 disable scaling for greedy decoding and
    /// are clamped to 1e-8 for sampling.
    pub temperature: f64,
    /// Sampling restricted to the top-k entries (0 or >= V disables).
    pub top_k: usize,
    /// Forbid two moves or retreats to the same area within one order set.
    pub constrain_destinations: bool,
    /// Number of map areas (P); the vocabulary has 7 + 2P entries.
    pub num_areas: usize,
    /// Longest accepted unit list.
    pub max_units: usize,
    /// Samples drawn per missing candidate when topping up the pool.
    pub oversample: usize,
    /// Rayon worker threads for per-step work (<= 1 runs sequentially).
    pub threads: usize,
    /// Random seed (0 = use entropy).
    pub seed: u64,
}

impl Default for DecodeConfig {
    fn default() -> Self {
        DecodeConfig {
            beam_width: 5,
            num_samples: 10,
            num_candidates: 10,
            temperature: 1.0,
            top_k: 20,
            constrain_destinations: true,
            num_areas: NUM_AREAS,
            max_units: MAX_UNITS,
            oversample: 2,
            threads: 1,
            seed: 0,
        }
    }
}

impl DecodeConfig {
    /// Parses a config from JSON text and validates it.
    pub fn from_json(text: &str) -> Result<Self, DecodeError> {
        let config: DecodeConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and validates a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DecodeError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| {
            DecodeError::invalid(format!("cannot read config {}: {}", path.display(), e))
        })?;
        Self::from_json(&text)
    }

    /// Checks the options every entrypoint relies on.
    pub fn validate(&self) -> Result<(), DecodeError> {
        let v = self.vocabulary().size();
        if self.num_areas == 0 {
            return Err(DecodeError::invalid("num_areas must be at least 1"));
        }
        if self.beam_width == 0 || self.beam_width > v {
            return Err(DecodeError::invalid(format!(
                "beam_width {} outside 1..={}",
                self.beam_width, v
            )));
        }
        if self.num_samples == 0 {
            return Err(DecodeError::invalid("num_samples must be at least 1"));
        }
        if self.num_candidates == 0 {
            return Err(DecodeError::invalid("num_candidates must be at least 1"));
        }
        if !self.temperature.is_finite() {
            return Err(DecodeError::invalid(format!(
                "temperature must be finite, got {}",
                self.temperature
            )));
        }
        Ok(())
    }

    pub fn vocabulary(&self) -> Vocabulary {
        Vocabulary::new(self.num_areas)
    }

    /// Sampling parameters for `num_samples` draws from `seed`.
    pub fn sample_params(&self, num_samples: usize, seed: u64) -> SampleParams {
        SampleParams {
            num_samples,
            temperature: self.temperature,
            top_k: self.top_k,
            constrain_destinations: self.constrain_destinations,
            seed,
        }
    }

    /// Candidate pool parameters drawing samples from `seed`.
    pub fn pool_params(&self, seed: u64) -> PoolParams {
        PoolParams {
            num_candidates: self.num_candidates,
            beam_width: self.beam_width,
            temperature: self.temperature,
            top_k: self.top_k,
            constrain_destinations: self.constrain_destinations,
            oversample: self.oversample,
            seed,
        }
    }
}
