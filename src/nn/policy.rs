//! Policy network scorer via ONNX Runtime.
//!
//! Wraps an exported policy network (inputs `board`, `adj`, `unit_indices`,
//! `power_indices`; output `[B, max_units, V]` logits) as a `Scorer`. The
//! network scores every unit slot in one pass, so a step's scores depend only
//! on the board and the unit list, never on earlier orders.
//!
//! Without the `neural` feature the scorer still constructs, but every score
//! call fails with `ScorerError::Unavailable`.

#[cfg(feature = "neural")]
use ort::session::{builder::GraphOptimizationLevel, Session};
#[cfg(feature = "neural")]
use std::sync::Mutex;

use crate::board::order::{Area, OrderToken};
use crate::nn::scorer::{Scorer, ScorerError};
use crate::nn::vocab::{Vocabulary, MAX_UNITS};

/// Board features for one position, already encoded by the caller.
#[derive(Debug, Clone)]
pub struct EncodedBoard {
    /// Row-major `[num_areas, num_features]` feature tensor.
    pub features: Vec<f32>,
    pub num_features: usize,
    /// Row-major `[num_areas, num_areas]` adjacency matrix.
    pub adjacency: Vec<f32>,
    /// Index of the power to move (0..7).
    pub power_index: i64,
}

/// Scorer backed by an ONNX policy network.
pub struct PolicyScorer {
    #[cfg(feature = "neural")]
    session: Option<Mutex<Session>>,
    vocab: Vocabulary,
    max_units: usize,
}

impl PolicyScorer {
    /// Loads the policy model at `path`. A missing or unloadable model leaves
    /// the scorer unavailable rather than failing construction.
    pub fn new(path: Option<&str>, vocab: Vocabulary) -> Self {
        #[cfg(feature = "neural")]
        {
            let session = path.and_then(load_session).map(Mutex::new);
            if session.is_some() {
                tracing::info!("loaded policy ONNX model");
            }
            PolicyScorer {
                session,
                vocab,
                max_units: MAX_UNITS,
            }
        }

        #[cfg(not(feature = "neural"))]
        {
            let _ = path;
            tracing::info!("policy scorer disabled (compiled without 'neural' feature)");
            PolicyScorer {
                vocab,
                max_units: MAX_UNITS,
            }
        }
    }

    /// Returns true if a policy model is loaded.
    pub fn is_loaded(&self) -> bool {
        #[cfg(feature = "neural")]
        {
            self.session.is_some()
        }
        #[cfg(not(feature = "neural"))]
        {
            false
        }
    }

    /// Unit slot indices for the network input, padded to `max_units` with -1.
    fn unit_indices(&self, units: &[Area]) -> Vec<i64> {
        let mut indices: Vec<i64> = units
            .iter()
            .take(self.max_units)
            .map(|&a| a as i64)
            .collect();
        indices.resize(self.max_units, -1);
        indices
    }
}

impl Scorer for PolicyScorer {
    type Board = EncodedBoard;

    fn score(
        &self,
        board: &EncodedBoard,
        units: &[Area],
        _prior: &[OrderToken],
    ) -> Result<Vec<f64>, ScorerError> {
        let step = units.len().saturating_sub(1);
        if step >= self.max_units {
            return Err(ScorerError::MissingStep(step));
        }
        let unit_indices = self.unit_indices(units);

        #[cfg(feature = "neural")]
        {
            let mutex = self
                .session
                .as_ref()
                .ok_or_else(|| ScorerError::Unavailable("no policy model loaded".into()))?;
            let mut session = mutex
                .lock()
                .map_err(|_| ScorerError::Inference("policy session poisoned".into()))?;
            run_policy_step(&mut session, board, unit_indices, self.vocab, self.max_units, step)
        }

        #[cfg(not(feature = "neural"))]
        {
            let _ = (board, unit_indices, self.vocab);
            Err(ScorerError::Unavailable(
                "compiled without 'neural' feature".into(),
            ))
        }
    }
}

/// Loads an ONNX session from a file path. Returns None on failure.
#[cfg(feature = "neural")]
fn load_session(path: &str) -> Option<Session> {
    match Session::builder()
        .and_then(|b| b.with_optimization_level(GraphOptimizationLevel::Level3))
        .and_then(|b| b.with_intra_threads(4))
        .and_then(|b| b.commit_from_file(path))
    {
        Ok(session) => Some(session),
        Err(e) => {
            tracing::warn!(path, error = %e, "failed to load ONNX model");
            None
        }
    }
}

/// Runs single-position policy inference and returns the logits row for `step`.
#[cfg(feature = "neural")]
fn run_policy_step(
    session: &mut Session,
    board: &EncodedBoard,
    unit_indices: Vec<i64>,
    vocab: Vocabulary,
    max_units: usize,
    step: usize,
) -> Result<Vec<f64>, ScorerError> {
    use ndarray::ArrayView2;
    use ort::value::Value;

    let inference = |e: ort::Error| ScorerError::Inference(e.to_string());
    let num_areas = vocab.num_areas();

    let board_tensor = Value::from_array((
        [1, num_areas, board.num_features],
        board.features.clone(),
    ))
    .map_err(inference)?;
    let adj_tensor =
        Value::from_array(([num_areas, num_areas], board.adjacency.clone())).map_err(inference)?;
    let unit_tensor = Value::from_array(([1, max_units], unit_indices)).map_err(inference)?;
    let power_tensor = Value::from_array(([1_usize], vec![board.power_index])).map_err(inference)?;

    let outputs = session
        .run(ort::inputs![
            board_tensor,
            adj_tensor,
            unit_tensor,
            power_tensor
        ])
        .map_err(inference)?;

    let (_shape, data) = outputs[0].try_extract_tensor::<f32>().map_err(inference)?;
    let logits = ArrayView2::from_shape((max_units, vocab.size()), data)
        .map_err(|e| ScorerError::Inference(format!("unexpected policy output shape: {}", e)))?;
    Ok(logits.row(step).iter().map(|&x| x as f64).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_board() -> EncodedBoard {
        EncodedBoard {
            features: Vec::new(),
            num_features: 0,
            adjacency: Vec::new(),
            power_index: 0,
        }
    }

    #[test]
    fn policy_scorer_no_model() {
        let scorer = PolicyScorer::new(None, Vocabulary::default());
        assert!(!scorer.is_loaded());
    }

    #[test]
    fn policy_scorer_missing_path() {
        let scorer = PolicyScorer::new(Some("/nonexistent/policy.onnx"), Vocabulary::default());
        assert!(!scorer.is_loaded());
    }

    #[test]
    fn unavailable_scorer_errors() {
        let scorer = PolicyScorer::new(None, Vocabulary::default());
        let err = scorer.score(&empty_board(), &[3], &[]).unwrap_err();
        assert!(matches!(err, ScorerError::Unavailable(_)));
    }

    #[test]
    fn unit_indices_are_padded() {
        let scorer = PolicyScorer::new(None, Vocabulary::default());
        let idx = scorer.unit_indices(&[2, 40]);
        assert_eq!(idx.len(), MAX_UNITS);
        assert_eq!(&idx[..3], &[2, 40, -1]);
    }

    #[test]
    fn step_past_max_units_is_missing() {
        let scorer = PolicyScorer::new(None, Vocabulary::default());
        let units: Vec<Area> = (0..MAX_UNITS + 1).collect();
        let err = scorer.score(&empty_board(), &units, &[]).unwrap_err();
        assert!(matches!(err, ScorerError::MissingStep(17)));
    }
}
