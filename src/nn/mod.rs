//! Neural network boundary.
//!
//! The order vocabulary shared with the policy network, the `Scorer` trait the
//! decoder drives, and scorer implementations (a static logit table and an
//! ONNX policy network).

pub mod policy;
pub mod scorer;
pub mod vocab;

pub use policy::{EncodedBoard, PolicyScorer};
pub use scorer::{Scorer, ScorerError, StaticScorer};
pub use vocab::{Slot, VocabError, Vocabulary, MAX_UNITS, NUM_AREAS, ORDER_VOCAB_SIZE};
