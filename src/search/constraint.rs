//! Per-sequence decoding state and the destination-uniqueness constraint.
//!
//! Every beam or sample owns its own `SequenceState`. The claimed-destination
//! set is derived from the committed orders and updated once per step.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::board::order::{Area, OrderToken};
use crate::nn::vocab::{Slot, Vocabulary};
use crate::search::logits::has_mass;

/// One committed decoding step: the chosen vocabulary index and the order it
/// was read as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChosenOrder {
    pub index: usize,
    pub order: OrderToken,
}

/// Orders committed so far in one sequence, plus the destinations they claim.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SequenceState {
    chosen: Vec<ChosenOrder>,
    claimed: BTreeSet<Area>,
}

impl SequenceState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one order, claiming its destination if it is a move or retreat.
    pub fn push(&mut self, chosen: ChosenOrder) {
        if let Some(dst) = chosen.order.claimed_destination() {
            self.claimed.insert(dst);
        }
        self.chosen.push(chosen);
    }

    /// Returns this state extended by one order.
    pub fn with(mut self, chosen: ChosenOrder) -> Self {
        self.push(chosen);
        self
    }

    pub fn chosen(&self) -> &[ChosenOrder] {
        &self.chosen
    }

    pub fn into_chosen(self) -> Vec<ChosenOrder> {
        self.chosen
    }

    /// The committed orders, in step order. This is the scorer's history input.
    pub fn orders(&self) -> Vec<OrderToken> {
        self.chosen.iter().map(|c| c.order).collect()
    }

    pub fn claimed(&self) -> &BTreeSet<Area> {
        &self.claimed
    }

    pub fn is_claimed(&self, area: Area) -> bool {
        self.claimed.contains(&area)
    }

    /// Number of committed steps.
    pub fn len(&self) -> usize {
        self.chosen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chosen.is_empty()
    }
}

/// Masks destination slots already claimed within a sequence.
#[derive(Debug, Clone, Copy)]
pub struct DestinationTracker {
    vocab: Vocabulary,
    enabled: bool,
}

impl DestinationTracker {
    pub fn new(vocab: Vocabulary, enabled: bool) -> Self {
        Self { vocab, enabled }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether `index` is unavailable to the next step of `state`.
    pub fn is_forbidden(&self, index: usize, state: &SequenceState) -> bool {
        self.enabled
            && matches!(self.vocab.slot(index), Some(Slot::Destination(area)) if state.is_claimed(area))
    }

    /// Commits `chosen` to `state`.
    pub fn register(&self, state: SequenceState, chosen: ChosenOrder) -> SequenceState {
        state.with(chosen)
    }

    /// Sets every forbidden entry of `scores` to `-inf`. Returns the number
    /// of entries masked.
    pub fn apply(&self, scores: &mut [f64], state: &SequenceState) -> usize {
        if !self.enabled {
            return 0;
        }
        let mut masked = 0;
        for &area in state.claimed() {
            let idx = self.vocab.destination_index(area);
            if let Some(s) = scores.get_mut(idx) {
                *s = f64::NEG_INFINITY;
                masked += 1;
            }
        }
        masked
    }

    /// Applies the mask, relaxing it for this step when it would leave no
    /// selectable entry. Returns the scores to use and whether the constraint
    /// was relaxed.
    pub fn constrain(&self, scores: &[f64], state: &SequenceState) -> (Vec<f64>, bool) {
        let mut masked = scores.to_vec();
        if self.apply(&mut masked, state) == 0 || has_mass(&masked) {
            return (masked, false);
        }
        tracing::warn!(
            step = state.len(),
            claimed = state.claimed().len(),
            "destination constraint left no selectable order; relaxing for this unit"
        );
        (scores.to_vec(), true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::order::OrderKind;

    const NEG_INF: f64 = f64::NEG_INFINITY;

    fn chosen(vocab: &Vocabulary, order: OrderToken) -> ChosenOrder {
        let index = match order.claimed_destination() {
            Some(d) => vocab.destination_index(d),
            None => order.kind.index(),
        };
        ChosenOrder { index, order }
    }

    #[test]
    fn empty_state_masks_nothing() {
        let vocab = Vocabulary::new(5);
        let tracker = DestinationTracker::new(vocab, true);
        let state = SequenceState::new();
        let mut scores = vec![0.0; vocab.size()];
        assert_eq!(tracker.apply(&mut scores, &state), 0);
        assert!((0..vocab.size()).all(|i| !tracker.is_forbidden(i, &state)));
    }

    #[test]
    fn moves_and_retreats_claim_destinations() {
        let vocab = Vocabulary::new(5);
        let tracker = DestinationTracker::new(vocab, true);
        let state = SequenceState::new()
            .with(chosen(&vocab, OrderToken::movement(0, 3)))
            .with(chosen(&vocab, OrderToken::retreat(1, 4)));
        assert!(state.is_claimed(3));
        assert!(state.is_claimed(4));
        assert!(tracker.is_forbidden(vocab.destination_index(3), &state));
        assert!(tracker.is_forbidden(vocab.destination_index(4), &state));
        assert!(!tracker.is_forbidden(vocab.destination_index(2), &state));
        // Source slots for the same areas stay open.
        assert!(!tracker.is_forbidden(vocab.source_offset() + 3, &state));
    }

    #[test]
    fn supports_and_holds_claim_nothing() {
        let vocab = Vocabulary::new(5);
        let state = SequenceState::new()
            .with(chosen(&vocab, OrderToken::support(0, 3)))
            .with(chosen(&vocab, OrderToken::new(OrderKind::Convoy, 1, Some(2))))
            .with(chosen(&vocab, OrderToken::hold(4)));
        assert!(state.claimed().is_empty());
        assert_eq!(state.len(), 3);
    }

    #[test]
    fn apply_masks_only_claimed_destination_slots() {
        let vocab = Vocabulary::new(5);
        let tracker = DestinationTracker::new(vocab, true);
        let state = SequenceState::new().with(chosen(&vocab, OrderToken::movement(0, 2)));
        let mut scores = vec![1.0; vocab.size()];
        assert_eq!(tracker.apply(&mut scores, &state), 1);
        for (i, s) in scores.iter().enumerate() {
            if i == vocab.destination_index(2) {
                assert_eq!(*s, NEG_INF);
            } else {
                assert_eq!(*s, 1.0);
            }
        }
    }

    #[test]
    fn disabled_tracker_is_a_no_op() {
        let vocab = Vocabulary::new(5);
        let tracker = DestinationTracker::new(vocab, false);
        let state = SequenceState::new().with(chosen(&vocab, OrderToken::movement(0, 2)));
        let mut scores = vec![1.0; vocab.size()];
        assert_eq!(tracker.apply(&mut scores, &state), 0);
        assert!(!tracker.is_forbidden(vocab.destination_index(2), &state));
    }

    #[test]
    fn register_matches_push() {
        let vocab = Vocabulary::new(5);
        let tracker = DestinationTracker::new(vocab, true);
        let c = chosen(&vocab, OrderToken::movement(1, 4));
        let registered = tracker.register(SequenceState::new(), c);
        let mut pushed = SequenceState::new();
        pushed.push(c);
        assert_eq!(registered, pushed);
        assert_eq!(registered.orders(), vec![OrderToken::movement(1, 4)]);
    }

    #[test]
    fn constrain_relaxes_when_nothing_is_left() {
        let vocab = Vocabulary::new(3);
        let tracker = DestinationTracker::new(vocab, true);
        let state = SequenceState::new().with(chosen(&vocab, OrderToken::movement(0, 1)));
        // Only the claimed destination has mass.
        let mut scores = vec![NEG_INF; vocab.size()];
        scores[vocab.destination_index(1)] = 0.0;
        let (out, relaxed) = tracker.constrain(&scores, &state);
        assert!(relaxed);
        assert_eq!(out, scores);
    }

    #[test]
    fn constrain_keeps_mask_when_alternatives_exist() {
        let vocab = Vocabulary::new(3);
        let tracker = DestinationTracker::new(vocab, true);
        let state = SequenceState::new().with(chosen(&vocab, OrderToken::movement(0, 1)));
        let scores = vec![0.0; vocab.size()];
        let (out, relaxed) = tracker.constrain(&scores, &state);
        assert!(!relaxed);
        assert_eq!(out[vocab.destination_index(1)], NEG_INF);
    }
}
