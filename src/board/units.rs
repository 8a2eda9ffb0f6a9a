//! The unit list of one position.
//!
//! Units are decoded in ascending area order. Later steps condition on the
//! orders chosen for earlier units, so this ordering is part of the model
//! contract and must match the order used in training.

use serde::{Deserialize, Serialize};

use crate::board::order::{Area, Phase};
use crate::error::DecodeError;

/// Sorted, duplicate-free list of the areas holding units to order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawUnitList")]
pub struct UnitList {
    areas: Vec<Area>,
    #[serde(default)]
    phase: Phase,
}

#[derive(Deserialize)]
struct RawUnitList {
    areas: Vec<Area>,
    #[serde(default)]
    phase: Phase,
}

impl TryFrom<RawUnitList> for UnitList {
    type Error = DecodeError;

    fn try_from(raw: RawUnitList) -> Result<Self, Self::Error> {
        Ok(UnitList::new(raw.areas)?.with_phase(raw.phase))
    }
}

impl UnitList {
    /// Builds a movement-phase unit list. Areas are sorted ascending; a
    /// duplicated area is rejected.
    pub fn new(areas: impl IntoIterator<Item = Area>) -> Result<Self, DecodeError> {
        let mut areas: Vec<Area> = areas.into_iter().collect();
        areas.sort_unstable();
        if let Some(w) = areas.windows(2).find(|w| w[0] == w[1]) {
            return Err(DecodeError::invalid(format!(
                "area {} appears twice in the unit list",
                w[0]
            )));
        }
        Ok(Self {
            areas,
            phase: Phase::Movement,
        })
    }

    /// Builds a unit list from the policy network's padded `unit_indices`
    /// layout, where negative entries are padding.
    pub fn from_padded(slots: &[i64]) -> Result<Self, DecodeError> {
        Self::new(slots.iter().filter(|&&s| s >= 0).map(|&s| s as Area))
    }

    /// Sets the phase the orders are decoded for.
    pub fn with_phase(mut self, phase: Phase) -> Self {
        self.phase = phase;
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn areas(&self) -> &[Area] {
        &self.areas
    }

    pub fn len(&self) -> usize {
        self.areas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.areas.is_empty()
    }

    /// Units `0..=step`: the scorer input for decoding step `step`.
    pub fn prefix(&self, step: usize) -> &[Area] {
        &self.areas[..=step]
    }

    /// The padded `unit_indices` layout (-1 for padding).
    pub fn to_padded(&self, max_units: usize) -> Vec<i64> {
        let mut slots: Vec<i64> = self
            .areas
            .iter()
            .take(max_units)
            .map(|&a| a as i64)
            .collect();
        slots.resize(max_units, -1);
        slots
    }
}
