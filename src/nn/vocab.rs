//! Order vocabulary layout and multi-hot order encoding.
//!
//! The policy network scores a flat vector of `7 + P + P` entries, where P is
//! the number of map areas (81 in the reference map, giving 169):
//!   [0:7]          order type:  [hold, move, support, convoy, retreat, build, disband]
//!   [7:7+P]        source area
//!   [7+P:7+2P]     destination area
//!
//! A ground-truth order is encoded multi-hot over the same layout (type,
//! source and, when present, destination). The all-zero vector is the
//! padding sentinel; in this crate padding is `None` and only appears at the
//! encoding boundary.

use thiserror::Error;

use crate::board::order::{Area, OrderKind, OrderToken, Phase};

/// Number of order kinds (type slots).
pub const NUM_ORDER_TYPES: usize = 7;

/// Total number of areas in the reference map (75 provinces + 6 bicoastal variants).
pub const NUM_AREAS: usize = 81;

/// Reference vocabulary size: 7 + 81 + 81 = 169.
pub const ORDER_VOCAB_SIZE: usize = NUM_ORDER_TYPES + NUM_AREAS + NUM_AREAS;

/// Maximum number of units per power (policy network input padding).
pub const MAX_UNITS: usize = 17;

/// Errors from encoding, decoding or interpreting order vectors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum VocabError {
    #[error("order vector has length {found}, expected {expected}")]
    LengthMismatch { expected: usize, found: usize },

    #[error("area {area} out of range for a {num_areas}-area map")]
    AreaOutOfRange { area: Area, num_areas: usize },

    #[error("vocabulary index {index} out of range (size {size})")]
    IndexOutOfRange { index: usize, size: usize },

    #[error("more than one {0} bit set")]
    MultipleHot(&'static str),

    #[error("order vector has a source or destination but no type")]
    MissingType,

    #[error("order vector has a type but no source")]
    MissingSource,

    #[error("{0:?} orders take no destination")]
    UnexpectedDestination(OrderKind),
}

/// The section of the vocabulary an index falls in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Kind(OrderKind),
    Source(Area),
    Destination(Area),
}

/// Vocabulary layout for a map with a given number of areas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Vocabulary {
    num_areas: usize,
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self::new(NUM_AREAS)
    }
}

impl Vocabulary {
    pub const fn new(num_areas: usize) -> Self {
        Self { num_areas }
    }

    pub const fn num_areas(&self) -> usize {
        self.num_areas
    }

    /// Vocabulary size V = 7 + 2P.
    pub const fn size(&self) -> usize {
        NUM_ORDER_TYPES + 2 * self.num_areas
    }

    /// Offset of the source-area section.
    pub const fn source_offset(&self) -> usize {
        NUM_ORDER_TYPES
    }

    /// Offset of the destination-area section.
    pub const fn destination_offset(&self) -> usize {
        NUM_ORDER_TYPES + self.num_areas
    }

    /// Index of the destination slot for `area`.
    pub const fn destination_index(&self, area: Area) -> usize {
        self.destination_offset() + area
    }

    /// Classifies a flat vocabulary index.
    pub fn slot(&self, index: usize) -> Option<Slot> {
        if index < NUM_ORDER_TYPES {
            OrderKind::from_index(index).map(Slot::Kind)
        } else if index < self.destination_offset() {
            Some(Slot::Source(index - self.source_offset()))
        } else if index < self.size() {
            Some(Slot::Destination(index - self.destination_offset()))
        } else {
            None
        }
    }

    fn check_area(&self, area: Area) -> Result<(), VocabError> {
        if area < self.num_areas {
            Ok(())
        } else {
            Err(VocabError::AreaOutOfRange {
                area,
                num_areas: self.num_areas,
            })
        }
    }

    /// Reads a chosen vocabulary index as an order for `unit`.
    ///
    /// Type slots give a destination-free order of that kind, source slots a
    /// support of the unit at that area, and destination slots a move, retreat
    /// or build depending on the phase.
    pub fn token_at(&self, index: usize, unit: Area, phase: Phase) -> Result<OrderToken, VocabError> {
        let slot = self.slot(index).ok_or(VocabError::IndexOutOfRange {
            index,
            size: self.size(),
        })?;
        self.check_area(unit)?;
        let token = match slot {
            Slot::Kind(kind) => OrderToken::new(kind, unit, None),
            Slot::Source(target) => OrderToken::support(unit, target),
            Slot::Destination(area) => match phase {
                Phase::Movement => OrderToken::movement(unit, area),
                Phase::Retreat => OrderToken::retreat(unit, area),
                Phase::Build => OrderToken::build(area),
            },
        };
        Ok(token)
    }

    /// Encodes an order as a multi-hot vector. `None` encodes as all zeros.
    pub fn encode(&self, order: Option<&OrderToken>) -> Result<Vec<f32>, VocabError> {
        let mut vec = vec![0.0f32; self.size()];
        self.encode_into(order, &mut vec)?;
        Ok(vec)
    }

    fn encode_into(&self, order: Option<&OrderToken>, out: &mut [f32]) -> Result<(), VocabError> {
        let Some(order) = order else {
            return Ok(());
        };
        self.check_area(order.source)?;
        out[order.kind.index()] = 1.0;
        out[self.source_offset() + order.source] = 1.0;
        if let Some(dst) = order.destination {
            if !order.kind.allows_destination() {
                return Err(VocabError::UnexpectedDestination(order.kind));
            }
            self.check_area(dst)?;
            out[self.destination_index(dst)] = 1.0;
        }
        Ok(())
    }

    /// Encodes an order set as a flat `[max_units * V]` tensor, padding the
    /// tail (and any `None` slot) with zero rows.
    pub fn encode_padded(
        &self,
        orders: &[Option<OrderToken>],
        max_units: usize,
    ) -> Result<Vec<f32>, VocabError> {
        let v = self.size();
        let mut out = vec![0.0f32; max_units * v];
        for (i, order) in orders.iter().take(max_units).enumerate() {
            self.encode_into(order.as_ref(), &mut out[i * v..(i + 1) * v])?;
        }
        Ok(out)
    }

    /// Decodes a multi-hot vector. Returns `Ok(None)` for the all-zero padding row.
    pub fn decode(&self, vec: &[f32]) -> Result<Option<OrderToken>, VocabError> {
        if vec.len() != self.size() {
            return Err(VocabError::LengthMismatch {
                expected: self.size(),
                found: vec.len(),
            });
        }

        let hot = |range: std::ops::Range<usize>, name: &'static str| {
            let mut found = None;
            for i in range.clone() {
                if vec[i] > 0.0 {
                    if found.is_some() {
                        return Err(VocabError::MultipleHot(name));
                    }
                    found = Some(i - range.start);
                }
            }
            Ok(found)
        };

        let kind = hot(0..NUM_ORDER_TYPES, "type")?;
        let source = hot(self.source_offset()..self.destination_offset(), "source")?;
        let destination = hot(self.destination_offset()..self.size(), "destination")?;

        match (kind, source) {
            (None, None) if destination.is_none() => Ok(None),
            (None, _) => Err(VocabError::MissingType),
            (Some(_), None) => Err(VocabError::MissingSource),
            (Some(k), Some(source)) => {
                let kind = OrderKind::from_index(k).ok_or(VocabError::MissingType)?;
                if destination.is_some() && !kind.allows_destination() {
                    return Err(VocabError::UnexpectedDestination(kind));
                }
                Ok(Some(OrderToken::new(kind, source, destination)))
            }
        }
    }

    /// Index used as the classification target for a ground-truth order: the
    /// first hot position, which is always its type slot.
    pub fn target_index(&self, order: &OrderToken) -> usize {
        order.kind.index()
    }
}
