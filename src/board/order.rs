//! Order tokens produced by the decoder.
//!
//! An order token is the decoder-level view of a Diplomacy order: its kind,
//! the area of the ordered unit, and an optional destination area. Unit types
//! and coasts are not part of the token; the 81-area map already gives each
//! bicoastal variant its own area.

use serde::{Deserialize, Serialize};

/// Index of a map area (0..num_areas). 75 provinces plus 6 bicoastal variants
/// in the reference map.
pub type Area = usize;

/// Order kinds, in vocabulary order:
/// ["hold", "move", "support", "convoy", "retreat", "build", "disband"]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderKind {
    Hold,
    Move,
    Support,
    Convoy,
    Retreat,
    Build,
    Disband,
}

/// All order kinds, indexed by their vocabulary slot.
pub const ALL_ORDER_KINDS: [OrderKind; 7] = [
    OrderKind::Hold,
    OrderKind::Move,
    OrderKind::Support,
    OrderKind::Convoy,
    OrderKind::Retreat,
    OrderKind::Build,
    OrderKind::Disband,
];

impl OrderKind {
    /// Returns the type-slot index of this kind (0..7).
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Returns the kind at the given type-slot index.
    pub fn from_index(index: usize) -> Option<OrderKind> {
        ALL_ORDER_KINDS.get(index).copied()
    }

    /// Hold, build and disband never carry a destination.
    pub const fn allows_destination(self) -> bool {
        matches!(
            self,
            OrderKind::Move | OrderKind::Support | OrderKind::Convoy | OrderKind::Retreat
        )
    }

    /// Only a unit's own move or retreat claims its destination. Supports and
    /// convoys point at a province without occupying it.
    pub const fn claims_destination(self) -> bool {
        matches!(self, OrderKind::Move | OrderKind::Retreat)
    }
}

/// The phase an order set is decoded for.
///
/// Selects how a destination-slot choice is read: a move in movement phases,
/// a retreat in retreat phases, a build site in build phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    #[default]
    Movement,
    Retreat,
    Build,
}

/// A single decoded order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderToken {
    pub kind: OrderKind,
    pub source: Area,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<Area>,
}

impl OrderToken {
    /// Creates a token from its three fields.
    pub const fn new(kind: OrderKind, source: Area, destination: Option<Area>) -> Self {
        Self {
            kind,
            source,
            destination,
        }
    }

    /// Hold: `A vie H`
    pub const fn hold(source: Area) -> Self {
        Self::new(OrderKind::Hold, source, None)
    }

    /// Move: `A bud - rum`
    pub const fn movement(source: Area, destination: Area) -> Self {
        Self::new(OrderKind::Move, source, Some(destination))
    }

    /// Support of the unit or province at `target`.
    pub const fn support(source: Area, target: Area) -> Self {
        Self::new(OrderKind::Support, source, Some(target))
    }

    /// Retreat: `A vie R boh`
    pub const fn retreat(source: Area, destination: Area) -> Self {
        Self::new(OrderKind::Retreat, source, Some(destination))
    }

    /// Build at `area`.
    pub const fn build(area: Area) -> Self {
        Self::new(OrderKind::Build, area, None)
    }

    /// Disband the unit at `area`.
    pub const fn disband(area: Area) -> Self {
        Self::new(OrderKind::Disband, area, None)
    }

    /// Returns the destination this order occupies, if any.
    pub fn claimed_destination(&self) -> Option<Area> {
        if self.kind.claims_destination() {
            self.destination
        } else {
            None
        }
    }
}
