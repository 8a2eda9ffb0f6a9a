//! Decoder-facing board types.
//!
//! Order tokens, order kinds, decode phases and the sorted unit list of a
//! position. Board features themselves are produced outside this crate.

pub mod order;
pub mod units;

pub use order::{Area, OrderKind, OrderToken, Phase, ALL_ORDER_KINDS};
pub use units::UnitList;
