//! Deterministic fixed-point mathematics for read-time spatial queries.
//!
//! Entity positions are exposed to the AI as fixed-point vectors so that distance
//! ordering (e.g. `filter_nearest`) is identical on every client. Lockstep
//! replays depend on agents making the same choices from the same state.

use fixed::types::I48F16;

pub use vec2::FixedVec2;

mod vec2;

/// Fixed-point number type used throughout the AI layer.
///
/// Uses I48F16 format: 48 bits for the integer part, 16 bits for the fractional part.
pub type FixedNum = I48F16;
