//! Core primitives.
//!
//! Hex geometry and the seeded random number generator. Both are pure and
//! platform independent.

pub mod hex;
pub mod rng;

pub use hex::{Edge, Position};
pub use rng::DeterministicRng;
