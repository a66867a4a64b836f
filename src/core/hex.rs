//! Axial Hex Coordinates
//!
//! Positions on the hex grid use two independent axes. The third cube
//! coordinate is derived as `z = -x - y`, which keeps distance and adjacency
//! integer-only.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Offsets of the six neighbours of a hex, in `(x, y)` axial form.
pub const NEIGHBOUR_OFFSETS: [(i32, i32); 6] = [
    (1, 0),
    (1, -1),
    (0, -1),
    (-1, 0),
    (-1, 1),
    (0, 1),
];

/// A position on the hex grid.
///
/// Ordered lexicographically so it can key `BTreeMap`s with a stable
/// iteration order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    /// First axial coordinate.
    pub x: i32,
    /// Second axial coordinate.
    pub y: i32,
}

impl Position {
    /// Create a position from its two axial coordinates.
    #[inline]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// The derived third cube coordinate.
    #[inline]
    pub const fn z(self) -> i32 {
        -self.x - self.y
    }

    /// Offset this position by a delta.
    #[inline]
    pub const fn offset(self, dx: i32, dy: i32) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }

    /// Hex distance: `max(|dx|, |dy|, |dz|)`.
    #[inline]
    pub fn distance(self, other: Position) -> u32 {
        let dx = (self.x - other.x).unsigned_abs();
        let dy = (self.y - other.y).unsigned_abs();
        let dz = (self.z() - other.z()).unsigned_abs();
        dx.max(dy).max(dz)
    }

    /// The six positions adjacent to this one.
    pub fn neighbours(self) -> [Position; 6] {
        NEIGHBOUR_OFFSETS.map(|(dx, dy)| self.offset(dx, dy))
    }

    /// Whether `other` shares an edge with this position.
    #[inline]
    pub fn is_adjacent(self, other: Position) -> bool {
        self.distance(other) == 1
    }

    /// All positions within `radius` of this one, including itself.
    pub fn within(self, radius: u32) -> Vec<Position> {
        let r = radius as i32;
        let mut out = Vec::new();
        for dx in -r..=r {
            let lo = (-r).max(-dx - r);
            let hi = r.min(-dx + r);
            for dy in lo..=hi {
                out.push(self.offset(dx, dy));
            }
        }
        out
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// An undirected edge between two adjacent hexes.
///
/// Stored with its endpoints sorted so `(a, b)` and `(b, a)` compare equal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Edge(Position, Position);

impl Edge {
    /// Build an edge between two positions. Returns `None` unless they are adjacent.
    pub fn between(a: Position, b: Position) -> Option<Self> {
        if !a.is_adjacent(b) {
            return None;
        }
        Some(if a <= b { Edge(a, b) } else { Edge(b, a) })
    }

    /// The two endpoints, smaller first.
    pub fn endpoints(&self) -> (Position, Position) {
        (self.0, self.1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_distance_known_pair() {
        assert_eq!(Position::new(0, 0).distance(Position::new(2, -1)), 2);
    }

    #[test]
    fn test_neighbours_are_at_distance_one() {
        let origin = Position::new(3, -2);
        let neighbours = origin.neighbours();
        for n in neighbours {
            assert_eq!(origin.distance(n), 1);
            assert!(origin.is_adjacent(n));
        }
        let mut unique = neighbours.to_vec();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), 6);
    }

    #[test]
    fn test_within_counts() {
        // 1 + 3r(r+1) hexes in a radius-r disc
        for r in 0..5u32 {
            let disc = Position::new(0, 0).within(r);
            assert_eq!(disc.len() as u32, 1 + 3 * r * (r + 1));
            assert!(disc.iter().all(|p| p.distance(Position::new(0, 0)) <= r));
        }
    }

    #[test]
    fn test_edge_is_unordered() {
        let a = Position::new(0, 0);
        let b = Position::new(1, 0);
        assert_eq!(Edge::between(a, b), Edge::between(b, a));
        assert!(Edge::between(a, Position::new(2, 0)).is_none());
    }

    proptest! {
        #[test]
        fn prop_distance_symmetric(ax in -50i32..50, ay in -50i32..50, bx in -50i32..50, by in -50i32..50) {
            let a = Position::new(ax, ay);
            let b = Position::new(bx, by);
            prop_assert_eq!(a.distance(b), b.distance(a));
            prop_assert_eq!(a.distance(b) == 0, a == b);
        }

        #[test]
        fn prop_triangle_inequality(ax in -20i32..20, ay in -20i32..20, bx in -20i32..20, by in -20i32..20, cx in -20i32..20, cy in -20i32..20) {
            let a = Position::new(ax, ay);
            let b = Position::new(bx, by);
            let c = Position::new(cx, cy);
            prop_assert!(a.distance(c) <= a.distance(b) + b.distance(c));
        }
    }
}
