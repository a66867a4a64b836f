//! Hex Battlefield
//!
//! Static topology (terrain, zones, rivers) plus the two pieces of mutable
//! state a map carries during a game: which unit occupies each hex and which
//! side owns it.

use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap, VecDeque};
use std::path::Path;
use thiserror::Error;

use crate::core::hex::{Edge, Position};
use crate::game::catalog::CatalogError;
use crate::game::state::{Side, UnitId};
use crate::game::stats::UnitStats;
use crate::game::unit::Unit;

/// Terrain of a single hex.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Terrain {
    /// Open ground.
    #[default]
    Clear,
    /// Woods.
    Forest,
    /// Impassable for most, slow for all.
    Mountain,
    /// Marsh.
    Swamp,
    /// High ground.
    Hill,
}

impl Terrain {
    /// Movement points needed to enter a hex of this terrain.
    pub fn movement_cost(self) -> u32 {
        match self {
            Terrain::Clear => 1,
            Terrain::Forest | Terrain::Swamp | Terrain::Hill => 2,
            Terrain::Mountain => 3,
        }
    }

    /// Stat modifier for ground units standing on this terrain.
    pub fn bonus(self) -> UnitStats {
        let defence = |d: i32| UnitStats {
            soft_defence: Some(d),
            hard_defence: Some(d),
            ..Default::default()
        };
        match self {
            Terrain::Clear => UnitStats::default(),
            Terrain::Forest | Terrain::Hill => defence(1),
            Terrain::Mountain => defence(2),
            Terrain::Swamp => UnitStats {
                soft_attack: Some(-1),
                hard_attack: Some(-1),
                ..Default::default()
            },
        }
    }
}

/// The unit currently standing on a hex.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Occupant {
    /// Unit id.
    pub unit: UnitId,
    /// Owner of that unit.
    pub side: Side,
}

/// A single hex of the battlefield.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Hex {
    /// Location.
    pub position: Position,
    /// Terrain type.
    #[serde(default)]
    pub terrain: Terrain,
    /// Side this hex supplies.
    #[serde(default)]
    pub supply_source: Option<Side>,
    /// Side that may place units here during initial deployment.
    #[serde(default)]
    pub deployment_zone: Option<Side>,
    /// Side that may deploy reserves here during its turn.
    #[serde(default)]
    pub reinforcement_zone: Option<Side>,
    /// Side controlling this hex.
    #[serde(default)]
    pub owner: Option<Side>,
    #[serde(skip)]
    occupant: Option<Occupant>,
}

impl Hex {
    /// An unowned hex with no zone tags.
    pub fn new(position: Position, terrain: Terrain) -> Self {
        Self {
            position,
            terrain,
            supply_source: None,
            deployment_zone: None,
            reinforcement_zone: None,
            owner: None,
            occupant: None,
        }
    }

    /// The unit standing here, if any.
    pub fn occupant(&self) -> Option<Occupant> {
        self.occupant
    }
}

/// Placement failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MapError {
    /// Position lies outside the map.
    #[error("no hex at {0}")]
    NoSuchHex(Position),
    /// Another unit already stands there.
    #[error("hex {0} is occupied")]
    Occupied(Position),
}

/// Serialized form of a map.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MapDefinition {
    /// Name clients use to pick the map.
    pub name: String,
    /// All hexes.
    pub hexes: Vec<Hex>,
    /// River edges as pairs of adjacent positions.
    #[serde(default)]
    pub rivers: Vec<(Position, Position)>,
}

/// A battlefield instance.
#[derive(Clone, Debug)]
pub struct Map {
    name: String,
    hexes: BTreeMap<Position, Hex>,
    rivers: BTreeSet<Edge>,
}

impl Map {
    /// Build a map from its definition.
    pub fn from_definition(definition: MapDefinition) -> Result<Self, CatalogError> {
        let mut hexes = BTreeMap::new();
        for mut hex in definition.hexes {
            hex.occupant = None;
            let position = hex.position;
            if hexes.insert(position, hex).is_some() {
                return Err(CatalogError::Invalid(format!(
                    "map {} defines {} twice",
                    definition.name, position
                )));
            }
        }
        let mut rivers = BTreeSet::new();
        for (a, b) in definition.rivers {
            let edge = Edge::between(a, b).ok_or_else(|| {
                CatalogError::Invalid(format!("river edge {} - {} is not between neighbours", a, b))
            })?;
            rivers.insert(edge);
        }
        Ok(Self {
            name: definition.name,
            hexes,
            rivers,
        })
    }

    /// A hexagonal map of uniform terrain with no zones.
    pub fn hexagon(name: &str, radius: u32, terrain: Terrain) -> Self {
        let hexes = Position::new(0, 0)
            .within(radius)
            .into_iter()
            .map(|p| (p, Hex::new(p, terrain)))
            .collect();
        Self {
            name: name.to_string(),
            hexes,
            rivers: BTreeSet::new(),
        }
    }

    /// Built-in radius-6 map used when no map file is configured.
    ///
    /// Side 1 holds the western third, side 2 the eastern third. A river runs
    /// along the eastern edge of the centre column.
    pub fn skirmish() -> Self {
        let mut map = Self::hexagon("skirmish", 6, Terrain::Clear);
        for hex in map.hexes.values_mut() {
            let x = hex.position.x;
            let side = match x {
                x if x < 0 => Some(Side::Side1),
                x if x > 0 => Some(Side::Side2),
                _ => None,
            };
            hex.owner = side;
            if x.abs() >= 4 {
                hex.deployment_zone = side;
            }
            if x.abs() == 6 {
                hex.reinforcement_zone = side;
            }
        }
        let features = [
            (Position::new(0, 0), Terrain::Hill),
            (Position::new(0, 1), Terrain::Hill),
            (Position::new(-1, -1), Terrain::Forest),
            (Position::new(2, 1), Terrain::Forest),
            (Position::new(-3, 2), Terrain::Forest),
            (Position::new(3, -2), Terrain::Forest),
            (Position::new(1, -4), Terrain::Mountain),
            (Position::new(-1, 4), Terrain::Mountain),
            (Position::new(-2, 4), Terrain::Swamp),
            (Position::new(2, -5), Terrain::Swamp),
        ];
        for (position, terrain) in features {
            if let Some(hex) = map.hexes.get_mut(&position) {
                hex.terrain = terrain;
            }
        }
        for (position, side) in [(Position::new(-6, 3), Side::Side1), (Position::new(6, -3), Side::Side2)] {
            if let Some(hex) = map.hexes.get_mut(&position) {
                hex.supply_source = Some(side);
            }
        }
        for y in -3..=0 {
            if let Some(edge) = Edge::between(Position::new(0, y), Position::new(1, y)) {
                map.rivers.insert(edge);
            }
        }
        map
    }

    /// Load every map of a JSON file holding an array of map definitions.
    pub fn load_all(path: impl AsRef<Path>) -> Result<BTreeMap<String, Map>, CatalogError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let definitions: Vec<MapDefinition> = serde_json::from_str(&json)?;
        let mut maps = BTreeMap::new();
        for definition in definitions {
            let map = Map::from_definition(definition)?;
            maps.insert(map.name.clone(), map);
        }
        Ok(maps)
    }

    /// Map name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Look up a hex.
    pub fn hex(&self, position: Position) -> Option<&Hex> {
        self.hexes.get(&position)
    }

    /// Iterate all hexes in position order.
    pub fn hexes(&self) -> impl Iterator<Item = &Hex> {
        self.hexes.values()
    }

    /// Mark an edge as a river. Returns `false` if the positions are not adjacent.
    pub fn add_river(&mut self, a: Position, b: Position) -> bool {
        match Edge::between(a, b) {
            Some(edge) => {
                self.rivers.insert(edge);
                true
            }
            None => false,
        }
    }

    /// Whether a river runs between two adjacent hexes.
    pub fn river_between(&self, a: Position, b: Position) -> bool {
        Edge::between(a, b).is_some_and(|edge| self.rivers.contains(&edge))
    }

    /// Tag or retag a hex; used by tests and map tooling.
    pub fn hex_mut(&mut self, position: Position) -> Option<&mut Hex> {
        self.hexes.get_mut(&position)
    }

    /// Whether `position` lies in `side`'s initial deployment zone.
    pub fn in_deployment_zone(&self, position: Position, side: Side) -> bool {
        self.hex(position).is_some_and(|h| h.deployment_zone == Some(side))
    }

    /// Whether `position` lies in `side`'s reinforcement zone.
    pub fn in_reinforcement_zone(&self, position: Position, side: Side) -> bool {
        self.hex(position).is_some_and(|h| h.reinforcement_zone == Some(side))
    }

    /// Number of hexes owned by `side`.
    pub fn owned_by(&self, side: Side) -> usize {
        self.hexes.values().filter(|h| h.owner == Some(side)).count()
    }

    /// Give ownership of a hex to `side`. Returns `true` if ownership changed.
    pub fn capture(&mut self, position: Position, side: Side) -> bool {
        match self.hexes.get_mut(&position) {
            Some(hex) if hex.owner != Some(side) => {
                hex.owner = Some(side);
                true
            }
            _ => false,
        }
    }

    /// Put `unit` on `position`, leaving its previous hex if it had one.
    pub fn place(&mut self, unit: &mut Unit, position: Position) -> Result<(), MapError> {
        let target = self.hexes.get(&position).ok_or(MapError::NoSuchHex(position))?;
        if target.occupant.is_some() {
            return Err(MapError::Occupied(position));
        }
        if let Some(old) = unit.position.take() {
            if let Some(hex) = self.hexes.get_mut(&old) {
                hex.occupant = None;
            }
        }
        let hex = self.hexes.get_mut(&position).ok_or(MapError::NoSuchHex(position))?;
        hex.occupant = Some(Occupant {
            unit: unit.id(),
            side: unit.side(),
        });
        unit.position = Some(position);
        unit.refresh_stats(Some(hex.terrain));
        Ok(())
    }

    /// Take `unit` off the map.
    pub fn vacate(&mut self, unit: &mut Unit) {
        if let Some(old) = unit.position.take() {
            if let Some(hex) = self.hexes.get_mut(&old) {
                if hex.occupant.is_some_and(|o| o.unit == unit.id()) {
                    hex.occupant = None;
                }
            }
        }
        unit.refresh_stats(None);
    }

    /// Recompute a unit's stats for the hex it stands on.
    pub fn refresh_stats(&self, unit: &mut Unit) {
        let terrain = unit.position().and_then(|p| self.hex(p)).map(|h| h.terrain);
        unit.refresh_stats(terrain);
    }

    /// Every hex `unit` can move to this turn, with the movement points left
    /// after arriving there.
    ///
    /// Cost-bounded Dijkstra from the unit's hex. Enemy-held hexes block.
    /// Friendly-held hexes can be crossed but are not destinations. The start
    /// hex is never included.
    pub fn movement_map(&self, unit: &Unit) -> BTreeMap<Position, u32> {
        let Some(start) = unit.position() else {
            return BTreeMap::new();
        };
        let budget = unit.movement_points();
        let side = unit.side();

        let mut best: BTreeMap<Position, u32> = BTreeMap::new();
        let mut heap = BinaryHeap::new();
        best.insert(start, 0);
        heap.push(Reverse((0u32, start)));

        while let Some(Reverse((cost, position))) = heap.pop() {
            if best.get(&position).is_some_and(|&c| cost > c) {
                continue;
            }
            for next in position.neighbours() {
                let Some(hex) = self.hexes.get(&next) else {
                    continue;
                };
                if hex.occupant.is_some_and(|o| o.side != side) {
                    continue;
                }
                let next_cost = cost + hex.terrain.movement_cost();
                if next_cost > budget {
                    continue;
                }
                if best.get(&next).map_or(true, |&c| next_cost < c) {
                    best.insert(next, next_cost);
                    heap.push(Reverse((next_cost, next)));
                }
            }
        }

        best.into_iter()
            .filter(|(position, _)| *position != start)
            .filter(|(position, _)| self.hexes.get(position).is_some_and(|h| h.occupant.is_none()))
            .map(|(position, cost)| (position, budget - cost))
            .collect()
    }

    /// Whether a unit of `side` at `position` can trace supply.
    ///
    /// Breadth-first search from `position` across hexes owned by `side`,
    /// succeeding on the first friendly supply source reached.
    pub fn is_supplied(&self, position: Position, side: Side) -> bool {
        let mut visited = BTreeSet::new();
        let mut queue = VecDeque::new();
        visited.insert(position);
        queue.push_back(position);

        while let Some(current) = queue.pop_front() {
            let Some(hex) = self.hexes.get(&current) else {
                continue;
            };
            if hex.supply_source == Some(side) {
                return true;
            }
            for next in current.neighbours() {
                let owned = self.hexes.get(&next).is_some_and(|h| h.owner == Some(side));
                if owned && visited.insert(next) {
                    queue.push_back(next);
                }
            }
        }
        false
    }
}
