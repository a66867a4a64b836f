//! Game Logic Module
//!
//! Everything that happens inside a match. No I/O and no locking; the
//! network layer owns games and feeds them one request at a time.
//!
//! ## Module Structure
//!
//! - `catalog`: factions, unit types and upgrades
//! - `army`: army composition and validation
//! - `stats`: stat blocks and how they combine
//! - `map`: hex battlefield, reachability and supply
//! - `unit`: units in play
//! - `combat`: damage and strength-loss formulas
//! - `state`: the game itself
//! - `turn`: deployment, turn loop and actions
//! - `events`: what the game reports back

pub mod army;
pub mod catalog;
pub mod combat;
pub mod events;
pub mod map;
pub mod state;
pub mod stats;
pub mod turn;
pub mod unit;

pub use army::{ArmyError, BaseArmy, UnitConfiguration};
pub use catalog::{Catalog, CatalogError, UnitClass};
pub use events::{GameEvent, GameOutcome, UnitCasualties, UnitPosition};
pub use map::{Map, Terrain};
pub use state::{Game, GameConfiguration, GameError, GamePhase, Side, UnitId};
pub use unit::Unit;
