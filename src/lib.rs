//! # Panzer Kontrol Game Server
//!
//! Authoritative server for a two-player, turn-based hex wargame. Clients
//! only ever see results the server computed.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  PANZER KONTROL SERVER                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Pure primitives                           │
//! │  ├── hex.rs      - Axial positions, distance, edges          │
//! │  └── rng.rs      - Seeded Xorshift128+ PRNG                  │
//! │                                                              │
//! │  game/           - Game rules (no I/O)                       │
//! │  ├── catalog.rs  - Factions, unit types, upgrades            │
//! │  ├── army.rs     - Army validation, reinforcement points     │
//! │  ├── stats.rs    - Stat blocks and bonuses                   │
//! │  ├── map.rs      - Battlefield, reachability, supply         │
//! │  ├── unit.rs     - Units in play                             │
//! │  ├── combat.rs   - Damage and losses                         │
//! │  ├── state.rs    - The game                                  │
//! │  ├── turn.rs     - Deployment, turns, actions                │
//! │  └── events.rs   - What happened                             │
//! │                                                              │
//! │  network/        - Connections and lobby                     │
//! │  ├── server.rs   - TCP acceptor, reader/writer tasks         │
//! │  ├── framing.rs  - Length-prefixed frames                    │
//! │  ├── protocol.rs - Message envelopes                         │
//! │  ├── session.rs  - Per-connection state machine              │
//! │  ├── dispatch.rs - Frame handling, event fan-out             │
//! │  ├── directory.rs- Sessions, offers, matches                 │
//! │  └── auth.rs     - Accounts and key hashes                   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Concurrency
//!
//! All shared state lives in one [`network::Directory`] behind a single
//! `tokio::sync::Mutex`. Each inbound frame is handled by one synchronous
//! call under that lock; outbound messages go through per-connection queues
//! drained by writer tasks.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod config;
pub mod core;
pub mod game;
pub mod network;

// Re-export commonly used types
pub use config::{ServerConfig, PROTOCOL_VERSION};
pub use core::hex::Position;
pub use core::rng::DeterministicRng;
pub use game::{Catalog, Game, Map, Side};
pub use network::{Directory, GameServer};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
