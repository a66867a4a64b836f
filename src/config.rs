//! Server configuration.
//!
//! Every setting has a default and can be overridden from the environment:
//!
//! | Variable                     | Field                 |
//! |------------------------------|-----------------------|
//! | `PANZER_BIND_ADDR`           | `bind_addr`           |
//! | `PANZER_MAX_CONNECTIONS`     | `max_connections`     |
//! | `PANZER_MAX_NAME_LENGTH`     | `max_name_length`     |
//! | `PANZER_GUEST_LOGIN`         | `guest_login`         |
//! | `PANZER_REGISTRATION`        | `registration`        |
//! | `PANZER_DEFAULT_POINTS`      | `default_points`      |
//! | `PANZER_DEFAULT_TURN_LIMIT`  | `default_turn_limit`  |
//! | `PANZER_MAX_FRAME_SIZE`      | `max_frame_size`      |
//! | `PANZER_SALT`                | `salt` (hex)          |
//! | `PANZER_CATALOG`             | `catalog_path`        |
//! | `PANZER_MAPS`                | `maps_path`           |

use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use tracing::warn;

/// Wire protocol revision. Clients must send the same value when logging in.
pub const PROTOCOL_VERSION: u32 = 1;

/// Server-wide settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listening address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Longest accepted guest name, in characters.
    pub max_name_length: usize,
    /// Whether players may log in without an account.
    pub guest_login: bool,
    /// Whether new accounts may be registered.
    pub registration: bool,
    /// Revision clients must match.
    pub protocol_version: u32,
    /// Army points when a game request leaves them out.
    pub default_points: u32,
    /// Turn limit when a game request leaves it out.
    pub default_turn_limit: u32,
    /// Advisory deployment seconds when a game request leaves them out.
    pub default_deployment_time: u32,
    /// Advisory turn seconds when a game request leaves them out.
    pub default_turn_time: u32,
    /// Largest accepted frame payload in bytes.
    pub max_frame_size: u32,
    /// Salt clients mix into their key hash.
    pub salt: Vec<u8>,
    /// Catalog JSON file; the built-in catalog is used when unset.
    pub catalog_path: Option<PathBuf>,
    /// Map JSON file; the built-in map is used when unset.
    pub maps_path: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 45489)),
            max_connections: 1000,
            max_name_length: 50,
            guest_login: true,
            registration: true,
            protocol_version: PROTOCOL_VERSION,
            default_points: 200,
            default_turn_limit: 20,
            default_deployment_time: 120,
            default_turn_time: 90,
            max_frame_size: 64 * 1024,
            salt: b"panzer-kontrol".to_vec(),
            catalog_path: None,
            maps_path: None,
        }
    }
}

fn env_parse<T: FromStr>(name: &str, fallback: T) -> T {
    match std::env::var(name) {
        Ok(raw) => match raw.parse() {
            Ok(value) => value,
            Err(_) => {
                warn!("Ignoring unparseable {}={:?}", name, raw);
                fallback
            }
        },
        Err(_) => fallback,
    }
}

fn env_flag(name: &str, fallback: bool) -> bool {
    std::env::var(name)
        .map(|v| v == "true" || v == "1")
        .unwrap_or(fallback)
}

impl ServerConfig {
    /// Defaults overridden by `PANZER_*` environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let salt = match std::env::var("PANZER_SALT") {
            Ok(raw) => hex::decode(&raw).unwrap_or_else(|_| {
                warn!("PANZER_SALT is not valid hex, using default salt");
                defaults.salt.clone()
            }),
            Err(_) => defaults.salt.clone(),
        };

        Self {
            bind_addr: env_parse("PANZER_BIND_ADDR", defaults.bind_addr),
            max_connections: env_parse("PANZER_MAX_CONNECTIONS", defaults.max_connections),
            max_name_length: env_parse("PANZER_MAX_NAME_LENGTH", defaults.max_name_length),
            guest_login: env_flag("PANZER_GUEST_LOGIN", defaults.guest_login),
            registration: env_flag("PANZER_REGISTRATION", defaults.registration),
            protocol_version: defaults.protocol_version,
            default_points: env_parse("PANZER_DEFAULT_POINTS", defaults.default_points),
            default_turn_limit: env_parse("PANZER_DEFAULT_TURN_LIMIT", defaults.default_turn_limit),
            default_deployment_time: defaults.default_deployment_time,
            default_turn_time: defaults.default_turn_time,
            max_frame_size: env_parse("PANZER_MAX_FRAME_SIZE", defaults.max_frame_size),
            salt,
            catalog_path: std::env::var_os("PANZER_CATALOG").map(PathBuf::from),
            maps_path: std::env::var_os("PANZER_MAPS").map(PathBuf::from),
        }
    }
}
