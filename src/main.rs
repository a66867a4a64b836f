//! Panzer Kontrol Game Server
//!
//! Loads the catalog and maps, then serves until Ctrl-C.

use anyhow::Context;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use panzer_kontrol::{
    core::rng::DeterministicRng,
    game::{Catalog, Map},
    network::{Directory, GameServer, MemoryAccountStore},
    ServerConfig, VERSION,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServerConfig::from_env();
    info!("Panzer Kontrol Server v{}", VERSION);
    info!("Protocol version: {}", config.protocol_version);

    let catalog = match &config.catalog_path {
        Some(path) => Catalog::load(path).with_context(|| format!("loading catalog {}", path.display()))?,
        None => Catalog::builtin(),
    };
    let maps = match &config.maps_path {
        Some(path) => Map::load_all(path).with_context(|| format!("loading maps {}", path.display()))?,
        None => {
            let map = Map::skirmish();
            BTreeMap::from([(map.name().to_string(), map)])
        }
    };
    anyhow::ensure!(!maps.is_empty(), "no maps configured");
    info!(
        "Loaded {} factions and maps {:?}",
        catalog.factions().count(),
        maps.keys().collect::<Vec<_>>()
    );

    let directory = Directory::new(
        config,
        Arc::new(catalog),
        maps,
        Box::new(MemoryAccountStore::new()),
        DeterministicRng::from_entropy(),
    );
    let server = Arc::new(GameServer::new(directory));

    let serving = Arc::clone(&server);
    let handle = tokio::spawn(async move { serving.run().await });

    tokio::select! {
        result = handle => {
            result.context("server task panicked")??;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C received, shutting down");
            server.shutdown();
        }
    }
    Ok(())
}
