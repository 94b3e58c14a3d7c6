//! Realm Sync Server
//!
//! Loads the map catalog, builds the world and serves it over WebSocket.

use std::sync::Arc;
use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use realm_sync::{
    VERSION,
    game::{catalog::MapCatalog, world::{WorldConfig, WorldState}},
    network::server::{GameServer, ServerConfig},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::from_env();
    info!("Realm Sync Server v{}", VERSION);
    info!("Tick Rate: {} Hz", config.tick_rate);

    let catalog = match &config.map_catalog {
        Some(path) => MapCatalog::from_file(path)
            .with_context(|| format!("loading map catalog {}", path.display()))?,
        None => {
            info!("No SERVER_MAP_CATALOG set, using the built-in demo world");
            MapCatalog::demo()
        }
    };
    info!("Map catalog holds {} maps", catalog.map_count());
    let catalog = Arc::new(catalog);

    let world_config = WorldConfig::default();
    let start_map = world_config.start_map;
    let mut world = WorldState::new(world_config, catalog.clone(), catalog);
    world
        .activate(start_map)
        .with_context(|| format!("activating start {}", start_map))?;

    let server = GameServer::new(config, world);

    let shutdown = tokio::signal::ctrl_c();
    tokio::select! {
        result = server.run() => result?,
        _ = shutdown => {
            info!("Interrupted, shutting down");
            server.shutdown();
        }
    }
    Ok(())
}
