//! Skirmish Server
//!
//! Loads match resources and serves versus rooms over WebSocket.

use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use skirmish::{
    game::resources::ResourceLoader,
    network::versus::{versus_factory, VERSUS_ROOM},
    GameServer, ServerConfig, SessionDirectory, VERSION,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Skirmish Server v{}", VERSION);

    let config = ServerConfig::from_env();
    let resources = ResourceLoader::from_dir(&config.resource_dir)
        .with_context(|| format!("loading resources from {}", config.resource_dir.display()))?;
    info!(
        "Loaded {} entity types, {} maps",
        resources.entities.len(),
        resources.maps.len()
    );

    // Map types name their own subdirectory.
    let map_root = config.resource_dir.clone();
    let mut directory = SessionDirectory::new();
    directory.register_room_type(VERSUS_ROOM, versus_factory(Arc::new(resources), map_root));

    let server = GameServer::new(config, directory);

    tokio::select! {
        result = server.run() => result.context("server stopped")?,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, shutting down");
            server.shutdown();
        }
    }
    Ok(())
}
