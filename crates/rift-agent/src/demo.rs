//! A complete crossing between two in-process worlds.

use anyhow::Result;
use rift_traversal::adapters::{ScriptedWorld, WorldScript};
use rift_traversal::{
    AgentKeys, InMemoryTransport, Portal, Position, TraversalApi, TraversalConfig,
    TraversalDetails, TraversalResult, TraversalService,
};
use tracing::info;

const LOBBY: &str = "mem://molt.space";
const GRID: &str = "mem://cyber.grid";

/// Run connect, discover and enter against scripted worlds.
pub async fn run(mut config: TraversalConfig) -> Result<TraversalResult> {
    let transport = InMemoryTransport::new();
    let lobby = ScriptedWorld::spawn(
        transport.listen(LOBBY),
        WorldScript::new("molt.space")
            .with_portal(Portal::new("neon-gate", "cyber.grid", GRID).named("Neon Gate")),
    );
    let _grid = ScriptedWorld::spawn(transport.listen(GRID), WorldScript::new("cyber.grid"));

    // The lobby signs confirmations and advertises its key.
    config.default_world = LOBBY.to_string();
    let service = TraversalService::builder(config, transport)
        .keys(AgentKeys::generate())
        .build()?;

    service.connect(None).await?;
    let portals = service.discover().await?;
    info!("Lobby offers {} portal(s)", portals.len());

    let details = TraversalDetails::default()
        .position(Position::new(12.0, 0.0, -4.5))
        .memory_summary("Met the forge keepers in the lobby");
    let result = service.enter("neon-gate", details).await?;

    info!(
        requests = lobby.received_of("handoff_request").len(),
        "Lobby handled the handoff"
    );
    service.disconnect().await;
    Ok(result)
}
