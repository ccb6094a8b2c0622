//! # Traversal Flow
//!
//! An agent crosses from the lobby into another world:
//!
//! 1. connect → welcome → `Connected`
//! 2. discover → portal registry filled
//! 3. enter → `HandoffPending` → signed confirmation → `Transitioning`
//! 4. reconnect at the destination → `Arrived`

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use rift_traversal::adapters::{HandoffBehaviour, ScriptedWorld, WorldScript};
    use rift_traversal::algorithms::{verify_frame, verify_passport};
    use rift_traversal::{
        AgentKeys, HandoffFault, InMemoryTransport, Passport, Portal, Position, RealmNarrator,
        TraversalApi, TraversalConfig, TraversalDetails, TraversalError, TraversalService,
        TraversalState,
    };

    use crate::integration::{test_config, GRID, LOBBY, VOID};

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    fn neon_gate() -> Portal {
        Portal::new("neon-gate", "cyber.grid", GRID).named("Neon Gate")
    }

    fn void_rift() -> Portal {
        Portal::new("void-rift", "void.null", VOID).named("The Tear")
    }

    fn lobby_script() -> WorldScript {
        WorldScript::new("molt.space")
            .with_portal(neon_gate())
            .with_portal(void_rift())
    }

    struct Multiverse {
        lobby: ScriptedWorld,
        grid: ScriptedWorld,
        void: ScriptedWorld,
        agent_key: String,
        service: Arc<TraversalService<InMemoryTransport>>,
    }

    fn multiverse(lobby: WorldScript, config: TraversalConfig) -> Multiverse {
        let transport = InMemoryTransport::new();
        let lobby = ScriptedWorld::spawn(transport.listen(LOBBY), lobby);
        let grid = ScriptedWorld::spawn(transport.listen(GRID), WorldScript::new("cyber.grid"));
        let void = ScriptedWorld::spawn(transport.listen(VOID), WorldScript::new("void.null"));

        let keys = AgentKeys::generate();
        let agent_key = keys.public_key_base64();
        let service = TraversalService::builder(config, transport)
            .keys(keys)
            .build()
            .unwrap();
        Multiverse {
            lobby,
            grid,
            void,
            agent_key,
            service: Arc::new(service),
        }
    }

    async fn wait_for_state(service: &TraversalService<InMemoryTransport>, state: TraversalState) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while service.state() != state {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("never reached {state}"));
    }

    // =============================================================================
    // INTEGRATION TESTS: FULL CROSSING
    // =============================================================================

    /// connect → discover 2 portals → enter → Arrived at the portal's world
    #[tokio::test]
    async fn test_agent_crosses_into_destination_world() {
        let m = multiverse(lobby_script(), test_config());

        let welcome = m.service.connect(None).await.unwrap();
        assert_eq!(welcome.world_name, "molt.space");
        assert_eq!(m.service.state(), TraversalState::Connected);

        let portals = m.service.discover().await.unwrap();
        assert_eq!(portals.len(), 2);
        assert_eq!(m.service.portals(), portals);

        let details = TraversalDetails::default()
            .position(Position::new(3.0, 1.5, -8.0))
            .inventory_hash("abc123")
            .memory_summary("Traded lore with the molt keepers")
            .reputation(0.75);
        let result = m.service.enter("neon-gate", details).await.unwrap();

        assert_eq!(result.destination_world, "cyber.grid");
        assert_eq!(result.destination_address, GRID);
        assert_eq!(result.arrived_world, "cyber.grid");
        assert_eq!(result.source_world, "molt.space");
        assert_eq!(m.service.state(), TraversalState::Arrived);

        let status = m.service.status();
        assert!(status.connected);
        assert_eq!(status.current_world.as_deref(), Some("cyber.grid"));
        assert_eq!(status.current_address.as_deref(), Some(GRID));
        assert_eq!(status.discovered_portals, 0);

        assert_eq!(m.grid.session_count(), 1);
        assert_eq!(m.void.session_count(), 0);
    }

    /// The passport the lobby saw carries the caller's details and the agent's signature
    #[tokio::test]
    async fn test_lobby_receives_signed_passport() {
        let m = multiverse(lobby_script(), test_config());
        m.service.connect(None).await.unwrap();
        m.service.discover().await.unwrap();

        let details = TraversalDetails::default()
            .position(Position::new(3.0, 1.5, -8.0))
            .memory_summary("Traded lore with the molt keepers");
        let result = m.service.enter("neon-gate", details).await.unwrap();

        let requests = m.lobby.received_of("handoff_request");
        assert_eq!(requests.len(), 1);
        let frame = &requests[0];
        assert_eq!(frame["portal_id"], "neon-gate");
        assert!(verify_frame(frame, &m.agent_key).unwrap());

        let passport: Passport = serde_json::from_value(frame["passport"].clone()).unwrap();
        assert_eq!(passport.agent_name(), "Wanderer");
        assert_eq!(passport.source_world(), "molt.space");
        assert_eq!(passport.target_world(), "cyber.grid");
        assert_eq!(passport.position(), Position::new(3.0, 1.5, -8.0));
        assert!(verify_passport(&passport, &m.agent_key).unwrap());
        assert_eq!(
            result.passport_hash,
            rift_traversal::content_hash(&passport).unwrap()
        );
    }

    /// Narration comes from the realm being left
    #[tokio::test]
    async fn test_narration_follows_source_realm() {
        let m = multiverse(lobby_script(), test_config());
        m.service.connect(None).await.unwrap();
        m.service.discover().await.unwrap();

        let result = m
            .service
            .enter("void-rift", TraversalDetails::default())
            .await
            .unwrap();

        let narration = result.narration.unwrap();
        assert!(RealmNarrator::candidates("molt.space", "void.null").contains(&narration.as_str()));
        assert_eq!(m.void.session_count(), 1);
    }

    #[tokio::test]
    async fn test_narration_disabled() {
        let mut config = test_config();
        config.narrate_transitions = false;
        let m = multiverse(lobby_script(), config);
        m.service.connect(None).await.unwrap();
        m.service.discover().await.unwrap();

        let result = m
            .service
            .enter("neon-gate", TraversalDetails::default())
            .await
            .unwrap();
        assert!(result.narration.is_none());
    }

    /// State is HandoffPending while the confirmation is outstanding
    #[tokio::test]
    async fn test_handoff_pending_while_waiting() {
        let mut config = test_config();
        config.handoff_timeout_ms = 1_000;
        let m = multiverse(lobby_script().handoff(HandoffBehaviour::Ignore), config);
        m.service.connect(None).await.unwrap();
        m.service.discover().await.unwrap();

        let service = Arc::clone(&m.service);
        let entering =
            tokio::spawn(async move { service.enter("neon-gate", TraversalDetails::default()).await });

        wait_for_state(&m.service, TraversalState::HandoffPending).await;

        let err = entering.await.unwrap().unwrap_err();
        assert!(matches!(
            err,
            TraversalError::Handoff(HandoffFault::Timeout { timeout_ms: 1_000 })
        ));
        assert_eq!(m.service.state(), TraversalState::Connected);
        assert!(m.service.status().connected);
        assert_eq!(m.grid.session_count(), 0);
    }

    /// Unknown portal fails before anything is sent and leaves state alone
    #[tokio::test]
    async fn test_unknown_portal_leaves_state_unchanged() {
        let m = multiverse(lobby_script(), test_config());
        m.service.connect(None).await.unwrap();
        m.service.discover().await.unwrap();
        let before = m.service.state();

        let err = m
            .service
            .enter("portal-that-does-not-exist", TraversalDetails::default())
            .await
            .unwrap_err();

        assert!(err.is_handoff());
        assert!(err.to_string().contains("portal-that-does-not-exist"));
        assert_eq!(m.service.state(), before);
        assert!(m.lobby.received_of("handoff_request").is_empty());
    }

    /// Entering without discovering first is an unknown portal
    #[tokio::test]
    async fn test_enter_requires_discovery() {
        let m = multiverse(lobby_script(), test_config());
        m.service.connect(None).await.unwrap();

        let err = m
            .service
            .enter("neon-gate", TraversalDetails::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TraversalError::Handoff(HandoffFault::UnknownPortal(_))
        ));
        assert_eq!(m.service.state(), TraversalState::Connected);
    }

    /// A rejecting world keeps the agent at home with its session intact
    #[tokio::test]
    async fn test_rejection_keeps_session() {
        let m = multiverse(
            lobby_script().handoff(HandoffBehaviour::Reject("Reputation too low".into())),
            test_config(),
        );
        m.service.connect(None).await.unwrap();
        m.service.discover().await.unwrap();

        let err = m
            .service
            .enter("neon-gate", TraversalDetails::default())
            .await
            .unwrap_err();
        match err {
            TraversalError::Handoff(HandoffFault::Rejected(reason)) => {
                assert!(reason.contains("Reputation too low"))
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(m.service.state(), TraversalState::Connected);

        // Session still usable.
        assert_eq!(m.service.discover().await.unwrap().len(), 2);
    }

    /// Discovery that never gets an answer yields an empty set within the timeout
    #[tokio::test]
    async fn test_unanswered_discovery_is_empty() {
        let m = multiverse(lobby_script().ignoring_discovery(), test_config());
        m.service.connect(None).await.unwrap();

        let portals = tokio::time::timeout(Duration::from_secs(2), m.service.discover())
            .await
            .expect("discover must not hang")
            .unwrap();
        assert!(portals.is_empty());
        assert_eq!(m.service.state(), TraversalState::Connected);
    }

    /// Chained crossing: lobby → grid, then explicit reconnect back to the lobby
    #[tokio::test]
    async fn test_return_trip() {
        let m = multiverse(lobby_script(), test_config());
        m.service.connect(None).await.unwrap();
        m.service.discover().await.unwrap();
        m.service
            .enter("neon-gate", TraversalDetails::default())
            .await
            .unwrap();

        let welcome = m.service.connect(Some(LOBBY)).await.unwrap();
        assert_eq!(welcome.world_name, "molt.space");
        assert_eq!(m.service.state(), TraversalState::Connected);
        assert_eq!(m.lobby.session_count(), 2);
        assert_eq!(m.service.discover().await.unwrap().len(), 2);
    }
}
