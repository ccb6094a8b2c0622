//! # Security Flow
//!
//! Passport signing properties and handoff verification end to end:
//!
//! - signatures cover every passport field except the signature itself
//! - confirmations are checked against pinned or advertised world keys
//! - a refused confirmation never moves the agent
//! - signing keys persist in key files across restarts

#[cfg(test)]
mod tests {
    use std::fs;

    use rift_traversal::adapters::{HandoffBehaviour, ScriptedWorld, WorldScript};
    use rift_traversal::algorithms::{canonicalize, sign, verify, verify_passport};
    use rift_traversal::{
        AgentKeys, HandoffConfirm, InMemoryTransport, Passport, PassportDraft, Portal, Position,
        SecurityFault, TraversalApi, TraversalConfig, TraversalDetails, TraversalError,
        TraversalService, TraversalState,
    };

    use crate::integration::{test_config, GRID, LOBBY};

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    fn draft() -> PassportDraft {
        PassportDraft::new("agent-7", "Wanderer", "molt.space", "cyber.grid").with_details(
            TraversalDetails::default()
                .position(Position::new(1.0, 2.0, 3.0))
                .inventory_hash("inv-1")
                .memory_summary("saw the aurora")
                .reputation(0.9),
        )
    }

    fn lobby(behaviour: HandoffBehaviour) -> WorldScript {
        WorldScript::new("molt.space")
            .with_portal(Portal::new("neon-gate", "cyber.grid", GRID))
            .handoff(behaviour)
    }

    struct Worlds {
        transport: InMemoryTransport,
        lobby: ScriptedWorld,
        grid: ScriptedWorld,
    }

    fn worlds(script: WorldScript) -> Worlds {
        let transport = InMemoryTransport::new();
        let lobby = ScriptedWorld::spawn(transport.listen(LOBBY), script);
        let grid = ScriptedWorld::spawn(transport.listen(GRID), WorldScript::new("cyber.grid"));
        Worlds {
            transport,
            lobby,
            grid,
        }
    }

    async fn ready_agent(
        w: &Worlds,
        config: TraversalConfig,
    ) -> TraversalService<InMemoryTransport> {
        let service = TraversalService::builder(config, w.transport.clone())
            .keys(AgentKeys::generate())
            .build()
            .unwrap();
        service.connect(None).await.unwrap();
        assert_eq!(service.discover().await.unwrap().len(), 1);
        service
    }

    // =============================================================================
    // INTEGRATION TESTS: PASSPORT SIGNATURES
    // =============================================================================

    /// Any single-field change invalidates the signature
    #[test]
    fn test_tampering_any_field_breaks_signature() {
        let keys = AgentKeys::generate();
        let signed = sign(draft().seal_unsigned(), &keys).unwrap();
        let signature = signed.signature().unwrap().to_string();
        let public_key = keys.public_key_base64();

        assert!(verify(&canonicalize(&signed).unwrap(), &signature, &public_key).unwrap());

        let tampers: [(&str, fn(&mut PassportDraft)); 10] = [
            ("agent_id", |d| d.agent_id.push('x')),
            ("agent_name", |d| d.agent_name = "Impostor".into()),
            ("source_world", |d| d.source_world = "void.null".into()),
            ("target_world", |d| d.target_world = "void.null".into()),
            ("position", |d| d.position.x += 0.5),
            ("inventory_hash", |d| d.inventory_hash = "inv-2".into()),
            ("memory_summary", |d| d.memory_summary.clear()),
            ("reputation", |d| d.reputation = 1.0),
            ("timestamp", |d| d.timestamp += 1.0),
            ("nonce", |d| d.nonce = "replayed".into()),
        ];
        for (field, tamper) in tampers {
            let mut edited = signed.clone().into_draft();
            tamper(&mut edited);
            let canonical = canonicalize(&edited.seal_unsigned()).unwrap();
            assert!(
                !verify(&canonical, &signature, &public_key).unwrap(),
                "changing {field} kept the signature valid"
            );
        }
    }

    /// Re-signing a signed passport matches signing it fresh
    #[test]
    fn test_resigning_matches_fresh_signature() {
        let keys = AgentKeys::generate();
        let unsigned = draft().seal_unsigned();

        let fresh = sign(unsigned.clone(), &keys).unwrap();
        let resigned = sign(fresh.clone(), &keys).unwrap();

        assert_eq!(canonicalize(&fresh).unwrap(), canonicalize(&unsigned).unwrap());
        assert_eq!(canonicalize(&resigned).unwrap(), canonicalize(&unsigned).unwrap());
        // Ed25519 is deterministic.
        assert_eq!(fresh.signature(), resigned.signature());
        assert!(verify_passport(&resigned, &keys.public_key_base64()).unwrap());
    }

    #[test]
    fn test_other_key_does_not_verify() {
        let signed = sign(draft().seal_unsigned(), &AgentKeys::generate()).unwrap();
        let stranger = AgentKeys::generate().public_key_base64();
        assert!(!verify_passport(&signed, &stranger).unwrap());
    }

    // =============================================================================
    // INTEGRATION TESTS: HANDOFF VERIFICATION
    // =============================================================================

    /// Invalid confirmation signature: security fault, agent stays connected to the lobby
    #[tokio::test]
    async fn test_invalid_confirmation_keeps_lobby_session() {
        let w = worlds(lobby(HandoffBehaviour::ConfirmWithForgedSignature));
        let agent = ready_agent(&w, test_config()).await;

        let err = agent
            .enter("neon-gate", TraversalDetails::default())
            .await
            .unwrap_err();

        assert!(err.is_security(), "{err}");
        assert_eq!(agent.state(), TraversalState::Connected);
        let status = agent.status();
        assert!(status.connected);
        assert_eq!(status.current_world.as_deref(), Some("molt.space"));
        assert_eq!(w.grid.session_count(), 0);

        // Lobby link is still open.
        assert_eq!(agent.discover().await.unwrap().len(), 1);
    }

    /// Missing signature with enforcement on never reaches Transitioning
    #[tokio::test]
    async fn test_missing_signature_refused() {
        let w = worlds(lobby(HandoffBehaviour::ConfirmUnsigned));
        let agent = ready_agent(&w, test_config()).await;
        let mut states = agent.subscribe_state();

        let err = agent
            .enter("neon-gate", TraversalDetails::default())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            TraversalError::Security(SecurityFault::MissingSignature)
        ));
        assert_eq!(*states.borrow_and_update(), TraversalState::Connected);
        assert_eq!(w.grid.session_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_signature_tolerated_when_relaxed() {
        let w = worlds(lobby(HandoffBehaviour::ConfirmUnsigned));
        let mut config = test_config();
        config.security.require_signatures = false;
        let agent = ready_agent(&w, config).await;

        let result = agent
            .enter("neon-gate", TraversalDetails::default())
            .await
            .unwrap();
        assert_eq!(result.arrived_world, "cyber.grid");
    }

    /// A pinned key verifies a world that does not advertise one
    #[tokio::test]
    async fn test_pinned_key_verifies_silent_world() {
        let w = worlds(lobby(HandoffBehaviour::Confirm).hide_key());
        let mut config = test_config();
        config
            .security
            .trusted_world_keys
            .insert("cyber.grid".into(), w.lobby.public_key());
        let agent = ready_agent(&w, config).await;

        let result = agent
            .enter("neon-gate", TraversalDetails::default())
            .await
            .unwrap();
        assert_eq!(result.arrived_world, "cyber.grid");
        assert_eq!(agent.state(), TraversalState::Arrived);
    }

    /// No pinned or advertised key: the signer is unknown
    #[tokio::test]
    async fn test_unknown_signer_refused() {
        let w = worlds(lobby(HandoffBehaviour::Confirm).hide_key());
        let agent = ready_agent(&w, test_config()).await;

        let err = agent
            .enter("neon-gate", TraversalDetails::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TraversalError::Security(SecurityFault::UnknownSigner(ref world)) if world == "cyber.grid"
        ));
        assert_eq!(agent.state(), TraversalState::Connected);
    }

    /// A pinned key wins over whatever key the confirmation advertises
    #[tokio::test]
    async fn test_pinned_key_overrides_advertised_key() {
        let w = worlds(lobby(HandoffBehaviour::Confirm));
        let mut config = test_config();
        config
            .security
            .trusted_world_keys
            .insert("cyber.grid".into(), AgentKeys::generate().public_key_base64());
        let agent = ready_agent(&w, config).await;

        let err = agent
            .enter("neon-gate", TraversalDetails::default())
            .await
            .unwrap_err();
        assert!(err.is_security(), "{err}");
        assert_eq!(w.grid.session_count(), 0);
    }

    /// Direct verification of a hand-built confirmation
    #[tokio::test]
    async fn test_verify_handoff_through_api() {
        let w = worlds(lobby(HandoffBehaviour::Confirm));
        let agent = TraversalService::builder(test_config(), w.transport.clone())
            .keys(AgentKeys::generate())
            .build()
            .unwrap();

        let world_keys = AgentKeys::generate();
        let passport = draft().seal_unsigned();
        let signature = world_keys.sign(&canonicalize(&passport).unwrap());
        let mut confirm = HandoffConfirm {
            passport: Some(passport),
            signature: Some(signature),
            sender_public_key: Some(world_keys.public_key_base64()),
            target_url: None,
        };
        assert!(agent.verify_handoff(&confirm).unwrap());

        confirm.signature = None;
        assert!(agent.verify_handoff(&confirm).is_err());
    }

    // =============================================================================
    // INTEGRATION TESTS: KEY FILES
    // =============================================================================

    /// The key generated on first start is reused on the next
    #[tokio::test]
    async fn test_key_file_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config();
        config.security.key_path = Some(dir.path().join("keys").join("agent.key"));

        let first = TraversalService::new(config.clone(), InMemoryTransport::new()).unwrap();
        let second = TraversalService::new(config.clone(), InMemoryTransport::new()).unwrap();

        assert!(first.public_key().is_some());
        assert_eq!(first.public_key(), second.public_key());

        let passport: Passport = second
            .create_passport("cyber.grid", TraversalDetails::default())
            .unwrap();
        assert!(verify_passport(&passport, &first.public_key().unwrap()).unwrap());
    }

    /// A corrupt key file is an error, never silently replaced
    #[tokio::test]
    async fn test_corrupt_key_file_refused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.key");
        fs::write(&path, "definitely not a key").unwrap();

        let mut config = test_config();
        config.security.key_path = Some(path.clone());
        let err = TraversalService::new(config, InMemoryTransport::new())
            .err()
            .unwrap();

        assert!(matches!(
            err,
            TraversalError::Security(SecurityFault::KeyUnavailable(_))
        ));
        assert_eq!(fs::read_to_string(&path).unwrap(), "definitely not a key");
    }
}
