//! # Connection Flow
//!
//! Link lifecycle against real WebSocket worlds on loopback ports and
//! against in-process worlds:
//!
//! - welcome handshake, signed frames, crossing between two sockets
//! - worlds that never greet, refuse connections, or hang up

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use futures_util::{SinkExt, StreamExt};
    use parking_lot::Mutex;
    use serde_json::{json, Value};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::sync::watch;
    use tokio::task::JoinHandle;
    use tokio_tungstenite::tungstenite::Message;

    use rift_traversal::adapters::{ScriptedWorld, WorldScript};
    use rift_traversal::algorithms::{canonicalize, verify_frame};
    use rift_traversal::{
        AgentKeys, ConnectionFault, InMemoryTransport, Passport, TraversalApi, TraversalDetails,
        TraversalError, TraversalService, TraversalState, WebSocketTransport,
    };

    use crate::integration::{test_config, LOBBY};

    // =============================================================================
    // TEST FIXTURES: LOOPBACK WEBSOCKET WORLD
    // =============================================================================

    #[derive(Clone)]
    struct Behaviour {
        world_name: String,
        greet: bool,
        portals: Vec<Value>,
    }

    impl Behaviour {
        fn world(name: &str) -> Self {
            Self {
                world_name: name.to_string(),
                greet: true,
                portals: Vec::new(),
            }
        }
    }

    /// A minimal world server speaking the relay protocol over a real socket.
    struct LoopbackWorld {
        address: String,
        keys: Arc<AgentKeys>,
        received: Arc<Mutex<Vec<Value>>>,
        hangup: watch::Sender<bool>,
        task: JoinHandle<()>,
    }

    impl LoopbackWorld {
        async fn spawn(behaviour: Behaviour) -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let address = format!("ws://{}", listener.local_addr().unwrap());
            let keys = Arc::new(AgentKeys::generate());
            let received = Arc::new(Mutex::new(Vec::new()));
            let (hangup, hangup_rx) = watch::channel(false);

            let task = {
                let keys = Arc::clone(&keys);
                let received = Arc::clone(&received);
                tokio::spawn(async move {
                    while let Ok((stream, _)) = listener.accept().await {
                        tokio::spawn(serve(
                            stream,
                            behaviour.clone(),
                            Arc::clone(&keys),
                            Arc::clone(&received),
                            hangup_rx.clone(),
                        ));
                    }
                })
            };

            Self {
                address,
                keys,
                received,
                hangup,
                task,
            }
        }

        fn received_of(&self, kind: &str) -> Vec<Value> {
            self.received
                .lock()
                .iter()
                .filter(|f| f["type"] == kind)
                .cloned()
                .collect()
        }

        /// Close every open session from the world side.
        fn hang_up(&self) {
            self.hangup.send_replace(true);
        }
    }

    impl Drop for LoopbackWorld {
        fn drop(&mut self) {
            self.task.abort();
        }
    }

    async fn serve(
        stream: TcpStream,
        behaviour: Behaviour,
        keys: Arc<AgentKeys>,
        received: Arc<Mutex<Vec<Value>>>,
        mut hangup: watch::Receiver<bool>,
    ) {
        let Ok(ws) = tokio_tungstenite::accept_async(stream).await else {
            return;
        };
        let (mut write, mut read) = ws.split();

        if behaviour.greet {
            let welcome = json!({
                "type": "welcome",
                "world_name": behaviour.world_name,
                "version": "1.0",
                "capabilities": ["portals"],
            });
            if write.send(Message::Text(welcome.to_string().into())).await.is_err() {
                return;
            }
        }

        // Only hang-ups after this session opened count.
        hangup.borrow_and_update();
        loop {
            let message = tokio::select! {
                changed = hangup.changed() => {
                    let closed = changed.is_err() || *hangup.borrow_and_update();
                    if closed {
                        let _ = write.send(Message::Close(None)).await;
                        return;
                    }
                    continue;
                }
                message = read.next() => message,
            };
            let text = match message {
                Some(Ok(Message::Text(text))) => text,
                Some(Ok(_)) => continue,
                _ => return,
            };
            let Ok(frame) = serde_json::from_str::<Value>(&text) else {
                continue;
            };
            received.lock().push(frame.clone());

            let reply = match frame["type"].as_str() {
                Some("discover") => Some(json!({
                    "type": "discover_response",
                    "portals": behaviour.portals,
                })),
                Some("handoff_request") => {
                    let passport: Passport =
                        serde_json::from_value(frame["passport"].clone()).unwrap();
                    let signature = keys.sign(&canonicalize(&passport).unwrap());
                    Some(json!({
                        "type": "handoff_confirm",
                        "passport": frame["passport"],
                        "signature": signature,
                        "sender_public_key": keys.public_key_base64(),
                    }))
                }
                _ => None,
            };
            if let Some(reply) = reply {
                if write.send(Message::Text(reply.to_string().into())).await.is_err() {
                    return;
                }
            }
        }
    }

    fn ws_agent(default_world: &str) -> (TraversalService<WebSocketTransport>, String) {
        let mut config = test_config();
        config.default_world = default_world.to_string();
        let keys = AgentKeys::generate();
        let public_key = keys.public_key_base64();
        let service = TraversalService::builder(config, WebSocketTransport::new())
            .keys(keys)
            .build()
            .unwrap();
        (service, public_key)
    }

    fn free_port() -> u16 {
        std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port()
    }

    // =============================================================================
    // INTEGRATION TESTS: WEBSOCKET WORLDS
    // =============================================================================

    /// Full crossing between two sockets
    #[tokio::test]
    async fn test_crossing_between_websocket_worlds() {
        let grid = LoopbackWorld::spawn(Behaviour::world("cyber.grid")).await;
        let mut lobby_behaviour = Behaviour::world("molt.space");
        lobby_behaviour.portals = vec![
            json!({
                "id": "neon-gate",
                "name": "Neon Gate",
                "destination_world": "cyber.grid",
                "destination_url": grid.address,
            }),
            json!({
                "portal_id": "dead-end",
                "destination_world": "void.null",
            }),
        ];
        let lobby = LoopbackWorld::spawn(lobby_behaviour).await;
        let (agent, agent_key) = ws_agent(&lobby.address);

        let welcome = agent.connect(None).await.unwrap();
        assert_eq!(welcome.world_name, "molt.space");
        assert_eq!(welcome.capabilities, vec!["portals".to_string()]);

        let portals = agent.discover().await.unwrap();
        assert_eq!(portals.len(), 2);
        assert_eq!(portals[1].name, "Unnamed Portal");
        assert_eq!(portals[1].address(), None);

        let result = agent
            .enter("neon-gate", TraversalDetails::default())
            .await
            .unwrap();
        assert_eq!(result.destination_address, grid.address);
        assert_eq!(result.arrived_world, "cyber.grid");
        assert_eq!(agent.state(), TraversalState::Arrived);

        let requests = lobby.received_of("handoff_request");
        assert_eq!(requests.len(), 1);
        assert!(verify_frame(&requests[0], &agent_key).unwrap());
        assert!(verify_frame(&lobby.received_of("discover")[0], &agent_key).unwrap());

        agent.disconnect().await;
        assert_eq!(agent.state(), TraversalState::Disconnected);
    }

    /// A world that accepts the socket but never greets
    #[tokio::test]
    async fn test_silent_websocket_world_times_out() {
        let mut behaviour = Behaviour::world("mute");
        behaviour.greet = false;
        let world = LoopbackWorld::spawn(behaviour).await;
        let (agent, _) = ws_agent(&world.address);

        let err = agent.connect(None).await.unwrap_err();
        match err {
            TraversalError::Connection(ConnectionFault::RetriesExhausted { attempts, last_error }) => {
                assert_eq!(attempts, 2);
                assert!(last_error.contains("No welcome"), "{last_error}");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(agent.state(), TraversalState::Disconnected);
    }

    /// Disconnect while a silent socket holds the welcome wait open
    #[tokio::test]
    async fn test_disconnect_during_websocket_handshake() {
        let mut behaviour = Behaviour::world("mute");
        behaviour.greet = false;
        let world = LoopbackWorld::spawn(behaviour).await;
        let (agent, _) = ws_agent(&world.address);

        let started = tokio::time::Instant::now();
        let (connected, ()) = tokio::join!(agent.connect(None), async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            agent.disconnect().await;
        });

        let err = connected.unwrap_err();
        assert!(
            matches!(
                err,
                TraversalError::Connection(ConnectionFault::Interrupted { .. })
            ),
            "{err:?}"
        );
        assert!(started.elapsed() < Duration::from_millis(450));
        assert_eq!(agent.state(), TraversalState::Disconnected);
    }

    #[tokio::test]
    async fn test_refused_connection_exhausts_retries() {
        let (agent, _) = ws_agent(&format!("ws://127.0.0.1:{}", free_port()));

        let err = agent.connect(None).await.unwrap_err();
        assert!(matches!(
            err,
            TraversalError::Connection(ConnectionFault::RetriesExhausted { attempts: 2, .. })
        ));
        assert!(!agent.status().connected);
    }

    #[tokio::test]
    async fn test_non_websocket_address_refused() {
        let (agent, _) = ws_agent("http://127.0.0.1:1");
        let err = agent.connect(None).await.unwrap_err();
        assert!(err.is_connection());
    }

    /// World hangs up: the agent notices and can reconnect
    #[tokio::test]
    async fn test_world_hangup_then_reconnect() {
        let world = LoopbackWorld::spawn(Behaviour::world("molt.space")).await;
        let (agent, _) = ws_agent(&world.address);
        agent.connect(None).await.unwrap();

        let mut link = agent.subscribe_link();
        world.hang_up();
        tokio::time::timeout(Duration::from_secs(2), link.wait_for(|s| !s.is_ready()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(agent.state(), TraversalState::Disconnected);
        assert!(matches!(
            agent.discover().await.unwrap_err(),
            TraversalError::Connection(ConnectionFault::NotConnected)
        ));

        world.hangup.send_replace(false);
        let welcome = agent.connect(None).await.unwrap();
        assert_eq!(welcome.world_name, "molt.space");
        assert_eq!(agent.state(), TraversalState::Connected);
    }

    // =============================================================================
    // INTEGRATION TESTS: IN-PROCESS WORLDS
    // =============================================================================

    /// Link loss while discovery is outstanding surfaces as a lost connection
    #[tokio::test]
    async fn test_link_loss_during_discovery() {
        let transport = InMemoryTransport::new();
        let lobby = ScriptedWorld::spawn(
            transport.listen(LOBBY),
            WorldScript::new("molt.space").ignoring_discovery(),
        );
        let mut config = test_config();
        config.discovery_timeout_ms = 5_000;
        let agent = Arc::new(
            TraversalService::builder(config, transport)
                .keys(AgentKeys::generate())
                .build()
                .unwrap(),
        );
        agent.connect(None).await.unwrap();

        let discovering = {
            let agent = Arc::clone(&agent);
            tokio::spawn(async move { agent.discover().await })
        };
        tokio::time::timeout(Duration::from_secs(1), async {
            while lobby.received_of("discover").is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        lobby.drop_connections().await;

        let err = tokio::time::timeout(Duration::from_secs(2), discovering)
            .await
            .unwrap()
            .unwrap()
            .unwrap_err();
        assert!(matches!(
            err,
            TraversalError::Connection(ConnectionFault::ConnectionLost)
        ));
        assert_eq!(agent.state(), TraversalState::Disconnected);
    }

    /// Connecting elsewhere replaces the live session
    #[tokio::test]
    async fn test_connect_switches_worlds() {
        let transport = InMemoryTransport::new();
        let lobby = ScriptedWorld::spawn(transport.listen(LOBBY), WorldScript::new("molt.space"));
        let other =
            ScriptedWorld::spawn(transport.listen("mem://elsewhere"), WorldScript::new("elsewhere"));
        let agent = TraversalService::builder(test_config(), transport)
            .keys(AgentKeys::generate())
            .build()
            .unwrap();

        agent.connect(None).await.unwrap();
        let welcome = agent.connect(Some("mem://elsewhere")).await.unwrap();

        assert_eq!(welcome.world_name, "elsewhere");
        assert_eq!(agent.status().current_address.as_deref(), Some("mem://elsewhere"));
        assert_eq!(other.session_count(), 1);
    }
}
