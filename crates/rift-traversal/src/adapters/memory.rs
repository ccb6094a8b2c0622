//! In-memory transport and scripted worlds.
//!
//! `InMemoryTransport` routes `open` calls to listeners registered by
//! address, so tests and demos can run whole traversals without sockets.
//! `ScriptedWorld` serves a listener with configurable world behaviour.

use crate::algorithms::passport_codec::canonicalize;
use crate::domain::identity::AgentKeys;
use crate::domain::passport::Passport;
use crate::domain::portal::Portal;
use crate::domain::unix_timestamp;
use crate::ports::outbound::{
    LinkCommand, TransportError, TransportEvent, WorldLink, WorldTransport,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;
use uuid::Uuid;

const LINK_CAPACITY: usize = 64;

/// Transport whose worlds live in the same process.
#[derive(Clone, Default)]
pub struct InMemoryTransport {
    worlds: Arc<Mutex<HashMap<String, mpsc::UnboundedSender<WorldSession>>>>,
    open_attempts: Arc<AtomicUsize>,
}

impl InMemoryTransport {
    /// Transport with no worlds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept links for `address`. Replaces any earlier listener.
    pub fn listen(&self, address: impl Into<String>) -> WorldListener {
        let address = address.into();
        let (tx, rx) = mpsc::unbounded_channel();
        self.worlds.lock().insert(address.clone(), tx);
        WorldListener {
            address,
            sessions: rx,
        }
    }

    /// Stop accepting links for `address`.
    pub fn shutdown_world(&self, address: &str) {
        self.worlds.lock().remove(address);
    }

    /// Number of `open` calls so far, successful or not.
    pub fn open_attempts(&self) -> usize {
        self.open_attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WorldTransport for InMemoryTransport {
    async fn open(&self, address: &str) -> Result<WorldLink, TransportError> {
        self.open_attempts.fetch_add(1, Ordering::SeqCst);
        let unreachable = |reason: &str| TransportError::Unreachable {
            address: address.to_string(),
            reason: reason.to_string(),
        };

        let listener = self
            .worlds
            .lock()
            .get(address)
            .cloned()
            .ok_or_else(|| unreachable("no world listening"))?;

        let (command_tx, command_rx) = mpsc::channel(LINK_CAPACITY);
        let (event_tx, event_rx) = mpsc::channel(LINK_CAPACITY);
        listener
            .send(WorldSession {
                commands: command_rx,
                events: event_tx,
            })
            .map_err(|_| unreachable("listener closed"))?;

        Ok(WorldLink {
            commands: command_tx,
            events: event_rx,
        })
    }
}

/// A world's accept queue.
pub struct WorldListener {
    address: String,
    sessions: mpsc::UnboundedReceiver<WorldSession>,
}

impl WorldListener {
    /// Address this listener serves.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Next incoming session.
    pub async fn accept(&mut self) -> Option<WorldSession> {
        self.sessions.recv().await
    }
}

/// The world's end of one link.
pub struct WorldSession {
    commands: mpsc::Receiver<LinkCommand>,
    events: mpsc::Sender<TransportEvent>,
}

impl WorldSession {
    /// Send a raw text frame. False once the agent side is gone.
    pub async fn send_frame(&self, text: impl Into<String>) -> bool {
        self.events
            .send(TransportEvent::Frame(text.into()))
            .await
            .is_ok()
    }

    /// Send a JSON frame.
    pub async fn send_json(&self, value: &Value) -> bool {
        self.send_frame(value.to_string()).await
    }

    /// Next frame from the agent. `None` once the agent closes the link.
    pub async fn recv_frame(&mut self) -> Option<String> {
        match self.commands.recv().await {
            Some(LinkCommand::Send(text)) => Some(text),
            Some(LinkCommand::Close) | None => None,
        }
    }

    /// Next frame from the agent that parses as JSON.
    pub async fn recv_json(&mut self) -> Option<Value> {
        loop {
            let text = self.recv_frame().await?;
            if let Ok(value) = serde_json::from_str(&text) {
                return Some(value);
            }
        }
    }

    /// Close from the world side.
    pub async fn close(self, reason: &str) {
        let _ = self
            .events
            .send(TransportEvent::Closed {
                code: Some(1000),
                reason: reason.to_string(),
            })
            .await;
    }

    fn closer(&self) -> mpsc::Sender<TransportEvent> {
        self.events.clone()
    }
}

/// How a scripted world answers `handoff_request`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandoffBehaviour {
    /// Confirm, signed with the world key.
    Confirm,
    /// Confirm with no signature.
    ConfirmUnsigned,
    /// Confirm, signed with a key other than the advertised one.
    ConfirmWithForgedSignature,
    /// Confirm a passport with a different nonce, correctly signed.
    ConfirmDifferentPassport,
    /// Send `handoff_rejected` with this reason.
    Reject(String),
    /// Send `error` with this message.
    Error(String),
    /// Never answer.
    Ignore,
}

/// Behaviour of a scripted world.
#[derive(Clone, Debug)]
pub struct WorldScript {
    /// Name sent in the welcome.
    pub world_name: String,
    /// Version sent in the welcome.
    pub version: String,
    /// Portals returned by discovery.
    pub portals: Vec<Portal>,
    /// Send a welcome on connect.
    pub send_welcome: bool,
    /// Answer discovery requests.
    pub answer_discovery: bool,
    /// Handoff answer.
    pub handoff: HandoffBehaviour,
    /// Include `sender_public_key` in confirmations.
    pub advertise_key: bool,
    /// `target_url` included in confirmations.
    pub target_url: Option<String>,
}

impl WorldScript {
    /// A well-behaved world with no portals.
    pub fn new(world_name: impl Into<String>) -> Self {
        Self {
            world_name: world_name.into(),
            version: "1.0.0".into(),
            portals: Vec::new(),
            send_welcome: true,
            answer_discovery: true,
            handoff: HandoffBehaviour::Confirm,
            advertise_key: true,
            target_url: None,
        }
    }

    /// Add a portal.
    pub fn with_portal(mut self, portal: Portal) -> Self {
        self.portals.push(portal);
        self
    }

    /// Never send a welcome.
    pub fn silent(mut self) -> Self {
        self.send_welcome = false;
        self
    }

    /// Never answer discovery.
    pub fn ignoring_discovery(mut self) -> Self {
        self.answer_discovery = false;
        self
    }

    /// Set the handoff answer.
    pub fn handoff(mut self, behaviour: HandoffBehaviour) -> Self {
        self.handoff = behaviour;
        self
    }

    /// Leave `sender_public_key` out of confirmations.
    pub fn hide_key(mut self) -> Self {
        self.advertise_key = false;
        self
    }

    /// Put `target_url` in confirmations.
    pub fn target_url(mut self, url: impl Into<String>) -> Self {
        self.target_url = Some(url.into());
        self
    }
}

/// A world served by a background task.
pub struct ScriptedWorld {
    keys: Arc<AgentKeys>,
    received: Arc<Mutex<Vec<Value>>>,
    sessions: Arc<Mutex<Vec<mpsc::Sender<TransportEvent>>>>,
    task: JoinHandle<()>,
}

impl ScriptedWorld {
    /// Serve `listener` according to `script`.
    pub fn spawn(mut listener: WorldListener, script: WorldScript) -> Self {
        let keys = Arc::new(AgentKeys::generate());
        let received = Arc::new(Mutex::new(Vec::new()));
        let sessions = Arc::new(Mutex::new(Vec::new()));
        let script = Arc::new(script);

        let task = {
            let keys = Arc::clone(&keys);
            let received = Arc::clone(&received);
            let sessions = Arc::clone(&sessions);
            tokio::spawn(async move {
                while let Some(session) = listener.accept().await {
                    debug!(world = %script.world_name, "Scripted world accepted a session");
                    sessions.lock().push(session.closer());
                    tokio::spawn(serve(
                        session,
                        Arc::clone(&script),
                        Arc::clone(&keys),
                        Arc::clone(&received),
                    ));
                }
            })
        };

        Self {
            keys,
            received,
            sessions,
            task,
        }
    }

    /// The world's signing key, base64.
    pub fn public_key(&self) -> String {
        self.keys.public_key_base64()
    }

    /// Every frame received so far, across sessions.
    pub fn received(&self) -> Vec<Value> {
        self.received.lock().clone()
    }

    /// Received frames of one kind.
    pub fn received_of(&self, kind: &str) -> Vec<Value> {
        self.received
            .lock()
            .iter()
            .filter(|f| f.get("type").and_then(Value::as_str) == Some(kind))
            .cloned()
            .collect()
    }

    /// Sessions accepted so far.
    pub fn session_count(&self) -> usize {
        self.sessions.lock().len()
    }

    /// Close every session from the world side.
    pub async fn drop_connections(&self) {
        let senders: Vec<_> = self.sessions.lock().drain(..).collect();
        for events in senders {
            let _ = events
                .send(TransportEvent::Closed {
                    code: Some(1001),
                    reason: "world going away".into(),
                })
                .await;
        }
    }
}

impl Drop for ScriptedWorld {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(
    mut session: WorldSession,
    script: Arc<WorldScript>,
    keys: Arc<AgentKeys>,
    received: Arc<Mutex<Vec<Value>>>,
) {
    if script.send_welcome {
        let welcome = json!({
            "type": "welcome",
            "world_name": script.world_name,
            "version": script.version,
            "capabilities": ["portals", "relay"],
        });
        if !session.send_json(&welcome).await {
            return;
        }
    }

    while let Some(frame) = session.recv_json().await {
        received.lock().push(frame.clone());
        let reply = match frame.get("type").and_then(Value::as_str) {
            Some("discover") if script.answer_discovery => Some(json!({
                "type": "discover_response",
                "portals": serde_json::to_value(&script.portals).unwrap_or_default(),
                "registered_worlds": 1,
            })),
            Some("discover") => None,
            Some("handoff_request") => handoff_reply(&script, &keys, &frame),
            Some("ping") => Some(json!({"type": "pong", "timestamp": unix_timestamp()})),
            Some(other) => Some(json!({
                "type": "error",
                "code": "UNKNOWN_TYPE",
                "message": format!("Unknown message type: {other}"),
            })),
            None => None,
        };
        if let Some(reply) = reply {
            if !session.send_json(&reply).await {
                break;
            }
        }
    }
}

fn handoff_reply(script: &WorldScript, keys: &AgentKeys, frame: &Value) -> Option<Value> {
    let passport: Option<Passport> = frame
        .get("passport")
        .cloned()
        .and_then(|p| serde_json::from_value(p).ok());
    let Some(passport) = passport else {
        return Some(json!({
            "type": "handoff_rejected",
            "reason": "Invalid passport",
            "details": "passport missing or malformed",
        }));
    };

    let echoed = match &script.handoff {
        HandoffBehaviour::Reject(reason) => {
            return Some(json!({
                "type": "handoff_rejected",
                "reason": reason,
                "details": format!("{} refused entry", script.world_name),
            }))
        }
        HandoffBehaviour::Error(message) => {
            return Some(json!({"type": "error", "code": "HANDOFF_FAILED", "message": message}))
        }
        HandoffBehaviour::Ignore => return None,
        HandoffBehaviour::ConfirmDifferentPassport => {
            let mut draft = passport.into_draft();
            draft.nonce = Uuid::new_v4().to_string();
            draft.seal_unsigned()
        }
        _ => passport,
    };

    let canonical = match canonicalize(&echoed) {
        Ok(bytes) => bytes,
        Err(e) => {
            return Some(json!({"type": "error", "code": "BAD_PASSPORT", "message": e.to_string()}))
        }
    };
    let signature = match script.handoff {
        HandoffBehaviour::ConfirmUnsigned => None,
        HandoffBehaviour::ConfirmWithForgedSignature => Some(AgentKeys::generate().sign(&canonical)),
        _ => Some(keys.sign(&canonical)),
    };

    let mut confirm = Map::new();
    confirm.insert("type".into(), json!("handoff_confirm"));
    confirm.insert(
        "passport".into(),
        serde_json::to_value(&echoed).unwrap_or_default(),
    );
    if let Some(signature) = signature {
        confirm.insert("signature".into(), json!(signature));
    }
    if script.advertise_key {
        confirm.insert("sender_public_key".into(), json!(keys.public_key_base64()));
    }
    if let Some(url) = &script.target_url {
        confirm.insert("target_url".into(), json!(url));
    }
    Some(Value::Object(confirm))
}
