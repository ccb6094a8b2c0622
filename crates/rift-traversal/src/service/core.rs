use super::connection::{ConnectionManager, LinkStatus};
use super::dispatcher::{FrameHandler, MessageDispatcher};
use crate::algorithms::envelope::build_frame;
use crate::algorithms::handoff::HandoffVerifier;
use crate::algorithms::narration::RealmNarrator;
use crate::algorithms::passport_codec::{content_hash, sign};
use crate::domain::{
    unix_timestamp, AgentIdentity, AgentKeys, ConnectionFault, HandoffConfirm, HandoffFault,
    OutboundMessage, Passport, PassportDraft, PendingError, PendingHandle, PendingKind,
    PendingOperations, PendingReply, Portal, PortalRegistry, SecurityFault, TraversalConfig,
    TraversalDetails, TraversalError, TraversalResult, TraversalState, TraversalStatus,
    WaitFailure, WelcomeInfo,
};
use crate::ports::outbound::{TransitionNarrator, WorldTransport};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// World of the current session.
#[derive(Clone, Debug, Default)]
struct Session {
    world: Option<String>,
    address: Option<String>,
}

/// Builder for [`TraversalService`].
pub struct TraversalServiceBuilder<T: WorldTransport> {
    config: TraversalConfig,
    transport: T,
    keys: Option<AgentKeys>,
    load_keys: bool,
    narrator: Option<Box<dyn TransitionNarrator>>,
    handlers: HashMap<String, Arc<dyn FrameHandler>>,
}

impl<T: WorldTransport> TraversalServiceBuilder<T> {
    /// Use this key instead of loading one from `security.key_path`.
    pub fn keys(mut self, keys: AgentKeys) -> Self {
        self.keys = Some(keys);
        self.load_keys = false;
        self
    }

    /// Run with no signing key.
    pub fn without_keys(mut self) -> Self {
        self.keys = None;
        self.load_keys = false;
        self
    }

    /// Replace the built-in narrator.
    pub fn narrator(mut self, narrator: impl TransitionNarrator + 'static) -> Self {
        self.narrator = Some(Box::new(narrator));
        self
    }

    /// Handle a world-specific message kind.
    pub fn handler(mut self, kind: impl Into<String>, handler: Arc<dyn FrameHandler>) -> Self {
        self.handlers.insert(kind.into(), handler);
        self
    }

    /// Validate config, load keys, and assemble the service.
    pub fn build(self) -> Result<TraversalService<T>, TraversalError> {
        self.config.validate()?;

        let keys = match (self.keys, self.load_keys) {
            (Some(keys), _) => Some(keys),
            (None, true) => Some(AgentKeys::load_or_generate(
                self.config.security.key_path.as_deref(),
            )?),
            (None, false) => None,
        };
        let identity = AgentIdentity::new(
            self.config.agent.agent_id.clone(),
            self.config.agent.agent_name.clone(),
        );

        let registry = Arc::new(PortalRegistry::new());
        let pending = Arc::new(PendingOperations::new());
        let verifier = HandoffVerifier::from_config(&self.config.security);
        let dispatcher = self.handlers.into_iter().fold(
            MessageDispatcher::new(
                Arc::clone(&registry),
                Arc::clone(&pending),
                verifier.clone(),
            ),
            |d, (kind, handler)| d.with_handler(kind, handler),
        );
        let connection = ConnectionManager::new(
            Arc::new(self.transport),
            self.config.connection.clone(),
            Arc::new(dispatcher),
            Arc::clone(&pending),
        );
        let (state, _) = watch::channel(TraversalState::Disconnected);

        info!(
            agent_id = %identity.agent_id,
            agent_name = %identity.agent_name,
            signing = keys.is_some(),
            "[rift] Traversal service initialized"
        );

        Ok(TraversalService {
            config: self.config,
            identity,
            keys: keys.map(Arc::new),
            connection,
            registry,
            pending,
            verifier,
            narrator: self.narrator.unwrap_or_else(|| Box::new(RealmNarrator::new())),
            state,
            session: Mutex::new(Session::default()),
            operations: tokio::sync::Mutex::new(()),
        })
    }
}

/// Cross-world traversal coordinator.
///
/// Holds one world session at a time and drives the
/// connect, discover, handoff and arrive sequence.
pub struct TraversalService<T: WorldTransport> {
    pub(super) config: TraversalConfig,
    pub(super) identity: AgentIdentity,
    pub(super) keys: Option<Arc<AgentKeys>>,
    pub(super) connection: ConnectionManager<T>,
    pub(super) registry: Arc<PortalRegistry>,
    pub(super) pending: Arc<PendingOperations>,
    pub(super) verifier: HandoffVerifier,
    narrator: Box<dyn TransitionNarrator>,
    state: watch::Sender<TraversalState>,
    session: Mutex<Session>,
    operations: tokio::sync::Mutex<()>,
}

impl<T: WorldTransport> TraversalService<T> {
    /// Start building a service. Keys are loaded from `security.key_path`
    /// (or generated) unless overridden.
    pub fn builder(config: TraversalConfig, transport: T) -> TraversalServiceBuilder<T> {
        TraversalServiceBuilder {
            config,
            transport,
            keys: None,
            load_keys: true,
            narrator: None,
            handlers: HashMap::new(),
        }
    }

    /// Service with default key handling and narrator.
    pub fn new(config: TraversalConfig, transport: T) -> Result<Self, TraversalError> {
        Self::builder(config, transport).build()
    }

    /// Agent identity.
    pub fn identity(&self) -> &AgentIdentity {
        &self.identity
    }

    /// Active configuration.
    pub fn config(&self) -> &TraversalConfig {
        &self.config
    }

    /// Watch state changes.
    pub fn subscribe_state(&self) -> watch::Receiver<TraversalState> {
        self.state.subscribe()
    }

    /// Watch link status changes.
    pub fn subscribe_link(&self) -> watch::Receiver<LinkStatus> {
        self.connection.subscribe()
    }

    /// Base64 public key, when a signing key is loaded.
    pub fn public_key(&self) -> Option<String> {
        self.keys.as_ref().map(|k| k.public_key_base64())
    }

    /// World of the current session.
    pub fn current_world(&self) -> Option<String> {
        self.session.lock().world.clone()
    }

    pub(super) fn current_state(&self) -> TraversalState {
        let state = *self.state.borrow();
        // A link that dropped while idle leaves no session behind.
        if matches!(state, TraversalState::Connected | TraversalState::Arrived)
            && !self.connection.is_ready()
        {
            warn!("[rift] World link dropped while idle");
            self.end_session();
            return TraversalState::Disconnected;
        }
        state
    }

    pub(super) fn status_snapshot(&self) -> TraversalStatus {
        let state = self.current_state();
        let session = self.session.lock().clone();
        TraversalStatus {
            agent_id: self.identity.agent_id.clone(),
            agent_name: self.identity.agent_name.clone(),
            state,
            connected: self.connection.is_ready(),
            current_world: session.world,
            current_address: session.address,
            discovered_portals: self.registry.len(),
            public_key: self.public_key(),
            require_signatures: self.verifier.require_signatures(),
        }
    }

    fn transition(&self, next: TraversalState) {
        let previous = self.state.send_replace(next);
        if previous != next && !previous.can_transition_to(next) {
            warn!(from = %previous, to = %next, "[rift] Unexpected state transition");
        } else {
            debug!(from = %previous, to = %next, "[rift] State transition");
        }
    }

    fn begin_session(&self, address: &str, welcome: &WelcomeInfo) {
        *self.session.lock() = Session {
            world: Some(welcome.world_name.clone()),
            address: Some(address.to_string()),
        };
        self.registry.clear();
    }

    fn end_session(&self) {
        *self.session.lock() = Session::default();
        self.transition(TraversalState::Disconnected);
    }

    /// Back to `Connected` if the link survived, else `Disconnected`.
    fn settle(&self) {
        if self.connection.is_ready() {
            self.transition(TraversalState::Connected);
        } else {
            self.end_session();
        }
    }

    fn ensure_session(&self) -> Result<(), TraversalError> {
        if self.current_state().has_session() {
            Ok(())
        } else {
            Err(ConnectionFault::NotConnected.into())
        }
    }

    async fn send(&self, message: OutboundMessage) -> Result<(), TraversalError> {
        let frame = build_frame(
            &message,
            &self.identity.agent_id,
            unix_timestamp(),
            self.keys.as_deref(),
        )?;
        debug!(kind = message.kind(), "[rift] Sending frame");
        self.connection.send(frame).await
    }

    pub(super) async fn connect_to(
        &self,
        address: Option<&str>,
    ) -> Result<WelcomeInfo, TraversalError> {
        let _op = self.operations.lock().await;

        let address = address
            .map(str::to_string)
            .or_else(|| Some(self.config.default_world.clone()))
            .filter(|a| !a.trim().is_empty())
            .ok_or(ConnectionFault::NoAddress)?;

        self.transition(TraversalState::Connecting);
        match self.connection.connect(&address).await {
            Ok(welcome) => {
                self.begin_session(&address, &welcome);
                self.transition(TraversalState::Connected);
                Ok(welcome)
            }
            Err(e) => {
                self.end_session();
                Err(e)
            }
        }
    }

    pub(super) async fn disconnect_now(&self) {
        self.connection.disconnect().await;
        self.end_session();
        info!("[rift] Disconnected");
    }

    pub(super) async fn discover_portals(&self) -> Result<Vec<Portal>, TraversalError> {
        let _op = self.operations.lock().await;
        self.ensure_session()?;

        self.transition(TraversalState::Discovering);
        let handle = self.pending.register(PendingKind::Discovery).map_err(pending_fault)?;
        if let Err(e) = self.send(OutboundMessage::Discover).await {
            self.settle();
            return Err(e);
        }
        info!("[rift] Discovering portals");

        let outcome = handle.wait(self.config.discovery_timeout()).await;
        match outcome {
            Ok(Ok(PendingReply::Portals(portals))) => {
                self.transition(TraversalState::Connected);
                Ok(portals)
            }
            Ok(Err(WaitFailure::Disconnected)) => {
                self.end_session();
                Err(ConnectionFault::ConnectionLost.into())
            }
            Ok(Ok(other)) => {
                warn!(reply = ?other, "[rift] Unexpected reply to discovery");
                self.settle();
                Ok(Vec::new())
            }
            Ok(Err(failure)) => {
                warn!(error = %failure, "[rift] Discovery failed");
                self.settle();
                Ok(Vec::new())
            }
            Err(e) => {
                warn!(error = %e, "[rift] Timeout waiting for discover_response");
                self.settle();
                Ok(Vec::new())
            }
        }
    }

    pub(super) fn build_passport(
        &self,
        target_world: &str,
        details: TraversalDetails,
    ) -> Result<Passport, TraversalError> {
        let source_world = self.current_world().unwrap_or_else(|| "unknown".to_string());
        let passport = PassportDraft::new(
            self.identity.agent_id.clone(),
            self.identity.agent_name.clone(),
            source_world,
            target_world,
        )
        .with_details(details)
        .seal_unsigned();

        match &self.keys {
            Some(keys) => sign(passport, keys),
            None if self.config.security.require_signatures => {
                error!("[rift] No signing key and signatures are required");
                Err(SecurityFault::UnsignedPassportRefused.into())
            }
            None => {
                warn!("[rift] No signing key available, passport unsigned");
                Ok(passport)
            }
        }
    }

    pub(super) async fn enter_portal(
        &self,
        portal_id: &str,
        details: TraversalDetails,
    ) -> Result<TraversalResult, TraversalError> {
        let _op = self.operations.lock().await;
        self.ensure_session()?;

        let portal = self
            .registry
            .find(portal_id)
            .ok_or_else(|| HandoffFault::UnknownPortal(portal_id.to_string()))?;
        info!(
            portal = %portal.portal_id,
            destination = %portal.destination_world,
            "[rift] Entering portal {} -> {}",
            portal.name,
            portal.destination_world
        );

        let source_world = self.current_world().unwrap_or_else(|| "unknown".to_string());
        let narration = self.config.narrate_transitions.then(|| {
            let text = self.narrator.describe(&source_world, &portal.destination_world);
            info!("[rift] Transition: {}", text);
            text
        });

        let passport = self.build_passport(&portal.destination_world, details)?;
        let passport_hash = content_hash(&passport)?;

        self.transition(TraversalState::HandoffPending);
        let handle = match self.pending.register(PendingKind::Handoff) {
            Ok(handle) => handle,
            Err(e) => {
                self.settle();
                return Err(pending_fault(e));
            }
        };
        let request = OutboundMessage::HandoffRequest {
            portal_id: portal.portal_id.clone(),
            passport: passport.clone(),
        };
        if let Err(e) = self.send(request).await {
            self.settle();
            return Err(HandoffFault::SendFailed(e.to_string()).into());
        }

        let confirm = self.await_confirmation(handle).await?;
        if let Some(echoed) = &confirm.passport {
            if echoed.nonce() != passport.nonce() {
                error!("[rift] Confirmation echoes a different passport");
                self.settle();
                return Err(HandoffFault::ConfirmationMismatch.into());
            }
        }

        let destination_address = portal
            .address()
            .map(str::to_string)
            .or_else(|| confirm.target_url.clone().filter(|u| !u.trim().is_empty()));
        let Some(destination_address) = destination_address else {
            error!(world = %portal.destination_world, "[rift] No destination address");
            self.settle();
            return Err(HandoffFault::NoDestinationAddress(portal.destination_world).into());
        };

        info!("[rift] Handoff confirmed! Crossing to {}", portal.destination_world);
        self.transition(TraversalState::Transitioning);
        self.connection.disconnect().await;
        *self.session.lock() = Session::default();

        let welcome = match self.connection.connect(&destination_address).await {
            Ok(welcome) => welcome,
            Err(e) => {
                error!(error = %e, "[rift] Failed to connect to destination");
                self.end_session();
                return Err(HandoffFault::ArrivalFailed(e.to_string()).into());
            }
        };
        self.begin_session(&destination_address, &welcome);
        self.transition(TraversalState::Arrived);
        info!(world = %welcome.world_name, "[rift] Arrived in {}", welcome.world_name);

        Ok(TraversalResult {
            source_world,
            destination_world: portal.destination_world,
            destination_address,
            arrived_world: welcome.world_name,
            passport_hash,
            narration,
        })
    }

    async fn await_confirmation(
        &self,
        handle: PendingHandle,
    ) -> Result<HandoffConfirm, TraversalError> {
        let timeout = self.config.handoff_timeout();
        match handle.wait(timeout).await {
            Ok(Ok(PendingReply::Confirmed(confirm))) => Ok(confirm),
            Ok(Ok(other)) => {
                self.settle();
                Err(TraversalError::Protocol(format!(
                    "unexpected reply to handoff request: {other:?}"
                )))
            }
            Ok(Err(WaitFailure::Security(fault))) => {
                self.settle();
                Err(fault.into())
            }
            Ok(Err(WaitFailure::Rejected(reason) | WaitFailure::WorldError(reason))) => {
                self.settle();
                Err(HandoffFault::Rejected(reason).into())
            }
            Ok(Err(WaitFailure::Disconnected)) => {
                self.end_session();
                Err(ConnectionFault::ConnectionLost.into())
            }
            Err(PendingError::Timeout { .. }) => {
                self.settle();
                Err(HandoffFault::Timeout {
                    timeout_ms: self.config.handoff_timeout_ms,
                }
                .into())
            }
            Err(e) => {
                self.settle();
                Err(pending_fault(e))
            }
        }
    }

    pub(super) fn check_handoff(&self, confirm: &HandoffConfirm) -> Result<bool, TraversalError> {
        self.verifier.verify_handoff(confirm)
    }
}

fn pending_fault(e: PendingError) -> TraversalError {
    TraversalError::Protocol(e.to_string())
}
