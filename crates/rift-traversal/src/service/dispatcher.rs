//! Inbound frame routing.
//!
//! Called by the receive loop for every text frame. Routing is a closed
//! match on the message kind; unrecognized kinds go to a registered
//! handler or are discarded.

use crate::algorithms::handoff::HandoffVerifier;
use crate::domain::{
    InboundMessage, PendingKind, PendingOperations, PendingReply, PortalRegistry, SecurityFault,
    TraversalError, WaitFailure,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Handler for a world-specific message kind.
pub trait FrameHandler: Send + Sync {
    /// Handle one frame of the registered kind.
    fn handle(&self, body: &Value);
}

impl<F> FrameHandler for F
where
    F: Fn(&Value) + Send + Sync,
{
    fn handle(&self, body: &Value) {
        self(body)
    }
}

/// What the dispatcher did with a frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Welcome delivered.
    Welcome,
    /// Registry replaced with this many portals.
    Portals(usize),
    /// Confirmation accepted and delivered.
    Confirmed,
    /// Confirmation failed verification.
    ConfirmationRefused,
    /// Rejection or error delivered to every waiter.
    WorldFault,
    /// Heartbeat.
    Pong,
    /// Passed to a registered handler.
    Handled(String),
    /// Unknown kind with no handler.
    Discarded(String),
    /// Could not be parsed.
    Malformed,
}

/// Routes parsed frames into the registry and pending table.
pub struct MessageDispatcher {
    registry: Arc<PortalRegistry>,
    pending: Arc<PendingOperations>,
    verifier: HandoffVerifier,
    handlers: HashMap<String, Arc<dyn FrameHandler>>,
}

impl MessageDispatcher {
    /// Dispatcher with no custom handlers.
    pub fn new(
        registry: Arc<PortalRegistry>,
        pending: Arc<PendingOperations>,
        verifier: HandoffVerifier,
    ) -> Self {
        Self {
            registry,
            pending,
            verifier,
            handlers: HashMap::new(),
        }
    }

    /// Register a handler for an otherwise unrecognized kind.
    pub fn with_handler(mut self, kind: impl Into<String>, handler: Arc<dyn FrameHandler>) -> Self {
        self.handlers.insert(kind.into(), handler);
        self
    }

    /// Route one text frame.
    pub fn dispatch(&self, frame: &str) -> DispatchOutcome {
        let message = match InboundMessage::parse(frame) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "[rift] Dropping malformed frame");
                return DispatchOutcome::Malformed;
            }
        };
        debug!(kind = message.kind(), "[rift] Received frame");

        match message {
            InboundMessage::Welcome(info) => {
                info!(
                    world = %info.world_name,
                    version = %info.version,
                    "[rift] Welcome to {}",
                    info.world_name
                );
                self.pending
                    .resolve(PendingKind::Welcome, Ok(PendingReply::Welcome(info)));
                DispatchOutcome::Welcome
            }
            InboundMessage::DiscoverResponse(portals) => {
                let count = portals.len();
                self.registry.replace(portals.clone());
                info!(count, "[rift] Discovered {} portals", count);
                self.pending
                    .resolve(PendingKind::Discovery, Ok(PendingReply::Portals(portals)));
                DispatchOutcome::Portals(count)
            }
            InboundMessage::HandoffConfirm(confirm) => {
                info!("[rift] Received handoff confirmation");
                if self.verifier.require_signatures() {
                    let refusal = match self.verifier.verify_handoff(&confirm) {
                        Ok(true) => None,
                        Ok(false) => Some(SecurityFault::VerificationFailed(
                            "signature does not match".into(),
                        )),
                        Err(TraversalError::Security(fault)) => Some(fault),
                        Err(other) => Some(SecurityFault::VerificationFailed(other.to_string())),
                    };
                    if let Some(fault) = refusal {
                        error!(error = %fault, "[rift] Handoff confirmation refused");
                        self.pending
                            .resolve(PendingKind::Handoff, Err(WaitFailure::Security(fault)));
                        return DispatchOutcome::ConfirmationRefused;
                    }
                }
                self.pending
                    .resolve(PendingKind::Handoff, Ok(PendingReply::Confirmed(confirm)));
                DispatchOutcome::Confirmed
            }
            InboundMessage::HandoffRejected(notice) => {
                let text = notice.text();
                error!(reason = %text, "[rift] Handoff rejected");
                self.pending.resolve_all(WaitFailure::Rejected(text));
                DispatchOutcome::WorldFault
            }
            InboundMessage::Error(notice) => {
                let text = notice.text();
                error!(message = %text, "[rift] World reported an error");
                self.pending.resolve_all(WaitFailure::WorldError(text));
                DispatchOutcome::WorldFault
            }
            InboundMessage::Pong => DispatchOutcome::Pong,
            InboundMessage::Unknown { kind, body } => match self.handlers.get(&kind) {
                Some(handler) => {
                    handler.handle(&body);
                    DispatchOutcome::Handled(kind)
                }
                None => {
                    warn!(kind = %kind, "[rift] Unknown message type");
                    DispatchOutcome::Discarded(kind)
                }
            },
        }
    }
}
