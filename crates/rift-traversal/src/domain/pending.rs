//! # Pending Operations
//!
//! Bridges request/response exchanges over the world link. A caller
//! registers a wait for a reply kind, sends its request, then awaits the
//! handle; the receive loop resolves the entry when the matching reply
//! arrives.
//!
//! At most one wait per kind is in flight. Entries are removed on every
//! path: resolution, failure, timeout, or the handle being dropped.

use crate::domain::correlation::CorrelationId;
use crate::domain::errors::SecurityFault;
use crate::domain::messages::{HandoffConfirm, WelcomeInfo};
use crate::domain::portal::Portal;
use dashmap::DashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Reply kinds a caller can wait for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PendingKind {
    /// `welcome` after the transport opens.
    Welcome,
    /// `discover_response`.
    Discovery,
    /// `handoff_confirm`.
    Handoff,
}

impl PendingKind {
    /// Wire kind of the awaited reply.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Welcome => "welcome",
            Self::Discovery => "discover_response",
            Self::Handoff => "handoff_confirm",
        }
    }
}

impl fmt::Display for PendingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Successful reply delivered to a waiter.
#[derive(Clone, Debug, PartialEq)]
pub enum PendingReply {
    /// World greeting.
    Welcome(WelcomeInfo),
    /// Discovery result.
    Portals(Vec<Portal>),
    /// Verified (or not enforced) handoff confirmation.
    Confirmed(HandoffConfirm),
}

/// Failure delivered to a waiter.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum WaitFailure {
    /// World sent an `error` frame.
    #[error("world error: {0}")]
    WorldError(String),
    /// World sent `handoff_rejected`.
    #[error("rejected: {0}")]
    Rejected(String),
    /// Confirmation failed verification.
    #[error("security: {0}")]
    Security(SecurityFault),
    /// Link closed before a reply arrived.
    #[error("connection lost")]
    Disconnected,
}

/// What a waiter receives.
pub type PendingOutcome = Result<PendingReply, WaitFailure>;

/// Errors from the table itself.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PendingError {
    /// Another wait for this kind is in flight.
    #[error("a wait for {0} is already pending")]
    AlreadyPending(PendingKind),
    /// No reply within the timeout.
    #[error("no {kind} within {waited_ms}ms")]
    Timeout {
        /// Awaited kind.
        kind: PendingKind,
        /// Timeout in milliseconds.
        waited_ms: u64,
    },
    /// Entry vanished without a reply.
    #[error("wait for {0} abandoned")]
    Abandoned(PendingKind),
}

struct PendingEntry {
    correlation_id: CorrelationId,
    sender: oneshot::Sender<PendingOutcome>,
    created_at: Instant,
}

/// Counters for the pending table.
#[derive(Debug, Default)]
pub struct PendingStats {
    /// Waits registered.
    pub total_registered: AtomicU64,
    /// Waits resolved with a reply or failure.
    pub total_resolved: AtomicU64,
    /// Waits that timed out.
    pub total_timeouts: AtomicU64,
    /// Replies that arrived with nobody waiting.
    pub total_unmatched: AtomicU64,
}

/// Table of in-flight waits, keyed by reply kind.
#[derive(Default)]
pub struct PendingOperations {
    entries: Arc<DashMap<PendingKind, PendingEntry>>,
    stats: Arc<PendingStats>,
}

impl PendingOperations {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a wait for `kind`. Register before sending the request so
    /// a fast reply cannot be missed.
    pub fn register(&self, kind: PendingKind) -> Result<PendingHandle, PendingError> {
        let correlation_id = CorrelationId::new();
        let (sender, receiver) = oneshot::channel();

        match self.entries.entry(kind) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                return Err(PendingError::AlreadyPending(kind));
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(PendingEntry {
                    correlation_id,
                    sender,
                    created_at: Instant::now(),
                });
            }
        }
        self.stats.total_registered.fetch_add(1, Ordering::Relaxed);
        debug!(correlation_id = %correlation_id, kind = %kind, "Registered pending wait");

        Ok(PendingHandle {
            kind,
            correlation_id,
            receiver,
            entries: Arc::clone(&self.entries),
            stats: Arc::clone(&self.stats),
        })
    }

    /// Deliver `outcome` to the waiter for `kind`. A reply with nobody
    /// waiting is logged and dropped.
    pub fn resolve(&self, kind: PendingKind, outcome: PendingOutcome) -> bool {
        let Some((_, entry)) = self.entries.remove(&kind) else {
            self.stats.total_unmatched.fetch_add(1, Ordering::Relaxed);
            warn!(kind = %kind, "Reply with no pending wait, ignoring");
            return false;
        };
        self.deliver(kind, entry, outcome)
    }

    /// Fail every in-flight wait. Returns how many were failed.
    pub fn resolve_all(&self, failure: WaitFailure) -> usize {
        let kinds: Vec<PendingKind> = self.entries.iter().map(|e| *e.key()).collect();
        kinds
            .into_iter()
            .filter_map(|kind| self.entries.remove(&kind))
            .map(|(kind, entry)| self.deliver(kind, entry, Err(failure.clone())))
            .filter(|delivered| *delivered)
            .count()
    }

    /// Whether a wait for `kind` is in flight.
    pub fn is_pending(&self, kind: PendingKind) -> bool {
        self.entries.contains_key(&kind)
    }

    /// Number of in-flight waits.
    pub fn pending_count(&self) -> usize {
        self.entries.len()
    }

    /// Counters.
    pub fn stats(&self) -> &PendingStats {
        &self.stats
    }

    fn deliver(&self, kind: PendingKind, entry: PendingEntry, outcome: PendingOutcome) -> bool {
        let elapsed_ms = entry.created_at.elapsed().as_millis() as u64;
        let failed = outcome.is_err();
        if entry.sender.send(outcome).is_err() {
            debug!(kind = %kind, "Waiter already gone");
            return false;
        }
        self.stats.total_resolved.fetch_add(1, Ordering::Relaxed);
        debug!(
            correlation_id = %entry.correlation_id,
            kind = %kind,
            elapsed_ms,
            failed,
            "Resolved pending wait"
        );
        true
    }
}

/// Caller's side of a registered wait.
pub struct PendingHandle {
    kind: PendingKind,
    correlation_id: CorrelationId,
    receiver: oneshot::Receiver<PendingOutcome>,
    entries: Arc<DashMap<PendingKind, PendingEntry>>,
    stats: Arc<PendingStats>,
}

impl PendingHandle {
    /// Kind being awaited.
    pub fn kind(&self) -> PendingKind {
        self.kind
    }

    /// Id of this wait.
    pub fn correlation_id(&self) -> CorrelationId {
        self.correlation_id
    }

    /// Wait up to `timeout` for the reply.
    pub async fn wait(mut self, timeout: Duration) -> Result<PendingOutcome, PendingError> {
        match tokio::time::timeout(timeout, &mut self.receiver).await {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(_)) => Err(PendingError::Abandoned(self.kind)),
            Err(_) => {
                self.stats.total_timeouts.fetch_add(1, Ordering::Relaxed);
                warn!(
                    correlation_id = %self.correlation_id,
                    kind = %self.kind,
                    timeout_ms = timeout.as_millis() as u64,
                    "Timed out waiting for reply"
                );
                Err(PendingError::Timeout {
                    kind: self.kind,
                    waited_ms: timeout.as_millis() as u64,
                })
            }
        }
    }
}

impl Drop for PendingHandle {
    fn drop(&mut self) {
        let id = self.correlation_id;
        self.entries.remove_if(&self.kind, |_, entry| entry.correlation_id == id);
    }
}
