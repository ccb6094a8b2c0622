//! World link lifecycle: connect with retries, the receive loop, and
//! disconnect.
//!
//! A connect attempt has one deadline covering both opening the transport
//! and receiving the world's welcome. The welcome wait is registered
//! before the transport opens, so the welcome cannot be missed. The live
//! link lock is never held across an attempt; `disconnect` bumps a cancel
//! generation that in-flight attempts select on.

use super::dispatcher::MessageDispatcher;
use crate::domain::{
    ConnectionConfig, ConnectionFault, PendingKind, PendingOperations, PendingReply,
    TraversalError, WaitFailure, WelcomeInfo,
};
use crate::ports::outbound::{LinkCommand, TransportEvent, WorldLink, WorldTransport};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, error, info, warn};

/// Link status as seen by the connection manager.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LinkStatus {
    /// No link.
    Down,
    /// Transport open, waiting for the welcome.
    Opening {
        /// Link generation.
        epoch: u64,
    },
    /// Welcome received; frames can be sent.
    Ready {
        /// Link generation.
        epoch: u64,
        /// World name from the welcome.
        world: String,
        /// Address dialled.
        address: String,
    },
}

impl LinkStatus {
    fn epoch(&self) -> Option<u64> {
        match self {
            Self::Down => None,
            Self::Opening { epoch } | Self::Ready { epoch, .. } => Some(*epoch),
        }
    }

    /// True when frames can be sent.
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready { .. })
    }
}

struct LiveLink {
    epoch: u64,
    address: String,
    commands: mpsc::Sender<LinkCommand>,
    stop: oneshot::Sender<()>,
    receive_loop: JoinHandle<()>,
}

/// Owns at most one live link and its receive loop.
pub struct ConnectionManager<T: WorldTransport> {
    transport: Arc<T>,
    settings: ConnectionConfig,
    dispatcher: Arc<MessageDispatcher>,
    pending: Arc<PendingOperations>,
    live: Mutex<Option<LiveLink>>,
    status: Arc<watch::Sender<LinkStatus>>,
    epochs: AtomicU64,
    cancel: watch::Sender<u64>,
    connecting: Mutex<()>,
}

impl<T: WorldTransport> ConnectionManager<T> {
    /// Manager with no link.
    pub fn new(
        transport: Arc<T>,
        settings: ConnectionConfig,
        dispatcher: Arc<MessageDispatcher>,
        pending: Arc<PendingOperations>,
    ) -> Self {
        let (status, _) = watch::channel(LinkStatus::Down);
        let (cancel, _) = watch::channel(0);
        Self {
            transport,
            settings,
            dispatcher,
            pending,
            live: Mutex::new(None),
            status: Arc::new(status),
            epochs: AtomicU64::new(0),
            cancel,
            connecting: Mutex::new(()),
        }
    }

    /// Current link status.
    pub fn status(&self) -> LinkStatus {
        self.status.borrow().clone()
    }

    /// Watch link status changes.
    pub fn subscribe(&self) -> watch::Receiver<LinkStatus> {
        self.status.subscribe()
    }

    /// True when a welcomed link is live.
    pub fn is_ready(&self) -> bool {
        self.status.borrow().is_ready()
    }

    /// Connect to `address`, replacing any live link. Up to `max_retries`
    /// attempts, `retry_backoff` apart. A concurrent [`disconnect`] stops
    /// the attempts and fails the connect with `Interrupted`.
    ///
    /// [`disconnect`]: Self::disconnect
    pub async fn connect(&self, address: &str) -> Result<WelcomeInfo, TraversalError> {
        let mut cancelled = self.cancel.subscribe();
        let generation = *cancelled.borrow_and_update();
        let _connecting = self.connecting.lock().await;

        let existing = self.live.lock().await.take();
        if let Some(existing) = existing {
            warn!(
                address = %existing.address,
                "[rift] Already connected, disconnecting first"
            );
            self.teardown(existing).await;
        }

        let attempts = self.settings.max_retries;
        let mut last_error = String::from("no attempt made");
        for attempt in 1..=attempts {
            if self.cancelled_since(generation) {
                return Err(self.interrupted(address));
            }
            info!(address, attempt, "[rift] Connecting to world");
            match self.attempt(address, generation, &mut cancelled).await {
                Ok((link, welcome)) => {
                    let mut live = self.live.lock().await;
                    if self.cancelled_since(generation) {
                        drop(live);
                        self.teardown(link).await;
                        return Err(self.interrupted(address));
                    }
                    info!(
                        address,
                        world = %welcome.world_name,
                        "[rift] Connected to {}",
                        welcome.world_name
                    );
                    *live = Some(link);
                    return Ok(welcome);
                }
                Err(ConnectionFault::Interrupted { .. }) => {
                    return Err(self.interrupted(address));
                }
                Err(fault) => {
                    warn!(
                        address,
                        attempt,
                        error = %fault,
                        "[rift] Connection attempt {} failed",
                        attempt
                    );
                    last_error = fault.to_string();
                    if attempt < attempts {
                        tokio::select! {
                            _ = sleep(self.settings.retry_backoff()) => {}
                            _ = cancelled.changed() => {}
                        }
                    }
                }
            }
        }

        self.status.send_replace(LinkStatus::Down);
        error!(address, attempts, "[rift] Failed to connect");
        Err(ConnectionFault::RetriesExhausted {
            attempts,
            last_error,
        }
        .into())
    }

    fn cancelled_since(&self, generation: u64) -> bool {
        *self.cancel.borrow() != generation
    }

    fn interrupted(&self, address: &str) -> TraversalError {
        info!(address, "[rift] Connect interrupted by disconnect");
        self.status.send_replace(LinkStatus::Down);
        ConnectionFault::Interrupted {
            address: address.to_string(),
        }
        .into()
    }

    async fn attempt(
        &self,
        address: &str,
        generation: u64,
        cancelled: &mut watch::Receiver<u64>,
    ) -> Result<(LiveLink, WelcomeInfo), ConnectionFault> {
        let connect_timeout = self.settings.connect_timeout();
        let deadline = Instant::now() + connect_timeout;
        let handshake_timeout = || ConnectionFault::HandshakeTimeout {
            address: address.to_string(),
            timeout_ms: self.settings.connect_timeout_ms,
        };
        let interrupted = || ConnectionFault::Interrupted {
            address: address.to_string(),
        };

        let welcome = self
            .pending
            .register(PendingKind::Welcome)
            .map_err(|e| ConnectionFault::Unreachable {
                address: address.to_string(),
                reason: e.to_string(),
            })?;

        let opened = tokio::select! {
            opened = timeout(connect_timeout, self.transport.open(address)) => opened,
            _ = cancelled.changed() => return Err(interrupted()),
        };
        let WorldLink { commands, events } = match opened {
            Ok(Ok(link)) => link,
            Ok(Err(e)) => {
                return Err(ConnectionFault::Unreachable {
                    address: address.to_string(),
                    reason: e.to_string(),
                })
            }
            Err(_) => return Err(handshake_timeout()),
        };

        let epoch = self.epochs.fetch_add(1, Ordering::SeqCst) + 1;
        self.status.send_replace(LinkStatus::Opening { epoch });
        let (stop, stop_rx) = oneshot::channel();
        let receive_loop = tokio::spawn(receive_loop(
            events,
            stop_rx,
            Arc::clone(&self.dispatcher),
            Arc::clone(&self.pending),
            Arc::clone(&self.status),
            epoch,
        ));
        let link = LiveLink {
            epoch,
            address: address.to_string(),
            commands,
            stop,
            receive_loop,
        };

        let remaining = deadline.saturating_duration_since(Instant::now());
        let outcome = tokio::select! {
            outcome = welcome.wait(remaining) => Some(outcome),
            _ = cancelled.changed() => None,
        };
        let fault = match outcome {
            // Disconnect also fails the welcome wait; report it as the interrupt.
            _ if self.cancelled_since(generation) => interrupted(),
            None => interrupted(),
            Some(Ok(Ok(PendingReply::Welcome(info)))) => {
                // The receive loop may already have seen the link close.
                let ready = self.status.send_if_modified(|status| {
                    if status.epoch() != Some(epoch) {
                        return false;
                    }
                    *status = LinkStatus::Ready {
                        epoch,
                        world: info.world_name.clone(),
                        address: address.to_string(),
                    };
                    true
                });
                if ready {
                    return Ok((link, info));
                }
                ConnectionFault::Unreachable {
                    address: address.to_string(),
                    reason: "closed right after welcome".into(),
                }
            }
            Some(Ok(Ok(other))) => ConnectionFault::Unreachable {
                address: address.to_string(),
                reason: format!("unexpected reply before welcome: {other:?}"),
            },
            Some(Ok(Err(WaitFailure::Disconnected))) => ConnectionFault::Unreachable {
                address: address.to_string(),
                reason: "closed before welcome".into(),
            },
            Some(Ok(Err(failure))) => ConnectionFault::Unreachable {
                address: address.to_string(),
                reason: failure.to_string(),
            },
            Some(Err(_)) => handshake_timeout(),
        };
        self.teardown(link).await;
        Err(fault)
    }

    /// Close the live link, if any, and fail every pending wait. An
    /// in-flight connect is interrupted rather than waited for.
    pub async fn disconnect(&self) {
        self.cancel.send_modify(|generation| *generation += 1);
        let link = self.live.lock().await.take();
        if let Some(link) = link {
            info!(address = %link.address, "[rift] Disconnecting");
            self.teardown(link).await;
        }
        self.status.send_replace(LinkStatus::Down);
        self.pending.resolve_all(WaitFailure::Disconnected);
    }

    /// Hand a frame to the live link.
    pub async fn send(&self, frame: String) -> Result<(), TraversalError> {
        if !self.is_ready() {
            return Err(ConnectionFault::NotConnected.into());
        }
        let commands = self
            .live
            .lock()
            .await
            .as_ref()
            .map(|link| link.commands.clone())
            .ok_or(ConnectionFault::NotConnected)?;
        commands
            .send(LinkCommand::Send(frame))
            .await
            .map_err(|_| ConnectionFault::SendFailed("link writer closed".into()).into())
    }

    async fn teardown(&self, link: LiveLink) {
        let grace = self.settings.shutdown_grace();
        let _ = timeout(grace, link.commands.send(LinkCommand::Close)).await;
        let _ = link.stop.send(());

        let mut receive_loop = link.receive_loop;
        if timeout(grace, &mut receive_loop).await.is_err() {
            warn!(epoch = link.epoch, "[rift] Receive loop did not stop in time, aborting");
            receive_loop.abort();
        }
        self.status.send_if_modified(|status| {
            if status.epoch() == Some(link.epoch) {
                *status = LinkStatus::Down;
                true
            } else {
                false
            }
        });
    }
}

async fn receive_loop(
    mut events: mpsc::Receiver<TransportEvent>,
    mut stop: oneshot::Receiver<()>,
    dispatcher: Arc<MessageDispatcher>,
    pending: Arc<PendingOperations>,
    status: Arc<watch::Sender<LinkStatus>>,
    epoch: u64,
) {
    debug!(epoch, "[rift] Receive loop started");
    loop {
        tokio::select! {
            _ = &mut stop => {
                debug!(epoch, "[rift] Receive loop stopped");
                break;
            }
            event = events.recv() => match event {
                Some(TransportEvent::Frame(text)) => {
                    dispatcher.dispatch(&text);
                }
                Some(TransportEvent::Error(reason)) => {
                    error!(epoch, %reason, "[rift] Transport error");
                    break;
                }
                Some(TransportEvent::Closed { code, reason }) => {
                    info!(epoch, ?code, %reason, "[rift] Connection closed");
                    break;
                }
                None => {
                    info!(epoch, "[rift] Transport ended");
                    break;
                }
            }
        }
    }

    let current = status.send_if_modified(|s| {
        if s.epoch() == Some(epoch) {
            *s = LinkStatus::Down;
            true
        } else {
            false
        }
    });
    let failed = pending.resolve_all(WaitFailure::Disconnected);
    if current || failed > 0 {
        debug!(epoch, failed, "[rift] Link down, pending waits failed");
    }
}
