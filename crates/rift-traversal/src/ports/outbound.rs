//! Outbound ports (Driven Ports)
//!
//! Dependencies the traversal service needs.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

/// Transport-level failure while opening a link.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// Nothing answered at the address.
    #[error("unreachable {address}: {reason}")]
    Unreachable {
        /// Address dialled.
        address: String,
        /// Underlying reason.
        reason: String,
    },
    /// The address cannot be parsed.
    #[error("invalid address {0}")]
    InvalidAddress(String),
}

/// Instruction to the link's writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkCommand {
    /// Send a text frame.
    Send(String),
    /// Close the link.
    Close,
}

/// Something the link observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A text frame arrived.
    Frame(String),
    /// The transport failed; the link is unusable.
    Error(String),
    /// The peer closed the link.
    Closed {
        /// Close code, when the transport has one.
        code: Option<u16>,
        /// Close reason.
        reason: String,
    },
}

/// An open link: commands in, events out. The link is done when the
/// event channel closes.
#[derive(Debug)]
pub struct WorldLink {
    /// Frames and close requests to the world.
    pub commands: mpsc::Sender<LinkCommand>,
    /// Frames and lifecycle events from the world.
    pub events: mpsc::Receiver<TransportEvent>,
}

/// Opens links to worlds.
#[async_trait]
pub trait WorldTransport: Send + Sync + 'static {
    /// Open a link to `address`. Callers bound this with their own deadline.
    async fn open(&self, address: &str) -> Result<WorldLink, TransportError>;
}

/// Produces prose for a crossing between two worlds.
pub trait TransitionNarrator: Send + Sync {
    /// Describe leaving `from_world` for `to_world`.
    fn describe(&self, from_world: &str, to_world: &str) -> String;
}
