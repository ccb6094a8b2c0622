//! # Ports
//!
//! Inbound: the API the coordinator offers.
//! Outbound: what the coordinator needs from the outside (a transport to
//! reach worlds, a narrator for transitions).

pub mod inbound;
pub mod outbound;

pub use inbound::TraversalApi;
pub use outbound::{
    LinkCommand, TransitionNarrator, TransportError, TransportEvent, WorldLink, WorldTransport,
};
