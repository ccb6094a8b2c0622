//! Inbound ports (Driving Ports)
//!
//! The API the traversal service offers to agents.

use crate::domain::{
    HandoffConfirm, Passport, Portal, TraversalDetails, TraversalError, TraversalResult,
    TraversalState, TraversalStatus, WelcomeInfo,
};
use async_trait::async_trait;

/// Cross-world traversal.
#[async_trait]
pub trait TraversalApi: Send + Sync {
    /// Connect to `address`, or the configured default world.
    async fn connect(&self, address: Option<&str>) -> Result<WelcomeInfo, TraversalError>;

    /// Close the current session. Safe to call at any time.
    async fn disconnect(&self);

    /// Ask the current world for its portals. A timeout yields an empty list.
    async fn discover(&self) -> Result<Vec<Portal>, TraversalError>;

    /// Build a passport for travel to `target_world`, signed when a key is loaded.
    fn create_passport(
        &self,
        target_world: &str,
        details: TraversalDetails,
    ) -> Result<Passport, TraversalError>;

    /// Pass through a discovered portal.
    async fn enter(
        &self,
        portal_id: &str,
        details: TraversalDetails,
    ) -> Result<TraversalResult, TraversalError>;

    /// Apply the verification policy to a confirmation.
    fn verify_handoff(&self, confirm: &HandoffConfirm) -> Result<bool, TraversalError>;

    /// Current state.
    fn state(&self) -> TraversalState;

    /// Status snapshot.
    fn status(&self) -> TraversalStatus;

    /// Portals from the latest discovery.
    fn portals(&self) -> Vec<Portal>;
}
