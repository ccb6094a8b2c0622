use crate::domain::{
    HandoffConfirm, Passport, Portal, TraversalDetails, TraversalError, TraversalResult,
    TraversalState, TraversalStatus, WelcomeInfo,
};
use crate::ports::outbound::WorldTransport;
use crate::ports::TraversalApi;
use crate::service::TraversalService;
use async_trait::async_trait;

#[async_trait]
impl<T: WorldTransport> TraversalApi for TraversalService<T> {
    async fn connect(&self, address: Option<&str>) -> Result<WelcomeInfo, TraversalError> {
        self.connect_to(address).await
    }

    async fn disconnect(&self) {
        self.disconnect_now().await
    }

    async fn discover(&self) -> Result<Vec<Portal>, TraversalError> {
        self.discover_portals().await
    }

    fn create_passport(
        &self,
        target_world: &str,
        details: TraversalDetails,
    ) -> Result<Passport, TraversalError> {
        self.build_passport(target_world, details)
    }

    async fn enter(
        &self,
        portal_id: &str,
        details: TraversalDetails,
    ) -> Result<TraversalResult, TraversalError> {
        self.enter_portal(portal_id, details).await
    }

    fn verify_handoff(&self, confirm: &HandoffConfirm) -> Result<bool, TraversalError> {
        self.check_handoff(confirm)
    }

    fn state(&self) -> TraversalState {
        self.current_state()
    }

    fn status(&self) -> TraversalStatus {
        self.status_snapshot()
    }

    fn portals(&self) -> Vec<Portal> {
        self.registry.snapshot()
    }
}
