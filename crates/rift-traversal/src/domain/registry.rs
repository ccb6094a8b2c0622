//! # Portal Registry
//!
//! Portals from the latest discovery. Replaced as a whole; readers always
//! see either the old set or the new one, never a mix.

use crate::domain::portal::Portal;
use parking_lot::RwLock;
use std::sync::Arc;

/// Shared, atomically replaced portal set.
#[derive(Debug, Default)]
pub struct PortalRegistry {
    portals: RwLock<Arc<Vec<Portal>>>,
}

impl PortalRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Swap in a new set.
    pub fn replace(&self, portals: Vec<Portal>) {
        *self.portals.write() = Arc::new(portals);
    }

    /// Drop every portal.
    pub fn clear(&self) {
        self.replace(Vec::new());
    }

    /// Copy of the current set.
    pub fn snapshot(&self) -> Vec<Portal> {
        self.current().as_ref().clone()
    }

    /// Look up a portal by id.
    pub fn find(&self, portal_id: &str) -> Option<Portal> {
        self.current()
            .iter()
            .find(|p| p.portal_id == portal_id)
            .cloned()
    }

    /// Number of portals.
    pub fn len(&self) -> usize {
        self.current().len()
    }

    /// True when nothing has been discovered.
    pub fn is_empty(&self) -> bool {
        self.current().is_empty()
    }

    fn current(&self) -> Arc<Vec<Portal>> {
        Arc::clone(&self.portals.read())
    }
}
