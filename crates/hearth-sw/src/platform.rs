//! The seam between the lifecycle manager and whatever hosts the page.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use url::{Origin, Url};

use crate::ServiceWorkerError;

/// Unique identifier for a registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RegistrationId(u64);

impl RegistrationId {
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for RegistrationId {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to a platform-owned registration.
///
/// Cloning the handle never clones the registration itself; the platform
/// stays the owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Registration {
    pub id: RegistrationId,
    pub scope: Url,
    pub script_url: Url,
}

/// Service worker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ServiceWorkerState {
    /// Initial state, script being parsed.
    #[default]
    Parsed,
    /// Installing (install event).
    Installing,
    /// Installed but waiting for activation.
    Installed,
    /// Activating (activate event).
    Activating,
    /// Active and controlling pages.
    Activated,
    /// Redundant (replaced or install failed).
    Redundant,
}

/// Notifications a registration delivers about its installing worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerEvent {
    /// A new worker was found and is installing.
    UpdateFound,
    /// The installing worker changed state.
    StateChange(ServiceWorkerState),
    /// The platform reported an error for this registration.
    Error(String),
}

/// A registration accepted by the platform, plus its event stream.
///
/// The stream closes once the platform has nothing further to report for
/// this install cycle.
#[derive(Debug)]
pub struct PendingRegistration {
    pub registration: Registration,
    pub events: mpsc::UnboundedReceiver<WorkerEvent>,
}

/// Service worker facilities of the page's host.
///
/// Every call goes back to the platform; callers must not cache state
/// derived from it.
#[allow(async_fn_in_trait)]
pub trait ServiceWorkerPlatform {
    /// Whether service workers exist on this platform at all.
    fn is_supported(&self) -> bool;

    /// Host name of the current page.
    fn hostname(&self) -> String;

    /// Origin of the current page.
    fn origin(&self) -> Origin;

    /// Resolves once the page's load event has fired.
    async fn wait_for_load(&self);

    /// Register `script_url` for `scope`.
    async fn register(
        &self,
        script_url: &Url,
        scope: &Url,
    ) -> Result<PendingRegistration, ServiceWorkerError>;

    /// The registration whose scope covers `url`, if any.
    async fn get_registration(&self, url: &Url) -> Option<Registration>;

    /// Remove a registration. Returns whether anything was removed.
    async fn unregister(&self, registration: &Registration) -> Result<bool, ServiceWorkerError>;

    /// The registration covering `url` if it has an active worker right now.
    async fn ready(&self, url: &Url) -> Option<Registration>;

    /// Whether a service worker currently controls the page.
    fn has_controller(&self) -> bool;

    /// Reload the page.
    fn reload(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registration_id_uniqueness() {
        let id1 = RegistrationId::new();
        let id2 = RegistrationId::new();
        assert_ne!(id1, id2);
        assert!(id2.raw() > id1.raw());
    }

    #[test]
    fn test_worker_state_default() {
        assert_eq!(ServiceWorkerState::default(), ServiceWorkerState::Parsed);
    }
}
