//! In-process service worker platform.
//!
//! Models the parts of a browser's `navigator.serviceWorker` the lifecycle
//! manager talks to: registrations per scope with installing, waiting and
//! active workers, a page controller, and the scripts the origin serves.
//!
//! ```text
//! ServiceWorkerContainer
//!     ├── page location + load state
//!     ├── controller
//!     ├── scripts (URL → ScriptResource)
//!     └── ServiceWorkerRegistration (per scope)
//!             ├── installing (ServiceWorker)
//!             ├── waiting (ServiceWorker)
//!             └── active (ServiceWorker)
//! ```

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use hashbrown::HashMap;
use http::StatusCode;
use tokio::sync::{mpsc, watch, RwLock};
use tracing::{debug, info, warn};
use url::{Origin, Url};

use crate::platform::{
    PendingRegistration, Registration, RegistrationId, ServiceWorkerPlatform,
    ServiceWorkerState, WorkerEvent,
};
use crate::validator::{is_script_type, FetchError, ScriptFetcher, ScriptProbe};
use crate::ServiceWorkerError;

// ==================== Service Worker ====================

/// A service worker instance.
#[derive(Debug, Clone)]
pub struct ServiceWorker {
    pub script_url: Url,
    pub state: ServiceWorkerState,
    /// Script source the worker was installed from.
    pub script: String,
}

impl ServiceWorker {
    pub fn new(script_url: Url, script: String) -> Self {
        Self {
            script_url,
            state: ServiceWorkerState::Parsed,
            script,
        }
    }

    pub fn set_state(&mut self, state: ServiceWorkerState) {
        self.state = state;
    }

    pub fn is_active(&self) -> bool {
        self.state == ServiceWorkerState::Activated
    }
}

// ==================== Registration ====================

/// Platform-side registration record.
#[derive(Debug)]
pub struct ServiceWorkerRegistration {
    pub id: RegistrationId,
    pub scope: Url,
    pub script_url: Url,
    pub installing: Option<ServiceWorker>,
    /// Installed but not active.
    pub waiting: Option<ServiceWorker>,
    pub active: Option<ServiceWorker>,
}

impl ServiceWorkerRegistration {
    pub fn new(scope: Url, script_url: Url) -> Self {
        Self {
            id: RegistrationId::new(),
            scope,
            script_url,
            installing: None,
            waiting: None,
            active: None,
        }
    }

    /// Handle given out to callers.
    pub fn handle(&self) -> Registration {
        Registration {
            id: self.id,
            scope: self.scope.clone(),
            script_url: self.script_url.clone(),
        }
    }

    /// The most recent worker, whatever its state.
    pub fn newest_worker(&self) -> Option<&ServiceWorker> {
        self.installing
            .as_ref()
            .or(self.waiting.as_ref())
            .or(self.active.as_ref())
    }

    /// Byte-for-byte update check against the newest worker.
    pub fn is_current(&self, script_url: &Url, script: &str) -> bool {
        self.newest_worker()
            .map_or(false, |w| &w.script_url == script_url && w.script == script)
    }

    pub fn has_workers(&self) -> bool {
        self.newest_worker().is_some()
    }

    /// Start installing a new worker.
    pub fn begin_install(&mut self, script_url: Url, script: String) {
        let mut worker = ServiceWorker::new(script_url.clone(), script);
        worker.set_state(ServiceWorkerState::Installing);
        self.script_url = script_url;
        self.installing = Some(worker);
    }

    /// Transition installing to waiting.
    pub fn install_complete(&mut self) {
        if let Some(mut worker) = self.installing.take() {
            worker.set_state(ServiceWorkerState::Installed);
            if let Some(mut replaced) = self.waiting.replace(worker) {
                replaced.set_state(ServiceWorkerState::Redundant);
            }
        }
    }

    /// Drop the installing worker after a failed install.
    pub fn install_failed(&mut self) {
        if let Some(mut worker) = self.installing.take() {
            worker.set_state(ServiceWorkerState::Redundant);
        }
    }

    /// Activate waiting worker.
    pub fn activate(&mut self) {
        if let Some(mut worker) = self.waiting.take() {
            worker.set_state(ServiceWorkerState::Activating);

            if let Some(mut old) = self.active.take() {
                old.set_state(ServiceWorkerState::Redundant);
            }

            worker.set_state(ServiceWorkerState::Activated);
            self.active = Some(worker);
        }
    }

    /// Mark every worker redundant.
    pub fn unregister(&mut self) {
        for mut worker in [
            self.active.take(),
            self.waiting.take(),
            self.installing.take(),
        ]
        .into_iter()
        .flatten()
        {
            worker.set_state(ServiceWorkerState::Redundant);
        }
    }
}

// ==================== Scripts ====================

/// A script as served by the origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptResource {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub body: String,
}

impl ScriptResource {
    /// A JavaScript file served with status 200.
    pub fn javascript(body: impl Into<String>) -> Self {
        Self {
            status: StatusCode::OK,
            content_type: Some("application/javascript".to_string()),
            body: body.into(),
        }
    }

    /// An HTML page, e.g. a dev server's index fallback.
    pub fn html(status: StatusCode, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type: Some("text/html".to_string()),
            body: body.into(),
        }
    }
}

// ==================== Container ====================

#[derive(Debug, Default)]
struct ContainerState {
    registrations: HashMap<String, ServiceWorkerRegistration>,
    scripts: HashMap<String, ScriptResource>,
    pending_install_failure: Option<String>,
}

/// In-process stand-in for a browser page's service worker container.
pub struct ServiceWorkerContainer {
    location: Url,
    supported: bool,
    state: RwLock<ContainerState>,
    controller: AtomicBool,
    offline: AtomicBool,
    reloads: AtomicU32,
    loaded: watch::Sender<bool>,
}

impl ServiceWorkerContainer {
    /// Container for a page at `location`, before its load event.
    pub fn new(location: Url) -> Self {
        let (loaded, _) = watch::channel(false);
        Self {
            location,
            supported: true,
            state: RwLock::new(ContainerState::default()),
            controller: AtomicBool::new(false),
            offline: AtomicBool::new(false),
            reloads: AtomicU32::new(0),
            loaded,
        }
    }

    /// Toggle service worker support.
    pub fn with_support(mut self, supported: bool) -> Self {
        self.supported = supported;
        self
    }

    pub fn location(&self) -> &Url {
        &self.location
    }

    /// Fire the page load event.
    pub fn fire_load(&self) {
        self.loaded.send_replace(true);
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn is_offline(&self) -> bool {
        self.offline.load(Ordering::SeqCst)
    }

    /// Number of reloads the page requested.
    pub fn reload_count(&self) -> u32 {
        self.reloads.load(Ordering::SeqCst)
    }

    /// Serve `resource` at `url`.
    pub async fn put_script(&self, url: &Url, resource: ScriptResource) {
        self.state
            .write()
            .await
            .scripts
            .insert(url.to_string(), resource);
    }

    /// Stop serving `url`.
    pub async fn remove_script(&self, url: &Url) -> bool {
        self.state
            .write()
            .await
            .scripts
            .remove(url.as_str())
            .is_some()
    }

    /// Make the next install attempt fail with `reason`.
    pub async fn fail_next_install(&self, reason: impl Into<String>) {
        self.state.write().await.pending_install_failure = Some(reason.into());
    }

    /// Navigate the page: waiting workers activate and the covering
    /// registration's active worker becomes the controller.
    pub async fn navigate(&self) {
        let mut state = self.state.write().await;
        for registration in state.registrations.values_mut() {
            if registration.waiting.is_some() {
                registration.activate();
                debug!(scope = %registration.scope, "Waiting worker activated");
            }
        }
        let controlled = covering(&state.registrations, &self.location)
            .and_then(|r| r.active.as_ref())
            .map_or(false, ServiceWorker::is_active);
        self.controller.store(controlled, Ordering::SeqCst);
    }

    /// All registrations.
    pub async fn get_registrations(&self) -> Vec<Registration> {
        self.state
            .read()
            .await
            .registrations
            .values()
            .map(ServiceWorkerRegistration::handle)
            .collect()
    }

    /// Whether the registration covering `url` has a worker waiting.
    pub async fn has_waiting_worker(&self, url: &Url) -> bool {
        let state = self.state.read().await;
        covering(&state.registrations, url).map_or(false, |r| r.waiting.is_some())
    }

    /// Script source of the active worker covering `url`.
    pub async fn active_script(&self, url: &Url) -> Option<String> {
        let state = self.state.read().await;
        covering(&state.registrations, url)
            .and_then(|r| r.active.as_ref())
            .map(|w| w.script.clone())
    }

    fn check_security(&self, script_url: &Url, scope: &Url) -> Result<(), ServiceWorkerError> {
        let origin = self.location.origin();
        if script_url.origin() != origin || scope.origin() != origin {
            return Err(ServiceWorkerError::SecurityError(format!(
                "script {script_url} and scope {scope} must share the page origin"
            )));
        }

        let script_dir = script_url
            .path()
            .rsplit_once('/')
            .map(|(dir, _)| format!("{dir}/"))
            .unwrap_or_else(|| "/".to_string());
        if !scope.path().starts_with(&script_dir) {
            return Err(ServiceWorkerError::SecurityError(format!(
                "scope {scope} is outside the maximum scope {script_dir}"
            )));
        }
        Ok(())
    }
}

/// Registration with the longest scope that prefixes `url`.
fn covering<'a>(
    registrations: &'a HashMap<String, ServiceWorkerRegistration>,
    url: &Url,
) -> Option<&'a ServiceWorkerRegistration> {
    registrations
        .iter()
        .filter(|(scope, _)| url.as_str().starts_with(scope.as_str()))
        .max_by_key(|(scope, _)| scope.len())
        .map(|(_, registration)| registration)
}

impl ServiceWorkerPlatform for ServiceWorkerContainer {
    fn is_supported(&self) -> bool {
        self.supported
    }

    fn hostname(&self) -> String {
        self.location.host_str().unwrap_or_default().to_string()
    }

    fn origin(&self) -> Origin {
        self.location.origin()
    }

    async fn wait_for_load(&self) {
        let mut rx = self.loaded.subscribe();
        // The sender lives as long as `self`, so this only returns once loaded.
        let _ = rx.wait_for(|loaded| *loaded).await;
    }

    async fn register(
        &self,
        script_url: &Url,
        scope: &Url,
    ) -> Result<PendingRegistration, ServiceWorkerError> {
        if !self.supported {
            return Err(ServiceWorkerError::PlatformUnsupported);
        }
        self.check_security(script_url, scope)?;
        if self.is_offline() {
            return Err(ServiceWorkerError::NetworkUnavailable(format!(
                "failed to fetch {script_url}"
            )));
        }

        let mut state = self.state.write().await;

        let resource = state
            .scripts
            .get(script_url.as_str())
            .cloned()
            .ok_or_else(|| {
                ServiceWorkerError::RegistrationFailed(format!(
                    "a bad HTTP response code (404) was received when fetching {script_url}"
                ))
            })?;
        if !resource.status.is_success() {
            return Err(ServiceWorkerError::RegistrationFailed(format!(
                "a bad HTTP response code ({}) was received when fetching {script_url}",
                resource.status.as_u16()
            )));
        }
        if !resource.content_type.as_deref().map_or(false, is_script_type) {
            return Err(ServiceWorkerError::SecurityError(format!(
                "unsupported MIME type {:?} for {script_url}",
                resource.content_type
            )));
        }

        let scope_key = scope.to_string();
        let (event_tx, events) = mpsc::unbounded_channel();

        if let Some(existing) = state.registrations.get(&scope_key) {
            if existing.is_current(script_url, &resource.body) {
                debug!(scope = %scope, "Script unchanged; reusing registration");
                return Ok(PendingRegistration {
                    registration: existing.handle(),
                    events,
                });
            }
        }

        let failure = state.pending_install_failure.take();
        let registration = state
            .registrations
            .entry(scope_key.clone())
            .or_insert_with(|| ServiceWorkerRegistration::new(scope.clone(), script_url.clone()));

        registration.begin_install(script_url.clone(), resource.body);
        let handle = registration.handle();
        let _ = event_tx.send(WorkerEvent::UpdateFound);
        let _ = event_tx.send(WorkerEvent::StateChange(ServiceWorkerState::Installing));

        if let Some(reason) = failure {
            warn!(scope = %scope, reason = %reason, "Service worker install failed");
            registration.install_failed();
            let _ = event_tx.send(WorkerEvent::StateChange(ServiceWorkerState::Redundant));
            if !registration.has_workers() {
                state.registrations.remove(&scope_key);
            }
        } else {
            registration.install_complete();
            let _ = event_tx.send(WorkerEvent::StateChange(ServiceWorkerState::Installed));

            // Nothing to wait for when no worker is active yet.
            if registration.active.is_none() {
                registration.activate();
                let _ = event_tx.send(WorkerEvent::StateChange(ServiceWorkerState::Activating));
                let _ = event_tx.send(WorkerEvent::StateChange(ServiceWorkerState::Activated));
            }
        }

        Ok(PendingRegistration {
            registration: handle,
            events,
        })
    }

    async fn get_registration(&self, url: &Url) -> Option<Registration> {
        let state = self.state.read().await;
        covering(&state.registrations, url).map(ServiceWorkerRegistration::handle)
    }

    async fn unregister(&self, registration: &Registration) -> Result<bool, ServiceWorkerError> {
        let mut state = self.state.write().await;
        let key = registration.scope.to_string();
        let owned = state
            .registrations
            .get(&key)
            .map_or(false, |existing| existing.id == registration.id);
        if !owned {
            return Ok(false);
        }
        if let Some(mut removed) = state.registrations.remove(&key) {
            removed.unregister();
        }
        info!(scope = %registration.scope, "Service worker unregistered");
        Ok(true)
    }

    async fn ready(&self, url: &Url) -> Option<Registration> {
        let state = self.state.read().await;
        covering(&state.registrations, url)
            .filter(|r| r.active.as_ref().map_or(false, ServiceWorker::is_active))
            .map(ServiceWorkerRegistration::handle)
    }

    fn has_controller(&self) -> bool {
        self.controller.load(Ordering::SeqCst)
    }

    fn reload(&self) {
        let count = self.reloads.fetch_add(1, Ordering::SeqCst) + 1;
        info!(count, url = %self.location, "Page reload requested");
    }
}

impl ScriptFetcher for ServiceWorkerContainer {
    async fn fetch_script(&self, url: &Url) -> Result<ScriptProbe, FetchError> {
        if self.is_offline() {
            return Err(FetchError(format!("offline while fetching {url}")));
        }
        let state = self.state.read().await;
        Ok(match state.scripts.get(url.as_str()) {
            Some(resource) => ScriptProbe {
                status: resource.status,
                content_type: resource.content_type.clone(),
            },
            None => ScriptProbe {
                status: StatusCode::NOT_FOUND,
                content_type: None,
            },
        })
    }
}
