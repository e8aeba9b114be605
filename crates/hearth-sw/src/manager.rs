//! Service worker registration manager.
//!
//! Drives one registration attempt per `register` call: capability and
//! origin checks, the load-event wait, environment-specific validation, and
//! the lifecycle state machine fed from the platform's worker events.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, trace, warn};
use url::Url;

use crate::environment::{classify, is_supported, same_origin, Environment};
use crate::lifecycle::{Lifecycle, LifecycleEvent, LifecycleState, Notification};
use crate::platform::{
    PendingRegistration, Registration, ServiceWorkerPlatform, ServiceWorkerState, WorkerEvent,
};
use crate::validator::{self, ScriptFetcher, ValidationError};
use crate::ServiceWorkerError;

/// Host callback receiving the registration.
pub type RegistrationCallback = Box<dyn Fn(&Registration)>;

/// Host configuration for a registration attempt.
#[derive(Default)]
pub struct RegisterConfig {
    on_success: Option<RegistrationCallback>,
    on_update: Option<RegistrationCallback>,
}

impl RegisterConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called once content is cached for offline use.
    pub fn on_success(mut self, callback: impl Fn(&Registration) + 'static) -> Self {
        self.on_success = Some(Box::new(callback));
        self
    }

    /// Called when new content is waiting for the next full reload.
    pub fn on_update(mut self, callback: impl Fn(&Registration) + 'static) -> Self {
        self.on_update = Some(Box::new(callback));
        self
    }

    fn notify(&self, notification: Notification, registration: &Registration) {
        let callback = match notification {
            Notification::Success => &self.on_success,
            Notification::Update => &self.on_update,
        };
        if let Some(callback) = callback {
            callback(registration);
        }
    }
}

impl fmt::Debug for RegisterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisterConfig")
            .field("on_success", &self.on_success.is_some())
            .field("on_update", &self.on_update.is_some())
            .finish()
    }
}

/// What gets registered, and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerTarget {
    /// URL the application bundle is served from.
    pub public_url: Url,
    pub script_url: Url,
    pub scope: Url,
}

/// How a registration attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RegisterOutcome {
    /// No service worker support; nothing was attempted.
    Unsupported,
    /// The public URL is on another origin; nothing was attempted.
    OriginMismatch,
    /// Local validation could not reach the server.
    Offline,
    /// Local validation rejected the script; stale registration removed and
    /// the page reloaded.
    Reloaded,
    /// Local validation rejected the script again after this page already
    /// reloaded; stale registration removed, no second reload.
    ReloadSuppressed,
    /// The lifecycle ran and stopped in this state.
    Settled(LifecycleState),
}

/// Record of one registration attempt.
#[derive(Debug, Clone, Serialize)]
pub struct RegisterReport {
    pub environment: Option<Environment>,
    pub outcome: RegisterOutcome,
    pub trace: Vec<LifecycleState>,
    pub registration: Option<Registration>,
}

impl RegisterReport {
    fn new(
        environment: Option<Environment>,
        outcome: RegisterOutcome,
        lifecycle: &Lifecycle,
        registration: Option<Registration>,
    ) -> Self {
        Self {
            environment,
            outcome,
            trace: lifecycle.trace().to_vec(),
            registration,
        }
    }

    /// Final lifecycle state.
    pub fn state(&self) -> LifecycleState {
        self.trace.last().copied().unwrap_or_default()
    }
}

/// Owns service worker registration for one page.
pub struct ServiceWorkerManager<P, F> {
    platform: Arc<P>,
    fetcher: Arc<F>,
    target: WorkerTarget,
    /// Serializes registration attempts.
    attempt: Mutex<()>,
    /// Set by the self-heal reload; cleared by a successful registration or
    /// an explicit `unregister`.
    reloaded: AtomicBool,
}

impl<P, F> ServiceWorkerManager<P, F>
where
    P: ServiceWorkerPlatform,
    F: ScriptFetcher,
{
    pub fn new(platform: Arc<P>, fetcher: Arc<F>, target: WorkerTarget) -> Self {
        Self {
            platform,
            fetcher,
            target,
            attempt: Mutex::new(()),
            reloaded: AtomicBool::new(false),
        }
    }

    pub fn target(&self) -> &WorkerTarget {
        &self.target
    }

    pub fn platform(&self) -> &Arc<P> {
        &self.platform
    }

    /// Register the service worker. Never fails; the report says what
    /// happened.
    #[instrument(skip_all, fields(scope = %self.target.scope))]
    pub async fn register(&self, config: RegisterConfig) -> RegisterReport {
        let _attempt = self.attempt.lock().await;
        let mut lifecycle = Lifecycle::new();

        if !is_supported(self.platform.is_supported()) {
            debug!("Service workers unsupported; skipping registration");
            return RegisterReport::new(None, RegisterOutcome::Unsupported, &lifecycle, None);
        }

        if !same_origin(&self.target.public_url, &self.platform.origin()) {
            warn!(
                public_url = %self.target.public_url,
                "Public URL is on a different origin; skipping registration"
            );
            return RegisterReport::new(None, RegisterOutcome::OriginMismatch, &lifecycle, None);
        }

        self.platform.wait_for_load().await;

        let environment = classify(&self.platform.hostname());
        debug!(?environment, "Environment classified");

        if environment.is_local() {
            if let Err(err) = validator::validate(self.fetcher.as_ref(), &self.target.script_url).await
            {
                let outcome = self.handle_invalid_script(err).await;
                return RegisterReport::new(Some(environment), outcome, &lifecycle, None);
            }
        }

        let registration = self.register_worker(&mut lifecycle, &config).await;
        if registration.is_some() {
            self.reloaded.store(false, Ordering::SeqCst);
        }

        if environment.is_local()
            && registration.is_some()
            && self.platform.ready(&self.target.scope).await.is_some()
        {
            info!("This web app is being served cache-first by a service worker");
        }

        let outcome = RegisterOutcome::Settled(lifecycle.state());
        RegisterReport::new(Some(environment), outcome, &lifecycle, registration)
    }

    /// Remove the registration for the configured scope, if there is one.
    ///
    /// Safe to call at any time; returns whether a registration was removed.
    #[instrument(skip_all, fields(scope = %self.target.scope))]
    pub async fn unregister(&self) -> bool {
        self.reloaded.store(false, Ordering::SeqCst);
        self.remove_registration().await
    }

    async fn remove_registration(&self) -> bool {
        if !is_supported(self.platform.is_supported()) {
            return false;
        }

        let Some(registration) = self.platform.get_registration(&self.target.scope).await else {
            debug!("No registration to remove");
            return false;
        };

        match self.platform.unregister(&registration).await {
            Ok(removed) => removed,
            Err(err) => {
                warn!(error = %err, category = err.category(), "Unregister failed");
                false
            }
        }
    }

    async fn handle_invalid_script(&self, err: ValidationError) -> RegisterOutcome {
        let self_heal = err.needs_self_heal();
        let err = ServiceWorkerError::from(err);

        if self_heal {
            warn!(
                error = %err,
                category = err.category(),
                "Service worker script unusable; removing registration and reloading"
            );
            self.remove_registration().await;
            if self.reload_once() {
                RegisterOutcome::Reloaded
            } else {
                warn!("Page already reloaded once; not reloading again");
                RegisterOutcome::ReloadSuppressed
            }
        } else {
            info!("No internet connection found. App is running in offline mode.");
            RegisterOutcome::Offline
        }
    }

    async fn register_worker(
        &self,
        lifecycle: &mut Lifecycle,
        config: &RegisterConfig,
    ) -> Option<Registration> {
        self.advance(lifecycle, LifecycleEvent::RegisterCalled);

        let pending = match self
            .platform
            .register(&self.target.script_url, &self.target.scope)
            .await
        {
            Ok(pending) => pending,
            Err(err) => {
                error!(error = %err, category = err.category(), "Error during service worker registration");
                self.advance(lifecycle, LifecycleEvent::Errored);
                return None;
            }
        };
        self.advance(lifecycle, LifecycleEvent::Accepted);

        let PendingRegistration {
            registration,
            mut events,
        } = pending;
        debug!(id = registration.id.raw(), "Registration accepted");

        while !lifecycle.state().is_settled() {
            let Some(event) = events.recv().await else {
                break;
            };
            let Some(event) = self.translate(&event) else {
                continue;
            };
            if let Some(notification) = self.advance(lifecycle, event) {
                notify(notification, config, &registration);
            }
        }

        (lifecycle.state() != LifecycleState::Failed).then_some(registration)
    }

    fn translate(&self, event: &WorkerEvent) -> Option<LifecycleEvent> {
        match event {
            WorkerEvent::UpdateFound => Some(LifecycleEvent::WorkerFound {
                had_controller: self.platform.has_controller(),
            }),
            WorkerEvent::StateChange(ServiceWorkerState::Installed) => {
                Some(LifecycleEvent::InstallCompleted)
            }
            WorkerEvent::StateChange(ServiceWorkerState::Activated) => {
                Some(LifecycleEvent::Activated)
            }
            WorkerEvent::StateChange(ServiceWorkerState::Redundant) => {
                let err = ServiceWorkerError::InstallFailed("worker became redundant".into());
                error!(error = %err, category = err.category(), "Service worker install failed");
                Some(LifecycleEvent::Errored)
            }
            WorkerEvent::StateChange(_) => None,
            WorkerEvent::Error(message) => {
                let err = ServiceWorkerError::InstallFailed(message.clone());
                error!(error = %err, category = err.category(), "Service worker error");
                Some(LifecycleEvent::Errored)
            }
        }
    }

    fn advance(&self, lifecycle: &mut Lifecycle, event: LifecycleEvent) -> Option<Notification> {
        match lifecycle.apply(event) {
            Ok(notification) => {
                trace!(?event, state = ?lifecycle.state(), "Lifecycle transition");
                notification
            }
            Err(err) => {
                warn!(error = %err, "Ignoring lifecycle event");
                None
            }
        }
    }

    /// Reload unless this page already did; returns whether it reloaded.
    fn reload_once(&self) -> bool {
        if self.reloaded.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.platform.reload();
        true
    }
}

fn notify(notification: Notification, config: &RegisterConfig, registration: &Registration) {
    match notification {
        // Offline-ready is the first install; an update never reloads the page.
        Notification::Success => info!("Content is cached for offline use."),
        Notification::Update => info!("New content is available; please refresh."),
    }
    config.notify(notification, registration);
}
