//! # Hearth Service Workers
//!
//! Service worker lifecycle management for the Hearth application bootstrap.
//!
//! ## Features
//!
//! - **Environment detection**: local development vs. deployed hosts
//! - **Script validation**: catches a missing or mistyped worker script on
//!   developer machines and heals stale registrations
//! - **Lifecycle**: an explicit state machine from registration through
//!   install to activation, with `on_success` / `on_update` host callbacks
//! - **In-process platform**: a container modelling a page's service worker
//!   facilities, used by the CLI and the tests
//!
//! ## Architecture
//!
//! ```text
//! ServiceWorkerManager
//!     ├── environment (classify, is_supported, same_origin)
//!     ├── validator   (validate → ScriptFetcher)
//!     ├── lifecycle   (Lifecycle state machine)
//!     └── ServiceWorkerPlatform
//!             └── ServiceWorkerContainer (in-process)
//! ```

use thiserror::Error;

pub mod container;
pub mod environment;
pub mod lifecycle;
pub mod manager;
pub mod platform;
pub mod validator;

pub use container::{ScriptResource, ServiceWorkerContainer};
pub use environment::{classify, is_supported, same_origin, Environment};
pub use lifecycle::{Lifecycle, LifecycleError, LifecycleEvent, LifecycleState, Notification};
pub use manager::{RegisterConfig, RegisterOutcome, RegisterReport, ServiceWorkerManager, WorkerTarget};
pub use platform::{
    PendingRegistration, Registration, RegistrationId, ServiceWorkerPlatform,
    ServiceWorkerState, WorkerEvent,
};
pub use validator::{
    validate, FetchError, HttpScriptFetcher, ScriptFetcher, ScriptProbe, ValidationError,
};

/// Errors that can occur in service worker operations.
///
/// None of these reach the host application; the manager logs them and
/// reports the outcome instead.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceWorkerError {
    #[error("Service workers are not supported on this platform")]
    PlatformUnsupported,

    #[error("Service worker script not found: {0}")]
    ScriptNotFound(String),

    #[error("Service worker script {url} has content type {content_type:?}")]
    WrongContentType { url: String, content_type: String },

    #[error("Network unavailable: {0}")]
    NetworkUnavailable(String),

    #[error("Registration failed: {0}")]
    RegistrationFailed(String),

    #[error("Install failed: {0}")]
    InstallFailed(String),

    #[error("Security error: {0}")]
    SecurityError(String),
}

impl ServiceWorkerError {
    /// Get the error category for log fields.
    pub fn category(&self) -> &'static str {
        match self {
            ServiceWorkerError::PlatformUnsupported => "unsupported",
            ServiceWorkerError::ScriptNotFound(_) => "script_not_found",
            ServiceWorkerError::WrongContentType { .. } => "wrong_content_type",
            ServiceWorkerError::NetworkUnavailable(_) => "network",
            ServiceWorkerError::RegistrationFailed(_) => "registration",
            ServiceWorkerError::InstallFailed(_) => "install",
            ServiceWorkerError::SecurityError(_) => "security",
        }
    }
}
