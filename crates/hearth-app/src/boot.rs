//! Application startup: mount the UI, then hand over to the service worker
//! manager.

use hearth_core::{BootConfig, HearthResult};
use hearth_sw::{
    RegisterConfig, RegisterReport, ScriptFetcher, ServiceWorkerManager, ServiceWorkerPlatform,
    WorkerTarget,
};
use serde::Serialize;
use tracing::{info, warn};

use crate::runtime::{Document, MountOptions, UiRuntime};

/// What startup did.
#[derive(Debug, Clone, Serialize)]
pub struct BootReport {
    pub mount: MountOptions,
    pub service_worker: RegisterReport,
}

/// Resolve the registration target from the boot config.
pub fn worker_target(config: &BootConfig) -> HearthResult<WorkerTarget> {
    Ok(WorkerTarget {
        public_url: config.public_url.clone(),
        script_url: config.script_url()?,
        scope: config.scope_url()?,
    })
}

/// Mount the application, then register the service worker.
///
/// Mounting happens first and unconditionally; nothing the service worker
/// does can keep the UI from rendering.
pub async fn boot<R, P, F>(
    runtime: &R,
    document: &Document,
    manager: &ServiceWorkerManager<P, F>,
    mount_id: &str,
    callbacks: RegisterConfig,
) -> BootReport
where
    R: UiRuntime,
    P: ServiceWorkerPlatform,
    F: ScriptFetcher,
{
    let node = document.get_element_by_id(mount_id).cloned();
    if node.is_none() {
        warn!(mount_id, "Mount element not found; mounting on document body");
    }

    let mount = MountOptions { node };
    runtime.init(mount.clone());

    let service_worker = manager.register(callbacks).await;
    info!(outcome = ?service_worker.outcome, "Startup complete");

    BootReport {
        mount,
        service_worker,
    }
}
