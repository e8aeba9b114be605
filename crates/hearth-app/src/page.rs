//! Simulated host pages for the CLI.
//!
//! Builds an in-process service worker container in a chosen starting
//! condition, so the boot sequence can be exercised without a browser.

use std::sync::Arc;

use hearth_core::{BootConfig, HearthError, HearthResult};
use hearth_sw::{ScriptResource, ServiceWorkerContainer, ServiceWorkerPlatform};
use http::StatusCode;
use serde::Serialize;
use tracing::debug;

/// Script served as the current build.
pub const CURRENT_BUILD: &str = "/* hearth service worker: current build */";

/// Script a returning visitor installed on an earlier visit.
pub const PREVIOUS_BUILD: &str = "/* hearth service worker: previous build */";

/// Starting condition of the simulated page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PageScenario {
    /// The platform has no service worker support.
    pub unsupported: bool,
    /// The network is down.
    pub offline: bool,
    /// A previous build's worker already controls the page.
    pub returning: bool,
    /// The server no longer serves the worker script.
    pub missing_script: bool,
    /// The server answers the script URL with an HTML page.
    pub wrong_type: bool,
    /// The worker's install step fails.
    pub fail_install: bool,
}

/// Build a page served from `config.public_url` in the given condition.
pub async fn simulated_page(
    config: &BootConfig,
    scenario: PageScenario,
) -> HearthResult<Arc<ServiceWorkerContainer>> {
    let script_url = config.script_url()?;
    let scope = config.scope_url()?;
    let page = ServiceWorkerContainer::new(config.public_url.clone()).with_support(!scenario.unsupported);

    if scenario.returning && !scenario.unsupported {
        page.put_script(&script_url, ScriptResource::javascript(PREVIOUS_BUILD))
            .await;
        page.register(&script_url, &scope)
            .await
            .map_err(|e| HearthError::config(format!("could not seed previous build: {e}")))?;
        page.navigate().await;
        debug!(controlled = page.has_controller(), "Seeded returning visitor");
    }

    if scenario.missing_script {
        page.remove_script(&script_url).await;
    } else if scenario.wrong_type {
        // Dev servers answer unknown paths with the index page.
        page.put_script(
            &script_url,
            ScriptResource::html(StatusCode::OK, "<!doctype html><div id=\"root\"></div>"),
        )
        .await;
    } else {
        page.put_script(&script_url, ScriptResource::javascript(CURRENT_BUILD))
            .await;
    }

    if scenario.fail_install {
        page.fail_next_install("install handler threw").await;
    }
    page.set_offline(scenario.offline);

    Ok(Arc::new(page))
}
