//! Hearth command-line shell.
//!
//! Runs the application startup sequence against a simulated page and
//! prints what happened as JSON.
//!
//! ## Usage
//!
//! ```bash
//! # First visit to a deployed site
//! PUBLIC_URL=https://example.com/ hearth boot
//!
//! # Returning visitor with a new build waiting
//! hearth boot --host example.com --returning
//!
//! # Developer machine whose worker script went missing
//! hearth boot --missing-script
//!
//! # Check the script served by a local dev server
//! PUBLIC_URL=http://localhost:3000/ hearth --http boot
//!
//! # Boot, then remove the registration again
//! hearth --config boot.json unregister
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use hearth_app::{boot, simulated_page, worker_target, ConsoleRuntime, Document, PageScenario};
use hearth_core::{init_logging, BootConfig};
use hearth_sw::{
    HttpScriptFetcher, RegisterConfig, ScriptFetcher, ServiceWorkerContainer, ServiceWorkerManager,
};
use serde_json::{json, Value};
use tracing::info;

#[derive(Parser)]
#[command(name = "hearth")]
#[command(about = "Boot the Hearth application shell against a simulated page")]
struct Cli {
    /// Boot config file (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Serve the page from this host instead of the public URL's host
    #[arg(long, global = true)]
    host: Option<String>,

    /// Validate the worker script over HTTP against the public URL, e.g. a
    /// running dev server, instead of the simulated page's script table
    #[arg(long, global = true)]
    http: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Mount the UI and register the service worker
    Boot(ScenarioArgs),

    /// Boot, then unregister the service worker
    Unregister(ScenarioArgs),
}

#[derive(Args, Clone, Copy)]
struct ScenarioArgs {
    /// The platform lacks service worker support
    #[arg(long)]
    unsupported: bool,
    /// The network is unavailable
    #[arg(long)]
    offline: bool,
    /// A previous build's worker already controls the page
    #[arg(long)]
    returning: bool,
    /// The worker script is no longer served
    #[arg(long)]
    missing_script: bool,
    /// The worker script URL answers with HTML
    #[arg(long)]
    wrong_type: bool,
    /// The worker's install step fails
    #[arg(long)]
    fail_install: bool,
}

impl From<ScenarioArgs> for PageScenario {
    fn from(args: ScenarioArgs) -> Self {
        Self {
            unsupported: args.unsupported,
            offline: args.offline,
            returning: args.returning,
            missing_script: args.missing_script,
            wrong_type: args.wrong_type,
            fail_install: args.fail_install,
        }
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<BootConfig> {
    let mut config = match &cli.config {
        Some(path) => BootConfig::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => BootConfig::default(),
    };
    config.apply_env()?;

    if let Some(host) = &cli.host {
        config
            .public_url
            .set_host(Some(host))
            .with_context(|| format!("invalid host {host}"))?;
    }
    Ok(config)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    init_logging(config.log_config())?;

    info!(public_url = %config.public_url, "Starting Hearth...");

    let (scenario, unregister_after) = match cli.command {
        Commands::Boot(args) => (PageScenario::from(args), false),
        Commands::Unregister(args) => (PageScenario::from(args), true),
    };

    let page = simulated_page(&config, scenario).await?;
    let output = if cli.http {
        let fetcher = Arc::new(HttpScriptFetcher::new()?);
        run(&config, scenario, page, fetcher, unregister_after).await?
    } else {
        let fetcher = Arc::clone(&page);
        run(&config, scenario, page, fetcher, unregister_after).await?
    };
    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}

async fn run<F: ScriptFetcher>(
    config: &BootConfig,
    scenario: PageScenario,
    page: Arc<ServiceWorkerContainer>,
    fetcher: Arc<F>,
    unregister_after: bool,
) -> anyhow::Result<Value> {
    let manager = ServiceWorkerManager::new(Arc::clone(&page), fetcher, worker_target(config)?);
    let runtime = ConsoleRuntime::new();
    let document = Document::app_shell(&config.mount_id);

    let callbacks = RegisterConfig::new()
        .on_success(|registration| {
            info!(scope = %registration.scope, "Offline ready: content is cached");
        })
        .on_update(|registration| {
            info!(scope = %registration.scope, "Update ready: reload to use the new version");
        });

    // The page finishes loading after the runtime has mounted.
    let (report, ()) = tokio::join!(
        boot(&runtime, &document, &manager, &config.mount_id, callbacks),
        async { page.fire_load() }
    );

    let unregistered = if unregister_after {
        Some(manager.unregister().await)
    } else {
        None
    };

    Ok(json!({
        "scenario": scenario,
        "boot": report,
        "unregistered": unregistered,
        "reloads": page.reload_count(),
    }))
}
