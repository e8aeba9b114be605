//! Boot configuration

use std::path::Path;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{HearthError, HearthResult};
use crate::logging::{LogConfig, LogFormat};

/// Environment variable overriding [`BootConfig::public_url`].
pub const PUBLIC_URL_ENV: &str = "PUBLIC_URL";

/// Environment variable overriding [`BootConfig::log_level`].
pub const LOG_LEVEL_ENV: &str = "HEARTH_LOG";

/// Startup configuration for the application shell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootConfig {
    /// Id of the element the UI runtime mounts into
    pub mount_id: String,

    /// Public URL the application bundle is served from
    pub public_url: Url,

    /// Service worker script path, relative to the public URL
    pub script_path: String,

    /// Registration scope, relative to the public URL
    pub scope: String,

    /// Log level name (trace, debug, info, warn, error)
    pub log_level: String,

    /// Log output format
    pub log_format: LogFormat,
}

impl Default for BootConfig {
    fn default() -> Self {
        Self {
            mount_id: "root".to_string(),
            public_url: default_public_url(),
            script_path: "service-worker.js".to_string(),
            scope: "./".to_string(),
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}

fn default_public_url() -> Url {
    Url::parse("http://localhost:3000/").expect("static URL is valid")
}

impl BootConfig {
    /// Load a JSON config file. Missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> HearthResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        log::debug!("Loaded boot config from {}", path.display());
        Ok(config)
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) -> HearthResult<()> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> HearthResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(public_url) = lookup(PUBLIC_URL_ENV).filter(|v| !v.is_empty()) {
            self.public_url = Url::parse(&public_url)?;
            log::debug!("{} override: {}", PUBLIC_URL_ENV, self.public_url);
        }
        if let Some(level) = lookup(LOG_LEVEL_ENV).filter(|v| !v.is_empty()) {
            self.log_level = level;
        }
        self.validate()
    }

    /// Check the fields that cannot be expressed in the type.
    pub fn validate(&self) -> HearthResult<()> {
        if self.mount_id.trim().is_empty() {
            return Err(HearthError::mount("mount_id must not be empty"));
        }
        if self.script_path.trim().is_empty() {
            return Err(HearthError::config("script_path must not be empty"));
        }
        if !matches!(self.public_url.scheme(), "http" | "https") {
            return Err(HearthError::config(format!(
                "public_url must be http or https, got {}",
                self.public_url.scheme()
            )));
        }
        Ok(())
    }

    /// Absolute URL of the service worker script.
    pub fn script_url(&self) -> HearthResult<Url> {
        Ok(self.base_url().join(&self.script_path)?)
    }

    /// Absolute URL of the registration scope.
    pub fn scope_url(&self) -> HearthResult<Url> {
        Ok(self.base_url().join(&self.scope)?)
    }

    /// Logging settings carried by this config.
    pub fn log_config(&self) -> LogConfig {
        LogConfig::from_settings(&self.log_level, self.log_format)
    }

    /// Public URL with a trailing slash so relative joins stay beneath it.
    fn base_url(&self) -> Url {
        let mut base = self.public_url.clone();
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        base
    }
}
