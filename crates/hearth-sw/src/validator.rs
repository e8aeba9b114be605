//! Pre-registration check of the service worker script.
//!
//! Used on developer machines, where a stale worker left over from another
//! project can keep pointing at a script that no longer exists.

use std::time::Duration;

use http::header::{HeaderMap, HeaderName, HeaderValue, CACHE_CONTROL, CONTENT_TYPE, PRAGMA};
use http::StatusCode;
use mime::Mime;
use reqwest::Client;
use thiserror::Error;
use tracing::{debug, trace};
use url::Url;

use crate::ServiceWorkerError;

/// Why a script failed validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Service worker script not found: {0}")]
    NotFound(Url),

    #[error("Service worker script has content type {content_type:?}: {url}")]
    WrongType {
        url: Url,
        content_type: Option<String>,
    },

    #[error("Network unavailable: {0}")]
    NetworkUnavailable(String),
}

impl ValidationError {
    /// Whether the failure calls for removing the registration and reloading.
    pub fn needs_self_heal(&self) -> bool {
        matches!(
            self,
            ValidationError::NotFound(_) | ValidationError::WrongType { .. }
        )
    }
}

impl From<ValidationError> for ServiceWorkerError {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::NotFound(url) => ServiceWorkerError::ScriptNotFound(url.to_string()),
            ValidationError::WrongType { url, content_type } => {
                ServiceWorkerError::WrongContentType {
                    url: url.to_string(),
                    content_type: content_type.unwrap_or_default(),
                }
            }
            ValidationError::NetworkUnavailable(msg) => ServiceWorkerError::NetworkUnavailable(msg),
        }
    }
}

/// What a script fetch reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptProbe {
    pub status: StatusCode,
    pub content_type: Option<String>,
}

/// Transport failure while fetching a script.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Script fetch failed: {0}")]
pub struct FetchError(pub String);

/// Fetches a script without consulting any cache.
#[allow(async_fn_in_trait)]
pub trait ScriptFetcher {
    async fn fetch_script(&self, url: &Url) -> Result<ScriptProbe, FetchError>;
}

/// Request headers that force a round trip to the server.
pub fn cache_bypass_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(
        HeaderName::from_static("service-worker"),
        HeaderValue::from_static("script"),
    );
    headers
}

/// Whether a declared content type is a JavaScript type.
pub fn is_script_type(content_type: &str) -> bool {
    content_type
        .parse::<Mime>()
        .map(|m| {
            let subtype = m.subtype().as_str();
            subtype.contains("javascript") || subtype.contains("ecmascript")
        })
        .unwrap_or(false)
}

/// Validate the script at `script_url`.
pub async fn validate<F>(fetcher: &F, script_url: &Url) -> Result<(), ValidationError>
where
    F: ScriptFetcher + ?Sized,
{
    let probe = fetcher
        .fetch_script(script_url)
        .await
        .map_err(|e| ValidationError::NetworkUnavailable(e.0))?;

    trace!(url = %script_url, status = %probe.status, content_type = ?probe.content_type, "Script probe");

    if probe.status == StatusCode::NOT_FOUND {
        return Err(ValidationError::NotFound(script_url.clone()));
    }

    match probe.content_type.as_deref() {
        Some(ct) if is_script_type(ct) => {
            debug!(url = %script_url, "Service worker script validated");
            Ok(())
        }
        _ => Err(ValidationError::WrongType {
            url: script_url.clone(),
            content_type: probe.content_type,
        }),
    }
}

/// [`ScriptFetcher`] over HTTP.
pub struct HttpScriptFetcher {
    client: Client,
}

impl HttpScriptFetcher {
    /// Default request timeout.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

    pub fn new() -> Result<Self, ServiceWorkerError> {
        Self::with_timeout(Self::DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, ServiceWorkerError> {
        let client = Client::builder()
            .timeout(timeout)
            .default_headers(cache_bypass_headers())
            .build()
            .map_err(|e| ServiceWorkerError::NetworkUnavailable(e.to_string()))?;
        Ok(Self { client })
    }
}

impl ScriptFetcher for HttpScriptFetcher {
    async fn fetch_script(&self, url: &Url) -> Result<ScriptProbe, FetchError> {
        debug!(url = %url, "Fetching service worker script");

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| FetchError(e.to_string()))?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        Ok(ScriptProbe {
            status: response.status(),
            content_type,
        })
    }
}
