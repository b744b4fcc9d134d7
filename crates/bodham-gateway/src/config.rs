use std::sync::OnceLock;
use std::time::Duration;

use tracing::{info, warn};
use url::Url;

use crate::error::GatewayError;

/// Local dev server default, matching `uvicorn main:app` on port 8000.
pub const DEV_API_BASE: &str = "http://localhost:8000/api";
/// Deployed builds talk to the API mounted under the same origin.
pub const DEPLOYED_API_BASE: &str = "/api";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Deployed,
}

impl Environment {
    fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" | "deployed" => Self::Deployed,
            _ => Self::Development,
        }
    }
}

/// Everything the gateway needs from the process environment.
#[derive(Debug, Clone, Default)]
pub struct ApiConfig {
    /// `BODHAM_API_BASE_URL`: wins over every default when set.
    pub explicit_base: Option<String>,
    /// `BODHAM_ENV`
    pub environment: Environment,
    /// `BODHAM_ORIGIN`: origin used to anchor a relative base.
    pub origin: Option<String>,
    /// `BODHAM_AUTH_TOKEN`
    pub auth_token: Option<String>,
    /// `BODHAM_REQUEST_TIMEOUT_SECS`. Unset means requests may wait forever.
    pub request_timeout: Option<Duration>,
}

impl ApiConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup, so callers can layer their own sources.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let request_timeout = non_empty("BODHAM_REQUEST_TIMEOUT_SECS").and_then(|raw| {
            match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => Some(Duration::from_secs(secs)),
                Ok(_) => None,
                Err(e) => {
                    warn!("Ignoring BODHAM_REQUEST_TIMEOUT_SECS='{}': {}", raw, e);
                    None
                }
            }
        });

        Self {
            explicit_base: non_empty("BODHAM_API_BASE_URL"),
            environment: non_empty("BODHAM_ENV")
                .map(|v| Environment::parse(&v))
                .unwrap_or_default(),
            origin: non_empty("BODHAM_ORIGIN"),
            auth_token: non_empty("BODHAM_AUTH_TOKEN"),
            request_timeout,
        }
    }

    /// Apply the base URL policy: explicit endpoint, else the dev default,
    /// else the same-origin `/api` path. The result always ends in `/` so
    /// relative paths join underneath it.
    pub fn resolve_base_url(&self) -> Result<Url, GatewayError> {
        let base = self.explicit_base.as_deref().unwrap_or(match self.environment {
            Environment::Development => DEV_API_BASE,
            Environment::Deployed => DEPLOYED_API_BASE,
        });

        let absolute = if base.starts_with("http://") || base.starts_with("https://") {
            base.to_string()
        } else {
            let origin = self.origin.as_deref().ok_or_else(|| {
                GatewayError::Config(format!(
                    "API base '{base}' is relative but no origin is configured"
                ))
            })?;
            let separator = if base.starts_with('/') { "" } else { "/" };
            format!("{}{}{}", origin.trim_end_matches('/'), separator, base)
        };

        let mut url = Url::parse(&absolute)
            .map_err(|e| GatewayError::Config(format!("invalid API base '{absolute}': {e}")))?;
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        Ok(url)
    }
}

static API_BASE: OnceLock<Url> = OnceLock::new();

/// Resolve the process-wide API base once. Later calls return the first
/// value regardless of the config passed.
pub fn init_api_base(config: &ApiConfig) -> Result<&'static Url, GatewayError> {
    if let Some(existing) = API_BASE.get() {
        return Ok(existing);
    }
    let resolved = config.resolve_base_url()?;
    let stored = API_BASE.get_or_init(|| resolved);
    info!("API base resolved to {}", stored);
    Ok(stored)
}

/// The base resolved by `init_api_base`, if startup has run.
pub fn api_base() -> Option<&'static Url> {
    API_BASE.get()
}
