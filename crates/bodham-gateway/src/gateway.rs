use reqwest::Client;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

pub use reqwest::Method;

use crate::config::{self, ApiConfig};
use crate::error::{GatewayError, extract_message};

/// The single outbound path to the REST API.
///
/// Cheap to clone: the underlying `reqwest::Client` shares its pool.
#[derive(Debug, Clone)]
pub struct Gateway {
    client: Client,
    base: Url,
    token: Option<String>,
}

impl Gateway {
    /// `base` must end in `/`; `ApiConfig::resolve_base_url` guarantees that.
    pub fn new(base: Url) -> Self {
        Self::with_client(Client::new(), base)
    }

    pub fn with_client(client: Client, base: Url) -> Self {
        Self {
            client,
            base,
            token: None,
        }
    }

    /// Build from the process-wide base (resolved once) and the config's
    /// token and timeout.
    pub fn from_config(cfg: &ApiConfig) -> Result<Self, GatewayError> {
        let base = config::init_api_base(cfg)?.clone();

        let mut builder = Client::builder();
        if let Some(timeout) = cfg.request_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| GatewayError::Config(format!("cannot build HTTP client: {e}")))?;

        let gateway = Self::with_client(client, base);
        Ok(match cfg.auth_token.clone() {
            Some(token) => gateway.with_token(token),
            None => gateway,
        })
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Join an API-relative path onto the base. A leading `/` is tolerated.
    ///
    /// Ids are interpolated into paths, so anything that would let the
    /// result leave the base path (`.`/`..` segments, encoded or not, and
    /// backslashes) or smuggle in a query or fragment is rejected.
    pub fn url(&self, path: &str) -> Result<Url, GatewayError> {
        let relative = path.trim_start_matches('/');
        let smuggled = relative.contains("://") || relative.contains(['\\', '?', '#']);
        if smuggled || relative.split('/').any(is_dot_segment) {
            return Err(GatewayError::InvalidPath(path.to_string()));
        }
        self.base
            .join(relative)
            .map_err(|_| GatewayError::InvalidPath(path.to_string()))
    }

    /// Issue one request and return the parsed JSON body.
    ///
    /// 2xx with an empty body yields `Value::Null`. Anything else becomes
    /// `GatewayError::Status` carrying the server's message. Never retries.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&Value>,
    ) -> Result<Value, GatewayError> {
        let url = self.url(path)?;
        debug!(%method, %url, "API request");

        let mut req = self.client.request(method.clone(), url.clone());
        if !query.is_empty() {
            req = req.query(query);
        }
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        if let Some(body) = body {
            req = req.json(body);
        }

        let resp = req.send().await.map_err(|e| {
            warn!(%method, %url, "API request failed: {}", e);
            GatewayError::Network(e)
        })?;

        let status = resp.status();
        let text = resp.text().await.map_err(GatewayError::Network)?;

        if !status.is_success() {
            let message = extract_message(&text);
            warn!(
                %method, %url,
                "API returned {}: {}",
                status.as_u16(),
                message.as_deref().unwrap_or("")
            );
            return Err(GatewayError::Status {
                status: status.as_u16(),
                message,
            });
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, GatewayError> {
        let value = self.request(Method::GET, path, query, None).await?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn post<B, T>(&self, path: &str, query: &[(&str, &str)], body: &B) -> Result<T, GatewayError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = serde_json::to_value(body)?;
        let value = self.request(Method::POST, path, query, Some(&body)).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// POST with no body, for endpoints driven entirely by query parameters.
    pub async fn post_empty<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, GatewayError> {
        let value = self.request(Method::POST, path, query, None).await?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn put<B, T>(&self, path: &str, query: &[(&str, &str)], body: &B) -> Result<T, GatewayError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = serde_json::to_value(body)?;
        let value = self.request(Method::PUT, path, query, Some(&body)).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// DELETE; the acknowledgement body is discarded.
    pub async fn delete(&self, path: &str, query: &[(&str, &str)]) -> Result<(), GatewayError> {
        self.request(Method::DELETE, path, query, None).await?;
        Ok(())
    }
}

/// `.` or `..`, including the percent-encoded spellings URL parsers
/// resolve the same way.
fn is_dot_segment(segment: &str) -> bool {
    let decoded = segment.to_ascii_lowercase().replace("%2e", ".");
    decoded == "." || decoded == ".."
}
