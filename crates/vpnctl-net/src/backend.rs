//! Backend Clients
//!
//! Two independently addressed HTTP services:
//!
//! - **Primary**: same-origin REST-ish endpoints (`/connect`, `/disconnect`, `/status`)
//! - **Secondary**: one JSON-RPC style endpoint taking `{action, country?}`
//!
//! Both share one [`HttpClient`] so timeouts and statistics are uniform.

use crate::client::{HttpClient, HttpError};
use crate::wire::{ConnectRequest, RpcRequest, RpcResponse, StatusReport};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;
use url::Url;

/// Backend call errors
#[derive(Debug, Error)]
pub enum BackendError {
    /// Request never completed (network, DNS, timeout, bad reply)
    #[error("transport error: {0}")]
    Transport(#[from] HttpError),

    /// Request completed but the backend reported failure
    #[error("backend rejected request: {0}")]
    Rejected(String),
}

impl BackendError {
    /// Whether the request failed before the backend could answer
    pub fn is_transport(&self) -> bool {
        matches!(self, BackendError::Transport(_))
    }
}

fn parse_base(url: &str) -> Result<Url, HttpError> {
    let mut base = Url::parse(url).map_err(|e| HttpError::InvalidUrl(format!("{url}: {e}")))?;
    if base.cannot_be_a_base() {
        return Err(HttpError::InvalidUrl(format!("{url}: not a base URL")));
    }
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    Ok(base)
}

/// Client for the primary backend.
#[derive(Clone)]
pub struct PrimaryBackend {
    client: Arc<HttpClient>,
    base: Url,
}

impl PrimaryBackend {
    /// Create a client rooted at `base_url` (e.g. `http://127.0.0.1:8080/`)
    pub fn new(client: Arc<HttpClient>, base_url: &str) -> Result<Self, HttpError> {
        Ok(Self {
            client,
            base: parse_base(base_url)?,
        })
    }

    /// Base URL all endpoints are resolved against
    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, path: &str) -> Result<String, HttpError> {
        self.base
            .join(path)
            .map(String::from)
            .map_err(|e| HttpError::InvalidUrl(e.to_string()))
    }

    /// `GET /status`
    pub async fn status(&self) -> Result<StatusReport, BackendError> {
        let url = self.endpoint("status")?;
        Ok(self.client.get_json(&url).await?)
    }

    /// `POST /connect`, returns the backend's success flag
    pub async fn connect(&self, country: Option<&str>) -> Result<bool, BackendError> {
        let url = self.endpoint("connect")?;
        let body = country.map(|c| ConnectRequest {
            country: c.to_string(),
        });
        let ok: bool = self.client.post_json(&url, body.as_ref()).await?;
        debug!("primary connect({:?}) -> {}", country, ok);
        Ok(ok)
    }

    /// `POST /disconnect`, returns the backend's success flag
    pub async fn disconnect(&self) -> Result<bool, BackendError> {
        let url = self.endpoint("disconnect")?;
        let ok = self.client.post_json::<ConnectRequest, bool>(&url, None).await?;
        debug!("primary disconnect -> {}", ok);
        Ok(ok)
    }
}

/// Client for the secondary (JSON-RPC style) backend.
#[derive(Clone)]
pub struct SecondaryBackend {
    client: Arc<HttpClient>,
    url: Url,
}

impl SecondaryBackend {
    /// Create a client for the single action endpoint at `url`
    pub fn new(client: Arc<HttpClient>, url: &str) -> Result<Self, HttpError> {
        Ok(Self {
            client,
            url: parse_base(url)?,
        })
    }

    /// Endpoint URL
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Send one action and return the raw reply
    pub async fn call(&self, request: &RpcRequest) -> Result<RpcResponse, BackendError> {
        let reply: RpcResponse = self
            .client
            .post_json(self.url.as_str(), Some(request))
            .await?;
        debug!("secondary {} -> success={}", request.action, reply.success);
        Ok(reply)
    }

    /// Like [`call`](Self::call), but `success: false` becomes [`BackendError::Rejected`]
    pub async fn call_checked(&self, request: &RpcRequest) -> Result<RpcResponse, BackendError> {
        let reply = self.call(request).await?;
        if reply.success {
            Ok(reply)
        } else {
            let reason = reply
                .error
                .clone()
                .unwrap_or_else(|| format!("{} failed", request.action));
            Err(BackendError::Rejected(reason))
        }
    }

    /// `{action: "status"}`
    pub async fn status(&self) -> Result<RpcResponse, BackendError> {
        self.call_checked(&RpcRequest::status()).await
    }

    /// `{action: "connect", country}`
    pub async fn connect(&self, country: Option<&str>) -> Result<(), BackendError> {
        self.call_checked(&RpcRequest::connect(country)).await.map(|_| ())
    }

    /// `{action: "disconnect"}`
    pub async fn disconnect(&self) -> Result<(), BackendError> {
        self.call_checked(&RpcRequest::disconnect()).await.map(|_| ())
    }
}
