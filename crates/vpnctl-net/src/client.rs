//! HTTP Client for the Control Backends
//!
//! Uses hyper with tokio for async HTTP/1.1.
//! Features:
//! - Automatic HTTPS with rustls (memory-safe TLS)
//! - Every request bounded by a timeout (a stalled backend never hangs a caller)
//! - JSON helpers for the small control payloads

use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::header::{HeaderMap, ACCEPT, CONTENT_TYPE, HOST, USER_AGENT};
use hyper::{Method, Request, StatusCode, Uri};
use rustls::ClientConfig;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_rustls::TlsConnector;
use tracing::{debug, warn};

/// HTTP client errors
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Request timeout after {0:?}")]
    Timeout(Duration),

    #[error("HTTP error: {0}")]
    HttpError(String),

    #[error("Unexpected status: {0}")]
    Status(StatusCode),

    #[error("TLS error: {0}")]
    TlsError(String),

    #[error("Body read error: {0}")]
    BodyError(String),

    #[error("Response body exceeds {0} bytes")]
    BodyTooLarge(usize),

    #[error("Malformed JSON: {0}")]
    Decode(String),
}

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Whole-request timeout (connect + send + body)
    pub timeout: Duration,
    /// TCP connect timeout
    pub connect_timeout: Duration,
    /// User-Agent string
    pub user_agent: String,
    /// Maximum response body size
    pub max_body_size: usize,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(3),
            user_agent: format!("vpnctl/{}", env!("CARGO_PKG_VERSION")),
            max_body_size: 1024 * 1024, // 1 MB
        }
    }
}

/// HTTP response wrapper
#[derive(Debug)]
pub struct Response {
    /// Status code
    pub status: StatusCode,
    /// Response headers
    pub headers: HeaderMap,
    /// Response body
    pub body: Bytes,
    /// Total request time
    pub total_time: Duration,
}

impl Response {
    /// Check if response was successful (2xx)
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Decode the body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, HttpError> {
        serde_json::from_slice(&self.body).map_err(|e| HttpError::Decode(e.to_string()))
    }
}

/// Client statistics
#[derive(Debug, Default)]
pub struct ClientStats {
    pub requests_made: AtomicU64,
    pub requests_failed: AtomicU64,
    pub timeouts: AtomicU64,
    pub bytes_downloaded: AtomicU64,
}

/// Snapshot of [`ClientStats`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClientStatsSnapshot {
    pub requests_made: u64,
    pub requests_failed: u64,
    pub timeouts: u64,
    pub bytes_downloaded: u64,
}

/// HTTP client shared by the primary and secondary backends
pub struct HttpClient {
    /// Configuration
    config: HttpClientConfig,
    /// TLS connector (built once, only used for https URLs)
    tls: TlsConnector,
    /// Statistics
    stats: ClientStats,
}

impl HttpClient {
    /// Create a new HTTP client
    pub fn new(config: HttpClientConfig) -> Self {
        debug!(
            "HTTP client initialized (timeout: {:?}, connect timeout: {:?})",
            config.timeout, config.connect_timeout
        );

        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let tls_config = ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth();

        Self {
            config,
            tls: TlsConnector::from(Arc::new(tls_config)),
            stats: ClientStats::default(),
        }
    }

    /// Create with default configuration
    pub fn with_defaults() -> Self {
        Self::new(HttpClientConfig::default())
    }

    /// Configuration in use
    pub fn config(&self) -> &HttpClientConfig {
        &self.config
    }

    /// Perform a GET request
    pub async fn get(&self, url: &str) -> Result<Response, HttpError> {
        self.request(Method::GET, url, None).await
    }

    /// GET a JSON document, failing on non-2xx status
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, HttpError> {
        let response = self.get(url).await?;
        Self::expect_success(&response)?;
        response.json()
    }

    /// POST an optional JSON body and decode a JSON reply, failing on non-2xx status
    pub async fn post_json<B, T>(&self, url: &str, body: Option<&B>) -> Result<T, HttpError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let payload = match body {
            Some(body) => {
                Some(serde_json::to_vec(body).map_err(|e| HttpError::Decode(e.to_string()))?)
            }
            None => None,
        };
        let response = self.request(Method::POST, url, payload).await?;
        Self::expect_success(&response)?;
        response.json()
    }

    fn expect_success(response: &Response) -> Result<(), HttpError> {
        if response.is_success() {
            Ok(())
        } else {
            Err(HttpError::Status(response.status))
        }
    }

    /// Perform an HTTP request bounded by the configured timeout
    pub async fn request(
        &self,
        method: Method,
        url: &str,
        body: Option<Vec<u8>>,
    ) -> Result<Response, HttpError> {
        self.stats.requests_made.fetch_add(1, Ordering::Relaxed);

        let result = match tokio::time::timeout(self.config.timeout, self.send(method, url, body)).await
        {
            Ok(result) => result,
            Err(_) => {
                self.stats.timeouts.fetch_add(1, Ordering::Relaxed);
                Err(HttpError::Timeout(self.config.timeout))
            }
        };

        if let Err(ref e) = result {
            self.stats.requests_failed.fetch_add(1, Ordering::Relaxed);
            debug!("HTTP request to {} failed: {}", url, e);
        }
        result
    }

    async fn send(
        &self,
        method: Method,
        url: &str,
        body: Option<Vec<u8>>,
    ) -> Result<Response, HttpError> {
        let start = Instant::now();

        // 1. Parse URL
        let uri: Uri = url
            .parse()
            .map_err(|e: hyper::http::uri::InvalidUri| HttpError::InvalidUrl(e.to_string()))?;

        let host = uri
            .host()
            .ok_or_else(|| HttpError::InvalidUrl("No host in URL".to_string()))?;
        let is_https = match uri.scheme_str() {
            Some("https") => true,
            Some("http") | None => false,
            Some(other) => return Err(HttpError::InvalidUrl(format!("unsupported scheme {other}"))),
        };
        let port = uri.port_u16().unwrap_or(if is_https { 443 } else { 80 });
        let authority = uri
            .authority()
            .map(|a| a.as_str().to_string())
            .unwrap_or_else(|| host.to_string());
        let target = uri.path_and_query().map(|p| p.as_str()).unwrap_or("/");

        // 2. Build request (origin-form target, explicit Host)
        let mut builder = Request::builder()
            .method(method.clone())
            .uri(target)
            .header(HOST, authority)
            .header(USER_AGENT, &self.config.user_agent)
            .header(ACCEPT, "application/json");
        if body.is_some() {
            builder = builder.header(CONTENT_TYPE, "application/json");
        }
        let request = builder
            .body(Full::new(Bytes::from(body.unwrap_or_default())))
            .map_err(|e| HttpError::HttpError(e.to_string()))?;

        // 3. Connect
        let addr = format!("{}:{}", host, port);
        let stream = tokio::time::timeout(
            self.config.connect_timeout,
            tokio::net::TcpStream::connect(&addr),
        )
        .await
        .map_err(|_| HttpError::Timeout(self.config.connect_timeout))?
        .map_err(|e| HttpError::ConnectionFailed(e.to_string()))?;

        let response = if is_https {
            let server_name = rustls::pki_types::ServerName::try_from(host.to_string())
                .map_err(|_| HttpError::TlsError("Invalid server name".to_string()))?;
            let tls_stream = self
                .tls
                .connect(server_name, stream)
                .await
                .map_err(|e| HttpError::TlsError(e.to_string()))?;
            Self::exchange(tls_stream, request).await?
        } else {
            Self::exchange(stream, request).await?
        };

        // 4. Read response
        let status = response.status();
        let headers = response.headers().clone();
        let collected = response
            .into_body()
            .collect()
            .await
            .map_err(|e| HttpError::BodyError(e.to_string()))?;
        let body = collected.to_bytes();
        if body.len() > self.config.max_body_size {
            return Err(HttpError::BodyTooLarge(self.config.max_body_size));
        }

        self.stats
            .bytes_downloaded
            .fetch_add(body.len() as u64, Ordering::Relaxed);

        let total_time = start.elapsed();
        debug!(
            "HTTP {} {} -> {} ({} bytes, {:?})",
            method,
            url,
            status,
            body.len(),
            total_time
        );

        Ok(Response {
            status,
            headers,
            body,
            total_time,
        })
    }

    async fn exchange<T>(
        io: T,
        request: Request<Full<Bytes>>,
    ) -> Result<hyper::Response<hyper::body::Incoming>, HttpError>
    where
        T: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let io = hyper_util::rt::TokioIo::new(io);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| HttpError::HttpError(e.to_string()))?;

        tokio::spawn(async move {
            if let Err(e) = conn.await {
                warn!("Connection error: {}", e);
            }
        });

        sender
            .send_request(request)
            .await
            .map_err(|e| HttpError::HttpError(e.to_string()))
    }

    /// Get client statistics
    pub fn stats(&self) -> ClientStatsSnapshot {
        ClientStatsSnapshot {
            requests_made: self.stats.requests_made.load(Ordering::Relaxed),
            requests_failed: self.stats.requests_failed.load(Ordering::Relaxed),
            timeouts: self.stats.timeouts.load(Ordering::Relaxed),
            bytes_downloaded: self.stats.bytes_downloaded.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_client_creation() {
        let client = HttpClient::with_defaults();
        assert_eq!(client.config().timeout, Duration::from_secs(10));
        assert_eq!(client.stats(), ClientStatsSnapshot::default());
    }

    #[tokio::test]
    async fn test_invalid_url() {
        let client = HttpClient::with_defaults();

        let result = client.get("not a url").await;
        assert!(matches!(result, Err(HttpError::InvalidUrl(_))));

        let result = client.get("ftp://example.com/status").await;
        assert!(matches!(result, Err(HttpError::InvalidUrl(_))));
        assert_eq!(client.stats().requests_failed, 2);
    }

    #[tokio::test]
    async fn test_connection_refused() {
        // Bind then drop to get a port nothing listens on
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = HttpClient::with_defaults();
        let result = client.get(&format!("http://{addr}/status")).await;
        assert!(matches!(
            result,
            Err(HttpError::ConnectionFailed(_)) | Err(HttpError::Timeout(_))
        ));
    }

    #[test]
    fn test_response_json() {
        let response = Response {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Bytes::from_static(b"true"),
            total_time: Duration::ZERO,
        };
        assert!(response.is_success());
        assert!(response.json::<bool>().unwrap());
        assert!(matches!(response.json::<u32>(), Err(HttpError::Decode(_))));
    }
}
