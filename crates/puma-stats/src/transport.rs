//! Fetching raw documents from the Puma control server
//!
//! Two transports share one request shape, `GET /{kind}?token={token}`:
//! - [`HttpTransport`] over TCP using reqwest
//! - [`UnixSocketTransport`] speaking HTTP/1.1 over a unix domain socket
//!
//! Every fetch opens its own connection and closes it afterwards.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use http_body_util::{BodyExt, Empty};
use hyper::body::Bytes;
use hyper::client::conn::http1::SendRequest;
use hyper::{header, Method, Request, StatusCode};
use hyper_util::rt::TokioIo;
use reqwest::Client;
use tokio::net::UnixStream;
use tracing::debug;
use url::Url;

use crate::config::{Endpoint, PluginConfig, StatsKind};
use crate::error::{PumaError, Result};

/// Source of raw `/stats` and `/gc-stats` bodies
#[async_trait]
pub trait StatsTransport: Send + Sync {
    /// Fetch one document. Fails on connection errors and on any status
    /// other than 200.
    async fn fetch(&self, kind: StatsKind) -> Result<Vec<u8>>;

    /// Human readable target, without the token
    fn endpoint(&self) -> String;
}

/// Create the transport for the configured endpoint
pub fn create_transport(config: &PluginConfig) -> Result<Arc<dyn StatsTransport>> {
    match &config.endpoint {
        Endpoint::Tcp { .. } => {
            let base_url = format!("http://{}/", config.endpoint.authority());
            Ok(Arc::new(HttpTransport::new(
                &base_url,
                &config.token,
                config.timeout,
            )?))
        }
        Endpoint::UnixSocket { path, .. } => Ok(Arc::new(UnixSocketTransport::new(
            path.clone(),
            config.endpoint.authority(),
            &config.token,
            config.timeout,
        ))),
    }
}

/// Path and query for a request, e.g. `/gc-stats?token=abc`
pub fn request_target(kind: StatsKind, token: &str) -> String {
    let query = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("token", token)
        .finish();
    format!("/{}?{}", kind.path(), query)
}

/// HTTP over TCP
pub struct HttpTransport {
    client: Client,
    base_url: Url,
    token: String,
}

impl HttpTransport {
    pub fn new(base_url: &str, token: &str, timeout: Option<Duration>) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| PumaError::InvalidEndpoint(format!("{}: {}", base_url, e)))?;

        let mut builder = Client::builder().pool_max_idle_per_host(0);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| PumaError::transport(base_url.as_str(), e))?;

        Ok(Self {
            client,
            base_url,
            token: token.to_string(),
        })
    }

    /// Full request URL including the token
    pub fn request_url(&self, kind: StatsKind) -> Result<Url> {
        self.base_url
            .join(&request_target(kind, &self.token))
            .map_err(|e| PumaError::InvalidEndpoint(e.to_string()))
    }

    fn display_url(&self, kind: StatsKind) -> String {
        match self.base_url.join(kind.path()) {
            Ok(url) => url.to_string(),
            Err(_) => self.base_url.to_string(),
        }
    }
}

#[async_trait]
impl StatsTransport for HttpTransport {
    async fn fetch(&self, kind: StatsKind) -> Result<Vec<u8>> {
        let url = self.request_url(kind)?;
        let endpoint = self.display_url(kind);
        debug!(endpoint = %endpoint, "Fetching over TCP");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| PumaError::transport(&endpoint, e.without_url()))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(PumaError::Remote {
                endpoint,
                status: status.to_string(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| PumaError::transport(&endpoint, e.without_url()))?;

        debug!(endpoint = %endpoint, bytes = body.len(), "Fetched document");
        Ok(body.to_vec())
    }

    fn endpoint(&self) -> String {
        self.base_url.to_string()
    }
}

/// HTTP over a unix domain socket
pub struct UnixSocketTransport {
    path: PathBuf,
    authority: String,
    token: String,
    timeout: Option<Duration>,
}

impl UnixSocketTransport {
    /// `authority` only fills the `Host` header
    pub fn new(
        path: impl Into<PathBuf>,
        authority: impl Into<String>,
        token: &str,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            path: path.into(),
            authority: authority.into(),
            token: token.to_string(),
            timeout,
        }
    }

    async fn exchange(&self, kind: StatsKind) -> Result<Vec<u8>> {
        let endpoint = format!("{}/{}", self.endpoint(), kind.path());

        let stream = UnixStream::connect(&self.path)
            .await
            .map_err(|e| PumaError::transport(&endpoint, e))?;

        let (mut sender, connection) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
            .await
            .map_err(|e| PumaError::transport(&endpoint, e))?;

        let driver = tokio::spawn(async move {
            if let Err(err) = connection.await {
                debug!(error = %err, "Unix socket connection ended with error");
            }
        });

        let request = Request::builder()
            .method(Method::GET)
            .uri(request_target(kind, &self.token))
            .header(header::HOST, &self.authority)
            .header(header::CONNECTION, "close")
            .body(Empty::<Bytes>::new())
            .map_err(|e| PumaError::InvalidEndpoint(e.to_string()))?;

        debug!(endpoint = %endpoint, "Fetching over unix socket");
        let result = Self::send(&mut sender, request, &endpoint).await;

        drop(sender);
        if result.is_err() {
            driver.abort();
        }
        let _ = driver.await;

        result
    }

    async fn send(
        sender: &mut SendRequest<Empty<Bytes>>,
        request: Request<Empty<Bytes>>,
        endpoint: &str,
    ) -> Result<Vec<u8>> {
        let response = sender
            .send_request(request)
            .await
            .map_err(|e| PumaError::transport(endpoint, e))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(PumaError::Remote {
                endpoint: endpoint.to_string(),
                status: status.to_string(),
            });
        }

        let body = response
            .into_body()
            .collect()
            .await
            .map_err(|e| PumaError::transport(endpoint, e))?
            .to_bytes();

        debug!(endpoint, bytes = body.len(), "Fetched document");
        Ok(body.to_vec())
    }
}

#[async_trait]
impl StatsTransport for UnixSocketTransport {
    async fn fetch(&self, kind: StatsKind) -> Result<Vec<u8>> {
        match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.exchange(kind))
                .await
                .map_err(|_| {
                    PumaError::transport(
                        format!("{}/{}", self.endpoint(), kind.path()),
                        format!("timed out after {:?}", timeout),
                    )
                })?,
            None => self.exchange(kind).await,
        }
    }

    fn endpoint(&self) -> String {
        format!("unix:{}", self.path.display())
    }
}
