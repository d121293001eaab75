//! HTTP transports.
//!
//! A [`Transport`] round-trips one request. The API and gateway clients are the
//! same [`crate::HttpClient`] over different transports: plain `reqwest`, an
//! authorization wrapper, or HTTP/1 over a unix socket.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{HarnessError, Result};
use crate::http_client::{HttpRequest, HttpResponse};

/// Round-trip a single HTTP request.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `req` and materialise the whole response.
    async fn round_trip(&self, req: HttpRequest) -> Result<HttpResponse>;

    /// The same transport, returning 3xx responses instead of following them.
    fn without_redirects(&self) -> Result<Arc<dyn Transport>> {
        Err(HarnessError::Network(
            "redirect policy is fixed for this transport".to_string(),
        ))
    }
}

/// Default request timeout for harness HTTP calls.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// `reqwest`-backed transport for TCP endpoints.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Build a transport; `follow_redirects = false` surfaces 3xx responses.
    pub fn new(follow_redirects: bool) -> Result<Self> {
        let policy = if follow_redirects {
            reqwest::redirect::Policy::default()
        } else {
            reqwest::redirect::Policy::none()
        };
        let client = reqwest::Client::builder()
            .redirect(policy)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn round_trip(&self, req: HttpRequest) -> Result<HttpResponse> {
        let mut builder = self.client.request(req.method, &req.url);
        for (name, value) in &req.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = req.body {
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.bytes().await?;
        Ok(HttpResponse::new(status, headers, body.to_vec()))
    }

    fn without_redirects(&self) -> Result<Arc<dyn Transport>> {
        Ok(Arc::new(Self::new(false)?))
    }
}

/// Sets `Authorization` on every request, then delegates.
pub struct AuthorizedTransport {
    inner: Arc<dyn Transport>,
    authorization: String,
}

impl AuthorizedTransport {
    /// Wrap `inner`, sending `authorization` verbatim (e.g. `Bearer <token>`).
    pub fn new(inner: Arc<dyn Transport>, authorization: impl Into<String>) -> Self {
        Self {
            inner,
            authorization: authorization.into(),
        }
    }
}

#[async_trait]
impl Transport for AuthorizedTransport {
    async fn round_trip(&self, mut req: HttpRequest) -> Result<HttpResponse> {
        req.set_header("Authorization", &self.authorization);
        self.inner.round_trip(req).await
    }

    fn without_redirects(&self) -> Result<Arc<dyn Transport>> {
        Ok(Arc::new(Self::new(
            self.inner.without_redirects()?,
            self.authorization.clone(),
        )))
    }
}

/// HTTP/1 over a unix-domain socket, for `/unix/...` API addresses.
#[cfg(unix)]
#[derive(Debug, Clone)]
pub struct UnixSocketTransport {
    path: std::path::PathBuf,
}

#[cfg(unix)]
impl UnixSocketTransport {
    /// Connect to the socket at `path` on each request.
    pub fn new(path: impl Into<std::path::PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[cfg(unix)]
#[async_trait]
impl Transport for UnixSocketTransport {
    async fn round_trip(&self, req: HttpRequest) -> Result<HttpResponse> {
        use bytes::Bytes;
        use http_body_util::{BodyExt, Full};
        use hyper_util::rt::TokioIo;

        let url = reqwest::Url::parse(&req.url)
            .map_err(|e| HarnessError::Network(format!("invalid url {}: {e}", req.url)))?;
        let target = match url.query() {
            Some(query) => format!("{}?{}", url.path(), query),
            None => url.path().to_string(),
        };

        let stream = tokio::net::UnixStream::connect(&self.path)
            .await
            .map_err(|e| {
                HarnessError::Network(format!("connection failed: {}: {e}", self.path.display()))
            })?;
        let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream)).await?;
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                tracing::debug!(error = %e, "unix socket connection closed");
            }
        });

        let has_host = req.header("Host").is_some();
        let mut builder = http::Request::builder().method(req.method).uri(target);
        if !has_host {
            builder = builder.header(http::header::HOST, "unix");
        }
        for (name, value) in &req.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        let request = builder.body(Full::new(Bytes::from(req.body.unwrap_or_default())))?;

        let response = sender.send_request(request).await?;
        let (parts, body) = response.into_parts();
        let body = body.collect().await?.to_bytes();
        Ok(HttpResponse::new(parts.status.as_u16(), parts.headers, body.to_vec()))
    }

    // hyper connections never follow redirects.
    fn without_redirects(&self) -> Result<Arc<dyn Transport>> {
        Ok(Arc::new(self.clone()))
    }
}
