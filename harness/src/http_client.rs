//! HTTP client bound to one node endpoint.
//!
//! [`HttpClient`] is used for both the RPC API and the gateway; only the base
//! URL and the [`Transport`] differ. Responses are read eagerly so assertions
//! can inspect status, headers, and body without touching a stream.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use http::{HeaderMap, Method};
use serde::de::DeserializeOwned;

use crate::error::{HarnessError, Result};
use crate::transport::{AuthorizedTransport, ReqwestTransport, Transport};

/// An outgoing request, before the transport sees it.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// Method.
    pub method: Method,
    /// Absolute URL.
    pub url: String,
    /// Headers in insertion order; names are case-insensitive.
    pub headers: Vec<(String, String)>,
    /// Optional body.
    pub body: Option<Vec<u8>>,
}

impl HttpRequest {
    /// A request with no headers or body.
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    /// First value of header `name`.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Replace every value of header `name` with `value`.
    pub fn set_header(&mut self, name: &str, value: &str) {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.headers.push((name.to_string(), value.to_string()));
    }
}

/// A fully-read response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Response headers.
    pub headers: HeaderMap,
    /// Body as text (lossy UTF-8).
    pub body: String,
    /// Body as raw bytes.
    pub raw: Vec<u8>,
}

impl HttpResponse {
    /// Build from parts.
    pub fn new(status: u16, headers: HeaderMap, raw: Vec<u8>) -> Self {
        let body = String::from_utf8_lossy(&raw).into_owned();
        Self {
            status,
            headers,
            body,
            raw,
        }
    }

    /// First value of header `name`, if it is valid text.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Parse the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.raw).map_err(|e| {
            HarnessError::Network(format!("invalid JSON body (status {}): {e}", self.status))
        })
    }
}

/// Per-request edit applied before sending.
pub type RequestMutator = Box<dyn FnOnce(&mut HttpRequest) + Send>;

/// Set a header on one request.
pub fn with_header(name: impl Into<String>, value: impl Into<String>) -> RequestMutator {
    let name = name.into();
    let value = value.into();
    Box::new(move |req| req.set_header(&name, &value))
}

/// Override the `Host` header on one request.
pub fn with_host(host: impl Into<String>) -> RequestMutator {
    with_header("Host", host)
}

/// Client bound to a base URL.
#[derive(Clone)]
pub struct HttpClient {
    base_url: String,
    transport: Arc<dyn Transport>,
    /// Values substituted for `{{.Key}}` placeholders in request paths.
    pub template_data: BTreeMap<String, String>,
}

impl fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpClient")
            .field("base_url", &self.base_url)
            .field("template_data", &self.template_data)
            .finish_non_exhaustive()
    }
}

impl HttpClient {
    /// A client following redirects, over plain `reqwest`.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Ok(Self::from_transport(base_url, Arc::new(ReqwestTransport::new(true)?)))
    }

    /// A client over an explicit transport.
    pub fn from_transport(base_url: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            transport,
            template_data: BTreeMap::new(),
        }
    }

    /// Base URL, without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Replace the transport.
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = transport;
        self
    }

    /// Return 3xx responses instead of following them.
    ///
    /// Keeps the transport and any authorization wrapper; fails for custom
    /// transports that cannot change their redirect policy.
    pub fn disable_redirects(self) -> Result<Self> {
        let transport = self.transport.without_redirects()?;
        Ok(self.with_transport(transport))
    }

    /// Send `authorization` on every request.
    pub fn with_authorization(self, authorization: impl Into<String>) -> Self {
        let inner = self.transport.clone();
        self.with_transport(Arc::new(AuthorizedTransport::new(inner, authorization)))
    }

    /// Add a template value.
    pub fn with_template(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.template_data.insert(key.into(), value.into());
        self
    }

    fn render(&self, path: &str) -> String {
        self.template_data
            .iter()
            .fold(path.to_string(), |acc, (key, value)| {
                acc.replace(&format!("{{{{.{key}}}}}"), value)
            })
    }

    /// Absolute URL for `path`, with template values substituted.
    pub fn build_url(&self, path: &str) -> String {
        let path = self.render(path);
        if path.starts_with("http://") || path.starts_with("https://") {
            return path;
        }
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    /// Apply mutators and send.
    pub async fn send(
        &self,
        mut req: HttpRequest,
        mutators: Vec<RequestMutator>,
    ) -> Result<HttpResponse> {
        for mutate in mutators {
            mutate(&mut req);
        }
        tracing::trace!(method = %req.method, url = %req.url, "http request");
        self.transport.round_trip(req).await
    }

    /// GET `path`.
    pub async fn get(&self, path: &str) -> Result<HttpResponse> {
        self.get_with(path, Vec::new()).await
    }

    /// GET `path` with per-request mutators.
    pub async fn get_with(&self, path: &str, mutators: Vec<RequestMutator>) -> Result<HttpResponse> {
        let req = HttpRequest::new(Method::GET, self.build_url(path));
        self.send(req, mutators).await
    }

    /// POST `path` with an optional body.
    pub async fn post(&self, path: &str, body: Option<Vec<u8>>) -> Result<HttpResponse> {
        self.post_with(path, body, Vec::new()).await
    }

    /// POST `path` with an optional body and per-request mutators.
    pub async fn post_with(
        &self,
        path: &str,
        body: Option<Vec<u8>>,
        mutators: Vec<RequestMutator>,
    ) -> Result<HttpResponse> {
        let mut req = HttpRequest::new(Method::POST, self.build_url(path));
        req.body = body;
        self.send(req, mutators).await
    }

    /// POST a text body.
    pub async fn post_str(&self, path: &str, body: &str) -> Result<HttpResponse> {
        self.post(path, Some(body.as_bytes().to_vec())).await
    }

    /// POST an RPC command, e.g. `api_post("id", &[])` or `api_post("cat", &[("arg", cid)])`.
    pub async fn api_post(&self, cmd: &str, args: &[(&str, &str)]) -> Result<HttpResponse> {
        let base = self.build_url(&format!("/api/v0/{}", cmd.trim_start_matches('/')));
        let url = reqwest::Url::parse_with_params(&base, args)
            .map_err(|e| HarnessError::Network(format!("invalid url {base}: {e}")))?;
        let req = HttpRequest::new(Method::POST, url.as_str());
        self.send(req, Vec::new()).await
    }
}
