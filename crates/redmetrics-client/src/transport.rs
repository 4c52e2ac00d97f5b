//! HTTP transport boundary.
//!
//! The connection and query code never talk to an HTTP library directly.
//! They build an [`HttpRequest`], hand it to a [`Transport`], and get back a
//! [`HttpResponse`] with lower-cased headers and a parsed JSON body. This
//! keeps the lifecycle logic testable against an in-memory transport and
//! lets hosts bring their own client.
//!
//! [`HttpTransport`] is the production implementation over `reqwest`.
//!
//! A non-2xx status is a valid response, not a transport failure; callers
//! decide what a given status means via [`send_checked`].

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::error::TransportError;

/// HTTP methods used by the service API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// `GET`
    Get,
    /// `POST`
    Post,
    /// `PUT`
    Put,
}

impl Method {
    /// The method name as sent on the wire.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
        }
    }
}

impl core::fmt::Display for Method {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request to the service.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    /// HTTP method.
    pub method: Method,
    /// Absolute URL, without query string.
    pub url: String,
    /// JSON body, sent as `application/json` when present.
    pub body: Option<Value>,
    /// Query string parameters, in order.
    pub query: Vec<(String, String)>,
}

impl HttpRequest {
    /// A `GET` without parameters.
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            body: None,
            query: Vec::new(),
        }
    }

    /// A `POST` with a JSON body.
    pub fn post(url: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            body: Some(body),
            query: Vec::new(),
        }
    }

    /// A `PUT` with a JSON body.
    pub fn put(url: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::Put,
            url: url.into(),
            body: Some(body),
            query: Vec::new(),
        }
    }

    /// Attach query string parameters.
    #[must_use]
    pub fn with_query(mut self, query: Vec<(String, String)>) -> Self {
        self.query = query;
        self
    }
}

/// A response from the service.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers keyed by lower-cased name.
    pub headers: BTreeMap<String, String>,
    /// Parsed JSON body; `Null` when the body was empty.
    pub data: Value,
}

impl HttpResponse {
    /// A response with the given status and body and no headers.
    pub const fn new(status: u16, data: Value) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            data,
        }
    }

    /// Add a header; the name is lower-cased.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// Whether the status is in the 2xx range.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Look up a header by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

/// Capability to perform HTTP requests against the service.
///
/// Implementations must be shareable across tasks: the flush timer sends
/// from a spawned task while the caller may be issuing its own requests.
pub trait Transport: Send + Sync + 'static {
    /// Send one request and return the response, whatever its status.
    fn send(
        &self,
        request: HttpRequest,
    ) -> impl Future<Output = Result<HttpResponse, TransportError>> + Send;
}

impl<T: Transport> Transport for Arc<T> {
    fn send(
        &self,
        request: HttpRequest,
    ) -> impl Future<Output = Result<HttpResponse, TransportError>> + Send {
        (**self).send(request)
    }
}

/// Send a request and treat any non-2xx status as a failure.
///
/// The error is a human-readable description suitable for wrapping in a
/// [`ClientError`](crate::error::ClientError) variant.
pub(crate) async fn send_checked<T: Transport>(
    transport: &T,
    request: HttpRequest,
) -> Result<HttpResponse, String> {
    let method = request.method;
    let url = request.url.clone();
    debug!(method = %method, url = %url, "sending request");

    let response = transport.send(request).await.map_err(|e| e.to_string())?;
    if response.is_success() {
        Ok(response)
    } else {
        Err(format!(
            "{method} {url} returned {}: {}",
            response.status, response.data
        ))
    }
}

// ---------------------------------------------------------------------------
// reqwest-backed transport
// ---------------------------------------------------------------------------

/// Production transport over a shared `reqwest` client.
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport with a default `reqwest` client.
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Create a transport around an existing client (timeouts, proxies, ...).
    pub const fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Transport for HttpTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
        };

        let mut builder = self.client.request(method, &request.url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| {
            TransportError::Request(format!("{} {}: {e}", request.method, request.url))
        })?;

        let status = response.status().as_u16();
        let headers: BTreeMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_owned()))
            })
            .collect();

        let text = response.text().await.map_err(|e| {
            TransportError::Request(format!("reading body of {}: {e}", request.url))
        })?;

        let data = decode_body(status, text)?;
        Ok(HttpResponse {
            status,
            headers,
            data,
        })
    }
}

/// Parse a response body as JSON.
///
/// Empty bodies become `Null`. Error responses whose body is not JSON keep
/// the raw text so the failure can still be reported.
fn decode_body(status: u16, text: String) -> Result<Value, TransportError> {
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    match serde_json::from_str(&text) {
        Ok(value) => Ok(value),
        Err(_) if !(200..300).contains(&status) => Ok(Value::String(text)),
        Err(e) => Err(TransportError::Decode(e.to_string())),
    }
}
