//! In-memory transport shared by the integration tests.

#![allow(dead_code, clippy::unwrap_used)]

use std::sync::{Arc, Mutex};

use redmetrics_client::{
    ConnectionConfig, HttpRequest, HttpResponse, Method, Transport, TransportError,
};
use serde_json::{Value, json};
use tokio::sync::Semaphore;

/// Base URL every test connection points at.
pub const BASE_URL: &str = "http://metrics.test";

type Handler = Arc<dyn Fn(&HttpRequest) -> Result<HttpResponse, TransportError> + Send + Sync>;

struct Route {
    method: Method,
    path: String,
    handler: Handler,
}

struct Gate {
    method: Method,
    path: String,
    semaphore: Arc<Semaphore>,
}

/// Scripted transport that records every request it receives.
///
/// Routes match on method and the URL path after [`BASE_URL`]; the most
/// recently registered route wins. Unrouted requests get a 404.
#[derive(Default)]
pub struct MockTransport {
    routes: Mutex<Vec<Route>>,
    gates: Mutex<Vec<Gate>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Answer `method path` with a handler.
    pub fn on<F>(&self, method: Method, path: &str, handler: F)
    where
        F: Fn(&HttpRequest) -> Result<HttpResponse, TransportError> + Send + Sync + 'static,
    {
        self.routes.lock().unwrap().push(Route {
            method,
            path: path.to_owned(),
            handler: Arc::new(handler),
        });
    }

    /// Answer `method path` with a fixed status and body.
    pub fn respond(&self, method: Method, path: &str, status: u16, body: Value) {
        self.on(method, path, move |_| {
            Ok(HttpResponse::new(status, body.clone()))
        });
    }

    /// Answer `method path` with a fixed response.
    pub fn respond_with(&self, method: Method, path: &str, response: HttpResponse) {
        self.on(method, path, move |_| Ok(response.clone()));
    }

    /// Fail `method path` at the transport level.
    pub fn fail(&self, method: Method, path: &str, reason: &str) {
        let reason = reason.to_owned();
        self.on(method, path, move |_| {
            Err(TransportError::Request(reason.clone()))
        });
    }

    /// Echo the request body back with the given status.
    pub fn echo(&self, method: Method, path: &str, status: u16) {
        self.on(method, path, move |request| {
            Ok(HttpResponse::new(
                status,
                request.body.clone().unwrap_or(Value::Null),
            ))
        });
    }

    /// Hold requests to `method path` until the returned semaphore gets a
    /// permit. Once opened the gate stays open.
    pub fn gate(&self, method: Method, path: &str) -> Arc<Semaphore> {
        let semaphore = Arc::new(Semaphore::new(0));
        self.gates.lock().unwrap().push(Gate {
            method,
            path: path.to_owned(),
            semaphore: Arc::clone(&semaphore),
        });
        semaphore
    }

    /// Routes for a healthy service registering player `player_id`, with
    /// batches echoed back.
    pub fn healthy(&self, game_version_id: &str, player_id: &str) {
        self.respond(Method::Get, "/status", 200, json!({"status": "ok"}));
        self.respond(
            Method::Get,
            &format!("/v1/gameVersion/{game_version_id}"),
            200,
            json!({"id": game_version_id}),
        );
        self.respond(Method::Post, "/v1/player/", 201, json!({"id": player_id}));
        self.echo(Method::Put, &format!("/v1/player/{player_id}"), 200);
        self.echo(Method::Post, "/v1/event/", 201);
        self.echo(Method::Post, "/v1/snapshot/", 201);
    }

    /// Every request received so far, in arrival order.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Requests received for `method path`.
    pub fn requests_to(&self, method: Method, path: &str) -> Vec<HttpRequest> {
        self.requests()
            .into_iter()
            .filter(|request| request.method == method && path_of(&request.url) == path)
            .collect()
    }
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("requests", &self.requests.lock().unwrap().len())
            .finish_non_exhaustive()
    }
}

impl Transport for MockTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let path = path_of(&request.url).to_owned();
        self.requests.lock().unwrap().push(request.clone());

        let gate = self
            .gates
            .lock()
            .unwrap()
            .iter()
            .find(|gate| gate.method == request.method && gate.path == path)
            .map(|gate| Arc::clone(&gate.semaphore));
        if let Some(gate) = gate {
            drop(gate.acquire().await.unwrap());
        }

        let handler = self
            .routes
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|route| route.method == request.method && route.path == path)
            .map(|route| Arc::clone(&route.handler));
        match handler {
            Some(handler) => handler(&request),
            None => Ok(HttpResponse::new(404, json!({"error": "not found"}))),
        }
    }
}

fn path_of(url: &str) -> &str {
    url.strip_prefix(BASE_URL).unwrap_or(url)
}

/// Connection options pointing at [`BASE_URL`].
pub fn config(game_version_id: &str, buffering_delay_ms: u64) -> ConnectionConfig {
    let mut config = ConnectionConfig::new(game_version_id).with_base_url(BASE_URL);
    config.buffering_delay_ms = buffering_delay_ms;
    config
}

/// The JSON array body of a batch request.
pub fn batch(request: &HttpRequest) -> Vec<Value> {
    request
        .body
        .as_ref()
        .and_then(Value::as_array)
        .cloned()
        .unwrap()
}

/// Route crate logs to the test output; safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
