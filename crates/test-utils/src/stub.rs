use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{Arc, Mutex},
    time::Duration,
};

use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, Method, StatusCode, Uri, header},
    response::{IntoResponse, Response},
};
use serde_json::Value;
use tokio::{net::TcpListener, sync::oneshot, task::JoinHandle};
use url::Url;

/// A canned answer of the [`StubBackend`].
#[derive(Debug, Clone)]
pub struct StubResponse {
    status: StatusCode,
    body: String,
    delay: Option<Duration>,
}

/// A request received by the [`StubBackend`].
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    /// The HTTP method.
    pub method: Method,
    /// The request path, without the query.
    pub path: String,
    /// The `Accept` header.
    pub accept: Option<String>,
    /// The `Content-Type` header.
    pub content_type: Option<String>,
    /// The JSON body, when there was one.
    pub body: Option<Value>,
}

#[derive(Default)]
struct StubState {
    routes: HashMap<(Method, String), StubResponse>,
    requests: Vec<RecordedRequest>,
}

/// An in-process HTTP server standing in for the wallet backend.
///
/// Routes answer whatever was registered with [`StubBackend::respond`]; anything else
/// answers `404` with an empty body. The server shuts down when dropped.
pub struct StubBackend {
    addr: SocketAddr,
    state: Arc<Mutex<StubState>>,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl StubResponse {
    /// A `200` answer with a JSON body.
    pub fn json(body: Value) -> Self {
        Self::with_status(StatusCode::OK, body)
    }

    /// An answer with the given status and JSON body.
    pub fn with_status(status: StatusCode, body: Value) -> Self {
        Self { status, body: body.to_string(), delay: None }
    }

    /// An answer with the given status and a raw body.
    pub fn raw(status: StatusCode, body: impl Into<String>) -> Self {
        Self { status, body: body.into(), delay: None }
    }

    /// A `200` answer with an empty body.
    pub fn empty() -> Self {
        Self::raw(StatusCode::OK, "")
    }

    /// Delays the answer.
    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

impl StubBackend {
    /// Binds a fresh server on a random local port and starts serving.
    pub async fn spawn() -> Self {
        let state = Arc::new(Mutex::new(StubState::default()));
        let router = Router::new().fallback(handle).with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown, shutdown_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let _ = axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await;
        });

        Self { addr, state, shutdown: Some(shutdown), task }
    }

    /// Returns the base url of the server.
    pub fn url(&self) -> Url {
        format!("http://{}", self.addr).parse().unwrap()
    }

    /// Registers the answer for `method` on `path`, replacing any earlier one.
    pub fn respond(&self, method: Method, path: &str, response: StubResponse) -> &Self {
        let path = format!("/{}", path.trim_start_matches('/'));
        self.state.lock().unwrap().routes.insert((method, path), response);
        self
    }

    /// Returns every request received so far, oldest first.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.lock().unwrap().requests.clone()
    }

    /// Returns the requests received on `path`, oldest first.
    pub fn requests_to(&self, path: &str) -> Vec<RecordedRequest> {
        let path = format!("/{}", path.trim_start_matches('/'));
        self.requests().into_iter().filter(|request| request.path == path).collect()
    }
}

impl Drop for StubBackend {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        self.task.abort();
    }
}

async fn handle(
    State(state): State<Arc<Mutex<StubState>>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let header_value = |name: header::HeaderName| {
        headers.get(name).and_then(|v| v.to_str().ok()).map(ToOwned::to_owned)
    };

    let recorded = RecordedRequest {
        method: method.clone(),
        path: uri.path().to_owned(),
        accept: header_value(header::ACCEPT),
        content_type: header_value(header::CONTENT_TYPE),
        body: serde_json::from_slice(&body).ok(),
    };

    let response = {
        let mut state = state.lock().unwrap();
        state.requests.push(recorded);
        state.routes.get(&(method, uri.path().to_owned())).cloned()
    };

    let Some(StubResponse { status, body, delay }) = response else {
        return StatusCode::NOT_FOUND.into_response();
    };

    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }

    (status, [(header::CONTENT_TYPE, "application/json")], body).into_response()
}
