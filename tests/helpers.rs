// Shared test helpers: in-process axum servers.
//
// The echo server answers every request with a JSON description of what it
// received, so tests can assert on the exact method, URI, headers and body the
// client sent. `/upload` additionally decodes multipart bodies. The gauge
// server records how many requests it is handling at once and which client
// connections it saw.

use std::collections::{BTreeMap, HashSet};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{ConnectInfo, Multipart, State};
use axum::http::{HeaderMap, Method, Uri};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};

async fn echo(method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> Json<Value> {
    let headers: BTreeMap<String, String> = headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect();
    Json(json!({
        "method": method.as_str(),
        "uri": uri.to_string(),
        "headers": headers,
        "body": String::from_utf8_lossy(&body),
    }))
}

async fn upload(headers: HeaderMap, mut multipart: Multipart) -> Json<Value> {
    let mut fields = serde_json::Map::new();
    let mut files = serde_json::Map::new();
    while let Ok(Some(field)) = multipart.next_field().await {
        let name = field.name().unwrap_or_default().to_string();
        let filename = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let data = field.bytes().await.unwrap_or_default();
        let data = String::from_utf8_lossy(&data).into_owned();
        match filename {
            Some(filename) => {
                files.insert(
                    name,
                    json!({ "filename": filename, "type": content_type, "data": data }),
                );
            }
            None => {
                fields.insert(name, Value::String(data));
            }
        }
    }
    let content_type = headers
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    Json(json!({ "fields": fields, "files": files, "content_type": content_type }))
}

/// Starts the echo server on an ephemeral port and returns its address.
#[allow(dead_code)] // Used by other test files
pub async fn spawn_echo_server() -> SocketAddr {
    let app = Router::new()
        .route("/upload", post(upload))
        .fallback(echo);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind echo server");
    let addr = listener.local_addr().expect("Echo server has no address");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("Echo server failed");
    });
    addr
}

/// Builds `http://<addr><path>`.
#[allow(dead_code)] // Used by other test files
pub fn url(addr: SocketAddr, path: &str) -> String {
    format!("http://{addr}{path}")
}

/// A local address with nothing listening on it.
#[allow(dead_code)] // Used by other test files
pub fn closed_port_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("Failed to bind");
    let addr = listener.local_addr().expect("No local address");
    drop(listener);
    format!("http://{addr}/")
}

/// Request counters kept by [`spawn_gauge_server`].
#[allow(dead_code)] // Used by other test files
#[derive(Debug, Default)]
pub struct Gauge {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    served: AtomicUsize,
    peers: Mutex<HashSet<SocketAddr>>,
}

#[allow(dead_code)] // Used by other test files
impl Gauge {
    /// Most requests handled at the same time.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn served(&self) -> usize {
        self.served.load(Ordering::SeqCst)
    }

    /// Distinct client connections seen.
    pub fn connections(&self) -> usize {
        self.peers.lock().unwrap().len()
    }
}

#[allow(dead_code)] // Used by other test files
async fn measure(
    State(gauge): State<Arc<Gauge>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    uri: Uri,
) -> String {
    gauge.peers.lock().unwrap().insert(peer);
    let now = gauge.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
    gauge.peak.fetch_max(now, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(50)).await;
    gauge.in_flight.fetch_sub(1, Ordering::SeqCst);
    gauge.served.fetch_add(1, Ordering::SeqCst);
    uri.path().to_string()
}

/// Starts a server whose every route sleeps briefly and answers with its path
/// as `text/plain`.
#[allow(dead_code)] // Used by other test files
pub async fn spawn_gauge_server() -> (SocketAddr, Arc<Gauge>) {
    let gauge = Arc::new(Gauge::default());
    let app = Router::new()
        .fallback(measure)
        .with_state(Arc::clone(&gauge));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind gauge server");
    let addr = listener.local_addr().expect("Gauge server has no address");
    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .expect("Gauge server failed");
    });
    (addr, gauge)
}
