//! Shared test utilities for mealprep integration tests.
//!
//! Provides a local HTTP server standing in for recipe sites and for the
//! Gemini API. Each server binds an ephemeral port on 127.0.0.1 and is shut
//! down when dropped.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Redirect;
use axum::routing::get;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// How long `/slow` waits before answering.
pub const SLOW_DELAY: Duration = Duration::from_secs(3);

/// A running server. Aborted on drop.
#[derive(Debug)]
pub struct TestServer {
    addr: SocketAddr,
    hits: Arc<AtomicUsize>,
    task: JoinHandle<()>,
}

impl TestServer {
    /// Serve `router` on an ephemeral port.
    pub async fn serve(router: Router) -> Self {
        Self::serve_counted(router, Arc::new(AtomicUsize::new(0))).await
    }

    async fn serve_counted(router: Router, hits: Arc<AtomicUsize>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind test listener");
        let addr = listener.local_addr().expect("listener has no address");
        let task = tokio::spawn(async move {
            axum::serve(listener, router)
                .await
                .expect("test server failed");
        });
        Self { addr, hits, task }
    }

    /// A server with fixed routes mimicking recipe sites:
    ///
    /// | path               | answer                      |
    /// |--------------------|-----------------------------|
    /// | `/ok`              | 200                         |
    /// | `/missing`         | 404                         |
    /// | `/error`           | 500                         |
    /// | `/slow`            | 200 after [`SLOW_DELAY`]    |
    /// | `/redirect`        | 307 to `/ok`                |
    /// | `/redirect-broken` | 307 to `/missing`           |
    /// | `/redirect-search` | 307 to `/vertexaisearch/landing`, which is 200 |
    ///
    /// Every request to a known route is counted in [`TestServer::hits`].
    pub async fn recipe_sites() -> Self {
        let hits = Arc::new(AtomicUsize::new(0));
        let router = Router::new()
            .route("/ok", get(ok))
            .route("/missing", get(missing))
            .route("/error", get(error))
            .route("/slow", get(slow))
            .route("/redirect", get(redirect_ok))
            .route("/redirect-broken", get(redirect_missing))
            .route("/redirect-search", get(redirect_search))
            .route("/vertexaisearch/landing", get(ok))
            .with_state(Arc::clone(&hits));
        Self::serve_counted(router, hits).await
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Absolute URL for `path` on this server.
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Requests served by [`TestServer::recipe_sites`] routes so far.
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

type Hits = State<Arc<AtomicUsize>>;

async fn ok(State(hits): Hits) -> (StatusCode, &'static str) {
    hits.fetch_add(1, Ordering::SeqCst);
    (StatusCode::OK, "<html><body>recipe</body></html>")
}

async fn missing(State(hits): Hits) -> StatusCode {
    hits.fetch_add(1, Ordering::SeqCst);
    StatusCode::NOT_FOUND
}

async fn error(State(hits): Hits) -> StatusCode {
    hits.fetch_add(1, Ordering::SeqCst);
    StatusCode::INTERNAL_SERVER_ERROR
}

async fn slow(State(hits): Hits) -> StatusCode {
    hits.fetch_add(1, Ordering::SeqCst);
    tokio::time::sleep(SLOW_DELAY).await;
    StatusCode::OK
}

async fn redirect_ok(State(hits): Hits) -> Redirect {
    hits.fetch_add(1, Ordering::SeqCst);
    Redirect::temporary("/ok")
}

async fn redirect_missing(State(hits): Hits) -> Redirect {
    hits.fetch_add(1, Ordering::SeqCst);
    Redirect::temporary("/missing")
}

async fn redirect_search(State(hits): Hits) -> Redirect {
    hits.fetch_add(1, Ordering::SeqCst);
    Redirect::temporary("/vertexaisearch/landing")
}
