use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderValue, StatusCode};
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};

use mealprep_core::runner::{ROOT_AGENT, RunRequest, Runner};
use mealprep_core::session::{SessionError, SessionState};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: msg.into(),
        }
    }
}

impl From<SessionError> for AppError {
    fn from(err: SessionError) -> Self {
        let status = match err {
            SessionError::NotFound(_) => StatusCode::NOT_FOUND,
            SessionError::AlreadyExists(_) => StatusCode::CONFLICT,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let body = serde_json::json!({ "error": self.message });
        (self.status, Json(body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// CORS for browser front ends: a fixed origin list with credentials, and
/// whatever methods and headers the preflight asks for.
fn cors_layer(allowed_origins: &[String]) -> Result<CorsLayer> {
    let origins = allowed_origins
        .iter()
        .map(|o| HeaderValue::from_str(o).with_context(|| format!("invalid CORS origin {o:?}")))
        .collect::<Result<Vec<_>>>()?;
    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request()))
}

pub fn build_router(runner: Arc<Runner>, allowed_origins: &[String]) -> Result<Router> {
    Ok(Router::new()
        .route("/", get(index))
        .route(
            "/apps/{app}/users/{user}/sessions",
            get(list_sessions).post(create_session),
        )
        .route(
            "/apps/{app}/users/{user}/sessions/{session}",
            get(get_session)
                .post(create_session_with_id)
                .delete(delete_session),
        )
        .route("/run", post(run))
        .route("/run_sse", post(run_sse))
        .layer(cors_layer(allowed_origins)?)
        .with_state(runner))
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub async fn run_serve(
    runner: Arc<Runner>,
    bind: &str,
    port: u16,
    allowed_origins: &[String],
) -> Result<()> {
    let app = build_router(runner, allowed_origins)?;
    let addr: SocketAddr = format!("{bind}:{port}")
        .parse()
        .with_context(|| format!("invalid listen address {bind}:{port}"))?;
    tracing::info!(origins = ?allowed_origins, "mealprep serve listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("mealprep serve shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn index() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok", "agent": ROOT_AGENT }))
}

/// Initial session state from an optional JSON body.
fn initial_state(body: &Bytes) -> Result<SessionState, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(SessionState::default());
    }
    serde_json::from_slice::<Option<SessionState>>(body)
        .map(Option::unwrap_or_default)
        .map_err(|e| AppError::bad_request(format!("invalid session state: {e}")))
}

async fn create_session_with_id(
    State(runner): State<Arc<Runner>>,
    Path((app, user, session)): Path<(String, String, String)>,
    body: Bytes,
) -> Result<axum::response::Response, AppError> {
    let state = initial_state(&body)?;
    let created = runner
        .sessions()
        .create(&app, &user, Some(session.as_str()), state)
        .await?;
    Ok(Json(created).into_response())
}

async fn create_session(
    State(runner): State<Arc<Runner>>,
    Path((app, user)): Path<(String, String)>,
    body: Bytes,
) -> Result<axum::response::Response, AppError> {
    let state = initial_state(&body)?;
    let created = runner.sessions().create(&app, &user, None, state).await?;
    Ok(Json(created).into_response())
}

async fn get_session(
    State(runner): State<Arc<Runner>>,
    Path((app, user, session)): Path<(String, String, String)>,
) -> Result<axum::response::Response, AppError> {
    let found = runner
        .sessions()
        .get(&app, &user, &session)
        .await
        .ok_or(SessionError::NotFound(session))?;
    Ok(Json(found).into_response())
}

async fn list_sessions(
    State(runner): State<Arc<Runner>>,
    Path((app, user)): Path<(String, String)>,
) -> Result<axum::response::Response, AppError> {
    let sessions = runner.sessions().list(&app, &user).await;
    Ok(Json(sessions).into_response())
}

async fn delete_session(
    State(runner): State<Arc<Runner>>,
    Path((app, user, session)): Path<(String, String, String)>,
) -> Result<axum::response::Response, AppError> {
    runner.sessions().delete(&app, &user, &session).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

async fn run(
    State(runner): State<Arc<Runner>>,
    Json(request): Json<RunRequest>,
) -> Result<axum::response::Response, AppError> {
    // A client that hangs up drops this future, which cancels the turn.
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();
    let events = runner.run(&request, &cancel).await?;
    Ok(Json(events).into_response())
}

async fn run_sse(
    State(runner): State<Arc<Runner>>,
    Json(request): Json<RunRequest>,
) -> Result<axum::response::Response, AppError> {
    if runner
        .sessions()
        .get(&request.app_name, &request.user_id, &request.session_id)
        .await
        .is_none()
    {
        return Err(SessionError::NotFound(request.session_id).into());
    }

    let stream = runner.run_stream(request).map(|item| match item {
        Ok(event) => SseEvent::default().json_data(&event),
        Err(e) => SseEvent::default()
            .event("error")
            .json_data(serde_json::json!({ "error": e.to_string() })),
    });
    Ok(Sse::new(stream)
        .keep_alive(KeepAlive::default())
        .into_response())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
