//! HTTP handler: `POST /api` for the unified command contract,
//! `GET /metrics` for Prometheus exposition, and the embedded web UI at
//! `GET /` and `GET /app.js` — a single `Router` over one `Arc<AppState>`.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;

use crate::{api, webui, AppState};

async fn handle_index() -> Html<&'static str> {
    Html(webui::INDEX_HTML)
}

async fn handle_app_js() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "application/javascript")], webui::APP_JS)
}

async fn handle_api(State(state): State<Arc<AppState>>, Json(req): Json<api::Request>) -> Json<api::Response> {
    let response = api::dispatch(&state.coordinator, &req);
    if response.is_error() {
        state.metrics.record_command_error(&req.cmd);
    }
    Json(response)
}

async fn handle_metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (StatusCode::OK, [(header::CONTENT_TYPE, "text/plain; version=0.0.4")], state.metrics.render(&state.coordinator))
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(handle_index))
        .route("/app.js", get(handle_app_js))
        .route("/api", post(handle_api))
        .route("/ws", get(crate::ws::handle_ws))
        .route("/metrics", get(handle_metrics))
        .with_state(state)
}

pub async fn serve(bind: String, state: Arc<AppState>) -> std::io::Result<()> {
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    log::info!("http listening on {bind}");
    axum::serve(listener, app).await
}
