pub mod types;
pub mod config;
pub mod allocation;
pub mod categories;
pub mod ingest;
pub mod export;
pub mod category_commands;

use types::*;
use config::*;
use categories::CategoryStore;

use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, DefaultBodyLimit, Path, Query, State as AxumState},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde_json::json;
use std::{
    fs,
    path::PathBuf,
    sync::{Arc, Mutex},
};
use tokio::net::TcpListener;
use tower_http::services::ServeDir;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

// ── API error ──────────────────────────────────────────────────────────

struct ApiError(String);

impl From<String> for ApiError {
    fn from(message: String) -> Self {
        ApiError(message)
    }
}

impl From<BytesRejection> for ApiError {
    fn from(rejection: BytesRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError(format!(
                "Upload is larger than the {} MB limit.",
                MAX_UPLOAD_BYTES / (1024 * 1024)
            ))
        } else {
            ApiError(format!("Upload body could not be read: {}", rejection.body_text()))
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (StatusCode::BAD_REQUEST, Json(json!({ "error": self.0 }))).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

// ── State + upload handlers ────────────────────────────────────────────

async fn get_state(AxumState(state): AxumState<ServerState>) -> ApiResult<CategoriesSnapshot> {
    Ok(Json(category_commands::get_categories_state(&state.store)?))
}

async fn post_upload(
    AxumState(state): AxumState<ServerState>,
    Query(query): Query<UploadQuery>,
    body: Result<Bytes, BytesRejection>,
) -> ApiResult<UploadSummary> {
    let body = body?;
    Ok(Json(category_commands::upload_spreadsheet(&query.file_name, &body, &state.store)?))
}

async fn post_reset(AxumState(state): AxumState<ServerState>) -> ApiResult<CategoriesSnapshot> {
    Ok(Json(category_commands::reset_session(&state.store)?))
}

// ── Category CRUD handlers ─────────────────────────────────────────────

async fn post_category(
    AxumState(state): AxumState<ServerState>,
    Json(new): Json<NewCategory>,
) -> ApiResult<Vec<AllocatedCategory>> {
    Ok(Json(category_commands::add_category(new, &state.store)?))
}

async fn patch_category(
    AxumState(state): AxumState<ServerState>,
    Path(id): Path<String>,
    Json(patch): Json<CategoryPatch>,
) -> ApiResult<Vec<AllocatedCategory>> {
    Ok(Json(category_commands::update_category(&id, patch, &state.store)?))
}

async fn delete_category(
    AxumState(state): AxumState<ServerState>,
    Path(id): Path<String>,
) -> ApiResult<Vec<AllocatedCategory>> {
    Ok(Json(category_commands::delete_category(&id, &state.store)?))
}

async fn put_category_order(
    AxumState(state): AxumState<ServerState>,
    Json(request): Json<ReorderRequest>,
) -> ApiResult<Vec<AllocatedCategory>> {
    Ok(Json(category_commands::reorder_categories(&request.order, &state.store)?))
}

async fn post_category_move(
    AxumState(state): AxumState<ServerState>,
    Json(request): Json<MoveRequest>,
) -> ApiResult<Vec<AllocatedCategory>> {
    Ok(Json(category_commands::move_category(request.from, request.to, &state.store)?))
}

// ── Config + export handlers ───────────────────────────────────────────

async fn get_config() -> ApiResult<AppConfig> {
    Ok(Json(category_commands::load_config()?))
}

async fn put_config(
    AxumState(state): AxumState<ServerState>,
    Json(config): Json<AppConfig>,
) -> ApiResult<AppConfig> {
    Ok(Json(category_commands::save_config(config, &state.store)?))
}

async fn get_export(AxumState(state): AxumState<ServerState>) -> Result<impl IntoResponse, ApiError> {
    let bytes = category_commands::export_categories(&state.store)?;
    let disposition = format!("attachment; filename=\"{}\"", export::export_file_name());
    Ok((
        [
            (
                "Content-Type",
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet".to_string(),
            ),
            ("Content-Disposition", disposition),
            ("Cache-Control", "no-store".to_string()),
        ],
        bytes,
    ))
}

// ── HTTP server ────────────────────────────────────────────────────────

pub fn app_router(state: ServerState, static_dir: PathBuf) -> Router {
    let static_files = ServeDir::new(static_dir);

    Router::new()
        .route("/api/state", get(get_state))
        .route("/api/upload", post(post_upload))
        .route("/api/reset", post(post_reset))
        .route("/api/categories", post(post_category))
        .route("/api/categories/order", put(put_category_order))
        .route("/api/categories/move", post(post_category_move))
        .route("/api/categories/:id", axum::routing::patch(patch_category).delete(delete_category))
        .route("/api/config", get(get_config).put(put_config))
        .route("/api/export", get(get_export))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES + UPLOAD_BODY_SLACK))
        .fallback_service(static_files)
        .with_state(state)
}

async fn start_server(state: ServerState, static_dir: PathBuf, addr: &str) {
    let app = app_router(state, static_dir);
    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("server failed to bind {addr}: {e}");
            return;
        }
    };
    info!("tournament categories listening at http://{addr}/");
    if let Err(e) = axum::serve(listener, app).await {
        error!("server error: {e}");
    }
}

// ── Entry point ────────────────────────────────────────────────────────

pub fn run() {
    load_env_file();

    // Initialize tracing with a daily rolling file
    let logs_dir = logs_dir();
    fs::create_dir_all(&logs_dir).ok();
    let file_appender = tracing_appender::rolling::daily(&logs_dir, "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(non_blocking)
        .with_ansi(false)
        .init();
    info!("Tournament categories starting");

    let config = load_config_inner().unwrap_or_else(|e| {
        error!("{e}; falling back to default config");
        AppConfig::default()
    });
    log_config_warnings(&config);

    let store: SharedCategoryStore = Arc::new(Mutex::new(CategoryStore::with_identity_column(
        config.identity_column(),
    )));
    let state = ServerState { store };
    let static_dir = resolve_repo_path(&config.static_dir);

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("failed to start async runtime: {e}");
            return;
        }
    };
    runtime.block_on(start_server(state, static_dir, &config.bind_addr));
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, extract::FromRequest, http::Request};

    fn state() -> ServerState {
        ServerState {
            store: Arc::new(Mutex::new(CategoryStore::new())),
        }
    }

    async fn error_body(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn oversized_upload_body_is_a_json_error() {
        let request = Request::builder()
            .method("POST")
            .uri("/api/upload?fileName=big.xlsx")
            .body(Body::from(vec![0u8; 3 * 1024 * 1024]))
            .unwrap();
        // No DefaultBodyLimit layer here, so axum's 2 MB default applies.
        let rejection = Bytes::from_request(request, &()).await.unwrap_err();
        assert_eq!(rejection.status(), StatusCode::PAYLOAD_TOO_LARGE);

        let response = post_upload(
            AxumState(state()),
            Query(UploadQuery {
                file_name: "big.xlsx".into(),
            }),
            Err(rejection),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = error_body(response).await;
        assert_eq!(body["error"], "Upload is larger than the 10 MB limit.");
    }

    #[tokio::test]
    async fn rejected_upload_reports_error_json() {
        let response = post_upload(
            AxumState(state()),
            Query(UploadQuery {
                file_name: "notes.txt".into(),
            }),
            Ok(Bytes::from_static(b"hello")),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = error_body(response).await;
        assert!(body["error"].as_str().unwrap().contains("notes.txt"));
    }
}
