use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Extension, Path};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::Value;
use tower_http::cors::CorsLayer;

use crate::error::AppError;
use crate::registry::execute::execute_tool_call;
use crate::registry::{catalog, CommandOutput, CommandResult};
use crate::state::AppState;

// ── Response types ───────────────────────────────────────────────

#[derive(Serialize)]
struct ApiOk<T: Serialize> {
    ok: bool,
    data: T,
}

#[derive(Serialize)]
struct ApiErr {
    ok: bool,
    error: AppError,
    message: String,
}

fn ok_json<T: Serialize>(data: T) -> impl IntoResponse {
    Json(ApiOk { ok: true, data })
}

fn err_json(status: StatusCode, error: AppError) -> impl IntoResponse {
    let message = error.to_string();
    (
        status,
        Json(ApiErr {
            ok: false,
            error,
            message,
        }),
    )
}

/// Response body for a tool call: the human-readable `message` plus the typed
/// `result` (tagged by command name).
#[derive(Serialize)]
pub struct CommandResponse {
    pub message: String,
    pub result: CommandResult,
}

impl From<CommandOutput> for CommandResponse {
    fn from(output: CommandOutput) -> Self {
        Self {
            message: output.message,
            result: output.result,
        }
    }
}

fn status_for(error: &AppError) -> StatusCode {
    match error {
        AppError::NotFound { .. } | AppError::UnknownCommand { .. } => StatusCode::NOT_FOUND,
        AppError::ValidationError { .. } | AppError::InvalidCutList { .. } => {
            StatusCode::BAD_REQUEST
        }
        AppError::TimelineExists { .. } | AppError::RippleSafetyViolation { .. } => {
            StatusCode::CONFLICT
        }
        AppError::Disconnected { .. } | AppError::RemoteError { .. } => StatusCode::BAD_GATEWAY,
        AppError::LogicError { .. } | AppError::IoError { .. } | AppError::SettingsSaveError { .. } => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Tool calls block on the editor, so they run off the async workers.
async fn run_tool(state: Arc<AppState>, name: String, input: Value) -> axum::response::Response {
    let joined = tokio::task::spawn_blocking(move || {
        execute_tool_call(&state, "http", &name, &input)
    })
    .await;
    match joined {
        Ok(Ok(output)) => ok_json(CommandResponse::from(output)).into_response(),
        Ok(Err(e)) => err_json(status_for(&e), e).into_response(),
        Err(e) => err_json(
            StatusCode::INTERNAL_SERVER_ERROR,
            AppError::IoError {
                message: format!("tool task failed: {e}"),
            },
        )
        .into_response(),
    }
}

// ── Handlers ─────────────────────────────────────────────────────

async fn post_tool(
    Extension(state): Extension<Arc<AppState>>,
    Path(name): Path<String>,
    body: Bytes,
) -> axum::response::Response {
    // An empty body means "no params".
    let input = if body.iter().all(u8::is_ascii_whitespace) {
        Value::Null
    } else {
        match serde_json::from_slice(&body) {
            Ok(v) => v,
            Err(e) => {
                return err_json(
                    StatusCode::BAD_REQUEST,
                    AppError::ValidationError {
                        message: format!("Request body is not JSON: {e}"),
                    },
                )
                .into_response()
            }
        }
    };
    run_tool(state, name, input).await
}

async fn get_tools() -> impl IntoResponse {
    ok_json(catalog::to_json_schema())
}

async fn get_status(Extension(state): Extension<Arc<AppState>>) -> impl IntoResponse {
    run_tool(state, "get_status".to_string(), Value::Null).await
}

async fn post_reload(Extension(state): Extension<Arc<AppState>>) -> impl IntoResponse {
    run_tool(state, "reload_logic".to_string(), Value::Null).await
}

fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/tools/{name}", post(post_tool))
        .route("/api/tools", get(get_tools))
        .route("/api/status", get(get_status))
        .route("/api/reload", post(post_reload))
        .layer(CorsLayer::permissive())
        .layer(Extension(state))
}

// ── Server startup ───────────────────────────────────────────────

/// Start the HTTP API on `port` (0 picks a free one). Returns the bound port.
pub async fn start_api_server(state: Arc<AppState>, port: u16) -> Result<u16, AppError> {
    let app = router(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| AppError::IoError {
            message: format!("Failed to bind API server: {e}"),
        })?;
    let port = listener
        .local_addr()
        .map_err(|e| AppError::IoError {
            message: format!("Failed to get API server port: {e}"),
        })?
        .port();

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "API server stopped");
        }
    });

    Ok(port)
}
