use std::sync::Arc;

use axum::extract::{Path, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::commands::{LifeCommand, LifeService};
use crate::generator::GENERATION_SESSION;
use crate::llm::Message;
use crate::session::SessionStore;
use crate::store::{DayKey, ScheduleRecord};

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<LifeService>,
    pub sessions: Arc<SessionStore>,
    pub api_key: Option<String>,
}

#[derive(Deserialize)]
pub struct CommandRequest {
    pub action: String,
    #[serde(default)]
    pub param: Option<String>,
}

#[derive(Serialize, Deserialize)]
pub struct CommandResponse {
    pub text: String,
}

#[derive(Deserialize)]
pub struct HookRequest {
    pub session_id: String,
    #[serde(default)]
    pub system_prompt: String,
}

#[derive(Serialize)]
pub struct HookResponse {
    pub system_prompt: String,
}

/// Conversation turns to record, oldest first. Roles are `user` or
/// `assistant`.
#[derive(Deserialize)]
pub struct TurnsRequest {
    pub messages: Vec<Message>,
}

#[derive(Serialize)]
pub struct TodayResponse {
    pub date: String,
    #[serde(flatten)]
    pub record: ScheduleRecord,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/life", post(handle_command))
        .route("/life/today", get(handle_today))
        .route("/hooks/llm-request", post(handle_llm_request))
        .route("/sessions/:key/turns", post(handle_record_turns))
        .layer(middleware::from_fn_with_state(state.clone(), auth_layer))
        .route("/health", get(handle_health))
        .with_state(state)
}

async fn auth_layer(State(state): State<AppState>, req: Request, next: Next) -> impl IntoResponse {
    if let Some(ref expected) = state.api_key {
        let auth_ok = req
            .headers()
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .is_some_and(|t| t == expected);
        if !auth_ok {
            return (
                StatusCode::UNAUTHORIZED,
                Json(CommandResponse {
                    text: "Unauthorized".into(),
                }),
            )
                .into_response();
        }
    }
    next.run(req).await.into_response()
}

async fn handle_command(
    State(state): State<AppState>,
    Json(req): Json<CommandRequest>,
) -> impl IntoResponse {
    let cmd = LifeCommand::parse(&req.action, req.param.as_deref());
    tracing::info!("Command: {cmd:?}");
    let text = state.service.execute(cmd).await;
    Json(CommandResponse { text })
}

async fn handle_today(State(state): State<AppState>) -> impl IntoResponse {
    match state.service.today().await {
        (day, Some(record)) => (
            StatusCode::OK,
            Json(TodayResponse {
                date: day.day_key(),
                record,
            }),
        )
            .into_response(),
        (day, None) => (
            StatusCode::NOT_FOUND,
            Json(CommandResponse {
                text: format!("No schedule for {} yet", day.day_key()),
            }),
        )
            .into_response(),
    }
}

async fn handle_llm_request(
    State(state): State<AppState>,
    Json(req): Json<HookRequest>,
) -> impl IntoResponse {
    let system_prompt = state
        .service
        .inject(&req.session_id, &req.system_prompt)
        .await;
    Json(HookResponse { system_prompt })
}

async fn handle_record_turns(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(req): Json<TurnsRequest>,
) -> impl IntoResponse {
    if key == GENERATION_SESSION {
        return error_response(StatusCode::BAD_REQUEST, format!("Session {key} is reserved"));
    }
    if let Some(m) = req
        .messages
        .iter()
        .find(|m| m.role != "user" && m.role != "assistant")
    {
        return error_response(
            StatusCode::BAD_REQUEST,
            format!("Unsupported role {:?}", m.role),
        );
    }

    let count = req.messages.len();
    match state.sessions.append(&key, req.messages) {
        Ok(()) => {
            tracing::debug!("Recorded {count} turns for {key}");
            Json(CommandResponse {
                text: format!("Recorded {count} turns"),
            })
            .into_response()
        }
        Err(e) => {
            tracing::error!("Failed to record turns for {key}: {e:#}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to record turns".into())
        }
    }
}

fn error_response(status: StatusCode, text: String) -> axum::response::Response {
    (status, Json(CommandResponse { text })).into_response()
}

async fn handle_health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
