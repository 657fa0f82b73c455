use crate::db::Message;
use crate::error::AppError;
use crate::server::router::AppState;

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/add", post(add_handler))
        .route("/delete", post(delete_handler))
        .route("/list", get(list_handler))
}

#[derive(Debug, Default, Deserialize)]
pub struct ContentPayload {
    #[serde(default)]
    pub content: Option<String>,
}

/// A body that fails to parse is treated as one without `content`.
fn content_of(payload: Result<Json<ContentPayload>, JsonRejection>) -> Option<String> {
    match payload {
        Ok(Json(p)) => p.content,
        Err(rejection) => {
            debug!(%rejection, "unreadable request body");
            None
        }
    }
}

async fn add_handler(
    State(state): State<AppState>,
    payload: Result<Json<ContentPayload>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let content = content_of(payload);
    state.messages.add(content.as_deref()).await?;
    Ok(Json(json!({ "status": "message saved successfully" })))
}

async fn delete_handler(
    State(state): State<AppState>,
    payload: Result<Json<ContentPayload>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let content = content_of(payload);
    state.messages.delete(content.as_deref()).await?;
    Ok(Json(json!({
        "status": "ok",
        "detail": "message deleted successfully",
    })))
}

async fn list_handler(State(state): State<AppState>) -> Result<Json<Vec<Message>>, AppError> {
    Ok(Json(state.messages.list().await?))
}
