use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use axum_extra::extract::WithRejection;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use postbox_db::models::MessageRow;
use postbox_types::api::{SendMessageRequest, SendMessageResponse};
use postbox_types::models::Message;

use crate::error::ApiError;
use crate::{AppState, required};

pub async fn send_message(
    State(state): State<AppState>,
    WithRejection(Json(req), _): WithRejection<Json<SendMessageRequest>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    let (Some(name), Some(email), Some(message)) =
        (required(req.name), required(req.email), required(req.message))
    else {
        return Err(ApiError::Validation("All fields are required.".into()));
    };

    // Run blocking DB insert off the async runtime
    let db = state.clone();
    let row = tokio::task::spawn_blocking(move || db.db.create_message(&name, &email, &message))
        .await??;

    Ok((
        StatusCode::CREATED,
        Json(SendMessageResponse {
            message: "Message sent successfully.".into(),
            data: to_message(row)?,
        }),
    ))
}

pub async fn list_messages(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let db = state.clone();
    let rows = tokio::task::spawn_blocking(move || db.db.list_messages()).await??;

    let messages = rows
        .into_iter()
        .map(to_message)
        .collect::<Result<Vec<Message>, _>>()?;
    Ok(Json(messages))
}

pub async fn get_message(
    State(state): State<AppState>,
    WithRejection(Path(id), _): WithRejection<Path<String>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.clone();
    let row = tokio::task::spawn_blocking(move || db.db.get_message(&id))
        .await??
        .ok_or_else(|| ApiError::NotFound("Message not found.".into()))?;

    Ok(Json(to_message(row)?))
}

/// A stored row that no longer parses is a server fault, never served as-is.
fn to_message(row: MessageRow) -> Result<Message, ApiError> {
    let id: Uuid = row
        .id
        .parse()
        .map_err(|e| anyhow::anyhow!("Corrupt message id '{}': {}", row.id, e))?;
    let created_at = DateTime::parse_from_rfc3339(&row.created_at)
        .map_err(|e| {
            anyhow::anyhow!(
                "Corrupt created_at '{}' on message '{}': {}",
                row.created_at,
                row.id,
                e
            )
        })?
        .with_timezone(&Utc);

    Ok(Message {
        id,
        name: row.name,
        email: row.email,
        message: row.message,
        created_at,
    })
}
