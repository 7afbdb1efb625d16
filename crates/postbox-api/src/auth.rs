use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use axum_extra::extract::WithRejection;
use tracing::{info, warn};
use uuid::Uuid;

use postbox_types::api::{
    Claims, LoginRequest, LoginResponse, ProtectedResponse, RegisterRequest, RegisterResponse,
};

use crate::error::ApiError;
use crate::{AppState, password, required};

pub async fn register(
    State(state): State<AppState>,
    WithRejection(Json(req), _): WithRejection<Json<RegisterRequest>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    let (Some(username), Some(password)) = (required(req.username), required(req.password))
    else {
        return Err(ApiError::Validation("Username and password are required.".into()));
    };

    // Hashing and the insert both block; a duplicate name fails on the
    // UNIQUE index rather than on a separate lookup.
    let db = state.clone();
    let user = tokio::task::spawn_blocking(move || {
        let hash = password::hash_password(&password)?;
        Ok::<_, ApiError>(db.db.create_user(&username, &hash)?)
    })
    .await??;

    info!("Registered user {} ({})", user.username, user.id);

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            message: "User registered successfully".into(),
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    WithRejection(Json(req), _): WithRejection<Json<LoginRequest>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    let username = req.username.unwrap_or_default();
    let password = req.password.unwrap_or_default();

    let db = state.clone();
    let name = username.clone();
    let user = tokio::task::spawn_blocking(move || {
        let user = db.db.get_user_by_username(&name)?;
        Ok::<_, ApiError>(user.filter(|u| password::verify_password(u, &password)))
    })
    .await??;

    let Some(user) = user else {
        warn!("Failed login for '{}'", username);
        return Err(ApiError::Unauthorized("Invalid username or password".into()));
    };

    let user_id: Uuid = user
        .id
        .parse()
        .map_err(|e| anyhow::anyhow!("Corrupt user id '{}': {}", user.id, e))?;
    let token = state.tokens.issue(user_id, &user.username)?;

    Ok(Json(LoginResponse {
        message: "Login successful".into(),
        token,
    }))
}

pub async fn protected(Extension(claims): Extension<Claims>) -> Json<ProtectedResponse> {
    Json(ProtectedResponse {
        message: "You have access to this route".into(),
        user: claims,
    })
}
