pub mod auth;
pub mod error;
pub mod messages;
pub mod middleware;
pub mod password;
pub mod token;

use std::sync::Arc;

use axum::{
    Router,
    handler::Handler,
    routing::{get, post},
};

use postbox_db::Database;

use crate::middleware::require_auth;
use crate::token::TokenService;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub tokens: TokenService,
}

/// All routes. Listing messages and `/protected` sit behind the auth gate.
pub fn router(state: AppState) -> Router {
    let gate = axum::middleware::from_fn_with_state(state.clone(), require_auth);

    Router::new()
        .route(
            "/api/messages",
            post(messages::send_message).get(messages::list_messages.layer(gate.clone())),
        )
        .route("/api/messages/{id}", get(messages::get_message))
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/protected", get(auth::protected).route_layer(gate))
        .with_state(state)
}

/// Treat absent and empty fields alike.
pub(crate) fn required(field: Option<String>) -> Option<String> {
    field.filter(|v| !v.is_empty())
}
