use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints reachable without a token.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness probe for load balancers.
        .route("/health", get(|| async { "ok" }))
        // POST /api/v1/auth/register
        // JSON body; 201 with the new user, 409 if the email is taken.
        .route("/api/v1/auth/register", post(handlers::register))
        // POST /api/v1/auth/login
        // OAuth2 password form; 200 with a bearer token, 400 on bad credentials.
        .route("/api/v1/auth/login", post(handlers::login))
}
