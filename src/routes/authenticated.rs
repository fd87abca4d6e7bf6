use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// Authenticated Router Module
///
/// Every route here sits behind the auth middleware installed in `create_router`, so a
/// request only reaches a handler with a verified token whose user still exists.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // GET /api/v1/users/me
        .route("/api/v1/users/me", get(handlers::read_me))
        // GET/POST /api/v1/tables
        // Listing is scoped to the caller and paginated with ?skip=&limit=.
        .route(
            "/api/v1/tables",
            get(handlers::list_tables).post(handlers::create_table),
        )
        // GET/PUT/DELETE /api/v1/tables/{id}
        // Another user's table answers 404, same as a missing one.
        .route(
            "/api/v1/tables/{id}",
            get(handlers::get_table)
                .put(handlers::update_table)
                .delete(handlers::delete_table),
        )
}
