use axum::{
    Router,
    extract::{FromRef, Request},
    http::HeaderName,
    middleware::{self, Next},
    response::Response,
};
use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

pub mod auth;
pub mod config;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod models;
pub mod repository;
pub mod services;
pub mod store;

// Public and authenticated routers, kept apart so the auth layer covers exactly one of them.
pub mod routes;
use auth::CurrentUser;
use routes::{authenticated, public};

// --- Public Re-exports ---

pub use config::AppConfig;
pub use error::{AppError, StoreError};
pub use repository::{Crud, TableRepository, UserRepository};
pub use store::{DocumentStore, InMemoryStore, PostgresStore, StoreState};

/// ApiDoc
///
/// OpenAPI document for every route, served at `/api-docs/openapi.json` and browsable
/// under `/swagger-ui`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::register, handlers::login, handlers::read_me,
        handlers::create_table, handlers::list_tables, handlers::get_table,
        handlers::update_table, handlers::delete_table
    ),
    components(
        schemas(
            models::UserIn, models::UserOut, models::LoginForm, models::Token,
            models::TableIn, models::TableUpdate, models::TableDb,
        )
    ),
    modifiers(&BearerSecurity),
    tags(
        (name = "auth", description = "Registration and login"),
        (name = "users", description = "The authenticated user"),
        (name = "tables", description = "Per-user table documents")
    )
)]
pub struct ApiDoc;

/// Registers the `bearer` security scheme the authenticated paths refer to.
struct BearerSecurity;

impl Modify for BearerSecurity {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// AppState
///
/// The single container of shared services and configuration, cloned into every request.
#[derive(Clone)]
pub struct AppState {
    /// The database handle every repository is built on.
    pub store: StoreState,
    pub config: AppConfig,
}

// --- Axum FromRef Extractor Implementations ---

// Handlers and extractors name only the dependency they need; these build it from AppState.

impl FromRef<AppState> for StoreState {
    fn from_ref(app_state: &AppState) -> StoreState {
        app_state.store.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

impl FromRef<AppState> for UserRepository {
    fn from_ref(app_state: &AppState) -> UserRepository {
        UserRepository::new(
            StoreState::from_ref(app_state),
            app_state.config.user_collection_name.clone(),
        )
    }
}

impl FromRef<AppState> for TableRepository {
    fn from_ref(app_state: &AppState) -> TableRepository {
        TableRepository::new(
            StoreState::from_ref(app_state),
            app_state.config.table_collection_name.clone(),
        )
    }
}

/// auth_middleware
///
/// Guards the authenticated router. Resolving `CurrentUser` rejects the request (401/404)
/// before any handler runs; on success the user is stashed in the request extensions,
/// where the handlers' own `CurrentUser` extraction picks it up.
async fn auth_middleware(current_user: CurrentUser, mut request: Request, next: Next) -> Response {
    request.extensions_mut().insert(current_user);
    next.run(request).await
}

/// create_router
///
/// Assembles the routes, the auth layer, the documentation and the observability layers.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public::public_routes())
        .merge(
            authenticated::authenticated_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                auth_middleware,
            )),
        )
        .with_state(state);

    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Request span carrying method, uri and the `x-request-id` set by the layer above, so
/// every log line of one request can be correlated.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
