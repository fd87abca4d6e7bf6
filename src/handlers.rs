use crate::{
    auth::CurrentUser,
    config::AppConfig,
    error::AppError,
    extract::{AppForm, AppJson, AppPath, AppQuery},
    models::{ListParams, LoginForm, TableDb, TableIn, TableUpdate, Token, UserIn, UserOut},
    repository::{TableRepository, UserRepository, id_filter},
    services,
    store::Filter,
};
use axum::{Json, extract::State, http::StatusCode};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

/// TablePatch
///
/// What actually gets merged into a stored table on update: the caller's fields plus a
/// fresh `updated_at`.
#[derive(Serialize)]
struct TablePatch {
    #[serde(flatten)]
    fields: TableUpdate,
    updated_at: DateTime<Utc>,
}

/// Filter matching table `id` only if it belongs to `owner_id`. Tables of other users are
/// treated exactly like missing ones.
fn owned_table(id: Uuid, owner_id: Uuid) -> Filter {
    let mut filter = id_filter(id);
    filter.insert("owner_id".to_string(), Value::String(owner_id.to_string()));
    filter
}

fn require_name(name: &str) -> Result<String, AppError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::Validation("Table name must not be empty.".to_string()));
    }
    Ok(name.to_string())
}

// --- Auth ---

/// register
///
/// [Public Route] Creates a user account. The email must not be registered yet.
#[utoipa::path(
    post,
    path = "/api/v1/auth/register",
    tag = "auth",
    request_body = UserIn,
    responses(
        (status = 201, description = "Registered", body = UserOut),
        (status = 409, description = "Email already registered"),
        (status = 422, description = "Invalid payload")
    )
)]
#[tracing::instrument(skip_all)]
pub async fn register(
    State(users): State<UserRepository>,
    AppJson(user): AppJson<UserIn>,
) -> Result<(StatusCode, Json<UserOut>), AppError> {
    let created = services::create_user(&users, user).await?;
    tracing::info!(user_id = %created.id, "user registered");
    Ok((StatusCode::CREATED, Json(created.into())))
}

/// login
///
/// [Public Route] OAuth2 password grant. `username` is the account email.
#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    tag = "auth",
    request_body(content = LoginForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Access token", body = Token),
        (status = 400, description = "Incorrect email or password")
    )
)]
#[tracing::instrument(skip_all)]
pub async fn login(
    State(users): State<UserRepository>,
    State(config): State<AppConfig>,
    AppForm(credentials): AppForm<LoginForm>,
) -> Result<Json<Token>, AppError> {
    let user = services::authenticate_user(&users, &credentials)
        .await?
        .ok_or(AppError::IncorrectLogin)?;
    tracing::info!(user_id = %user.id, "user logged in");
    Ok(Json(services::generate_access_token(&user, &config)?))
}

// --- Users ---

/// read_me
///
/// [Authenticated Route] The profile of the token's owner.
#[utoipa::path(
    get,
    path = "/api/v1/users/me",
    tag = "users",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Current user", body = UserOut),
        (status = 401, description = "Invalid token"),
        (status = 404, description = "User no longer exists")
    )
)]
#[tracing::instrument(skip_all, fields(user_id = %user.id))]
pub async fn read_me(CurrentUser(user): CurrentUser) -> Json<UserOut> {
    Json(user.into())
}

// --- Tables ---

/// create_table
///
/// [Authenticated Route] Stores a new table owned by the caller.
#[utoipa::path(
    post,
    path = "/api/v1/tables",
    tag = "tables",
    security(("bearer" = [])),
    request_body = TableIn,
    responses((status = 201, description = "Created", body = TableDb))
)]
#[tracing::instrument(skip_all, fields(user_id = %user.id))]
pub async fn create_table(
    CurrentUser(user): CurrentUser,
    State(tables): State<TableRepository>,
    AppJson(payload): AppJson<TableIn>,
) -> Result<(StatusCode, Json<TableDb>), AppError> {
    let now = Utc::now();
    let table = TableDb {
        id: Uuid::new_v4(),
        owner_id: user.id,
        name: require_name(&payload.name)?,
        description: payload.description,
        data: payload.data,
        created_at: now,
        updated_at: now,
    };
    let created = tables.create(table).await?;
    tracing::debug!(table_id = %created.id, "table created");
    Ok((StatusCode::CREATED, Json(created)))
}

/// list_tables
///
/// [Authenticated Route] The caller's tables in creation order, paginated.
#[utoipa::path(
    get,
    path = "/api/v1/tables",
    tag = "tables",
    security(("bearer" = [])),
    params(ListParams),
    responses((status = 200, description = "Tables", body = [TableDb]))
)]
#[tracing::instrument(skip_all, fields(user_id = %user.id))]
pub async fn list_tables(
    CurrentUser(user): CurrentUser,
    State(tables): State<TableRepository>,
    AppQuery(params): AppQuery<ListParams>,
) -> Result<Json<Vec<TableDb>>, AppError> {
    let (skip, limit) = params.bounds();
    let mut filter = Filter::new();
    filter.insert("owner_id".to_string(), Value::String(user.id.to_string()));
    Ok(Json(tables.list(&filter, skip, limit).await?))
}

/// get_table
///
/// [Authenticated Route] A single table of the caller.
#[utoipa::path(
    get,
    path = "/api/v1/tables/{id}",
    tag = "tables",
    security(("bearer" = [])),
    params(("id" = Uuid, Path, description = "Table ID")),
    responses(
        (status = 200, description = "Found", body = TableDb),
        (status = 404, description = "Not found")
    )
)]
#[tracing::instrument(skip_all, fields(user_id = %user.id, table_id = %id))]
pub async fn get_table(
    CurrentUser(user): CurrentUser,
    State(tables): State<TableRepository>,
    AppPath(id): AppPath<Uuid>,
) -> Result<Json<TableDb>, AppError> {
    tables
        .get_by(&owned_table(id, user.id))
        .await?
        .map(Json)
        .ok_or(AppError::TableNotFound)
}

/// update_table
///
/// [Authenticated Route] Partial update; omitted fields keep their stored value.
#[utoipa::path(
    put,
    path = "/api/v1/tables/{id}",
    tag = "tables",
    security(("bearer" = [])),
    params(("id" = Uuid, Path, description = "Table ID")),
    request_body = TableUpdate,
    responses(
        (status = 200, description = "Updated", body = TableDb),
        (status = 404, description = "Not found")
    )
)]
#[tracing::instrument(skip_all, fields(user_id = %user.id, table_id = %id))]
pub async fn update_table(
    CurrentUser(user): CurrentUser,
    State(tables): State<TableRepository>,
    AppPath(id): AppPath<Uuid>,
    AppJson(mut payload): AppJson<TableUpdate>,
) -> Result<Json<TableDb>, AppError> {
    if let Some(name) = payload.name.take() {
        payload.name = Some(require_name(&name)?);
    }
    let patch = TablePatch {
        fields: payload,
        updated_at: Utc::now(),
    };
    tables
        .update(&owned_table(id, user.id), &patch)
        .await?
        .map(Json)
        .ok_or(AppError::TableNotFound)
}

/// delete_table
///
/// [Authenticated Route] Removes one of the caller's tables.
#[utoipa::path(
    delete,
    path = "/api/v1/tables/{id}",
    tag = "tables",
    security(("bearer" = [])),
    params(("id" = Uuid, Path, description = "Table ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Not found")
    )
)]
#[tracing::instrument(skip_all, fields(user_id = %user.id, table_id = %id))]
pub async fn delete_table(
    CurrentUser(user): CurrentUser,
    State(tables): State<TableRepository>,
    AppPath(id): AppPath<Uuid>,
) -> Result<StatusCode, AppError> {
    if tables.delete(&owned_table(id, user.id)).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::TableNotFound)
    }
}
