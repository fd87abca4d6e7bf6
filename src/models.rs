use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use ts_rs::TS;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::repository::Document;

// --- Stored Documents ---

/// UserDb
///
/// The user document as persisted in the user collection. Carries the password hash, so it
/// is never serialized into a response; handlers convert it to `UserOut` first.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserDb {
    pub id: Uuid,
    // Stored lower-cased; the uniqueness key of the collection.
    pub email: String,
    pub hashed_password: String,
    pub full_name: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Document for UserDb {
    fn id(&self) -> Uuid {
        self.id
    }
}

/// TableDb
///
/// A named, free-form document in the table collection. `owner_id` scopes every read
/// and write to the user who created it.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, PartialEq, Default)]
#[ts(export)]
pub struct TableDb {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    #[schema(value_type = Object)]
    pub data: Value,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

impl Document for TableDb {
    fn id(&self) -> Uuid {
        self.id
    }
}

// --- Request Payloads (Input Schemas) ---

/// UserIn
///
/// Input payload for the registration endpoint (POST /api/v1/auth/register).
/// The password is hashed before storage and never echoed back.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UserIn {
    #[schema(example = "ada@example.com")]
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub full_name: Option<String>,
}

/// LoginForm
///
/// OAuth2 password-grant form (POST /api/v1/auth/login), sent as
/// `application/x-www-form-urlencoded`. `username` carries the email.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Default)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub grant_type: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct TableIn {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub data: Value,
}

/// TableUpdate
///
/// Partial update payload (PUT /api/v1/tables/{id}). Only the provided fields are written.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct TableUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub data: Option<Value>,
}

/// ListParams
///
/// Pagination query for collection listings (`?skip=0&limit=100`).
#[derive(Debug, Clone, Copy, Deserialize, IntoParams, Default)]
#[into_params(parameter_in = Query)]
pub struct ListParams {
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

impl ListParams {
    pub const DEFAULT_LIMIT: i64 = 100;
    pub const MAX_LIMIT: i64 = 100;

    /// Resolved `(skip, limit)`: skip is never negative, limit stays within `1..=MAX_LIMIT`.
    pub fn bounds(&self) -> (i64, i64) {
        let skip = self.skip.unwrap_or(0).max(0);
        let limit = self
            .limit
            .unwrap_or(Self::DEFAULT_LIMIT)
            .clamp(1, Self::MAX_LIMIT);
        (skip, limit)
    }
}

// --- Response Schemas (Output) ---

/// UserOut
///
/// Public view of a user; what registration and `/users/me` return.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default, PartialEq)]
#[ts(export)]
pub struct UserOut {
    pub id: Uuid,
    pub email: String,
    pub full_name: Option<String>,
    pub is_active: bool,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

impl From<UserDb> for UserOut {
    fn from(user: UserDb) -> Self {
        Self {
            id: user.id,
            email: user.email,
            full_name: user.full_name,
            is_active: user.is_active,
            created_at: user.created_at,
        }
    }
}

/// Token
///
/// Bearer credential returned by a successful login.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct Token {
    pub access_token: String,
    #[schema(example = "bearer")]
    pub token_type: String,
}
