use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{config::AppConfig, error::AppError, models::UserDb, repository::UserRepository};

/// Claims
///
/// Payload of the access tokens issued at login and checked on every authenticated request.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (sub): the id of the user document.
    pub sub: Uuid,
    /// Expiration Time (exp): seconds since the epoch after which the token is rejected.
    pub exp: usize,
    /// Issued At (iat)
    pub iat: usize,
}

/// Hash a password with argon2id and a fresh random salt (PHC string format).
pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(format!("failed to hash password: {e}")))
}

/// Verify a password against a stored PHC hash. A malformed hash is an error, a mismatch is `Ok(false)`.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, AppError> {
    let parsed = PasswordHash::new(hash)
        .map_err(|e| AppError::Internal(format!("invalid password hash: {e}")))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// create_access_token
///
/// Signs an HS256 token for `user_id` that expires `ttl` from now.
pub fn create_access_token(user_id: Uuid, secret: &str, ttl: Duration) -> Result<String, AppError> {
    let now = Utc::now();
    let expires_at = now
        .checked_add_signed(ttl)
        .ok_or_else(|| AppError::Internal(format!("token lifetime out of range: {ttl}")))?;
    let claims = Claims {
        sub: user_id,
        iat: now.timestamp() as usize,
        exp: expires_at.timestamp() as usize,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(format!("failed to sign access token: {e}")))
}

/// verify_token
///
/// Decodes and validates `token` (signature and expiry). Any failure yields `None`; the
/// reason is only logged.
pub fn verify_token(token: &str, secret: &str) -> Option<Claims> {
    let mut validation = Validation::default();
    validation.validate_exp = true;

    match decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation) {
        Ok(data) => Some(data.claims),
        Err(e) => {
            tracing::debug!(reason = ?e.kind(), "rejected bearer token");
            None
        }
    }
}

/// Returns the credential of an `Authorization: Bearer <token>` header, if present.
/// The scheme is matched case-insensitively.
pub fn bearer_token(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// CurrentUser
///
/// The user resolved from the request's bearer token. Usable as a handler argument on any
/// route; the authenticated router's middleware resolves it once and stores it in the
/// request extensions, so handlers behind it do not hit the store again.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub UserDb);

/// Resolution order:
/// 1. Already resolved by the middleware: reuse it.
/// 2. Bearer token extraction; missing or malformed → 401.
/// 3. Token verification with the configured secret; invalid or expired → 401.
/// 4. User lookup by the `sub` claim; absent → 404.
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
    UserRepository: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<CurrentUser>() {
            return Ok(user.clone());
        }

        let token = bearer_token(parts).ok_or(AppError::InvalidCredentials)?;

        let config = AppConfig::from_ref(state);
        let claims = verify_token(token, &config.secret_key).ok_or(AppError::InvalidCredentials)?;

        let users = UserRepository::from_ref(state);
        let user = users.get(claims.sub).await?.ok_or(AppError::UserNotFound)?;

        Ok(CurrentUser(user))
    }
}
