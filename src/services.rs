//! Registration and login logic behind the auth routes.

use chrono::Utc;
use std::sync::LazyLock;
use uuid::Uuid;

use crate::{
    auth::{create_access_token, hash_password, verify_password},
    config::AppConfig,
    error::AppError,
    models::{LoginForm, Token, UserDb, UserIn},
    repository::UserRepository,
};

/// create_user
///
/// Validates the payload, hashes the password and stores the user. Fails with
/// `UserAlreadyExists` when the email (compared lower-cased) is taken.
pub async fn create_user(users: &UserRepository, user: UserIn) -> Result<UserDb, AppError> {
    let email = user.email.trim().to_lowercase();
    if !is_plausible_email(&email) {
        return Err(AppError::Validation("A valid email address is required.".to_string()));
    }
    if user.password.is_empty() {
        return Err(AppError::Validation("Password must not be empty.".to_string()));
    }

    let record = UserDb {
        id: Uuid::new_v4(),
        email,
        hashed_password: hash_password(&user.password)?,
        full_name: user.full_name.filter(|name| !name.trim().is_empty()),
        is_active: true,
        created_at: Utc::now(),
    };

    users.create(record).await?.ok_or(AppError::UserAlreadyExists)
}

// Verified against when the email is unknown, so a miss costs as much as a wrong password.
static DUMMY_HASH: LazyLock<Option<String>> =
    LazyLock::new(|| hash_password("tablekeep-dummy-password").ok());

/// authenticate_user
///
/// `Some(user)` only for an active user whose password matches. Unknown emails, inactive
/// accounts and wrong passwords are indistinguishable to the caller.
pub async fn authenticate_user(
    users: &UserRepository,
    credentials: &LoginForm,
) -> Result<Option<UserDb>, AppError> {
    let Some(user) = users.get_by_email(credentials.username.trim()).await? else {
        if let Some(hash) = DUMMY_HASH.as_deref() {
            verify_password(&credentials.password, hash)?;
        }
        return Ok(None);
    };
    if !verify_password(&credentials.password, &user.hashed_password)? || !user.is_active {
        return Ok(None);
    }
    Ok(Some(user))
}

pub fn generate_access_token(user: &UserDb, config: &AppConfig) -> Result<Token, AppError> {
    let access_token = create_access_token(user.id, &config.secret_key, config.access_token_ttl())?;
    Ok(Token {
        access_token,
        token_type: "bearer".to_string(),
    })
}

/// One `@` with something on both sides and a dot in the domain.
fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.contains(char::is_whitespace)
        }
        None => false,
    }
}
