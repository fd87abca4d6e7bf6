use std::env;

const LOCAL_SECRET_KEY: &str = "insecure-local-secret-key-change-me";
// One year.
const MAX_TOKEN_EXPIRE_MINUTES: i64 = 60 * 24 * 365;

/// AppConfig
///
/// Holds the application's entire configuration state, loaded once at startup and
/// immutable afterwards. Pulled into handlers and extractors via `FromRef`.
#[derive(Clone, Debug)]
pub struct AppConfig {
    // Runtime environment marker. Controls log format and which settings are mandatory.
    pub env: Env,
    // Postgres connection string. `None` runs the service on the in-memory store.
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    // HS256 key used to sign and verify access tokens.
    pub secret_key: String,
    // Document collection holding users.
    pub user_collection_name: String,
    // Document collection holding tables.
    pub table_collection_name: String,
    pub access_token_expire_minutes: i64,
    pub bind_addr: String,
}

/// Env
///
/// Local development is forgiving (fallback secret, optional database); production
/// refuses to start without real settings.
#[derive(Clone, PartialEq, Debug)]
pub enum Env {
    Local,
    Production,
}

impl Default for AppConfig {
    /// Safe, non-panicking configuration for tests: in-memory store, fixed secret.
    fn default() -> Self {
        Self {
            env: Env::Local,
            database_url: None,
            database_max_connections: 5,
            secret_key: LOCAL_SECRET_KEY.to_string(),
            user_collection_name: "users".to_string(),
            table_collection_name: "tables".to_string(),
            access_token_expire_minutes: 60,
            bind_addr: "0.0.0.0:3000".to_string(),
        }
    }
}

impl AppConfig {
    /// load
    ///
    /// Reads every setting from environment variables, falling back to the defaults above.
    ///
    /// # Panics
    /// In production, panics when `SECRET_KEY` or `DATABASE_URL` is missing, and in any
    /// environment when a numeric setting does not parse or `ACCESS_TOKEN_EXPIRE_MINUTES`
    /// lies outside `1..=525600`. The service must not start with
    /// an incomplete or insecure configuration.
    pub fn load() -> Self {
        let defaults = Self::default();

        let env = match env::var("APP_ENV").as_deref() {
            Ok("production") => Env::Production,
            _ => Env::Local,
        };

        let (secret_key, database_url) = match env {
            Env::Production => (
                env::var("SECRET_KEY").expect("FATAL: SECRET_KEY must be set in production."),
                Some(env::var("DATABASE_URL").expect("FATAL: DATABASE_URL must be set in production.")),
            ),
            Env::Local => (
                env::var("SECRET_KEY").unwrap_or(defaults.secret_key),
                env::var("DATABASE_URL").ok(),
            ),
        };

        let access_token_expire_minutes = parse_var(
            "ACCESS_TOKEN_EXPIRE_MINUTES",
            defaults.access_token_expire_minutes,
        );
        if !(1..=MAX_TOKEN_EXPIRE_MINUTES).contains(&access_token_expire_minutes) {
            panic!(
                "FATAL: ACCESS_TOKEN_EXPIRE_MINUTES must be between 1 and {MAX_TOKEN_EXPIRE_MINUTES}, got {access_token_expire_minutes}"
            );
        }

        Self {
            env,
            database_url,
            database_max_connections: parse_var(
                "DATABASE_MAX_CONNECTIONS",
                defaults.database_max_connections,
            ),
            secret_key,
            user_collection_name: env::var("USER_COLLECTION_NAME")
                .unwrap_or(defaults.user_collection_name),
            table_collection_name: env::var("TABLE_COLLECTION_NAME")
                .unwrap_or(defaults.table_collection_name),
            access_token_expire_minutes,
            bind_addr: env::var("BIND_ADDR").unwrap_or(defaults.bind_addr),
        }
    }

    /// Saturates instead of panicking when the configured minutes overflow.
    pub fn access_token_ttl(&self) -> chrono::Duration {
        chrono::Duration::try_minutes(self.access_token_expire_minutes)
            .unwrap_or(chrono::Duration::MAX)
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .unwrap_or_else(|_| panic!("FATAL: {name} has an invalid value: {raw}")),
        Err(_) => default,
    }
}
