use reqwest::{Client, StatusCode, header};
use serde_json::{Value, json};
use std::sync::Arc;
use tablekeep::{AppConfig, AppState, InMemoryStore, create_router, store::StoreState};
use tokio::net::TcpListener;
use uuid::Uuid;

#[derive(Debug)]
pub struct TestApp {
    pub address: String,
    pub client: Client,
}

impl TestApp {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    async fn register(&self, email: &str, password: &str) -> reqwest::Response {
        self.client
            .post(self.url("/api/v1/auth/register"))
            .json(&json!({ "email": email, "password": password, "full_name": "Test User" }))
            .send()
            .await
            .expect("req fail")
    }

    async fn login(&self, email: &str, password: &str) -> reqwest::Response {
        self.client
            .post(self.url("/api/v1/auth/login"))
            .form(&[("username", email), ("password", password)])
            .send()
            .await
            .expect("req fail")
    }

    /// Registers a fresh account and returns its bearer token.
    async fn signed_up_token(&self, email: &str) -> String {
        assert_eq!(self.register(email, "hunter22").await.status(), StatusCode::CREATED);
        let body: Value = self.login(email, "hunter22").await.json().await.unwrap();
        body["access_token"].as_str().unwrap().to_string()
    }
}

async fn spawn_app() -> TestApp {
    let store: StoreState = Arc::new(InMemoryStore::new());
    let state = AppState {
        store,
        config: AppConfig::default(),
    };
    let router = create_router(state);

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    TestApp {
        address,
        client: Client::new(),
    }
}

#[tokio::test]
async fn test_health_check() {
    let app = spawn_app().await;
    let response = app.client.get(app.url("/health")).send().await.expect("req fail");
    assert!(response.status().is_success());
}

#[tokio::test]
async fn test_register_then_duplicate_conflicts() {
    let app = spawn_app().await;

    let response = app.register("ada@example.com", "hunter22").await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["email"], "ada@example.com");
    assert!(body.get("hashed_password").is_none());

    // Emails compare case-insensitively.
    let response = app.register("ADA@example.com", "other-pass").await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["detail"], "User with this email already exists.");
}

#[tokio::test]
async fn test_register_rejects_invalid_email() {
    let app = spawn_app().await;
    let response = app.register("not-an-email", "hunter22").await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_login_flow() {
    let app = spawn_app().await;
    app.register("ada@example.com", "hunter22").await;

    let response = app.login("ada@example.com", "hunter22").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["token_type"], "bearer");
    assert!(!body["access_token"].as_str().unwrap().is_empty());

    let response = app.login("ada@example.com", "wrong").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["detail"], "Incorrect email or password.");
}

#[tokio::test]
async fn test_me_requires_bearer_token() {
    let app = spawn_app().await;

    let response = app
        .client
        .get(app.url("/api/v1/users/me"))
        .send()
        .await
        .expect("req fail");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.headers()[header::WWW_AUTHENTICATE], "Bearer");
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["detail"], "Could not validate credentials.");

    let response = app
        .client
        .get(app.url("/api/v1/users/me"))
        .bearer_auth("garbage")
        .send()
        .await
        .expect("req fail");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_me_returns_token_owner() {
    let app = spawn_app().await;
    let token = app.signed_up_token("ada@example.com").await;

    let response = app
        .client
        .get(app.url("/api/v1/users/me"))
        .bearer_auth(&token)
        .send()
        .await
        .expect("req fail");
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["email"], "ada@example.com");
    assert_eq!(body["is_active"], true);
}

#[tokio::test]
async fn test_token_for_missing_user_is_not_found() {
    let app = spawn_app().await;
    let config = AppConfig::default();
    let token = tablekeep::auth::create_access_token(
        Uuid::new_v4(),
        &config.secret_key,
        config.access_token_ttl(),
    )
    .unwrap();

    let response = app
        .client
        .get(app.url("/api/v1/users/me"))
        .bearer_auth(&token)
        .send()
        .await
        .expect("req fail");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["detail"], "User not found.");
}

#[tokio::test]
async fn test_table_lifecycle() {
    let app = spawn_app().await;
    let token = app.signed_up_token("ada@example.com").await;
    let intruder = app.signed_up_token("eve@example.com").await;

    // 1. Create
    let response = app
        .client
        .post(app.url("/api/v1/tables"))
        .bearer_auth(&token)
        .json(&json!({ "name": "budget", "data": { "rows": [1, 2, 3] } }))
        .send()
        .await
        .expect("req fail");
    assert_eq!(response.status(), StatusCode::CREATED);
    let created: Value = response.json().await.unwrap();
    let id = created["id"].as_str().unwrap().to_string();
    let table_url = app.url(&format!("/api/v1/tables/{id}"));

    // 2. List (own tables only)
    let mine: Vec<Value> = app
        .client
        .get(app.url("/api/v1/tables"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(mine.len(), 1);

    let theirs: Vec<Value> = app
        .client
        .get(app.url("/api/v1/tables?skip=0&limit=10"))
        .bearer_auth(&intruder)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(theirs.is_empty());

    // 3. Other users cannot see it
    let response = app
        .client
        .get(&table_url)
        .bearer_auth(&intruder)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // 4. Partial update
    let response = app
        .client
        .put(&table_url)
        .bearer_auth(&token)
        .json(&json!({ "description": "FY26" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let updated: Value = response.json().await.unwrap();
    assert_eq!(updated["name"], "budget");
    assert_eq!(updated["description"], "FY26");
    assert_eq!(updated["data"], json!({ "rows": [1, 2, 3] }));

    // 5. Delete, then gone
    let response = app.client.delete(&table_url).bearer_auth(&token).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app.client.get(&table_url).bearer_auth(&token).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["detail"], "Table not found.");
}

#[tokio::test]
async fn test_request_id_is_propagated() {
    let app = spawn_app().await;

    let response = app.client.get(app.url("/health")).send().await.unwrap();
    assert!(response.headers().contains_key("x-request-id"));

    let response = app
        .client
        .get(app.url("/health"))
        .header("x-request-id", "trace-me")
        .send()
        .await
        .unwrap();
    assert_eq!(response.headers()["x-request-id"], "trace-me");
}

#[tokio::test]
async fn test_openapi_document_lists_routes() {
    let app = spawn_app().await;

    let doc: Value = app
        .client
        .get(app.url("/api-docs/openapi.json"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let paths = doc["paths"].as_object().unwrap();
    for path in [
        "/api/v1/auth/register",
        "/api/v1/auth/login",
        "/api/v1/users/me",
        "/api/v1/tables",
        "/api/v1/tables/{id}",
    ] {
        assert!(paths.contains_key(path), "missing {path}");
    }
    assert!(doc["components"]["securitySchemes"]["bearer"].is_object());
}

#[tokio::test]
async fn test_malformed_requests_answer_with_detail() {
    let app = spawn_app().await;
    let token = app.signed_up_token("ada@example.com").await;

    // Register without a password.
    let register = app
        .client
        .post(app.url("/api/v1/auth/register"))
        .json(&json!({ "email": "bob@example.com" }))
        .send()
        .await
        .unwrap();

    // Login form without a password.
    let login = app
        .client
        .post(app.url("/api/v1/auth/login"))
        .form(&[("username", "ada@example.com")])
        .send()
        .await
        .unwrap();

    // Path segment that is not a UUID.
    let path = app
        .client
        .get(app.url("/api/v1/tables/not-a-uuid"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();

    // Non-numeric pagination.
    let query = app
        .client
        .get(app.url("/api/v1/tables?limit=abc"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();

    for (response, expected) in [
        (register, StatusCode::UNPROCESSABLE_ENTITY),
        (login, StatusCode::UNPROCESSABLE_ENTITY),
        (path, StatusCode::BAD_REQUEST),
        (query, StatusCode::BAD_REQUEST),
    ] {
        let url = response.url().to_string();
        assert_eq!(response.status(), expected, "{url}");
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/json",
            "{url}"
        );
        let body: Value = response.json().await.unwrap();
        assert!(body["detail"].is_string(), "{url}: {body}");
    }
}
