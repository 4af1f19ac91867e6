#![allow(dead_code)]

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use blog_api::{
    AppConfig, AppState, InMemoryRepository, MockStorageService, TokenService, create_router,
    models::{NewUser, Role, User},
    password::hash_password,
    repository::{Repository, RepositoryState},
    storage::StorageState,
};
use serde_json::Value;
use std::sync::{Arc, OnceLock};
use tower::util::ServiceExt;

pub const HOST: &str = "blog.test";
pub const PASSWORD: &str = "Password1";

// Argon2 is slow in debug builds; every seeded user shares one hash of PASSWORD.
fn shared_hash() -> String {
    static HASH: OnceLock<String> = OnceLock::new();
    HASH.get_or_init(|| hash_password(PASSWORD).unwrap()).clone()
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub repo: Arc<InMemoryRepository>,
    pub storage: MockStorageService,
    pub tokens: TokenService,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_storage(MockStorageService::new())
    }

    pub fn with_storage(storage: MockStorageService) -> Self {
        Self::build(storage, AppConfig::default())
    }

    /// An app that honors `X-Forwarded-*`, as when deployed behind a proxy.
    pub fn behind_proxy() -> Self {
        let config = AppConfig {
            trust_proxy: true,
            ..AppConfig::default()
        };
        Self::build(MockStorageService::new(), config)
    }

    fn build(storage: MockStorageService, config: AppConfig) -> Self {
        let repo = Arc::new(InMemoryRepository::new());
        let state = AppState::new(
            repo.clone() as RepositoryState,
            Arc::new(storage.clone()) as StorageState,
            config,
        );
        Self {
            router: create_router(state.clone()),
            tokens: state.tokens.clone(),
            state,
            repo,
            storage,
        }
    }

    pub async fn seed_user(&self, name: &str, role: Role) -> User {
        let email = format!("{}@example.com", name.to_lowercase().replace(' ', "."));
        self.repo
            .create_user(NewUser {
                name: name.to_string(),
                email,
                password_hash: shared_hash(),
                bio: None,
                avatar: None,
                role,
            })
            .await
            .unwrap()
    }

    pub fn token_for(&self, user: &User) -> String {
        self.tokens.issue(user).unwrap()
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        send(&self.router, request).await
    }
}

pub async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn builder(method: &str, uri: &str, token: Option<&str>) -> axum::http::request::Builder {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::HOST, HOST);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder
}

pub fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    builder("GET", uri, token).body(Body::empty()).unwrap()
}

pub fn delete(uri: &str, token: Option<&str>) -> Request<Body> {
    builder("DELETE", uri, token).body(Body::empty()).unwrap()
}

pub fn json(method: &str, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    builder(method, uri, token)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn multipart(method: &str, uri: &str, token: Option<&str>, form: Form) -> Request<Body> {
    let (content_type, body) = form.build();
    builder(method, uri, token)
        .header(header::CONTENT_TYPE, content_type)
        .body(Body::from(body))
        .unwrap()
}

/// A hand-assembled `multipart/form-data` body.
#[derive(Default)]
pub struct Form {
    parts: Vec<u8>,
}

const BOUNDARY: &str = "----blogtestboundary7MA4YWxkTrZu0gW";

impl Form {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.parts.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
        self
    }

    pub fn file(mut self, name: &str, file_name: &str, bytes: &[u8]) -> Self {
        self.parts.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        self.parts.extend_from_slice(bytes);
        self.parts.extend_from_slice(b"\r\n");
        self
    }

    fn build(mut self) -> (String, Vec<u8>) {
        self.parts
            .extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        (
            format!("multipart/form-data; boundary={BOUNDARY}"),
            self.parts,
        )
    }
}

/// A minimal article form with a JPEG whose bytes are derived from `seed`.
pub fn article_form(title: &str, seed: &str) -> Form {
    Form::new()
        .text("title", title)
        .text("content", "Some article content")
        .file("file", "cover.jpg", seed.as_bytes())
}

/// Creates an article over HTTP and returns its JSON `data`.
pub async fn create_article(app: &TestApp, token: &str, title: &str, seed: &str) -> Value {
    let (status, body) = app
        .send(multipart("POST", "/articles", Some(token), article_form(title, seed)))
        .await;
    assert_eq!(status, StatusCode::CREATED, "article creation failed: {body}");
    body["data"].clone()
}

/// Turns an absolute URL from a response back into the stored relative path.
pub fn relative_path(url: &str) -> String {
    url.trim_start_matches(&format!("http://{HOST}/")).to_string()
}
