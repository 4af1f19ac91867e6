mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use blog_api::{
    AppConfig, AppState, InMemoryRepository, LocalDiskStorage, create_router, models::Role,
};
use common::{TestApp, get, json, send};
use serde_json::json;
use std::sync::Arc;
use tower::util::ServiceExt;

#[tokio::test]
async fn test_health_check() {
    let app = TestApp::new();

    let response = app
        .router
        .clone()
        .oneshot(get("/health", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&body[..], b"ok");
}

#[tokio::test]
async fn test_request_id_is_echoed() {
    let app = TestApp::new();

    let response = app
        .router
        .clone()
        .oneshot(get("/health", None))
        .await
        .unwrap();

    assert!(response.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn test_openapi_document_lists_routes() {
    let app = TestApp::new();

    let (status, body) = app.send(get("/api-docs/openapi.json", None)).await;

    assert_eq!(status, StatusCode::OK);
    let paths = body["paths"].as_object().unwrap();
    for path in ["/auth/register", "/articles/{id}", "/comments/{id}", "/users/{id}", "/orders"] {
        assert!(paths.contains_key(path), "missing {path}");
    }
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let app = TestApp::new();

    let (status, body) = app.send(get("/nope", None)).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({ "success": false, "message": "Route not found" }));
}

// --- Malformed requests keep the envelope ---

#[tokio::test]
async fn test_malformed_json_field_is_validation_error() {
    let app = TestApp::new();
    let alice = app.seed_user("Alice", Role::Reader).await;

    let (status, body) = app
        .send(json(
            "POST",
            "/comments",
            Some(&app.token_for(&alice)),
            json!({ "article_id": "not-a-uuid", "content": "hi" }),
        ))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Validation failed");
    assert_eq!(body["errors"][0]["field"], "body");
}

#[tokio::test]
async fn test_unparseable_json_is_validation_error() {
    let app = TestApp::new();
    let request = Request::builder()
        .method("POST")
        .uri("/auth/login")
        .header("content-type", "application/json")
        .body(Body::from("{\"email\": "))
        .unwrap();

    let (status, body) = app.send(request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"][0]["field"], "body");
}

#[tokio::test]
async fn test_malformed_path_ids_are_validation_errors() {
    let app = TestApp::new();
    let alice = app.seed_user("Alice", Role::Reader).await;
    let token = app.token_for(&alice);

    for request in [
        get("/articles/not-a-uuid", None),
        get("/articles/not-a-uuid/comments", None),
        json("PUT", "/comments/abc", Some(&token), json!({ "content": "edited" })),
        get("/users/123", Some(&token)),
    ] {
        let uri = request.uri().to_string();
        let (status, body) = app.send(request).await;

        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(body["success"], false, "{uri}");
        assert_eq!(body["errors"][0]["field"], "id", "{uri}");
    }
}

#[tokio::test]
async fn test_non_multipart_upload_is_validation_error() {
    let app = TestApp::new();
    let alice = app.seed_user("Alice", Role::Author).await;

    let (status, body) = app
        .send(json(
            "POST",
            "/articles",
            Some(&app.token_for(&alice)),
            json!({ "title": "Hello", "content": "Body" }),
        ))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["errors"][0]["message"],
        "Expected a multipart/form-data request"
    );
}

#[tokio::test]
async fn test_uploaded_files_are_served_statically() {
    let dir = tempfile::tempdir().unwrap();
    let storage = LocalDiskStorage::new(dir.path());
    std::fs::create_dir_all(dir.path().join("images")).unwrap();
    std::fs::write(dir.path().join("images/cover.png"), b"png-bytes").unwrap();

    let config = AppConfig {
        static_root: dir.path().to_path_buf(),
        ..AppConfig::default()
    };
    let state = AppState::new(
        Arc::new(InMemoryRepository::new()),
        Arc::new(storage),
        config,
    );
    let router = create_router(state);

    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/images/cover.png")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&body[..], b"png-bytes");

    let (status, _) = send(&router, get("/avatars/missing.png", None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
