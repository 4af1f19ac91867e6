mod common;

use axum::http::StatusCode;
use blog_api::{MockStorageService, models::Role, upload::MAX_UPLOAD_BYTES};
use common::{
    Form, PASSWORD, TestApp, article_form, create_article, delete, get, json, multipart,
    relative_path,
};
use serde_json::json;

#[tokio::test]
async fn test_register_login_publish_and_read_back() {
    let app = TestApp::new();

    let (status, _) = app
        .send(multipart(
            "POST",
            "/auth/register",
            None,
            Form::new()
                .text("name", "Alice")
                .text("email", "alice@example.com")
                .text("password", PASSWORD)
                .text("role", "author"),
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, login) = app
        .send(json(
            "POST",
            "/auth/login",
            None,
            json!({ "email": "alice@example.com", "password": PASSWORD }),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    let token = login["data"]["token"].as_str().unwrap().to_string();

    let created = create_article(&app, &token, "Hello", "jpeg-bytes").await;
    let id = created["id"].as_str().unwrap();

    let (status, body) = app.send(get(&format!("/articles/{id}"), None)).await;

    assert_eq!(status, StatusCode::OK);
    let article = &body["data"];
    assert_eq!(article["author"]["name"], "Alice");
    let image_url = article["imageUrl"].as_str().unwrap();
    assert!(image_url.starts_with("http://blog.test/images/"));
    assert!(image_url.ends_with(".jpg"));
    assert!(article.get("image_url").is_none());
    assert!(app.storage.contains(&relative_path(image_url)));
}

#[tokio::test]
async fn test_list_articles_newest_first_with_authors() {
    let app = TestApp::new();
    let alice = app.seed_user("Alice", Role::Author).await;
    let token = app.token_for(&alice);
    create_article(&app, &token, "First", "one").await;
    create_article(&app, &token, "Second", "two").await;

    let (status, body) = app.send(get("/articles", None)).await;

    assert_eq!(status, StatusCode::OK);
    let articles = body["data"].as_array().unwrap();
    assert_eq!(articles.len(), 2);
    assert_eq!(articles[0]["title"], "Second");
    assert_eq!(articles[1]["author"]["id"], alice.id.to_string());
}

#[tokio::test]
async fn test_forwarded_headers_shape_image_urls() {
    let app = TestApp::behind_proxy();
    let alice = app.seed_user("Alice", Role::Author).await;
    create_article(&app, &app.token_for(&alice), "Hello", "bytes").await;

    let mut request = get("/articles", None);
    request
        .headers_mut()
        .insert("x-forwarded-proto", "https".parse().unwrap());
    request
        .headers_mut()
        .insert("x-forwarded-host", "cdn.example.org".parse().unwrap());
    let (_, body) = app.send(request).await;

    let url = body["data"][0]["imageUrl"].as_str().unwrap();
    assert!(url.starts_with("https://cdn.example.org/images/"));
}

#[tokio::test]
async fn test_forwarded_headers_ignored_without_trusted_proxy() {
    let app = TestApp::new();
    let alice = app.seed_user("Alice", Role::Author).await;
    create_article(&app, &app.token_for(&alice), "Hello", "bytes").await;

    let mut request = get("/articles", None);
    request
        .headers_mut()
        .insert("x-forwarded-host", "evil.example".parse().unwrap());
    let (_, body) = app.send(request).await;

    let url = body["data"][0]["imageUrl"].as_str().unwrap();
    assert!(url.starts_with("http://blog.test/images/"), "{url}");
}

#[tokio::test]
async fn test_get_missing_article_is_not_found() {
    let app = TestApp::new();

    let (status, body) = app
        .send(get(&format!("/articles/{}", uuid::Uuid::new_v4()), None))
        .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
}

// --- Creation rules ---

#[tokio::test]
async fn test_reader_cannot_create_article() {
    let app = TestApp::new();
    let reader = app.seed_user("Rita", Role::Reader).await;

    let (status, _) = app
        .send(multipart(
            "POST",
            "/articles",
            Some(&app.token_for(&reader)),
            article_form("Nope", "bytes"),
        ))
        .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(app.storage.is_empty());
}

#[tokio::test]
async fn test_editor_can_create_article() {
    let app = TestApp::new();
    let editor = app.seed_user("Eddie", Role::Editor).await;

    let created = create_article(&app, &app.token_for(&editor), "By editor", "e").await;

    assert_eq!(created["author"]["name"], "Eddie");
}

#[tokio::test]
async fn test_create_article_requires_token() {
    let app = TestApp::new();

    let (status, _) = app
        .send(multipart("POST", "/articles", None, article_form("x", "y")))
        .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_create_article_requires_file() {
    let app = TestApp::new();
    let alice = app.seed_user("Alice", Role::Author).await;

    let form = Form::new().text("title", "Hello").text("content", "Body");
    let (status, body) = app
        .send(multipart("POST", "/articles", Some(&app.token_for(&alice)), form))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"][0]["field"], "file");
}

#[tokio::test]
async fn test_create_article_validates_title_and_content() {
    let app = TestApp::new();
    let alice = app.seed_user("Alice", Role::Author).await;

    let form = Form::new()
        .text("title", &"t".repeat(256))
        .text("content", "   ")
        .file("file", "a.jpg", b"x");
    let (status, body) = app
        .send(multipart("POST", "/articles", Some(&app.token_for(&alice)), form))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let fields: Vec<_> = body["errors"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["field"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(fields, vec!["title", "content"]);
    assert!(app.storage.is_empty());
}

#[tokio::test]
async fn test_gif_upload_is_rejected_and_not_stored() {
    let app = TestApp::new();
    let alice = app.seed_user("Alice", Role::Author).await;

    let form = Form::new()
        .text("title", "Hello")
        .text("content", "Body")
        .file("file", "cat.gif", b"GIF89a");
    let (status, body) = app
        .send(multipart("POST", "/articles", Some(&app.token_for(&alice)), form))
        .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["success"], false);
    assert!(app.storage.is_empty());
}

#[tokio::test]
async fn test_oversized_upload_is_rejected_and_not_stored() {
    let app = TestApp::new();
    let alice = app.seed_user("Alice", Role::Author).await;

    let big = vec![0u8; MAX_UPLOAD_BYTES + 1];
    let form = Form::new()
        .text("title", "Hello")
        .text("content", "Body")
        .file("file", "huge.jpg", &big);
    let (status, _) = app
        .send(multipart("POST", "/articles", Some(&app.token_for(&alice)), form))
        .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(app.storage.is_empty());
}

// --- Ownership ---

#[tokio::test]
async fn test_only_owner_or_admin_may_modify_article() {
    let app = TestApp::new();
    let owner = app.seed_user("Owner", Role::Author).await;
    let other = app.seed_user("Other", Role::Author).await;
    let admin = app.seed_user("Admin", Role::Admin).await;
    let created = create_article(&app, &app.token_for(&owner), "Mine", "img").await;
    let uri = format!("/articles/{}", created["id"].as_str().unwrap());

    let edit = || Form::new().text("title", "Edited").text("content", "Changed");

    let (status, _) = app
        .send(multipart("PUT", &uri, Some(&app.token_for(&other)), edit()))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app.send(delete(&uri, Some(&app.token_for(&other)))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .send(multipart("PUT", &uri, Some(&app.token_for(&owner)), edit()))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["title"], "Edited");
    assert_eq!(body["data"]["imageUrl"], created["imageUrl"]);

    let (status, _) = app.send(delete(&uri, Some(&app.token_for(&admin)))).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app.send(get(&uri, None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_modify_missing_article_is_not_found() {
    let app = TestApp::new();
    let admin = app.seed_user("Admin", Role::Admin).await;

    let (status, _) = app
        .send(delete(
            &format!("/articles/{}", uuid::Uuid::new_v4()),
            Some(&app.token_for(&admin)),
        ))
        .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

// --- File lifecycle ---

#[tokio::test]
async fn test_replaced_image_is_retired() {
    let app = TestApp::new();
    let alice = app.seed_user("Alice", Role::Author).await;
    let token = app.token_for(&alice);
    let created = create_article(&app, &token, "Hello", "old-image").await;
    let old_path = relative_path(created["imageUrl"].as_str().unwrap());

    let (status, body) = app
        .send(multipart(
            "PUT",
            &format!("/articles/{}", created["id"].as_str().unwrap()),
            Some(&token),
            Form::new()
                .text("title", "Hello")
                .text("content", "Body")
                .file("file", "new.png", b"new-image"),
        ))
        .await;

    assert_eq!(status, StatusCode::OK);
    let new_path = relative_path(body["data"]["imageUrl"].as_str().unwrap());
    assert_ne!(old_path, new_path);
    assert!(app.storage.contains(&new_path));
    assert!(!app.storage.contains(&old_path));
    assert_eq!(body["data"]["version"], 2);
}

#[tokio::test]
async fn test_shared_image_survives_deletion_of_one_article() {
    let app = TestApp::new();
    let alice = app.seed_user("Alice", Role::Author).await;
    let token = app.token_for(&alice);
    let first = create_article(&app, &token, "First", "same-bytes").await;
    let second = create_article(&app, &token, "Second", "same-bytes").await;
    assert_eq!(first["imageUrl"], second["imageUrl"]);
    let path = relative_path(first["imageUrl"].as_str().unwrap());

    let (status, _) = app
        .send(delete(
            &format!("/articles/{}", first["id"].as_str().unwrap()),
            Some(&token),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(app.storage.contains(&path));

    let (status, _) = app
        .send(delete(
            &format!("/articles/{}", second["id"].as_str().unwrap()),
            Some(&token),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(!app.storage.contains(&path));
}

#[tokio::test]
async fn test_failed_insert_reverts_new_file() {
    let app = TestApp::new();
    let alice = app.seed_user("Alice", Role::Author).await;
    app.repo.set_fail_writes(true);

    let (status, body) = app
        .send(multipart(
            "POST",
            "/articles",
            Some(&app.token_for(&alice)),
            article_form("Hello", "fresh"),
        ))
        .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["message"], "Internal Server Error");
    assert!(app.storage.is_empty());
}

#[tokio::test]
async fn test_failed_insert_keeps_preexisting_identical_file() {
    let app = TestApp::new();
    let alice = app.seed_user("Alice", Role::Author).await;
    let token = app.token_for(&alice);
    let existing = create_article(&app, &token, "Original", "shared").await;
    let path = relative_path(existing["imageUrl"].as_str().unwrap());

    app.repo.set_fail_writes(true);
    let (status, _) = app
        .send(multipart("POST", "/articles", Some(&token), article_form("Copy", "shared")))
        .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(app.storage.contains(&path));
}

#[tokio::test]
async fn test_failed_update_reverts_new_file_and_keeps_old() {
    let app = TestApp::new();
    let alice = app.seed_user("Alice", Role::Author).await;
    let token = app.token_for(&alice);
    let created = create_article(&app, &token, "Hello", "before").await;
    let old_path = relative_path(created["imageUrl"].as_str().unwrap());

    app.repo.set_fail_writes(true);
    let (status, _) = app
        .send(multipart(
            "PUT",
            &format!("/articles/{}", created["id"].as_str().unwrap()),
            Some(&token),
            Form::new()
                .text("title", "Hello")
                .text("content", "Body")
                .file("file", "after.jpg", b"after"),
        ))
        .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(app.storage.paths(), vec![old_path]);
}

#[tokio::test]
async fn test_storage_failure_is_internal_error() {
    let app = TestApp::with_storage(MockStorageService::new_failing());
    let alice = app.seed_user("Alice", Role::Author).await;

    let (status, body) = app
        .send(multipart(
            "POST",
            "/articles",
            Some(&app.token_for(&alice)),
            article_form("Hello", "x"),
        ))
        .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["message"], "Internal Server Error");
    let (_, list) = app.send(get("/articles", None)).await;
    assert_eq!(list["data"].as_array().unwrap().len(), 0);
}
