use axum::body::Bytes;
use blog_api::{
    AppError, InMemoryRepository, LocalDiskStorage, MockStorageService,
    models::{NewArticle, NewUser, Role},
    repository::Repository,
    storage::{StorageService, sanitize_key},
    upload::{self, MAX_UPLOAD_BYTES, UploadKind, UploadedFile},
};

fn file(name: &str, bytes: &[u8]) -> UploadedFile {
    UploadedFile {
        file_name: name.to_string(),
        bytes: Bytes::copy_from_slice(bytes),
    }
}

// --- Validation ---

#[test]
fn test_extension_check_is_case_insensitive() {
    for name in ["a.JPG", "b.Jpeg", "c.png"] {
        assert!(upload::validate("file", file(name, b"x"), UploadKind::ArticleImage).is_ok());
    }
}

#[test]
fn test_disallowed_extensions_are_invalid_files() {
    for name in ["a.gif", "b.webp", "noextension", "jpg"] {
        let result = upload::validate("file", file(name, b"x"), UploadKind::ArticleImage);
        assert!(matches!(result, Err(AppError::InvalidFile(_))), "{name}");
    }
}

#[test]
fn test_size_limit_is_inclusive() {
    let at_limit = vec![1u8; MAX_UPLOAD_BYTES];
    let over_limit = vec![1u8; MAX_UPLOAD_BYTES + 1];

    assert!(upload::validate("file", file("a.png", &at_limit), UploadKind::ArticleImage).is_ok());
    let err = upload::validate("file", file("a.png", &over_limit), UploadKind::ArticleImage)
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidFile(ref m) if m == "Image must be less than 5 MB"));
}

#[test]
fn test_long_file_name_is_a_field_error() {
    let name = format!("{}.png", "n".repeat(97));
    assert_eq!(name.chars().count(), 101);

    let err = upload::validate("avatar", file(&name, b"x"), UploadKind::Avatar).unwrap_err();

    match err {
        AppError::Validation(errors) => assert_eq!(errors[0].field, "avatar"),
        other => panic!("expected a validation error, got {other:?}"),
    }
}

#[test]
fn test_stored_path_is_content_hash_with_lowercase_extension() {
    let upload = upload::validate("avatar", file("Me.PNG", b"abc"), UploadKind::Avatar).unwrap();

    // SHA-256 of "abc".
    assert_eq!(
        upload.relative_path,
        "avatars/ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad.png"
    );

    let image = upload::validate("file", file("x.jpeg", b"abc"), UploadKind::ArticleImage)
        .unwrap();
    assert!(image.relative_path.starts_with("images/ba7816bf"));
    assert!(image.relative_path.ends_with(".jpeg"));
}

// --- Staging ---

#[tokio::test]
async fn test_revert_removes_newly_created_file() {
    let storage = MockStorageService::new();
    let repo = InMemoryRepository::new();
    let upload = upload::validate("file", file("a.png", b"new"), UploadKind::ArticleImage).unwrap();

    let staged = upload::stage(&storage, upload).await.unwrap();
    assert!(storage.contains(staged.path()));
    staged.revert(&storage, &repo).await;

    assert!(storage.is_empty());
}

#[tokio::test]
async fn test_revert_keeps_file_that_existed_before() {
    let storage = MockStorageService::new();
    let repo = InMemoryRepository::new();
    let first = upload::validate("file", file("a.png", b"same"), UploadKind::ArticleImage).unwrap();
    let path = upload::stage(&storage, first).await.unwrap().keep();

    let second = upload::validate("file", file("b.png", b"same"), UploadKind::ArticleImage).unwrap();
    let staged = upload::stage(&storage, second).await.unwrap();
    staged.revert(&storage, &repo).await;

    assert!(storage.contains(&path));
}

#[tokio::test]
async fn test_revert_keeps_file_committed_by_concurrent_request() {
    let storage = MockStorageService::new();
    let repo = InMemoryRepository::new();
    let author = repo
        .create_user(NewUser {
            name: "Alice".to_string(),
            email: "alice@example.com".to_string(),
            password_hash: "hash".to_string(),
            bio: None,
            avatar: None,
            role: Role::Author,
        })
        .await
        .unwrap();

    // The first request creates the file, a second one stages the same bytes.
    let first = upload::validate("file", file("a.png", b"shared"), UploadKind::ArticleImage).unwrap();
    let first = upload::stage(&storage, first).await.unwrap();
    let second = upload::validate("file", file("b.png", b"shared"), UploadKind::ArticleImage).unwrap();
    let second = upload::stage(&storage, second).await.unwrap();

    // The second commits its row, then the first one's write fails.
    let article = repo
        .create_article(NewArticle {
            title: "Shared".to_string(),
            content: "Body".to_string(),
            author_id: author.id,
            image_url: Some(second.keep()),
        })
        .await
        .unwrap();
    first.revert(&storage, &repo).await;

    let path = article.image_url.unwrap();
    assert!(repo.file_in_use(&path).await.unwrap());
    assert!(storage.contains(&path));
}

#[tokio::test]
async fn test_stage_surfaces_storage_failure() {
    let storage = MockStorageService::new_failing();
    let upload = upload::validate("file", file("a.png", b"x"), UploadKind::ArticleImage).unwrap();

    let result = upload::stage(&storage, upload).await;

    assert!(matches!(result, Err(AppError::Internal(_))));
}

// --- Retiring ---

#[tokio::test]
async fn test_retire_skips_files_still_referenced() {
    let storage = MockStorageService::new();
    let repo = InMemoryRepository::new();
    storage.put("avatars/used.png", b"a").await.unwrap();
    storage.put("avatars/orphan.png", b"b").await.unwrap();
    repo.create_user(NewUser {
        name: "Alice".to_string(),
        email: "alice@example.com".to_string(),
        password_hash: "hash".to_string(),
        bio: None,
        avatar: Some("avatars/used.png".to_string()),
        role: Role::Reader,
    })
    .await
    .unwrap();

    upload::retire_file(&storage, &repo, "avatars/used.png").await;
    upload::retire_file(&storage, &repo, "avatars/orphan.png").await;

    assert_eq!(storage.paths(), vec!["avatars/used.png".to_string()]);
}

#[tokio::test]
async fn test_retire_replaced_ignores_unchanged_path() {
    let storage = MockStorageService::new();
    let repo = InMemoryRepository::new();
    storage.put("images/a.png", b"a").await.unwrap();

    upload::retire_replaced(&storage, &repo, Some("images/a.png"), Some("images/a.png")).await;
    assert!(storage.contains("images/a.png"));

    upload::retire_replaced(&storage, &repo, Some("images/a.png"), Some("images/b.png")).await;
    assert!(!storage.contains("images/a.png"));
}

// --- Storage backends ---

#[test]
fn test_sanitize_key_strips_navigation() {
    assert_eq!(sanitize_key("../../etc/passwd"), "etc/passwd");
    assert_eq!(sanitize_key("/images/./a.png"), "images/a.png");
    assert_eq!(sanitize_key("avatars//b.jpg"), "avatars/b.jpg");
}

#[tokio::test]
async fn test_local_disk_storage_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let storage = LocalDiskStorage::new(dir.path());

    storage.ensure_layout().await.unwrap();
    assert!(dir.path().join("images").is_dir());
    assert!(dir.path().join("avatars").is_dir());

    storage.put("images/x.png", b"pixels").await.unwrap();
    assert!(storage.exists("images/x.png").await.unwrap());
    assert_eq!(std::fs::read(dir.path().join("images/x.png")).unwrap(), b"pixels");

    storage.remove("images/x.png").await.unwrap();
    assert!(!storage.exists("images/x.png").await.unwrap());
    storage.remove("images/x.png").await.unwrap();
}

#[tokio::test]
async fn test_local_disk_storage_stays_under_root() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("public");
    let storage = LocalDiskStorage::new(&root);

    storage.put("../escape.png", b"x").await.unwrap();

    assert!(root.join("escape.png").exists());
    assert!(!dir.path().join("escape.png").exists());
    assert!(storage.put("..", b"x").await.is_err());
}
