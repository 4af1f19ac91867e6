use axum::{
    Json,
    extract::State,
    http::StatusCode,
};
use uuid::Uuid;

use crate::{
    AppState,
    auth::AuthUser,
    error::AppError,
    extract::{Multipart, Path},
    models::{ArticleChanges, ArticleForm, NewArticle},
    policy::MODIFY_ARTICLE,
    response::{ApiResponse, created},
    upload::{self, MultipartForm, UploadKind},
    validation,
    views::{ArticleView, UrlBase},
};

fn not_found() -> AppError {
    AppError::NotFound("Article not found".to_string())
}

fn stale() -> AppError {
    AppError::Conflict("Article was modified concurrently, reload and retry".to_string())
}

/// list_articles
///
/// [Public Route] All articles, newest first, each with its author embedded.
#[utoipa::path(
    get,
    path = "/articles",
    responses((status = 200, description = "Articles", body = [ArticleView]))
)]
pub async fn list_articles(
    State(state): State<AppState>,
    base: UrlBase,
) -> Result<Json<ApiResponse<Vec<ArticleView>>>, AppError> {
    let articles = state.repo.list_articles().await?;
    let views = articles
        .iter()
        .map(|article| ArticleView::new(article, &base))
        .collect();
    Ok(Json(ApiResponse::ok(views)))
}

#[utoipa::path(
    get,
    path = "/articles/{id}",
    params(("id" = Uuid, Path, description = "Article ID")),
    responses(
        (status = 200, description = "Found", body = ArticleView),
        (status = 404, description = "Not Found")
    )
)]
pub async fn get_article(
    State(state): State<AppState>,
    base: UrlBase,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<ArticleView>>, AppError> {
    let article = state.repo.get_article(id).await?.ok_or_else(not_found)?;
    Ok(Json(ApiResponse::ok(ArticleView::new(&article, &base))))
}

/// create_article
///
/// [Authenticated Route] Publishes an article as the caller. The `file` part is
/// required and becomes the article image. Role is checked by the route's
/// `CREATE_ARTICLE` gate.
#[utoipa::path(
    post,
    path = "/articles",
    request_body(content = ArticleForm, content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "Created", body = ArticleView),
        (status = 400, description = "Validation failed"),
        (status = 403, description = "Role not permitted"),
        (status = 422, description = "Invalid image")
    )
)]
pub async fn create_article(
    user: AuthUser,
    State(state): State<AppState>,
    base: UrlBase,
    Multipart(multipart): Multipart,
) -> Result<(StatusCode, Json<ApiResponse<ArticleView>>), AppError> {
    let mut form = MultipartForm::collect(multipart).await?;
    let input = validation::validate_article(&form)?;
    let file = form
        .take_file("file")
        .ok_or_else(|| AppError::field("file", "An image file is required"))?;
    let image = upload::validate("file", file, UploadKind::ArticleImage)?;

    let staged = upload::stage(state.storage.as_ref(), image).await?;
    let new_article = NewArticle {
        title: input.title,
        content: input.content,
        author_id: user.id,
        image_url: Some(staged.path().to_string()),
    };

    match state.repo.create_article(new_article).await {
        Ok(article) => {
            staged.keep();
            tracing::info!(article_id = %article.id, author_id = %user.id, "article created");
            Ok(created(
                "Article created",
                ArticleView::new(&article, &base),
            ))
        }
        Err(e) => {
            tracing::error!(author_id = %user.id, error = %e, "article insert failed");
            staged.revert(state.storage.as_ref(), state.repo.as_ref()).await;
            Err(e.into())
        }
    }
}

/// update_article
///
/// [Authenticated Route] Replaces title and content, and the image when a new `file`
/// is sent. Owner or admin only. A replaced image is retired once the update commits.
#[utoipa::path(
    put,
    path = "/articles/{id}",
    params(("id" = Uuid, Path, description = "Article ID")),
    request_body(content = ArticleForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Updated", body = ArticleView),
        (status = 403, description = "Not Owner"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn update_article(
    user: AuthUser,
    State(state): State<AppState>,
    base: UrlBase,
    Path(id): Path<Uuid>,
    Multipart(multipart): Multipart,
) -> Result<Json<ApiResponse<ArticleView>>, AppError> {
    let mut form = MultipartForm::collect(multipart).await?;
    let input = validation::validate_article(&form)?;

    let existing = state.repo.get_article(id).await?.ok_or_else(not_found)?;
    MODIFY_ARTICLE.check_owner(&user, existing.author_id)?;

    let image = form
        .take_file("file")
        .map(|file| upload::validate("file", file, UploadKind::ArticleImage))
        .transpose()?;
    let staged = upload::stage_optional(state.storage.as_ref(), image).await?;

    let changes = ArticleChanges {
        title: input.title,
        content: input.content,
        image_url: staged
            .as_ref()
            .map(|s| s.path().to_string())
            .or_else(|| existing.image_url.clone()),
    };

    let updated = match state.repo.update_article(id, existing.version, changes).await {
        Ok(Some(article)) => article,
        Ok(None) => {
            upload::revert_optional(state.storage.as_ref(), state.repo.as_ref(), staged).await;
            return Err(stale());
        }
        Err(e) => {
            tracing::error!(article_id = %id, error = %e, "article update failed");
            upload::revert_optional(state.storage.as_ref(), state.repo.as_ref(), staged).await;
            return Err(e.into());
        }
    };
    if let Some(staged) = staged {
        staged.keep();
    }

    upload::retire_replaced(
        state.storage.as_ref(),
        state.repo.as_ref(),
        existing.image_url.as_deref(),
        updated.image_url.as_deref(),
    )
    .await;

    tracing::info!(article_id = %id, user_id = %user.id, "article updated");
    Ok(Json(ApiResponse::with_message(
        "Article updated",
        ArticleView::new(&updated, &base),
    )))
}

/// delete_article
///
/// [Authenticated Route] Removes an article and its comments. Owner or admin only.
#[utoipa::path(
    delete,
    path = "/articles/{id}",
    params(("id" = Uuid, Path, description = "Article ID")),
    responses(
        (status = 200, description = "Deleted"),
        (status = 403, description = "Not Owner"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn delete_article(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<()>>, AppError> {
    let existing = state.repo.get_article(id).await?.ok_or_else(not_found)?;
    MODIFY_ARTICLE.check_owner(&user, existing.author_id)?;

    if !state.repo.delete_article(id, existing.version).await? {
        return Err(stale());
    }

    if let Some(image) = existing.image_url.as_deref() {
        upload::retire_file(state.storage.as_ref(), state.repo.as_ref(), image).await;
    }

    tracing::info!(article_id = %id, user_id = %user.id, "article deleted");
    Ok(Json(ApiResponse::message("Article deleted")))
}
