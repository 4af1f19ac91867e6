use axum::{Json, extract::State, http::StatusCode};
use uuid::Uuid;

use crate::{
    AppState,
    auth::AuthUser,
    error::AppError,
    extract::{JsonBody, Path},
    models::{CreateCommentRequest, NewComment, UpdateCommentRequest},
    policy::MODIFY_COMMENT,
    response::{ApiResponse, created},
    validation,
    views::{CommentView, UrlBase},
};

fn not_found() -> AppError {
    AppError::NotFound("Comment not found".to_string())
}

fn article_not_found() -> AppError {
    AppError::NotFound("Article not found".to_string())
}

fn stale() -> AppError {
    AppError::Conflict("Comment was modified concurrently, reload and retry".to_string())
}

/// list_comments
///
/// [Public Route] Comments on one article, newest first, each with its author's
/// public fields.
#[utoipa::path(
    get,
    path = "/articles/{id}/comments",
    params(("id" = Uuid, Path, description = "Article ID")),
    responses(
        (status = 200, description = "Comments", body = [CommentView]),
        (status = 404, description = "Article Not Found")
    )
)]
pub async fn list_comments(
    State(state): State<AppState>,
    base: UrlBase,
    Path(article_id): Path<Uuid>,
) -> Result<Json<ApiResponse<Vec<CommentView>>>, AppError> {
    if state.repo.get_article(article_id).await?.is_none() {
        return Err(article_not_found());
    }
    let comments = state.repo.list_comments(article_id).await?;
    let views = comments
        .iter()
        .map(|comment| CommentView::new(comment, &base))
        .collect();
    Ok(Json(ApiResponse::ok(views)))
}

/// create_comment
///
/// [Authenticated Route] Posts a comment on an existing article as the caller.
#[utoipa::path(
    post,
    path = "/comments",
    request_body = CreateCommentRequest,
    responses(
        (status = 201, description = "Comment Added", body = CommentView),
        (status = 404, description = "Article Not Found")
    )
)]
pub async fn create_comment(
    user: AuthUser,
    State(state): State<AppState>,
    base: UrlBase,
    JsonBody(payload): JsonBody<CreateCommentRequest>,
) -> Result<(StatusCode, Json<ApiResponse<CommentView>>), AppError> {
    let (article_id, content) = validation::validate_new_comment(&payload)?;

    if state.repo.get_article(article_id).await?.is_none() {
        return Err(article_not_found());
    }

    let comment = state
        .repo
        .create_comment(NewComment {
            article_id,
            user_id: user.id,
            content,
        })
        .await?;

    tracing::info!(comment_id = comment.id, article_id = %article_id, user_id = %user.id, "comment added");
    Ok(created("Comment added", CommentView::new(&comment, &base)))
}

/// update_comment
///
/// [Authenticated Route] Edits a comment. Only its author may do so; admins included.
#[utoipa::path(
    put,
    path = "/comments/{id}",
    params(("id" = i64, Path, description = "Comment ID")),
    request_body = UpdateCommentRequest,
    responses(
        (status = 200, description = "Updated", body = CommentView),
        (status = 403, description = "Not Owner"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn update_comment(
    user: AuthUser,
    State(state): State<AppState>,
    base: UrlBase,
    Path(id): Path<i64>,
    JsonBody(payload): JsonBody<UpdateCommentRequest>,
) -> Result<Json<ApiResponse<CommentView>>, AppError> {
    let content = validation::validate_comment_content(&payload.content)?;

    let existing = state.repo.get_comment(id).await?.ok_or_else(not_found)?;
    MODIFY_COMMENT.check_owner(&user, existing.user_id)?;

    let updated = state
        .repo
        .update_comment(id, existing.version, content)
        .await?
        .ok_or_else(stale)?;

    tracing::info!(comment_id = id, user_id = %user.id, "comment updated");
    Ok(Json(ApiResponse::with_message(
        "Comment updated",
        CommentView::new(&updated, &base),
    )))
}

#[utoipa::path(
    delete,
    path = "/comments/{id}",
    params(("id" = i64, Path, description = "Comment ID")),
    responses(
        (status = 200, description = "Deleted"),
        (status = 403, description = "Not Owner"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn delete_comment(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<()>>, AppError> {
    let existing = state.repo.get_comment(id).await?.ok_or_else(not_found)?;
    MODIFY_COMMENT.check_owner(&user, existing.user_id)?;

    if !state.repo.delete_comment(id, existing.version).await? {
        return Err(stale());
    }

    tracing::info!(comment_id = id, user_id = %user.id, "comment deleted");
    Ok(Json(ApiResponse::message("Comment deleted")))
}
