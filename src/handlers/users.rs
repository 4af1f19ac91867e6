use axum::{
    Json,
    extract::State,
    http::StatusCode,
};
use uuid::Uuid;

use super::{EMAIL_TAKEN, create_account, map_user_write_error};
use crate::{
    AppState,
    auth::AuthUser,
    error::AppError,
    extract::{Multipart, Path},
    models::{RegisterForm, Role, UpdateUserForm, UserChanges},
    password::{hash_password, verify_password},
    policy::ACCESS_USER,
    repository::UserDeletion,
    response::{ApiResponse, created},
    upload::{self, MultipartForm, UploadKind},
    validation,
    views::{UrlBase, UserView},
};

fn not_found() -> AppError {
    AppError::NotFound("User not found".to_string())
}

fn stale() -> AppError {
    AppError::Conflict("User was modified concurrently, reload and retry".to_string())
}

/// list_users
///
/// [Admin Route] Every account, oldest first.
#[utoipa::path(
    get,
    path = "/users",
    responses(
        (status = 200, description = "Users", body = [UserView]),
        (status = 403, description = "Admin only")
    )
)]
pub async fn list_users(
    State(state): State<AppState>,
    base: UrlBase,
) -> Result<Json<ApiResponse<Vec<UserView>>>, AppError> {
    let users = state.repo.list_users().await?;
    let views = users.iter().map(|user| UserView::new(user, &base)).collect();
    Ok(Json(ApiResponse::ok(views)))
}

/// create_user
///
/// [Admin Route] Creates an account with any role. Same form as registration, with
/// only the minimum-length password rule.
#[utoipa::path(
    post,
    path = "/users",
    request_body(content = RegisterForm, content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "Created", body = UserView),
        (status = 400, description = "Validation failed or email taken"),
        (status = 403, description = "Admin only")
    )
)]
pub async fn create_user(
    State(state): State<AppState>,
    base: UrlBase,
    Multipart(multipart): Multipart,
) -> Result<(StatusCode, Json<ApiResponse<UserView>>), AppError> {
    let mut form = MultipartForm::collect(multipart).await?;
    let account = validation::validate_new_user(&form)?;
    let avatar = form
        .take_file("avatar")
        .map(|file| upload::validate("avatar", file, UploadKind::Avatar))
        .transpose()?;

    let user = create_account(&state, account, avatar).await?;
    Ok(created("User created", UserView::new(&user, &base)))
}

/// get_user
///
/// [Authenticated Route] One account. The caller must be that user or an admin; the
/// check runs before the lookup so other ids are never confirmed to exist.
#[utoipa::path(
    get,
    path = "/users/{id}",
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "Found", body = UserView),
        (status = 403, description = "Not self or admin"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn get_user(
    caller: AuthUser,
    State(state): State<AppState>,
    base: UrlBase,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<UserView>>, AppError> {
    ACCESS_USER.check_owner(&caller, id)?;
    let user = state.repo.get_user(id).await?.ok_or_else(not_found)?;
    Ok(Json(ApiResponse::ok(UserView::new(&user, &base))))
}

/// update_user
///
/// [Authenticated Route] Partial profile update by the user or an admin.
///
/// * `role` is applied only when the caller is an admin, and silently ignored otherwise.
/// * `new_password` on one's own account requires a matching `current_password`.
/// * A new `avatar` replaces the old one, which is retired after the update commits.
#[utoipa::path(
    put,
    path = "/users/{id}",
    params(("id" = Uuid, Path, description = "User ID")),
    request_body(content = UpdateUserForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Updated", body = UserView),
        (status = 401, description = "Current password incorrect"),
        (status = 403, description = "Not self or admin"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn update_user(
    caller: AuthUser,
    State(state): State<AppState>,
    base: UrlBase,
    Path(id): Path<Uuid>,
    Multipart(multipart): Multipart,
) -> Result<Json<ApiResponse<UserView>>, AppError> {
    ACCESS_USER.check_owner(&caller, id)?;

    let mut form = MultipartForm::collect(multipart).await?;
    let update = validation::validate_user_update(&form)?;

    let existing = state.repo.get_user(id).await?.ok_or_else(not_found)?;

    let role = match update.role {
        Some(role) if caller.role == Role::Admin => role,
        Some(requested) => {
            tracing::debug!(user_id = %caller.id, requested = requested.as_str(), "ignoring role change from non-admin");
            existing.role
        }
        None => existing.role,
    };

    let password_hash = match update.new_password.as_deref() {
        Some(new_password) => {
            if caller.id == id {
                let current = update.current_password.as_deref().ok_or_else(|| {
                    AppError::field("current_password", "Current password is required")
                })?;
                if !verify_password(current, &existing.password_hash) {
                    return Err(AppError::Unauthenticated("current password is incorrect"));
                }
            }
            hash_password(new_password)?
        }
        None => existing.password_hash.clone(),
    };

    let email = update.email.unwrap_or_else(|| existing.email.clone());
    if email != existing.email && state.repo.find_user_by_email(&email).await?.is_some() {
        return Err(AppError::Conflict(EMAIL_TAKEN.to_string()));
    }

    let avatar = form
        .take_file("avatar")
        .map(|file| upload::validate("avatar", file, UploadKind::Avatar))
        .transpose()?;
    let staged = upload::stage_optional(state.storage.as_ref(), avatar).await?;

    let changes = UserChanges {
        name: update.name.unwrap_or_else(|| existing.name.clone()),
        email,
        password_hash,
        bio: update.bio.unwrap_or_else(|| existing.bio.clone()),
        avatar: staged
            .as_ref()
            .map(|s| s.path().to_string())
            .or_else(|| existing.avatar.clone()),
        role,
    };

    let updated = match state.repo.update_user(id, existing.version, changes).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            upload::revert_optional(state.storage.as_ref(), state.repo.as_ref(), staged).await;
            return Err(stale());
        }
        Err(e) => {
            tracing::error!(user_id = %id, error = %e, "user update failed");
            upload::revert_optional(state.storage.as_ref(), state.repo.as_ref(), staged).await;
            return Err(map_user_write_error(e));
        }
    };
    if let Some(staged) = staged {
        staged.keep();
    }

    upload::retire_replaced(
        state.storage.as_ref(),
        state.repo.as_ref(),
        existing.avatar.as_deref(),
        updated.avatar.as_deref(),
    )
    .await;

    tracing::info!(user_id = %id, by = %caller.id, "user updated");
    Ok(Json(ApiResponse::with_message(
        "User updated",
        UserView::new(&updated, &base),
    )))
}

/// delete_user
///
/// [Admin Route] Deletes an account together with its comments and orders. Refused
/// while the user still authors any article.
#[utoipa::path(
    delete,
    path = "/users/{id}",
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "Deleted"),
        (status = 400, description = "User owns articles"),
        (status = 403, description = "Admin only"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn delete_user(
    caller: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<()>>, AppError> {
    let existing = state.repo.get_user(id).await?.ok_or_else(not_found)?;

    match state.repo.delete_user(id, existing.version).await? {
        UserDeletion::Deleted => {}
        UserDeletion::OwnsArticles => {
            return Err(AppError::Conflict(
                "User still owns articles and cannot be deleted".to_string(),
            ));
        }
        UserDeletion::Stale => return Err(stale()),
    }

    if let Some(avatar) = existing.avatar.as_deref() {
        upload::retire_file(state.storage.as_ref(), state.repo.as_ref(), avatar).await;
    }

    tracing::info!(user_id = %id, by = %caller.id, "user deleted");
    Ok(Json(ApiResponse::message("User deleted")))
}
