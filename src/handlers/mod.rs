//! Request handlers, one module per resource. Each handler validates its input,
//! loads the target, applies the ownership half of its route policy, stages any
//! upload, writes, and shapes the response through `views`.

pub mod articles;
pub mod auth;
pub mod comments;
pub mod orders;
pub mod users;

use crate::{
    AppState,
    error::AppError,
    models::{NewUser, User},
    password::hash_password,
    repository::RepoError,
    upload::{self, ValidatedUpload},
    validation::NewAccount,
};

pub(crate) const EMAIL_TAKEN: &str = "Email is already registered";

/// Answers every path no route matches, in the usual error envelope.
pub async fn route_not_found() -> AppError {
    AppError::NotFound("Route not found".to_string())
}

/// create_account
///
/// Shared by self-service registration and admin user creation: rejects a known
/// email, hashes the password, stages the avatar and inserts the row, reverting the
/// avatar if the insert fails.
pub(crate) async fn create_account(
    state: &AppState,
    account: NewAccount,
    avatar: Option<ValidatedUpload>,
) -> Result<User, AppError> {
    if state.repo.find_user_by_email(&account.email).await?.is_some() {
        return Err(AppError::Conflict(EMAIL_TAKEN.to_string()));
    }

    let password_hash = hash_password(&account.password)?;
    let staged = upload::stage_optional(state.storage.as_ref(), avatar).await?;

    let new_user = NewUser {
        name: account.name,
        email: account.email,
        password_hash,
        bio: account.bio,
        avatar: staged.as_ref().map(|s| s.path().to_string()),
        role: account.role,
    };

    match state.repo.create_user(new_user).await {
        Ok(user) => {
            if let Some(staged) = staged {
                staged.keep();
            }
            tracing::info!(user_id = %user.id, role = user.role.as_str(), "user created");
            Ok(user)
        }
        Err(e) => {
            upload::revert_optional(state.storage.as_ref(), state.repo.as_ref(), staged).await;
            Err(map_user_write_error(e))
        }
    }
}

/// A unique violation on user writes can only be the email index.
pub(crate) fn map_user_write_error(err: RepoError) -> AppError {
    match err {
        RepoError::Duplicate(_) => AppError::Conflict(EMAIL_TAKEN.to_string()),
        other => other.into(),
    }
}
