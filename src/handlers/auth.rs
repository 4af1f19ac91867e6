use axum::{
    Json,
    extract::State,
    http::StatusCode,
};

use super::create_account;
use crate::{
    AppState,
    auth::AuthUser,
    error::AppError,
    extract::{JsonBody, Multipart},
    models::{LoginRequest, RegisterForm},
    password::verify_password,
    response::{ApiResponse, created},
    upload::{self, MultipartForm, UploadKind},
    validation,
    views::{LoginResponse, UrlBase, UserView},
};

const BAD_CREDENTIALS: &str = "invalid email or password";

/// register
///
/// [Public Route] Self-service signup from a `multipart/form-data` body with an
/// optional `avatar` file. Only the `reader` and `author` roles can be chosen here.
#[utoipa::path(
    post,
    path = "/auth/register",
    request_body(content = RegisterForm, content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "Registered", body = UserView),
        (status = 400, description = "Validation failed or email taken"),
        (status = 422, description = "Invalid avatar file")
    )
)]
pub async fn register(
    State(state): State<AppState>,
    base: UrlBase,
    Multipart(multipart): Multipart,
) -> Result<(StatusCode, Json<ApiResponse<UserView>>), AppError> {
    let mut form = MultipartForm::collect(multipart).await?;
    let account = validation::validate_registration(&form)?;
    let avatar = form
        .take_file("avatar")
        .map(|file| upload::validate("avatar", file, UploadKind::Avatar))
        .transpose()?;

    let user = create_account(&state, account, avatar).await?;
    Ok(created("Registration successful", UserView::new(&user, &base)))
}

/// login
///
/// [Public Route] Exchanges email and password for a bearer token. Unknown email and
/// wrong password produce the same response.
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = LoginResponse),
        (status = 401, description = "Invalid credentials")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    base: UrlBase,
    JsonBody(payload): JsonBody<LoginRequest>,
) -> Result<Json<ApiResponse<LoginResponse>>, AppError> {
    let (email, password) = validation::validate_login(&payload)?;

    let Some(user) = state.repo.find_user_by_email(&email).await? else {
        tracing::info!("login rejected: unknown email");
        return Err(AppError::Unauthenticated(BAD_CREDENTIALS));
    };
    if !verify_password(&password, &user.password_hash) {
        tracing::info!(user_id = %user.id, "login rejected: wrong password");
        return Err(AppError::Unauthenticated(BAD_CREDENTIALS));
    }

    let token = state
        .tokens
        .issue(&user)
        .map_err(|e| AppError::Internal(e.to_string()))?;

    tracing::info!(user_id = %user.id, "user logged in");
    Ok(Json(ApiResponse::with_message(
        "Login successful",
        LoginResponse {
            token,
            user: UserView::new(&user, &base),
        },
    )))
}

/// me
///
/// [Authenticated Route] The caller's own profile.
#[utoipa::path(
    get,
    path = "/auth/me",
    responses(
        (status = 200, description = "Current user", body = UserView),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn me(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
    base: UrlBase,
) -> Result<Json<ApiResponse<UserView>>, AppError> {
    let user = state
        .repo
        .get_user(id)
        .await?
        .ok_or(AppError::Unauthenticated("user not found"))?;
    Ok(Json(ApiResponse::ok(UserView::new(&user, &base))))
}
