use axum::{
    extract::{FromRef, FromRequestParts, Request},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    error::AppError,
    models::Role,
    repository::{Repository, RepositoryState},
    token::TokenService,
};

/// AuthUser Extractor Result
///
/// The resolved identity of an authenticated request. The role is the one currently
/// stored for the user, not the one embedded in the token at issuance.
#[derive(Debug, Clone, Serialize)]
pub struct AuthUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
}

/// resolve_bearer
///
/// Turns a raw `Authorization` header value into an `AuthUser`:
/// 1. Token Extraction: the value must be `Bearer <token>`.
/// 2. Token Validation: signature and expiry.
/// 3. DB Lookup: the subject must still exist.
///
/// Shared by the extractor and by the in-process user lookup used for orders.
pub async fn resolve_bearer(
    repo: &dyn Repository,
    tokens: &TokenService,
    authorization: Option<&str>,
) -> Result<AuthUser, AppError> {
    let token = authorization
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or(AppError::Unauthenticated("no token"))?;

    let claims = tokens.verify(token).map_err(|e| {
        tracing::debug!(error = %e, "bearer token rejected");
        AppError::Unauthenticated("invalid or expired token")
    })?;

    let user = repo
        .get_user(claims.sub)
        .await?
        .ok_or(AppError::Unauthenticated("user not found"))?;

    Ok(AuthUser {
        id: user.id,
        name: user.name,
        email: user.email,
        role: user.role,
    })
}

/// AuthUser Extractor Implementation
///
/// Reuses the identity attached by `auth_middleware` when present, so the token is
/// verified and the user loaded once per request. Otherwise resolves it from the
/// `Authorization` header.
///
/// Rejection: `AppError::Unauthenticated` (401) on any failure.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    TokenService: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<AuthUser>() {
            return Ok(user.clone());
        }

        let repo = RepositoryState::from_ref(state);
        let tokens = TokenService::from_ref(state);

        let authorization = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok());

        resolve_bearer(repo.as_ref(), &tokens, authorization).await
    }
}

/// auth_middleware
///
/// Enforces authentication for the routes it layers. If the `AuthUser` extractor
/// rejects, the handler never runs. On success the identity is attached to the
/// request extensions for the authorization gate and the handler.
pub async fn auth_middleware(auth_user: AuthUser, mut request: Request, next: Next) -> Response {
    tracing::debug!(user_id = %auth_user.id, role = auth_user.role.as_str(), "request authenticated");
    request.extensions_mut().insert(auth_user);
    next.run(request).await
}
