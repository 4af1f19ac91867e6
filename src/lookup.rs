use async_trait::async_trait;
use axum::http::{StatusCode, header};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::{
    auth::resolve_bearer,
    error::AppError,
    policy::ACCESS_USER,
    repository::RepositoryState,
    response::ApiResponse,
    token::TokenService,
    views::{UrlBase, UserView},
};

/// CallerContext
///
/// What a cross-resource lookup needs to know about the request that triggered it:
/// the caller's credentials (forwarded as-is) and the address the caller used, so
/// URLs in the returned user are shaped for that caller.
#[derive(Debug, Clone)]
pub struct CallerContext {
    pub authorization: Option<String>,
    pub base: UrlBase,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LookupError {
    #[error("user not found")]
    NotFound,
    #[error("{0}")]
    Unauthenticated(&'static str),
    #[error("access to user denied")]
    Forbidden,
    #[error("user lookup failed: {0}")]
    Upstream(String),
}

impl From<LookupError> for AppError {
    fn from(err: LookupError) -> Self {
        match err {
            LookupError::NotFound => AppError::NotFound("User not found".to_string()),
            LookupError::Unauthenticated(message) => AppError::Unauthenticated(message),
            LookupError::Forbidden => AppError::Forbidden("Access denied".to_string()),
            LookupError::Upstream(detail) => AppError::Internal(detail),
        }
    }
}

/// UserLookup
///
/// Fetches a user on behalf of another resource, with the caller's own access rights.
/// Either answered in-process or by calling the users endpoint over HTTP.
#[async_trait]
pub trait UserLookup: Send + Sync {
    async fn fetch_user(&self, id: Uuid, caller: &CallerContext) -> Result<UserView, LookupError>;
}

pub type UserLookupState = Arc<dyn UserLookup>;

// --- In-process ---

/// DirectUserLookup
///
/// Applies the same rules as `GET /users/{id}` without leaving the process: the
/// forwarded bearer token is resolved by the authentication code, then `ACCESS_USER`
/// decides whether the caller may see the target.
pub struct DirectUserLookup {
    repo: RepositoryState,
    tokens: TokenService,
}

impl DirectUserLookup {
    pub fn new(repo: RepositoryState, tokens: TokenService) -> Self {
        Self { repo, tokens }
    }
}

#[async_trait]
impl UserLookup for DirectUserLookup {
    async fn fetch_user(&self, id: Uuid, caller: &CallerContext) -> Result<UserView, LookupError> {
        let requester = resolve_bearer(
            self.repo.as_ref(),
            &self.tokens,
            caller.authorization.as_deref(),
        )
        .await
        .map_err(|e| match e {
            AppError::Unauthenticated(message) => LookupError::Unauthenticated(message),
            other => LookupError::Upstream(other.to_string()),
        })?;

        ACCESS_USER
            .check_role(&requester)
            .and_then(|_| ACCESS_USER.check_owner(&requester, id))
            .map_err(|_| LookupError::Forbidden)?;

        let user = self
            .repo
            .get_user(id)
            .await
            .map_err(|e| LookupError::Upstream(e.to_string()))?
            .ok_or(LookupError::NotFound)?;

        Ok(UserView::new(&user, &caller.base))
    }
}

// --- Over HTTP ---

/// HttpUserLookup
///
/// Calls `GET {base_url}/users/{id}`, forwarding the caller's `Authorization` header
/// and its scheme/host as `X-Forwarded-Proto`/`X-Forwarded-Host`.
pub struct HttpUserLookup {
    client: reqwest::Client,
    base_url: String,
}

impl HttpUserLookup {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

/// Maps the message of an upstream 401 back onto the fixed vocabulary.
fn unauthenticated_reason(message: Option<&str>) -> &'static str {
    match message {
        Some("no token") => "no token",
        Some("user not found") => "user not found",
        _ => "invalid or expired token",
    }
}

#[async_trait]
impl UserLookup for HttpUserLookup {
    async fn fetch_user(&self, id: Uuid, caller: &CallerContext) -> Result<UserView, LookupError> {
        let url = format!("{}/users/{}", self.base_url, id);

        let mut request = self
            .client
            .get(&url)
            .header("X-Forwarded-Host", &caller.base.host)
            .header("X-Forwarded-Proto", &caller.base.scheme);
        if let Some(authorization) = &caller.authorization {
            request = request.header(header::AUTHORIZATION, authorization);
        }

        let response = request.send().await.map_err(|e| {
            tracing::error!(url = %url, error = %e, "user lookup request failed");
            LookupError::Upstream(format!("request to {url} failed: {e}"))
        })?;

        let status = response.status();
        match status {
            StatusCode::OK => {
                let body = response
                    .json::<ApiResponse<UserView>>()
                    .await
                    .map_err(|e| LookupError::Upstream(format!("malformed user response: {e}")))?;
                body.data
                    .ok_or_else(|| LookupError::Upstream("user response had no data".to_string()))
            }
            StatusCode::NOT_FOUND => Err(LookupError::NotFound),
            StatusCode::FORBIDDEN => Err(LookupError::Forbidden),
            StatusCode::UNAUTHORIZED => {
                let body = response.json::<ApiResponse<()>>().await.ok();
                let message = body.as_ref().and_then(|b| b.message.as_deref());
                Err(LookupError::Unauthenticated(unauthenticated_reason(message)))
            }
            other => {
                tracing::warn!(url = %url, status = %other, "unexpected user lookup status");
                Err(LookupError::Upstream(format!(
                    "user lookup returned {other}"
                )))
            }
        }
    }
}
