//! Response shapes. Every row leaving the API passes through one of these, which is
//! where relative file paths become absolute URLs and where password hashes stop.

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{HeaderMap, header, request::Parts},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    config::AppConfig,
    models::{Article, Comment, Order, Role, User},
};

/// UrlBase
///
/// The `<scheme>://<host>` prefix clients used to reach this request. Honors
/// `X-Forwarded-Proto` / `X-Forwarded-Host` only when the proxy is trusted, then
/// `Host`, and falls back to `http://localhost`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlBase {
    pub scheme: String,
    pub host: String,
}

impl Default for UrlBase {
    fn default() -> Self {
        Self {
            scheme: "http".to_string(),
            host: "localhost".to_string(),
        }
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        // Proxies may append a comma-separated chain; the first hop is the client's.
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

impl UrlBase {
    pub fn from_headers(headers: &HeaderMap, trust_proxy: bool) -> Self {
        let fallback = Self::default();
        let forwarded = |name: &str| trust_proxy.then(|| header_str(headers, name)).flatten();
        let scheme = forwarded("x-forwarded-proto")
            .map(str::to_string)
            .unwrap_or(fallback.scheme);
        let host = forwarded("x-forwarded-host")
            .or_else(|| header_str(headers, header::HOST.as_str()))
            .map(str::to_string)
            .unwrap_or(fallback.host);
        Self { scheme, host }
    }

    /// Turns a stored relative path into an absolute URL. `None` stays `None`.
    pub fn absolute(&self, path: Option<&str>) -> Option<String> {
        path.map(|p| format!("{}://{}/{}", self.scheme, self.host, p.trim_start_matches('/')))
    }
}

impl<S> FromRequestParts<S> for UrlBase
where
    S: Send + Sync,
    AppConfig: FromRef<S>,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let config = AppConfig::from_ref(state);
        Ok(UrlBase::from_headers(&parts.headers, config.trust_proxy))
    }
}

// --- Users ---

/// UserView
///
/// The public projection of a user. It has no field for the password hash.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, PartialEq)]
#[ts(export)]
pub struct UserView {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub bio: Option<String>,
    pub avatar: Option<String>,
    pub role: Role,
    pub version: i32,
    pub created_at: DateTime<Utc>,
}

impl UserView {
    pub fn new(user: &User, base: &UrlBase) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            bio: user.bio.clone(),
            avatar: base.absolute(user.avatar.as_deref()),
            role: user.role,
            version: user.version,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserView,
}

// --- Articles ---

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct AuthorSummary {
    pub id: Uuid,
    pub name: String,
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct ArticleView {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    #[serde(rename = "imageUrl")]
    pub image_url: Option<String>,
    pub author: AuthorSummary,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ArticleView {
    pub fn new(article: &Article, base: &UrlBase) -> Self {
        Self {
            id: article.id,
            title: article.title.clone(),
            content: article.content.clone(),
            image_url: base.absolute(article.image_url.as_deref()),
            author: AuthorSummary {
                id: article.author_id,
                name: article.author_name.clone(),
                avatar: base.absolute(article.author_avatar.as_deref()),
            },
            version: article.version,
            created_at: article.created_at,
            updated_at: article.updated_at,
        }
    }
}

// --- Comments ---

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct CommentAuthor {
    pub id: Uuid,
    pub name: String,
    pub avatar: Option<String>,
    pub role: Role,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct CommentView {
    pub id: i64,
    pub article_id: Uuid,
    pub content: String,
    pub user: CommentAuthor,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CommentView {
    pub fn new(comment: &Comment, base: &UrlBase) -> Self {
        Self {
            id: comment.id,
            article_id: comment.article_id,
            content: comment.content.clone(),
            user: CommentAuthor {
                id: comment.user_id,
                name: comment.user_name.clone(),
                avatar: base.absolute(comment.user_avatar.as_deref()),
                role: comment.user_role,
            },
            version: comment.version,
            created_at: comment.created_at,
            updated_at: comment.updated_at,
        }
    }
}

// --- Orders ---

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct OrderView {
    pub order_id: i64,
    pub user: UserView,
    pub product_id: i64,
}

impl OrderView {
    pub fn new(order: &Order, user: UserView) -> Self {
        Self {
            order_id: order.id,
            user,
            product_id: order.product_id,
        }
    }
}
