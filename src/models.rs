use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

// --- Role Vocabulary ---

/// Role
///
/// The single permission vocabulary used across every route and policy.
/// Stored in Postgres as the `user_role` enum and serialized in lowercase.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS, ToSchema, sqlx::Type, Default,
)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum Role {
    #[default]
    Reader,
    Author,
    Editor,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Reader => "reader",
            Role::Author => "author",
            Role::Editor => "editor",
            Role::Admin => "admin",
        }
    }

    /// Parses a role name as submitted in a form field (case-insensitive).
    pub fn parse(value: &str) -> Option<Role> {
        match value.trim().to_ascii_lowercase().as_str() {
            "reader" => Some(Role::Reader),
            "author" => Some(Role::Author),
            "editor" => Some(Role::Editor),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }

    /// Roles a visitor may pick for themselves at registration.
    pub fn is_self_assignable(&self) -> bool {
        matches!(self, Role::Reader | Role::Author)
    }
}

// --- Core Application Schemas (Mapped to Database) ---

/// User
///
/// The canonical credential record from the `users` table. This struct carries the
/// password hash and is therefore never serialized; responses go through `views::UserView`.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub bio: Option<String>,
    // Relative path under the static root, e.g. `avatars/<hash>.png`.
    pub avatar: Option<String>,
    pub role: Role,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Article
///
/// An `articles` row joined with the author's display fields.
#[derive(Debug, Clone, FromRow)]
pub struct Article {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub author_id: Uuid,
    pub image_url: Option<String>,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    // Loaded via JOIN on users.
    pub author_name: String,
    pub author_avatar: Option<String>,
}

/// Comment
///
/// A `comments` row joined with the commenter's public fields (never the hash).
#[derive(Debug, Clone, FromRow)]
pub struct Comment {
    pub id: i64,
    pub article_id: Uuid,
    pub user_id: Uuid,
    pub content: String,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub user_name: String,
    pub user_avatar: Option<String>,
    pub user_role: Role,
}

#[derive(Debug, Clone, FromRow)]
pub struct Order {
    pub id: i64,
    pub user_id: Uuid,
    pub product_id: i64,
    pub created_at: DateTime<Utc>,
}

// --- Write Models (Repository Inputs) ---

#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub bio: Option<String>,
    pub avatar: Option<String>,
    pub role: Role,
}

/// UserChanges
///
/// Full replacement values for an update. The handler merges the request with the
/// loaded row, so every field here is already resolved.
#[derive(Debug, Clone)]
pub struct UserChanges {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub bio: Option<String>,
    pub avatar: Option<String>,
    pub role: Role,
}

#[derive(Debug, Clone)]
pub struct NewArticle {
    pub title: String,
    pub content: String,
    pub author_id: Uuid,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ArticleChanges {
    pub title: String,
    pub content: String,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewComment {
    pub article_id: Uuid,
    pub user_id: Uuid,
    pub content: String,
}

// --- Request Payloads (JSON Input Schemas) ---

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// CreateCommentRequest
///
/// `article_id` is optional at the type level so a missing value is reported as a
/// field error instead of a deserialization rejection.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreateCommentRequest {
    pub article_id: Option<Uuid>,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdateCommentRequest {
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreateOrderRequest {
    pub user_id: Option<Uuid>,
    pub product_id: Option<i64>,
}

// --- Multipart Form Schemas (documentation only) ---

/// RegisterForm
///
/// Shape of the `multipart/form-data` body accepted by `POST /auth/register`
/// and `POST /users`.
#[derive(Debug, ToSchema)]
#[allow(dead_code)]
pub struct RegisterForm {
    pub name: String,
    pub email: String,
    pub password: String,
    pub bio: Option<String>,
    pub role: Option<Role>,
    #[schema(value_type = Option<String>, format = Binary)]
    pub avatar: Option<Vec<u8>>,
}

#[derive(Debug, ToSchema)]
#[allow(dead_code)]
pub struct UpdateUserForm {
    pub name: Option<String>,
    pub email: Option<String>,
    pub bio: Option<String>,
    pub role: Option<Role>,
    pub current_password: Option<String>,
    pub new_password: Option<String>,
    #[schema(value_type = Option<String>, format = Binary)]
    pub avatar: Option<Vec<u8>>,
}

#[derive(Debug, ToSchema)]
#[allow(dead_code)]
pub struct ArticleForm {
    pub title: String,
    pub content: String,
    #[schema(value_type = String, format = Binary)]
    pub file: Vec<u8>,
}
