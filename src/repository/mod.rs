use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    Article, ArticleChanges, Comment, NewArticle, NewComment, NewUser, Order, User, UserChanges,
};

mod memory;
mod postgres;

pub use memory::InMemoryRepository;
pub use postgres::PostgresRepository;

/// RepoError
///
/// Persistence failures as seen by handlers: a unique-constraint hit, or anything else.
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("unique constraint violated: {0}")]
    Duplicate(String),
    #[error(transparent)]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for RepoError {
    fn from(err: sqlx::Error) -> Self {
        if let Some(db_err) = err.as_database_error() {
            if db_err.is_unique_violation() {
                let constraint = db_err.constraint().unwrap_or("unknown").to_string();
                return RepoError::Duplicate(constraint);
            }
        }
        RepoError::Database(err)
    }
}

/// Outcome of a guarded user deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserDeletion {
    Deleted,
    /// The user still authors at least one article; nothing was removed.
    OwnsArticles,
    /// The row changed (or vanished) since it was read.
    Stale,
}

/// Repository Trait
///
/// The abstract contract for all persistence operations. Handlers only see this
/// trait, so the Postgres implementation and the in-memory test double are
/// interchangeable.
///
/// Every `update_*`/`delete_*` takes the `version` the caller read. The write only
/// applies when the stored version still matches, and reports `None`/`false`
/// otherwise (optimistic concurrency).
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Users ---
    async fn get_user(&self, id: Uuid) -> Result<Option<User>, RepoError>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, RepoError>;
    async fn list_users(&self) -> Result<Vec<User>, RepoError>;
    async fn create_user(&self, user: NewUser) -> Result<User, RepoError>;
    async fn update_user(
        &self,
        id: Uuid,
        version: i32,
        changes: UserChanges,
    ) -> Result<Option<User>, RepoError>;
    async fn delete_user(&self, id: Uuid, version: i32) -> Result<UserDeletion, RepoError>;

    /// True when any user avatar or article image still points at `path`.
    async fn file_in_use(&self, path: &str) -> Result<bool, RepoError>;

    // --- Articles ---
    // Newest first, author fields joined.
    async fn list_articles(&self) -> Result<Vec<Article>, RepoError>;
    async fn get_article(&self, id: Uuid) -> Result<Option<Article>, RepoError>;
    async fn create_article(&self, article: NewArticle) -> Result<Article, RepoError>;
    async fn update_article(
        &self,
        id: Uuid,
        version: i32,
        changes: ArticleChanges,
    ) -> Result<Option<Article>, RepoError>;
    async fn delete_article(&self, id: Uuid, version: i32) -> Result<bool, RepoError>;

    // --- Comments ---
    async fn get_comment(&self, id: i64) -> Result<Option<Comment>, RepoError>;
    // Newest first.
    async fn list_comments(&self, article_id: Uuid) -> Result<Vec<Comment>, RepoError>;
    async fn create_comment(&self, comment: NewComment) -> Result<Comment, RepoError>;
    async fn update_comment(
        &self,
        id: i64,
        version: i32,
        content: String,
    ) -> Result<Option<Comment>, RepoError>;
    async fn delete_comment(&self, id: i64, version: i32) -> Result<bool, RepoError>;

    // --- Orders ---
    async fn create_order(&self, user_id: Uuid, product_id: i64) -> Result<Order, RepoError>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn Repository>;
