use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::{
    collections::HashMap,
    sync::{
        Mutex, MutexGuard,
        atomic::{AtomicBool, Ordering},
    },
};
use uuid::Uuid;

use super::{RepoError, Repository, UserDeletion};
use crate::models::{
    Article, ArticleChanges, Comment, NewArticle, NewComment, NewUser, Order, User, UserChanges,
};

#[derive(Clone)]
struct ArticleRow {
    id: Uuid,
    title: String,
    content: String,
    author_id: Uuid,
    image_url: Option<String>,
    version: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Clone)]
struct CommentRow {
    id: i64,
    article_id: Uuid,
    user_id: Uuid,
    content: String,
    version: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    // Insertion order doubles as the tie-breaker for equal timestamps.
    articles: Vec<ArticleRow>,
    comments: Vec<CommentRow>,
    orders: Vec<Order>,
    next_comment_id: i64,
    next_order_id: i64,
}

impl Tables {
    fn join_article(&self, row: &ArticleRow) -> Option<Article> {
        let author = self.users.get(&row.author_id)?;
        Some(Article {
            id: row.id,
            title: row.title.clone(),
            content: row.content.clone(),
            author_id: row.author_id,
            image_url: row.image_url.clone(),
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
            author_name: author.name.clone(),
            author_avatar: author.avatar.clone(),
        })
    }

    fn join_comment(&self, row: &CommentRow) -> Option<Comment> {
        let user = self.users.get(&row.user_id)?;
        Some(Comment {
            id: row.id,
            article_id: row.article_id,
            user_id: row.user_id,
            content: row.content.clone(),
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
            user_name: user.name.clone(),
            user_avatar: user.avatar.clone(),
            user_role: user.role,
        })
    }

    fn email_taken(&self, email: &str, except: Option<Uuid>) -> bool {
        self.users
            .values()
            .any(|u| u.email == email && Some(u.id) != except)
    }
}

/// InMemoryRepository
///
/// A `Repository` held entirely in process memory. It mirrors the Postgres schema's
/// rules (unique email, restricted author deletion, cascading comments, versioned
/// writes) so handler tests exercise the same outcomes without a database.
#[derive(Default)]
pub struct InMemoryRepository {
    tables: Mutex<Tables>,
    fail_writes: AtomicBool,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent write fail with a database error until reset.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn user_count(&self) -> usize {
        self.lock().users.len()
    }

    pub fn order_count(&self) -> usize {
        self.lock().orders.len()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_writable(&self) -> Result<(), RepoError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(RepoError::Database(sqlx::Error::Protocol(
                "simulated write failure".to_string(),
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn get_user(&self, id: Uuid) -> Result<Option<User>, RepoError> {
        Ok(self.lock().users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, RepoError> {
        Ok(self.lock().users.values().find(|u| u.email == email).cloned())
    }

    async fn list_users(&self) -> Result<Vec<User>, RepoError> {
        let mut users: Vec<User> = self.lock().users.values().cloned().collect();
        users.sort_by_key(|u| u.created_at);
        Ok(users)
    }

    async fn create_user(&self, user: NewUser) -> Result<User, RepoError> {
        self.check_writable()?;
        let mut tables = self.lock();
        if tables.email_taken(&user.email, None) {
            return Err(RepoError::Duplicate("users_email_key".to_string()));
        }
        let now = Utc::now();
        let created = User {
            id: Uuid::new_v4(),
            name: user.name,
            email: user.email,
            password_hash: user.password_hash,
            bio: user.bio,
            avatar: user.avatar,
            role: user.role,
            version: 1,
            created_at: now,
            updated_at: now,
        };
        tables.users.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update_user(
        &self,
        id: Uuid,
        version: i32,
        changes: UserChanges,
    ) -> Result<Option<User>, RepoError> {
        self.check_writable()?;
        let mut tables = self.lock();
        if tables.email_taken(&changes.email, Some(id)) {
            return Err(RepoError::Duplicate("users_email_key".to_string()));
        }
        let Some(user) = tables.users.get_mut(&id).filter(|u| u.version == version) else {
            return Ok(None);
        };
        user.name = changes.name;
        user.email = changes.email;
        user.password_hash = changes.password_hash;
        user.bio = changes.bio;
        user.avatar = changes.avatar;
        user.role = changes.role;
        user.version += 1;
        user.updated_at = Utc::now();
        Ok(Some(user.clone()))
    }

    async fn delete_user(&self, id: Uuid, version: i32) -> Result<UserDeletion, RepoError> {
        self.check_writable()?;
        let mut tables = self.lock();
        if tables.articles.iter().any(|a| a.author_id == id) {
            return Ok(UserDeletion::OwnsArticles);
        }
        if !tables.users.get(&id).is_some_and(|u| u.version == version) {
            return Ok(UserDeletion::Stale);
        }
        tables.users.remove(&id);
        tables.comments.retain(|c| c.user_id != id);
        tables.orders.retain(|o| o.user_id != id);
        Ok(UserDeletion::Deleted)
    }

    async fn file_in_use(&self, path: &str) -> Result<bool, RepoError> {
        let tables = self.lock();
        Ok(tables.users.values().any(|u| u.avatar.as_deref() == Some(path))
            || tables
                .articles
                .iter()
                .any(|a| a.image_url.as_deref() == Some(path)))
    }

    async fn list_articles(&self) -> Result<Vec<Article>, RepoError> {
        let tables = self.lock();
        let mut articles: Vec<Article> = tables
            .articles
            .iter()
            .rev()
            .filter_map(|row| tables.join_article(row))
            .collect();
        // Stable sort keeps later inserts first among equal timestamps.
        articles.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(articles)
    }

    async fn get_article(&self, id: Uuid) -> Result<Option<Article>, RepoError> {
        let tables = self.lock();
        Ok(tables
            .articles
            .iter()
            .find(|a| a.id == id)
            .and_then(|row| tables.join_article(row)))
    }

    async fn create_article(&self, article: NewArticle) -> Result<Article, RepoError> {
        self.check_writable()?;
        let mut tables = self.lock();
        if !tables.users.contains_key(&article.author_id) {
            return Err(RepoError::Database(sqlx::Error::Protocol(
                "articles_author_id_fkey".to_string(),
            )));
        }
        let now = Utc::now();
        let row = ArticleRow {
            id: Uuid::new_v4(),
            title: article.title,
            content: article.content,
            author_id: article.author_id,
            image_url: article.image_url,
            version: 1,
            created_at: now,
            updated_at: now,
        };
        tables.articles.push(row.clone());
        tables
            .join_article(&row)
            .ok_or_else(|| RepoError::Database(sqlx::Error::RowNotFound))
    }

    async fn update_article(
        &self,
        id: Uuid,
        version: i32,
        changes: ArticleChanges,
    ) -> Result<Option<Article>, RepoError> {
        self.check_writable()?;
        let mut tables = self.lock();
        let Some(row) = tables
            .articles
            .iter_mut()
            .find(|a| a.id == id && a.version == version)
        else {
            return Ok(None);
        };
        row.title = changes.title;
        row.content = changes.content;
        row.image_url = changes.image_url;
        row.version += 1;
        row.updated_at = Utc::now();
        let row = row.clone();
        Ok(tables.join_article(&row))
    }

    async fn delete_article(&self, id: Uuid, version: i32) -> Result<bool, RepoError> {
        self.check_writable()?;
        let mut tables = self.lock();
        let before = tables.articles.len();
        tables
            .articles
            .retain(|a| !(a.id == id && a.version == version));
        let deleted = tables.articles.len() < before;
        if deleted {
            tables.comments.retain(|c| c.article_id != id);
        }
        Ok(deleted)
    }

    async fn get_comment(&self, id: i64) -> Result<Option<Comment>, RepoError> {
        let tables = self.lock();
        Ok(tables
            .comments
            .iter()
            .find(|c| c.id == id)
            .and_then(|row| tables.join_comment(row)))
    }

    async fn list_comments(&self, article_id: Uuid) -> Result<Vec<Comment>, RepoError> {
        let tables = self.lock();
        let mut comments: Vec<Comment> = tables
            .comments
            .iter()
            .rev()
            .filter(|c| c.article_id == article_id)
            .filter_map(|row| tables.join_comment(row))
            .collect();
        comments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(comments)
    }

    async fn create_comment(&self, comment: NewComment) -> Result<Comment, RepoError> {
        self.check_writable()?;
        let mut tables = self.lock();
        tables.next_comment_id += 1;
        let now = Utc::now();
        let row = CommentRow {
            id: tables.next_comment_id,
            article_id: comment.article_id,
            user_id: comment.user_id,
            content: comment.content,
            version: 1,
            created_at: now,
            updated_at: now,
        };
        tables.comments.push(row.clone());
        tables
            .join_comment(&row)
            .ok_or_else(|| RepoError::Database(sqlx::Error::RowNotFound))
    }

    async fn update_comment(
        &self,
        id: i64,
        version: i32,
        content: String,
    ) -> Result<Option<Comment>, RepoError> {
        self.check_writable()?;
        let mut tables = self.lock();
        let Some(row) = tables
            .comments
            .iter_mut()
            .find(|c| c.id == id && c.version == version)
        else {
            return Ok(None);
        };
        row.content = content;
        row.version += 1;
        row.updated_at = Utc::now();
        let row = row.clone();
        Ok(tables.join_comment(&row))
    }

    async fn delete_comment(&self, id: i64, version: i32) -> Result<bool, RepoError> {
        self.check_writable()?;
        let mut tables = self.lock();
        let before = tables.comments.len();
        tables
            .comments
            .retain(|c| !(c.id == id && c.version == version));
        Ok(tables.comments.len() < before)
    }

    async fn create_order(&self, user_id: Uuid, product_id: i64) -> Result<Order, RepoError> {
        self.check_writable()?;
        let mut tables = self.lock();
        tables.next_order_id += 1;
        let order = Order {
            id: tables.next_order_id,
            user_id,
            product_id,
            created_at: Utc::now(),
        };
        tables.orders.push(order.clone());
        Ok(order)
    }
}
