use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::{RepoError, Repository, UserDeletion};
use crate::models::{
    Article, ArticleChanges, Comment, NewArticle, NewComment, NewUser, Order, User, UserChanges,
};

const USER_COLUMNS: &str =
    "id, name, email, password_hash, bio, avatar, role, version, created_at, updated_at";

// The `a` alias is shared by plain selects and by the CTE-based writes below.
const ARTICLE_SELECT: &str = r#"
    a.id, a.title, a.content, a.author_id, a.image_url, a.version, a.created_at, a.updated_at,
    u.name AS author_name, u.avatar AS author_avatar
"#;

const COMMENT_SELECT: &str = r#"
    c.id, c.article_id, c.user_id, c.content, c.version, c.created_at, c.updated_at,
    u.name AS user_name, u.avatar AS user_avatar, u.role AS user_role
"#;

/// PostgresRepository
///
/// The concrete implementation of the `Repository` trait, backed by PostgreSQL.
/// All statements are parameterized; nothing user-supplied is spliced into SQL.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Creates a new repository instance using the initialized connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    // --- USERS ---

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, RepoError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, RepoError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_users(&self) -> Result<Vec<User>, RepoError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users ORDER BY created_at ASC");
        Ok(sqlx::query_as::<_, User>(&sql).fetch_all(&self.pool).await?)
    }

    /// create_user
    ///
    /// A duplicate email surfaces as `RepoError::Duplicate` through the unique index,
    /// which also covers two registrations racing past the handler's pre-check.
    async fn create_user(&self, user: NewUser) -> Result<User, RepoError> {
        let sql = format!(
            "INSERT INTO users (id, name, email, password_hash, bio, avatar, role) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {USER_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(Uuid::new_v4())
            .bind(user.name)
            .bind(user.email)
            .bind(user.password_hash)
            .bind(user.bio)
            .bind(user.avatar)
            .bind(user.role)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn update_user(
        &self,
        id: Uuid,
        version: i32,
        changes: UserChanges,
    ) -> Result<Option<User>, RepoError> {
        let sql = format!(
            r#"
            UPDATE users
            SET name = $3, email = $4, password_hash = $5, bio = $6, avatar = $7, role = $8,
                version = version + 1, updated_at = NOW()
            WHERE id = $1 AND version = $2
            RETURNING {USER_COLUMNS}
            "#
        );
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .bind(version)
            .bind(changes.name)
            .bind(changes.email)
            .bind(changes.password_hash)
            .bind(changes.bio)
            .bind(changes.avatar)
            .bind(changes.role)
            .fetch_optional(&self.pool)
            .await?)
    }

    /// delete_user
    ///
    /// Runs the article check and the versioned delete in one transaction. The
    /// `ON DELETE RESTRICT` foreign key backs the check up if an article is inserted
    /// concurrently.
    async fn delete_user(&self, id: Uuid, version: i32) -> Result<UserDeletion, RepoError> {
        let mut tx = self.pool.begin().await?;

        let owns_articles: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM articles WHERE author_id = $1)")
                .bind(id)
                .fetch_one(&mut *tx)
                .await?;
        if owns_articles {
            tx.rollback().await?;
            return Ok(UserDeletion::OwnsArticles);
        }

        let result = sqlx::query("DELETE FROM users WHERE id = $1 AND version = $2")
            .bind(id)
            .bind(version)
            .execute(&mut *tx)
            .await;

        match result {
            Ok(done) if done.rows_affected() == 0 => {
                tx.rollback().await?;
                Ok(UserDeletion::Stale)
            }
            Ok(_) => {
                tx.commit().await?;
                Ok(UserDeletion::Deleted)
            }
            Err(e)
                if e.as_database_error()
                    .is_some_and(|db_err| db_err.is_foreign_key_violation()) =>
            {
                tracing::warn!(user_id = %id, "user delete raced with article insert");
                Ok(UserDeletion::OwnsArticles)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn file_in_use(&self, path: &str) -> Result<bool, RepoError> {
        Ok(sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM users WHERE avatar = $1) \
             OR EXISTS(SELECT 1 FROM articles WHERE image_url = $1)",
        )
        .bind(path)
        .fetch_one(&self.pool)
        .await?)
    }

    // --- ARTICLES ---

    async fn list_articles(&self) -> Result<Vec<Article>, RepoError> {
        let sql = format!(
            "SELECT {ARTICLE_SELECT} FROM articles a JOIN users u ON a.author_id = u.id \
             ORDER BY a.created_at DESC"
        );
        Ok(sqlx::query_as::<_, Article>(&sql)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn get_article(&self, id: Uuid) -> Result<Option<Article>, RepoError> {
        let sql = format!(
            "SELECT {ARTICLE_SELECT} FROM articles a JOIN users u ON a.author_id = u.id \
             WHERE a.id = $1"
        );
        Ok(sqlx::query_as::<_, Article>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    /// create_article
    ///
    /// Uses a CTE so the insert and the author join happen in one round trip.
    async fn create_article(&self, article: NewArticle) -> Result<Article, RepoError> {
        let sql = format!(
            r#"
            WITH a AS (
                INSERT INTO articles (id, title, content, author_id, image_url)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING *
            )
            SELECT {ARTICLE_SELECT} FROM a JOIN users u ON a.author_id = u.id
            "#
        );
        Ok(sqlx::query_as::<_, Article>(&sql)
            .bind(Uuid::new_v4())
            .bind(article.title)
            .bind(article.content)
            .bind(article.author_id)
            .bind(article.image_url)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn update_article(
        &self,
        id: Uuid,
        version: i32,
        changes: ArticleChanges,
    ) -> Result<Option<Article>, RepoError> {
        let sql = format!(
            r#"
            WITH a AS (
                UPDATE articles
                SET title = $3, content = $4, image_url = $5,
                    version = version + 1, updated_at = NOW()
                WHERE id = $1 AND version = $2
                RETURNING *
            )
            SELECT {ARTICLE_SELECT} FROM a JOIN users u ON a.author_id = u.id
            "#
        );
        Ok(sqlx::query_as::<_, Article>(&sql)
            .bind(id)
            .bind(version)
            .bind(changes.title)
            .bind(changes.content)
            .bind(changes.image_url)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn delete_article(&self, id: Uuid, version: i32) -> Result<bool, RepoError> {
        let done = sqlx::query("DELETE FROM articles WHERE id = $1 AND version = $2")
            .bind(id)
            .bind(version)
            .execute(&self.pool)
            .await?;
        Ok(done.rows_affected() > 0)
    }

    // --- COMMENTS ---

    async fn get_comment(&self, id: i64) -> Result<Option<Comment>, RepoError> {
        let sql = format!(
            "SELECT {COMMENT_SELECT} FROM comments c JOIN users u ON c.user_id = u.id \
             WHERE c.id = $1"
        );
        Ok(sqlx::query_as::<_, Comment>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_comments(&self, article_id: Uuid) -> Result<Vec<Comment>, RepoError> {
        let sql = format!(
            "SELECT {COMMENT_SELECT} FROM comments c JOIN users u ON c.user_id = u.id \
             WHERE c.article_id = $1 ORDER BY c.created_at DESC, c.id DESC"
        );
        Ok(sqlx::query_as::<_, Comment>(&sql)
            .bind(article_id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn create_comment(&self, comment: NewComment) -> Result<Comment, RepoError> {
        let sql = format!(
            r#"
            WITH c AS (
                INSERT INTO comments (article_id, user_id, content)
                VALUES ($1, $2, $3)
                RETURNING *
            )
            SELECT {COMMENT_SELECT} FROM c JOIN users u ON c.user_id = u.id
            "#
        );
        Ok(sqlx::query_as::<_, Comment>(&sql)
            .bind(comment.article_id)
            .bind(comment.user_id)
            .bind(comment.content)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn update_comment(
        &self,
        id: i64,
        version: i32,
        content: String,
    ) -> Result<Option<Comment>, RepoError> {
        let sql = format!(
            r#"
            WITH c AS (
                UPDATE comments
                SET content = $3, version = version + 1, updated_at = NOW()
                WHERE id = $1 AND version = $2
                RETURNING *
            )
            SELECT {COMMENT_SELECT} FROM c JOIN users u ON c.user_id = u.id
            "#
        );
        Ok(sqlx::query_as::<_, Comment>(&sql)
            .bind(id)
            .bind(version)
            .bind(content)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn delete_comment(&self, id: i64, version: i32) -> Result<bool, RepoError> {
        let done = sqlx::query("DELETE FROM comments WHERE id = $1 AND version = $2")
            .bind(id)
            .bind(version)
            .execute(&self.pool)
            .await?;
        Ok(done.rows_affected() > 0)
    }

    // --- ORDERS ---

    async fn create_order(&self, user_id: Uuid, product_id: i64) -> Result<Order, RepoError> {
        Ok(sqlx::query_as::<_, Order>(
            "INSERT INTO orders (user_id, product_id) VALUES ($1, $2) \
             RETURNING id, user_id, product_id, created_at",
        )
        .bind(user_id)
        .bind(product_id)
        .fetch_one(&self.pool)
        .await?)
    }
}
