use crate::{
    AppState,
    handlers::{articles, auth, comments},
};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Read-only content plus the two entry points into the auth flow.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness check for load balancers and monitoring.
        .route("/health", get(|| async { "ok" }))
        // POST /auth/register (multipart)
        .route("/auth/register", post(auth::register))
        // POST /auth/login
        .route("/auth/login", post(auth::login))
        // GET /articles
        // Newest first, author embedded.
        .route("/articles", get(articles::list_articles))
        // GET /articles/{id}
        .route("/articles/{id}", get(articles::get_article))
        // GET /articles/{id}/comments
        // 404 when the article itself does not exist.
        .route("/articles/{id}/comments", get(comments::list_comments))
}
