use crate::{
    AppState,
    handlers::{articles, auth, comments, orders, users},
    policy::{self, authorize},
};
use axum::{
    Router,
    middleware,
    routing::{get, post, put},
};

/// Authenticated Router Module
///
/// Every handler here receives a validated `AuthUser`, attached by the
/// `auth_middleware` layer that `lib.rs` puts around this router. Role checks run in
/// the per-route `authorize` layer; ownership is checked inside the handlers against
/// the same policy.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // GET /auth/me
        .route("/auth/me", get(auth::me))
        // --- Articles ---
        // POST /articles
        // Authors, editors and admins only.
        .route(
            "/articles",
            post(articles::create_article).route_layer(middleware::from_fn_with_state(
                &policy::CREATE_ARTICLE,
                authorize,
            )),
        )
        // PUT/DELETE /articles/{id}
        // Owner or admin.
        .route(
            "/articles/{id}",
            put(articles::update_article)
                .delete(articles::delete_article)
                .route_layer(middleware::from_fn_with_state(
                    &policy::MODIFY_ARTICLE,
                    authorize,
                )),
        )
        // --- Comments ---
        // POST /comments
        .route("/comments", post(comments::create_comment))
        // PUT/DELETE /comments/{id}
        // Owner only; admins get no override here.
        .route(
            "/comments/{id}",
            put(comments::update_comment)
                .delete(comments::delete_comment)
                .route_layer(middleware::from_fn_with_state(
                    &policy::MODIFY_COMMENT,
                    authorize,
                )),
        )
        // --- Users ---
        // GET/PUT /users/{id}
        // Self or admin. DELETE lives in the admin router.
        .route(
            "/users/{id}",
            get(users::get_user)
                .put(users::update_user)
                .route_layer(middleware::from_fn_with_state(
                    &policy::ACCESS_USER,
                    authorize,
                )),
        )
        // --- Orders ---
        // POST /orders
        .route(
            "/orders",
            post(orders::create_order).route_layer(middleware::from_fn_with_state(
                &policy::PLACE_ORDER,
                authorize,
            )),
        )
}
