use crate::{
    AppState,
    handlers::users,
    policy::{MANAGE_USERS, authorize},
};
use axum::{
    Router,
    middleware,
    routing::{delete, get},
};

/// Admin Router Module
///
/// User management. The whole router is gated by `MANAGE_USERS`, and `lib.rs` wraps it
/// in `auth_middleware` so the gate always sees an authenticated identity.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // GET/POST /users
        // List every account, or create one with any role.
        .route("/users", get(users::list_users).post(users::create_user))
        // DELETE /users/{id}
        // Refused while the user still authors articles.
        .route("/users/{id}", delete(users::delete_user))
        .route_layer(middleware::from_fn_with_state(&MANAGE_USERS, authorize))
}
