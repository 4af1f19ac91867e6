use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::{auth::AuthUser, error::AppError, models::Role};

/// Ownership
///
/// How a policy treats the relationship between the caller and the row being touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    /// Any caller that passed the role check.
    Unrestricted,
    /// Only the owner. Admins get no override.
    OwnerOnly,
    /// The owner, or an admin.
    OwnerOrAdmin,
}

/// Policy
///
/// A declarative access rule attached to a route. The role half is enforced by the
/// `authorize` middleware before the handler runs; the ownership half needs the loaded
/// row and is checked by the handler through `check_owner`.
#[derive(Debug)]
pub struct Policy {
    pub name: &'static str,
    pub roles: &'static [Role],
    pub ownership: Ownership,
}

const ANY_ROLE: &[Role] = &[Role::Reader, Role::Author, Role::Editor, Role::Admin];

pub static CREATE_ARTICLE: Policy = Policy {
    name: "create_article",
    roles: &[Role::Author, Role::Editor, Role::Admin],
    ownership: Ownership::Unrestricted,
};

pub static MODIFY_ARTICLE: Policy = Policy {
    name: "modify_article",
    roles: ANY_ROLE,
    ownership: Ownership::OwnerOrAdmin,
};

pub static MODIFY_COMMENT: Policy = Policy {
    name: "modify_comment",
    roles: ANY_ROLE,
    ownership: Ownership::OwnerOnly,
};

pub static MANAGE_USERS: Policy = Policy {
    name: "manage_users",
    roles: &[Role::Admin],
    ownership: Ownership::Unrestricted,
};

pub static ACCESS_USER: Policy = Policy {
    name: "access_user",
    roles: ANY_ROLE,
    ownership: Ownership::OwnerOrAdmin,
};

pub static PLACE_ORDER: Policy = Policy {
    name: "place_order",
    roles: ANY_ROLE,
    ownership: Ownership::Unrestricted,
};

impl Policy {
    pub fn check_role(&self, user: &AuthUser) -> Result<(), AppError> {
        if self.roles.contains(&user.role) {
            Ok(())
        } else {
            tracing::debug!(policy = self.name, user_id = %user.id, role = user.role.as_str(), "role not permitted");
            Err(AppError::Forbidden("Access denied".to_string()))
        }
    }

    /// check_owner
    ///
    /// `owner_id` is the user the target row belongs to (the user itself for
    /// user-record routes).
    pub fn check_owner(&self, user: &AuthUser, owner_id: Uuid) -> Result<(), AppError> {
        let allowed = match self.ownership {
            Ownership::Unrestricted => true,
            Ownership::OwnerOnly => user.id == owner_id,
            Ownership::OwnerOrAdmin => user.id == owner_id || user.role == Role::Admin,
        };
        if allowed {
            Ok(())
        } else {
            tracing::debug!(policy = self.name, user_id = %user.id, owner_id = %owner_id, "ownership check failed");
            Err(AppError::Forbidden(
                "You are not allowed to modify this resource".to_string(),
            ))
        }
    }
}

/// authorize
///
/// Route-level gate. Must sit inside the authentication layer: a request reaching it
/// without an attached `AuthUser` is refused rather than resolved here.
pub async fn authorize(
    State(policy): State<&'static Policy>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let user = request
        .extensions()
        .get::<AuthUser>()
        .ok_or_else(|| AppError::Forbidden("Access denied".to_string()))?;
    policy.check_role(user)?;
    Ok(next.run(request).await)
}
