//! Input rules for every write endpoint. Each `validate_*` function collects all
//! failing fields before returning, so a client sees the full list at once.

use uuid::Uuid;

use crate::{
    error::{AppError, FieldError},
    models::{CreateCommentRequest, CreateOrderRequest, LoginRequest, Role},
    upload::MultipartForm,
};

pub const NAME_MIN: usize = 3;
pub const NAME_MAX: usize = 100;
pub const EMAIL_MAX: usize = 100;
pub const PASSWORD_MIN: usize = 6;
pub const BIO_MAX: usize = 500;
pub const TITLE_MAX: usize = 255;
pub const ARTICLE_CONTENT_MAX: usize = 50_000;
pub const COMMENT_MAX: usize = 1_000;

/// Accumulates field errors in submission order.
#[derive(Debug, Default)]
struct Checker {
    errors: Vec<FieldError>,
}

impl Checker {
    fn fail(&mut self, field: &str, message: impl Into<String>) {
        self.errors.push(FieldError::new(field, message));
    }

    fn finish(self) -> Result<(), AppError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(AppError::Validation(self.errors))
        }
    }

    /// Required, trimmed, length-bounded text. Returns the trimmed value when valid.
    fn text(
        &mut self,
        field: &str,
        label: &str,
        value: Option<&str>,
        min: usize,
        max: usize,
    ) -> Option<String> {
        let trimmed = value.map(str::trim).unwrap_or("");
        let len = trimmed.chars().count();
        if len == 0 {
            self.fail(field, format!("{label} is required"));
            return None;
        }
        if len < min {
            self.fail(field, format!("{label} must be at least {min} characters"));
            return None;
        }
        if len > max {
            self.fail(field, format!("{label} must be at most {max} characters"));
            return None;
        }
        Some(trimmed.to_string())
    }

    fn email(&mut self, value: Option<&str>) -> Option<String> {
        let email = value.map(normalize_email).unwrap_or_default();
        if email.is_empty() {
            self.fail("email", "Email is required");
            return None;
        }
        if email.chars().count() > EMAIL_MAX {
            self.fail("email", format!("Email must be at most {EMAIL_MAX} characters"));
            return None;
        }
        if !is_valid_email(&email) {
            self.fail("email", "Email is not valid");
            return None;
        }
        Some(email)
    }

    fn password(&mut self, field: &str, value: Option<&str>, strict: bool) -> Option<String> {
        let password = value.unwrap_or("");
        if password.is_empty() {
            self.fail(field, "Password is required");
            return None;
        }
        let mut ok = true;
        if password.chars().count() < PASSWORD_MIN {
            self.fail(field, format!("Password must be at least {PASSWORD_MIN} characters"));
            ok = false;
        }
        if strict && !password.chars().any(|c| c.is_ascii_uppercase()) {
            self.fail(field, "Password must contain at least one uppercase letter");
            ok = false;
        }
        if strict && !password.chars().any(|c| c.is_ascii_digit()) {
            self.fail(field, "Password must contain at least one number");
            ok = false;
        }
        ok.then(|| password.to_string())
    }

    /// Optional bio. Blank clears it.
    fn bio(&mut self, value: Option<&str>) -> Option<String> {
        let bio = value.map(str::trim).filter(|b| !b.is_empty())?;
        if bio.chars().count() > BIO_MAX {
            self.fail("bio", format!("Bio must be at most {BIO_MAX} characters"));
            return None;
        }
        Some(bio.to_string())
    }

    fn role(&mut self, value: Option<&str>, self_service: bool) -> Option<Role> {
        let raw = value.map(str::trim).filter(|r| !r.is_empty())?;
        match Role::parse(raw) {
            Some(role) if !self_service || role.is_self_assignable() => Some(role),
            _ if self_service => {
                self.fail("role", "Role must be reader or author");
                None
            }
            _ => {
                self.fail("role", "Role must be reader, author, editor or admin");
                None
            }
        }
    }
}

/// Lowercases and trims an email address for storage and lookup.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// A pragmatic address check: one `@`, a non-empty local part, and a dotted domain.
pub fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !domain.contains("..")
}

// --- Users ---

/// Account fields for registration and admin creation.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub name: String,
    pub email: String,
    pub password: String,
    pub bio: Option<String>,
    pub role: Role,
}

/// validate_registration
///
/// Self-service signup: strict password rules and only self-assignable roles.
pub fn validate_registration(form: &MultipartForm) -> Result<NewAccount, AppError> {
    validate_account(form, true)
}

/// validate_new_user
///
/// Admin creation: minimum password length only, any role.
pub fn validate_new_user(form: &MultipartForm) -> Result<NewAccount, AppError> {
    validate_account(form, false)
}

fn validate_account(form: &MultipartForm, self_service: bool) -> Result<NewAccount, AppError> {
    let mut check = Checker::default();
    let name = check.text("name", "Name", form.field("name"), NAME_MIN, NAME_MAX);
    let email = check.email(form.field("email"));
    let password = check.password("password", form.field("password"), self_service);
    let bio = check.bio(form.field("bio"));
    let role = check.role(form.field("role"), self_service);
    check.finish()?;

    match (name, email, password) {
        (Some(name), Some(email), Some(password)) => Ok(NewAccount {
            name,
            email,
            password,
            bio,
            role: role.unwrap_or_default(),
        }),
        _ => Err(AppError::Internal(
            "account validation passed without values".to_string(),
        )),
    }
}

/// UserUpdate
///
/// Fields present in an update form. `None` leaves the stored value alone;
/// `bio: Some(None)` clears it.
#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub bio: Option<Option<String>>,
    pub role: Option<Role>,
    pub current_password: Option<String>,
    pub new_password: Option<String>,
}

pub fn validate_user_update(form: &MultipartForm) -> Result<UserUpdate, AppError> {
    let mut check = Checker::default();
    let mut update = UserUpdate::default();

    if let Some(name) = form.text("name") {
        update.name = check.text("name", "Name", Some(name), NAME_MIN, NAME_MAX);
    }
    if let Some(email) = form.text("email") {
        update.email = check.email(Some(email));
    }
    if let Some(bio) = form.field("bio") {
        let before = check.errors.len();
        let value = check.bio(Some(bio));
        if check.errors.len() == before {
            update.bio = Some(value);
        }
    }
    if form.text("role").is_some() {
        update.role = check.role(form.field("role"), false);
    }
    if let Some(new_password) = form.field("new_password").filter(|p| !p.is_empty()) {
        update.new_password = check.password("new_password", Some(new_password), false);
    }
    update.current_password = form
        .field("current_password")
        .filter(|p| !p.is_empty())
        .map(str::to_string);

    check.finish()?;
    Ok(update)
}

pub fn validate_login(payload: &LoginRequest) -> Result<(String, String), AppError> {
    let mut check = Checker::default();
    let email = check.email(Some(&payload.email));
    if payload.password.is_empty() {
        check.fail("password", "Password is required");
    }
    check.finish()?;
    Ok((email.unwrap_or_default(), payload.password.clone()))
}

// --- Articles ---

#[derive(Debug, Clone)]
pub struct ArticleInput {
    pub title: String,
    pub content: String,
}

pub fn validate_article(form: &MultipartForm) -> Result<ArticleInput, AppError> {
    let mut check = Checker::default();
    let title = check.text("title", "Title", form.field("title"), 1, TITLE_MAX);
    let content = check.text(
        "content",
        "Content",
        form.field("content"),
        1,
        ARTICLE_CONTENT_MAX,
    );
    check.finish()?;
    Ok(ArticleInput {
        title: title.unwrap_or_default(),
        content: content.unwrap_or_default(),
    })
}

// --- Comments ---

pub fn validate_comment_content(content: &str) -> Result<String, AppError> {
    let mut check = Checker::default();
    let content = check.text("content", "Comment", Some(content), 1, COMMENT_MAX);
    check.finish()?;
    Ok(content.unwrap_or_default())
}

pub fn validate_new_comment(payload: &CreateCommentRequest) -> Result<(Uuid, String), AppError> {
    let mut check = Checker::default();
    if payload.article_id.is_none() {
        check.fail("article_id", "Article id is required");
    }
    let content = check.text("content", "Comment", Some(&payload.content), 1, COMMENT_MAX);
    check.finish()?;
    match (payload.article_id, content) {
        (Some(article_id), Some(content)) => Ok((article_id, content)),
        _ => Err(AppError::Internal(
            "comment validation passed without values".to_string(),
        )),
    }
}

// --- Orders ---

pub fn validate_order(payload: &CreateOrderRequest) -> Result<(Uuid, i64), AppError> {
    let mut check = Checker::default();
    if payload.user_id.is_none() {
        check.fail("user_id", "User id is required");
    }
    match payload.product_id {
        None => check.fail("product_id", "Product id is required"),
        Some(id) if id <= 0 => check.fail("product_id", "Product id must be a positive integer"),
        Some(_) => {}
    }
    check.finish()?;
    match (payload.user_id, payload.product_id) {
        (Some(user_id), Some(product_id)) => Ok((user_id, product_id)),
        _ => Err(AppError::Internal(
            "order validation passed without values".to_string(),
        )),
    }
}
