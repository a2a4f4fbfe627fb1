use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;
use validator::Validate;

use crate::validation::FieldErrors;

pub type UserId = u64;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub name: String,
    pub password_hash: String,
    pub is_active: bool,
    pub is_staff: bool,
    pub is_superuser: bool,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(id: UserId, email: String, name: String, password_hash: String) -> Self {
        Self {
            id,
            email,
            name,
            password_hash,
            is_active: true,
            is_staff: false,
            is_superuser: false,
            created_at: Utc::now(),
        }
    }

    pub fn check_password(&self, password: &str) -> anyhow::Result<bool> {
        Ok(bcrypt::verify(password, &self.password_hash)?)
    }
}

impl fmt::Display for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.email)
    }
}

/// An opaque API key. Each user holds at most one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    pub key: String,
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
}

impl Token {
    pub fn new(user_id: UserId) -> Self {
        Self {
            key: Uuid::new_v4().simple().to_string(),
            user_id,
            created_at: Utc::now(),
        }
    }
}

/// Lower-cases the domain part of an address and leaves the local part alone.
pub fn normalize_email(email: &str) -> String {
    let email = email.trim();
    match email.rsplit_once('@') {
        Some((local, domain)) => format!("{}@{}", local, domain.to_lowercase()),
        None => email.to_string(),
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateUserRequest {
    #[validate(
        email(message = "Enter a valid email address."),
        length(max = 255, message = "Ensure this field has no more than 255 characters.")
    )]
    pub email: Option<String>,

    #[validate(length(min = 5, message = "Ensure this field has at least 5 characters."))]
    pub password: Option<String>,

    #[validate(length(max = 255, message = "Ensure this field has no more than 255 characters."))]
    pub name: Option<String>,
}

impl CreateUserRequest {
    pub fn check(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();
        errors.require_text("email", self.email.as_deref(), false);
        errors.require_text("password", self.password.as_deref(), false);
        errors.absorb(self.validate());
        errors.into_result()
    }
}

/// Profile changes. PATCH leaves absent fields alone, PUT requires the
/// credentials.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateUserRequest {
    #[validate(
        email(message = "Enter a valid email address."),
        length(max = 255, message = "Ensure this field has no more than 255 characters.")
    )]
    pub email: Option<String>,

    #[validate(length(min = 5, message = "Ensure this field has at least 5 characters."))]
    pub password: Option<String>,

    #[validate(length(max = 255, message = "Ensure this field has no more than 255 characters."))]
    pub name: Option<String>,
}

impl UpdateUserRequest {
    pub fn check(&self, partial: bool) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();
        errors.require_text("email", self.email.as_deref(), partial);
        errors.require_text("password", self.password.as_deref(), partial);
        errors.absorb(self.validate());
        errors.into_result()
    }
}

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

impl TokenRequest {
    pub fn check(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();
        errors.require_text("email", self.email.as_deref(), false);
        // Passwords are not trimmed, but an empty one can never authenticate.
        if self.password.as_deref() == Some("") {
            errors.add("password", crate::validation::BLANK);
        } else {
            errors.require("password", self.password.as_ref(), false);
        }
        errors.into_result()
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct UserResponse {
    pub email: String,
    pub name: String,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            email: user.email.clone(),
            name: user.name.clone(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token: String,
}
