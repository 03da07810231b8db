//! The account row and its public projection

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A stored account
///
/// `created_at` is written once by the insert; `updated_at` is rewritten by
/// every save.
#[derive(Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct User {
    /// Primary key
    pub id: i64,
    /// Unique login handle
    pub username: String,
    /// Unique email address
    pub email: String,
    /// Argon2id PHC string
    pub password_hash: String,
    /// Given name
    pub first_name: String,
    /// Family name
    pub last_name: String,
    /// Inactive accounts cannot log in or refresh
    pub is_active: bool,
    /// Operator account
    pub is_staff: bool,
    /// Operator account with every permission
    pub is_superuser: bool,
    /// Last successful login
    pub last_login: Option<DateTime<Utc>>,
    /// Registration time
    pub date_joined: DateTime<Utc>,
    /// Insert time
    pub created_at: DateTime<Utc>,
    /// Last save time
    pub updated_at: DateTime<Utc>,
}

impl fmt::Display for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.email)
    }
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("email", &self.email)
            .field("is_active", &self.is_active)
            .field("is_staff", &self.is_staff)
            .field("is_superuser", &self.is_superuser)
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .finish_non_exhaustive()
    }
}

/// Values for a new account
#[derive(Debug, Clone)]
pub struct NewUser {
    /// Login handle
    pub username: String,
    /// Email address
    pub email: String,
    /// Already-hashed password
    pub password_hash: String,
    /// Given name
    pub first_name: String,
    /// Family name
    pub last_name: String,
    /// Operator account
    pub is_staff: bool,
    /// Operator account with every permission
    pub is_superuser: bool,
}

impl NewUser {
    /// A regular account
    pub fn regular(
        username: impl Into<String>,
        email: impl Into<String>,
        password_hash: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            email: email.into(),
            password_hash: password_hash.into(),
            first_name: String::new(),
            last_name: String::new(),
            is_staff: false,
            is_superuser: false,
        }
    }
}

/// What clients see of an account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserResponse {
    /// Primary key
    pub id: i64,
    /// Login handle
    pub username: String,
    /// Email address
    pub email: String,
    /// Given name
    pub first_name: String,
    /// Family name
    pub last_name: String,
    /// Registration time
    pub date_joined: DateTime<Utc>,
    /// Insert time
    pub created_at: DateTime<Utc>,
    /// Last save time
    pub updated_at: DateTime<Utc>,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            date_joined: user.date_joined,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self::from(&user)
    }
}

#[cfg(test)]
pub(crate) fn sample_user() -> User {
    let now = Utc::now();
    User {
        id: 1,
        username: "viewer".into(),
        email: "viewer@example.com".into(),
        password_hash: "$argon2id$v=19$m=1024,t=1,p=1$c2FsdA$aGFzaA".into(),
        first_name: String::new(),
        last_name: String::new(),
        is_active: true,
        is_staff: false,
        is_superuser: false,
        last_login: None,
        date_joined: now,
        created_at: now,
        updated_at: now,
    }
}
