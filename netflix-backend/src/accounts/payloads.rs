//! Request and response bodies for the account endpoints

use serde::{Deserialize, Serialize};

use super::model::UserResponse;
use crate::auth::TokenPair;

/// `POST /api/auth/register/`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegisterRequest {
    /// Email address (unique)
    #[serde(default)]
    pub email: String,
    /// Chosen password
    #[serde(default)]
    pub password: String,
    /// Confirmation; must equal `password`
    #[serde(default)]
    pub password2: String,
    /// Defaults to the email's local part
    #[serde(default)]
    pub username: Option<String>,
    /// Given name
    #[serde(default)]
    pub first_name: Option<String>,
    /// Family name
    #[serde(default)]
    pub last_name: Option<String>,
}

/// `POST /api/auth/login/`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoginRequest {
    /// Email address
    #[serde(default)]
    pub email: String,
    /// Password
    #[serde(default)]
    pub password: String,
}

/// `POST /api/auth/token/refresh/`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RefreshRequest {
    /// Refresh token
    #[serde(default)]
    pub refresh: String,
}

/// `POST /api/auth/token/verify/`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VerifyRequest {
    /// Any token
    #[serde(default)]
    pub token: String,
}

/// `POST /api/auth/logout/`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogoutRequest {
    /// The caller's refresh token
    #[serde(default)]
    pub refresh_token: String,
}

/// `PUT`/`PATCH /api/auth/profile/`
///
/// Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileUpdate {
    /// New username
    #[serde(default)]
    pub username: Option<String>,
    /// New email
    #[serde(default)]
    pub email: Option<String>,
    /// New given name
    #[serde(default)]
    pub first_name: Option<String>,
    /// New family name
    #[serde(default)]
    pub last_name: Option<String>,
}

impl ProfileUpdate {
    /// True when nothing would change
    pub fn is_empty(&self) -> bool {
        self.username.is_none()
            && self.email.is_none()
            && self.first_name.is_none()
            && self.last_name.is_none()
    }
}

/// Register and login response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    /// The account
    pub user: UserResponse,
    /// Fresh token pair
    pub tokens: TokenPair,
    /// Human-readable outcome
    pub message: String,
}

/// Plain acknowledgement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    /// Human-readable outcome
    pub message: String,
}

impl MessageResponse {
    /// Wrap a message
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
