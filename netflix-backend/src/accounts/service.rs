//! Account operations behind the HTTP handlers and management commands

use std::sync::Arc;

use chrono::Utc;

use super::model::{NewUser, User, UserResponse};
use super::payloads::{
    AuthResponse, LoginRequest, LogoutRequest, MessageResponse, ProfileUpdate, RefreshRequest,
    RegisterRequest, VerifyRequest,
};
use super::store::UserStore;
use super::validation::{
    normalize_email, validate_email, validate_name, validate_username, PasswordContext,
    PasswordPolicy,
};
use crate::auth::{
    JwtManager, OutstandingToken, PasswordHasher, TokenPair, TokenStore, TokenType,
};
use crate::config::PasswordConfig;
use crate::error::{Error, FieldErrors, Result};
use crate::store::Stores;

const NO_ACTIVE_ACCOUNT: &str = "No active account found with the given credentials";
const EMAIL_TAKEN: &str = "A user with this email already exists.";
const USERNAME_TAKEN: &str = "A user with that username already exists.";
const BLANK: &str = "This field may not be blank.";

/// Registration, login, token and profile operations
#[derive(Clone)]
pub struct AccountService {
    users: Arc<dyn UserStore>,
    tokens: Arc<dyn TokenStore>,
    jwt: JwtManager,
    hasher: PasswordHasher,
    policy: PasswordPolicy,
}

impl std::fmt::Debug for AccountService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountService")
            .field("jwt", &self.jwt)
            .field("hasher", &self.hasher)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

/// Turn a unique violation into the field error a client can act on
fn conflict_to_fields(err: Error) -> Error {
    match err {
        Error::Database(ref e) if e.violates("email") => {
            Error::Validation(FieldErrors::single("email", EMAIL_TAKEN))
        }
        Error::Database(ref e) if e.violates("username") => {
            Error::Validation(FieldErrors::single("username", USERNAME_TAKEN))
        }
        other => other,
    }
}

impl AccountService {
    /// Build from storage, a token manager and hashing settings
    pub fn new(
        stores: Stores,
        jwt: JwtManager,
        password: &PasswordConfig,
    ) -> Result<Self> {
        Ok(Self {
            users: stores.users,
            tokens: stores.tokens,
            jwt,
            hasher: PasswordHasher::new(password)?,
            policy: PasswordPolicy::new(password.min_password_length),
        })
    }

    /// Token manager in use
    pub fn jwt(&self) -> &JwtManager {
        &self.jwt
    }

    /// Account storage in use
    pub fn users(&self) -> &Arc<dyn UserStore> {
        &self.users
    }

    /// Issue a pair and record the refresh token as outstanding
    async fn issue_tokens(&self, user: &User) -> Result<TokenPair> {
        let (pair, refresh) = self.jwt.issue_pair(user.id)?;
        self.tokens
            .record_outstanding(&OutstandingToken::from(&refresh))
            .await?;
        Ok(pair)
    }

    /// Create an account and log it in
    pub async fn register(&self, request: RegisterRequest) -> Result<AuthResponse> {
        let email = normalize_email(&request.email);
        let username = request
            .username
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| email.split('@').next().unwrap_or_default().to_string());
        let first_name = request.first_name.unwrap_or_default();
        let last_name = request.last_name.unwrap_or_default();

        let mut errors = FieldErrors::new();
        errors.extend("email", validate_email(&email));
        errors.extend("username", validate_username(&username));
        errors.extend("first_name", validate_name(&first_name));
        errors.extend("last_name", validate_name(&last_name));

        if request.password.is_empty() {
            errors.add("password", BLANK);
        } else {
            let context = PasswordContext {
                username: &username,
                email: &email,
                first_name: &first_name,
                last_name: &last_name,
            };
            errors.extend("password", self.policy.check(&request.password, &context));
        }
        if request.password2.is_empty() {
            errors.add("password2", BLANK);
        } else if request.password != request.password2 {
            errors.add("password", "Password fields didn't match.");
        }

        if errors.get("email").is_none() && self.users.find_by_email(&email).await?.is_some() {
            errors.add("email", EMAIL_TAKEN);
        }
        errors.into_result()?;

        let password_hash = self.hasher.hash_async(request.password).await?;
        let new_user = NewUser {
            first_name,
            last_name,
            ..NewUser::regular(username, email, password_hash)
        };
        let user = self
            .users
            .create(&new_user)
            .await
            .map_err(conflict_to_fields)?;

        tracing::info!(user_id = user.id, "Account registered");
        let tokens = self.issue_tokens(&user).await?;

        Ok(AuthResponse {
            user: UserResponse::from(&user),
            tokens,
            message: "User registered successfully".to_string(),
        })
    }

    /// Exchange credentials for a token pair
    pub async fn login(&self, request: LoginRequest) -> Result<AuthResponse> {
        let mut errors = FieldErrors::new();
        if request.email.trim().is_empty() {
            errors.add("email", BLANK);
        }
        if request.password.is_empty() {
            errors.add("password", BLANK);
        }
        errors.into_result()?;

        let email = normalize_email(&request.email);
        let Some(mut user) = self.users.find_by_email(&email).await? else {
            self.hasher.burn(request.password).await;
            return Err(Error::Unauthorized(NO_ACTIVE_ACCOUNT.to_string()));
        };

        let valid = self
            .hasher
            .verify_async(request.password.clone(), user.password_hash.clone())
            .await?;
        if !valid || !user.is_active {
            tracing::info!(user_id = user.id, "Login refused");
            return Err(Error::Unauthorized(NO_ACTIVE_ACCOUNT.to_string()));
        }

        if self.hasher.needs_rehash(&user.password_hash) {
            user.password_hash = self.hasher.hash_async(request.password).await?;
            user = self.users.save(&user).await?;
            tracing::debug!(user_id = user.id, "Password hash upgraded");
        }

        if self.jwt.config().update_last_login {
            let now = Utc::now();
            self.users.record_login(user.id, now).await?;
            user.last_login = Some(now);
        }

        tracing::info!(user_id = user.id, "Login succeeded");
        let tokens = self.issue_tokens(&user).await?;

        Ok(AuthResponse {
            user: UserResponse::from(&user),
            tokens,
            message: "Login successful".to_string(),
        })
    }

    /// Trade a refresh token for a new access token, rotating the refresh
    /// token when configured
    pub async fn refresh(&self, request: RefreshRequest) -> Result<TokenPair> {
        if request.refresh.is_empty() {
            return Err(Error::Validation(FieldErrors::single("refresh", BLANK)));
        }
        let claims = self.jwt.decode_as(&request.refresh, TokenType::Refresh)?;
        if self.tokens.is_blacklisted(&claims.jti).await? {
            return Err(Error::Unauthorized("Token is blacklisted".to_string()));
        }

        let user = self.users.find_by_id(claims.user_id).await?;
        if !user.is_some_and(|u| u.is_active) {
            return Err(Error::Unauthorized(NO_ACTIVE_ACCOUNT.to_string()));
        }

        let access = self.jwt.issue(claims.user_id, TokenType::Access)?;
        let config = self.jwt.config();
        if !config.rotate_refresh_tokens {
            return Ok(TokenPair {
                access: access.token,
                refresh: request.refresh,
            });
        }

        let old = OutstandingToken {
            user_id: Some(claims.user_id),
            jti: claims.jti.clone(),
            token: request.refresh.clone(),
            created_at: claims.issued_at(),
            expires_at: claims.expires_at(),
        };
        let refresh = self.jwt.issue(claims.user_id, TokenType::Refresh)?;
        let rotated = self
            .tokens
            .rotate(
                &old,
                &OutstandingToken::from(&refresh),
                config.blacklist_after_rotation,
            )
            .await?;
        if !rotated {
            tracing::warn!(user_id = claims.user_id, "Refresh token reused during rotation");
            return Err(Error::Unauthorized("Token is blacklisted".to_string()));
        }

        Ok(TokenPair {
            access: access.token,
            refresh: refresh.token,
        })
    }

    /// Check that any token is currently acceptable
    pub async fn verify(&self, request: VerifyRequest) -> Result<()> {
        if request.token.is_empty() {
            return Err(Error::Validation(FieldErrors::single("token", BLANK)));
        }
        let claims = self.jwt.decode(&request.token)?;
        if claims.token_type == TokenType::Refresh && self.tokens.is_blacklisted(&claims.jti).await?
        {
            return Err(Error::Unauthorized("Token is blacklisted".to_string()));
        }
        Ok(())
    }

    /// Blacklist the caller's refresh token
    pub async fn logout(&self, user: &User, request: LogoutRequest) -> Result<MessageResponse> {
        if request.refresh_token.is_empty() {
            return Err(Error::BadRequest("Refresh token is required".to_string()));
        }
        let claims = self
            .jwt
            .decode_as(&request.refresh_token, TokenType::Refresh)
            .map_err(|e| {
                tracing::debug!(error = %e, "Logout with unusable refresh token");
                Error::BadRequest("Invalid token".to_string())
            })?;
        if claims.user_id != user.id {
            return Err(Error::Forbidden(
                "Token does not belong to the authenticated user".to_string(),
            ));
        }

        let token = OutstandingToken {
            user_id: Some(user.id),
            jti: claims.jti.clone(),
            token: request.refresh_token,
            created_at: claims.issued_at(),
            expires_at: claims.expires_at(),
        };
        self.tokens.blacklist(&token).await?;
        tracing::info!(user_id = user.id, "Logged out");

        Ok(MessageResponse::new("Logout successful"))
    }

    /// Resolve a bearer access token to its active account
    pub async fn authenticate(&self, token: &str) -> Result<User> {
        let claims = self.jwt.decode_as(token, TokenType::Access)?;
        match self.users.find_by_id(claims.user_id).await? {
            Some(user) if user.is_active => Ok(user),
            Some(_) => Err(Error::Unauthorized("User is inactive".to_string())),
            None => Err(Error::Unauthorized("User not found".to_string())),
        }
    }

    /// Apply a partial profile update
    pub async fn update_profile(&self, mut user: User, update: ProfileUpdate) -> Result<User> {
        if update.is_empty() {
            return Ok(user);
        }

        let mut errors = FieldErrors::new();
        if let Some(username) = update.username {
            let username = username.trim().to_string();
            errors.extend("username", validate_username(&username));
            user.username = username;
        }
        if let Some(email) = update.email {
            let email = normalize_email(&email);
            let problems = validate_email(&email);
            if problems.is_empty() {
                if let Some(owner) = self.users.find_by_email(&email).await? {
                    if owner.id != user.id {
                        errors.add("email", EMAIL_TAKEN);
                    }
                }
            }
            errors.extend("email", problems);
            user.email = email;
        }
        if let Some(first_name) = update.first_name {
            errors.extend("first_name", validate_name(&first_name));
            user.first_name = first_name;
        }
        if let Some(last_name) = update.last_name {
            errors.extend("last_name", validate_name(&last_name));
            user.last_name = last_name;
        }
        errors.into_result()?;

        let saved = self.users.save(&user).await.map_err(conflict_to_fields)?;
        tracing::info!(user_id = saved.id, "Profile updated");
        Ok(saved)
    }

    /// Create an operator account
    pub async fn create_superuser(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<User> {
        let email = normalize_email(email);
        let mut errors = FieldErrors::new();
        errors.extend("username", validate_username(username));
        errors.extend("email", validate_email(&email));
        let context = PasswordContext {
            username,
            email: &email,
            ..Default::default()
        };
        errors.extend("password", self.policy.check(password, &context));
        errors.into_result()?;

        let password_hash = self.hasher.hash_async(password.to_string()).await?;
        let new_user = NewUser {
            is_staff: true,
            is_superuser: true,
            ..NewUser::regular(username, email, password_hash)
        };
        let user = self
            .users
            .create(&new_user)
            .await
            .map_err(conflict_to_fields)?;
        tracing::info!(user_id = user.id, "Superuser created");
        Ok(user)
    }

    /// Drop expired refresh token records
    pub async fn flush_expired_tokens(&self) -> Result<u64> {
        let flushed = self.tokens.flush_expired(Utc::now()).await?;
        tracing::info!(flushed, "Expired refresh tokens flushed");
        Ok(flushed)
    }
}

#[cfg(test)]
pub(crate) async fn test_service() -> AccountService {
    use crate::config::TokenConfig;
    use crate::database::Database;
    use crate::settings::SecretKey;

    let db = Database::sqlite_in_memory().await.unwrap();
    let jwt = JwtManager::new(&SecretKey::new("test-signing-key"), &TokenConfig::default()).unwrap();
    AccountService::new(
        Stores::for_database(&db),
        jwt,
        &crate::auth::password::test_config(),
    )
    .unwrap()
}
