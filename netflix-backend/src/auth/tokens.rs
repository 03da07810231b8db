//! JWT access and refresh tokens
//!
//! Both token kinds are HMAC-signed with the deployment `SECRET_KEY` and carry
//! the same claim set; `token_type` tells them apart so a refresh token can't
//! be presented as an access token (and vice versa).

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::config::TokenConfig;
use crate::error::{Error, Result};
use crate::settings::SecretKey;

/// Which of the two tokens this is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    /// Short-lived bearer token
    Access,
    /// Long-lived token exchanged for new access tokens
    Refresh,
}

impl std::fmt::Display for TokenType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Access => write!(f, "access"),
            Self::Refresh => write!(f, "refresh"),
        }
    }
}

/// Claims carried by every token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// `access` or `refresh`
    pub token_type: TokenType,
    /// Subject user id
    pub user_id: i64,
    /// Unique token id (UUID v4)
    pub jti: String,
    /// Issued at (unix seconds)
    pub iat: i64,
    /// Expires at (unix seconds)
    pub exp: i64,
    /// Issuer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    /// Audience
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
}

impl Claims {
    /// Issue time as a timestamp
    pub fn issued_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.iat, 0).unwrap_or_default()
    }

    /// Expiry as a timestamp
    pub fn expires_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.exp, 0).unwrap_or_default()
    }
}

/// An encoded token with the claims it was built from
#[derive(Debug, Clone)]
pub struct IssuedToken {
    /// Compact JWS string
    pub token: String,
    /// Claims inside it
    pub claims: Claims,
}

/// Response shape for a freshly issued pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    /// Access token
    pub access: String,
    /// Refresh token
    pub refresh: String,
}

/// Signs and validates tokens
#[derive(Clone)]
pub struct JwtManager {
    encoding_key: Arc<EncodingKey>,
    decoding_key: Arc<DecodingKey>,
    algorithm: Algorithm,
    validation: Validation,
    config: TokenConfig,
}

impl std::fmt::Debug for JwtManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtManager")
            .field("algorithm", &self.algorithm)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl JwtManager {
    /// Create a manager signing with `secret`
    pub fn new(secret: &SecretKey, config: &TokenConfig) -> Result<Self> {
        let algorithm = parse_algorithm(&config.algorithm)?;
        if config.access_token_lifetime_secs <= 0 || config.refresh_token_lifetime_secs <= 0 {
            return Err(Error::config("Token lifetimes must be positive"));
        }

        let mut validation = Validation::new(algorithm);
        validation.leeway = config.leeway_secs;
        let mut required = vec!["exp", "iat"];
        if config.issuer.is_some() {
            required.push("iss");
        }
        if config.audience.is_some() {
            required.push("aud");
        }
        validation.set_required_spec_claims(&required);
        match &config.issuer {
            Some(issuer) => validation.set_issuer(&[issuer]),
            None => validation.iss = None,
        }
        match &config.audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }

        Ok(Self {
            encoding_key: Arc::new(EncodingKey::from_secret(secret.as_bytes())),
            decoding_key: Arc::new(DecodingKey::from_secret(secret.as_bytes())),
            algorithm,
            validation,
            config: config.clone(),
        })
    }

    /// Token settings in effect
    pub fn config(&self) -> &TokenConfig {
        &self.config
    }

    fn lifetime(&self, token_type: TokenType) -> Duration {
        match token_type {
            TokenType::Access => Duration::seconds(self.config.access_token_lifetime_secs),
            TokenType::Refresh => Duration::seconds(self.config.refresh_token_lifetime_secs),
        }
    }

    /// Issue one token for a user
    pub fn issue(&self, user_id: i64, token_type: TokenType) -> Result<IssuedToken> {
        let now = Utc::now();
        let claims = Claims {
            token_type,
            user_id,
            jti: uuid::Uuid::new_v4().simple().to_string(),
            iat: now.timestamp(),
            exp: (now + self.lifetime(token_type)).timestamp(),
            iss: self.config.issuer.clone(),
            aud: self.config.audience.clone(),
        };

        let token = encode(&Header::new(self.algorithm), &claims, &self.encoding_key)?;
        Ok(IssuedToken { token, claims })
    }

    /// Issue an access token and a refresh token
    ///
    /// The refresh token is returned separately so it can be recorded as
    /// outstanding.
    pub fn issue_pair(&self, user_id: i64) -> Result<(TokenPair, IssuedToken)> {
        let access = self.issue(user_id, TokenType::Access)?;
        let refresh = self.issue(user_id, TokenType::Refresh)?;
        let pair = TokenPair {
            access: access.token,
            refresh: refresh.token.clone(),
        };
        Ok((pair, refresh))
    }

    /// Check signature, expiry, issuer and audience
    pub fn decode(&self, token: &str) -> Result<Claims> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation)?;
        Ok(data.claims)
    }

    /// [`decode`](Self::decode) and require a token type
    pub fn decode_as(&self, token: &str, expected: TokenType) -> Result<Claims> {
        let claims = self.decode(token)?;
        if claims.token_type != expected {
            return Err(Error::Unauthorized("Token has wrong type".to_string()));
        }
        Ok(claims)
    }
}

/// Only HMAC algorithms make sense with a shared `SECRET_KEY`
fn parse_algorithm(alg: &str) -> Result<Algorithm> {
    match alg.to_uppercase().as_str() {
        "HS256" => Ok(Algorithm::HS256),
        "HS384" => Ok(Algorithm::HS384),
        "HS512" => Ok(Algorithm::HS512),
        _ => Err(Error::config(format!(
            "Unsupported JWT algorithm: {} (expected HS256, HS384 or HS512)",
            alg
        ))),
    }
}
