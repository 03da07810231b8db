//! Refresh token bookkeeping
//!
//! Every refresh token handed out is recorded as outstanding. Rotation and
//! logout blacklist it; a blacklisted refresh token is refused even though its
//! signature and expiry are still valid. Expired rows are flushed offline.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::tokens::IssuedToken;
use crate::error::Result;

/// A refresh token as recorded in storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutstandingToken {
    /// Owner; `None` once the account is deleted
    pub user_id: Option<i64>,
    /// Token id claim
    pub jti: String,
    /// Encoded token
    pub token: String,
    /// Issue time
    pub created_at: DateTime<Utc>,
    /// Expiry
    pub expires_at: DateTime<Utc>,
}

impl From<&IssuedToken> for OutstandingToken {
    fn from(issued: &IssuedToken) -> Self {
        Self {
            user_id: Some(issued.claims.user_id),
            jti: issued.claims.jti.clone(),
            token: issued.token.clone(),
            created_at: issued.claims.issued_at(),
            expires_at: issued.claims.expires_at(),
        }
    }
}

/// Storage for outstanding and blacklisted refresh tokens
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Record an issued refresh token; recording the same `jti` twice is a no-op
    async fn record_outstanding(&self, token: &OutstandingToken) -> Result<()>;

    /// Whether the token with this `jti` is blacklisted
    async fn is_blacklisted(&self, jti: &str) -> Result<bool>;

    /// Blacklist a token, recording it first if it was never seen
    ///
    /// Returns `false` when it was already blacklisted.
    async fn blacklist(&self, token: &OutstandingToken) -> Result<bool>;

    /// Atomically blacklist `old` (when asked) and record `new`
    ///
    /// Returns `false`, recording nothing, when `old` was already blacklisted,
    /// so two concurrent refreshes with one token can't both succeed.
    async fn rotate(
        &self,
        old: &OutstandingToken,
        new: &OutstandingToken,
        blacklist_old: bool,
    ) -> Result<bool>;

    /// Delete outstanding tokens that expired before `now`, with their
    /// blacklist entries
    async fn flush_expired(&self, now: DateTime<Utc>) -> Result<u64>;
}
