//! Account persistence seam

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::model::{NewUser, User};
use crate::error::Result;

/// Storage for accounts
///
/// Uniqueness of `username` and `email` is enforced by the storage layer: a
/// duplicate surfaces as a constraint-violation [`DatabaseError`] whose
/// context names the column.
///
/// [`DatabaseError`]: crate::error::DatabaseError
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert an account; `created_at`, `updated_at` and `date_joined` are
    /// all set to now
    async fn create(&self, user: &NewUser) -> Result<User>;

    /// Look up by primary key
    async fn find_by_id(&self, id: i64) -> Result<Option<User>>;

    /// Look up by email (exact match)
    async fn find_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Persist every mutable field and stamp `updated_at`
    ///
    /// `created_at` is never written. Fails with not-found when the row is gone.
    async fn save(&self, user: &User) -> Result<User>;

    /// Write `last_login` only
    async fn record_login(&self, id: i64, at: DateTime<Utc>) -> Result<()>;
}
