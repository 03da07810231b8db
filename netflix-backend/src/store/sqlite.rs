//! SQLite-backed account and token storage
//!
//! Timestamps are stored as RFC 3339 text, so time comparisons go through
//! `julianday()` rather than string ordering.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};

use super::USER_COLUMNS;
use crate::accounts::{NewUser, User, UserStore};
use crate::auth::{OutstandingToken, TokenStore};
use crate::error::{DatabaseError, DatabaseOperation, Result};

/// SQLite storage for both accounts and tokens
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Wrap a pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn db_error(operation: DatabaseOperation) -> impl FnOnce(sqlx::Error) -> DatabaseError {
    move |e| DatabaseError::from(e).during(operation)
}

#[async_trait]
impl UserStore for SqliteStore {
    async fn create(&self, user: &NewUser) -> Result<User> {
        let now = Utc::now();
        let sql = format!(
            "INSERT INTO users (username, email, password_hash, first_name, last_name, \
             is_active, is_staff, is_superuser, date_joined, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, 1, ?, ?, ?, ?, ?) \
             RETURNING {USER_COLUMNS}"
        );
        let created = sqlx::query_as::<_, User>(&sql)
            .bind(&user.username)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(&user.first_name)
            .bind(&user.last_name)
            .bind(user.is_staff)
            .bind(user.is_superuser)
            .bind(now)
            .bind(now)
            .bind(now)
            .fetch_one(&self.pool)
            .await
            .map_err(db_error(DatabaseOperation::Insert))?;

        Ok(created)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error(DatabaseOperation::Query))?;
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error(DatabaseOperation::Query))?;
        Ok(user)
    }

    async fn save(&self, user: &User) -> Result<User> {
        let sql = format!(
            "UPDATE users SET username = ?, email = ?, password_hash = ?, \
             first_name = ?, last_name = ?, is_active = ?, is_staff = ?, \
             is_superuser = ?, last_login = ?, updated_at = ? \
             WHERE id = ? RETURNING {USER_COLUMNS}"
        );
        let saved = sqlx::query_as::<_, User>(&sql)
            .bind(&user.username)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(&user.first_name)
            .bind(&user.last_name)
            .bind(user.is_active)
            .bind(user.is_staff)
            .bind(user.is_superuser)
            .bind(user.last_login)
            .bind(Utc::now())
            .bind(user.id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error(DatabaseOperation::Update))?;

        saved.ok_or_else(|| {
            DatabaseError::not_found(
                DatabaseOperation::Update,
                format!("User {} does not exist", user.id),
            )
            .into()
        })
    }

    async fn record_login(&self, id: i64, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE users SET last_login = ? WHERE id = ?")
            .bind(at)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_error(DatabaseOperation::Update))?;
        Ok(())
    }
}

async fn insert_outstanding(conn: &mut SqliteConnection, token: &OutstandingToken) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO outstanding_tokens (user_id, jti, token, created_at, expires_at)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT (jti) DO NOTHING
        "#,
    )
    .bind(token.user_id)
    .bind(&token.jti)
    .bind(&token.token)
    .bind(token.created_at)
    .bind(token.expires_at)
    .execute(&mut *conn)
    .await
    .map_err(db_error(DatabaseOperation::Insert))?;
    Ok(())
}

/// True when a new blacklist row was written
async fn insert_blacklisted(conn: &mut SqliteConnection, jti: &str) -> Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO blacklisted_tokens (token_id, blacklisted_at)
        SELECT id, ? FROM outstanding_tokens WHERE jti = ?
        ON CONFLICT (token_id) DO NOTHING
        "#,
    )
    .bind(Utc::now())
    .bind(jti)
    .execute(&mut *conn)
    .await
    .map_err(db_error(DatabaseOperation::Insert))?;
    Ok(result.rows_affected() == 1)
}

#[async_trait]
impl TokenStore for SqliteStore {
    async fn record_outstanding(&self, token: &OutstandingToken) -> Result<()> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(db_error(DatabaseOperation::PoolAcquire))?;
        insert_outstanding(&mut conn, token).await
    }

    async fn is_blacklisted(&self, jti: &str) -> Result<bool> {
        let blacklisted: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM blacklisted_tokens b
                JOIN outstanding_tokens o ON o.id = b.token_id
                WHERE o.jti = ?
            )
            "#,
        )
        .bind(jti)
        .fetch_one(&self.pool)
        .await
        .map_err(db_error(DatabaseOperation::Query))?;
        Ok(blacklisted)
    }

    async fn blacklist(&self, token: &OutstandingToken) -> Result<bool> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db_error(DatabaseOperation::PoolAcquire))?;
        insert_outstanding(&mut tx, token).await?;
        let added = insert_blacklisted(&mut tx, &token.jti).await?;
        tx.commit()
            .await
            .map_err(db_error(DatabaseOperation::Insert))?;
        Ok(added)
    }

    async fn rotate(
        &self,
        old: &OutstandingToken,
        new: &OutstandingToken,
        blacklist_old: bool,
    ) -> Result<bool> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db_error(DatabaseOperation::PoolAcquire))?;

        if blacklist_old {
            insert_outstanding(&mut tx, old).await?;
            if !insert_blacklisted(&mut tx, &old.jti).await? {
                tx.rollback()
                    .await
                    .map_err(db_error(DatabaseOperation::Insert))?;
                return Ok(false);
            }
        }
        insert_outstanding(&mut tx, new).await?;

        tx.commit()
            .await
            .map_err(db_error(DatabaseOperation::Insert))?;
        Ok(true)
    }

    async fn flush_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let result =
            sqlx::query("DELETE FROM outstanding_tokens WHERE julianday(expires_at) < julianday(?)")
                .bind(now)
                .execute(&self.pool)
                .await
                .map_err(db_error(DatabaseOperation::Delete))?;
        Ok(result.rows_affected())
    }
}
