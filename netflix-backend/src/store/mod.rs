//! Storage backends
//!
//! Both engines implement [`UserStore`] and [`TokenStore`]; which one serves a
//! process is decided once, from the connected [`Database`].

use std::sync::Arc;

use crate::accounts::UserStore;
use crate::auth::TokenStore;
use crate::database::Database;

pub mod postgres;
pub mod sqlite;

pub use postgres::PgStore;
pub use sqlite::SqliteStore;

/// Column list shared by every `users` query
pub(crate) const USER_COLUMNS: &str = "id, username, email, password_hash, first_name, \
    last_name, is_active, is_staff, is_superuser, last_login, date_joined, created_at, updated_at";

/// Trait objects for the selected engine
#[derive(Clone)]
pub struct Stores {
    /// Accounts
    pub users: Arc<dyn UserStore>,
    /// Refresh token bookkeeping
    pub tokens: Arc<dyn TokenStore>,
}

impl Stores {
    /// Stores backed by `db`
    pub fn for_database(db: &Database) -> Self {
        match db {
            Database::Postgres(pool) => {
                let store = Arc::new(PgStore::new(pool.clone()));
                Self {
                    users: store.clone(),
                    tokens: store,
                }
            }
            Database::Sqlite(pool) => {
                let store = Arc::new(SqliteStore::new(pool.clone()));
                Self {
                    users: store.clone(),
                    tokens: store,
                }
            }
        }
    }
}

impl std::fmt::Debug for Stores {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stores").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::NewUser;
    use crate::auth::OutstandingToken;
    use crate::error::{DatabaseErrorKind, Error};
    use chrono::{Duration, SubsecRound, Utc};
    use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
    use std::time::Duration as StdDuration;

    /// Runs each body against in-memory SQLite, and against PostgreSQL when
    /// `TEST_DATABASE_URL` is set
    macro_rules! store_tests {
        ($($name:ident),* $(,)?) => {
            mod sqlite_backend {
                $(
                    #[tokio::test]
                    async fn $name() {
                        super::$name(super::sqlite_stores().await).await;
                    }
                )*
            }

            mod postgres_backend {
                $(
                    #[tokio::test]
                    async fn $name() {
                        let Some(stores) = super::postgres_stores().await else {
                            return;
                        };
                        super::$name(stores).await;
                    }
                )*
            }
        };
    }

    store_tests!(
        test_create_and_find,
        test_duplicate_email_is_rejected_by_storage,
        test_duplicate_username_names_the_column,
        test_save_keeps_created_at_and_bumps_updated_at,
        test_save_missing_user_is_not_found,
        test_record_login_leaves_updated_at,
        test_blacklist_is_idempotent,
        test_rotate_refuses_reused_token,
        test_flush_expired_cascades,
    );

    async fn sqlite_stores() -> Stores {
        let db = Database::sqlite_in_memory().await.unwrap();
        Stores::for_database(&db)
    }

    /// A freshly migrated schema of its own, so tests can run in parallel
    async fn postgres_stores() -> Option<Stores> {
        let url = std::env::var("TEST_DATABASE_URL").ok()?;
        let schema = format!("store_test_{}", uuid::Uuid::new_v4().simple());

        let admin = PgPool::connect(&url).await.unwrap();
        sqlx::query(&format!("CREATE SCHEMA {schema}"))
            .execute(&admin)
            .await
            .unwrap();
        admin.close().await;

        let options = url
            .parse::<PgConnectOptions>()
            .unwrap()
            .options([("search_path", schema.as_str())]);
        let pool = PgPoolOptions::new()
            .max_connections(2)
            .connect_with(options)
            .await
            .unwrap();

        let db = Database::Postgres(pool);
        db.migrate().await.unwrap();
        Some(Stores::for_database(&db))
    }

    fn token(user_id: i64, jti: &str, expires_in: Duration) -> OutstandingToken {
        let now = Utc::now();
        OutstandingToken {
            user_id: Some(user_id),
            jti: jti.to_string(),
            token: format!("encoded.{jti}"),
            created_at: now,
            expires_at: now + expires_in,
        }
    }

    async fn test_create_and_find(stores: Stores) {
        let user = stores
            .users
            .create(&NewUser::regular("viewer", "viewer@example.com", "hash"))
            .await
            .unwrap();

        assert!(user.id > 0);
        assert!(user.is_active);
        assert!(!user.is_staff);
        assert!(user.last_login.is_none());
        assert_eq!(user.created_at, user.updated_at);

        let by_email = stores.users.find_by_email("viewer@example.com").await.unwrap();
        assert_eq!(by_email.as_ref(), Some(&user));
        let by_id = stores.users.find_by_id(user.id).await.unwrap();
        assert_eq!(by_id, Some(user));
        assert!(stores.users.find_by_id(999).await.unwrap().is_none());
    }

    async fn test_duplicate_email_is_rejected_by_storage(stores: Stores) {
        stores
            .users
            .create(&NewUser::regular("first", "shared@example.com", "hash"))
            .await
            .unwrap();

        let err = stores
            .users
            .create(&NewUser::regular("second", "shared@example.com", "hash"))
            .await
            .unwrap_err();
        match err {
            Error::Database(e) => {
                assert_eq!(e.kind, DatabaseErrorKind::ConstraintViolation);
                assert!(e.violates("email"), "context was {:?}", e.context);
            }
            other => panic!("expected a constraint violation, got {other:?}"),
        }
    }

    async fn test_duplicate_username_names_the_column(stores: Stores) {
        stores
            .users
            .create(&NewUser::regular("viewer", "a@example.com", "hash"))
            .await
            .unwrap();
        let err = stores
            .users
            .create(&NewUser::regular("viewer", "b@example.com", "hash"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Database(ref e) if e.violates("username")));
    }

    async fn test_save_keeps_created_at_and_bumps_updated_at(stores: Stores) {
        let created = stores
            .users
            .create(&NewUser::regular("viewer", "viewer@example.com", "hash"))
            .await
            .unwrap();

        tokio::time::sleep(StdDuration::from_millis(5)).await;
        let mut changed = created.clone();
        changed.first_name = "Joyce".into();
        changed.created_at = Utc::now() + Duration::days(365);
        let first_save = stores.users.save(&changed).await.unwrap();

        assert_eq!(first_save.first_name, "Joyce");
        assert_eq!(first_save.created_at, created.created_at);
        assert!(first_save.updated_at > created.updated_at);

        tokio::time::sleep(StdDuration::from_millis(5)).await;
        let second_save = stores.users.save(&first_save).await.unwrap();
        assert_eq!(second_save.created_at, created.created_at);
        assert!(second_save.updated_at > first_save.updated_at);
    }

    async fn test_save_missing_user_is_not_found(stores: Stores) {
        let mut ghost = crate::accounts::model::sample_user();
        ghost.id = 4242;
        let err = stores.users.save(&ghost).await.unwrap_err();
        assert!(matches!(err, Error::Database(ref e) if e.kind == DatabaseErrorKind::NotFound));
    }

    async fn test_record_login_leaves_updated_at(stores: Stores) {
        let user = stores
            .users
            .create(&NewUser::regular("viewer", "viewer@example.com", "hash"))
            .await
            .unwrap();

        // PostgreSQL keeps microseconds
        let at = Utc::now().trunc_subsecs(6);
        stores.users.record_login(user.id, at).await.unwrap();
        let reloaded = stores.users.find_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(reloaded.last_login, Some(at));
        assert_eq!(reloaded.updated_at, user.updated_at);
    }

    async fn test_blacklist_is_idempotent(stores: Stores) {
        let user = stores
            .users
            .create(&NewUser::regular("viewer", "viewer@example.com", "hash"))
            .await
            .unwrap();
        let refresh = token(user.id, "jti-1", Duration::days(7));

        assert!(!stores.tokens.is_blacklisted("jti-1").await.unwrap());
        // never recorded as outstanding: blacklisting records it
        assert!(stores.tokens.blacklist(&refresh).await.unwrap());
        assert!(stores.tokens.is_blacklisted("jti-1").await.unwrap());
        assert!(!stores.tokens.blacklist(&refresh).await.unwrap());
    }

    async fn test_rotate_refuses_reused_token(stores: Stores) {
        let user = stores
            .users
            .create(&NewUser::regular("viewer", "viewer@example.com", "hash"))
            .await
            .unwrap();
        let old = token(user.id, "old", Duration::days(7));
        let first = token(user.id, "first", Duration::days(7));
        let second = token(user.id, "second", Duration::days(7));
        stores.tokens.record_outstanding(&old).await.unwrap();
        stores.tokens.record_outstanding(&old).await.unwrap();

        assert!(stores.tokens.rotate(&old, &first, true).await.unwrap());
        assert!(!stores.tokens.rotate(&old, &second, true).await.unwrap());
        assert!(stores.tokens.is_blacklisted("old").await.unwrap());
        assert!(!stores.tokens.is_blacklisted("first").await.unwrap());

        // without blacklisting the old token stays usable
        assert!(stores.tokens.rotate(&first, &second, false).await.unwrap());
        assert!(!stores.tokens.is_blacklisted("first").await.unwrap());
    }

    async fn test_flush_expired_cascades(stores: Stores) {
        let user = stores
            .users
            .create(&NewUser::regular("viewer", "viewer@example.com", "hash"))
            .await
            .unwrap();
        let expired = token(user.id, "expired", Duration::seconds(-60));
        let live = token(user.id, "live", Duration::days(1));
        stores.tokens.blacklist(&expired).await.unwrap();
        stores.tokens.record_outstanding(&live).await.unwrap();

        assert_eq!(stores.tokens.flush_expired(Utc::now()).await.unwrap(), 1);
        assert!(!stores.tokens.is_blacklisted("expired").await.unwrap());
        assert_eq!(stores.tokens.flush_expired(Utc::now()).await.unwrap(), 0);
    }
}
