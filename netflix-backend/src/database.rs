//! Database connection pool management
//!
//! One pool per process, for whichever engine the environment selected.
//! Schemas ship as embedded migrations, one directory per engine.

use std::str::FromStr;
use std::time::Duration;

use sqlx::{
    postgres::{PgConnectOptions, PgPoolOptions},
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    PgPool, SqlitePool,
};

use crate::{
    config::DatabasePoolConfig,
    error::{DatabaseError, DatabaseErrorKind, Error, Result},
    settings::{Backend, DatabaseSettings},
};

/// A connection pool for the selected engine
#[derive(Debug, Clone)]
pub enum Database {
    /// PostgreSQL pool
    Postgres(PgPool),
    /// SQLite pool
    Sqlite(SqlitePool),
}

enum ConnectOptions {
    Postgres(PgConnectOptions),
    Sqlite(SqliteConnectOptions),
}

/// Backoff doubles per attempt up to this many doublings
const MAX_BACKOFF_DOUBLINGS: u32 = 10;

/// Delay before retry number `attempt` (1-based)
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let doublings = attempt.saturating_sub(1).min(MAX_BACKOFF_DOUBLINGS);
    base.saturating_mul(2_u32.pow(doublings))
}

/// Pool behaviour that depends on how the database was selected
struct Lifecycle {
    max_lifetime: Option<Duration>,
    test_before_acquire: bool,
}

impl Database {
    /// Connect with retry logic
    ///
    /// Uses exponential backoff between attempts; configuration errors are
    /// not retried.
    pub async fn connect(settings: &DatabaseSettings, config: &DatabasePoolConfig) -> Result<Self> {
        let mut attempt = 0;
        let base_delay = Duration::from_secs(config.retry_delay_secs);
        let target = settings.describe();

        loop {
            match Self::try_connect(settings, config).await {
                Ok(db) => {
                    if attempt > 0 {
                        tracing::info!(
                            "Database connection established after {} attempt(s)",
                            attempt + 1
                        );
                    } else {
                        tracing::info!(
                            backend = %db.backend(),
                            %target,
                            "Database connection pool created: max={}, min={}",
                            config.max_connections,
                            config.min_connections
                        );
                    }
                    return Ok(db);
                }
                Err(Error::Database(e)) if e.kind != DatabaseErrorKind::Configuration => {
                    attempt += 1;

                    if attempt > config.max_retries {
                        tracing::error!(
                            %target,
                            "Failed to connect to database after {} attempts: {}",
                            config.max_retries + 1,
                            e
                        );
                        return Err(Error::Database(e));
                    }

                    let delay = backoff_delay(base_delay, attempt);
                    tracing::warn!(
                        %target,
                        "Database connection attempt {} failed: {}. Retrying in {:?}...",
                        attempt,
                        e,
                        delay
                    );

                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Attempt to create a pool (single try)
    async fn try_connect(settings: &DatabaseSettings, config: &DatabasePoolConfig) -> Result<Self> {
        let (options, lifecycle) = connect_options(settings)?;
        let acquire_timeout = Duration::from_secs(config.connection_timeout_secs);

        let db = match options {
            ConnectOptions::Postgres(options) => {
                let pool = PgPoolOptions::new()
                    .max_connections(config.max_connections)
                    .min_connections(config.min_connections)
                    .acquire_timeout(acquire_timeout)
                    .max_lifetime(lifecycle.max_lifetime)
                    .test_before_acquire(lifecycle.test_before_acquire)
                    .connect_with(options)
                    .await
                    .map_err(connect_error)?;
                Self::Postgres(pool)
            }
            ConnectOptions::Sqlite(options) => {
                let pool = SqlitePoolOptions::new()
                    .max_connections(config.max_connections)
                    .min_connections(config.min_connections)
                    .acquire_timeout(acquire_timeout)
                    .max_lifetime(lifecycle.max_lifetime)
                    .test_before_acquire(lifecycle.test_before_acquire)
                    .connect_with(options)
                    .await
                    .map_err(connect_error)?;
                Self::Sqlite(pool)
            }
        };

        Ok(db)
    }

    /// Single-connection in-memory SQLite database, migrated
    ///
    /// The connection is never recycled; dropping it would drop the data.
    pub async fn sqlite_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(connect_error)?
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(connect_error)?;

        let db = Self::Sqlite(pool);
        db.migrate().await?;
        Ok(db)
    }

    /// The engine behind this pool
    pub fn backend(&self) -> Backend {
        match self {
            Self::Postgres(_) => Backend::Postgres,
            Self::Sqlite(_) => Backend::Sqlite,
        }
    }

    /// Apply pending migrations
    pub async fn migrate(&self) -> Result<()> {
        match self {
            Self::Postgres(pool) => sqlx::migrate!("./migrations/postgres").run(pool).await?,
            Self::Sqlite(pool) => sqlx::migrate!("./migrations/sqlite").run(pool).await?,
        }
        tracing::info!(backend = %self.backend(), "Database migrations applied");
        Ok(())
    }

    /// Round-trip a trivial query
    pub async fn ping(&self) -> Result<()> {
        match self {
            Self::Postgres(pool) => {
                sqlx::query("SELECT 1").execute(pool).await?;
            }
            Self::Sqlite(pool) => {
                sqlx::query("SELECT 1").execute(pool).await?;
            }
        }
        Ok(())
    }

    /// Close every connection in the pool
    pub async fn close(&self) {
        match self {
            Self::Postgres(pool) => pool.close().await,
            Self::Sqlite(pool) => pool.close().await,
        }
    }
}

fn connect_options(settings: &DatabaseSettings) -> Result<(ConnectOptions, Lifecycle)> {
    // Fixed settings keep sqlx's default recycling and skip the ping
    let pooled = Lifecycle {
        max_lifetime: Some(Duration::from_secs(30 * 60)),
        test_before_acquire: false,
    };

    match settings {
        DatabaseSettings::Url {
            url,
            backend,
            conn_max_age,
            health_checks,
        } => {
            let lifecycle = Lifecycle {
                max_lifetime: Some(*conn_max_age),
                test_before_acquire: *health_checks,
            };
            let options = match backend {
                Backend::Postgres => {
                    ConnectOptions::Postgres(PgConnectOptions::from_str(url).map_err(connect_error)?)
                }
                Backend::Sqlite => ConnectOptions::Sqlite(
                    SqliteConnectOptions::from_str(url)
                        .map_err(connect_error)?
                        .create_if_missing(true)
                        .foreign_keys(true),
                ),
            };
            Ok((options, lifecycle))
        }
        DatabaseSettings::Sqlite { path } => Ok((
            ConnectOptions::Sqlite(
                SqliteConnectOptions::new()
                    .filename(path)
                    .create_if_missing(true)
                    .foreign_keys(true),
            ),
            pooled,
        )),
        DatabaseSettings::Postgres(pg) => Ok((
            ConnectOptions::Postgres(
                PgConnectOptions::new()
                    .host(&pg.host)
                    .port(pg.port)
                    .username(&pg.user)
                    .password(&pg.password)
                    .database(&pg.name),
            ),
            pooled,
        )),
    }
}

fn connect_error(err: sqlx::Error) -> Error {
    let hint = categorize_db_error(&err);
    let mut db_err = DatabaseError::from(err);
    if db_err.kind != DatabaseErrorKind::Configuration {
        db_err.kind = DatabaseErrorKind::ConnectionFailed;
    }
    db_err.operation = crate::error::DatabaseOperation::Connect;
    Error::Database(db_err.add_context(hint))
}

/// Categorize database error for better operator guidance
fn categorize_db_error(err: &sqlx::Error) -> &'static str {
    use sqlx::Error;
    match err {
        Error::Configuration(_) => "Configuration error",
        Error::Database(_) => "Database rejected the connection - check credentials and database name",
        Error::Io(_) => "Network I/O error - check connectivity",
        Error::Tls(_) => "TLS/SSL error - check certificate configuration",
        Error::PoolTimedOut => "Connection pool timeout - database may be overloaded",
        Error::PoolClosed => "Connection pool closed",
        Error::WorkerCrashed => "Database worker crashed",
        _ => "Connection error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{PostgresSettings, URL_CONN_MAX_AGE};

    #[test]
    fn test_backoff_delay_is_capped() {
        let base = Duration::from_secs(2);
        assert_eq!(backoff_delay(base, 1), Duration::from_secs(2));
        assert_eq!(backoff_delay(base, 3), Duration::from_secs(8));
        assert_eq!(backoff_delay(base, 11), Duration::from_secs(2048));
        assert_eq!(backoff_delay(base, 40), Duration::from_secs(2048));
        assert_eq!(backoff_delay(base, u32::MAX), Duration::from_secs(2048));
        assert_eq!(
            backoff_delay(Duration::from_secs(u64::MAX), 5),
            Duration::MAX
        );
    }

    #[tokio::test]
    async fn test_in_memory_sqlite_is_migrated() {
        let db = Database::sqlite_in_memory().await.unwrap();
        assert_eq!(db.backend(), Backend::Sqlite);
        db.ping().await.unwrap();

        let Database::Sqlite(pool) = &db else {
            panic!("expected sqlite");
        };
        let tables: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE '\\_%' ESCAPE '\\' ORDER BY name",
        )
        .fetch_all(pool)
        .await
        .unwrap();
        let names: Vec<_> = tables.into_iter().map(|(n,)| n).collect();
        assert_eq!(names, ["blacklisted_tokens", "outstanding_tokens", "users"]);
    }

    #[tokio::test]
    async fn test_sqlite_file_is_created_under_base_dir() {
        let dir = tempfile::tempdir().unwrap();
        let settings = DatabaseSettings::Sqlite {
            path: dir.path().join("db.sqlite3"),
        };
        let config = DatabasePoolConfig {
            max_retries: 0,
            ..Default::default()
        };

        let db = Database::connect(&settings, &config).await.unwrap();
        db.migrate().await.unwrap();
        db.close().await;
        assert!(dir.path().join("db.sqlite3").exists());
    }

    #[test]
    fn test_url_branch_recycles_connections() {
        let settings = DatabaseSettings::from_url("postgres://app:pw@db.internal:5432/netflix").unwrap();
        let (options, lifecycle) = connect_options(&settings).unwrap();
        assert!(matches!(options, ConnectOptions::Postgres(_)));
        assert_eq!(lifecycle.max_lifetime, Some(URL_CONN_MAX_AGE));
        assert!(lifecycle.test_before_acquire);

        let parts = DatabaseSettings::Postgres(PostgresSettings {
            name: "netflix_db".into(),
            user: "postgres".into(),
            password: "1234".into(),
            host: "localhost".into(),
            port: 5432,
        });
        let (options, lifecycle) = connect_options(&parts).unwrap();
        assert!(matches!(options, ConnectOptions::Postgres(_)));
        assert!(!lifecycle.test_before_acquire);
    }

    #[tokio::test]
    async fn test_unreachable_postgres_gives_up() {
        let settings = DatabaseSettings::from_url("postgres://app:pw@127.0.0.1:1/netflix").unwrap();
        let config = DatabasePoolConfig {
            max_retries: 0,
            connection_timeout_secs: 1,
            ..Default::default()
        };
        let err = Database::connect(&settings, &config).await.unwrap_err();
        match err {
            Error::Database(e) => assert!(e.is_retriable()),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
