//! Application state management

use std::sync::Arc;

use crate::{
    accounts::AccountService,
    auth::JwtManager,
    config::Config,
    database::Database,
    error::{Error, Result},
    settings::Settings,
    store::Stores,
};

/// Application state shared across handlers
///
/// Cheap to clone; configuration is immutable after startup.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    settings: Arc<Settings>,
    db: Database,
    accounts: AccountService,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("service", &self.config.service.name)
            .field("debug", &self.settings.debug)
            .field("backend", &self.db.backend())
            .finish_non_exhaustive()
    }
}

impl AppState {
    /// Create a new builder
    pub fn builder() -> AppStateBuilder {
        AppStateBuilder::new()
    }

    /// Service tuning
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Environment settings
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Database pool
    pub fn db(&self) -> &Database {
        &self.db
    }

    /// Account operations
    pub fn accounts(&self) -> &AccountService {
        &self.accounts
    }
}

/// Builder for AppState
#[derive(Default)]
pub struct AppStateBuilder {
    config: Option<Config>,
    settings: Option<Settings>,
    db: Option<Database>,
}

impl AppStateBuilder {
    /// Create a new builder
    ///
    /// Config falls back to `Config::default()`; settings are required.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the configuration
    pub fn config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the environment settings
    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Use an already-connected database instead of connecting in `build()`
    pub fn database(mut self, db: Database) -> Self {
        self.db = Some(db);
        self
    }

    /// Build the AppState, connecting and migrating the database if needed
    pub async fn build(self) -> Result<AppState> {
        let config = self.config.unwrap_or_default();
        let settings = self
            .settings
            .ok_or_else(|| Error::config("AppState requires resolved settings"))?;

        let db = match self.db {
            Some(db) => db,
            None => {
                let db = Database::connect(&settings.database, &config.database).await?;
                if config.database.run_migrations {
                    db.migrate().await?;
                }
                db
            }
        };

        let jwt = JwtManager::new(&settings.secret_key, &config.auth.tokens)?;
        let accounts = AccountService::new(Stores::for_database(&db), jwt, &config.auth.password)?;

        Ok(AppState {
            config: Arc::new(config),
            settings: Arc::new(settings),
            db,
            accounts,
        })
    }
}

/// State over a fresh in-memory database with debug settings
#[cfg(test)]
pub(crate) async fn test_state_with(env: &[(&str, &str)]) -> AppState {
    test_state_configured(env, |_| {}).await
}

#[cfg(test)]
pub(crate) async fn test_state_configured(
    env: &[(&str, &str)],
    adjust: impl FnOnce(&mut Config),
) -> AppState {
    let mut config = Config::default();
    config.auth.password = crate::auth::password::test_config();
    adjust(&mut config);

    AppState::builder()
        .config(config)
        .settings(Settings::from_env(env, "/tmp/netflix-backend-tests").unwrap())
        .database(Database::sqlite_in_memory().await.unwrap())
        .build()
        .await
        .unwrap()
}

#[cfg(test)]
pub(crate) async fn test_state() -> AppState {
    test_state_with(&[("DEBUG", "True")]).await
}
