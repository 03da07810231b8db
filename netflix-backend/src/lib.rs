//! # netflix-backend
//!
//! Account and token backend for the Netflix clone frontend.
//!
//! ## Features
//!
//! - **Environment settings**: `SECRET_KEY`, `DEBUG`, `ALLOWED_HOSTS`, database
//!   selection and CORS origins resolved once at startup
//! - **Storage**: PostgreSQL or SQLite through sqlx, with bundled migrations
//! - **Accounts**: unique email, immutable `created_at`, `updated_at` bumped on save
//! - **JWT auth**: access/refresh tokens with rotation and a refresh blacklist
//! - **Middleware**: host validation, CORS, HTTPS redirect, security headers,
//!   request IDs, panic recovery, body limits, timeouts, compression
//! - **Health checks**: liveness and readiness probes
//!
//! ## Example
//!
//! ```rust,no_run
//! use netflix_backend::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = Config::load()?;
//!     let settings = Settings::from_process_env(std::env::current_dir()?)?;
//!     init_tracing(&config, settings.debug)?;
//!
//!     let state = AppState::builder()
//!         .config(config.clone())
//!         .settings(settings)
//!         .build()
//!         .await?;
//!
//!     Server::new(config).serve(application(state)).await?;
//!
//!     Ok(())
//! }
//! ```

pub mod accounts;
pub mod application;
pub mod auth;
pub mod config;
pub mod database;
pub mod error;
pub mod extract;
pub mod health;
pub mod middleware;
pub mod observability;
pub mod server;
pub mod settings;
pub mod state;
pub mod store;

/// Common imports
pub mod prelude {
    pub use crate::accounts::{AccountService, NewUser, User, UserResponse, UserStore};
    pub use crate::application::application;
    pub use crate::auth::{Claims, JwtManager, PasswordHasher, TokenPair, TokenStore, TokenType};
    pub use crate::config::Config;
    pub use crate::database::Database;
    pub use crate::error::{DatabaseError, DatabaseErrorKind, DatabaseOperation, Error, Result};
    pub use crate::extract::{CurrentUser, Json};
    pub use crate::health::{health, readiness};
    pub use crate::observability::init_tracing;
    pub use crate::server::Server;
    pub use crate::settings::{AllowedHosts, Backend, DatabaseSettings, Settings};
    pub use crate::state::AppState;

    pub use axum::{
        routing::{delete, get, patch, post, put},
        Router,
    };
}
