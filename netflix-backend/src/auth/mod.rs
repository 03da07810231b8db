//! Authentication primitives
//!
//! - [`password`]: Argon2id hashing
//! - [`tokens`]: JWT access/refresh token issue and validation
//! - [`blacklist`]: refresh token bookkeeping for rotation and logout

pub mod blacklist;
pub mod password;
pub mod tokens;

pub use blacklist::{OutstandingToken, TokenStore};
pub use password::PasswordHasher;
pub use tokens::{Claims, IssuedToken, JwtManager, TokenPair, TokenType};
