//! User accounts
//!
//! The account model, its storage seam, input validation and the operations
//! the HTTP layer and the management commands call into.

pub mod handlers;
pub mod model;
pub mod payloads;
pub mod service;
pub mod store;
pub mod validation;

pub use model::{NewUser, User, UserResponse};
pub use payloads::{
    AuthResponse, LoginRequest, LogoutRequest, MessageResponse, ProfileUpdate, RefreshRequest,
    RegisterRequest, VerifyRequest,
};
pub use service::AccountService;
pub use store::UserStore;
