//! Middleware for authentication, host validation, CORS and request tracking

pub mod auth;
pub mod cors;
pub mod hosts;
pub mod request_tracking;
pub mod security;

pub use auth::{extract_token, require_auth};
pub use cors::cors_layer;
pub use hosts::validate_host;
pub use request_tracking::{
    apply_request_tracking, MakeTypedRequestId, PROPAGATE_HEADERS, SENSITIVE_HEADERS,
};
pub use security::{apply_security_headers, enforce_https, is_secure};
