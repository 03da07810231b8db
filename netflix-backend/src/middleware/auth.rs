//! Bearer token authentication for protected routes

use axum::{
    body::Body,
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};

use crate::error::Error;
use crate::extract::CurrentUser;
use crate::state::AppState;

/// Extract the bearer token from the `Authorization` header
pub fn extract_token(headers: &HeaderMap) -> Result<String, Error> {
    let auth_header = headers
        .get(http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            Error::Unauthorized("Authentication credentials were not provided.".to_string())
        })?;

    match auth_header.split_once(' ') {
        Some(("Bearer", token)) if !token.is_empty() && !token.contains(' ') => {
            Ok(token.to_string())
        }
        _ => Err(Error::Unauthorized(
            "Authorization header must contain two space-delimited values".to_string(),
        )),
    }
}

/// Resolve the access token to an active account and expose it as
/// [`CurrentUser`]
///
/// Attach with `route_layer` so unmatched paths still answer 404.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, Error> {
    let token = extract_token(request.headers())?;
    let user = state.accounts().authenticate(&token).await?;

    tracing::debug!(user_id = user.id, "Request authenticated");
    request.extensions_mut().insert(CurrentUser(user));

    Ok(next.run(request).await)
}
