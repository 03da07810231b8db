//! `Host` header validation against `ALLOWED_HOSTS`

use axum::{
    body::Body,
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::error::Error;
use crate::state::AppState;

/// Host the client addressed: the `Host` header, else the URI authority
pub fn request_host<B>(request: &Request<B>) -> Option<String> {
    request
        .headers()
        .get(http::header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| request.uri().authority().map(|a| a.to_string()))
}

/// Reject requests whose host is not in the allow-list
pub async fn validate_host(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, Error> {
    let host = request_host(&request);
    if !state.settings().allowed_hosts.permits(host.as_deref()) {
        return Err(Error::DisallowedHost(
            host.unwrap_or_else(|| "<missing>".to_string()),
        ));
    }
    Ok(next.run(request).await)
}
