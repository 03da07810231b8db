//! HTTPS enforcement and security headers
//!
//! The static headers are plain `SetResponseHeaderLayer`s. The redirect and
//! HSTS depend on whether the request arrived over TLS, so they run as one
//! middleware function.

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Router,
};
use tower_http::set_header::SetResponseHeaderLayer;

use super::hosts::request_host;
use crate::error::Error;
use crate::settings::SecuritySettings;
use crate::state::AppState;

/// Whether the request reached us over HTTPS
///
/// `X-Forwarded-Proto` is only consulted when `trust_forwarded_proto` is set.
pub fn is_secure<B>(request: &Request<B>, trust_forwarded_proto: bool) -> bool {
    if request.uri().scheme_str() == Some("https") {
        return true;
    }
    if !trust_forwarded_proto {
        return false;
    }
    request
        .headers()
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .map(|proto| {
            proto
                .split(',')
                .next()
                .unwrap_or_default()
                .trim()
                .eq_ignore_ascii_case("https")
        })
        .unwrap_or(false)
}

/// Add the response headers that don't depend on the request
pub fn apply_security_headers<S>(mut app: Router<S>, config: &SecuritySettings) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    if config.content_type_nosniff {
        app = app.layer(SetResponseHeaderLayer::if_not_present(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ));
    }

    if config.browser_xss_filter {
        app = app.layer(SetResponseHeaderLayer::if_not_present(
            header::X_XSS_PROTECTION,
            HeaderValue::from_static("1; mode=block"),
        ));
    }

    if !config.x_frame_options.is_empty() {
        app = app.layer(SetResponseHeaderLayer::if_not_present(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static(config.x_frame_options),
        ));
    }

    if !config.referrer_policy.is_empty() {
        app = app.layer(SetResponseHeaderLayer::if_not_present(
            header::REFERRER_POLICY,
            HeaderValue::from_static(config.referrer_policy),
        ));
    }

    app
}

/// Redirect plain HTTP to HTTPS when configured and send HSTS on secure
/// responses
pub async fn enforce_https(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, Error> {
    let security = &state.settings().security;
    let secure = is_secure(&request, state.config().middleware.trust_forwarded_proto);

    if security.ssl_redirect && !secure {
        let host = request_host(&request);
        if !state.settings().allowed_hosts.permits(host.as_deref()) {
            return Err(Error::DisallowedHost(
                host.unwrap_or_else(|| "<missing>".to_string()),
            ));
        }
        let host = host.unwrap_or_default();
        let path_and_query = request
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");

        let location = HeaderValue::from_str(&format!("https://{host}{path_and_query}"))
            .map_err(|_| Error::BadRequest("Invalid redirect location".to_string()))?;
        return Ok((StatusCode::MOVED_PERMANENTLY, [(header::LOCATION, location)]).into_response());
    }

    let mut response = next.run(request).await;

    if secure {
        if let Some(hsts) = security.hsts {
            if let Ok(value) = HeaderValue::from_str(&hsts.header_value()) {
                response
                    .headers_mut()
                    .entry(header::STRICT_TRANSPORT_SECURITY)
                    .or_insert(value);
            }
        }
    }

    Ok(response)
}
