//! Cross-origin policy

use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::settings::CorsSettings;

/// Build the CORS layer from resolved settings
///
/// Browsers refuse `Access-Control-Allow-Origin: *` on credentialed requests,
/// so allow-all mirrors the caller's `Origin` instead.
pub fn cors_layer(settings: &CorsSettings) -> CorsLayer {
    let origin = if settings.allow_all_origins {
        tracing::debug!("CORS allows every origin");
        AllowOrigin::mirror_request()
    } else {
        tracing::debug!(origins = settings.allowed_origins.len(), "CORS restricted to allow-list");
        AllowOrigin::list(settings.allowed_origins.clone())
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(settings.allow_credentials)
        .allow_methods(settings.allowed_methods.clone())
        .allow_headers(settings.allowed_headers.clone())
        .max_age(settings.max_age)
}
