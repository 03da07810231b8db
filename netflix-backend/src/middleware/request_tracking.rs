//! Request tracking: request IDs, header propagation and log masking

use axum::{http::HeaderName, Router};
use http::Request;
use tower_http::{
    propagate_header::PropagateHeaderLayer,
    request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer},
    sensitive_headers::SetSensitiveRequestHeadersLayer,
};
use uuid::Uuid;

use crate::config::RequestTrackingConfig;
use crate::error::{Error, Result};

/// Correlation headers echoed from request to response
pub const PROPAGATE_HEADERS: &[&str] = &["x-trace-id", "x-span-id", "x-correlation-id"];

/// Headers masked in trace output
pub const SENSITIVE_HEADERS: &[&str] = &[
    "authorization",
    "cookie",
    "set-cookie",
    "x-api-key",
    "x-auth-token",
];

/// Request IDs of the form `req_<uuidv7>` (time-sortable)
#[derive(Debug, Clone, Copy, Default)]
pub struct MakeTypedRequestId;

impl MakeTypedRequestId {
    /// Prefix shared by every generated ID
    pub const PREFIX: &'static str = "req";
}

impl MakeRequestId for MakeTypedRequestId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        let id = format!("{}_{}", Self::PREFIX, Uuid::now_v7().simple());
        let header_value = http::HeaderValue::from_str(&id).ok()?;
        Some(RequestId::new(header_value))
    }
}

/// Wrap `app` in the request tracking layers the configuration enables
///
/// Must be applied after the trace layer so the ID exists before the span is
/// created.
pub fn apply_request_tracking<S>(
    mut app: Router<S>,
    config: &RequestTrackingConfig,
) -> Result<Router<S>>
where
    S: Clone + Send + Sync + 'static,
{
    if config.mask_sensitive_headers {
        let headers = SENSITIVE_HEADERS
            .iter()
            .map(|h| HeaderName::from_static(h))
            .collect::<Vec<_>>();
        app = app.layer(SetSensitiveRequestHeadersLayer::new(headers));
    }

    if config.propagate_headers {
        for name in PROPAGATE_HEADERS {
            app = app.layer(PropagateHeaderLayer::new(HeaderName::from_static(name)));
        }
    }

    if config.request_id_enabled {
        let header = HeaderName::try_from(config.request_id_header.as_str()).map_err(|e| {
            Error::config(format!(
                "Invalid request ID header {:?}: {}",
                config.request_id_header, e
            ))
        })?;
        if config.propagate_headers {
            app = app.layer(PropagateRequestIdLayer::new(header.clone()));
        }
        app = app.layer(SetRequestIdLayer::new(header, MakeTypedRequestId));
    }

    Ok(app)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, routing::get};
    use tower::ServiceExt;

    #[test]
    fn test_request_id_format() {
        let mut maker = MakeTypedRequestId;
        let request = Request::builder().body(()).unwrap();
        let id = maker.make_request_id(&request).unwrap();
        let id = id.header_value().to_str().unwrap();
        assert!(id.starts_with("req_"));
        assert_eq!(id.len(), 4 + 32);
    }

    #[test]
    fn test_sensitive_headers_constant() {
        assert!(SENSITIVE_HEADERS.contains(&"authorization"));
        assert!(SENSITIVE_HEADERS.contains(&"cookie"));
    }

    #[tokio::test]
    async fn test_request_id_generated_and_echoed() {
        let app = apply_request_tracking(
            Router::new().route("/", get(|| async { "ok" })),
            &RequestTrackingConfig::default(),
        )
        .unwrap();

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let id = response.headers().get("x-request-id").unwrap();
        assert!(id.to_str().unwrap().starts_with("req_"));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header("x-request-id", "from-gateway")
                    .header("x-correlation-id", "corr-1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.headers()["x-request-id"], "from-gateway");
        assert_eq!(response.headers()["x-correlation-id"], "corr-1");
    }

    #[test]
    fn test_invalid_header_name() {
        let config = RequestTrackingConfig {
            request_id_header: "bad header".into(),
            ..Default::default()
        };
        let err = apply_request_tracking(Router::<()>::new(), &config).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
