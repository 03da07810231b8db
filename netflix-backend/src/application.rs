//! The HTTP application
//!
//! [`application`] assembles routes and the settings-driven middleware (host
//! validation, CORS, HTTPS enforcement, security headers). Transport concerns
//! such as timeouts and compression are added by [`Server`](crate::server::Server).

use axum::{
    http::Uri,
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};

use crate::accounts::handlers;
use crate::error::Error;
use crate::health;
use crate::middleware::{
    apply_security_headers, cors_layer, enforce_https, require_auth, validate_host,
};
use crate::state::AppState;

/// Build the router serving every endpoint
pub fn application(state: AppState) -> Router {
    let settings = state.settings();

    let public = Router::new()
        .route("/api/auth/register/", post(handlers::register))
        .route("/api/auth/login/", post(handlers::login))
        .route("/api/auth/token/refresh/", post(handlers::refresh))
        .route("/api/auth/token/verify/", post(handlers::verify));

    let protected = Router::new()
        .route("/api/auth/logout/", post(handlers::logout))
        .route(
            "/api/auth/profile/",
            get(handlers::profile)
                .put(handlers::update_profile)
                .patch(handlers::update_profile),
        )
        .route_layer(from_fn_with_state(state.clone(), require_auth));

    let app = Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(health::readiness))
        .merge(public)
        .merge(protected)
        .fallback(not_found);

    let app = app
        .layer(from_fn_with_state(state.clone(), validate_host))
        .layer(cors_layer(&settings.cors))
        .layer(from_fn_with_state(state.clone(), enforce_https));

    // Outermost, so rejections and redirects carry the headers too
    apply_security_headers(app, &settings.security).with_state(state)
}

async fn not_found(uri: Uri) -> Error {
    Error::NotFound(format!("No route for {}", uri.path()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{test_state, test_state_configured, test_state_with};
    use axum::{
        body::Body,
        http::{header, HeaderMap, Method, Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    const PASSWORD: &str = "demogorgon-stew-42";
    const PROD_KEY: &str = "k3y-for-tests-0123456789-abcdefghijklmnopqrstuvwxyz-ABCDEF";

    struct Reply {
        status: StatusCode,
        headers: HeaderMap,
        body: Value,
    }

    async fn send(app: &Router, request: Request<Body>) -> Reply {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        Reply {
            status,
            headers,
            body,
        }
    }

    fn json_request(method: Method, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn get_request(uri: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn register(app: &Router, email: &str) -> Value {
        let reply = send(
            app,
            json_request(
                Method::POST,
                "/api/auth/register/",
                None,
                json!({"email": email, "password": PASSWORD, "password2": PASSWORD}),
            ),
        )
        .await;
        assert_eq!(reply.status, StatusCode::CREATED, "{}", reply.body);
        reply.body
    }

    #[tokio::test]
    async fn test_health_endpoints() {
        let app = application(test_state().await);

        let reply = send(&app, get_request("/health", None)).await;
        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(reply.body["status"], "healthy");
        assert_eq!(reply.body["service"], "netflix-backend");

        let reply = send(&app, get_request("/ready", None)).await;
        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(reply.body["ready"], true);
    }

    #[tokio::test]
    async fn test_account_flow() {
        let app = application(test_state().await);

        let registered = register(&app, "eleven@hawkins.org").await;
        assert_eq!(registered["message"], "User registered successfully");
        assert_eq!(registered["user"]["username"], "eleven");
        assert!(registered["user"].get("password_hash").is_none());

        let login = send(
            &app,
            json_request(
                Method::POST,
                "/api/auth/login/",
                None,
                json!({"email": "eleven@hawkins.org", "password": PASSWORD}),
            ),
        )
        .await;
        assert_eq!(login.status, StatusCode::OK);
        assert_eq!(login.body["message"], "Login successful");
        let access = login.body["tokens"]["access"].as_str().unwrap().to_string();
        let refresh = login.body["tokens"]["refresh"].as_str().unwrap().to_string();

        let profile = send(&app, get_request("/api/auth/profile/", Some(&access))).await;
        assert_eq!(profile.status, StatusCode::OK);
        assert_eq!(profile.body["email"], "eleven@hawkins.org");

        let patched = send(
            &app,
            json_request(
                Method::PATCH,
                "/api/auth/profile/",
                Some(&access),
                json!({"first_name": "Jane", "last_name": "Hopper"}),
            ),
        )
        .await;
        assert_eq!(patched.status, StatusCode::OK);
        assert_eq!(patched.body["first_name"], "Jane");
        assert_eq!(patched.body["created_at"], profile.body["created_at"]);
        assert_ne!(patched.body["updated_at"], profile.body["updated_at"]);

        let verified = send(
            &app,
            json_request(Method::POST, "/api/auth/token/verify/", None, json!({"token": access})),
        )
        .await;
        assert_eq!(verified.status, StatusCode::OK);
        assert_eq!(verified.body, json!({}));

        let rotated = send(
            &app,
            json_request(
                Method::POST,
                "/api/auth/token/refresh/",
                None,
                json!({"refresh": refresh}),
            ),
        )
        .await;
        assert_eq!(rotated.status, StatusCode::OK);
        let new_refresh = rotated.body["refresh"].as_str().unwrap().to_string();
        assert_ne!(new_refresh, refresh);

        let logout = send(
            &app,
            json_request(
                Method::POST,
                "/api/auth/logout/",
                Some(&access),
                json!({"refresh_token": new_refresh}),
            ),
        )
        .await;
        assert_eq!(logout.status, StatusCode::OK);
        assert_eq!(logout.body["message"], "Logout successful");

        let reuse = send(
            &app,
            json_request(
                Method::POST,
                "/api/auth/token/refresh/",
                None,
                json!({"refresh": new_refresh}),
            ),
        )
        .await;
        assert_eq!(reuse.status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_register_validation_shape() {
        let app = application(test_state().await);
        let reply = send(
            &app,
            json_request(
                Method::POST,
                "/api/auth/register/",
                None,
                json!({"email": "nope", "password": "123", "password2": "456"}),
            ),
        )
        .await;

        assert_eq!(reply.status, StatusCode::BAD_REQUEST);
        assert_eq!(reply.body["code"], "VALIDATION_ERROR");
        assert_eq!(reply.body["status"], 400);
        assert!(reply.body["fields"]["email"].is_array());
        assert!(reply.body["fields"]["password"].is_array());
    }

    #[tokio::test]
    async fn test_duplicate_email_over_http() {
        let app = application(test_state().await);
        register(&app, "viewer@example.com").await;

        let reply = send(
            &app,
            json_request(
                Method::POST,
                "/api/auth/register/",
                None,
                json!({
                    "email": "viewer@example.com",
                    "username": "someone",
                    "password": PASSWORD,
                    "password2": PASSWORD
                }),
            ),
        )
        .await;
        assert_eq!(reply.status, StatusCode::BAD_REQUEST);
        assert!(reply.body["fields"]["email"].is_array());
    }

    #[tokio::test]
    async fn test_protected_routes_need_a_bearer_token() {
        let app = application(test_state().await);

        let reply = send(&app, get_request("/api/auth/profile/", None)).await;
        assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
        assert_eq!(reply.headers[header::WWW_AUTHENTICATE], "Bearer realm=\"api\"");

        let reply = send(&app, get_request("/api/auth/profile/", Some("not-a-jwt"))).await;
        assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
        assert_eq!(reply.body["code"], "token_not_valid");

        let registered = register(&app, "viewer@example.com").await;
        let refresh = registered["tokens"]["refresh"].as_str().unwrap();
        let reply = send(&app, get_request("/api/auth/profile/", Some(refresh))).await;
        assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_malformed_body_and_unknown_route() {
        let app = application(test_state().await);

        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/auth/login/")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{oops"))
            .unwrap();
        let reply = send(&app, request).await;
        assert_eq!(reply.status, StatusCode::BAD_REQUEST);
        assert_eq!(reply.body["code"], "BAD_REQUEST");

        let reply = send(&app, get_request("/api/movies/", None)).await;
        assert_eq!(reply.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_host_validation() {
        let app = application(
            test_state_with(&[("DEBUG", "True"), ("ALLOWED_HOSTS", "api.example.com, .example.org")])
                .await,
        );

        for (host, expected) in [
            ("api.example.com", StatusCode::OK),
            ("api.example.com:8000", StatusCode::OK),
            ("cdn.example.org", StatusCode::OK),
            ("example.org", StatusCode::OK),
            ("evil.example.net", StatusCode::BAD_REQUEST),
        ] {
            let request = Request::builder()
                .uri("/health")
                .header(header::HOST, host)
                .body(Body::empty())
                .unwrap();
            assert_eq!(send(&app, request).await.status, expected, "host {host}");
        }

        let reply = send(&app, get_request("/health", None)).await;
        assert_eq!(reply.status, StatusCode::BAD_REQUEST);
        assert_eq!(reply.body["code"], "DISALLOWED_HOST");
    }

    #[tokio::test]
    async fn test_production_without_hosts_rejects_everything() {
        let app = application(
            test_state_with(&[("DEBUG", "False"), ("SECRET_KEY", PROD_KEY)]).await,
        );
        let request = Request::builder()
            .uri("/health")
            .header(header::HOST, "localhost")
            .body(Body::empty())
            .unwrap();
        assert_eq!(send(&app, request).await.status, StatusCode::BAD_REQUEST);
    }

    const PROD_REDIRECT: &[(&str, &str)] = &[
        ("DEBUG", "False"),
        ("SECRET_KEY", PROD_KEY),
        ("ALLOWED_HOSTS", "api.example.com"),
        ("SECURE_SSL_REDIRECT", "True"),
    ];

    fn assert_static_security_headers(headers: &HeaderMap) {
        assert_eq!(headers[header::X_CONTENT_TYPE_OPTIONS], "nosniff");
        assert_eq!(headers[header::X_FRAME_OPTIONS], "DENY");
        assert_eq!(headers[header::REFERRER_POLICY], "same-origin");
    }

    #[tokio::test]
    async fn test_production_redirect_and_headers() {
        let app = application(
            test_state_configured(PROD_REDIRECT, |config| {
                config.middleware.trust_forwarded_proto = true;
            })
            .await,
        );

        let request = Request::builder()
            .uri("/health?full=1")
            .header(header::HOST, "api.example.com")
            .body(Body::empty())
            .unwrap();
        let reply = send(&app, request).await;
        assert_eq!(reply.status, StatusCode::MOVED_PERMANENTLY);
        assert_eq!(
            reply.headers[header::LOCATION],
            "https://api.example.com/health?full=1"
        );

        let request = Request::builder()
            .uri("/health")
            .header(header::HOST, "evil.example.net")
            .body(Body::empty())
            .unwrap();
        assert_eq!(send(&app, request).await.status, StatusCode::BAD_REQUEST);

        let request = Request::builder()
            .uri("/health")
            .header(header::HOST, "api.example.com")
            .header("x-forwarded-proto", "https")
            .body(Body::empty())
            .unwrap();
        let reply = send(&app, request).await;
        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(
            reply.headers[header::STRICT_TRANSPORT_SECURITY],
            "max-age=31536000; includeSubDomains; preload"
        );
        assert_eq!(reply.headers[header::X_XSS_PROTECTION], "1; mode=block");
        assert_static_security_headers(&reply.headers);
    }

    #[tokio::test]
    async fn test_forwarded_proto_needs_trusted_proxy() {
        let app = application(test_state_with(PROD_REDIRECT).await);
        let request = Request::builder()
            .uri("/health")
            .header(header::HOST, "api.example.com")
            .header("x-forwarded-proto", "https")
            .body(Body::empty())
            .unwrap();
        let reply = send(&app, request).await;
        assert_eq!(reply.status, StatusCode::MOVED_PERMANENTLY);
        assert!(reply.headers.get(header::STRICT_TRANSPORT_SECURITY).is_none());
    }

    #[tokio::test]
    async fn test_rejections_and_redirects_carry_security_headers() {
        let app = application(test_state_with(PROD_REDIRECT).await);

        let request = Request::builder()
            .uri("/health")
            .header(header::HOST, "evil.test")
            .body(Body::empty())
            .unwrap();
        let reply = send(&app, request).await;
        assert_eq!(reply.status, StatusCode::BAD_REQUEST);
        assert_static_security_headers(&reply.headers);

        let request = Request::builder()
            .uri("/health")
            .header(header::HOST, "api.example.com")
            .body(Body::empty())
            .unwrap();
        let reply = send(&app, request).await;
        assert_eq!(reply.status, StatusCode::MOVED_PERMANENTLY);
        assert_static_security_headers(&reply.headers);

        let app = application(test_state().await);
        let request = Request::builder()
            .method(Method::OPTIONS)
            .uri("/api/auth/login/")
            .header(header::ORIGIN, "http://localhost:5173")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .body(Body::empty())
            .unwrap();
        let reply = send(&app, request).await;
        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(
            reply.headers[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "http://localhost:5173"
        );
        assert_static_security_headers(&reply.headers);
    }

    #[tokio::test]
    async fn test_debug_headers() {
        let app = application(test_state().await);
        let request = Request::builder()
            .uri("/health")
            .header("x-forwarded-proto", "https")
            .body(Body::empty())
            .unwrap();
        let reply = send(&app, request).await;
        assert_eq!(reply.status, StatusCode::OK);
        assert!(reply.headers.get(header::STRICT_TRANSPORT_SECURITY).is_none());
        assert!(reply.headers.get(header::X_XSS_PROTECTION).is_none());
        assert_eq!(reply.headers[header::X_CONTENT_TYPE_OPTIONS], "nosniff");
        assert_eq!(reply.headers[header::X_FRAME_OPTIONS], "DENY");
    }

    #[tokio::test]
    async fn test_cors_on_api_routes() {
        let app = application(test_state().await);
        let request = Request::builder()
            .uri("/health")
            .header(header::ORIGIN, "http://localhost:5173")
            .body(Body::empty())
            .unwrap();
        let reply = send(&app, request).await;
        assert_eq!(
            reply.headers[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "http://localhost:5173"
        );
        assert_eq!(reply.headers[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");
    }
}
