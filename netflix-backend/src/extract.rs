//! Request extractors
//!
//! [`Json`] reports malformed bodies in the service's error shape instead of
//! axum's plain-text rejection. [`CurrentUser`] hands handlers the account
//! resolved by [`require_auth`](crate::middleware::require_auth).

use axum::{
    extract::{rejection::JsonRejection, FromRequest, FromRequestParts, Request},
    http::request::Parts,
    response::{IntoResponse, Response},
};
use serde::{de::DeserializeOwned, Serialize};

use crate::accounts::User;
use crate::error::Error;

/// JSON body extractor and response
#[derive(Debug, Clone, Copy, Default)]
pub struct Json<T>(pub T);

impl<T, S> FromRequest<S> for Json<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match axum::Json::<T>::from_request(req, state).await {
            Ok(axum::Json(value)) => Ok(Json(value)),
            Err(rejection) => Err(rejection_to_error(rejection)),
        }
    }
}

impl<T: Serialize> IntoResponse for Json<T> {
    fn into_response(self) -> Response {
        axum::Json(self.0).into_response()
    }
}

fn rejection_to_error(rejection: JsonRejection) -> Error {
    match rejection {
        JsonRejection::MissingJsonContentType(_) => {
            Error::BadRequest("Expected request with `Content-Type: application/json`".to_string())
        }
        JsonRejection::JsonSyntaxError(e) => {
            Error::BadRequest(format!("JSON parse error: {}", e.body_text()))
        }
        JsonRejection::JsonDataError(e) => {
            Error::BadRequest(format!("Invalid request body: {}", e.body_text()))
        }
        other => Error::BadRequest(other.body_text()),
    }
}

/// The authenticated account
///
/// Only available on routes behind `require_auth`.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .ok_or_else(|| {
                Error::Unauthorized("Authentication credentials were not provided.".to_string())
            })
    }
}
