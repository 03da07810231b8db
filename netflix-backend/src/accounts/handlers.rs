//! HTTP handlers for `/api/auth/`

use axum::{extract::State, http::StatusCode};
use serde_json::{json, Value};

use super::model::UserResponse;
use super::payloads::{
    AuthResponse, LoginRequest, LogoutRequest, MessageResponse, ProfileUpdate, RefreshRequest,
    RegisterRequest, VerifyRequest,
};
use crate::auth::TokenPair;
use crate::error::Result;
use crate::extract::{CurrentUser, Json};
use crate::state::AppState;

/// `POST /api/auth/register/`
pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>)> {
    let response = state.accounts().register(body).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// `POST /api/auth/login/`
pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<AuthResponse>> {
    Ok(Json(state.accounts().login(body).await?))
}

/// `POST /api/auth/token/refresh/`
pub async fn refresh(
    State(state): State<AppState>,
    Json(body): Json<RefreshRequest>,
) -> Result<Json<TokenPair>> {
    Ok(Json(state.accounts().refresh(body).await?))
}

/// `POST /api/auth/token/verify/`
pub async fn verify(
    State(state): State<AppState>,
    Json(body): Json<VerifyRequest>,
) -> Result<Json<Value>> {
    state.accounts().verify(body).await?;
    Ok(Json(json!({})))
}

/// `POST /api/auth/logout/`
pub async fn logout(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(body): Json<LogoutRequest>,
) -> Result<Json<MessageResponse>> {
    Ok(Json(state.accounts().logout(&user, body).await?))
}

/// `GET /api/auth/profile/`
pub async fn profile(CurrentUser(user): CurrentUser) -> Json<UserResponse> {
    Json(UserResponse::from(user))
}

/// `PUT`/`PATCH /api/auth/profile/`
pub async fn update_profile(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(body): Json<ProfileUpdate>,
) -> Result<Json<UserResponse>> {
    let user = state.accounts().update_profile(user, body).await?;
    Ok(Json(UserResponse::from(user)))
}
