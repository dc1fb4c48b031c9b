use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use crate::runtime::respond_blocking;

use super::domain::AuthenticatedUser;
use super::repository::{InviteRepository, UserRepository};
use super::service::{AccountError, AccountService, SessionResolver};

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(alias = "inviteToken")]
    pub invite_token: String,
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Router builder exposing registration and login.
pub fn account_router<U, I>(service: Arc<AccountService<U, I>>) -> Router
where
    U: UserRepository + 'static,
    I: InviteRepository + 'static,
{
    Router::new()
        .route("/api/register", post(register_handler::<U, I>))
        .route("/api/login", post(login_handler::<U, I>))
        .with_state(service)
}

pub(crate) async fn register_handler<U, I>(
    State(service): State<Arc<AccountService<U, I>>>,
    Json(request): Json<RegisterRequest>,
) -> Response
where
    U: UserRepository + 'static,
    I: InviteRepository + 'static,
{
    respond_blocking(move || {
        match service.register(
            &request.invite_token,
            &request.name,
            &request.email,
            &request.password,
        ) {
            Ok(grant) => (StatusCode::OK, Json(grant)).into_response(),
            Err(err) => account_error_response(err),
        }
    })
    .await
}

pub(crate) async fn login_handler<U, I>(
    State(service): State<Arc<AccountService<U, I>>>,
    Json(request): Json<LoginRequest>,
) -> Response
where
    U: UserRepository + 'static,
    I: InviteRepository + 'static,
{
    respond_blocking(move || match service.login(&request.email, &request.password) {
        Ok(grant) => (StatusCode::OK, Json(grant)).into_response(),
        Err(err) => account_error_response(err),
    })
    .await
}

pub(crate) fn account_error_response(err: AccountError) -> Response {
    let status = match &err {
        AccountError::InvalidInvite | AccountError::EmailTaken => StatusCode::BAD_REQUEST,
        AccountError::InvalidInput(_) => StatusCode::UNPROCESSABLE_ENTITY,
        AccountError::InvalidCredentials => StatusCode::UNAUTHORIZED,
        AccountError::Repository(source) => {
            error!(error = %source, "account storage failure");
            StatusCode::INTERNAL_SERVER_ERROR
        }
        AccountError::Hashing(source) => {
            error!(error = %source, "password hashing failure");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    let payload = json!({ "error": err.to_string() });
    (status, Json(payload)).into_response()
}

/// Extract the token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Resolve the caller or produce the 401 response to return instead.
pub fn require_user(
    headers: &HeaderMap,
    sessions: &dyn SessionResolver,
) -> Result<AuthenticatedUser, Response> {
    let unauthorized = || {
        let payload = json!({ "error": "authentication required" });
        (StatusCode::UNAUTHORIZED, Json(payload)).into_response()
    };

    let token = bearer_token(headers).ok_or_else(unauthorized)?;
    match sessions.resolve(token) {
        Ok(Some(user)) => Ok(user),
        Ok(None) => Err(unauthorized()),
        Err(err) => Err(account_error_response(err)),
    }
}

/// Like [`require_user`], additionally rejecting non-admins with 403.
pub fn require_admin(
    headers: &HeaderMap,
    sessions: &dyn SessionResolver,
) -> Result<AuthenticatedUser, Response> {
    let user = require_user(headers, sessions)?;
    if user.is_admin() {
        Ok(user)
    } else {
        let payload = json!({ "error": "administrators only" });
        Err((StatusCode::FORBIDDEN, Json(payload)).into_response())
    }
}
