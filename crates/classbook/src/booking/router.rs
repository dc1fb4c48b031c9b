use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use crate::accounts::{require_admin, require_user, SessionResolver};
use crate::runtime::respond_blocking;

use super::domain::ClassId;
use super::repository::{ClassRepository, EnrollmentRepository};
use super::service::{BookingError, BookingService};

/// Shared handler state: the booking service plus the session lookup used to
/// identify callers.
pub struct BookingState<C, E> {
    pub service: Arc<BookingService<C, E>>,
    pub sessions: Arc<dyn SessionResolver>,
}

impl<C, E> Clone for BookingState<C, E> {
    fn clone(&self) -> Self {
        Self {
            service: self.service.clone(),
            sessions: self.sessions.clone(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct CapacityRequest {
    #[serde(default)]
    pub delta: i32,
}

/// Router builder exposing class listing, enrollment, and capacity endpoints.
pub fn booking_router<C, E>(
    service: Arc<BookingService<C, E>>,
    sessions: Arc<dyn SessionResolver>,
) -> Router
where
    C: ClassRepository + 'static,
    E: EnrollmentRepository + 'static,
{
    Router::new()
        .route("/api/classes", get(list_classes_handler::<C, E>))
        .route(
            "/api/classes/:class_id/enroll",
            post(enroll_handler::<C, E>),
        )
        .route(
            "/api/classes/:class_id/unenroll",
            post(unenroll_handler::<C, E>),
        )
        .route(
            "/api/classes/:class_id/capacity",
            post(capacity_handler::<C, E>),
        )
        .with_state(BookingState { service, sessions })
}

pub(crate) async fn list_classes_handler<C, E>(
    State(state): State<BookingState<C, E>>,
) -> Response
where
    C: ClassRepository + 'static,
    E: EnrollmentRepository + 'static,
{
    respond_blocking(move || match state.service.list_classes() {
        Ok(classes) => (StatusCode::OK, Json(classes)).into_response(),
        Err(err) => booking_error_response(err),
    })
    .await
}

pub(crate) async fn enroll_handler<C, E>(
    State(state): State<BookingState<C, E>>,
    Path(class_id): Path<i64>,
    headers: HeaderMap,
) -> Response
where
    C: ClassRepository + 'static,
    E: EnrollmentRepository + 'static,
{
    respond_blocking(move || {
        let user = match require_user(&headers, state.sessions.as_ref()) {
            Ok(user) => user,
            Err(response) => return response,
        };

        match state.service.enroll(ClassId(class_id), user.id) {
            Ok(status) => (StatusCode::OK, Json(json!({ "status": status }))).into_response(),
            Err(err) => booking_error_response(err),
        }
    })
    .await
}

pub(crate) async fn unenroll_handler<C, E>(
    State(state): State<BookingState<C, E>>,
    Path(class_id): Path<i64>,
    headers: HeaderMap,
) -> Response
where
    C: ClassRepository + 'static,
    E: EnrollmentRepository + 'static,
{
    respond_blocking(move || {
        let user = match require_user(&headers, state.sessions.as_ref()) {
            Ok(user) => user,
            Err(response) => return response,
        };

        match state.service.unenroll(ClassId(class_id), user.id) {
            Ok(()) => {
                (StatusCode::OK, Json(json!({ "message": "seat released" }))).into_response()
            }
            Err(err) => booking_error_response(err),
        }
    })
    .await
}

pub(crate) async fn capacity_handler<C, E>(
    State(state): State<BookingState<C, E>>,
    Path(class_id): Path<i64>,
    headers: HeaderMap,
    request: Option<Json<CapacityRequest>>,
) -> Response
where
    C: ClassRepository + 'static,
    E: EnrollmentRepository + 'static,
{
    let Json(request) = request.unwrap_or_default();
    respond_blocking(move || {
        if let Err(response) = require_admin(&headers, state.sessions.as_ref()) {
            return response;
        }

        match state.service.adjust_capacity(ClassId(class_id), request.delta) {
            Ok(capacity) => {
                (StatusCode::OK, Json(json!({ "capacity": capacity }))).into_response()
            }
            Err(err) => booking_error_response(err),
        }
    })
    .await
}

pub(crate) fn booking_error_response(err: BookingError) -> Response {
    let status = match &err {
        BookingError::ClassNotFound(_) => StatusCode::NOT_FOUND,
        BookingError::AlreadyEnrolled { .. } => StatusCode::CONFLICT,
        BookingError::Repository(source) => {
            error!(error = %source, "booking storage failure");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    let payload = json!({ "error": err.to_string() });
    (status, Json(payload)).into_response()
}
