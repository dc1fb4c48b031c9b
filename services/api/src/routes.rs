use crate::infra::AppState;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use classbook::accounts::{
    account_router, require_admin, AccountService, Argon2Hasher, InviteRepository,
    SessionResolver, UserRepository, UuidTokenIssuer,
};
use classbook::booking::{
    booking_router, import_classes, parse_classes, BookingService, ClassRepository,
    EnrollmentRepository,
};
use classbook::error::AppError;
use classbook::runtime::respond_blocking;
use serde_json::json;
use std::io::Cursor;
use std::sync::Arc;
use tracing::info;

pub(crate) struct CatalogState<S> {
    store: Arc<S>,
    sessions: Arc<dyn SessionResolver>,
}

impl<S> Clone for CatalogState<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            sessions: self.sessions.clone(),
        }
    }
}

/// Wire accounts, booking, catalog import, and operational endpoints over one store.
pub(crate) fn with_classbook_routes<S>(store: Arc<S>) -> Router
where
    S: ClassRepository + EnrollmentRepository + UserRepository + InviteRepository + 'static,
{
    let accounts = Arc::new(AccountService::new(
        store.clone(),
        store.clone(),
        Arc::new(Argon2Hasher::default()),
        Arc::new(UuidTokenIssuer),
    ));
    let sessions: Arc<dyn SessionResolver> = accounts.clone();
    let booking = Arc::new(BookingService::new(store.clone(), store.clone()));

    let catalog = Router::new()
        .route("/api/classes/import", post(import_endpoint::<S>))
        .with_state(CatalogState {
            store,
            sessions: sessions.clone(),
        });

    account_router(accounts)
        .merge(booking_router(booking, sessions))
        .merge(catalog)
        .route("/health", get(healthcheck))
        .route("/ready", get(readiness_endpoint))
        .route("/metrics", get(metrics_endpoint))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

/// Admin-only: body is a catalog CSV, every row becomes a new class.
pub(crate) async fn import_endpoint<S>(
    State(state): State<CatalogState<S>>,
    headers: HeaderMap,
    body: String,
) -> Response
where
    S: ClassRepository + 'static,
{
    respond_blocking(move || import_catalog(&state, &headers, body)).await
}

fn import_catalog<S>(
    state: &CatalogState<S>,
    headers: &HeaderMap,
    body: String,
) -> Result<Response, AppError>
where
    S: ClassRepository,
{
    let admin = match require_admin(headers, state.sessions.as_ref()) {
        Ok(admin) => admin,
        Err(response) => return Ok(response),
    };

    let classes = parse_classes(Cursor::new(body.into_bytes()))?;
    let created = import_classes(state.store.as_ref(), classes)?;
    info!(admin_id = %admin.id, count = created.len(), "classes imported over http");

    Ok((StatusCode::CREATED, Json(created)).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use chrono::Utc;
    use classbook::accounts::{Invite, UserRole};
    use classbook::store::InMemoryStore;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use std::sync::atomic::AtomicBool;
    use tower::ServiceExt;

    fn app(ready: bool) -> (Router, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        store
            .ensure_invite(Invite {
                token: "ADMIN".to_string(),
                email: None,
                role: UserRole::Admin,
                used: false,
                created_at: Utc::now(),
            })
            .expect("invite stored");
        let state = AppState {
            readiness: Arc::new(AtomicBool::new(ready)),
            metrics: Arc::new(PrometheusBuilder::new().build_recorder().handle()),
        };
        let router = with_classbook_routes(store.clone()).layer(Extension(state));
        (router, store)
    }

    async fn admin_token(router: &Router) -> String {
        let response = router
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/register")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(
                        json!({
                            "inviteToken": "ADMIN",
                            "name": "Admin",
                            "email": "admin@dojo.com",
                            "password": "secret-pass",
                        })
                        .to_string(),
                    ))
                    .expect("request builds"),
            )
            .await
            .expect("router responds");
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
            .await
            .expect("read body");
        let payload: serde_json::Value = serde_json::from_slice(&body).expect("json");
        payload["token"].as_str().expect("token").to_string()
    }

    fn import_request(token: &str, csv: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/classes/import")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(header::CONTENT_TYPE, "text/csv")
            .body(Body::from(csv.to_string()))
            .expect("request builds")
    }

    #[tokio::test]
    async fn readiness_reflects_the_flag() {
        let (starting, _) = app(false);
        let response = starting
            .oneshot(Request::get("/ready").body(Body::empty()).expect("request"))
            .await
            .expect("router responds");
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let (ready, _) = app(true);
        let response = ready
            .oneshot(Request::get("/ready").body(Body::empty()).expect("request"))
            .await
            .expect("router responds");
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn health_is_always_ok() {
        let (router, _) = app(false);
        let response = router
            .oneshot(Request::get("/health").body(Body::empty()).expect("request"))
            .await
            .expect("router responds");
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn admin_can_import_classes() {
        let (router, store) = app(true);
        let token = admin_token(&router).await;
        let csv = "Title,Instructor,Schedule,Capacity\n\
                   Open mat,Coach Ana,2025-10-06 19:00,20\n\
                   Kids,Coach Luis,2025-10-07T17:30:00Z,10\n";

        let response = router
            .oneshot(import_request(&token, csv))
            .await
            .expect("router responds");

        assert_eq!(response.status(), StatusCode::CREATED);
        let classes = store.list_classes().expect("classes");
        assert_eq!(classes.len(), 2);
        assert_eq!(classes[1].capacity, 10);
    }

    #[tokio::test]
    async fn malformed_csv_is_a_bad_request() {
        let (router, store) = app(true);
        let token = admin_token(&router).await;
        let csv = "Title,Instructor,Schedule,Capacity\nOpen mat,Coach Ana,someday,20\n";

        let response = router
            .oneshot(import_request(&token, csv))
            .await
            .expect("router responds");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(store.list_classes().expect("classes").is_empty());
    }

    #[tokio::test]
    async fn import_requires_a_session() {
        let (router, _) = app(true);
        let response = router
            .oneshot(import_request("not-a-session", "Title\n"))
            .await
            .expect("router responds");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
