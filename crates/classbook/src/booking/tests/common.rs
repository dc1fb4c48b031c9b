use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::response::Response;
use chrono::{TimeZone, Utc};
use serde_json::Value;

use crate::accounts::{AccountError, AuthenticatedUser, SessionResolver, UserRole};
use crate::booking::domain::{
    ClassId, Enrollment, EnrollmentId, EnrollmentStatus, NewClassSession,
    NewEnrollment, RosterEntry, UserId,
};
use crate::booking::repository::{
    ClassRepository, EnrollmentRepository, RepositoryError, UnitOfWork,
};
use crate::booking::BookingService;
use crate::store::InMemoryStore;

pub(super) type MemoryService = BookingService<InMemoryStore, InMemoryStore>;

pub(super) fn memory_service() -> (MemoryService, Arc<InMemoryStore>) {
    let store = Arc::new(InMemoryStore::default());
    let service = BookingService::new(store.clone(), store.clone());
    (service, store)
}

pub(super) fn new_class(capacity: u32) -> NewClassSession {
    NewClassSession {
        title: "Fundamentos NoGi".to_string(),
        instructor: "Coach Luis".to_string(),
        schedule: Utc
            .with_ymd_and_hms(2025, 10, 7, 19, 0, 0)
            .single()
            .expect("valid schedule"),
        capacity,
    }
}

pub(super) fn seed_class(store: &InMemoryStore, capacity: u32) -> ClassId {
    store
        .create_class(new_class(capacity))
        .expect("class stored")
        .id
}

/// Insert a row directly, bypassing the service's status decision.
pub(super) fn seed_enrollment(
    store: &InMemoryStore,
    class_id: ClassId,
    user: i64,
    status: EnrollmentStatus,
) -> EnrollmentId {
    store
        .create_enrollment(NewEnrollment {
            class_id,
            user_id: UserId(user),
            status,
            created_at: Utc::now(),
        })
        .expect("enrollment stored")
        .id
}

pub(super) fn users_with_status(
    store: &InMemoryStore,
    class_id: ClassId,
    status: EnrollmentStatus,
) -> Vec<i64> {
    let mut roster = store.list_by_class(class_id).expect("roster loads");
    roster.sort_by_key(|entry| entry.enrollment.id);
    roster
        .into_iter()
        .filter(|entry| entry.enrollment.status == status)
        .map(|entry| entry.enrollment.user_id.0)
        .collect()
}

pub(super) fn confirmed(store: &InMemoryStore, class_id: ClassId) -> Vec<i64> {
    users_with_status(store, class_id, EnrollmentStatus::Confirmed)
}

pub(super) fn waitlisted(store: &InMemoryStore, class_id: ClassId) -> Vec<i64> {
    users_with_status(store, class_id, EnrollmentStatus::Waitlist)
}

pub(super) fn capacity_of(store: &InMemoryStore, class_id: ClassId) -> u32 {
    store
        .find_by_id(class_id)
        .expect("lookup succeeds")
        .expect("class present")
        .capacity
}

/// Delegates to an in-memory store, letting `allowed` status transitions
/// through before failing every later one.
pub(super) struct FrozenStatusStore {
    pub(super) inner: Arc<InMemoryStore>,
    allowed: AtomicUsize,
}

impl FrozenStatusStore {
    pub(super) fn after(inner: Arc<InMemoryStore>, allowed: usize) -> Self {
        Self {
            inner,
            allowed: AtomicUsize::new(allowed),
        }
    }
}

impl UnitOfWork for FrozenStatusStore {
    fn atomically<T, Failure, F>(&self, work: F) -> Result<T, Failure>
    where
        F: FnOnce() -> Result<T, Failure>,
        Failure: From<RepositoryError>,
    {
        self.inner.atomically(work)
    }
}

impl EnrollmentRepository for FrozenStatusStore {
    fn count_confirmed(&self, class_id: ClassId) -> Result<u32, RepositoryError> {
        self.inner.count_confirmed(class_id)
    }

    fn list_waitlist_by_class(
        &self,
        class_id: ClassId,
        limit: u32,
    ) -> Result<Vec<Enrollment>, RepositoryError> {
        self.inner.list_waitlist_by_class(class_id, limit)
    }

    fn update_status(
        &self,
        enrollment_id: EnrollmentId,
        status: EnrollmentStatus,
    ) -> Result<(), RepositoryError> {
        let granted = self
            .allowed
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if !granted {
            return Err(RepositoryError::Unavailable("read only".to_string()));
        }
        self.inner.update_status(enrollment_id, status)
    }

    fn find_by_class_and_user(
        &self,
        class_id: ClassId,
        user_id: UserId,
    ) -> Result<Option<Enrollment>, RepositoryError> {
        self.inner.find_by_class_and_user(class_id, user_id)
    }

    fn create_enrollment(&self, record: NewEnrollment) -> Result<Enrollment, RepositoryError> {
        self.inner.create_enrollment(record)
    }

    fn delete_enrollment(
        &self,
        class_id: ClassId,
        user_id: UserId,
    ) -> Result<bool, RepositoryError> {
        self.inner.delete_enrollment(class_id, user_id)
    }

    fn list_by_class(&self, class_id: ClassId) -> Result<Vec<RosterEntry>, RepositoryError> {
        self.inner.list_by_class(class_id)
    }
}

pub(super) struct UnavailableEnrollments;

impl UnitOfWork for UnavailableEnrollments {
    fn atomically<T, Failure, F>(&self, work: F) -> Result<T, Failure>
    where
        F: FnOnce() -> Result<T, Failure>,
        Failure: From<RepositoryError>,
    {
        work()
    }
}

impl EnrollmentRepository for UnavailableEnrollments {
    fn count_confirmed(&self, _class_id: ClassId) -> Result<u32, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn list_waitlist_by_class(
        &self,
        _class_id: ClassId,
        _limit: u32,
    ) -> Result<Vec<Enrollment>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn update_status(
        &self,
        _enrollment_id: EnrollmentId,
        _status: EnrollmentStatus,
    ) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn find_by_class_and_user(
        &self,
        _class_id: ClassId,
        _user_id: UserId,
    ) -> Result<Option<Enrollment>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn create_enrollment(&self, _record: NewEnrollment) -> Result<Enrollment, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn delete_enrollment(
        &self,
        _class_id: ClassId,
        _user_id: UserId,
    ) -> Result<bool, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn list_by_class(&self, _class_id: ClassId) -> Result<Vec<RosterEntry>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }
}

/// Token table standing in for the account service.
#[derive(Default)]
pub(super) struct StaticSessions {
    pub(super) users: HashMap<String, AuthenticatedUser>,
}

impl StaticSessions {
    pub(super) fn with(mut self, token: &str, id: i64, role: UserRole) -> Self {
        self.users.insert(
            token.to_string(),
            AuthenticatedUser {
                id: UserId(id),
                name: format!("user-{id}"),
                email: format!("user{id}@dojo.com"),
                role,
            },
        );
        self
    }
}

impl SessionResolver for StaticSessions {
    fn resolve(&self, token: &str) -> Result<Option<AuthenticatedUser>, AccountError> {
        Ok(self.users.get(token).cloned())
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
