use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use super::domain::{
    clamp_capacity, ClassId, ClassOverview, EnrollmentStatus, NewEnrollment, UserId,
};
use super::locks::ClassLocks;
use super::repository::{ClassRepository, EnrollmentRepository, RepositoryError, UnitOfWork};
use super::waitlist::WaitlistPromotionEngine;

/// Service composing the class and enrollment repositories with the
/// promotion engine. Every mutating call runs under the class lock as one
/// unit of work, and ends with a promotion pass when it could have opened
/// seats. A failure anywhere in the call leaves storage as it was.
pub struct BookingService<C, E> {
    classes: Arc<C>,
    enrollments: Arc<E>,
    locks: Arc<ClassLocks>,
    engine: WaitlistPromotionEngine<C, E>,
}

impl<C, E> BookingService<C, E>
where
    C: ClassRepository + 'static,
    E: EnrollmentRepository + 'static,
{
    pub fn new(classes: Arc<C>, enrollments: Arc<E>) -> Self {
        let locks = Arc::new(ClassLocks::new());
        let engine = WaitlistPromotionEngine::new(classes.clone(), enrollments.clone(), locks.clone());

        Self {
            classes,
            enrollments,
            locks,
            engine,
        }
    }

    pub fn promotion_engine(&self) -> &WaitlistPromotionEngine<C, E> {
        &self.engine
    }

    /// Claim a seat, or a waitlist position when the class is full.
    pub fn enroll(
        &self,
        class_id: ClassId,
        user_id: UserId,
    ) -> Result<EnrollmentStatus, BookingError> {
        self.locks.with_class(class_id, || {
            self.atomically(|| self.enroll_locked(class_id, user_id))
        })
    }

    /// Drop the user's enrollment, if any, and refill freed seats.
    pub fn unenroll(&self, class_id: ClassId, user_id: UserId) -> Result<(), BookingError> {
        self.locks.with_class(class_id, || {
            self.atomically(|| self.unenroll_locked(class_id, user_id))
        })
    }

    /// Apply `delta` to the class capacity (floored at 1) and return the stored value.
    pub fn adjust_capacity(&self, class_id: ClassId, delta: i32) -> Result<u32, BookingError> {
        self.locks.with_class(class_id, || {
            self.atomically(|| self.adjust_capacity_locked(class_id, delta))
        })
    }

    /// Every class with its confirmed attendees and waitlist in arrival order.
    pub fn list_classes(&self) -> Result<Vec<ClassOverview>, BookingError> {
        let sessions = self.classes.list_classes()?;
        let mut overviews = Vec::with_capacity(sessions.len());
        for session in sessions {
            let class_id = session.id;
            let roster = self
                .locks
                .with_class(class_id, || self.enrollments.list_by_class(class_id))?;
            overviews.push(ClassOverview::from_roster(session, roster));
        }
        Ok(overviews)
    }

    fn atomically<T>(
        &self,
        work: impl FnOnce() -> Result<T, BookingError>,
    ) -> Result<T, BookingError> {
        self.classes.atomically(|| self.enrollments.atomically(work))
    }

    fn enroll_locked(
        &self,
        class_id: ClassId,
        user_id: UserId,
    ) -> Result<EnrollmentStatus, BookingError> {
        let session = self
            .classes
            .find_by_id(class_id)?
            .ok_or(BookingError::ClassNotFound(class_id))?;

        if self
            .enrollments
            .find_by_class_and_user(class_id, user_id)?
            .is_some()
        {
            warn!(%class_id, %user_id, "duplicate enrollment rejected");
            return Err(BookingError::AlreadyEnrolled { class_id, user_id });
        }

        let confirmed = self.enrollments.count_confirmed(class_id)?;
        let status = if confirmed < session.capacity {
            EnrollmentStatus::Confirmed
        } else {
            EnrollmentStatus::Waitlist
        };

        let record = self
            .enrollments
            .create_enrollment(NewEnrollment {
                class_id,
                user_id,
                status,
                created_at: Utc::now(),
            })
            .map_err(|err| match err {
                RepositoryError::Conflict => BookingError::AlreadyEnrolled { class_id, user_id },
                other => BookingError::Repository(other),
            })?;

        info!(
            %class_id,
            %user_id,
            enrollment_id = %record.id,
            status = status.label(),
            "enrollment recorded"
        );

        if status == EnrollmentStatus::Confirmed {
            self.engine.promote_locked(class_id)?;
        }

        Ok(status)
    }

    fn unenroll_locked(&self, class_id: ClassId, user_id: UserId) -> Result<(), BookingError> {
        if self.enrollments.delete_enrollment(class_id, user_id)? {
            info!(%class_id, %user_id, "enrollment withdrawn");
        }
        self.engine.promote_locked(class_id)?;
        Ok(())
    }

    fn adjust_capacity_locked(&self, class_id: ClassId, delta: i32) -> Result<u32, BookingError> {
        let session = self
            .classes
            .find_by_id(class_id)?
            .ok_or(BookingError::ClassNotFound(class_id))?;

        let capacity = clamp_capacity(session.capacity, i64::from(delta));
        self.classes.update_capacity(class_id, capacity)?;
        info!(
            %class_id,
            previous = session.capacity,
            capacity,
            delta,
            "class capacity adjusted"
        );

        self.engine.promote_locked(class_id)?;
        Ok(capacity)
    }
}

/// Error raised by the booking service.
#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("class {0} not found")]
    ClassNotFound(ClassId),
    #[error("user {user_id} is already enrolled or waitlisted for class {class_id}")]
    AlreadyEnrolled { class_id: ClassId, user_id: UserId },
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}
