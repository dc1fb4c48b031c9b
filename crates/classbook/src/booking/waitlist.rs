use std::sync::Arc;

use tracing::{debug, info};

use super::domain::{open_slots, ClassId, EnrollmentId, EnrollmentStatus};
use super::locks::ClassLocks;
use super::repository::{ClassRepository, EnrollmentRepository, RepositoryError, UnitOfWork};

/// Moves the oldest waitlisted enrollments into free seats.
///
/// The engine keeps no state between calls: every run recomputes open seats
/// from the repositories, so invoking it when nothing changed is a no-op.
pub struct WaitlistPromotionEngine<C, E> {
    classes: Arc<C>,
    enrollments: Arc<E>,
    locks: Arc<ClassLocks>,
}

impl<C, E> WaitlistPromotionEngine<C, E>
where
    C: ClassRepository + 'static,
    E: EnrollmentRepository + 'static,
{
    pub fn new(classes: Arc<C>, enrollments: Arc<E>, locks: Arc<ClassLocks>) -> Self {
        Self {
            classes,
            enrollments,
            locks,
        }
    }

    /// Promote waitlisted entries into any open seats of `class_id`.
    ///
    /// A missing class is not an error. Returns the promoted enrollment ids in
    /// arrival order. If any status write fails, no promotion from this pass
    /// is kept.
    pub fn promote_if_capacity_allows(
        &self,
        class_id: ClassId,
    ) -> Result<Vec<EnrollmentId>, RepositoryError> {
        self.locks.with_class(class_id, || {
            self.classes
                .atomically(|| self.enrollments.atomically(|| self.promote_locked(class_id)))
        })
    }

    /// Promotion body. Callers must already hold the class lock and an open
    /// unit of work.
    pub(crate) fn promote_locked(
        &self,
        class_id: ClassId,
    ) -> Result<Vec<EnrollmentId>, RepositoryError> {
        let Some(session) = self.classes.find_by_id(class_id)? else {
            debug!(%class_id, "promotion skipped: class not found");
            return Ok(Vec::new());
        };

        let confirmed = self.enrollments.count_confirmed(class_id)?;
        let slots = open_slots(session.capacity, confirmed);
        if slots == 0 {
            debug!(%class_id, capacity = session.capacity, confirmed, "no open seats");
            return Ok(Vec::new());
        }

        let mut queue = self.enrollments.list_waitlist_by_class(class_id, slots)?;
        // Arrival order is the id sequence.
        queue.sort_by_key(|entry| entry.id);
        queue.truncate(slots as usize);

        let mut promoted = Vec::with_capacity(queue.len());
        for entry in queue {
            self.enrollments
                .update_status(entry.id, EnrollmentStatus::Confirmed)?;
            promoted.push(entry.id);
        }

        if !promoted.is_empty() {
            info!(
                %class_id,
                capacity = session.capacity,
                promoted = ?promoted,
                "promoted waitlisted enrollments"
            );
        }

        Ok(promoted)
    }
}
