use super::domain::{
    ClassId, ClassSession, Enrollment, EnrollmentId, EnrollmentStatus, NewClassSession,
    NewEnrollment, RosterEntry, UserId,
};

/// Groups repository calls into one atomic unit.
///
/// When `work` returns `Err`, every write it made through this store is
/// undone before the error is returned. Calls made while a unit is already
/// open on the same thread join the enclosing unit.
pub trait UnitOfWork: Send + Sync {
    fn atomically<T, Failure, F>(&self, work: F) -> Result<T, Failure>
    where
        F: FnOnce() -> Result<T, Failure>,
        Failure: From<RepositoryError>;
}

/// Storage for class sessions.
pub trait ClassRepository: UnitOfWork {
    fn find_by_id(&self, id: ClassId) -> Result<Option<ClassSession>, RepositoryError>;
    fn update_capacity(&self, id: ClassId, capacity: u32) -> Result<(), RepositoryError>;
    /// Classes ordered by schedule, earliest first.
    fn list_classes(&self) -> Result<Vec<ClassSession>, RepositoryError>;
    fn create_class(&self, class: NewClassSession) -> Result<ClassSession, RepositoryError>;
}

/// Storage for enrollment rows. Implementations own the ordering sequence:
/// every created enrollment receives an id greater than all earlier ones.
pub trait EnrollmentRepository: UnitOfWork {
    fn count_confirmed(&self, class_id: ClassId) -> Result<u32, RepositoryError>;
    /// At most `limit` waitlisted rows for the class, oldest first.
    fn list_waitlist_by_class(
        &self,
        class_id: ClassId,
        limit: u32,
    ) -> Result<Vec<Enrollment>, RepositoryError>;
    fn update_status(
        &self,
        enrollment_id: EnrollmentId,
        status: EnrollmentStatus,
    ) -> Result<(), RepositoryError>;
    fn find_by_class_and_user(
        &self,
        class_id: ClassId,
        user_id: UserId,
    ) -> Result<Option<Enrollment>, RepositoryError>;
    /// Fails with [`RepositoryError::Conflict`] when the pair already holds a row.
    fn create_enrollment(&self, record: NewEnrollment) -> Result<Enrollment, RepositoryError>;
    /// Returns whether a row was removed.
    fn delete_enrollment(&self, class_id: ClassId, user_id: UserId)
        -> Result<bool, RepositoryError>;
    fn list_by_class(&self, class_id: ClassId) -> Result<Vec<RosterEntry>, RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}
