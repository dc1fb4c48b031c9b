use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};

use parking_lot::ReentrantMutex;

use crate::accounts::{Invite, InviteRepository, NewUser, User, UserRepository};
use crate::booking::{
    ClassId, ClassRepository, ClassSession, Enrollment, EnrollmentId, EnrollmentRepository,
    EnrollmentStatus, NewClassSession, NewEnrollment, RepositoryError, RosterEntry, UnitOfWork,
    UserId,
};

/// Process-local store implementing every repository trait. Ids come from
/// per-table counters starting at 1.
///
/// The lock is reentrant so a unit of work can hold it across the repository
/// calls it makes; the `RefCell` is only borrowed inside a single call.
#[derive(Debug)]
pub struct InMemoryStore {
    state: ReentrantMutex<RefCell<MemoryState>>,
}

#[derive(Debug, Default, Clone)]
struct MemoryState {
    classes: BTreeMap<ClassId, ClassSession>,
    enrollments: BTreeMap<EnrollmentId, Enrollment>,
    users: BTreeMap<UserId, User>,
    invites: HashMap<String, Invite>,
    class_seq: i64,
    enrollment_seq: i64,
    user_seq: i64,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            state: ReentrantMutex::new(RefCell::new(MemoryState::default())),
        }
    }

    fn read<T>(&self, view: impl FnOnce(&MemoryState) -> T) -> T {
        let guard = self.state.lock();
        let state = guard.borrow();
        view(&state)
    }

    fn write<T>(&self, change: impl FnOnce(&mut MemoryState) -> T) -> T {
        let guard = self.state.lock();
        let mut state = guard.borrow_mut();
        change(&mut state)
    }
}

impl UnitOfWork for InMemoryStore {
    fn atomically<T, Failure, F>(&self, work: F) -> Result<T, Failure>
    where
        F: FnOnce() -> Result<T, Failure>,
        Failure: From<RepositoryError>,
    {
        let guard = self.state.lock();
        let snapshot = guard.borrow().clone();
        let result = work();
        if result.is_err() {
            *guard.borrow_mut() = snapshot;
        }
        result
    }
}

impl ClassRepository for InMemoryStore {
    fn find_by_id(&self, id: ClassId) -> Result<Option<ClassSession>, RepositoryError> {
        Ok(self.read(|state| state.classes.get(&id).cloned()))
    }

    fn update_capacity(&self, id: ClassId, capacity: u32) -> Result<(), RepositoryError> {
        self.write(|state| {
            let session = state.classes.get_mut(&id).ok_or(RepositoryError::NotFound)?;
            session.capacity = capacity;
            Ok(())
        })
    }

    fn list_classes(&self) -> Result<Vec<ClassSession>, RepositoryError> {
        let mut classes: Vec<_> = self.read(|state| state.classes.values().cloned().collect());
        classes.sort_by(|a, b| a.schedule.cmp(&b.schedule).then(a.id.cmp(&b.id)));
        Ok(classes)
    }

    fn create_class(&self, class: NewClassSession) -> Result<ClassSession, RepositoryError> {
        Ok(self.write(|state| {
            state.class_seq += 1;
            let session = ClassSession {
                id: ClassId(state.class_seq),
                title: class.title,
                instructor: class.instructor,
                schedule: class.schedule,
                capacity: class.capacity,
            };
            state.classes.insert(session.id, session.clone());
            session
        }))
    }
}

impl EnrollmentRepository for InMemoryStore {
    fn count_confirmed(&self, class_id: ClassId) -> Result<u32, RepositoryError> {
        let count = self.read(|state| {
            state
                .enrollments
                .values()
                .filter(|e| e.class_id == class_id && e.status == EnrollmentStatus::Confirmed)
                .count()
        });
        Ok(count as u32)
    }

    fn list_waitlist_by_class(
        &self,
        class_id: ClassId,
        limit: u32,
    ) -> Result<Vec<Enrollment>, RepositoryError> {
        // BTreeMap iteration is already in id order.
        Ok(self.read(|state| {
            state
                .enrollments
                .values()
                .filter(|e| e.class_id == class_id && e.status == EnrollmentStatus::Waitlist)
                .take(limit as usize)
                .cloned()
                .collect()
        }))
    }

    fn update_status(
        &self,
        enrollment_id: EnrollmentId,
        status: EnrollmentStatus,
    ) -> Result<(), RepositoryError> {
        self.write(|state| {
            let enrollment = state
                .enrollments
                .get_mut(&enrollment_id)
                .ok_or(RepositoryError::NotFound)?;
            enrollment.status = status;
            Ok(())
        })
    }

    fn find_by_class_and_user(
        &self,
        class_id: ClassId,
        user_id: UserId,
    ) -> Result<Option<Enrollment>, RepositoryError> {
        Ok(self.read(|state| {
            state
                .enrollments
                .values()
                .find(|e| e.class_id == class_id && e.user_id == user_id)
                .cloned()
        }))
    }

    fn create_enrollment(&self, record: NewEnrollment) -> Result<Enrollment, RepositoryError> {
        self.write(|state| {
            if !state.classes.contains_key(&record.class_id) {
                return Err(RepositoryError::NotFound);
            }
            if state
                .enrollments
                .values()
                .any(|e| e.class_id == record.class_id && e.user_id == record.user_id)
            {
                return Err(RepositoryError::Conflict);
            }

            state.enrollment_seq += 1;
            let enrollment = Enrollment {
                id: EnrollmentId(state.enrollment_seq),
                class_id: record.class_id,
                user_id: record.user_id,
                status: record.status,
                created_at: record.created_at,
            };
            state.enrollments.insert(enrollment.id, enrollment.clone());
            Ok(enrollment)
        })
    }

    fn delete_enrollment(
        &self,
        class_id: ClassId,
        user_id: UserId,
    ) -> Result<bool, RepositoryError> {
        Ok(self.write(|state| {
            let before = state.enrollments.len();
            state
                .enrollments
                .retain(|_, e| !(e.class_id == class_id && e.user_id == user_id));
            state.enrollments.len() != before
        }))
    }

    fn list_by_class(&self, class_id: ClassId) -> Result<Vec<RosterEntry>, RepositoryError> {
        Ok(self.read(|state| {
            state
                .enrollments
                .values()
                .filter(|e| e.class_id == class_id)
                .map(|e| RosterEntry {
                    member_name: state
                        .users
                        .get(&e.user_id)
                        .map(|user| user.name.clone())
                        .unwrap_or_else(|| format!("user-{}", e.user_id)),
                    enrollment: e.clone(),
                })
                .collect()
        }))
    }
}

impl UserRepository for InMemoryStore {
    fn find_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError> {
        Ok(self.read(|state| state.users.values().find(|u| u.email == email).cloned()))
    }

    fn find_by_session_token(&self, token: &str) -> Result<Option<User>, RepositoryError> {
        Ok(self.read(|state| {
            state
                .users
                .values()
                .find(|u| u.session_token.as_deref() == Some(token))
                .cloned()
        }))
    }

    fn create_user(&self, user: NewUser) -> Result<User, RepositoryError> {
        self.write(|state| {
            if state.users.values().any(|u| u.email == user.email) {
                return Err(RepositoryError::Conflict);
            }
            state.user_seq += 1;
            let created = User {
                id: UserId(state.user_seq),
                name: user.name,
                email: user.email,
                password_hash: user.password_hash,
                role: user.role,
                session_token: None,
            };
            state.users.insert(created.id, created.clone());
            Ok(created)
        })
    }

    fn update_session_token(&self, user_id: UserId, token: &str) -> Result<(), RepositoryError> {
        self.write(|state| {
            let user = state.users.get_mut(&user_id).ok_or(RepositoryError::NotFound)?;
            user.session_token = Some(token.to_string());
            Ok(())
        })
    }
}

impl InviteRepository for InMemoryStore {
    fn find_valid_invite(&self, token: &str) -> Result<Option<Invite>, RepositoryError> {
        Ok(self.read(|state| state.invites.get(token).filter(|i| !i.used).cloned()))
    }

    fn mark_used(&self, token: &str) -> Result<(), RepositoryError> {
        self.write(|state| {
            let invite = state.invites.get_mut(token).ok_or(RepositoryError::NotFound)?;
            invite.used = true;
            Ok(())
        })
    }

    fn ensure_invite(&self, invite: Invite) -> Result<(), RepositoryError> {
        self.write(|state| {
            state.invites.entry(invite.token.clone()).or_insert(invite);
        });
        Ok(())
    }
}
