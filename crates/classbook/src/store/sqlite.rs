use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use parking_lot::{ReentrantMutex, ReentrantMutexGuard};
use rusqlite::types::Type;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use tracing::{info, warn};

use crate::accounts::{Invite, InviteRepository, NewUser, User, UserRepository, UserRole};
use crate::booking::{
    ClassId, ClassRepository, ClassSession, Enrollment, EnrollmentId, EnrollmentRepository,
    EnrollmentStatus, NewClassSession, NewEnrollment, RepositoryError, RosterEntry, UnitOfWork, UserId,
};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    email TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    role TEXT NOT NULL DEFAULT 'member' CHECK (role IN ('admin', 'member')),
    session_token TEXT
);

CREATE INDEX IF NOT EXISTS users_session_token ON users (session_token);

CREATE TABLE IF NOT EXISTS invites (
    token TEXT PRIMARY KEY,
    email TEXT,
    role TEXT NOT NULL DEFAULT 'member' CHECK (role IN ('admin', 'member')),
    used INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS classes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    instructor TEXT NOT NULL,
    schedule TEXT NOT NULL,
    capacity INTEGER NOT NULL CHECK (capacity >= 1)
);

CREATE TABLE IF NOT EXISTS enrollments (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    class_id INTEGER NOT NULL REFERENCES classes (id),
    user_id INTEGER NOT NULL REFERENCES users (id),
    status TEXT NOT NULL CHECK (status IN ('confirmed', 'waitlist')),
    created_at TEXT NOT NULL,
    UNIQUE (class_id, user_id)
);

CREATE INDEX IF NOT EXISTS enrollments_class_status ON enrollments (class_id, status, id);
"#;

/// SQLite-backed store. `AUTOINCREMENT` keeps enrollment ids strictly
/// increasing, even across deletions, so they serve as the arrival order.
///
/// One connection behind a reentrant lock: a unit of work keeps it for the
/// whole transaction while the repository calls inside it lock again.
#[derive(Debug)]
pub struct SqliteStore {
    conn: ReentrantMutex<Connection>,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path` and apply the schema.
    pub fn open(path: &Path) -> Result<Self, RepositoryError> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| {
                RepositoryError::Unavailable(format!(
                    "cannot create database directory {}: {err}",
                    parent.display()
                ))
            })?;
        }
        let conn = Connection::open(path)?;
        info!(path = %path.display(), "opened sqlite store");
        Self::initialize(conn)
    }

    pub fn open_in_memory() -> Result<Self, RepositoryError> {
        Self::initialize(Connection::open_in_memory()?)
    }

    fn initialize(conn: Connection) -> Result<Self, RepositoryError> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: ReentrantMutex::new(conn),
        })
    }

    fn conn(&self) -> ReentrantMutexGuard<'_, Connection> {
        self.conn.lock()
    }
}

impl UnitOfWork for SqliteStore {
    fn atomically<T, Failure, F>(&self, work: F) -> Result<T, Failure>
    where
        F: FnOnce() -> Result<T, Failure>,
        Failure: From<RepositoryError>,
    {
        let conn = self.conn();
        if !conn.is_autocommit() {
            // Already inside a transaction on this thread: join it.
            return work();
        }

        let tx = conn
            .unchecked_transaction()
            .map_err(|err| Failure::from(RepositoryError::from(err)))?;
        match work() {
            Ok(value) => {
                tx.commit()
                    .map_err(|err| Failure::from(RepositoryError::from(err)))?;
                Ok(value)
            }
            Err(failure) => {
                if let Err(err) = tx.rollback() {
                    warn!(error = %err, "sqlite rollback failed");
                }
                Err(failure)
            }
        }
    }
}

impl From<rusqlite::Error> for RepositoryError {
    fn from(err: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(failure, _) = &err {
            if failure.code == ErrorCode::ConstraintViolation {
                match failure.extended_code {
                    rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                    | rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY => return Self::Conflict,
                    rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY => return Self::NotFound,
                    _ => {}
                }
            }
        }
        Self::Unavailable(err.to_string())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unrecognized stored label '{0}'")]
struct UnknownLabel(String);

fn label_error(index: usize, raw: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(UnknownLabel(raw)))
}

fn class_from_row(row: &Row<'_>) -> rusqlite::Result<ClassSession> {
    Ok(ClassSession {
        id: ClassId(row.get(0)?),
        title: row.get(1)?,
        instructor: row.get(2)?,
        schedule: row.get::<_, DateTime<Utc>>(3)?,
        capacity: row.get(4)?,
    })
}

fn enrollment_from_row(row: &Row<'_>) -> rusqlite::Result<Enrollment> {
    let raw_status: String = row.get(3)?;
    let status =
        EnrollmentStatus::from_label(&raw_status).ok_or_else(|| label_error(3, raw_status))?;
    Ok(Enrollment {
        id: EnrollmentId(row.get(0)?),
        class_id: ClassId(row.get(1)?),
        user_id: UserId(row.get(2)?),
        status,
        created_at: row.get(4)?,
    })
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    let raw_role: String = row.get(4)?;
    let role = UserRole::from_label(&raw_role).ok_or_else(|| label_error(4, raw_role))?;
    Ok(User {
        id: UserId(row.get(0)?),
        name: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        role,
        session_token: row.get(5)?,
    })
}

fn invite_from_row(row: &Row<'_>) -> rusqlite::Result<Invite> {
    let raw_role: String = row.get(2)?;
    let role = UserRole::from_label(&raw_role).ok_or_else(|| label_error(2, raw_role))?;
    Ok(Invite {
        token: row.get(0)?,
        email: row.get(1)?,
        role,
        used: row.get(3)?,
        created_at: row.get(4)?,
    })
}

const CLASS_COLUMNS: &str = "id, title, instructor, schedule, capacity";
const ENROLLMENT_COLUMNS: &str = "id, class_id, user_id, status, created_at";
const USER_COLUMNS: &str = "id, name, email, password_hash, role, session_token";

impl ClassRepository for SqliteStore {
    fn find_by_id(&self, id: ClassId) -> Result<Option<ClassSession>, RepositoryError> {
        let conn = self.conn();
        let session = conn
            .query_row(
                &format!("SELECT {CLASS_COLUMNS} FROM classes WHERE id = ?1"),
                params![id.0],
                class_from_row,
            )
            .optional()?;
        Ok(session)
    }

    fn update_capacity(&self, id: ClassId, capacity: u32) -> Result<(), RepositoryError> {
        let conn = self.conn();
        let updated = conn.execute(
            "UPDATE classes SET capacity = ?1 WHERE id = ?2",
            params![capacity, id.0],
        )?;
        if updated == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    fn list_classes(&self) -> Result<Vec<ClassSession>, RepositoryError> {
        let conn = self.conn();
        let mut statement = conn.prepare(&format!(
            "SELECT {CLASS_COLUMNS} FROM classes ORDER BY schedule ASC, id ASC"
        ))?;
        let classes = statement
            .query_map([], class_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(classes)
    }

    fn create_class(&self, class: NewClassSession) -> Result<ClassSession, RepositoryError> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO classes (title, instructor, schedule, capacity) VALUES (?1, ?2, ?3, ?4)",
            params![class.title, class.instructor, class.schedule, class.capacity],
        )?;
        Ok(ClassSession {
            id: ClassId(conn.last_insert_rowid()),
            title: class.title,
            instructor: class.instructor,
            schedule: class.schedule,
            capacity: class.capacity,
        })
    }
}

impl EnrollmentRepository for SqliteStore {
    fn count_confirmed(&self, class_id: ClassId) -> Result<u32, RepositoryError> {
        let conn = self.conn();
        let count: u32 = conn.query_row(
            "SELECT COUNT(*) FROM enrollments WHERE class_id = ?1 AND status = 'confirmed'",
            params![class_id.0],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn list_waitlist_by_class(
        &self,
        class_id: ClassId,
        limit: u32,
    ) -> Result<Vec<Enrollment>, RepositoryError> {
        let conn = self.conn();
        let mut statement = conn.prepare(&format!(
            "SELECT {ENROLLMENT_COLUMNS} FROM enrollments \
             WHERE class_id = ?1 AND status = 'waitlist' ORDER BY id ASC LIMIT ?2"
        ))?;
        let entries = statement
            .query_map(params![class_id.0, limit], enrollment_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    fn update_status(
        &self,
        enrollment_id: EnrollmentId,
        status: EnrollmentStatus,
    ) -> Result<(), RepositoryError> {
        let conn = self.conn();
        let updated = conn.execute(
            "UPDATE enrollments SET status = ?1 WHERE id = ?2",
            params![status.label(), enrollment_id.0],
        )?;
        if updated == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    fn find_by_class_and_user(
        &self,
        class_id: ClassId,
        user_id: UserId,
    ) -> Result<Option<Enrollment>, RepositoryError> {
        let conn = self.conn();
        let enrollment = conn
            .query_row(
                &format!(
                    "SELECT {ENROLLMENT_COLUMNS} FROM enrollments WHERE class_id = ?1 AND user_id = ?2"
                ),
                params![class_id.0, user_id.0],
                enrollment_from_row,
            )
            .optional()?;
        Ok(enrollment)
    }

    fn create_enrollment(&self, record: NewEnrollment) -> Result<Enrollment, RepositoryError> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO enrollments (class_id, user_id, status, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                record.class_id.0,
                record.user_id.0,
                record.status.label(),
                record.created_at
            ],
        )?;
        Ok(Enrollment {
            id: EnrollmentId(conn.last_insert_rowid()),
            class_id: record.class_id,
            user_id: record.user_id,
            status: record.status,
            created_at: record.created_at,
        })
    }

    fn delete_enrollment(
        &self,
        class_id: ClassId,
        user_id: UserId,
    ) -> Result<bool, RepositoryError> {
        let conn = self.conn();
        let removed = conn.execute(
            "DELETE FROM enrollments WHERE class_id = ?1 AND user_id = ?2",
            params![class_id.0, user_id.0],
        )?;
        Ok(removed > 0)
    }

    fn list_by_class(&self, class_id: ClassId) -> Result<Vec<RosterEntry>, RepositoryError> {
        let conn = self.conn();
        let mut statement = conn.prepare(
            "SELECT e.id, e.class_id, e.user_id, e.status, e.created_at, u.name \
             FROM enrollments e JOIN users u ON u.id = e.user_id \
             WHERE e.class_id = ?1 ORDER BY e.id ASC",
        )?;
        let roster = statement
            .query_map(params![class_id.0], |row| {
                Ok(RosterEntry {
                    enrollment: enrollment_from_row(row)?,
                    member_name: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(roster)
    }
}

impl UserRepository for SqliteStore {
    fn find_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError> {
        let conn = self.conn();
        let user = conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"),
                params![email],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    fn find_by_session_token(&self, token: &str) -> Result<Option<User>, RepositoryError> {
        let conn = self.conn();
        let user = conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE session_token = ?1"),
                params![token],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    fn create_user(&self, user: NewUser) -> Result<User, RepositoryError> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO users (name, email, password_hash, role) VALUES (?1, ?2, ?3, ?4)",
            params![user.name, user.email, user.password_hash, user.role.label()],
        )?;
        Ok(User {
            id: UserId(conn.last_insert_rowid()),
            name: user.name,
            email: user.email,
            password_hash: user.password_hash,
            role: user.role,
            session_token: None,
        })
    }

    fn update_session_token(&self, user_id: UserId, token: &str) -> Result<(), RepositoryError> {
        let conn = self.conn();
        let updated = conn.execute(
            "UPDATE users SET session_token = ?1 WHERE id = ?2",
            params![token, user_id.0],
        )?;
        if updated == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}

impl InviteRepository for SqliteStore {
    fn find_valid_invite(&self, token: &str) -> Result<Option<Invite>, RepositoryError> {
        let conn = self.conn();
        let invite = conn
            .query_row(
                "SELECT token, email, role, used, created_at FROM invites \
                 WHERE token = ?1 AND used = 0",
                params![token],
                invite_from_row,
            )
            .optional()?;
        Ok(invite)
    }

    fn mark_used(&self, token: &str) -> Result<(), RepositoryError> {
        let conn = self.conn();
        let updated = conn.execute("UPDATE invites SET used = 1 WHERE token = ?1", params![token])?;
        if updated == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    fn ensure_invite(&self, invite: Invite) -> Result<(), RepositoryError> {
        let conn = self.conn();
        conn.execute(
            "INSERT OR IGNORE INTO invites (token, email, role, used, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                invite.token,
                invite.email,
                invite.role.label(),
                invite.used,
                invite.created_at
            ],
        )?;
        Ok(())
    }
}
