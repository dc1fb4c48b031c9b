use crate::booking::{RepositoryError, UserId};

use super::domain::{Invite, NewUser, User};

/// Storage for user accounts. Emails are stored normalized (trimmed, lowercase).
pub trait UserRepository: Send + Sync {
    fn find_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError>;
    fn find_by_session_token(&self, token: &str) -> Result<Option<User>, RepositoryError>;
    /// Fails with [`RepositoryError::Conflict`] when the email is taken.
    fn create_user(&self, user: NewUser) -> Result<User, RepositoryError>;
    fn update_session_token(&self, user_id: UserId, token: &str) -> Result<(), RepositoryError>;
}

/// Storage for registration invites.
pub trait InviteRepository: Send + Sync {
    /// The invite, only when it exists and has not been used.
    fn find_valid_invite(&self, token: &str) -> Result<Option<Invite>, RepositoryError>;
    fn mark_used(&self, token: &str) -> Result<(), RepositoryError>;
    /// Insert the invite unless a row with the same token already exists.
    fn ensure_invite(&self, invite: Invite) -> Result<(), RepositoryError>;
}
