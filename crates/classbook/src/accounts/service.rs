use std::sync::{Arc, Mutex, PoisonError};

use tracing::{info, warn};

use crate::booking::RepositoryError;

use super::domain::{AuthenticatedUser, NewUser, SessionGrant};
use super::password::{PasswordError, PasswordHasher};
use super::repository::{InviteRepository, UserRepository};
use super::tokens::TokenIssuer;

const MIN_PASSWORD_LEN: usize = 6;

/// Resolves bearer tokens to users for request handlers.
pub trait SessionResolver: Send + Sync {
    fn resolve(&self, token: &str) -> Result<Option<AuthenticatedUser>, AccountError>;
}

/// Invite-based registration, password login, and session lookup.
pub struct AccountService<U, I> {
    users: Arc<U>,
    invites: Arc<I>,
    hasher: Arc<dyn PasswordHasher>,
    tokens: Arc<dyn TokenIssuer>,
    // Serializes invite consumption so one invite creates one account.
    registration: Mutex<()>,
}

impl<U, I> AccountService<U, I>
where
    U: UserRepository + 'static,
    I: InviteRepository + 'static,
{
    pub fn new(
        users: Arc<U>,
        invites: Arc<I>,
        hasher: Arc<dyn PasswordHasher>,
        tokens: Arc<dyn TokenIssuer>,
    ) -> Self {
        Self {
            users,
            invites,
            hasher,
            tokens,
            registration: Mutex::new(()),
        }
    }

    pub fn register(
        &self,
        invite_token: &str,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<SessionGrant, AccountError> {
        let name = name.trim();
        let email = normalize_email(email);
        if name.is_empty() {
            return Err(AccountError::InvalidInput("name is required".to_string()));
        }
        if email.is_empty() || !email.contains('@') {
            return Err(AccountError::InvalidInput(
                "a valid email is required".to_string(),
            ));
        }
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AccountError::InvalidInput(format!(
                "password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }

        let _guard = self
            .registration
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let invite = self
            .invites
            .find_valid_invite(invite_token.trim())?
            .ok_or(AccountError::InvalidInvite)?;

        if self.users.find_by_email(&email)?.is_some() {
            return Err(AccountError::EmailTaken);
        }

        let password_hash = self.hasher.hash(password)?;
        let user = self
            .users
            .create_user(NewUser {
                name: name.to_string(),
                email,
                password_hash,
                role: invite.role,
            })
            .map_err(|err| match err {
                RepositoryError::Conflict => AccountError::EmailTaken,
                other => AccountError::Repository(other),
            })?;
        self.invites.mark_used(&invite.token)?;

        let token = self.tokens.issue();
        self.users.update_session_token(user.id, &token)?;
        info!(user_id = %user.id, role = user.role.label(), "account registered");

        Ok(SessionGrant {
            user: AuthenticatedUser::from(&user),
            token,
        })
    }

    /// Verify credentials and rotate the session token.
    pub fn login(&self, email: &str, password: &str) -> Result<SessionGrant, AccountError> {
        let email = normalize_email(email);
        let Some(user) = self.users.find_by_email(&email)? else {
            warn!("login rejected: unknown email");
            return Err(AccountError::InvalidCredentials);
        };
        if !self.hasher.verify(password, &user.password_hash) {
            warn!(user_id = %user.id, "login rejected: wrong password");
            return Err(AccountError::InvalidCredentials);
        }

        let token = self.tokens.issue();
        self.users.update_session_token(user.id, &token)?;

        Ok(SessionGrant {
            user: AuthenticatedUser::from(&user),
            token,
        })
    }
}

impl<U, I> SessionResolver for AccountService<U, I>
where
    U: UserRepository + 'static,
    I: InviteRepository + 'static,
{
    fn resolve(&self, token: &str) -> Result<Option<AuthenticatedUser>, AccountError> {
        if token.is_empty() {
            return Ok(None);
        }
        let user = self.users.find_by_session_token(token)?;
        Ok(user.as_ref().map(AuthenticatedUser::from))
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

/// Error raised by the account service.
#[derive(Debug, thiserror::Error)]
pub enum AccountError {
    #[error("invite is invalid or already used")]
    InvalidInvite,
    #[error("a user with that email already exists")]
    EmailTaken,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("{0}")]
    InvalidInput(String),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Hashing(#[from] PasswordError),
}
