//! User accounts: invite-gated registration, password login, and bearer sessions.

pub mod domain;
pub mod password;
pub mod repository;
pub mod router;
pub mod service;
pub mod tokens;

pub use domain::{AuthenticatedUser, Invite, NewUser, SessionGrant, User, UserRole};
pub use password::{Argon2Hasher, PasswordError, PasswordHasher};
pub use repository::{InviteRepository, UserRepository};
pub use router::{account_router, bearer_token, require_admin, require_user};
pub use service::{AccountError, AccountService, SessionResolver};
pub use tokens::{TokenIssuer, UuidTokenIssuer};
