//! Repository implementations: an in-process store for tests and demos, and
//! SQLite for durable deployments. Both implement every repository trait so a
//! single handle can back the booking and account services.

mod memory;
mod sqlite;

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;
