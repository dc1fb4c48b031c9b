//! Class booking library: seat accounting, waitlist promotion, accounts, and storage adapters.

pub mod accounts;
pub mod booking;
pub mod config;
pub mod error;
pub mod runtime;
pub mod store;
pub mod telemetry;
