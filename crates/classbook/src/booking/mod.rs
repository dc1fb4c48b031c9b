//! Seat accounting for scheduled classes.
//!
//! Confirmed enrollments never exceed a class's capacity, and waitlisted
//! enrollments are promoted strictly in arrival order whenever seats open:
//! after a withdrawal, a capacity change, or a confirming enrollment. All
//! mutations for one class are serialized through [`ClassLocks`].

pub mod catalog;
pub mod domain;
pub mod locks;
pub mod repository;
pub mod router;
pub mod service;
pub mod waitlist;

#[cfg(test)]
mod tests;

pub use catalog::{default_classes, import_classes, load_csv, parse_classes, CatalogImportError};
pub use domain::{
    ClassId, ClassOverview, ClassSession, Enrollment, EnrollmentId, EnrollmentStatus, MemberView,
    NewClassSession, NewEnrollment, RosterEntry, UserId,
};
pub use locks::ClassLocks;
pub use repository::{ClassRepository, EnrollmentRepository, RepositoryError, UnitOfWork};
pub use router::{booking_router, BookingState};
pub use service::{BookingError, BookingService};
pub use waitlist::WaitlistPromotionEngine;
