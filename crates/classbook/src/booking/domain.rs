use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a scheduled class session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassId(pub i64);

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a registered user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Enrollment identifier. Assigned from a strictly increasing sequence, so it
/// doubles as the arrival order used for waitlist promotion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnrollmentId(pub i64);

impl fmt::Display for EnrollmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A scheduled activity with a fixed number of seats.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassSession {
    pub id: ClassId,
    pub title: String,
    pub instructor: String,
    pub schedule: DateTime<Utc>,
    pub capacity: u32,
}

/// Class details supplied by seeding or catalog import before an id exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewClassSession {
    pub title: String,
    pub instructor: String,
    pub schedule: DateTime<Utc>,
    pub capacity: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentStatus {
    /// Holds a seat.
    Confirmed,
    /// Queued behind the confirmed roster.
    Waitlist,
}

impl EnrollmentStatus {
    pub fn label(&self) -> &'static str {
        match self {
            EnrollmentStatus::Confirmed => "confirmed",
            EnrollmentStatus::Waitlist => "waitlist",
        }
    }

    pub fn from_label(value: &str) -> Option<Self> {
        match value {
            "confirmed" => Some(Self::Confirmed),
            "waitlist" => Some(Self::Waitlist),
            _ => None,
        }
    }
}

impl fmt::Display for EnrollmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A user's claim on a class session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enrollment {
    pub id: EnrollmentId,
    pub class_id: ClassId,
    pub user_id: UserId,
    pub status: EnrollmentStatus,
    pub created_at: DateTime<Utc>,
}

/// Enrollment row before the repository assigns its ordering id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEnrollment {
    pub class_id: ClassId,
    pub user_id: UserId,
    pub status: EnrollmentStatus,
    pub created_at: DateTime<Utc>,
}

/// Enrollment joined with the member's display name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterEntry {
    pub enrollment: Enrollment,
    pub member_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberView {
    pub id: UserId,
    pub name: String,
}

/// A class alongside its confirmed attendees and ordered waitlist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassOverview {
    #[serde(flatten)]
    pub session: ClassSession,
    pub attendees: Vec<MemberView>,
    pub waitlist: Vec<MemberView>,
}

impl ClassOverview {
    pub fn from_roster(session: ClassSession, mut roster: Vec<RosterEntry>) -> Self {
        roster.sort_by_key(|entry| entry.enrollment.id);
        let (confirmed, queued): (Vec<_>, Vec<_>) = roster
            .into_iter()
            .partition(|entry| entry.enrollment.status == EnrollmentStatus::Confirmed);

        let view = |entry: RosterEntry| MemberView {
            id: entry.enrollment.user_id,
            name: entry.member_name,
        };

        Self {
            session,
            attendees: confirmed.into_iter().map(view).collect(),
            waitlist: queued.into_iter().map(view).collect(),
        }
    }
}

/// `max(1, capacity + delta)` without overflowing in either direction.
pub fn clamp_capacity(current: u32, delta: i64) -> u32 {
    let target = i64::from(current).saturating_add(delta);
    target.clamp(1, i64::from(u32::MAX)) as u32
}

/// Seats still free, floored at zero.
pub fn open_slots(capacity: u32, confirmed: u32) -> u32 {
    capacity.saturating_sub(confirmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_never_drops_below_one() {
        assert_eq!(clamp_capacity(3, -10), 1);
        assert_eq!(clamp_capacity(3, -3), 1);
        assert_eq!(clamp_capacity(3, 0), 3);
        assert_eq!(clamp_capacity(3, 2), 5);
        assert_eq!(clamp_capacity(1, i64::MIN), 1);
        assert_eq!(clamp_capacity(u32::MAX, i64::MAX), u32::MAX);
    }

    #[test]
    fn open_slots_floor_at_zero() {
        assert_eq!(open_slots(4, 1), 3);
        assert_eq!(open_slots(2, 2), 0);
        assert_eq!(open_slots(1, 3), 0);
    }

    #[test]
    fn status_labels_round_trip() {
        for status in [EnrollmentStatus::Confirmed, EnrollmentStatus::Waitlist] {
            assert_eq!(EnrollmentStatus::from_label(status.label()), Some(status));
        }
        assert_eq!(EnrollmentStatus::from_label("pending"), None);
    }
}
