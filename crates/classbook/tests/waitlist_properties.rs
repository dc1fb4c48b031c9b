use std::sync::Arc;

use chrono::Utc;
use proptest::prelude::*;

use classbook::booking::{
    BookingError, BookingService, ClassId, ClassRepository, EnrollmentRepository,
    EnrollmentStatus, NewClassSession, UserId,
};
use classbook::store::InMemoryStore;

#[derive(Debug, Clone)]
enum Op {
    Enroll(i64),
    Unenroll(i64),
    Adjust(i32),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (1i64..=10).prop_map(Op::Enroll),
        2 => (1i64..=10).prop_map(Op::Unenroll),
        1 => (-3i32..=3).prop_map(Op::Adjust),
    ]
}

struct Snapshot {
    capacity: u32,
    confirmed: Vec<i64>,
    waitlist: Vec<i64>,
}

fn snapshot(store: &InMemoryStore, class_id: ClassId) -> Snapshot {
    let capacity = store
        .find_by_id(class_id)
        .expect("lookup")
        .expect("class exists")
        .capacity;
    let mut confirmed = Vec::new();
    let mut waitlist = Vec::new();
    for entry in store.list_by_class(class_id).expect("roster") {
        match entry.enrollment.status {
            EnrollmentStatus::Confirmed => confirmed.push(entry.enrollment.id.0),
            EnrollmentStatus::Waitlist => waitlist.push(entry.enrollment.id.0),
        }
    }
    Snapshot {
        capacity,
        confirmed,
        waitlist,
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn roster_stays_consistent_under_any_operation_sequence(
        initial in 1u32..=4,
        ops in prop::collection::vec(op(), 1..40),
    ) {
        let store = Arc::new(InMemoryStore::default());
        let class_id = store
            .create_class(NewClassSession {
                title: "Open mat".to_string(),
                instructor: "Coach".to_string(),
                schedule: Utc::now(),
                capacity: initial,
            })
            .expect("class stored")
            .id;
        let service = BookingService::new(store.clone(), store.clone());

        for op in ops {
            let before = snapshot(&store, class_id);
            match op {
                Op::Enroll(user) => match service.enroll(class_id, UserId(user)) {
                    Ok(_) | Err(BookingError::AlreadyEnrolled { .. }) => {}
                    Err(other) => panic!("unexpected enroll failure: {other}"),
                },
                Op::Unenroll(user) => service.unenroll(class_id, UserId(user)).expect("unenroll"),
                Op::Adjust(delta) => {
                    let capacity = service.adjust_capacity(class_id, delta).expect("adjust");
                    let expected = (i64::from(before.capacity) + i64::from(delta)).max(1);
                    prop_assert_eq!(i64::from(capacity), expected);
                }
            }
            let after = snapshot(&store, class_id);

            prop_assert!(after.capacity >= 1);
            // Seats only grow past capacity if they were already there.
            prop_assert!(
                after.confirmed.len() <= before.confirmed.len().max(after.capacity as usize)
            );
            if !after.waitlist.is_empty() {
                prop_assert!(after.confirmed.len() >= after.capacity as usize);
            }
            if let (Some(last_seated), Some(first_waiting)) =
                (after.confirmed.iter().max(), after.waitlist.iter().min())
            {
                prop_assert!(last_seated < first_waiting);
            }
        }
    }
}
