use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use super::domain::ClassId;

/// Per-class mutual exclusion. Operations on one class run one at a time;
/// different classes never contend beyond the brief registry lookup.
///
/// A slot lives only while some caller holds or waits on it, so the registry
/// stays as small as the set of classes currently in use.
#[derive(Debug, Default)]
pub struct ClassLocks {
    slots: Mutex<HashMap<ClassId, Arc<Mutex<()>>>>,
}

impl ClassLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `work` while holding the lock for `class_id`.
    pub fn with_class<T>(&self, class_id: ClassId, work: impl FnOnce() -> T) -> T {
        let slot = self.slot(class_id);
        let result = {
            // The guarded value is `()`, so a poisoned lock carries no broken state.
            let _guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
            work()
        };
        self.release(class_id, slot);
        result
    }

    fn slot(&self, class_id: ClassId) -> Arc<Mutex<()>> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.entry(class_id).or_default().clone()
    }

    fn release(&self, class_id: ClassId, slot: Arc<Mutex<()>>) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        // Clones are only taken under the registry lock, so the count is
        // exact here: the map's handle plus ours means nobody else is waiting.
        if Arc::strong_count(&slot) == 2 {
            slots.remove(&class_id);
        }
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
