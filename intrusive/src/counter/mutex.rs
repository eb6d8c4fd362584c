use std::cell::UnsafeCell;

use crate::sync::{LockGuard, Mutex, RawMutex};

use super::RefCounter;

/// Fallback counter: a plain integer, only touched while holding a mutex.
///
/// For targets without usable native atomics, and selectable for every
/// `Shared` object with the `mutex-counter` feature.
pub struct MutexCounter {
    mutex: Mutex,
    count: UnsafeCell<i32>,
}

// The cell is only accessed under `mutex`.
unsafe impl Send for MutexCounter {}
unsafe impl Sync for MutexCounter {}

impl MutexCounter {
    pub fn with_count(count: i32) -> Self {
        Self {
            mutex: Mutex::new(),
            count: UnsafeCell::new(count),
        }
    }

    fn with_locked<R>(&self, f: impl FnOnce(&mut i32) -> R) -> R {
        let _guard = LockGuard::new(&self.mutex);
        f(unsafe { &mut *self.count.get() })
    }
}

impl Default for MutexCounter {
    fn default() -> Self {
        Self::with_count(0)
    }
}

impl RefCounter for MutexCounter {
    fn increment(&self) -> Result<i32, i32> {
        self.with_locked(|count| {
            let old_count = *count;
            if old_count < 0 || old_count == i32::MAX {
                return Err(old_count);
            }
            *count += 1;
            Ok(old_count)
        })
    }

    fn decrement_and_test_zero(&self) -> Result<bool, i32> {
        self.with_locked(|count| {
            let old_count = *count;
            if old_count <= 0 {
                return Err(old_count);
            }
            *count -= 1;
            Ok(old_count == 1)
        })
    }

    fn peek(&self) -> i32 {
        self.with_locked(|count| *count)
    }
}
