use crate::sync::{fence, AtomicI32, Ordering};

use super::RefCounter;

/// Lock-free counter on a native atomic integer.
pub struct AtomicCounter {
    count: AtomicI32,
}

impl AtomicCounter {
    pub fn with_count(count: i32) -> Self {
        Self {
            count: AtomicI32::new(count),
        }
    }
}

impl Default for AtomicCounter {
    fn default() -> Self {
        Self::with_count(0)
    }
}

impl RefCounter for AtomicCounter {
    fn increment(&self) -> Result<i32, i32> {
        // New references are always made from an existing one, so the
        // increment itself needs no ordering.
        let mut old_count = self.count.load(Ordering::Relaxed);
        loop {
            if old_count < 0 || old_count == i32::MAX {
                return Err(old_count);
            }
            match self.count.compare_exchange(
                old_count,
                old_count + 1,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return Ok(old_count),
                Err(observed) => old_count = observed,
            }
        }
    }

    fn decrement_and_test_zero(&self) -> Result<bool, i32> {
        let mut old_count = self.count.load(Ordering::Relaxed);
        loop {
            if old_count <= 0 {
                return Err(old_count);
            }
            match self.count.compare_exchange(
                old_count,
                old_count - 1,
                Ordering::Release,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(observed) => old_count = observed,
            }
        }
        if old_count != 1 {
            return Ok(false);
        }
        // Every other owner's last use of the object happens-before the
        // destruction the caller is about to perform.
        fence(Ordering::Acquire);
        Ok(true)
    }

    fn peek(&self) -> i32 {
        self.count.load(Ordering::Acquire)
    }
}
