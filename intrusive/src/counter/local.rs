use std::cell::Cell;

use super::RefCounter;

/// Unsynchronized counter for objects that never leave their thread.
///
/// `Cell` makes this type `!Sync`, so anything embedding it cannot be shared
/// across threads and the plain read-modify-write is sound.
#[derive(Default)]
pub struct LocalCounter {
    count: Cell<i32>,
}

impl LocalCounter {
    pub fn with_count(count: i32) -> Self {
        Self {
            count: Cell::new(count),
        }
    }
}

impl RefCounter for LocalCounter {
    fn increment(&self) -> Result<i32, i32> {
        let old_count = self.count.get();
        if old_count < 0 || old_count == i32::MAX {
            return Err(old_count);
        }
        self.count.set(old_count + 1);
        Ok(old_count)
    }

    fn decrement_and_test_zero(&self) -> Result<bool, i32> {
        let old_count = self.count.get();
        if old_count <= 0 {
            return Err(old_count);
        }
        self.count.set(old_count - 1);
        Ok(old_count == 1)
    }

    fn peek(&self) -> i32 {
        self.count.get()
    }
}
