pub use std::sync::atomic::Ordering;

/// The mutual-exclusion primitive consumed by the mutex-guarded counter backend.
///
/// Very similar to `lock_api::RawMutex`, but without the const constructor constraint
pub trait RawMutex {
    fn new() -> Self;
    fn lock(&self);
    fn try_lock(&self) -> bool;
    fn is_locked(&self) -> bool;
    fn unlock(&self);
}

// Everyone (miri, shuttle, normal) uses normal atomics -- shuttle's atomics
// can only be touched inside a shuttle execution, and headers are created
// and dropped all over the test suite (and in doctests) outside of one. The
// stress tests still get their interleavings from shuttle's threads and the
// spin lock's yields.
pub use std::sync::atomic::{fence, AtomicBool, AtomicI32};

#[cfg(not(feature = "shuttle"))]
pub use std::thread;
#[cfg(feature = "shuttle")]
pub use shuttle::thread;

// RawMutex has two implementations: one for miri and shuttle,
// and one for normal
#[cfg(all(not(miri), not(feature = "shuttle")))]
pub type Mutex = WrappedUsyncMutex;
#[cfg(any(miri, feature = "shuttle"))]
pub type Mutex = BasicSpinMutex;

use lock_api::RawMutex as LockApiRawMutex;
pub struct WrappedUsyncMutex {
    inner: usync::RawMutex,
}
impl RawMutex for WrappedUsyncMutex {
    fn new() -> Self {
        Self {
            inner: LockApiRawMutex::INIT,
        }
    }
    fn lock(&self) {
        self.inner.lock();
    }
    fn try_lock(&self) -> bool {
        self.inner.try_lock()
    }
    fn is_locked(&self) -> bool {
        self.inner.is_locked()
    }
    fn unlock(&self) {
        unsafe { self.inner.unlock() };
    }
}

#[cfg(any(feature = "shuttle", miri))]
pub struct BasicSpinMutex {
    locked: AtomicBool,
}

#[cfg(any(feature = "shuttle", miri))]
/// A `RawMutex` implementation for shuttle and miri. We don't care about performance, just simplicity and correctness.
impl RawMutex for BasicSpinMutex {
    fn new() -> Self {
        Self {
            locked: AtomicBool::new(false),
        }
    }

    fn lock(&self) {
        loop {
            match self
                .locked
                .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            {
                Ok(_) => break,
                Err(_) => {
                    std::hint::spin_loop();
                    #[cfg(feature = "shuttle")]
                    shuttle::hint::spin_loop();
                    continue;
                }
            }
        }
    }

    fn try_lock(&self) -> bool {
        self.locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Acquire)
    }

    fn unlock(&self) {
        let was_locked = self.locked.swap(false, Ordering::Release);
        assert!(was_locked, "unlock called on an unlocked BasicSpinMutex");
    }
}

/// Holds a `RawMutex` for the guard's lifetime.
pub struct LockGuard<'a, M: RawMutex> {
    mutex: &'a M,
}

impl<'a, M: RawMutex> LockGuard<'a, M> {
    pub fn new(mutex: &'a M) -> Self {
        mutex.lock();
        Self { mutex }
    }

    pub fn try_new(mutex: &'a M) -> Option<Self> {
        if mutex.try_lock() {
            Some(Self { mutex })
        } else {
            None
        }
    }
}

impl<M: RawMutex> Drop for LockGuard<'_, M> {
    fn drop(&mut self) {
        self.mutex.unlock();
    }
}
