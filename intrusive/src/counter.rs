mod atomic;
mod local;
mod mutex;
pub use atomic::AtomicCounter;
pub use local::LocalCounter;
pub use mutex::MutexCounter;

/// A shared integer cell supporting the three operations reference counting needs.
///
/// Implementations must make `increment` and `decrement_and_test_zero`
/// linearizable with respect to each other on the same cell, so that exactly
/// one caller observes any given transition from one to zero. Neither
/// operation may push the count outside `0..=i32::MAX`: an operation that
/// would do so leaves the cell untouched and reports the value it observed.
pub trait RefCounter: Default {
    /// Adds one, returning the previous value.
    ///
    /// Fails with the observed value if it was negative or already saturated.
    fn increment(&self) -> Result<i32, i32>;

    /// Subtracts one and returns whether the count is now zero.
    ///
    /// Fails with the observed value if the count was not positive.
    fn decrement_and_test_zero(&self) -> Result<bool, i32>;

    /// A snapshot of the current value. Only useful for diagnostics, since
    /// concurrent callers may change it immediately after the read.
    fn peek(&self) -> i32;
}

/// The backend `Shared` uses: native atomics, or the mutex-guarded fallback
/// when built with the `mutex-counter` feature.
#[cfg(not(feature = "mutex-counter"))]
pub type DefaultCounter = AtomicCounter;
#[cfg(feature = "mutex-counter")]
pub type DefaultCounter = MutexCounter;
