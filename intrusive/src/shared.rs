use std::any::Any;
use std::fmt;
use std::ptr::NonNull;

use crate::counter::{DefaultCounter, LocalCounter, MutexCounter, RefCounter};
use crate::error::{Error, Location, Result};
use crate::sync::{AtomicBool, Ordering};

/// Thread-safe reference count header, on the default counter backend.
pub type Shared = RefCountBase<DefaultCounter>;
/// Thread-safe reference count header that always uses the mutex-guarded backend.
pub type MutexShared = RefCountBase<MutexCounter>;
/// Reference count header for objects confined to a single thread.
pub type SimpleShared = RefCountBase<LocalCounter>;

/// The outcome of dropping one reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Released {
    /// Other references remain.
    Retained,
    /// This was the last reference; the caller now owns the destruction.
    Delete,
    /// This was the last reference, but the object is marked no-delete.
    Suppressed,
}

/// The reference count header embedded in every reference counted object.
///
/// A header starts at a count of zero: creating an object does not create an
/// owner, the first handle does. Cloning a header (as part of cloning the
/// object that embeds it) yields a fresh header; the copy's owners are
/// unrelated to the source's.
pub struct RefCountBase<C: RefCounter = DefaultCounter> {
    count: C,
    no_delete: AtomicBool,
}

impl<C: RefCounter> RefCountBase<C> {
    pub fn new() -> Self {
        Self {
            count: C::default(),
            no_delete: AtomicBool::new(false),
        }
    }

    #[track_caller]
    pub fn try_inc_ref(&self) -> Result<()> {
        match self.count.increment() {
            Ok(_old_count) => {
                debug_println!("inc_ref {:p} {} -> {}", self, _old_count, _old_count + 1);
                Ok(())
            }
            Err(observed) => Err(Error::RefCountOverflow {
                location: Location::caller(),
                observed,
            }),
        }
    }

    /// Drops one reference.
    ///
    /// Exactly one caller sees the count reach zero. If the object is not
    /// marked no-delete, that caller gets [`Released::Delete`] and the flag is
    /// set on its behalf, so no other path can claim the destruction again.
    ///
    /// # Safety
    ///
    /// The caller must give up a reference it owns: one taken with
    /// `try_inc_ref` that no handle accounts for. Decrementing on behalf of a
    /// live handle lets that handle free the object under its siblings.
    #[track_caller]
    pub unsafe fn try_dec_ref(&self) -> Result<Released> {
        match self.count.decrement_and_test_zero() {
            Ok(false) => {
                debug_println!("dec_ref {:p} retained", self);
                Ok(Released::Retained)
            }
            Ok(true) => {
                if self.no_delete.swap(true, Ordering::AcqRel) {
                    Ok(Released::Suppressed)
                } else {
                    Ok(Released::Delete)
                }
            }
            Err(observed) => Err(Error::RefCountUnderflow {
                location: Location::caller(),
                observed,
            }),
        }
    }

    pub fn get_ref(&self) -> i32 {
        self.count.peek()
    }

    /// Marks the object as not owned by its handles: reaching a count of
    /// zero will no longer free it. Required for objects in static or stack
    /// storage.
    ///
    /// # Safety
    ///
    /// Clearing the flag hands the object back to its handles, which will
    /// free it through `Box`. Only clear it on an object that came from a
    /// `Box` and that nothing else borrows. Set the flag before the object is
    /// shared with other threads.
    pub unsafe fn set_no_delete(&self, no_delete: bool) {
        self.no_delete.store(no_delete, Ordering::Release);
    }

    pub fn is_no_delete(&self) -> bool {
        self.no_delete.load(Ordering::Acquire)
    }
}

impl<C: RefCounter> Default for RefCountBase<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: RefCounter> Clone for RefCountBase<C> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<C: RefCounter> fmt::Debug for RefCountBase<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefCountBase")
            .field("count", &self.get_ref())
            .field("no_delete", &self.is_no_delete())
            .finish()
    }
}

/// Types that carry an intrusive reference count.
///
/// Implement it with [`impl_ref_counted!`](crate::impl_ref_counted), which
/// forwards to an embedded [`RefCountBase`]. A trait whose supertraits include
/// `RefCounted` makes its trait objects reference counted too, so
/// `SharedPtr<dyn Trait>` works.
///
/// # Safety
///
/// Implementations must report counts faithfully: `try_dec_ref` may return
/// [`Released::Delete`] at most once per object, and only after every
/// increment has been matched by a decrement. Handles free the object when
/// told to, so a lying implementation is a double free.
///
/// Only the owner of a reference may give it back, so the decrement and the
/// no-delete switch are `unsafe` to call. Safe code goes through
/// [`SharedPtr`](crate::SharedPtr), which cannot unbalance the count:
///
/// ```compile_fail,E0133
/// use intrusive::{impl_ref_counted, RefCounted, Shared, SharedPtr};
///
/// struct Job {
///     header: Shared,
/// }
/// impl_ref_counted!(Job, header);
///
/// let a = SharedPtr::new(Job { header: Shared::new() });
/// let b = a.clone();
/// a.dec_ref();
/// # drop((a, b));
/// ```
///
/// ```compile_fail,E0133
/// use intrusive::{impl_ref_counted, RefCounted, Shared, SharedPtr};
///
/// struct Job {
///     header: Shared,
/// }
/// impl_ref_counted!(Job, header);
///
/// let job: &'static Job = Box::leak(Box::new(Job { header: Shared::new() }));
/// let a = SharedPtr::from_static(job);
/// a.set_no_delete(false);
/// ```
pub unsafe trait RefCounted {
    fn try_inc_ref(&self) -> Result<()>;
    /// # Safety
    ///
    /// See [`RefCountBase::try_dec_ref`].
    unsafe fn try_dec_ref(&self) -> Result<Released>;
    fn get_ref(&self) -> i32;
    /// # Safety
    ///
    /// See [`RefCountBase::set_no_delete`].
    unsafe fn set_no_delete(&self, no_delete: bool);
    fn is_no_delete(&self) -> bool;

    #[track_caller]
    fn inc_ref(&self) {
        if let Err(err) = self.try_inc_ref() {
            err.raise();
        }
    }

    /// # Safety
    ///
    /// See [`RefCountBase::try_dec_ref`].
    #[track_caller]
    unsafe fn dec_ref(&self) -> Released {
        match unsafe { self.try_dec_ref() } {
            Ok(released) => released,
            Err(err) => err.raise(),
        }
    }
}

unsafe impl<C: RefCounter> RefCounted for RefCountBase<C> {
    #[track_caller]
    fn try_inc_ref(&self) -> Result<()> {
        RefCountBase::try_inc_ref(self)
    }
    #[track_caller]
    unsafe fn try_dec_ref(&self) -> Result<Released> {
        unsafe { RefCountBase::try_dec_ref(self) }
    }
    fn get_ref(&self) -> i32 {
        RefCountBase::get_ref(self)
    }
    unsafe fn set_no_delete(&self, no_delete: bool) {
        unsafe { RefCountBase::set_no_delete(self, no_delete) }
    }
    fn is_no_delete(&self) -> bool {
        RefCountBase::is_no_delete(self)
    }
}

/// Implements [`RefCounted`] for a type by forwarding to one of its
/// [`RefCountBase`] fields.
///
/// ```
/// use intrusive::{impl_ref_counted, Shared};
///
/// struct Session {
///     header: Shared,
///     id: u64,
/// }
/// impl_ref_counted!(Session, header);
///
/// struct Slot<T> {
///     header: Shared,
///     value: T,
/// }
/// impl_ref_counted!(impl[T] Slot<T>, header);
/// ```
#[macro_export]
macro_rules! impl_ref_counted {
    ($ty:ty, $field:ident) => {
        $crate::impl_ref_counted!(impl[] $ty, $field);
    };
    (impl[$($generics:tt)*] $ty:ty, $field:ident) => {
        unsafe impl<$($generics)*> $crate::RefCounted for $ty {
            #[track_caller]
            fn try_inc_ref(&self) -> $crate::Result<()> {
                self.$field.try_inc_ref()
            }
            #[track_caller]
            unsafe fn try_dec_ref(&self) -> $crate::Result<$crate::Released> {
                unsafe { self.$field.try_dec_ref() }
            }
            fn get_ref(&self) -> i32 {
                self.$field.get_ref()
            }
            unsafe fn set_no_delete(&self, no_delete: bool) {
                unsafe { self.$field.set_no_delete(no_delete) }
            }
            fn is_no_delete(&self) -> bool {
                self.$field.is_no_delete()
            }
        }
    };
}

/// Upcasts to `&dyn Any`; the hook [`SharedPtr::dynamic_cast`](crate::SharedPtr::dynamic_cast)
/// uses to inspect a trait object's concrete type. Add it as a supertrait next
/// to `RefCounted`.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Drops one reference to `ptr`, freeing the object if that was the last one.
///
/// # Safety
///
/// `ptr` must point to a live object on which the caller owns one reference,
/// and the object must either come from `Box::into_raw` (with a type whose
/// layout matches `T`) or be marked no-delete.
#[track_caller]
pub unsafe fn release<T: ?Sized + RefCounted>(ptr: NonNull<T>) -> Released {
    let released = unsafe { ptr.as_ref().dec_ref() };
    match released {
        Released::Delete => {
            log::trace!("deleting {:p}", ptr);
            drop(unsafe { Box::from_raw(ptr.as_ptr()) });
        }
        Released::Suppressed => log::trace!("count of {:p} reached zero, deletion suppressed", ptr),
        Released::Retained => {}
    }
    released
}
