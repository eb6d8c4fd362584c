use std::cmp::Ordering as CmpOrdering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::ops::Deref;
use std::ptr::NonNull;

use crate::pointers::common::impl_handle_traits;
use crate::pointers::SharedPtr;
use crate::shared::RefCounted;

/// A non-owning view of a reference counted object.
///
/// Copying or dropping a `SharedRef` never touches the count, which makes it
/// the cheap way to pass an object around while something else keeps it
/// alive. It comes either from [`SharedPtr::share`], borrowing the handle, or
/// from [`SharedRef::from_static`] for objects that are never freed.
/// [`upgrade`](SharedRef::upgrade) turns it back into an owning handle.
///
/// Because an upgraded view can end up releasing the object, a view only
/// crosses threads when the object itself may:
///
/// ```compile_fail,E0277
/// use std::marker::PhantomData;
/// use std::sync::MutexGuard;
/// use intrusive::{impl_ref_counted, Shared, SharedRef};
///
/// struct Pinned {
///     header: Shared,
///     _not_send: PhantomData<MutexGuard<'static, ()>>,
/// }
/// impl_ref_counted!(Pinned, header);
///
/// fn assert_send<T: Send>() {}
/// assert_send::<SharedRef<'static, Pinned>>();
/// ```
pub struct SharedRef<'a, T: ?Sized + RefCounted> {
    ptr: NonNull<T>,
    _marker: PhantomData<&'a T>,
}

// `upgrade` can move ownership to whichever thread holds the view.
unsafe impl<T: ?Sized + RefCounted + Send + Sync> Send for SharedRef<'_, T> {}
unsafe impl<T: ?Sized + RefCounted + Send + Sync> Sync for SharedRef<'_, T> {}

impl_handle_traits!(['a] SharedRef);

impl<'a, T: ?Sized + RefCounted> SharedRef<'a, T> {
    /// # Safety
    ///
    /// `object` must be owned by a handle, or marked no-delete, for all of `'a`.
    pub(crate) unsafe fn from_ref_unchecked(object: &'a T) -> Self {
        Self {
            ptr: NonNull::from(object),
            _marker: PhantomData,
        }
    }

    pub fn get(&self) -> Option<&'a T> {
        Some(unsafe { self.ptr.as_ref() })
    }

    /// An owning handle to the same object, adding one reference.
    #[track_caller]
    pub fn upgrade(self) -> SharedPtr<T> {
        unsafe { SharedPtr::from_raw(self.ptr.as_ptr()) }
    }
}

impl<T: ?Sized + RefCounted> SharedRef<'static, T> {
    /// Views an object with static storage, marking it no-delete.
    pub fn from_static(object: &'static T) -> Self {
        unsafe {
            object.set_no_delete(true);
            Self::from_ref_unchecked(object)
        }
    }
}

impl<T: ?Sized + RefCounted> Clone for SharedRef<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: ?Sized + RefCounted> Copy for SharedRef<'_, T> {}

impl<'a, T: ?Sized + RefCounted> Deref for SharedRef<'a, T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { self.ptr.as_ref() }
    }
}
