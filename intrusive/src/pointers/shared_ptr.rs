use std::any::Any;
use std::cmp::Ordering as CmpOrdering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::mem;
use std::ops::Deref;
use std::ptr::NonNull;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};
use crate::pointers::common::impl_handle_traits;
use crate::pointers::SharedRef;
use crate::shared::{release, AsAny, RefCounted};

/// An owning handle to an intrusively reference counted object.
///
/// Every non-null `SharedPtr` accounts for exactly one increment of its
/// target's count: creating or cloning a handle increments, dropping or
/// reassigning it decrements. The handle whose decrement takes the count to
/// zero frees the object, unless the object is marked no-delete.
///
/// Unlike `std::sync::Arc`, a `SharedPtr` may be null. Dereferencing a null
/// handle raises [`Error::NullAccess`] carrying the caller's location; use
/// [`get`](SharedPtr::get) or [`try_deref`](SharedPtr::try_deref) to test first.
///
/// Comparison, ordering and hashing look through the handle at the pointees.
/// Use [`SharedPtr::ptr_eq`] for identity.
pub struct SharedPtr<T: ?Sized + RefCounted> {
    ptr: Option<NonNull<T>>,
    _marker: PhantomData<T>,
}

unsafe impl<T: ?Sized + RefCounted + Send + Sync> Send for SharedPtr<T> {}
unsafe impl<T: ?Sized + RefCounted + Send + Sync> Sync for SharedPtr<T> {}

impl_handle_traits!([] SharedPtr);

impl<T: ?Sized + RefCounted> SharedPtr<T> {
    pub const fn null() -> Self {
        Self {
            ptr: None,
            _marker: PhantomData,
        }
    }

    /// Takes ownership of a boxed object, which must not be shared yet.
    #[track_caller]
    pub fn from_box(boxed: Box<T>) -> Self {
        let ptr = NonNull::from(Box::leak(boxed));
        unsafe { ptr.as_ref() }.inc_ref();
        Self {
            ptr: Some(ptr),
            _marker: PhantomData,
        }
    }

    /// Wraps a raw pointer, adding a reference if it is non-null.
    ///
    /// # Safety
    ///
    /// A non-null `ptr` must point to a live object that either came from
    /// `Box::into_raw` (or another handle) or is marked no-delete, and it must
    /// stay alive until its count drops to zero.
    #[track_caller]
    pub unsafe fn from_raw(ptr: *const T) -> Self {
        let ptr = NonNull::new(ptr as *mut T);
        if let Some(ptr) = ptr {
            unsafe { ptr.as_ref() }.inc_ref();
        }
        Self {
            ptr,
            _marker: PhantomData,
        }
    }

    /// Adopts a reference previously leaked with [`into_raw`](SharedPtr::into_raw)
    /// without adding a new one.
    ///
    /// # Safety
    ///
    /// `ptr` must carry one reference that nothing else will release.
    pub unsafe fn from_raw_owned(ptr: Option<NonNull<T>>) -> Self {
        Self {
            ptr,
            _marker: PhantomData,
        }
    }

    /// Wraps an object with static storage. The object is marked no-delete,
    /// so the handles never try to free it.
    #[track_caller]
    pub fn from_static(object: &'static T) -> Self {
        // Setting the flag only ever withholds a free.
        unsafe {
            object.set_no_delete(true);
            Self::from_raw(object)
        }
    }

    /// Releases the handle without touching the count. The caller becomes
    /// responsible for the reference.
    pub fn into_raw(self) -> Option<NonNull<T>> {
        let ptr = self.ptr;
        mem::forget(self);
        ptr
    }

    pub fn as_ptr(&self) -> Option<NonNull<T>> {
        self.ptr
    }

    pub fn get(&self) -> Option<&T> {
        self.ptr.map(|ptr| unsafe { ptr.as_ref() })
    }

    #[track_caller]
    pub fn try_deref(&self) -> Result<&T> {
        match self.ptr {
            Some(ptr) => Ok(unsafe { ptr.as_ref() }),
            None => Err(Error::null_access()),
        }
    }

    pub fn is_null(&self) -> bool {
        self.ptr.is_none()
    }

    pub fn is_some(&self) -> bool {
        self.ptr.is_some()
    }

    /// The target's current count, or zero for a null handle.
    pub fn ref_count(&self) -> i32 {
        self.get().map_or(0, |object| object.get_ref())
    }

    /// Whether both handles point at the same object (or are both null).
    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        this.ptr.map(NonNull::cast::<()>) == other.ptr.map(NonNull::cast::<()>)
    }

    /// A non-owning view of the target, valid while this handle is borrowed.
    pub fn share(&self) -> Option<SharedRef<'_, T>> {
        self.get().map(|object| unsafe { SharedRef::from_ref_unchecked(object) })
    }

    /// Points this handle at `other`'s target.
    ///
    /// The new target is incremented before the old one is decremented, and
    /// reassigning a handle to the object it already holds does nothing, so
    /// the object can never hit zero in between.
    #[track_caller]
    pub fn assign(&mut self, other: &Self) {
        if Self::ptr_eq(self, other) {
            return;
        }
        if let Some(object) = other.get() {
            object.inc_ref();
        }
        self.replace(other.ptr);
    }

    /// Points this handle at a raw object, with the ordering of [`assign`](SharedPtr::assign).
    ///
    /// # Safety
    ///
    /// Same requirements as [`from_raw`](SharedPtr::from_raw).
    #[track_caller]
    pub unsafe fn assign_raw(&mut self, ptr: *const T) {
        let ptr = NonNull::new(ptr as *mut T);
        if self.ptr.map(NonNull::cast::<()>) == ptr.map(NonNull::cast::<()>) {
            return;
        }
        if let Some(ptr) = ptr {
            unsafe { ptr.as_ref() }.inc_ref();
        }
        self.replace(ptr);
    }

    /// Makes the handle null, releasing its target.
    #[track_caller]
    pub fn reset(&mut self) {
        self.replace(None);
    }

    pub fn take(&mut self) -> Self {
        mem::take(self)
    }

    pub fn swap(&mut self, other: &mut Self) {
        mem::swap(&mut self.ptr, &mut other.ptr);
    }

    // `ptr`'s reference must already have been accounted for.
    #[track_caller]
    fn replace(&mut self, ptr: Option<NonNull<T>>) {
        if let Some(old) = mem::replace(&mut self.ptr, ptr) {
            unsafe { release(old) };
        }
    }
}

impl<T: RefCounted> SharedPtr<T> {
    #[track_caller]
    pub fn new(value: T) -> Self {
        Self::from_box(Box::new(value))
    }
}

impl<T: ?Sized + RefCounted + AsAny> SharedPtr<T> {
    /// Casts the target to its concrete type `U`.
    ///
    /// Returns a new handle (one more reference on the target) if the target
    /// is a `U`, or a null handle otherwise. `self` is left as it was either way.
    #[track_caller]
    pub fn dynamic_cast<U: RefCounted + Any>(&self) -> SharedPtr<U> {
        match self.get() {
            Some(object) => SharedPtr::dynamic_cast_ref(object),
            None => SharedPtr::null(),
        }
    }
}

impl<T: RefCounted + Any> SharedPtr<T> {
    /// Wraps `object` if its concrete type is `T`, otherwise returns null.
    ///
    /// `object` must be reachable through a handle, which is what makes the
    /// new reference sound.
    #[track_caller]
    fn dynamic_cast_ref<Y: ?Sized + RefCounted + AsAny>(object: &Y) -> Self {
        match <Y as AsAny>::as_any(object).downcast_ref::<T>() {
            Some(target) => unsafe { Self::from_raw(target) },
            None => Self::null(),
        }
    }

    /// Casts a raw pointer to `T`, wrapping it on success.
    ///
    /// # Safety
    ///
    /// Same requirements as [`from_raw`](SharedPtr::from_raw).
    #[track_caller]
    pub unsafe fn dynamic_cast_raw<Y: ?Sized + RefCounted + AsAny>(ptr: *const Y) -> Self {
        match unsafe { ptr.as_ref() } {
            Some(object) => Self::dynamic_cast_ref(object),
            None => Self::null(),
        }
    }
}

/// Converts a handle to a handle of a supertype, such as a trait object the
/// target implements. The conversion is an implicit unsizing coercion, so
/// only genuine upcasts compile.
///
/// ```
/// use intrusive::{impl_ref_counted, shared_ptr_upcast, RefCounted, Shared, SharedPtr};
///
/// trait Shape: RefCounted {
///     fn area(&self) -> f64;
/// }
///
/// struct Square {
///     header: Shared,
///     side: f64,
/// }
/// impl_ref_counted!(Square, header);
/// impl Shape for Square {
///     fn area(&self) -> f64 {
///         self.side * self.side
///     }
/// }
///
/// let square = SharedPtr::new(Square { header: Shared::new(), side: 2.0 });
/// let shape = shared_ptr_upcast!(square.clone() => dyn Shape);
/// assert_eq!(shape.area(), 4.0);
/// assert_eq!(square.ref_count(), 2);
/// ```
#[macro_export]
macro_rules! shared_ptr_upcast {
    ($handle:expr => $target:ty) => {{
        let coerced: ::core::option::Option<::core::ptr::NonNull<$target>> =
            match $crate::SharedPtr::into_raw($handle) {
                ::core::option::Option::Some(ptr) => {
                    let ptr: ::core::ptr::NonNull<$target> = ptr;
                    ::core::option::Option::Some(ptr)
                }
                ::core::option::Option::None => ::core::option::Option::None,
            };
        unsafe { $crate::SharedPtr::<$target>::from_raw_owned(coerced) }
    }};
}

impl<T: ?Sized + RefCounted> Drop for SharedPtr<T> {
    fn drop(&mut self) {
        if let Some(ptr) = self.ptr.take() {
            unsafe { release(ptr) };
        }
    }
}

impl<T: ?Sized + RefCounted> Clone for SharedPtr<T> {
    #[track_caller]
    fn clone(&self) -> Self {
        if let Some(object) = self.get() {
            object.inc_ref();
        }
        Self {
            ptr: self.ptr,
            _marker: PhantomData,
        }
    }

    #[track_caller]
    fn clone_from(&mut self, source: &Self) {
        self.assign(source);
    }
}

impl<T: ?Sized + RefCounted> Default for SharedPtr<T> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T: ?Sized + RefCounted> Deref for SharedPtr<T> {
    type Target = T;

    #[track_caller]
    fn deref(&self) -> &T {
        match self.ptr {
            Some(ptr) => unsafe { ptr.as_ref() },
            None => Error::null_access().raise(),
        }
    }
}

impl<T: ?Sized + RefCounted> From<Box<T>> for SharedPtr<T> {
    fn from(boxed: Box<T>) -> Self {
        Self::from_box(boxed)
    }
}

impl<T: RefCounted> From<T> for SharedPtr<T> {
    fn from(value: T) -> Self {
        Self::new(value)
    }
}

impl<T: ?Sized + RefCounted + Serialize> Serialize for SharedPtr<T> {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.get().serialize(serializer)
    }
}

impl<'de, T> Deserialize<'de> for SharedPtr<T>
where
    T: Deserialize<'de> + RefCounted,
{
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<T>::deserialize(deserializer).map(|value| value.map_or_else(Self::null, Self::new))
    }
}

#[cfg(test)]
mod tests {
    use std::cmp::Ordering as CmpOrdering;
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};
    use std::panic::{catch_unwind, AssertUnwindSafe};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use intrusive_macros::stress_test;
    use rand::Rng;
    use serde::{Deserialize, Serialize};

    use super::SharedPtr;
    use crate::counter::{DefaultCounter, MutexCounter, RefCounter};
    use crate::error::Error;
    use crate::shared::{AsAny, RefCountBase, RefCounted, Shared, SimpleShared};
    use crate::{impl_ref_counted, shared_ptr_upcast};

    struct Tracked<C: RefCounter = DefaultCounter> {
        header: RefCountBase<C>,
        value: usize,
        drops: Arc<AtomicUsize>,
    }
    impl_ref_counted!(impl[C: RefCounter] Tracked<C>, header);

    impl<C: RefCounter> Drop for Tracked<C> {
        fn drop(&mut self) {
            let previous = self.drops.fetch_add(1, Ordering::SeqCst);
            assert_eq!(previous, 0, "object destroyed twice");
        }
    }

    fn tracked_on<C: RefCounter>(value: usize) -> (SharedPtr<Tracked<C>>, Arc<AtomicUsize>) {
        let drops = Arc::new(AtomicUsize::new(0));
        let ptr = SharedPtr::new(Tracked {
            header: RefCountBase::new(),
            value,
            drops: drops.clone(),
        });
        (ptr, drops)
    }

    fn tracked(value: usize) -> (SharedPtr<Tracked>, Arc<AtomicUsize>) {
        tracked_on(value)
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct Label {
        #[serde(skip)]
        header: Shared,
        name: String,
    }
    impl_ref_counted!(Label, header);

    // Labels compare by name only; the header never takes part.
    impl PartialEq for Label {
        fn eq(&self, other: &Self) -> bool {
            self.name == other.name
        }
    }
    impl Eq for Label {}
    impl PartialOrd for Label {
        fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
            Some(self.cmp(other))
        }
    }
    impl Ord for Label {
        fn cmp(&self, other: &Self) -> CmpOrdering {
            self.name.cmp(&other.name)
        }
    }
    impl Hash for Label {
        fn hash<H: Hasher>(&self, state: &mut H) {
            self.name.hash(state)
        }
    }

    fn label(name: &str) -> SharedPtr<Label> {
        SharedPtr::new(Label {
            header: Shared::new(),
            name: name.to_string(),
        })
    }

    fn hash_of<T: Hash>(value: &T) -> u64 {
        let mut hasher = DefaultHasher::new();
        value.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn test_scenario() {
        let drops = Arc::new(AtomicUsize::new(0));
        let object = Box::new(Tracked {
            header: Shared::new(),
            value: 7,
            drops: drops.clone(),
        });
        assert_eq!(object.get_ref(), 0);

        let a = SharedPtr::from_box(object);
        assert_eq!(a.ref_count(), 1);
        let mut b = a.clone();
        assert_eq!(b.ref_count(), 2);
        drop(a);
        assert_eq!(b.ref_count(), 1);
        assert_eq!(b.value, 7);

        b.reset();
        assert!(b.is_null());
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_balance_under_random_operations() {
        let mut rng = rand::rng();
        for _ in 0..20 {
            // `anchor` is never touched, so the object outlives the shuffling.
            let (anchor, drops) = tracked(1);
            let mut handles: Vec<SharedPtr<Tracked>> = vec![anchor.clone()];
            for _ in 0..200 {
                match rng.random_range(0..5) {
                    0 => {
                        let i = rng.random_range(0..handles.len());
                        let copy = handles[i].clone();
                        handles.push(copy);
                    }
                    1 if handles.len() > 1 => {
                        let i = rng.random_range(0..handles.len());
                        handles.swap_remove(i);
                    }
                    2 => {
                        let i = rng.random_range(0..handles.len());
                        let j = rng.random_range(0..handles.len());
                        let source = handles[j].clone();
                        handles[i].assign(&source);
                    }
                    3 => {
                        let i = rng.random_range(0..handles.len());
                        let j = rng.random_range(0..handles.len());
                        let source = handles[j].clone();
                        handles[i].clone_from(&source);
                    }
                    _ => handles.push(SharedPtr::null()),
                }
                let live = handles.iter().filter(|h| h.is_some()).count() as i32;
                assert_eq!(anchor.ref_count(), live + 1);
            }
            handles.clear();
            assert_eq!(anchor.ref_count(), 1);
            assert_eq!(drops.load(Ordering::SeqCst), 0);
            drop(anchor);
            assert_eq!(drops.load(Ordering::SeqCst), 1);
        }
    }

    #[test]
    fn test_assignment_between_objects() {
        let (mut a, a_drops) = tracked(1);
        let (b, b_drops) = tracked(2);

        a.assign(&b);
        assert_eq!(a_drops.load(Ordering::SeqCst), 1);
        assert_eq!(b.ref_count(), 2);
        assert_eq!(a.value, 2);
        assert!(SharedPtr::ptr_eq(&a, &b));

        drop(b);
        assert_eq!(a.ref_count(), 1);
        drop(a);
        assert_eq!(b_drops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_self_assignment() {
        let (mut a, drops) = tracked(1);
        let same = a.clone();
        a.assign(&same);
        assert_eq!(a.ref_count(), 2);
        drop(same);

        // Sole owner reassigned to its own target must not free it.
        let raw = a.as_ptr().unwrap().as_ptr();
        unsafe { a.assign_raw(raw) };
        assert_eq!(a.ref_count(), 1);
        assert_eq!(drops.load(Ordering::SeqCst), 0);
        assert_eq!(a.value, 1);
    }

    #[test]
    fn test_null_handle() {
        let mut null: SharedPtr<Tracked> = SharedPtr::default();
        assert!(null.is_null());
        assert!(null.get().is_none());
        assert_eq!(null.ref_count(), 0);

        let line = line!() + 1;
        let err = null.try_deref().err().unwrap();
        assert_eq!(err.location().unwrap().line, line);

        let payload = catch_unwind(AssertUnwindSafe(|| null.value)).unwrap_err();
        match payload.downcast_ref::<Error>() {
            Some(Error::NullAccess { location }) => {
                assert!(location.file.ends_with("shared_ptr.rs"));
            }
            other => panic!("unexpected payload {:?}", other),
        }

        let (a, drops) = tracked(3);
        null.assign(&a);
        assert_eq!(null.value, 3);
        null.assign(&SharedPtr::null());
        assert!(null.is_null());
        assert_eq!(a.ref_count(), 1);
        drop(a);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_take_and_swap() {
        let (mut a, _) = tracked(1);
        let (mut b, _) = tracked(2);
        a.swap(&mut b);
        assert_eq!((a.value, b.value), (2, 1));
        assert_eq!(a.ref_count(), 1);

        let taken = a.take();
        assert!(a.is_null());
        assert_eq!(taken.value, 2);
        assert_eq!(taken.ref_count(), 1);
    }

    #[test]
    fn test_raw_round_trip() {
        let (a, drops) = tracked(5);
        let raw = a.clone().into_raw();
        assert_eq!(a.ref_count(), 2);
        let adopted = unsafe { SharedPtr::from_raw_owned(raw) };
        assert_eq!(adopted.ref_count(), 2);

        let borrowed = unsafe { SharedPtr::from_raw(a.as_ptr().unwrap().as_ptr()) };
        assert_eq!(a.ref_count(), 3);
        drop((a, adopted, borrowed));
        assert_eq!(drops.load(Ordering::SeqCst), 1);

        let null: SharedPtr<Tracked> = unsafe { SharedPtr::from_raw(std::ptr::null()) };
        assert!(null.is_null());
    }

    #[test]
    fn test_no_delete_objects() {
        let drops = Arc::new(AtomicUsize::new(0));
        let on_stack = Tracked {
            header: Shared::new(),
            value: 9,
            drops: drops.clone(),
        };
        unsafe { on_stack.set_no_delete(true) };
        {
            let a = unsafe { SharedPtr::from_raw(&on_stack as *const Tracked) };
            let b = a.clone();
            assert_eq!(b.ref_count(), 2);
        }
        assert_eq!(on_stack.get_ref(), 0);
        assert_eq!(drops.load(Ordering::SeqCst), 0);

        let leaked: &'static Tracked = Box::leak(Box::new(Tracked {
            header: Shared::new(),
            value: 10,
            drops: drops.clone(),
        }));
        drop(SharedPtr::from_static(leaked));
        assert!(leaked.is_no_delete());
        assert_eq!(leaked.get_ref(), 0);
        assert_eq!(drops.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_static_object_outlives_every_handle() {
        let drops = Arc::new(AtomicUsize::new(0));
        let leaked: &'static Tracked = Box::leak(Box::new(Tracked {
            header: Shared::new(),
            value: 11,
            drops: drops.clone(),
        }));

        let mut a = SharedPtr::from_static(leaked);
        let mut b = a.clone();
        let (mut other, other_drops) = tracked(12);
        other.assign(&a);
        assert_eq!(other_drops.load(Ordering::SeqCst), 1);
        b.swap(&mut other);
        let taken = b.take();
        a.reset();
        drop((a, b, other, taken));

        // No sequence of handle operations frees static storage.
        assert_eq!(leaked.get_ref(), 0);
        assert!(leaked.is_no_delete());
        assert_eq!(drops.load(Ordering::SeqCst), 0);
        assert_eq!(leaked.value, 11);

        let again = SharedPtr::from_static(leaked);
        assert_eq!(again.ref_count(), 1);
    }

    #[test]
    fn test_single_threaded_objects() {
        struct Local {
            header: SimpleShared,
            value: u8,
        }
        impl_ref_counted!(Local, header);

        let a = SharedPtr::new(Local {
            header: SimpleShared::new(),
            value: 4,
        });
        let b = a.clone();
        assert_eq!(b.ref_count(), 2);
        assert_eq!(b.value, 4);
    }

    #[test]
    fn test_derived_traits() {
        let ptr1 = label("a");
        let ptr2 = label("a");
        let ptr3 = label("b");
        let null: SharedPtr<Label> = SharedPtr::null();

        assert!(ptr1 == ptr2);
        assert!(!SharedPtr::ptr_eq(&ptr1, &ptr2));
        assert!(ptr1 != ptr3);
        assert!(ptr1 != null);
        assert!(null == SharedPtr::<Label>::null());

        assert!(ptr1 < ptr3);
        assert!(null < ptr1);
        assert!(ptr3 > null);
        assert_eq!(ptr1.cmp(&ptr2), CmpOrdering::Equal);
        assert_eq!(null.cmp(&SharedPtr::null()), CmpOrdering::Equal);

        assert_eq!(hash_of(&ptr1), hash_of(&ptr2));
        assert_ne!(hash_of(&ptr1), hash_of(&ptr3));

        assert!(ptr1 == *ptr2);
        assert!(ptr1 == &*ptr2);
        assert!(null != *ptr1);

        assert_eq!(format!("{:?}", null), "null");
        assert!(format!("{:?}", ptr1).contains("name: \"a\""));
    }

    struct Tag {
        header: Shared,
        name: &'static str,
    }
    impl_ref_counted!(Tag, header);

    impl PartialEq<Tag> for Label {
        fn eq(&self, other: &Tag) -> bool {
            self.name == other.name
        }
    }
    impl PartialOrd<Tag> for Label {
        fn partial_cmp(&self, other: &Tag) -> Option<CmpOrdering> {
            Some(self.name.as_str().cmp(other.name))
        }
    }

    #[test]
    fn test_comparison_across_pointee_types() {
        let tag = |name| {
            SharedPtr::new(Tag {
                header: Shared::new(),
                name,
            })
        };
        let no_label: SharedPtr<Label> = SharedPtr::null();
        let no_tag: SharedPtr<Tag> = SharedPtr::null();

        assert!(label("a") == tag("a"));
        assert!(label("a") != tag("b"));
        assert!(label("a") < tag("b"));
        assert!(label("c") > tag("b"));
        assert!(no_label == no_tag);
        assert!(no_label != tag("a"));
        assert!(no_label < tag("a"));
        assert!(label("a") > no_tag);
    }

    #[test]
    fn test_serde() {
        let ptr = label("serialized");
        let json = serde_json::to_string(&ptr).unwrap();
        assert_eq!(json, r#"{"name":"serialized"}"#);
        let back: SharedPtr<Label> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ptr);
        assert_eq!(back.ref_count(), 1);

        let null: SharedPtr<Label> = SharedPtr::null();
        assert_eq!(serde_json::to_string(&null).unwrap(), "null");
        let back: SharedPtr<Label> = serde_json::from_str("null").unwrap();
        assert!(back.is_null());
    }

    trait Shape: RefCounted + AsAny {
        fn sides(&self) -> usize;
    }

    struct Square {
        header: Shared,
        drops: Arc<AtomicUsize>,
    }
    impl_ref_counted!(Square, header);
    impl Shape for Square {
        fn sides(&self) -> usize {
            4
        }
    }
    impl Drop for Square {
        fn drop(&mut self) {
            self.drops.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Triangle {
        header: Shared,
    }
    impl_ref_counted!(Triangle, header);
    impl Shape for Triangle {
        fn sides(&self) -> usize {
            3
        }
    }

    #[test]
    fn test_trait_objects() {
        let drops = Arc::new(AtomicUsize::new(0));
        let square = SharedPtr::new(Square {
            header: Shared::new(),
            drops: drops.clone(),
        });
        let shape: SharedPtr<dyn Shape> = shared_ptr_upcast!(square.clone() => dyn Shape);
        assert_eq!(shape.sides(), 4);
        assert_eq!(square.ref_count(), 2);
        drop(square);

        // Freed through the trait object's vtable.
        assert_eq!(shape.ref_count(), 1);
        drop(shape);
        assert_eq!(drops.load(Ordering::SeqCst), 1);

        let boxed: Box<dyn Shape> = Box::new(Triangle {
            header: Shared::new(),
        });
        let shape = SharedPtr::from_box(boxed);
        assert_eq!(shape.sides(), 3);
    }

    #[test]
    fn test_dynamic_cast() {
        let drops = Arc::new(AtomicUsize::new(0));
        let boxed: Box<dyn Shape> = Box::new(Square {
            header: Shared::new(),
            drops: drops.clone(),
        });
        let shape = SharedPtr::from_box(boxed);

        let square: SharedPtr<Square> = shape.dynamic_cast();
        assert!(square.is_some());
        assert_eq!(shape.ref_count(), 2);
        assert!(std::ptr::addr_eq(
            square.as_ptr().unwrap().as_ptr(),
            shape.as_ptr().unwrap().as_ptr()
        ));

        let triangle: SharedPtr<Triangle> = shape.dynamic_cast();
        assert!(triangle.is_null());
        assert_eq!(shape.ref_count(), 2);

        let raw = shape.as_ptr().unwrap().as_ptr() as *const dyn Shape;
        let again = unsafe { SharedPtr::<Square>::dynamic_cast_raw(raw) };
        assert_eq!(again.ref_count(), 3);

        let null: SharedPtr<dyn Shape> = SharedPtr::null();
        assert!(null.dynamic_cast::<Square>().is_null());

        drop((shape, again));
        assert_eq!(drops.load(Ordering::SeqCst), 0);
        drop(square);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    fn concurrent_clone_and_drop<C: RefCounter + Send + Sync + 'static>() {
        let (shared, drops) = tracked_on::<C>(0);

        let mut handles = Vec::new();
        for thread_id in 0..4 {
            let local = shared.clone();
            handles.push(crate::sync::thread::spawn(move || {
                let mut kept = Vec::new();
                for i in 0..20 {
                    let copy = local.clone();
                    let mut other: SharedPtr<Tracked<C>> = SharedPtr::null();
                    other.assign(&copy);
                    if (i + thread_id) % 5 == 0 {
                        kept.push(other);
                    }
                }
                kept
            }));
        }

        let mut survivors = Vec::new();
        for handle in handles {
            survivors.extend(handle.join().unwrap());
        }
        assert_eq!(shared.ref_count() as usize, survivors.len() + 1);

        drop(survivors);
        assert_eq!(shared.ref_count(), 1);
        assert_eq!(drops.load(Ordering::SeqCst), 0);
        drop(shared);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    fn concurrent_last_release<C: RefCounter + Send + Sync + 'static>() {
        let (shared, drops) = tracked_on::<C>(0);

        // Every thread races to drop what may be the last reference.
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let local = shared.clone();
                crate::sync::thread::spawn(move || drop(local))
            })
            .collect();
        drop(shared);
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[stress_test]
    fn test_concurrent_clone_and_drop() {
        concurrent_clone_and_drop::<DefaultCounter>();
    }

    #[stress_test]
    fn test_concurrent_last_release() {
        concurrent_last_release::<DefaultCounter>();
    }

    #[stress_test]
    fn test_concurrent_clone_and_drop_mutex_backed() {
        concurrent_clone_and_drop::<MutexCounter>();
    }

    #[stress_test]
    fn test_concurrent_last_release_mutex_backed() {
        concurrent_last_release::<MutexCounter>();
    }

    // rayon's threads contend on the spin lock outside any shuttle execution.
    #[cfg(not(all(feature = "shuttle", feature = "mutex-counter")))]
    #[test]
    fn test_parallel_clone_storm() {
        use rayon::prelude::*;

        let (shared, drops) = tracked(0);
        let copies: Vec<SharedPtr<Tracked>> = (0..10_000)
            .into_par_iter()
            .map(|_| shared.clone())
            .collect();
        assert_eq!(shared.ref_count(), 10_001);

        copies.into_par_iter().for_each(drop);
        assert_eq!(shared.ref_count(), 1);
        drop(shared);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }
}
