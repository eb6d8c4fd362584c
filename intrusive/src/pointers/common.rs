/// Implements common traits for handle types.
///
/// The handle must provide `get(&self) -> Option<&T>`; everything here is
/// defined in terms of it, so a null handle behaves like `None`.
///
/// Implemented traits:
/// - `Debug` - Debug formatting of the pointee, or `null`
/// - `Display` - Display formatting of the pointee, or `null` (when T: Display)
/// - `Hash` - Hashes the pointee (when T: Hash)
/// - `PartialEq<T>` - Compares the pointee with T; a null handle is never equal
/// - `PartialEq<&T>` - Compares the pointee with &T
/// - `PartialEq<Handle<U>>` - Compares two handles by their pointees (when T: PartialEq<U>);
///   two nulls are equal
/// - `Eq` - Marker trait for equality (when T: Eq)
/// - `PartialOrd<Handle<U>>` - Orders by pointee, null before any value (when T: PartialOrd<U>)
/// - `Ord` - Total ordering, null first (when T: Ord)
macro_rules! impl_handle_traits {
    ([$($lt:lifetime)?] $handle:ident) => {
        impl<$($lt,)? T: ?Sized + RefCounted + fmt::Debug> fmt::Debug for $handle<$($lt,)? T> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match self.get() {
                    Some(value) => fmt::Debug::fmt(value, f),
                    None => f.write_str("null"),
                }
            }
        }

        impl<$($lt,)? T: ?Sized + RefCounted + fmt::Display> fmt::Display for $handle<$($lt,)? T> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match self.get() {
                    Some(value) => fmt::Display::fmt(value, f),
                    None => f.write_str("null"),
                }
            }
        }

        impl<$($lt,)? T: ?Sized + RefCounted + Hash> Hash for $handle<$($lt,)? T> {
            fn hash<H: Hasher>(&self, state: &mut H) {
                self.get().hash(state)
            }
        }

        impl<$($lt,)? T: ?Sized + RefCounted + PartialEq> PartialEq<T> for $handle<$($lt,)? T> {
            fn eq(&self, other: &T) -> bool {
                self.get().is_some_and(|value| value == other)
            }
        }

        impl<$($lt,)? T: ?Sized + RefCounted + PartialEq> PartialEq<&T> for $handle<$($lt,)? T> {
            fn eq(&self, other: &&T) -> bool {
                self.get().is_some_and(|value| value == *other)
            }
        }

        impl<$($lt,)? T, U> PartialEq<$handle<$($lt,)? U>> for $handle<$($lt,)? T>
        where
            T: ?Sized + RefCounted + PartialEq<U>,
            U: ?Sized + RefCounted,
        {
            fn eq(&self, other: &$handle<$($lt,)? U>) -> bool {
                match (self.get(), other.get()) {
                    (Some(value), Some(other)) => value == other,
                    (None, None) => true,
                    _ => false,
                }
            }
        }

        impl<$($lt,)? T: ?Sized + RefCounted + Eq> Eq for $handle<$($lt,)? T> {}

        impl<$($lt,)? T, U> PartialOrd<$handle<$($lt,)? U>> for $handle<$($lt,)? T>
        where
            T: ?Sized + RefCounted + PartialOrd<U>,
            U: ?Sized + RefCounted,
        {
            fn partial_cmp(&self, other: &$handle<$($lt,)? U>) -> Option<CmpOrdering> {
                match (self.get(), other.get()) {
                    (Some(value), Some(other)) => value.partial_cmp(other),
                    (None, None) => Some(CmpOrdering::Equal),
                    (None, Some(_)) => Some(CmpOrdering::Less),
                    (Some(_), None) => Some(CmpOrdering::Greater),
                }
            }
        }

        impl<$($lt,)? T: ?Sized + RefCounted + Ord> Ord for $handle<$($lt,)? T> {
            fn cmp(&self, other: &Self) -> CmpOrdering {
                self.get().cmp(&other.get())
            }
        }
    };
}

pub(crate) use impl_handle_traits;
