//! Intrusive reference counting.
//!
//! Objects carry their own count in an embedded header ([`Shared`],
//! [`MutexShared`] or [`SimpleShared`]) and are owned through [`SharedPtr`]
//! handles. A fresh object has a count of zero; each live non-null handle
//! adds exactly one, and the handle that takes the count back to zero frees
//! the object. Objects that live in static or stack storage are marked
//! no-delete and are never freed by their handles.
//!
//! ```
//! use intrusive::{impl_ref_counted, Shared, SharedPtr};
//!
//! struct Connection {
//!     header: Shared,
//!     peer: String,
//! }
//! impl_ref_counted!(Connection, header);
//!
//! let a = SharedPtr::new(Connection { header: Shared::new(), peer: "10.0.0.1".into() });
//! let b = a.clone();
//! assert_eq!(b.ref_count(), 2);
//! drop(a);
//! assert_eq!(b.peer, "10.0.0.1");
//! ```
//!
//! The counting backend is chosen per type: [`Shared`] uses native atomics
//! (or the mutex-guarded fallback with the `mutex-counter` feature),
//! [`MutexShared`] always uses the mutex, and [`SimpleShared`] is an
//! unsynchronized counter that keeps its objects on one thread.
//!
//! Misuse is reported through [`Error`]. Operations that cannot return it
//! (dereferencing a null handle, dropping a handle whose count is corrupt)
//! panic with the error as payload, or abort the process if the installed
//! [`Config`] asks for it.

#[macro_use]
mod debug;

pub mod config;
mod counter;
mod error;
mod pointers;
mod shared;
pub mod sync;
pub use config::Config;
pub use counter::{AtomicCounter, DefaultCounter, LocalCounter, MutexCounter, RefCounter};
pub use error::{Disposition, Error, Location, Result};
pub use pointers::{SharedPtr, SharedRef};
pub use shared::{
    release, AsAny, MutexShared, RefCountBase, RefCounted, Released, Shared, SimpleShared,
};
