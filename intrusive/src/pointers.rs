mod common;
mod shared_ptr;
mod shared_ref;

pub use shared_ptr::SharedPtr;
pub use shared_ref::SharedRef;
