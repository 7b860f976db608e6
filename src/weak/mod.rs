//! Weak references with stable identity.
//!
//! [`WeakHandle`] observes a single object without keeping it alive;
//! [`WeakCollection`] is an identity-keyed bag of such handles.

pub mod collection;
pub mod handle;

pub use collection::WeakCollection;
pub use handle::WeakHandle;
