//! Non-owning handle to a tracked object.

use crate::types::ObjectId;
use core::fmt;
use std::any::{Any, type_name};
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Weak};

/// A weak reference to an `Arc`-managed object, carrying its identity.
///
/// Holding a `WeakHandle` never keeps the referent alive. The handle is bound
/// to one allocation for its whole life; it becomes empty as soon as the last
/// strong reference is dropped and is never re-targeted.
///
/// # Example
///
/// ```
/// use leakwatch::weak::WeakHandle;
/// use std::sync::Arc;
///
/// let object = Arc::new(5_u32);
/// let handle = WeakHandle::wrap(&object);
/// assert!(handle.contains(&object));
///
/// drop(object);
/// assert!(handle.get().is_none());
/// ```
pub struct WeakHandle<T: ?Sized> {
    weak: Weak<T>,
    id: ObjectId,
    label: Arc<str>,
}

impl<T: ?Sized> WeakHandle<T> {
    /// Wraps `object` without affecting its lifetime.
    #[must_use]
    pub fn wrap(object: &Arc<T>) -> Self {
        let id = ObjectId::of(object);
        Self {
            weak: Arc::downgrade(object),
            id,
            label: format!("<{}: {id}>", type_name::<T>()).into(),
        }
    }

    /// Returns the referent if it is still alive.
    ///
    /// The result is a fresh snapshot on every call. The returned `Arc` is a
    /// real strong reference, so drop it promptly when checking for leaks.
    #[must_use]
    pub fn get(&self) -> Option<Arc<T>> {
        self.weak.upgrade()
    }

    /// Returns true while at least one strong reference exists.
    ///
    /// Unlike [`get`](Self::get), this never creates a strong reference.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.weak.strong_count() > 0
    }

    /// Returns true once the referent has been dropped.
    #[must_use]
    pub fn is_gone(&self) -> bool {
        !self.is_alive()
    }

    /// Identity check: true if `object` is this handle's live referent.
    #[must_use]
    pub fn contains(&self, object: &Arc<T>) -> bool {
        self.is_alive() && ObjectId::of(object) == self.id
    }

    /// Returns the identity of the tracked allocation.
    #[must_use]
    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// Returns the diagnostic label, `<type: address>`.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Converts the inner `Weak`, typically an unsizing cast, keeping identity
    /// and label.
    pub(crate) fn map_weak<U: ?Sized>(self, f: impl FnOnce(Weak<T>) -> Weak<U>) -> WeakHandle<U> {
        WeakHandle {
            weak: f(self.weak),
            id: self.id,
            label: self.label,
        }
    }
}

impl<T: Any + Send + Sync> WeakHandle<T> {
    /// Erases the referent type so heterogeneous handles can share a collection.
    ///
    /// Identity and label are preserved.
    #[must_use]
    pub fn erase(self) -> WeakHandle<dyn Any + Send + Sync> {
        self.map_weak(|weak| weak as Weak<dyn Any + Send + Sync>)
    }
}

impl<T: ?Sized> Clone for WeakHandle<T> {
    fn clone(&self) -> Self {
        Self {
            weak: Weak::clone(&self.weak),
            id: self.id,
            label: Arc::clone(&self.label),
        }
    }
}

impl<T: ?Sized> PartialEq for WeakHandle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T: ?Sized> Eq for WeakHandle<T> {}

impl<T: ?Sized> Hash for WeakHandle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl<T: ?Sized> fmt::Debug for WeakHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakHandle")
            .field("id", &self.id)
            .field("alive", &self.is_alive())
            .finish()
    }
}

impl<T: ?Sized> fmt::Display for WeakHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_alive() {
            f.write_str(&self.label)
        } else {
            write!(f, "<released {}>", type_name::<T>())
        }
    }
}
