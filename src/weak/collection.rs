//! Identity-keyed bag of weak handles.

use super::WeakHandle;
use crate::types::ObjectId;
use core::fmt;
use parking_lot::RwLock;
use std::sync::Arc;

/// An unordered bag of weakly held objects with identity-based membership.
///
/// Membership is decided by allocation identity ([`ObjectId`]), never by value
/// equality: two distinct instances with equal contents are two entries.
///
/// Slots whose referent has been dropped stay in place until they are reused
/// by a later insert or removed by [`compact`](Self::compact); they are never
/// counted by [`len`](Self::len) or returned by [`to_vec`](Self::to_vec).
///
/// All methods take `&self`. Slots live behind a read/write lock, so readers
/// always see a consistent point-in-time view even while another thread
/// inserts or compacts.
pub struct WeakCollection<T: ?Sized> {
    slots: RwLock<Vec<WeakHandle<T>>>,
}

impl<T: ?Sized> WeakCollection<T> {
    /// Creates an empty collection.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: RwLock::new(Vec::new()),
        }
    }

    /// Builds a collection from strong references, skipping duplicates.
    #[must_use]
    pub fn from_objects<'a, I>(objects: I) -> Self
    where
        I: IntoIterator<Item = &'a Arc<T>>,
        T: 'a,
    {
        let collection = Self::new();
        for object in objects {
            collection.insert(object);
        }
        collection
    }

    /// Inserts `object` unless it is already a live member.
    ///
    /// Returns true if the object was added.
    pub fn insert(&self, object: &Arc<T>) -> bool {
        self.insert_with(object, false)
    }

    /// Inserts `object`, optionally allowing the same identity twice.
    ///
    /// Passing `allow_duplicates = true` skips the membership scan.
    pub fn insert_with(&self, object: &Arc<T>, allow_duplicates: bool) -> bool {
        self.insert_handle(WeakHandle::wrap(object), allow_duplicates)
    }

    /// Inserts an existing handle.
    ///
    /// Dead handles are rejected. The first dead slot is reused when there is
    /// one; otherwise the handle is appended.
    pub fn insert_handle(&self, handle: WeakHandle<T>, allow_duplicates: bool) -> bool {
        if handle.is_gone() {
            return false;
        }
        let mut slots = self.slots.write();
        if !allow_duplicates
            && slots
                .iter()
                .any(|slot| slot.id() == handle.id() && slot.is_alive())
        {
            return false;
        }
        if let Some(vacant) = slots.iter_mut().find(|slot| slot.is_gone()) {
            *vacant = handle;
        } else {
            slots.push(handle);
        }
        true
    }

    /// Removes every slot holding `object`.
    ///
    /// Returns true if anything was removed.
    pub fn remove(&self, object: &Arc<T>) -> bool {
        let id = ObjectId::of(object);
        let mut slots = self.slots.write();
        let before = slots.len();
        slots.retain(|slot| slot.id() != id);
        slots.len() != before
    }

    /// Returns true if `object` is a live member.
    #[must_use]
    pub fn contains(&self, object: &Arc<T>) -> bool {
        self.slots.read().iter().any(|slot| slot.contains(object))
    }

    /// Adds the live members of `other` that are not already present.
    pub fn union(&self, other: &Self) {
        if std::ptr::eq(self, other) {
            return;
        }
        for handle in other.handles() {
            self.insert_handle(handle, false);
        }
    }

    /// Drops the slots whose referent is gone and returns how many were removed.
    ///
    /// Live slots keep their relative order. Calling this twice with no deaths
    /// in between removes nothing the second time.
    pub fn compact(&self) -> usize {
        let mut slots = self.slots.write();
        let before = slots.len();
        slots.retain(WeakHandle::is_alive);
        before - slots.len()
    }

    /// Returns strong references to every live member, in slot order.
    ///
    /// The strong references are the caller's; drop the vector as soon as the
    /// snapshot has been used so it does not itself hold objects alive.
    #[must_use]
    pub fn to_vec(&self) -> Vec<Arc<T>> {
        self.slots.read().iter().filter_map(WeakHandle::get).collect()
    }

    /// Returns clones of the live handles, in slot order.
    #[must_use]
    pub fn handles(&self) -> Vec<WeakHandle<T>> {
        self.slots
            .read()
            .iter()
            .filter(|slot| slot.is_alive())
            .cloned()
            .collect()
    }

    /// Returns the labels of the live members, in slot order.
    #[must_use]
    pub fn labels(&self) -> Vec<String> {
        self.slots
            .read()
            .iter()
            .filter(|slot| slot.is_alive())
            .map(|slot| slot.label().to_owned())
            .collect()
    }

    /// Number of live members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.read().iter().filter(|slot| slot.is_alive()).count()
    }

    /// Returns true if no member is alive.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.slots.read().iter().any(WeakHandle::is_alive)
    }

    /// Number of slots, dead ones included.
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.slots.read().len()
    }

    /// Removes every slot.
    pub fn clear(&self) {
        self.slots.write().clear();
    }
}

impl<T: ?Sized> Default for WeakCollection<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> Clone for WeakCollection<T> {
    /// Copies the current slots; later changes to either copy are independent.
    fn clone(&self) -> Self {
        Self {
            slots: RwLock::new(self.slots.read().clone()),
        }
    }
}

impl<T: ?Sized> FromIterator<Arc<T>> for WeakCollection<T> {
    fn from_iter<I: IntoIterator<Item = Arc<T>>>(iter: I) -> Self {
        let collection = Self::new();
        for object in iter {
            collection.insert(&object);
        }
        collection
    }
}

impl<T: ?Sized> fmt::Debug for WeakCollection<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slots = self.slots.read();
        f.debug_struct("WeakCollection")
            .field("live", &slots.iter().filter(|s| s.is_alive()).count())
            .field("slots", &slots.len())
            .finish()
    }
}

impl<T: ?Sized> fmt::Display for WeakCollection<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        let mut spacer = "";
        for slot in self.slots.read().iter().filter(|slot| slot.is_alive()) {
            write!(f, "{spacer}{}", slot.label())?;
            spacer = ", ";
        }
        f.write_str("]")
    }
}
