//! Entities and shared entity handles.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Registry-assigned identifier. Allocation starts at 0 and never reuses ids.
pub type EntityId = u64;

/// An object managed by a [`Registry`](crate::registry::Registry).
pub trait Entity: Clone + Send + Sync + 'static {
    /// Identifier accessor used for file names and relation persistence.
    fn id(&self) -> EntityId;

    /// A fresh entity carrying only its id; creation transactions fill in the
    /// remaining fields through chained operations.
    fn blank(id: EntityId) -> Self;
}

/// A live, shared entity.
///
/// Equality and hashing are by identity: two handles are equal only if they
/// point at the same in-memory object. This makes `Shared<T>` usable as a key
/// in an association set even while its fields are being edited.
pub struct Shared<T>(Arc<RwLock<T>>);

impl<T> Shared<T> {
    pub fn new(value: T) -> Self {
        Self(Arc::new(RwLock::new(value)))
    }

    /// Lock the entity for reading.
    pub fn read(&self) -> RwLockReadGuard<'_, T> {
        self.0.read()
    }

    /// Lock the entity for writing.
    pub fn write(&self) -> RwLockWriteGuard<'_, T> {
        self.0.write()
    }

    /// Check if both handles point at the same object.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl<T: Clone> Shared<T> {
    /// Copy of the current field values.
    pub fn snapshot(&self) -> T {
        self.0.read().clone()
    }
}

impl<T: Entity> Shared<T> {
    pub fn id(&self) -> EntityId {
        self.0.read().id()
    }
}

impl<T> Clone for Shared<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> PartialEq for Shared<T> {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl<T> Eq for Shared<T> {}

impl<T> Hash for Shared<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::ptr::hash(Arc::as_ptr(&self.0), state);
    }
}

impl<T: fmt::Debug> fmt::Debug for Shared<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_read() {
            Some(guard) => guard.fmt(f),
            None => f.write_str("Shared(<locked>)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Tag {
        id: EntityId,
        label: String,
    }

    impl Entity for Tag {
        fn id(&self) -> EntityId {
            self.id
        }

        fn blank(id: EntityId) -> Self {
            Self { id, label: String::new() }
        }
    }

    #[test]
    fn test_identity_equality() {
        let a = Shared::new(Tag::blank(1));
        let b = Shared::new(Tag::blank(1));
        let a2 = a.clone();

        assert_eq!(a, a2);
        assert_ne!(a, b);
        assert_eq!(a.snapshot(), b.snapshot());
    }

    #[test]
    fn test_hash_survives_mutation() {
        let a = Shared::new(Tag::blank(7));
        let mut set = HashSet::new();
        set.insert(a.clone());

        a.write().label = "renamed".into();
        assert!(set.contains(&a));
        assert_eq!(a.id(), 7);
    }
}
