//! The object registry.
//!
//! A registry owns the ordered in-memory list of one entity type, its id
//! allocator and the hooks that persist entities through the store. Entries are
//! only ever created, updated and removed through the reversible transactions
//! built here.

use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};

use crate::registry::entity::{Entity, EntityId, Shared};
use crate::store::{NamedObjectStore, StorageResult, StoreGroup};
use crate::transaction::{operation, FnOperation, Operation, ReversibleTransaction, TransactionError, TransactionResult};

/// Persistent, id-keyed collection of `T`.
///
/// Clone this to share the registry - it uses Arc internally.
pub struct Registry<T> {
    inner: Arc<RegistryInner<T>>,
}

struct RegistryInner<T> {
    group: String,
    store: NamedObjectStore,
    entities: RwLock<Vec<Shared<T>>>,
    next_id: Mutex<EntityId>,
}

impl<T: Entity> Registry<T> {
    /// Register `group` with the store and load every persisted entity,
    /// ordered by id.
    pub fn open(store: NamedObjectStore, group: StoreGroup<T>) -> StorageResult<Self> {
        let group_name = group.name().to_string();
        store.register(group)?;

        let mut loaded = store.read_all::<T>()?;
        loaded.sort_by_key(|e| e.id());
        let floor = loaded.last().map_or(0, |e| e.id() + 1);
        let next_id = store
            .read_meta::<EntityId>(&ids_key(&group_name))
            .unwrap_or(0)
            .max(floor);

        info!(group = %group_name, entities = loaded.len(), next_id, "registry opened");
        Ok(Self {
            inner: Arc::new(RegistryInner {
                group: group_name,
                store,
                entities: RwLock::new(loaded.into_iter().map(Shared::new).collect()),
                next_id: Mutex::new(next_id),
            }),
        })
    }

    /// Store group name of this registry.
    pub fn group(&self) -> &str {
        &self.inner.group
    }

    pub fn store(&self) -> &NamedObjectStore {
        &self.inner.store
    }

    // ==================== Lookup ====================

    /// Look up an entity by id. Absence is not an error.
    pub fn get(&self, id: EntityId) -> Option<Shared<T>> {
        self.inner
            .entities
            .read()
            .iter()
            .find(|e| e.id() == id)
            .cloned()
    }

    /// All entities in registry order.
    pub fn all(&self) -> Vec<Shared<T>> {
        self.inner.entities.read().clone()
    }

    /// Position of `entity` in registry order.
    pub fn position(&self, entity: &Shared<T>) -> Option<usize> {
        self.inner.entities.read().iter().position(|e| e.ptr_eq(entity))
    }

    pub fn contains(&self, entity: &Shared<T>) -> bool {
        self.position(entity).is_some()
    }

    pub fn len(&self) -> usize {
        self.inner.entities.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entities.read().is_empty()
    }

    // ==================== Transactions ====================

    /// Build a creation transaction.
    ///
    /// Commit allocates the next id, builds a blank entity, runs the chained
    /// operations (typically [`field`] setters) and then appends and persists
    /// it. Rollback removes it from the list and deletes its file. Allocated
    /// ids are never handed out again, even after a rollback.
    pub fn create(&self) -> ReversibleTransaction<Shared<T>> {
        let registry = self.clone();
        let supplier = move || {
            let id = registry
                .allocate()
                .map_err(|e| TransactionError::operation("allocate id", e))?;
            Ok(Some(Shared::new(T::blank(id))))
        };
        ReversibleTransaction::new(
            format!("create {}", self.group()),
            supplier,
            Ok,
            Attach { registry: self.clone() },
        )
    }

    /// Build an update transaction over an existing entity.
    ///
    /// The entity is edited in place, so every holder of the handle observes
    /// the change. Rollback restores the fields and re-persists.
    pub fn update(&self, entity: &Shared<T>) -> ReversibleTransaction<Shared<T>> {
        let label = format!("update {} {}", self.group(), entity.id());
        let registry = self.clone();
        let target = entity.clone();
        let supplier = move || {
            if !registry.contains(&target) {
                return Err(TransactionError::operation(
                    "update",
                    format!("{} {} is not registered", registry.group(), target.id()),
                ));
            }
            Ok(Some(target.clone()))
        };
        ReversibleTransaction::new(label, supplier, self.persister(), self.persist_op("persist"))
    }

    /// Build a removal transaction.
    ///
    /// Commit removes the entity from the list and deletes its file; rollback
    /// re-inserts it at its original position and re-persists. Cascading
    /// effects are appended by the caller as further operations, so one
    /// rollback unwinds them too. Committing for an entity that is not
    /// registered produces no value.
    pub fn remove(&self, entity: &Shared<T>) -> ReversibleTransaction<Shared<T>> {
        let label = format!("remove {} {}", self.group(), entity.id());
        let registry = self.clone();
        let target = entity.clone();
        let supplier = move || Ok(registry.contains(&target).then(|| target.clone()));
        ReversibleTransaction::new(
            label,
            supplier,
            self.persister(),
            Detach {
                registry: self.clone(),
                position: None,
            },
        )
    }

    // ==================== Internals ====================

    fn allocate(&self) -> StorageResult<EntityId> {
        let mut next = self.inner.next_id.lock();
        let id = *next;
        self.inner.store.write_meta(&ids_key(&self.inner.group), &(id + 1))?;
        *next = id + 1;
        Ok(id)
    }

    fn persist(&self, entity: &Shared<T>) -> TransactionResult<()> {
        let snapshot = entity.snapshot();
        self.inner
            .store
            .write(&snapshot)
            .map_err(|e| TransactionError::operation(format!("persist {} {}", self.group(), snapshot.id()), e))?;
        Ok(())
    }

    fn unpersist(&self, entity: &Shared<T>) -> TransactionResult<()> {
        let snapshot = entity.snapshot();
        self.inner
            .store
            .delete(&snapshot)
            .map_err(|e| TransactionError::operation(format!("delete {} {}", self.group(), snapshot.id()), e))
    }

    /// Supplier inverse that re-writes the entity file.
    fn persister(&self) -> impl FnMut(Shared<T>) -> TransactionResult<Shared<T>> + 'static {
        let registry = self.clone();
        move |entity| {
            registry.persist(&entity)?;
            Ok(entity)
        }
    }

    fn persist_op(&self, name: &str) -> FnOperation<'static, Shared<T>> {
        let registry = self.clone();
        operation(
            name,
            move |entity: Shared<T>| {
                registry.persist(&entity)?;
                Ok(entity)
            },
            Ok,
        )
    }
}

fn ids_key(group: &str) -> String {
    format!("{group}-ids")
}

impl<T> Clone for Registry<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> fmt::Debug for Registry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("group", &self.inner.group)
            .field("len", &self.inner.entities.read().len())
            .field("next_id", &*self.inner.next_id.lock())
            .finish()
    }
}

/// Consumer of creation: append and persist.
struct Attach<T> {
    registry: Registry<T>,
}

impl<T: Entity> Operation<Shared<T>> for Attach<T> {
    fn name(&self) -> &str {
        "attach"
    }

    fn forward(&mut self, entity: Shared<T>) -> TransactionResult<Shared<T>> {
        self.registry.persist(&entity)?;
        self.registry.inner.entities.write().push(entity.clone());
        debug!(group = self.registry.group(), id = entity.id(), "entity created");
        Ok(entity)
    }

    fn backward(&mut self, entity: Shared<T>) -> TransactionResult<Shared<T>> {
        self.registry.inner.entities.write().retain(|e| !e.ptr_eq(&entity));
        self.registry.unpersist(&entity)?;
        debug!(group = self.registry.group(), id = entity.id(), "entity creation undone");
        Ok(entity)
    }
}

/// Consumer of removal: unlink from the list and delete the file, remembering
/// where the entity sat.
struct Detach<T> {
    registry: Registry<T>,
    position: Option<usize>,
}

impl<T: Entity> Operation<Shared<T>> for Detach<T> {
    fn name(&self) -> &str {
        "detach"
    }

    fn forward(&mut self, entity: Shared<T>) -> TransactionResult<Shared<T>> {
        {
            let mut entities = self.registry.inner.entities.write();
            let position = entities
                .iter()
                .position(|e| e.ptr_eq(&entity))
                .ok_or_else(|| TransactionError::operation("detach", "entity is no longer registered"))?;
            entities.remove(position);
            self.position = Some(position);
        }
        self.registry.unpersist(&entity)?;
        debug!(group = self.registry.group(), id = entity.id(), "entity removed");
        Ok(entity)
    }

    fn backward(&mut self, entity: Shared<T>) -> TransactionResult<Shared<T>> {
        if let Some(position) = self.position.take() {
            let mut entities = self.registry.inner.entities.write();
            let position = position.min(entities.len());
            entities.insert(position, entity.clone());
        }
        debug!(group = self.registry.group(), id = entity.id(), "entity removal undone");
        Ok(entity)
    }
}

/// A reversible field edit: `forward` remembers the current value and sets
/// `value`, `backward` puts the remembered value back.
pub fn field<T, V, G, S>(name: impl Into<String>, get: G, set: S, value: V) -> FnOperation<'static, Shared<T>>
where
    T: 'static,
    V: Clone + 'static,
    G: Fn(&T) -> V + 'static,
    S: Fn(&mut T, V) + 'static,
{
    let set = Arc::new(set);
    let restore = set.clone();
    let saved: Arc<Mutex<Option<V>>> = Arc::new(Mutex::new(None));
    let saved_back = saved.clone();

    operation(
        name,
        move |entity: Shared<T>| {
            {
                let mut guard = entity.write();
                *saved.lock() = Some(get(&*guard));
                set(&mut *guard, value.clone());
            }
            Ok(entity)
        },
        move |entity: Shared<T>| {
            if let Some(previous) = saved_back.lock().take() {
                restore(&mut *entity.write(), previous);
            }
            Ok(entity)
        },
    )
}
