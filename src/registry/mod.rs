//! Object registries.
//!
//! One [`Registry`] per entity type. Callers never mutate entries directly:
//! every create, update and removal is a [`ReversibleTransaction`] whose
//! consumer persists through the [`NamedObjectStore`].
//!
//! # Usage
//!
//! ```
//! use relstore::registry::{field, Entity, EntityId, Registry};
//! use relstore::store::{NamedObjectStore, StoreGroup};
//! use relstore::transaction::Transaction;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! struct Tag {
//!     id: EntityId,
//!     label: String,
//! }
//!
//! impl Entity for Tag {
//!     fn id(&self) -> EntityId {
//!         self.id
//!     }
//!     fn blank(id: EntityId) -> Self {
//!         Tag { id, label: String::new() }
//!     }
//! }
//!
//! let dir = tempfile::tempdir().unwrap();
//! let store = NamedObjectStore::open(dir.path()).unwrap();
//! let tags = Registry::open(store, StoreGroup::json("tag", "tags", |t: &Tag| format!("tag-{}.json", t.id))).unwrap();
//!
//! let mut tx = tags.create();
//! tx.add_operation(field("label", |t: &Tag| t.label.clone(), |t: &mut Tag, v| t.label = v, "noir".to_string()))
//!     .unwrap();
//! let tag = tx.commit().unwrap().unwrap();
//! assert_eq!(tags.get(0).unwrap().read().label, "noir");
//!
//! tx.rollback().unwrap();
//! assert!(tags.get(tag.id()).is_none());
//! ```
//!
//! [`ReversibleTransaction`]: crate::transaction::ReversibleTransaction
//! [`NamedObjectStore`]: crate::store::NamedObjectStore

mod entity;
#[allow(clippy::module_inception)]
mod registry;

pub use entity::{Entity, EntityId, Shared};
pub use registry::{field, Registry};
