//! File-backed named object store.
//!
//! # Layout
//!
//! ```text
//! home/
//! ├── __object_names/
//! │   ├── movie.ser          # name index snapshot per group
//! │   └── movie-ids.meta     # side records
//! ├── movies/
//! │   ├── movie-1.json
//! │   └── movie-2.json
//! └── performers/
//!     └── performer-1.json
//! ```
//!
//! The in-memory index is authoritative; the snapshot on disk is rewritten
//! after every write and delete.
//!
//! # Usage
//!
//! ```
//! use relstore::store::{NamedObjectStore, StoreGroup};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, PartialEq, Serialize, Deserialize)]
//! struct Note {
//!     id: u64,
//!     text: String,
//! }
//!
//! let dir = tempfile::tempdir().unwrap();
//! let store = NamedObjectStore::open(dir.path()).unwrap();
//! store
//!     .register(StoreGroup::json("note", "notes", |n: &Note| format!("note-{}.json", n.id)))
//!     .unwrap();
//!
//! let name = store.write(&Note { id: 1, text: "hi".into() }).unwrap();
//! assert_eq!(store.read::<Note>(&name).unwrap().unwrap().text, "hi");
//! ```

mod error;
mod group;
mod named;
mod session;

pub use error::{StorageError, StorageResult};
pub use group::StoreGroup;
pub use named::{NamedObjectStore, INDEX_DIR};
pub use session::Sessions;
