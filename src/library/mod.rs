//! Media library - the composition root.
//!
//! Wires one [`Registry`](crate::registry::Registry) per entity type and the
//! `cast` association set together over a single
//! [`NamedObjectStore`](crate::store::NamedObjectStore):
//!
//! ```text
//!  Registry<Movie>                              Registry<Performer>
//!        │        cast: [0..max] ⇄ [min..*]             │
//!        └──────────── AssociationSet ──────────────────┘
//!                            │
//!                     NamedObjectStore
//! ```
//!
//! # Usage
//!
//! ```
//! use relstore::library::{LibraryConfig, MediaLibrary};
//! use relstore::transaction::Transaction;
//!
//! let dir = tempfile::tempdir().unwrap();
//! let library = MediaLibrary::open(LibraryConfig::new(dir.path().join("lib"))).unwrap();
//!
//! let heat = library.create_movie("Heat", 1995).unwrap();
//! let kilmer = library.create_performer("Val Kilmer").unwrap();
//! library.link(&heat, &kilmer).unwrap();
//!
//! let mut removal = library.remove_movie(&heat).unwrap();
//! removal.commit().unwrap();
//! assert!(library.performers().is_empty());
//!
//! removal.rollback().unwrap();
//! assert_eq!(library.cast_of(&heat), Some(vec![kilmer]));
//! ```

mod config;
mod error;
#[allow(clippy::module_inception)]
mod library;
mod model;

pub use config::LibraryConfig;
pub use error::{LibraryError, LibraryResult};
pub use library::{LibrarySessions, LibraryStats, MediaLibrary, CAST};
pub use model::{ImageBlob, Movie, Performer, RelationRecord};
