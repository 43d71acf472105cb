//! relstore - a file-backed object registry with cardinality-checked
//! associations and reversible transactions.
//!
//! Layers, bottom up:
//!
//! - [`transaction`]: reversible pipelines with one-shot rollback, plus an
//!   abort-only batch.
//! - [`cardinality`]: min/max rules with literal, unlimited or computed bounds.
//! - [`association`]: a coupled many-to-many relation guarded by two rules,
//!   overflow/underflow policies and violation callbacks.
//! - [`store`]: per-class file persistence with an authoritative name index.
//! - [`registry`]: id-keyed entity collections mutated only through
//!   transactions.
//! - [`library`]: movies and performers wired together with cascade removal.
//!
//! # Example
//!
//! ```no_run
//! use relstore::library::{LibraryConfig, MediaLibrary};
//!
//! let library = MediaLibrary::open(LibraryConfig::new("./my_library")).unwrap();
//! let movie = library.create_movie("Alien", 1979).unwrap();
//! let weaver = library.create_performer("Sigourney Weaver").unwrap();
//! library.link(&movie, &weaver).unwrap();
//! println!("{}", library.stats());
//! ```

pub mod association;
pub mod cardinality;
pub mod library;
pub mod registry;
pub mod store;
pub mod transaction;
