//! The media library: movies, performers and the cast relation between them.
//!
//! Removing a movie unlinks its cast. A performer left without movies is
//! removed outright by a nested removal transaction, committed on the spot and
//! kept by the movie's own removal transaction. One rollback of the movie
//! removal therefore restores the movie with its image and links, along with
//! every cascaded performer.
//!
//! Handles are synchronous and meant for a single session. The internal locks
//! keep memory safe when a handle is shared across threads, but interleaved
//! mutations of overlapping entities are not supported.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::association::{AssociationSet, Violation, ViolationKind};
use crate::library::config::LibraryConfig;
use crate::library::error::{LibraryError, LibraryResult};
use crate::library::model::{
    image_file, image_group, movie_group, performer_group, relation_file, relation_group, ImageBlob, Movie,
    Performer, RelationRecord,
};
use crate::registry::{field, Registry, Shared};
use crate::store::{NamedObjectStore, Sessions, StorageError, StorageResult};
use crate::transaction::{operation, Operation, ReversibleTransaction, Transaction, TransactionError, TransactionResult};

/// Name of the movie/performer relation.
pub const CAST: &str = "cast";

type Cast = AssociationSet<Shared<Movie>, Shared<Performer>>;
type Orphans = Arc<Mutex<Vec<Shared<Performer>>>>;

/// Open libraries keyed by home path.
pub type LibrarySessions = Sessions<MediaLibrary>;

/// Counts reported by [`MediaLibrary::stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LibraryStats {
    pub movies: usize,
    pub performers: usize,
    pub links: usize,
}

impl fmt::Display for LibraryStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} movie(s), {} performer(s), {} link(s)",
            self.movies, self.performers, self.links
        )
    }
}

/// The library handle.
///
/// Clone this to share the library - it uses Arc internally.
#[derive(Clone)]
pub struct MediaLibrary {
    inner: Arc<LibraryInner>,
}

struct LibraryInner {
    config: LibraryConfig,
    store: NamedObjectStore,
    movies: Registry<Movie>,
    performers: Registry<Performer>,
    cast: RwLock<Cast>,
    /// Performers purged from the cast by an underflow, awaiting removal.
    orphans: Orphans,
}

impl MediaLibrary {
    /// Open (or create) the library at `config.home`.
    pub fn open(config: LibraryConfig) -> LibraryResult<Self> {
        config.validate()?;
        if !config.home.exists() && !config.create_if_missing {
            return Err(LibraryError::NotFound(config.home.clone()));
        }
        let store = NamedObjectStore::open(&config.home)?;
        Self::assemble(config, store)
    }

    /// Open through `sessions`: a home that is already open yields the same
    /// live library instead of a reload.
    pub fn open_in(sessions: &LibrarySessions, config: LibraryConfig) -> LibraryResult<Self> {
        let home = config.home.clone();
        sessions.open_with(&home, |_: &Path| Self::open(config))
    }

    fn assemble(config: LibraryConfig, store: NamedObjectStore) -> LibraryResult<Self> {
        store.register(image_group())?;
        store.register(relation_group())?;
        let movies = Registry::open(store.clone(), movie_group())?;
        let performers = Registry::open(store.clone(), performer_group())?;

        let orphans = Orphans::default();
        let mut cast = Cast::new(CAST, config.movie_rule(), config.performer_rule())
            .with_overflow_policy(config.overflow_policy)
            .with_underflow_policy(config.underflow_policy);
        let queue = orphans.clone();
        cast.set_callback(
            ViolationKind::BackwardUnderflow,
            move |v: &Violation<Shared<Movie>, Shared<Performer>>| {
                if v.purged {
                    queue.lock().push(v.right.clone());
                }
            },
        );
        cast.set_callback(
            ViolationKind::ForwardOverflow,
            |v: &Violation<Shared<Movie>, Shared<Performer>>| {
                warn!(rule = %v.rule, movie = v.left.id(), performer = v.right.id(), "cast is full");
            },
        );

        if let Some(record) = store.read::<RelationRecord>(&relation_file(CAST))? {
            cast.load_id_pairs(record.pairs, |id| movies.get(id), |id| performers.get(id))?;
        }
        for movie in movies.all() {
            cast.track_left(movie);
        }
        for performer in performers.all() {
            cast.track_right(performer);
        }

        info!(
            home = %store.home().display(),
            movies = movies.len(),
            performers = performers.len(),
            links = cast.len(),
            "library opened"
        );
        Ok(Self {
            inner: Arc::new(LibraryInner {
                config,
                store,
                movies,
                performers,
                cast: RwLock::new(cast),
                orphans,
            }),
        })
    }

    /// Deep-copy the library into a fresh directory and open the copy.
    pub fn copy_to(&self, dest: impl AsRef<Path>) -> LibraryResult<MediaLibrary> {
        let dest = dest.as_ref();
        let store = self.inner.store.copy_to(dest)?;
        let mut config = self.inner.config.clone();
        config.home = dest.to_path_buf();
        Self::assemble(config, store)
    }

    // ==================== Accessors ====================

    pub fn home(&self) -> &Path {
        self.inner.store.home()
    }

    pub fn config(&self) -> &LibraryConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &NamedObjectStore {
        &self.inner.store
    }

    pub fn movies(&self) -> &Registry<Movie> {
        &self.inner.movies
    }

    pub fn performers(&self) -> &Registry<Performer> {
        &self.inner.performers
    }

    /// Check if both handles share the same live library.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn stats(&self) -> LibraryStats {
        LibraryStats {
            movies: self.inner.movies.len(),
            performers: self.inner.performers.len(),
            links: self.inner.cast.read().len(),
        }
    }

    // ==================== Movies and performers ====================

    /// Create and commit a movie.
    pub fn create_movie(&self, title: impl Into<String>, year: u16) -> LibraryResult<Shared<Movie>> {
        let tracking = self.clone();
        let untracking = self.clone();
        let mut tx = self
            .inner
            .movies
            .create()
            .with_operation(movie_title(title.into()))?
            .with_operation(field("year", |m: &Movie| m.year, |m: &mut Movie, v| m.year = v, year))?
            .with_operation(operation(
                "track in cast",
                move |movie: Shared<Movie>| {
                    tracking.inner.cast.write().track_left(movie.clone());
                    Ok(movie)
                },
                move |movie: Shared<Movie>| {
                    untracking.inner.cast.write().remove_left(&movie);
                    Ok(movie)
                },
            ))?;
        let movie = tx
            .commit()?
            .ok_or_else(|| StorageError::NoObject("movie".into()))?;
        info!(id = movie.id(), title = %movie.read().title, "movie created");
        Ok(movie)
    }

    /// Create and commit a performer.
    pub fn create_performer(&self, name: impl Into<String>) -> LibraryResult<Shared<Performer>> {
        let tracking = self.clone();
        let untracking = self.clone();
        let mut tx = self
            .inner
            .performers
            .create()
            .with_operation(performer_name(name.into()))?
            .with_operation(operation(
                "track in cast",
                move |performer: Shared<Performer>| {
                    tracking.inner.cast.write().track_right(performer.clone());
                    Ok(performer)
                },
                move |performer: Shared<Performer>| {
                    untracking.inner.cast.write().remove_right(&performer);
                    Ok(performer)
                },
            ))?;
        let performer = tx
            .commit()?
            .ok_or_else(|| StorageError::NoObject("performer".into()))?;
        info!(id = performer.id(), name = %performer.read().name, "performer created");
        Ok(performer)
    }

    /// Retitle a movie. Returns the committed transaction for rollback.
    pub fn rename_movie(
        &self,
        movie: &Shared<Movie>,
        title: impl Into<String>,
    ) -> LibraryResult<ReversibleTransaction<Shared<Movie>>> {
        let mut tx = self.inner.movies.update(movie).with_operation(movie_title(title.into()))?;
        tx.commit()?;
        Ok(tx)
    }

    /// Rename a performer. Returns the committed transaction for rollback.
    pub fn rename_performer(
        &self,
        performer: &Shared<Performer>,
        name: impl Into<String>,
    ) -> LibraryResult<ReversibleTransaction<Shared<Performer>>> {
        let mut tx = self
            .inner
            .performers
            .update(performer)
            .with_operation(performer_name(name.into()))?;
        tx.commit()?;
        Ok(tx)
    }

    /// Store `bytes` as the movie's image, replacing any previous one.
    /// Returns the committed transaction for rollback.
    pub fn set_movie_image(
        &self,
        movie: &Shared<Movie>,
        bytes: Vec<u8>,
    ) -> LibraryResult<ReversibleTransaction<Shared<Movie>>> {
        let mut tx = self.inner.movies.update(movie).with_operation(SetImage {
            library: self.clone(),
            bytes,
            previous: None,
        })?;
        tx.commit()?;
        Ok(tx)
    }

    /// The movie's image bytes, if it has one.
    pub fn movie_image(&self, movie: &Shared<Movie>) -> LibraryResult<Option<Vec<u8>>> {
        let Some(name) = movie.read().image.clone() else {
            return Ok(None);
        };
        Ok(self.inner.store.read::<ImageBlob>(&name)?.map(|blob| blob.bytes))
    }

    /// Build the removal transaction for `movie`, uncommitted.
    ///
    /// Committing drops the image, unlinks the cast (cascading into performer
    /// removals under the remove-association underflow policy) and removes the
    /// movie. A single rollback undoes all of it.
    pub fn remove_movie(&self, movie: &Shared<Movie>) -> LibraryResult<ReversibleTransaction<Shared<Movie>>> {
        let tx = self
            .inner
            .movies
            .remove(movie)
            .with_operation(DropImage {
                library: self.clone(),
                dropped: None,
            })?
            .with_operation(UnlinkCast {
                library: self.clone(),
                unlinked: Vec::new(),
                nested: Vec::new(),
            })?;
        Ok(tx)
    }

    /// Build the removal transaction for `performer`, uncommitted.
    ///
    /// Movie casts have no minimum, so the performer's links are dropped
    /// without cardinality checks.
    pub fn remove_performer(
        &self,
        performer: &Shared<Performer>,
    ) -> LibraryResult<ReversibleTransaction<Shared<Performer>>> {
        let tx = self
            .inner
            .performers
            .remove(performer)
            .with_operation(UnlinkFilmography {
                library: self.clone(),
                movies: Vec::new(),
            })?;
        Ok(tx)
    }

    // ==================== Cast ====================

    /// Link a performer to a movie.
    ///
    /// Returns `Ok(false)` if the pair already exists or an ignore-policy
    /// overflow refused it.
    pub fn link(&self, movie: &Shared<Movie>, performer: &Shared<Performer>) -> LibraryResult<bool> {
        self.ensure_registered(movie, performer)?;
        let linked = {
            let mut cast = self.inner.cast.write();
            let before = cast.relation().clone();
            let linked = cast.associate(movie.clone(), performer.clone())?;
            if linked {
                if let Err(e) = self.write_cast(&cast) {
                    cast.restore_relation(before);
                    return Err(e.into());
                }
            }
            linked
        };
        if linked {
            debug!(movie = movie.id(), performer = performer.id(), "linked");
        }
        Ok(linked)
    }

    /// Unlink a performer from a movie.
    ///
    /// A performer left below its minimum under the remove-association policy
    /// is removed from the library as well.
    pub fn unlink(&self, movie: &Shared<Movie>, performer: &Shared<Performer>) -> LibraryResult<bool> {
        let unlinked = {
            let mut cast = self.inner.cast.write();
            let before = cast.relation().clone();
            let unlinked = cast.disassociate(movie, performer)?;
            if unlinked {
                if let Err(e) = self.write_cast(&cast) {
                    cast.restore_relation(before);
                    // the purge was undone, so nobody is orphaned
                    self.take_orphans();
                    return Err(e.into());
                }
            }
            unlinked
        };
        if unlinked {
            for orphan in self.take_orphans() {
                info!(performer = orphan.id(), "removing performer left without movies");
                self.remove_performer(&orphan)?.commit()?;
            }
        }
        Ok(unlinked)
    }

    /// Performers of `movie`; `None` if the movie is unknown to the cast.
    pub fn cast_of(&self, movie: &Shared<Movie>) -> Option<Vec<Shared<Performer>>> {
        self.inner.cast.read().associated_of_left(movie)
    }

    /// Movies of `performer`; `None` if the performer is unknown to the cast.
    pub fn filmography(&self, performer: &Shared<Performer>) -> Option<Vec<Shared<Movie>>> {
        self.inner.cast.read().associated_of_right(performer)
    }

    /// The cast as sorted (movie id, performer id) pairs.
    pub fn cast_pairs(&self) -> Vec<(u64, u64)> {
        self.inner.cast.read().as_id_pairs(|m| m.id(), |p| p.id())
    }

    // ==================== Internals ====================

    fn ensure_registered(&self, movie: &Shared<Movie>, performer: &Shared<Performer>) -> LibraryResult<()> {
        if !self.inner.movies.contains(movie) {
            return Err(LibraryError::UnknownEntity { kind: "movie", id: movie.id() });
        }
        if !self.inner.performers.contains(performer) {
            return Err(LibraryError::UnknownEntity {
                kind: "performer",
                id: performer.id(),
            });
        }
        Ok(())
    }

    fn persist_cast(&self) -> StorageResult<()> {
        self.write_cast(&self.inner.cast.read())
    }

    /// Persist `cast` as seen by a caller that already holds the cast lock.
    fn write_cast(&self, cast: &Cast) -> StorageResult<()> {
        let record = RelationRecord {
            name: CAST.to_string(),
            pairs: cast.as_id_pairs(|m| m.id(), |p| p.id()),
        };
        self.inner.store.write(&record)?;
        Ok(())
    }

    fn take_orphans(&self) -> Vec<Shared<Performer>> {
        std::mem::take(&mut *self.inner.orphans.lock())
    }
}

impl fmt::Debug for MediaLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaLibrary")
            .field("home", &self.home())
            .field("stats", &self.stats())
            .finish()
    }
}

fn movie_title(title: String) -> impl Operation<Shared<Movie>> + 'static {
    field("title", |m: &Movie| m.title.clone(), |m: &mut Movie, v| m.title = v, title)
}

fn performer_name(name: String) -> impl Operation<Shared<Performer>> + 'static {
    field("name", |p: &Performer| p.name.clone(), |p: &mut Performer, v| p.name = v, name)
}

fn stage_error(stage: &str) -> impl Fn(StorageError) -> TransactionError + '_ {
    move |e| TransactionError::operation(stage, e)
}

/// Writes a new image blob, remembering what it replaced.
struct SetImage {
    library: MediaLibrary,
    bytes: Vec<u8>,
    previous: Option<(Option<String>, Option<ImageBlob>)>,
}

impl Operation<Shared<Movie>> for SetImage {
    fn name(&self) -> &str {
        "set image"
    }

    fn forward(&mut self, movie: Shared<Movie>) -> TransactionResult<Shared<Movie>> {
        let store = &self.library.inner.store;
        let movie_id = movie.id();
        let name = image_file(movie_id);
        let replaced = store.read::<ImageBlob>(&name).map_err(stage_error("set image"))?;
        store
            .write(&ImageBlob {
                movie_id,
                bytes: self.bytes.clone(),
            })
            .map_err(stage_error("set image"))?;

        let mut guard = movie.write();
        self.previous = Some((guard.image.replace(name), replaced));
        drop(guard);
        Ok(movie)
    }

    fn backward(&mut self, movie: Shared<Movie>) -> TransactionResult<Shared<Movie>> {
        let Some((field_value, replaced)) = self.previous.take() else {
            return Ok(movie);
        };
        let store = &self.library.inner.store;
        match replaced {
            Some(blob) => {
                store.write(&blob).map_err(stage_error("restore image"))?;
            }
            None => {
                let stub = ImageBlob {
                    movie_id: movie.id(),
                    bytes: Vec::new(),
                };
                store.delete(&stub).map_err(stage_error("restore image"))?;
            }
        }
        movie.write().image = field_value;
        Ok(movie)
    }
}

/// Deletes the movie's image, keeping the bytes for rollback.
struct DropImage {
    library: MediaLibrary,
    dropped: Option<(String, Option<ImageBlob>)>,
}

impl Operation<Shared<Movie>> for DropImage {
    fn name(&self) -> &str {
        "drop image"
    }

    fn forward(&mut self, movie: Shared<Movie>) -> TransactionResult<Shared<Movie>> {
        let Some(name) = movie.read().image.clone() else {
            return Ok(movie);
        };
        let store = &self.library.inner.store;
        let blob = store.read::<ImageBlob>(&name).map_err(stage_error("drop image"))?;
        if let Some(blob) = &blob {
            store.delete(blob).map_err(stage_error("drop image"))?;
        }
        movie.write().image = None;
        debug!(movie = movie.id(), image = %name, "image dropped");
        self.dropped = Some((name, blob));
        Ok(movie)
    }

    fn backward(&mut self, movie: Shared<Movie>) -> TransactionResult<Shared<Movie>> {
        if let Some((name, blob)) = self.dropped.take() {
            if let Some(blob) = blob {
                self.library
                    .inner
                    .store
                    .write(&blob)
                    .map_err(stage_error("restore image"))?;
            }
            movie.write().image = Some(name);
        }
        Ok(movie)
    }
}

/// Unlinks a movie's whole cast and removes every performer that loses its
/// last movie on the way.
struct UnlinkCast {
    library: MediaLibrary,
    unlinked: Vec<Shared<Performer>>,
    nested: Vec<ReversibleTransaction<Shared<Performer>>>,
}

impl UnlinkCast {
    fn unlink_all(&mut self, movie: &Shared<Movie>) -> TransactionResult<()> {
        let inner = &self.library.inner;
        let before = inner.cast.read().associated_of_left(movie).unwrap_or_default();

        let mut failure = None;
        {
            let mut cast = inner.cast.write();
            for performer in &before {
                match cast.disassociate(movie, performer) {
                    Ok(true) => {}
                    Ok(false) => {
                        failure = Some(TransactionError::operation(
                            "unlink cast",
                            format!("unlinking performer {} was refused", performer.id()),
                        ));
                        break;
                    }
                    Err(e) => {
                        failure = Some(TransactionError::operation("unlink cast", e));
                        break;
                    }
                }
            }
            self.unlinked = before
                .iter()
                .filter(|p| !cast.contains(movie, p))
                .cloned()
                .collect();
            if failure.is_none() {
                cast.remove_left(movie);
            }
        }

        let orphans = self.library.take_orphans();
        if let Some(e) = failure {
            return Err(e);
        }
        self.library.persist_cast().map_err(stage_error("unlink cast"))?;

        for orphan in orphans {
            info!(movie = movie.id(), performer = orphan.id(), "cascading performer removal");
            let mut nested = self
                .library
                .remove_performer(&orphan)
                .map_err(|e| TransactionError::operation("cascade", e))?;
            nested.commit()?;
            self.nested.push(nested);
        }
        Ok(())
    }

    /// Roll back cascaded removals, then restore the unlinked pairs.
    fn relink(&mut self, movie: &Shared<Movie>) -> TransactionResult<()> {
        while let Some(mut nested) = self.nested.pop() {
            nested.rollback()?;
        }

        {
            let mut cast = self.library.inner.cast.write();
            cast.track_left(movie.clone());
            for performer in self.unlinked.drain(..) {
                cast.track_right(performer.clone());
                let id = performer.id();
                if !cast
                    .associate(movie.clone(), performer)
                    .map_err(|e| TransactionError::operation("relink cast", e))?
                {
                    return Err(TransactionError::operation(
                        "relink cast",
                        format!("performer {id} could not be linked back"),
                    ));
                }
            }
        }
        self.library.persist_cast().map_err(stage_error("relink cast"))
    }
}

impl Operation<Shared<Movie>> for UnlinkCast {
    fn name(&self) -> &str {
        "unlink cast"
    }

    fn forward(&mut self, movie: Shared<Movie>) -> TransactionResult<Shared<Movie>> {
        if let Err(e) = self.unlink_all(&movie) {
            // this stage cleans up after itself; earlier stages are undone by the transaction
            if let Err(undo) = self.relink(&movie) {
                warn!(movie = movie.id(), error = %undo, "could not restore cast after failed unlink");
            }
            return Err(e);
        }
        Ok(movie)
    }

    fn backward(&mut self, movie: Shared<Movie>) -> TransactionResult<Shared<Movie>> {
        self.relink(&movie)?;
        Ok(movie)
    }
}

/// Drops every link of a performer being removed.
struct UnlinkFilmography {
    library: MediaLibrary,
    movies: Vec<Shared<Movie>>,
}

impl Operation<Shared<Performer>> for UnlinkFilmography {
    fn name(&self) -> &str {
        "unlink filmography"
    }

    fn forward(&mut self, performer: Shared<Performer>) -> TransactionResult<Shared<Performer>> {
        self.movies = self.library.inner.cast.write().remove_right(&performer);
        if let Err(e) = self.library.persist_cast() {
            self.backward(performer)?;
            return Err(TransactionError::operation("unlink filmography", e));
        }
        Ok(performer)
    }

    fn backward(&mut self, performer: Shared<Performer>) -> TransactionResult<Shared<Performer>> {
        {
            let mut cast = self.library.inner.cast.write();
            cast.track_right(performer.clone());
            for movie in self.movies.drain(..) {
                cast.associate(movie, performer.clone())
                    .map_err(|e| TransactionError::operation("relink filmography", e))?;
            }
        }
        self.library
            .persist_cast()
            .map_err(stage_error("relink filmography"))?;
        Ok(performer)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::association::{OverflowPolicy, UnderflowPolicy};
    use crate::transaction::TxState;

    fn setup() -> (TempDir, MediaLibrary) {
        let dir = TempDir::new().unwrap();
        let library = MediaLibrary::open(LibraryConfig::new(dir.path().join("lib"))).unwrap();
        (dir, library)
    }

    fn ids<T: crate::registry::Entity>(entities: &[Shared<T>]) -> Vec<u64> {
        let mut ids: Vec<u64> = entities.iter().map(|e| e.id()).collect();
        ids.sort_unstable();
        ids
    }

    #[test]
    fn test_create_and_link() {
        let (_dir, library) = setup();
        let movie = library.create_movie("Heat", 1995).unwrap();
        let pacino = library.create_performer("Al Pacino").unwrap();

        assert_eq!(library.cast_of(&movie), Some(vec![]));
        assert!(library.link(&movie, &pacino).unwrap());
        assert!(!library.link(&movie, &pacino).unwrap());

        assert_eq!(library.cast_of(&movie), Some(vec![pacino.clone()]));
        assert_eq!(library.filmography(&pacino), Some(vec![movie.clone()]));
        assert_eq!(library.cast_pairs(), vec![(0, 0)]);
        assert_eq!(
            library.stats(),
            LibraryStats { movies: 1, performers: 1, links: 1 }
        );
    }

    /// Replace the relations directory with a plain file so cast writes fail.
    fn break_cast_storage(library: &MediaLibrary) -> std::path::PathBuf {
        let relations = library.home().join("relations");
        std::fs::remove_dir_all(&relations).unwrap();
        std::fs::write(&relations, b"").unwrap();
        relations
    }

    fn mend_cast_storage(relations: &std::path::Path) {
        std::fs::remove_file(relations).unwrap();
        std::fs::create_dir(relations).unwrap();
    }

    #[test]
    fn test_link_keeps_cast_when_persist_fails() {
        let (_dir, library) = setup();
        let movie = library.create_movie("Heat", 1995).unwrap();
        let pacino = library.create_performer("Al Pacino").unwrap();
        let relations = break_cast_storage(&library);

        assert!(library.link(&movie, &pacino).is_err());
        assert_eq!(library.cast_of(&movie), Some(vec![]));
        assert_eq!(library.filmography(&pacino), Some(vec![]));
        assert!(library.cast_pairs().is_empty());

        mend_cast_storage(&relations);
        assert!(library.link(&movie, &pacino).unwrap());
        assert_eq!(library.cast_pairs(), vec![(0, 0)]);
    }

    #[test]
    fn test_unlink_keeps_cast_when_persist_fails() {
        let (_dir, library) = setup();
        let movie = library.create_movie("Heat", 1995).unwrap();
        let pacino = library.create_performer("Al Pacino").unwrap();
        library.link(&movie, &pacino).unwrap();
        let relations = break_cast_storage(&library);

        assert!(library.unlink(&movie, &pacino).is_err());
        assert_eq!(library.cast_of(&movie), Some(vec![pacino.clone()]));
        assert!(library.performers().contains(&pacino));
        assert!(library.take_orphans().is_empty());

        mend_cast_storage(&relations);
        assert!(library.unlink(&movie, &pacino).unwrap());
        assert!(!library.performers().contains(&pacino));
        assert_eq!(library.cast_of(&movie), Some(vec![]));
    }

    #[test]
    fn test_link_unknown_entity_fails() {
        let (_dir, library) = setup();
        let movie = library.create_movie("Heat", 1995).unwrap();
        let stray = Shared::new(Performer { id: 99, name: "nobody".into() });

        let err = library.link(&movie, &stray).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_cast_limit_refuses_or_throws() {
        let dir = TempDir::new().unwrap();
        let config = LibraryConfig::new(dir.path().join("lib")).max_performers_per_movie(Some(1));
        let library = MediaLibrary::open(config.clone()).unwrap();
        let movie = library.create_movie("Solo", 2001).unwrap();
        let a = library.create_performer("A").unwrap();
        let b = library.create_performer("B").unwrap();

        assert!(library.link(&movie, &a).unwrap());
        assert!(!library.link(&movie, &b).unwrap());

        let strict = MediaLibrary::open(
            config
                .home(dir.path().join("strict"))
                .overflow_policy(OverflowPolicy::Throw),
        )
        .unwrap();
        let movie = strict.create_movie("Solo", 2001).unwrap();
        let a = strict.create_performer("A").unwrap();
        let b = strict.create_performer("B").unwrap();
        strict.link(&movie, &a).unwrap();
        assert!(strict.link(&movie, &b).unwrap_err().is_violation());
        assert_eq!(strict.cast_of(&movie), Some(vec![a]));
    }

    #[test]
    fn test_unlink_last_movie_removes_performer() {
        let (_dir, library) = setup();
        let movie = library.create_movie("Heat", 1995).unwrap();
        let other = library.create_movie("Serpico", 1973).unwrap();
        let pacino = library.create_performer("Al Pacino").unwrap();
        let kilmer = library.create_performer("Val Kilmer").unwrap();
        library.link(&movie, &pacino).unwrap();
        library.link(&other, &pacino).unwrap();
        library.link(&movie, &kilmer).unwrap();

        assert!(library.unlink(&movie, &pacino).unwrap());
        assert!(library.performers().contains(&pacino));

        assert!(library.unlink(&movie, &kilmer).unwrap());
        assert!(!library.performers().contains(&kilmer));
        assert_eq!(library.filmography(&kilmer), None);
        assert_eq!(library.cast_of(&movie), Some(vec![]));
    }

    #[test]
    fn test_remove_movie_cascades_and_rolls_back() {
        let (_dir, library) = setup();
        let m1 = library.create_movie("Heat", 1995).unwrap();
        let m2 = library.create_movie("Serpico", 1973).unwrap();
        let p1 = library.create_performer("P1").unwrap();
        let p2 = library.create_performer("P2").unwrap();
        let p3 = library.create_performer("P3").unwrap();
        for p in [&p1, &p2, &p3] {
            library.link(&m1, p).unwrap();
        }
        library.link(&m2, &p3).unwrap();
        library.set_movie_image(&m1, b"poster".to_vec()).unwrap();

        let movies_before = library.movies().all();
        let performers_before = library.performers().all();
        let pairs_before = library.cast_pairs();
        let m1_before = m1.snapshot();

        let mut tx = library.remove_movie(&m1).unwrap();
        assert_eq!(tx.operation_names(), vec!["drop image", "unlink cast"]);
        tx.commit().unwrap();

        assert!(!library.movies().contains(&m1));
        assert_eq!(ids(&library.performers().all()), vec![p3.id()]);
        assert_eq!(library.filmography(&p3), Some(vec![m2.clone()]));
        assert_eq!(library.cast_of(&m1), None);
        assert_eq!(library.store().written_names::<ImageBlob>().unwrap().len(), 0);
        assert_eq!(library.cast_pairs(), vec![(m2.id(), p3.id())]);

        tx.rollback().unwrap();
        assert_eq!(tx.state(), TxState::RolledBack);

        assert_eq!(library.movies().all(), movies_before);
        assert_eq!(library.performers().all(), performers_before);
        assert_eq!(library.cast_pairs(), pairs_before);
        assert_eq!(m1.snapshot(), m1_before);
        assert_eq!(library.movie_image(&m1).unwrap(), Some(b"poster".to_vec()));
        assert_eq!(
            library.store().read::<Movie>("movie-0.json").unwrap(),
            Some(m1_before)
        );
        assert!(library.store().read::<Performer>("performer-0.json").unwrap().is_some());
    }

    #[test]
    fn test_remove_movie_refused_under_ignore_policy() {
        let dir = TempDir::new().unwrap();
        let config = LibraryConfig::new(dir.path().join("lib")).underflow_policy(UnderflowPolicy::Ignore);
        let library = MediaLibrary::open(config).unwrap();
        let movie = library.create_movie("Heat", 1995).unwrap();
        let a = library.create_performer("A").unwrap();
        let b = library.create_performer("B").unwrap();
        let other = library.create_movie("Other", 2000).unwrap();
        library.link(&movie, &a).unwrap();
        library.link(&movie, &b).unwrap();
        library.link(&other, &a).unwrap();

        let mut tx = library.remove_movie(&movie).unwrap();
        assert!(tx.commit().is_err());
        assert_eq!(tx.state(), TxState::Aborted);

        assert!(library.movies().contains(&movie));
        assert_eq!(ids(&library.cast_of(&movie).unwrap()), vec![a.id(), b.id()]);
        assert_eq!(library.stats().performers, 2);
    }

    #[test]
    fn test_remove_performer_rolls_back_links() {
        let (_dir, library) = setup();
        let movie = library.create_movie("Heat", 1995).unwrap();
        let p = library.create_performer("P").unwrap();
        library.link(&movie, &p).unwrap();

        let mut tx = library.remove_performer(&p).unwrap();
        tx.commit().unwrap();
        assert_eq!(library.cast_of(&movie), Some(vec![]));
        assert!(library.performers().is_empty());

        tx.rollback().unwrap();
        assert_eq!(library.cast_of(&movie), Some(vec![p.clone()]));
        assert!(library.performers().contains(&p));
    }

    #[test]
    fn test_rename_and_image_roll_back() {
        let (_dir, library) = setup();
        let movie = library.create_movie("Heet", 1995).unwrap();
        library.set_movie_image(&movie, b"v1".to_vec()).unwrap();

        let mut rename = library.rename_movie(&movie, "Heat").unwrap();
        let mut image = library.set_movie_image(&movie, b"v2".to_vec()).unwrap();
        assert_eq!(movie.read().title, "Heat");
        assert_eq!(library.movie_image(&movie).unwrap(), Some(b"v2".to_vec()));

        image.rollback().unwrap();
        assert_eq!(library.movie_image(&movie).unwrap(), Some(b"v1".to_vec()));
        rename.rollback().unwrap();
        assert_eq!(movie.read().title, "Heet");
    }

    #[test]
    fn test_reopen_restores_cast() {
        let (dir, library) = setup();
        let movie = library.create_movie("Heat", 1995).unwrap();
        let lonely = library.create_movie("Lonely", 2020).unwrap();
        let p = library.create_performer("P").unwrap();
        library.link(&movie, &p).unwrap();
        let (movie_id, lonely_id) = (movie.id(), lonely.id());
        drop(library);

        let reopened = MediaLibrary::open(LibraryConfig::new(dir.path().join("lib"))).unwrap();
        let movie = reopened.movies().get(movie_id).unwrap();
        let lonely = reopened.movies().get(lonely_id).unwrap();
        assert_eq!(reopened.cast_of(&movie).unwrap().len(), 1);
        assert_eq!(reopened.cast_of(&lonely), Some(vec![]));
        assert_eq!(reopened.cast_pairs(), vec![(movie_id, 0)]);
    }

    #[test]
    fn test_open_missing_without_create() {
        let dir = TempDir::new().unwrap();
        let config = LibraryConfig::new(dir.path().join("absent")).create_if_missing(false);
        assert!(MediaLibrary::open(config).unwrap_err().is_not_found());
    }
}
