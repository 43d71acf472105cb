//! The named object store.
//!
//! Objects live at `home/<group-subdir>/<deterministic-name>`. The store keeps
//! an authoritative index of which names are currently written per group and
//! mirrors it to `home/__object_names/<group>.ser`, rewriting the whole
//! snapshot on every write and delete. Reads only consult names present in the
//! index, so orphaned files are never mistaken for live objects.
//!
//! Writes are not atomic. A crash mid-write can corrupt one object's file,
//! which then reads as absent.

use std::any::{type_name, Any, TypeId};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::store::error::{StorageError, StorageResult};
use crate::store::group::{validate_name, StoreGroup};

/// Directory holding the name index snapshots and side records.
pub const INDEX_DIR: &str = "__object_names";

const SNAPSHOT_EXT: &str = "ser";
const META_EXT: &str = "meta";

/// On-disk form of one group's name index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct NameSnapshot {
    group: String,
    subdir: String,
    names: BTreeSet<String>,
}

#[derive(Debug, Clone, Default)]
struct GroupIndex {
    subdir: String,
    names: BTreeSet<String>,
}

/// A group binding with its concrete type erased.
#[derive(Clone)]
struct Binding {
    group_name: String,
    type_name: &'static str,
    group: Arc<dyn Any + Send + Sync>,
}

/// Per-class file persistence rooted at a home directory.
///
/// Clone this to share the store - it uses Arc internally, and every clone
/// sees the same live name index.
#[derive(Clone)]
pub struct NamedObjectStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    home: PathBuf,
    bindings: RwLock<HashMap<TypeId, Binding>>,
    index: RwLock<BTreeMap<String, GroupIndex>>,
}

impl NamedObjectStore {
    /// Open a store, creating the home and index directories if needed.
    pub fn open(home: impl AsRef<Path>) -> StorageResult<Self> {
        let home = home.as_ref().to_path_buf();
        let index_dir = home.join(INDEX_DIR);
        fs::create_dir_all(&index_dir)?;

        let mut index = BTreeMap::new();
        for entry in fs::read_dir(&index_dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(SNAPSHOT_EXT) {
                continue;
            }
            let snapshot = fs::read(&path)
                .ok()
                .and_then(|bytes| serde_json::from_slice::<NameSnapshot>(&bytes).ok());
            match snapshot {
                Some(snapshot) => {
                    index.insert(
                        snapshot.group,
                        GroupIndex {
                            subdir: snapshot.subdir,
                            names: snapshot.names,
                        },
                    );
                }
                None => warn!(path = %path.display(), "skipping unreadable name index snapshot"),
            }
        }

        debug!(home = %home.display(), groups = index.len(), "store opened");
        Ok(Self::from_parts(home, HashMap::new(), index))
    }

    /// Open an existing store without creating anything.
    pub fn open_existing(home: impl AsRef<Path>) -> StorageResult<Self> {
        let home = home.as_ref();
        if !home.join(INDEX_DIR).is_dir() {
            return Err(StorageError::NotFound(home.to_path_buf()));
        }
        Self::open(home)
    }

    fn from_parts(home: PathBuf, bindings: HashMap<TypeId, Binding>, index: BTreeMap<String, GroupIndex>) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                home,
                bindings: RwLock::new(bindings),
                index: RwLock::new(index),
            }),
        }
    }

    /// The home directory.
    pub fn home(&self) -> &Path {
        &self.inner.home
    }

    /// Check if two handles share the same live store.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    // ==================== Groups ====================

    /// Bind a group to `T`. Registering again for the same type replaces the
    /// binding; names already indexed for the group are kept.
    pub fn register<T: 'static>(&self, group: StoreGroup<T>) -> StorageResult<()> {
        validate_name(group.name())?;
        validate_name(group.subdir())?;
        fs::create_dir_all(self.inner.home.join(group.subdir()))?;

        {
            let mut index = self.inner.index.write();
            let entry = index.entry(group.name().to_string()).or_default();
            entry.subdir = group.subdir().to_string();
        }

        let binding = Binding {
            group_name: group.name().to_string(),
            type_name: type_name::<T>(),
            group: Arc::new(group),
        };
        debug!(group = %binding.group_name, ty = binding.type_name, "store group registered");
        self.inner.bindings.write().insert(TypeId::of::<T>(), binding);
        Ok(())
    }

    /// Check if a group is bound to `T`.
    pub fn is_registered<T: 'static>(&self) -> bool {
        self.inner.bindings.read().contains_key(&TypeId::of::<T>())
    }

    fn group<T: 'static>(&self) -> StorageResult<Arc<StoreGroup<T>>> {
        let binding = self
            .inner
            .bindings
            .read()
            .get(&TypeId::of::<T>())
            .cloned()
            .ok_or_else(|| StorageError::GroupNotRegistered(type_name::<T>().to_string()))?;
        binding
            .group
            .downcast::<StoreGroup<T>>()
            .map_err(|_| StorageError::GroupNotRegistered(type_name::<T>().to_string()))
    }

    /// Deterministic file name of `obj` under its group.
    pub fn name_of<T: 'static>(&self, obj: &T) -> StorageResult<String> {
        Ok(self.group::<T>()?.name_of(obj))
    }

    // ==================== Objects ====================

    /// Serialize `obj` to its group file and record its name in the index.
    ///
    /// Fails immediately with [`StorageError::GroupNotRegistered`] if no group
    /// is bound to `T`.
    pub fn write<T: 'static>(&self, obj: &T) -> StorageResult<String> {
        let group = self.group::<T>()?;
        let name = group.name_of(obj);
        validate_name(&name)?;

        let bytes = group.serialize(obj)?;
        let dir = self.inner.home.join(group.subdir());
        fs::create_dir_all(&dir)?;
        fs::write(dir.join(&name), bytes)?;

        {
            let mut index = self.inner.index.write();
            let entry = index.entry(group.name().to_string()).or_insert_with(|| GroupIndex {
                subdir: group.subdir().to_string(),
                names: BTreeSet::new(),
            });
            if !entry.names.contains(&name) {
                // the name only becomes visible once the snapshot agrees
                let mut names = entry.names.clone();
                names.insert(name.clone());
                self.save_snapshot(group.name(), &entry.subdir, &names)?;
                entry.names = names;
            }
        }

        debug!(group = group.name(), %name, "object written");
        Ok(name)
    }

    /// Remove `obj`'s file and drop it from the index.
    ///
    /// File system failures are logged and swallowed: a stale file left on
    /// disk is harmless because reads go through the index.
    pub fn delete<T: 'static>(&self, obj: &T) -> StorageResult<()> {
        let group = self.group::<T>()?;
        let name = group.name_of(obj);

        let path = self.inner.home.join(group.subdir()).join(&name);
        if let Err(e) = fs::remove_file(&path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %path.display(), error = %e, "failed to delete object file");
            }
        }

        if let Some(entry) = self.inner.index.write().get_mut(group.name()) {
            entry.names.remove(&name);
        }
        if let Err(e) = self.write_snapshot(group.name()) {
            warn!(group = group.name(), error = %e, "failed to rewrite name index after delete");
        }

        debug!(group = group.name(), %name, "object deleted");
        Ok(())
    }

    /// Read one object by name. Returns `None` unless the name is listed in
    /// the index and its file deserializes.
    pub fn read<T: 'static>(&self, name: &str) -> StorageResult<Option<T>> {
        let group = self.group::<T>()?;
        if !self.contains_name(group.name(), name) {
            return Ok(None);
        }
        Ok(self.read_file(&group, name))
    }

    fn read_file<T>(&self, group: &StoreGroup<T>, name: &str) -> Option<T> {
        let path = self.inner.home.join(group.subdir()).join(name);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "indexed object file is unreadable");
                return None;
            }
        };
        let obj = group.deserialize(&bytes);
        if obj.is_none() {
            warn!(path = %path.display(), "indexed object file is corrupted");
        }
        obj
    }

    /// Read every indexed object of `T`, skipping unreadable files.
    pub fn read_all<T: 'static>(&self) -> StorageResult<Vec<T>> {
        let group = self.group::<T>()?;
        let names = self.names_in(group.name());
        Ok(names
            .iter()
            .filter_map(|name| self.read_file(&group, name))
            .collect())
    }

    /// The authoritative set of names currently written for `T`.
    pub fn written_names<T: 'static>(&self) -> StorageResult<BTreeSet<String>> {
        let group = self.group::<T>()?;
        Ok(self.names_in(group.name()))
    }

    /// Group names known to the index, registered or not.
    pub fn groups(&self) -> Vec<String> {
        self.inner.index.read().keys().cloned().collect()
    }

    fn names_in(&self, group: &str) -> BTreeSet<String> {
        self.inner
            .index
            .read()
            .get(group)
            .map(|entry| entry.names.clone())
            .unwrap_or_default()
    }

    fn contains_name(&self, group: &str, name: &str) -> bool {
        self.inner
            .index
            .read()
            .get(group)
            .is_some_and(|entry| entry.names.contains(name))
    }

    fn write_snapshot(&self, group: &str) -> StorageResult<()> {
        let entry = self.inner.index.read().get(group).cloned().unwrap_or_default();
        self.save_snapshot(group, &entry.subdir, &entry.names)
    }

    fn save_snapshot(&self, group: &str, subdir: &str, names: &BTreeSet<String>) -> StorageResult<()> {
        let snapshot = NameSnapshot {
            group: group.to_string(),
            subdir: subdir.to_string(),
            names: names.clone(),
        };
        let path = self
            .inner
            .home
            .join(INDEX_DIR)
            .join(format!("{group}.{SNAPSHOT_EXT}"));
        fs::write(path, serde_json::to_vec_pretty(&snapshot)?)?;
        Ok(())
    }

    // ==================== Side records ====================

    /// Write a small side record (e.g. an id allocator) next to the index.
    pub fn write_meta<V: Serialize>(&self, key: &str, value: &V) -> StorageResult<()> {
        validate_name(key)?;
        let path = self.meta_path(key);
        fs::write(path, serde_json::to_vec_pretty(value)?)?;
        Ok(())
    }

    /// Read a side record; absent or corrupted records read as `None`.
    pub fn read_meta<V: DeserializeOwned>(&self, key: &str) -> Option<V> {
        validate_name(key).ok()?;
        let bytes = fs::read(self.meta_path(key)).ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    fn meta_path(&self, key: &str) -> PathBuf {
        self.inner.home.join(INDEX_DIR).join(format!("{key}.{META_EXT}"))
    }

    // ==================== Copy ====================

    /// Deep-copy files, group bindings and the name index into a fresh store
    /// at `new_home`.
    ///
    /// The copy is assembled in a temporary directory beside the destination
    /// and moved into place at the end; any failure discards it. Copying onto
    /// this store's own home or onto an occupied directory (which includes any
    /// open store) is refused.
    pub fn copy_to(&self, new_home: impl AsRef<Path>) -> StorageResult<NamedObjectStore> {
        let dest = new_home.as_ref();
        if same_location(&self.inner.home, dest) {
            return Err(StorageError::SameLocation(dest.to_path_buf()));
        }
        if is_occupied(dest)? {
            return Err(StorageError::DestinationOccupied(dest.to_path_buf()));
        }

        let parent = match dest.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent)?;
        let staging = tempfile::Builder::new()
            .prefix(".relstore-copy-")
            .tempdir_in(&parent)?;

        let index = self.inner.index.read().clone();
        fs::create_dir_all(staging.path().join(INDEX_DIR))?;
        for (group, entry) in &index {
            let from = self.inner.home.join(&entry.subdir);
            let to = staging.path().join(&entry.subdir);
            fs::create_dir_all(&to)?;
            for name in &entry.names {
                fs::copy(from.join(name), to.join(name))?;
            }
            let snapshot = NameSnapshot {
                group: group.clone(),
                subdir: entry.subdir.clone(),
                names: entry.names.clone(),
            };
            fs::write(
                staging.path().join(INDEX_DIR).join(format!("{group}.{SNAPSHOT_EXT}")),
                serde_json::to_vec_pretty(&snapshot)?,
            )?;
        }
        for entry in fs::read_dir(self.inner.home.join(INDEX_DIR))? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some(META_EXT) {
                if let Some(file_name) = path.file_name() {
                    fs::copy(&path, staging.path().join(INDEX_DIR).join(file_name))?;
                }
            }
        }

        if dest.exists() {
            // only an empty directory gets this far
            fs::remove_dir(dest)?;
        }
        // the staging directory becomes `dest`, so it must outlive this handle
        let staged = staging.keep();
        if let Err(e) = fs::rename(&staged, dest) {
            if let Err(cleanup) = fs::remove_dir_all(&staged) {
                warn!(path = %staged.display(), error = %cleanup, "failed to remove copy staging directory");
            }
            return Err(e.into());
        }

        let bindings = self.inner.bindings.read().clone();
        info!(from = %self.inner.home.display(), to = %dest.display(), groups = index.len(), "store copied");
        Ok(Self::from_parts(dest.to_path_buf(), bindings, index))
    }
}

fn same_location(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

fn is_occupied(path: &Path) -> StorageResult<bool> {
    if !path.exists() {
        return Ok(false);
    }
    if !path.is_dir() {
        return Ok(true);
    }
    Ok(fs::read_dir(path)?.next().is_some())
}

impl std::fmt::Debug for NamedObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamedObjectStore")
            .field("home", &self.inner.home)
            .field("groups", &self.groups())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Movie {
        id: u64,
        title: String,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Unbound {
        id: u64,
    }

    fn movie_group() -> StoreGroup<Movie> {
        StoreGroup::json("movie", "movies", |m: &Movie| format!("movie-{}.json", m.id))
    }

    fn setup() -> (TempDir, NamedObjectStore) {
        let dir = TempDir::new().unwrap();
        let store = NamedObjectStore::open(dir.path().join("home")).unwrap();
        store.register(movie_group()).unwrap();
        (dir, store)
    }

    fn movie(id: u64, title: &str) -> Movie {
        Movie { id, title: title.to_string() }
    }

    #[test]
    fn test_write_then_read() {
        let (_dir, store) = setup();
        let m = movie(1, "Alien");

        let name = store.write(&m).unwrap();
        assert_eq!(name, "movie-1.json");
        assert_eq!(store.read::<Movie>(&name).unwrap(), Some(m));
    }

    #[test]
    fn test_rewrite_overwrites() {
        let (dir, store) = setup();
        store.write(&movie(1, "Alien")).unwrap();
        store.write(&movie(1, "Aliens")).unwrap();

        assert_eq!(store.written_names::<Movie>().unwrap().len(), 1);
        assert_eq!(
            store.read::<Movie>("movie-1.json").unwrap().unwrap().title,
            "Aliens"
        );
        let files = fs::read_dir(dir.path().join("home/movies")).unwrap().count();
        assert_eq!(files, 1);
    }

    #[test]
    fn test_unregistered_type_fails_immediately() {
        let (_dir, store) = setup();
        let err = store.write(&Unbound { id: 1 }).unwrap_err();
        assert!(err.is_configuration());
        assert!(store.read::<Unbound>("x").is_err());
    }

    #[test]
    fn test_delete_updates_index() {
        let (dir, store) = setup();
        let m = movie(2, "Heat");
        store.write(&m).unwrap();
        store.delete(&m).unwrap();

        assert!(store.written_names::<Movie>().unwrap().is_empty());
        assert_eq!(store.read::<Movie>("movie-2.json").unwrap(), None);
        assert!(!dir.path().join("home/movies/movie-2.json").exists());

        // deleting again swallows the missing file
        store.delete(&m).unwrap();
    }

    #[test]
    fn test_orphaned_file_is_ignored() {
        let (dir, store) = setup();
        let orphan = serde_json::to_vec(&movie(9, "Orphan")).unwrap();
        fs::write(dir.path().join("home/movies/movie-9.json"), orphan).unwrap();

        assert_eq!(store.read::<Movie>("movie-9.json").unwrap(), None);
        assert!(store.read_all::<Movie>().unwrap().is_empty());
    }

    #[test]
    fn test_corrupted_file_reads_as_absent() {
        let (dir, store) = setup();
        store.write(&movie(1, "Alien")).unwrap();
        store.write(&movie(2, "Heat")).unwrap();
        fs::write(dir.path().join("home/movies/movie-1.json"), b"{\"id\":").unwrap();

        assert_eq!(store.read::<Movie>("movie-1.json").unwrap(), None);
        assert_eq!(store.read_all::<Movie>().unwrap(), vec![movie(2, "Heat")]);
    }

    #[test]
    fn test_index_survives_reopen() {
        let (dir, store) = setup();
        store.write(&movie(1, "Alien")).unwrap();
        store.write(&movie(2, "Heat")).unwrap();
        store.delete(&movie(1, "Alien")).unwrap();
        drop(store);

        let reopened = NamedObjectStore::open(dir.path().join("home")).unwrap();
        reopened.register(movie_group()).unwrap();
        let names: Vec<_> = reopened.written_names::<Movie>().unwrap().into_iter().collect();
        assert_eq!(names, vec!["movie-2.json"]);

        let snapshot = fs::read(dir.path().join("home/__object_names/movie.ser")).unwrap();
        let snapshot: NameSnapshot = serde_json::from_slice(&snapshot).unwrap();
        assert_eq!(snapshot.names.len(), 1);
    }

    #[test]
    fn test_failed_snapshot_keeps_name_unindexed() {
        let (dir, store) = setup();
        store.write(&movie(1, "Alien")).unwrap();
        // a directory in place of the snapshot makes the index write fail
        let snapshot = dir.path().join("home/__object_names/movie.ser");
        fs::remove_file(&snapshot).unwrap();
        fs::create_dir(&snapshot).unwrap();

        assert!(store.write(&movie(2, "Heat")).is_err());
        let names: Vec<_> = store.written_names::<Movie>().unwrap().into_iter().collect();
        assert_eq!(names, vec!["movie-1.json"]);
        assert_eq!(store.read::<Movie>("movie-2.json").unwrap(), None);

        fs::remove_dir(&snapshot).unwrap();
        store.write(&movie(2, "Heat")).unwrap();
        assert_eq!(store.written_names::<Movie>().unwrap().len(), 2);
    }

    #[test]
    fn test_meta_records() {
        let (_dir, store) = setup();
        assert_eq!(store.read_meta::<u64>("movie-ids"), None);
        store.write_meta("movie-ids", &7u64).unwrap();
        assert_eq!(store.read_meta::<u64>("movie-ids"), Some(7));
    }

    #[test]
    fn test_copy_to_fresh_destination() {
        let (dir, store) = setup();
        store.write(&movie(1, "Alien")).unwrap();
        store.write_meta("movie-ids", &2u64).unwrap();

        let copy = store.copy_to(dir.path().join("copy")).unwrap();
        assert!(!copy.ptr_eq(&store));
        assert_eq!(copy.read::<Movie>("movie-1.json").unwrap(), Some(movie(1, "Alien")));
        assert_eq!(copy.read_meta::<u64>("movie-ids"), Some(2));

        // the copy is independent of the source
        copy.write(&movie(2, "Heat")).unwrap();
        assert_eq!(store.written_names::<Movie>().unwrap().len(), 1);

        let reopened = NamedObjectStore::open_existing(dir.path().join("copy")).unwrap();
        reopened.register(movie_group()).unwrap();
        assert_eq!(reopened.written_names::<Movie>().unwrap().len(), 2);

        let staged = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().starts_with(".relstore-copy-"))
            .count();
        assert_eq!(staged, 0);
    }

    #[test]
    fn test_copy_refuses_same_or_occupied_destination() {
        let (dir, store) = setup();
        let err = store.copy_to(dir.path().join("home")).unwrap_err();
        assert!(matches!(err, StorageError::SameLocation(_)));

        let other = NamedObjectStore::open(dir.path().join("other")).unwrap();
        let err = store.copy_to(other.home()).unwrap_err();
        assert!(matches!(err, StorageError::DestinationOccupied(_)));
    }

    #[test]
    fn test_failed_copy_leaves_nothing_behind() {
        let (dir, store) = setup();
        store.write(&movie(1, "Alien")).unwrap();
        // indexed but missing on disk: the copy cannot complete
        fs::remove_file(dir.path().join("home/movies/movie-1.json")).unwrap();

        assert!(store.copy_to(dir.path().join("copy")).is_err());
        assert!(!dir.path().join("copy").exists());
        let leftovers = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().starts_with(".relstore-copy-"))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn test_open_existing_requires_store() {
        let dir = TempDir::new().unwrap();
        let err = NamedObjectStore::open_existing(dir.path().join("missing")).unwrap_err();
        assert!(err.is_not_found());
    }
}
