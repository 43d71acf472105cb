//! Path-keyed session handles.
//!
//! Opening the same home twice through one [`Sessions`] yields the same live
//! handle. The handle is owned by whoever creates it; there is no process-wide
//! registry.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::debug;

/// Open sessions keyed by canonical home path.
#[derive(Debug)]
pub struct Sessions<S: Clone> {
    open: Mutex<HashMap<PathBuf, S>>,
}

impl<S: Clone> Sessions<S> {
    pub fn new() -> Self {
        Self {
            open: Mutex::new(HashMap::new()),
        }
    }

    /// Return the live session at `path`, or open one with `opener`.
    ///
    /// The lock is held while `opener` runs so two callers racing on the same
    /// path cannot both open it. A failed open leaves nothing cached.
    pub fn open_with<E, F>(&self, path: impl AsRef<Path>, opener: F) -> Result<S, E>
    where
        F: FnOnce(&Path) -> Result<S, E>,
    {
        let path = path.as_ref();
        let mut open = self.open.lock();
        if let Some(session) = open.get(&session_key(path)) {
            debug!(path = %path.display(), "reusing open session");
            return Ok(session.clone());
        }

        let session = opener(path)?;
        // the opener may have created the directory, so key again
        open.insert(session_key(path), session.clone());
        debug!(path = %path.display(), "session opened");
        Ok(session)
    }

    /// The live session at `path`, if any.
    pub fn get(&self, path: impl AsRef<Path>) -> Option<S> {
        self.open.lock().get(&session_key(path.as_ref())).cloned()
    }

    /// Forget the session at `path`. Outstanding clones stay usable.
    pub fn close(&self, path: impl AsRef<Path>) -> Option<S> {
        self.open.lock().remove(&session_key(path.as_ref()))
    }

    pub fn is_open(&self, path: impl AsRef<Path>) -> bool {
        self.open.lock().contains_key(&session_key(path.as_ref()))
    }

    pub fn len(&self) -> usize {
        self.open.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.open.lock().is_empty()
    }
}

impl<S: Clone> Default for Sessions<S> {
    fn default() -> Self {
        Self::new()
    }
}

/// Canonical form of `path`; falls back to an absolute path when it does not
/// exist yet.
fn session_key(path: &Path) -> PathBuf {
    if let Ok(canonical) = path.canonicalize() {
        return canonical;
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}
