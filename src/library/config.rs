//! Library configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::association::{OverflowPolicy, UnderflowPolicy};
use crate::cardinality::CardinalityRule;
use crate::library::error::{LibraryError, LibraryResult};
use crate::library::model::{Movie, Performer};
use crate::registry::Shared;

/// Library configuration options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryConfig {
    /// Path to the library home directory.
    pub home: PathBuf,
    /// Create if doesn't exist.
    pub create_if_missing: bool,
    /// Policy when a link would exceed a maximum.
    pub overflow_policy: OverflowPolicy,
    /// Policy when an unlink would drop below a minimum. The default cascades:
    /// a performer losing its last movie is removed.
    pub underflow_policy: UnderflowPolicy,
    /// Movies every performer must appear in.
    pub min_movies_per_performer: usize,
    /// Cast size limit; `None` means unlimited.
    pub max_performers_per_movie: Option<usize>,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            home: PathBuf::from(".relstore"),
            create_if_missing: true,
            overflow_policy: OverflowPolicy::Ignore,
            underflow_policy: UnderflowPolicy::RemoveAssociation,
            min_movies_per_performer: 1,
            max_performers_per_movie: None,
        }
    }
}

impl LibraryConfig {
    /// Create a new configuration with the given home.
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self {
            home: home.into(),
            ..Default::default()
        }
    }

    pub fn home(mut self, home: impl Into<PathBuf>) -> Self {
        self.home = home.into();
        self
    }

    /// Set create_if_missing flag.
    pub fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    pub fn overflow_policy(mut self, policy: OverflowPolicy) -> Self {
        self.overflow_policy = policy;
        self
    }

    pub fn underflow_policy(mut self, policy: UnderflowPolicy) -> Self {
        self.underflow_policy = policy;
        self
    }

    pub fn min_movies_per_performer(mut self, value: usize) -> Self {
        self.min_movies_per_performer = value;
        self
    }

    pub fn max_performers_per_movie(mut self, value: Option<usize>) -> Self {
        self.max_performers_per_movie = value;
        self
    }

    pub(crate) fn validate(&self) -> LibraryResult<()> {
        if self.home.as_os_str().is_empty() {
            return Err(LibraryError::InvalidConfig("home path is empty".into()));
        }
        if i64::try_from(self.min_movies_per_performer).is_err() {
            return Err(LibraryError::InvalidConfig("min_movies_per_performer out of range".into()));
        }
        if self
            .max_performers_per_movie
            .is_some_and(|max| i64::try_from(max).is_err())
        {
            return Err(LibraryError::InvalidConfig("max_performers_per_movie out of range".into()));
        }
        Ok(())
    }

    /// Rule on each movie's cast size.
    pub(crate) fn movie_rule(&self) -> CardinalityRule<Shared<Movie>> {
        let max = self.max_performers_per_movie.map(|m| m as i64);
        CardinalityRule::new("Movie", "Performer", 0, max)
    }

    /// Rule on each performer's filmography size.
    pub(crate) fn performer_rule(&self) -> CardinalityRule<Shared<Performer>> {
        CardinalityRule::new("Performer", "Movie", self.min_movies_per_performer as i64, None)
    }
}
