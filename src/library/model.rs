//! Persisted library records and their store groups.

use serde::{Deserialize, Serialize};

use crate::registry::{Entity, EntityId};
use crate::store::StoreGroup;

/// A movie. `image` names the stored poster, if any.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movie {
    pub id: EntityId,
    pub title: String,
    pub year: u16,
    pub image: Option<String>,
}

impl Entity for Movie {
    fn id(&self) -> EntityId {
        self.id
    }

    fn blank(id: EntityId) -> Self {
        Self {
            id,
            title: String::new(),
            year: 0,
            image: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Performer {
    pub id: EntityId,
    pub name: String,
}

impl Entity for Performer {
    fn id(&self) -> EntityId {
        self.id
    }

    fn blank(id: EntityId) -> Self {
        Self { id, name: String::new() }
    }
}

/// Raw image bytes owned by one movie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageBlob {
    pub movie_id: EntityId,
    pub bytes: Vec<u8>,
}

/// On-disk form of an association set: its name and (left id, right id) pairs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationRecord {
    pub name: String,
    pub pairs: Vec<(u64, u64)>,
}

pub(crate) fn movie_group() -> StoreGroup<Movie> {
    StoreGroup::json("movie", "movies", |m: &Movie| format!("movie-{}.json", m.id))
}

pub(crate) fn performer_group() -> StoreGroup<Performer> {
    StoreGroup::json("performer", "performers", |p: &Performer| format!("performer-{}.json", p.id))
}

pub(crate) fn relation_group() -> StoreGroup<RelationRecord> {
    StoreGroup::json("relation", "relations", |r: &RelationRecord| relation_file(&r.name))
}

pub(crate) fn relation_file(name: &str) -> String {
    format!("{name}.json")
}

pub(crate) fn image_file(movie_id: EntityId) -> String {
    format!("movie-{movie_id}.img")
}

/// Images are stored raw, prefixed with the owning movie id (8 bytes, little
/// endian) so a blob can be read back without its file name.
pub(crate) fn image_group() -> StoreGroup<ImageBlob> {
    StoreGroup::new(
        "image",
        "images",
        |b: &ImageBlob| image_file(b.movie_id),
        |b: &ImageBlob| {
            let mut out = Vec::with_capacity(8 + b.bytes.len());
            out.extend_from_slice(&b.movie_id.to_le_bytes());
            out.extend_from_slice(&b.bytes);
            Ok(out)
        },
        |raw: &[u8]| {
            let (id, bytes) = raw.split_first_chunk::<8>()?;
            Some(ImageBlob {
                movie_id: u64::from_le_bytes(*id),
                bytes: bytes.to_vec(),
            })
        },
    )
}
