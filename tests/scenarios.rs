//! End-to-end behaviour across the association, store and library layers.

use std::collections::BTreeSet;
use std::fs;

use proptest::prelude::*;
use relstore::association::{AssociationSet, OverflowPolicy, UnderflowPolicy};
use relstore::cardinality::CardinalityRule;
use relstore::library::{LibraryConfig, LibrarySessions, MediaLibrary};
use relstore::store::{NamedObjectStore, StoreGroup};
use relstore::transaction::Transaction;
use serde::{Deserialize, Serialize};
use tempfile::TempDir;

#[test]
fn test_zero_or_one_overflow_throws() {
    let mut parents = AssociationSet::new(
        "parents",
        CardinalityRule::parse("Father", "Mother", "0..1", &Default::default()).unwrap(),
        CardinalityRule::parse("Mother", "Father", "0..1", &Default::default()).unwrap(),
    )
    .with_overflow_policy(OverflowPolicy::Throw);

    assert!(parents.associate("f1", "m1").unwrap());
    let err = parents.associate("f1", "m2").unwrap_err();
    assert!(err.is_violation());
    assert_eq!(parents.associated_of_left(&"f1"), Some(vec!["m1"]));
    assert_eq!(parents.associated_of_right(&"m2"), None);
}

#[test]
fn test_underflow_removes_association() {
    let mut set = AssociationSet::new(
        "parents",
        CardinalityRule::zero_or_more("Father", "Mother"),
        CardinalityRule::one_or_more("Mother", "Father"),
    )
    .with_underflow_policy(UnderflowPolicy::RemoveAssociation);

    set.associate("f1", "m1").unwrap();
    assert!(set.disassociate(&"f1", &"m1").unwrap());

    assert_eq!(set.associated_of_left(&"f1"), Some(vec![]));
    assert_eq!(set.associated_of_right(&"m1"), None);
    assert!(set.relation().is_symmetric());
}

#[test]
fn test_id_pair_export_and_import() {
    let fathers = ["f1", "f2"];
    let mothers = ["m1", "m2", "m3"];
    let index = |all: &[&str], x: &&str| all.iter().position(|y| y == x).unwrap() as u64;
    let new_set = || {
        AssociationSet::new(
            "parents",
            CardinalityRule::zero_or_more("Father", "Mother"),
            CardinalityRule::one_or_more("Mother", "Father"),
        )
    };

    let mut set = new_set();
    set.associate("f1", "m1").unwrap();
    set.associate("f1", "m3").unwrap();
    set.associate("f2", "m2").unwrap();

    let pairs = set.as_id_pairs(|f| index(&fathers, f), |m| index(&mothers, m));
    assert_eq!(pairs, vec![(0, 0), (0, 2), (1, 1)]);

    let mut imported = new_set();
    imported
        .load_id_pairs(
            pairs,
            |id| fathers.get(id as usize).copied(),
            |id| mothers.get(id as usize).copied(),
        )
        .unwrap();
    assert_eq!(imported.relation(), set.relation());
}

#[test]
fn test_cascading_movie_removal() {
    let dir = TempDir::new().unwrap();
    let library = MediaLibrary::open(LibraryConfig::new(dir.path().join("lib"))).unwrap();

    let m1 = library.create_movie("M1", 2001).unwrap();
    let m2 = library.create_movie("M2", 2002).unwrap();
    let p1 = library.create_performer("P1").unwrap();
    let p2 = library.create_performer("P2").unwrap();
    let p3 = library.create_performer("P3").unwrap();
    library.link(&m1, &p1).unwrap();
    library.link(&m1, &p2).unwrap();
    library.link(&m1, &p3).unwrap();
    library.link(&m2, &p3).unwrap();
    library.set_movie_image(&m1, vec![1, 2, 3]).unwrap();
    let pairs_before = library.cast_pairs();

    let mut removal = library.remove_movie(&m1).unwrap();
    removal.commit().unwrap();

    assert!(!library.movies().contains(&m1));
    assert!(!library.performers().contains(&p1));
    assert!(!library.performers().contains(&p2));
    assert_eq!(library.filmography(&p3), Some(vec![m2.clone()]));

    removal.rollback().unwrap();

    assert!(library.movies().contains(&m1));
    for p in [&p1, &p2, &p3] {
        assert!(library.performers().contains(p));
    }
    assert_eq!(library.cast_pairs(), pairs_before);
    assert_eq!(library.movie_image(&m1).unwrap(), Some(vec![1, 2, 3]));

    // the restored state is what a fresh session sees as well
    drop(library);
    let reopened = MediaLibrary::open(LibraryConfig::new(dir.path().join("lib"))).unwrap();
    assert_eq!(reopened.cast_pairs(), pairs_before);
    assert_eq!(reopened.stats().performers, 3);
    let m1 = reopened.movies().get(0).unwrap();
    assert_eq!(reopened.movie_image(&m1).unwrap(), Some(vec![1, 2, 3]));
}

#[test]
fn test_same_home_yields_same_session() {
    let dir = TempDir::new().unwrap();
    let sessions = LibrarySessions::new();
    let home = dir.path().join("lib");

    let first = MediaLibrary::open_in(&sessions, LibraryConfig::new(&home)).unwrap();
    let movie = first.create_movie("Alien", 1979).unwrap();

    let second = MediaLibrary::open_in(&sessions, LibraryConfig::new(&home)).unwrap();
    assert!(first.ptr_eq(&second));
    assert!(second.movies().get(movie.id()).unwrap().ptr_eq(&movie));

    sessions.close(&home);
    let fresh = MediaLibrary::open_in(&sessions, LibraryConfig::new(&home)).unwrap();
    assert!(!fresh.ptr_eq(&first));
    assert!(!fresh.movies().get(movie.id()).unwrap().ptr_eq(&movie));
}

#[test]
fn test_copy_library() {
    let dir = TempDir::new().unwrap();
    let library = MediaLibrary::open(LibraryConfig::new(dir.path().join("lib"))).unwrap();
    let movie = library.create_movie("Alien", 1979).unwrap();
    let weaver = library.create_performer("Sigourney Weaver").unwrap();
    library.link(&movie, &weaver).unwrap();
    library.set_movie_image(&movie, b"xenomorph".to_vec()).unwrap();

    let copy = library.copy_to(dir.path().join("copy")).unwrap();
    assert_eq!(copy.stats(), library.stats());
    assert_eq!(copy.cast_pairs(), library.cast_pairs());
    let copied = copy.movies().get(movie.id()).unwrap();
    assert!(!copied.ptr_eq(&movie));
    assert_eq!(copy.movie_image(&copied).unwrap(), Some(b"xenomorph".to_vec()));

    assert!(library.copy_to(dir.path().join("lib")).is_err());
    assert!(library.copy_to(dir.path().join("copy")).is_err());
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Record {
    key: u8,
    body: String,
}

fn record_group() -> StoreGroup<Record> {
    StoreGroup::json("record", "records", |r: &Record| format!("record-{}.json", r.key))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_written_names_match_files(ops in prop::collection::vec((any::<bool>(), 0u8..6, "[a-z]{0,6}"), 1..40)) {
        let dir = TempDir::new().unwrap();
        let store = NamedObjectStore::open(dir.path()).unwrap();
        store.register(record_group()).unwrap();

        for (write, key, body) in ops {
            let record = Record { key, body };
            if write {
                let name = store.write(&record).unwrap();
                prop_assert_eq!(store.read::<Record>(&name).unwrap(), Some(record));
            } else {
                store.delete(&record).unwrap();
            }
        }

        let on_disk: BTreeSet<String> = fs::read_dir(dir.path().join("records"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        prop_assert_eq!(store.written_names::<Record>().unwrap(), on_disk);
    }
}
