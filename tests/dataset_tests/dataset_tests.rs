//! Tests for the dataset coordinator
//!
//! These tests verify:
//! - CRUD through both index kinds keeps store and index in step
//! - Updates that relocate a record re-point the index
//! - Text search, iteration and reindexing
//! - Reopen, stored index parameters and automatic index rebuild
//! - File listing and destruction

use std::path::Path;

use tempfile::TempDir;
use trackstore::index::Index;
use trackstore::{Config, Dataset, IndexKind, StoreError, Track, TrackIndex};

// =============================================================================
// Helper Functions
// =============================================================================

fn config_for(dir: &Path, kind: IndexKind) -> Config {
    Config::builder()
        .data_dir(dir)
        .index_kind(kind)
        .btree_half_order(2)
        .bucket_capacity(2)
        .build()
}

fn open_dataset(dir: &Path, kind: IndexKind) -> Dataset {
    Dataset::open(config_for(dir, kind)).unwrap()
}

fn make_track(n: usize, name: &str, artist: &str, genre: &str) -> Track {
    Track {
        track_id: format!("{:0>22}", n),
        name: name.to_string(),
        album: format!("Album {}", n),
        artists: vec![artist.to_string()],
        genres: vec![genre.to_string()],
        popularity: 50,
        duration_ms: 200_000,
        explicit: n % 2 == 0,
        danceability: 0.5,
        energy: 0.7,
        tempo: 120.0,
        ..Track::default()
    }
}

fn seed(dataset: &mut Dataset, count: usize) -> Vec<i32> {
    (1..=count)
        .map(|n| {
            dataset
                .create(&make_track(n, &format!("Song {}", n), "Someone", "rock"))
                .unwrap()
        })
        .collect()
}

const KINDS: [IndexKind; 2] = [IndexKind::BTree, IndexKind::Hash];

// =============================================================================
// CRUD Tests
// =============================================================================

#[test]
fn test_create_read_delete_both_indexes() {
    for kind in KINDS {
        let temp = TempDir::new().unwrap();
        let mut dataset = open_dataset(temp.path(), kind);
        assert_eq!(dataset.index_kind(), kind);

        let track_a = make_track(1, "A", "x", "pop");
        let track_b = make_track(2, "B", "y", "pop");

        assert_eq!(dataset.create(&track_a).unwrap(), 1);
        assert_eq!(dataset.read(1).unwrap(), Track { id: 1, ..track_a });
        dataset.delete(1).unwrap();
        assert!(dataset.read(1).unwrap_err().is_not_found());
        assert_eq!(dataset.create(&track_b).unwrap(), 2);
    }
}

#[test]
fn test_many_records_through_index() {
    for kind in KINDS {
        let temp = TempDir::new().unwrap();
        let mut dataset = open_dataset(temp.path(), kind);
        let ids = seed(&mut dataset, 120);

        for &id in &ids {
            let track = dataset.read(id).unwrap();
            assert_eq!(track.id, id);
            assert_eq!(track.name, format!("Song {}", id));
        }
        assert!(dataset.read(121).unwrap_err().is_not_found());
    }
}

#[test]
fn test_delete_missing_is_not_found() {
    for kind in KINDS {
        let temp = TempDir::new().unwrap();
        let mut dataset = open_dataset(temp.path(), kind);
        seed(&mut dataset, 3);

        match dataset.delete(9) {
            Err(StoreError::NotFound { id }) => assert_eq!(id, 9),
            other => panic!("expected NotFound, got {:?}", other),
        }
        dataset.delete(2).unwrap();
        assert!(dataset.delete(2).unwrap_err().is_not_found());
    }
}

#[test]
fn test_update_in_place_and_relocated() {
    for kind in KINDS {
        let temp = TempDir::new().unwrap();
        let mut dataset = open_dataset(temp.path(), kind);
        seed(&mut dataset, 5);

        // Shorter payload: stays put
        let offset = dataset.index_mut().search(3).unwrap();
        dataset.update(3, &make_track(3, "S", "Someone", "rock")).unwrap();
        assert_eq!(dataset.index_mut().search(3).unwrap(), offset);
        assert_eq!(dataset.read(3).unwrap().name, "S");

        // Longer payload: moves to the end, index follows
        let longer = make_track(3, "A title far longer than the original", "Someone", "rock");
        dataset.update(3, &longer).unwrap();
        assert_ne!(dataset.index_mut().search(3).unwrap(), offset);
        assert_eq!(dataset.read(3).unwrap(), Track { id: 3, ..longer });

        // Other records unaffected, no new id consumed
        assert_eq!(dataset.read(4).unwrap().name, "Song 4");
        assert_eq!(dataset.last_id(), 5);
    }
}

#[test]
fn test_update_missing_is_not_found() {
    let temp = TempDir::new().unwrap();
    let mut dataset = open_dataset(temp.path(), IndexKind::BTree);
    seed(&mut dataset, 2);

    let err = dataset.update(7, &make_track(7, "x", "y", "z")).unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn test_create_invalid_track_leaves_dataset_unchanged() {
    let temp = TempDir::new().unwrap();
    let mut dataset = open_dataset(temp.path(), IndexKind::Hash);
    seed(&mut dataset, 2);

    let mut bad = make_track(3, "x", "y", "z");
    bad.track_id = "nope".to_string();
    assert!(matches!(dataset.create(&bad), Err(StoreError::Encoding(_))));

    assert_eq!(dataset.last_id(), 2);
    assert_eq!(dataset.create(&make_track(3, "ok", "y", "z")).unwrap(), 3);
}

// =============================================================================
// Scan / Search Tests
// =============================================================================

#[test]
fn test_iter_yields_live_tracks_in_order() {
    let temp = TempDir::new().unwrap();
    let mut dataset = open_dataset(temp.path(), IndexKind::BTree);
    seed(&mut dataset, 4);
    dataset.delete(2).unwrap();

    let ids: Vec<i32> = dataset.iter().unwrap().map(|t| t.unwrap().id).collect();
    assert_eq!(ids, vec![1, 3, 4]);
}

#[test]
fn test_search_text() {
    let temp = TempDir::new().unwrap();
    let mut dataset = open_dataset(temp.path(), IndexKind::Hash);
    dataset.create(&make_track(1, "Blue Monday", "New Order", "synth-pop")).unwrap();
    dataset.create(&make_track(2, "Karma Police", "Radiohead", "alt-rock")).unwrap();
    dataset.create(&make_track(3, "Ceremony", "New Order", "post-punk")).unwrap();
    dataset.delete(3).unwrap();

    let hits: Vec<i32> = dataset.search_text("new order").unwrap().iter().map(|t| t.id).collect();
    assert_eq!(hits, vec![1]);

    let hits: Vec<i32> = dataset.search_text("ROCK").unwrap().iter().map(|t| t.id).collect();
    assert_eq!(hits, vec![2]);

    assert!(dataset.search_text("nothing like this").unwrap().is_empty());
}

// =============================================================================
// Reindex / Persistence Tests
// =============================================================================

#[test]
fn test_reindex_rebuilds_from_store() {
    for kind in KINDS {
        let temp = TempDir::new().unwrap();
        let mut dataset = open_dataset(temp.path(), kind);
        seed(&mut dataset, 30);
        dataset.delete(10).unwrap();
        dataset.update(5, &make_track(5, "Now with a much longer title", "Someone", "rock")).unwrap();

        assert_eq!(dataset.reindex().unwrap(), 29);

        assert!(dataset.read(10).unwrap_err().is_not_found());
        assert_eq!(dataset.read(5).unwrap().name, "Now with a much longer title");
        for id in (1..=30).filter(|&id| id != 10) {
            assert_eq!(dataset.read(id).unwrap().id, id);
        }
    }
}

#[test]
fn test_reopen_keeps_records_and_index() {
    for kind in KINDS {
        let temp = TempDir::new().unwrap();
        {
            let mut dataset = open_dataset(temp.path(), kind);
            seed(&mut dataset, 25);
            dataset.delete(7).unwrap();
            dataset.close().unwrap();
        }

        let mut dataset = open_dataset(temp.path(), kind);
        assert_eq!(dataset.last_id(), 25);
        assert!(dataset.read(7).unwrap_err().is_not_found());
        assert_eq!(dataset.read(25).unwrap().name, "Song 25");
        assert_eq!(dataset.create(&make_track(26, "n", "a", "g")).unwrap(), 26);
    }
}

#[test]
fn test_reopen_uses_stored_index_parameters() {
    let temp = TempDir::new().unwrap();
    {
        let mut dataset = open_dataset(temp.path(), IndexKind::BTree);
        seed(&mut dataset, 3);
        dataset.close().unwrap();
    }

    let config = Config::builder()
        .data_dir(temp.path())
        .index_kind(IndexKind::BTree)
        .btree_half_order(7)
        .build();
    let mut dataset = Dataset::open(config).unwrap();

    assert_eq!(dataset.config().btree_half_order, 2);
    match dataset.index_mut() {
        TrackIndex::BTree(tree) => assert_eq!(tree.half_order(), 2),
        TrackIndex::Hash(_) => panic!("expected a B-tree index"),
    }
}

#[test]
fn test_missing_index_is_rebuilt_on_open() {
    let temp = TempDir::new().unwrap();
    {
        let mut dataset = open_dataset(temp.path(), IndexKind::BTree);
        seed(&mut dataset, 10);
        dataset.delete(4).unwrap();
        dataset.close().unwrap();
    }

    // Same records, other index kind: its files do not exist yet
    let mut dataset = open_dataset(temp.path(), IndexKind::Hash);
    assert_eq!(dataset.index_kind(), IndexKind::Hash);
    assert_eq!(dataset.read(9).unwrap().name, "Song 9");
    assert!(dataset.read(4).unwrap_err().is_not_found());
}

#[test]
fn test_open_rejects_invalid_config() {
    let temp = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp.path())
        .bucket_capacity(0)
        .build();

    assert!(matches!(
        Dataset::open(config),
        Err(StoreError::InvalidConfiguration(_))
    ));
}

// =============================================================================
// Lifecycle Tests
// =============================================================================

#[test]
fn test_files_and_destruct() {
    for (kind, expected) in [(IndexKind::BTree, 2), (IndexKind::Hash, 4)] {
        let temp = TempDir::new().unwrap();
        let mut dataset = open_dataset(temp.path(), kind);
        seed(&mut dataset, 5);

        let files = dataset.files();
        assert_eq!(files.len(), expected);
        assert!(files[0].ends_with("tracks.db"));
        assert!(files.iter().all(|p| p.exists()));

        dataset.destruct().unwrap();
        assert!(files.iter().all(|p| !p.exists()));
    }
}

#[test]
fn test_index_kind_parsing() {
    assert_eq!("btree".parse::<IndexKind>().unwrap(), IndexKind::BTree);
    assert_eq!("B-Tree".parse::<IndexKind>().unwrap(), IndexKind::BTree);
    assert_eq!("hash".parse::<IndexKind>().unwrap(), IndexKind::Hash);
    assert!(matches!(
        "skiplist".parse::<IndexKind>(),
        Err(StoreError::InvalidConfiguration(_))
    ));
    assert_eq!(IndexKind::Hash.to_string(), "hash");
}
