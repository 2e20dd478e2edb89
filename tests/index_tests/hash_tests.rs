//! Tests for the extendible hash index
//!
//! These tests verify:
//! - Search/insert/delete semantics and error outcomes
//! - Bucket splits and directory doubling
//! - The directory invariant after many inserts
//! - Deletes never shrink the directory
//! - Persistence across reopen, capacity validation and destruct

use std::path::PathBuf;

use tempfile::TempDir;
use trackstore::index::hash::{hash, MAX_GLOBAL_DEPTH};
use trackstore::index::{HashIndex, Index, IndexKind};
use trackstore::StoreError;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_hash() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let base = temp_dir.path().join("tracks");
    (temp_dir, base)
}

fn position_of(id: i32) -> u64 {
    (id.unsigned_abs() as u64) * 64 + 4
}

fn insert_all(index: &mut HashIndex, ids: impl IntoIterator<Item = i32>) {
    for id in ids {
        index.insert(id, position_of(id)).unwrap();
    }
}

// =============================================================================
// Hash Function Tests
// =============================================================================

#[test]
fn test_hash_uses_low_bits_of_magnitude() {
    assert_eq!(hash(13, 0), 0);
    assert_eq!(hash(13, 2), 1);
    assert_eq!(hash(13, 3), 5);
    assert_eq!(hash(-13, 3), 5);
    assert_eq!(hash(i32::MIN, 31), 0);
    assert_eq!(hash(i32::MIN, 32), 1usize << 31);
}

// =============================================================================
// Basic Operation Tests
// =============================================================================

#[test]
fn test_new_index_is_empty() {
    let (_temp, base) = setup_temp_hash();
    let mut index = HashIndex::create(&base, 4).unwrap();

    assert_eq!(index.global_depth(), 0);
    assert_eq!(index.bucket_capacity(), 4);
    assert_eq!(index.kind(), IndexKind::Hash);
    assert!(index.search(1).unwrap_err().is_not_found());

    let stats = index.verify().unwrap();
    assert_eq!(stats.buckets, 1);
    assert_eq!(stats.entries, 0);
}

#[test]
fn test_insert_and_search() {
    let (_temp, base) = setup_temp_hash();
    let mut index = HashIndex::create(&base, 4).unwrap();

    index.insert(17, 1234).unwrap();

    assert_eq!(index.search(17).unwrap(), 1234);
    assert!(index.search(18).unwrap_err().is_not_found());
}

#[test]
fn test_insert_duplicate_is_conflict() {
    let (_temp, base) = setup_temp_hash();
    let mut index = HashIndex::create(&base, 2).unwrap();
    insert_all(&mut index, 1..=10);

    match index.insert(6, 1) {
        Err(StoreError::Conflict { id }) => assert_eq!(id, 6),
        other => panic!("expected Conflict, got {:?}", other),
    }
    assert_eq!(index.search(6).unwrap(), position_of(6));
}

#[test]
fn test_delete() {
    let (_temp, base) = setup_temp_hash();
    let mut index = HashIndex::create(&base, 4).unwrap();
    insert_all(&mut index, [1, 2, 3]);

    index.delete(2).unwrap();

    assert!(index.search(2).unwrap_err().is_not_found());
    assert!(index.delete(2).unwrap_err().is_not_found());
    assert_eq!(index.search(1).unwrap(), position_of(1));
    assert_eq!(index.search(3).unwrap(), position_of(3));
}

#[test]
fn test_delete_then_reinsert() {
    let (_temp, base) = setup_temp_hash();
    let mut index = HashIndex::create(&base, 2).unwrap();
    insert_all(&mut index, [4, 8]);

    index.delete(4).unwrap();
    index.insert(4, 777).unwrap();

    assert_eq!(index.search(4).unwrap(), 777);
}

// =============================================================================
// Split / Doubling Tests
// =============================================================================

#[test]
fn test_colliding_ids_double_directory() {
    let (_temp, base) = setup_temp_hash();
    let mut index = HashIndex::create(&base, 2).unwrap();

    insert_all(&mut index, [1, 2]);
    assert_eq!(index.global_depth(), 0);

    // 1 and 3 share a bucket until at least one hash bit is used
    index.insert(3, position_of(3)).unwrap();

    assert!(index.global_depth() >= 1);
    for id in [1, 2, 3] {
        assert_eq!(index.search(id).unwrap(), position_of(id));
    }
    index.verify().unwrap();
}

#[test]
fn test_split_without_doubling() {
    let (_temp, base) = setup_temp_hash();
    let mut index = HashIndex::create(&base, 2).unwrap();

    // Odd ids force depth 2; the even bucket stays at local depth 1
    insert_all(&mut index, [1, 2, 3, 5]);
    let depth = index.global_depth();
    assert_eq!(depth, 2);
    assert_eq!(index.local_depth_of(2).unwrap(), 1);

    // Filling the even bucket splits it without doubling
    insert_all(&mut index, [4, 6]);
    assert_eq!(index.global_depth(), depth);
    assert_eq!(index.local_depth_of(2).unwrap(), 2);
    assert_eq!(index.local_depth_of(4).unwrap(), 2);

    let stats = index.verify().unwrap();
    assert_eq!(stats.entries, 6);
    assert_eq!(stats.buckets, 4);
}

#[test]
fn test_capacity_one_deep_collisions() {
    let (_temp, base) = setup_temp_hash();
    let mut index = HashIndex::create(&base, 1).unwrap();

    // 8 and 24 agree on their low 4 bits
    insert_all(&mut index, [8, 24]);

    assert_eq!(index.global_depth(), 5);
    assert_eq!(index.search(8).unwrap(), position_of(8));
    assert_eq!(index.search(24).unwrap(), position_of(24));
    index.verify().unwrap();
}

#[test]
fn test_opposite_ids_overflowing_bucket_are_rejected() {
    let (_temp, base) = setup_temp_hash();
    let mut index = HashIndex::create(&base, 1).unwrap();
    index.insert(7, position_of(7)).unwrap();

    // 7 and -7 hash identically at every depth
    match index.insert(-7, 200) {
        Err(StoreError::InvalidConfiguration(_)) => {}
        other => panic!("expected InvalidConfiguration, got {:?}", other),
    }

    assert_eq!(index.global_depth(), 0);
    assert_eq!(index.search(7).unwrap(), position_of(7));
    assert!(index.search(-7).unwrap_err().is_not_found());
    index.verify().unwrap();
}

#[test]
fn test_ids_differing_above_depth_cap_are_rejected() {
    let (_temp, base) = setup_temp_hash();
    let mut index = HashIndex::create(&base, 1).unwrap();
    let high = 1 + (1 << MAX_GLOBAL_DEPTH);
    index.insert(1, 10).unwrap();

    assert!(matches!(
        index.insert(high, 20),
        Err(StoreError::InvalidConfiguration(_))
    ));
    assert_eq!(index.global_depth(), 0);
    assert_eq!(index.search(1).unwrap(), 10);
}

#[test]
fn test_colliding_pair_fits_larger_bucket() {
    let (_temp, base) = setup_temp_hash();
    let mut index = HashIndex::create(&base, 2).unwrap();

    insert_all(&mut index, [7, -7, 2]);

    for id in [7, -7, 2] {
        assert_eq!(index.search(id).unwrap(), position_of(id));
    }
    index.verify().unwrap();
}

#[test]
fn test_many_inserts_keep_directory_invariant() {
    let (_temp, base) = setup_temp_hash();
    let mut index = HashIndex::create(&base, 4).unwrap();

    for id in 1..=600 {
        index.insert(id, position_of(id)).unwrap();
        if id % 50 == 0 {
            index.verify().unwrap();
        }
    }

    let stats = index.verify().unwrap();
    assert_eq!(stats.entries, 600);
    assert!(stats.buckets >= 150);
    assert!(stats
        .local_depths
        .values()
        .all(|&local| local <= stats.global_depth));
    for id in 1..=600 {
        assert_eq!(index.search(id).unwrap(), position_of(id));
    }
}

#[test]
fn test_negative_ids_share_magnitude_slot() {
    let (_temp, base) = setup_temp_hash();
    let mut index = HashIndex::create(&base, 4).unwrap();

    insert_all(&mut index, [-7, 7, -100, 100, 0]);

    for id in [-7, 7, -100, 100, 0] {
        assert_eq!(index.search(id).unwrap(), position_of(id));
    }
    index.verify().unwrap();
}

#[test]
fn test_delete_never_shrinks_directory() {
    let (_temp, base) = setup_temp_hash();
    let mut index = HashIndex::create(&base, 2).unwrap();
    insert_all(&mut index, 1..=64);
    let depth = index.global_depth();
    let buckets = index.verify().unwrap().buckets;

    for id in 1..=64 {
        index.delete(id).unwrap();
    }

    let stats = index.verify().unwrap();
    assert_eq!(stats.global_depth, depth);
    assert_eq!(stats.buckets, buckets);
    assert_eq!(stats.entries, 0);
}

// =============================================================================
// Persistence Tests
// =============================================================================

#[test]
fn test_reopen_preserves_directory_and_entries() {
    let (_temp, base) = setup_temp_hash();
    let depth = {
        let mut index = HashIndex::create(&base, 3).unwrap();
        insert_all(&mut index, 1..=100);
        index.delete(50).unwrap();
        index.sync().unwrap();
        index.global_depth()
    };

    let mut index = HashIndex::open(&base).unwrap();
    assert_eq!(index.global_depth(), depth);
    assert_eq!(index.bucket_capacity(), 3);
    assert_eq!(index.verify().unwrap().entries, 99);
    assert_eq!(index.search(99).unwrap(), position_of(99));
    assert!(index.search(50).unwrap_err().is_not_found());

    // And keeps growing after reopen
    insert_all(&mut index, 101..=200);
    assert_eq!(index.verify().unwrap().entries, 199);
}

#[test]
fn test_open_or_create_uses_stored_capacity() {
    let (_temp, base) = setup_temp_hash();
    {
        let mut index = HashIndex::open_or_create(&base, 6).unwrap();
        index.insert(1, 10).unwrap();
    }

    let mut index = HashIndex::open_or_create(&base, 2).unwrap();
    assert_eq!(index.bucket_capacity(), 6);
    assert_eq!(index.search(1).unwrap(), 10);
}

#[test]
fn test_open_missing_files() {
    let (_temp, base) = setup_temp_hash();
    assert!(matches!(HashIndex::open(&base), Err(StoreError::Io(_))));
}

// =============================================================================
// Configuration / Lifecycle Tests
// =============================================================================

#[test]
fn test_invalid_capacity() {
    let (_temp, base) = setup_temp_hash();

    for capacity in [0, i16::MAX as usize + 1] {
        assert!(
            matches!(
                HashIndex::create(&base, capacity),
                Err(StoreError::InvalidConfiguration(_))
            ),
            "capacity {}",
            capacity
        );
    }
}

#[test]
fn test_files_and_destruct() {
    let (_temp, base) = setup_temp_hash();
    let mut index = HashIndex::create(&base, 2).unwrap();
    insert_all(&mut index, 1..=5);

    let files = index.files();
    assert_eq!(files.len(), 3);
    assert_eq!(files.to_vec(), HashIndex::paths(&base).to_vec());
    assert!(files.iter().all(|p| p.exists()));
    assert!(files[0].to_string_lossy().ends_with("tracks.hash.meta"));

    index.destruct().unwrap();
    assert!(files.iter().all(|p| !p.exists()));
    index.destruct().unwrap();
}
