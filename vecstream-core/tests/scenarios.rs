//! End-to-end scenarios exercising `Collection`/`CollectionManager` through
//! their public surface only.

use serde_json::json;
use vecstream_core::{Collection, CollectionManager, HnswParams, MetadataFilter};

fn collection(dir: &std::path::Path, m: usize, seed: u64) -> Collection {
    Collection::create(dir, "scenario", HnswParams::new(m, seed)).unwrap()
}

#[test]
fn basic_cosine_ordering() {
    let dir = tempfile::tempdir().unwrap();
    let c = collection(dir.path(), 8, 1);
    c.add_vector("a", vec![1.0, 0.0, 0.0], None).unwrap();
    c.add_vector("b", vec![0.0, 1.0, 0.0], None).unwrap();
    c.add_vector("c", vec![0.9, 0.1, 0.0], None).unwrap();

    let results = c.search_similar(&[1.0, 0.0, 0.0], 3, None, None, None).unwrap();
    let ids: Vec<&str> = results.iter().map(|(id, _)| id.as_str()).collect();
    assert_eq!(ids, vec!["a", "c", "b"]);
    assert!((results[0].1 - 1.0).abs() < 1e-5);
    assert!((results[1].1 - 0.9939).abs() < 1e-3);
    assert!((results[2].1 - 0.0).abs() < 1e-5);
}

#[test]
fn dimension_enforcement() {
    let dir = tempfile::tempdir().unwrap();
    let c = collection(dir.path(), 8, 1);
    c.add_vector("x", vec![1.0, 2.0, 3.0, 4.0], None).unwrap();
    let err = c.add_vector("y", vec![1.0, 2.0, 3.0], None).unwrap_err();
    assert!(matches!(
        err,
        vecstream_core::Error::DimensionMismatch { expected: 4, actual: 3 }
    ));
    assert_eq!(c.stats().count, 1);
}

#[test]
fn metadata_filter() {
    let dir = tempfile::tempdir().unwrap();
    let c = collection(dir.path(), 8, 1);
    c.add_vector("a", vec![1.0, 0.0], Some(json!({"cat": "ai", "year": 2023}))).unwrap();
    c.add_vector("b", vec![1.0, 0.0], Some(json!({"cat": "ai", "year": 2022}))).unwrap();
    c.add_vector("c", vec![1.0, 0.0], Some(json!({"cat": "bio", "year": 2023}))).unwrap();

    let filter = MetadataFilter::new().with("cat", json!("ai")).with("year", json!(2023));
    let results = c.search_similar(&[1.0, 0.0], 5, None, Some(&filter), None).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].0, "a");
    assert!((0.0..=1.0).contains(&results[0].1));
}

#[test]
fn remove_and_entry_point_replacement() {
    let dir = tempfile::tempdir().unwrap();
    let c = collection(dir.path(), 12, 7);
    for i in 0..100 {
        let v = vec![(i % 31) as f32, (i % 37) as f32, (i % 41) as f32];
        c.add_vector(format!("id{i}"), v, None).unwrap();
    }

    // Force a known removal target: the entry point is internal to the
    // index, so drive this through a lot of removals to ensure at least
    // one exercises the replacement path, then check invariants hold.
    for i in 0..10 {
        c.remove_vector(&format!("id{i}")).unwrap();
    }
    assert_eq!(c.stats().count, 90);
    let results = c.search_similar(&[1.0, 2.0, 3.0], 5, None, None, None).unwrap();
    assert_eq!(results.len(), 5);
    for (id, sim) in &results {
        assert!(c.get_vector(id).is_ok());
        assert!((-1.0..=1.0).contains(sim));
    }
}

#[test]
fn persistence_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("store");
    let manager = CollectionManager::new(&root).unwrap();
    let c = manager.create_collection("docs", Some(HnswParams::new(10, 55))).unwrap();

    let mut rng_state: u64 = 0xC0FFEE;
    let mut next = || {
        rng_state = rng_state.wrapping_mul(6364136223846793005).wrapping_add(1);
        ((rng_state >> 33) as f32) / (u32::MAX as f32)
    };

    for i in 0..500 {
        let v: Vec<f32> = (0..16).map(|_| next()).collect();
        c.add_vector(format!("v{i}"), v, Some(json!({"i": i}))).unwrap();
    }
    c.save().unwrap();

    let q: Vec<f32> = (0..16).map(|_| next()).collect();
    let before = c.search_similar(&q, 10, None, None, None).unwrap();

    let manager2 = CollectionManager::new(&root).unwrap();
    let reopened = manager2.get_collection("docs").unwrap();
    assert_eq!(reopened.stats().count, 500);
    for i in 0..500 {
        assert_eq!(reopened.get_vector(&format!("v{i}")).unwrap(), c.get_vector(&format!("v{i}")).unwrap());
    }
    let after = reopened.search_similar(&q, 10, None, None, None).unwrap();
    assert_eq!(before[0].0, after[0].0);
}

#[test]
fn filter_oversample_fallback_returns_exact_match_count() {
    let dir = tempfile::tempdir().unwrap();
    let c = collection(dir.path(), 8, 3);
    for i in 0..1000 {
        let meta = if i < 3 { json!({"rare": true}) } else { json!({"rare": false}) };
        let v = vec![(i % 53) as f32, (i % 59) as f32];
        c.add_vector(format!("id{i}"), v, Some(meta)).unwrap();
    }
    let filter = MetadataFilter::new().with("rare", json!(true));
    let results = c.search_similar(&[1.0, 1.0], 5, None, Some(&filter), None).unwrap();
    assert_eq!(results.len(), 3);
    let ids: std::collections::HashSet<&str> = results.iter().map(|(id, _)| id.as_str()).collect();
    assert_eq!(ids, ["id0", "id1", "id2"].into_iter().collect());
}
