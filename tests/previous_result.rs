//! Replaying cached results onto a fresh keyframe store.

mod common;

use std::fs;

use rgbd_tracker::{
    io::cache::{self, CacheError},
    ComputeOutcome, Error, FixedFrameCountOptions, KeyFrame, TrackingOptions, TrackingType,
};

use common::{computer, init_logging, moving_frames, store};

fn snapshot(keyframes: &[KeyFrame]) -> Vec<(usize, bool, nalgebra::Matrix4<f64>)> {
    keyframes
        .iter()
        .map(|k| (k.id, k.used, k.alignment_matrix))
        .collect()
}

#[test]
fn replay_is_idempotent() {
    init_logging();
    let store = store(5, [0.02, 0.0, 0.0]);
    let (mut computer, _dir) = computer(&store, TrackingOptions::one_by_one(Default::default()));

    assert!(!computer.check_previous_result().unwrap());

    let cache_path = match computer.start_compute().unwrap() {
        ComputeOutcome::Completed(run) => run.cache_path.unwrap(),
        other => panic!("unexpected outcome {other:?}"),
    };
    let computed = snapshot(&store.read());

    assert!(computer.check_previous_result().unwrap());
    assert_eq!(computer.previous_results().unwrap(), vec![cache_path.clone()]);

    // fresh frames and different options, the cache brings both back
    *store.write() = moving_frames(5, [0.02, 0.0, 0.0]);
    computer.set_options(TrackingOptions::fixed_frame_count(FixedFrameCountOptions::default()));
    computer.set_converter_choice(1);

    assert_eq!(computer.use_previous_result(&cache_path).unwrap(), 5);
    let first = snapshot(&store.read());
    assert_eq!(first, computed);
    assert_eq!(computer.options().tracking_type, TrackingType::OneByOne);
    assert_eq!(computer.converter_choice(), 0);

    assert_eq!(computer.use_previous_result(&cache_path).unwrap(), 5);
    assert_eq!(snapshot(&store.read()), first);
}

#[test]
fn shorter_store_skips_extra_entries() {
    init_logging();
    let store = store(4, [0.02, 0.0, 0.0]);
    let (mut computer, _dir) = computer(&store, TrackingOptions::one_by_one(Default::default()));

    let cache_path = match computer.start_compute().unwrap() {
        ComputeOutcome::Completed(run) => run.cache_path.unwrap(),
        other => panic!("unexpected outcome {other:?}"),
    };

    *store.write() = moving_frames(2, [0.02, 0.0, 0.0]);
    assert_eq!(computer.use_previous_result(&cache_path).unwrap(), 2);
    assert!(store.read()[1].used);
}

#[test]
fn damaged_cache_is_reported() {
    init_logging();
    let store = store(3, [0.02, 0.0, 0.0]);
    let (mut computer, dir) = computer(&store, TrackingOptions::one_by_one(Default::default()));

    let missing = dir.path().join("absent.cache");
    assert!(matches!(
        computer.use_previous_result(&missing),
        Err(Error::Cache(CacheError::Missing(_)))
    ));

    let empty = dir.path().join("empty.cache");
    fs::write(&empty, b"").unwrap();
    assert!(matches!(
        computer.use_previous_result(&empty),
        Err(Error::Cache(CacheError::Truncated(_)))
    ));

    let plain = dir.path().join("plain.cache");
    fs::write(&plain, b"not compressed at all").unwrap();
    assert!(matches!(
        computer.use_previous_result(&plain),
        Err(Error::Cache(CacheError::Compression(_)))
    ));

    // nothing was applied
    assert!(store.read().iter().all(|k| !k.used));
    assert!(cache::load(&plain).is_err());
}
