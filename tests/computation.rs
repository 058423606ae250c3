//! End to end runs of the tracking strategies through the computer.

mod common;

use std::fs;

use approx::assert_relative_eq;
use nalgebra::{Matrix4, Vector3};
use rgbd_tracker::{
    io::{cache, report},
    slam::trajectory::{accumulate, global_poses},
    ComputeOutcome, ComputeState, ComputerEvent, Error, FixedFrameCountOptions, MatrixSource,
    PcaKeyFrameOptions, TrackingOptions,
};

use common::{computer, init_logging, progress_values, record_events, store, translation_of};

#[test]
fn five_frames_one_by_one() {
    init_logging();
    let store = store(5, [0.02, 0.0, 0.0]);
    let (mut computer, dir) = computer(&store, TrackingOptions::one_by_one(Default::default()));
    let events = record_events(&mut computer);

    let summary = match computer.start_compute().unwrap() {
        ComputeOutcome::Completed(summary) => summary,
        other => panic!("unexpected outcome {other:?}"),
    };

    assert_eq!(summary.steps, 4);
    assert_eq!(summary.frames, 5);
    assert!(summary.failed_frames.is_empty());
    assert_eq!(computer.state(), ComputeState::Completed);

    let events = events.lock();
    assert!(events.contains(&ComputerEvent::ProgressRange { start: 1, end: 4 }));
    assert_eq!(progress_values(&events), vec![1, 2, 3, 4]);

    for keyframe in store.read().iter().skip(1) {
        assert!(keyframe.used);
        assert_relative_eq!(
            translation_of(&keyframe.alignment_matrix),
            Vector3::new(0.02, 0.0, 0.0),
            epsilon = 1e-4
        );
    }

    let composed = accumulate(store.read().iter().map(|k| k.alignment_matrix));
    assert_relative_eq!(translation_of(&composed), Vector3::new(0.08, 0.0, 0.0), epsilon = 1e-3);

    // the report falls back to registering the last frame onto the first
    let report_path = summary.report_path.unwrap();
    assert!(report_path.starts_with(report::report_dir(&dir.path().join("living_room"))));
    let text = fs::read_to_string(&report_path).unwrap();
    assert!(text.starts_with("Current tracker type : OneByOne (0)"));
    assert!(text.contains("registration of the last frame onto the first"));

    let cache_path = summary.cache_path.unwrap();
    let file_name = cache_path.file_name().unwrap().to_str().unwrap();
    assert!(file_name.starts_with("living_room_"));
    assert!(file_name.ends_with("_OneByOne.cache"));

    let record = cache::load(&cache_path).unwrap();
    assert_eq!(record.indices, vec![0, 1, 2, 3, 4]);
    assert_eq!(record.data_set_name, "living_room");
    assert_eq!(record.used_status, vec![true; 5]);
}

#[test]
fn stop_after_two_pairs() {
    init_logging();
    let store = store(5, [0.02, 0.0, 0.0]);
    let (mut computer, _dir) = computer(&store, TrackingOptions::one_by_one(Default::default()));

    let handle = computer.stop_handle();
    computer.subscribe(move |event| {
        if *event == ComputerEvent::Progress(2) {
            handle.stop();
        }
    });

    let summary = match computer.start_compute().unwrap() {
        ComputeOutcome::Stopped(summary) => summary,
        other => panic!("unexpected outcome {other:?}"),
    };
    assert_eq!(summary.steps, 2);
    assert!(summary.cache_path.is_none());
    assert!(summary.report_path.is_none());
    assert_eq!(computer.state(), ComputeState::Stopped);

    let keyframes = store.read();
    for keyframe in &keyframes[..3] {
        assert!(keyframe.used);
    }
    assert_ne!(keyframes[2].alignment_matrix, Matrix4::identity());
    for keyframe in &keyframes[3..] {
        assert!(!keyframe.used);
        assert_eq!(keyframe.alignment_matrix, Matrix4::identity());
    }
    drop(keyframes);

    assert!(computer.previous_results().unwrap().is_empty());
}

#[test]
fn stop_during_the_last_pair_still_completes() {
    init_logging();
    let store = store(5, [0.02, 0.0, 0.0]);
    let (mut computer, _dir) = computer(&store, TrackingOptions::one_by_one(Default::default()));

    let handle = computer.stop_handle();
    computer.subscribe(move |event| {
        if *event == ComputerEvent::Progress(4) {
            handle.stop();
        }
    });

    let summary = match computer.start_compute().unwrap() {
        ComputeOutcome::Completed(summary) => summary,
        other => panic!("unexpected outcome {other:?}"),
    };
    assert_eq!(summary.steps, 4);
    assert!(summary.cache_path.unwrap().exists());
    assert!(summary.report_path.unwrap().exists());
    assert_eq!(computer.state(), ComputeState::Completed);
}

#[test]
fn fixed_frame_count_moves_at_representatives() {
    init_logging();
    let store = store(7, [0.01, 0.0, 0.0]);
    let options = TrackingOptions::fixed_frame_count(FixedFrameCountOptions {
        frame_count: 3,
        ..Default::default()
    });
    let (mut computer, _dir) = computer(&store, options);
    let events = record_events(&mut computer);

    assert!(matches!(computer.start_compute().unwrap(), ComputeOutcome::Completed(_)));
    assert_eq!(progress_values(&events.lock()), vec![3, 6]);

    let keyframes = store.read();
    let used: Vec<usize> = keyframes.iter().filter(|k| k.used).map(|k| k.id).collect();
    assert_eq!(used, vec![0, 3, 6]);

    // unused frames contribute identity, the chain still reaches the last frame
    let poses = global_poses(&keyframes, MatrixSource::Estimation);
    assert_relative_eq!(translation_of(&poses[6]), Vector3::new(0.06, 0.0, 0.0), epsilon = 1e-3);
    assert_eq!(poses[1], poses[0]);
}

#[test]
fn pca_keyframes_cover_the_sequence() {
    init_logging();
    let store = store(6, [0.0, 0.0, 0.01]);
    let options = TrackingOptions::pca_keyframe(PcaKeyFrameOptions {
        grid_size: 4,
        change_threshold: 1.0,
        max_frame_interval: 3,
        ..Default::default()
    });
    let (mut computer, _dir) = computer(&store, options);
    let events = record_events(&mut computer);

    let summary = match computer.start_compute().unwrap() {
        ComputeOutcome::Completed(summary) => summary,
        other => panic!("unexpected outcome {other:?}"),
    };
    assert_eq!(summary.strategy, "PcaKeyFrame");

    let progress = progress_values(&events.lock());
    assert_eq!(progress.last(), Some(&5));
    assert!(progress.windows(2).all(|w| w[0] < w[1]));
    assert!(progress.windows(2).all(|w| w[1] - w[0] <= 3));

    let composed = accumulate(store.read().iter().map(|k| k.alignment_matrix));
    assert_relative_eq!(translation_of(&composed), Vector3::new(0.0, 0.0, 0.05), epsilon = 1e-3);
}

#[test]
fn unknown_strategy_is_rejected() {
    init_logging();
    let store = store(3, [0.01, 0.0, 0.0]);
    let (mut computer, dir) = computer(&store, TrackingOptions::default());

    assert!(matches!(computer.start_compute(), Err(Error::Configuration(_))));
    assert_eq!(computer.state(), ComputeState::Failed);
    assert!(!dir.path().join("living_room").exists());
}

#[test]
fn single_frame_is_skipped() {
    init_logging();
    let store = store(1, [0.0; 3]);
    let (mut computer, _dir) = computer(&store, TrackingOptions::one_by_one(Default::default()));
    let events = record_events(&mut computer);

    assert!(matches!(computer.start_compute().unwrap(), ComputeOutcome::Skipped(_)));
    assert_eq!(computer.state(), ComputeState::Idle);
    assert!(progress_values(&events.lock()).is_empty());
    assert!(computer.start_generate_answer().unwrap().is_none());
}

#[test]
fn dropped_store_is_a_no_op() {
    init_logging();
    let store = store(3, [0.01, 0.0, 0.0]);
    let (mut computer, _dir) = computer(&store, TrackingOptions::one_by_one(Default::default()));
    let events = record_events(&mut computer);
    drop(store);

    assert!(matches!(computer.start_compute().unwrap(), ComputeOutcome::Skipped(_)));
    assert!(computer.start_generate_answer().unwrap().is_none());
    assert!(matches!(
        computer.use_previous_result(std::path::Path::new("missing.cache")),
        Err(Error::StoreUnavailable)
    ));
    assert!(computer.trajectory(MatrixSource::Estimation).is_empty());
    assert!(events
        .lock()
        .iter()
        .any(|e| matches!(e, ComputerEvent::Message(_))));
}

#[test]
fn events_reach_channel_subscribers() {
    init_logging();
    let store = store(3, [0.01, 0.0, 0.0]);
    let (mut computer, _dir) = computer(&store, TrackingOptions::one_by_one(Default::default()));
    let (tx, rx) = crossbeam_channel::bounded(64);
    computer.subscribe_channel(tx);

    computer.start_compute().unwrap();

    let events: Vec<ComputerEvent> = rx.try_iter().collect();
    assert_eq!(events.first(), Some(&ComputerEvent::Message("Computation begins...".into())));
    assert_eq!(progress_values(&events), vec![1, 2]);

    let segments = computer.trajectory(MatrixSource::Estimation);
    assert_eq!(segments.len(), 2);
    assert_relative_eq!(segments[1].end, Vector3::new(0.02, 0.0, 0.0), epsilon = 1e-3);
}
