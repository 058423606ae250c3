//! Synthetic keyframe sequences and helpers for the scenario tests.

#![allow(dead_code)]

use std::sync::Arc;

use image::{Rgb, RgbImage};
use nalgebra::{Matrix4, Rotation3, Vector2, Vector3};
use parking_lot::Mutex;
use rand::{rngs::StdRng, Rng, SeedableRng};
use rgbd_tracker::{
    algorithms::rigid::transform_point, shared, ComputerConfig, ComputerEvent, KeyFrame, Marker, PointImage, SharedKeyFrames,
    SlamComputer, TrackingOptions,
};

pub const SIZE: u32 = 64;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn texture() -> RgbImage {
    let mut rng = StdRng::seed_from_u64(11);
    RgbImage::from_fn(SIZE, SIZE, |_, _| {
        let v: u8 = rng.gen();
        Rgb([v, v, v])
    })
}

/// Scene point seen at pixel `(x, y)` of frame 0
fn base_point(x: u32, y: u32) -> Vector3<f64> {
    let bump = ((x * 7 + y * 13) % 11) as f64 * 0.01;
    Vector3::new(x as f64 * 0.01, y as f64 * 0.01, 1.0 + bump)
}

fn tagged(k: usize, color: &RgbImage, points: PointImage) -> KeyFrame {
    let mut image = color.clone();
    image.put_pixel(0, 0, Rgb([k as u8, 0, 0]));
    KeyFrame::new(k, image, points)
}

/// Frames sharing one texture, frame `k` observed from `k * step` further along.
///
/// The alignment of every frame onto its predecessor is a pure translation by `step`.
/// Pixel (0, 0) carries the frame index in its red channel.
pub fn moving_frames(count: usize, step: [f32; 3]) -> Vec<KeyFrame> {
    let color = texture();
    (0..count)
        .map(|k| {
            let offset = k as f32;
            let points = PointImage::from_fn(SIZE, SIZE, |x, y| {
                let p = base_point(x, y).cast::<f32>();
                Rgb([
                    p.x - offset * step[0],
                    p.y - offset * step[1],
                    p.z - offset * step[2],
                ])
            });
            tagged(k, &color, points)
        })
        .collect()
}

/// Pose of frame `k` in frame 0, a yaw of `k * yaw_degrees` about the vertical axis
/// behind a drift growing with `k`. Successive poses do not commute.
pub fn yawing_pose(k: usize, yaw_degrees: f64) -> Matrix4<f64> {
    let k = k as f64;
    let rotation = Rotation3::from_axis_angle(&Vector3::y_axis(), (k * yaw_degrees).to_radians());
    Matrix4::new_translation(&Vector3::new(0.01 * k, 0.002 * k, 0.003 * k * k))
        * rotation.to_homogeneous()
}

/// Frames sharing one texture, frame `k` observed from `poses[k]`.
///
/// The alignment of frame `k` onto frame `j` is `poses[j]^-1 * poses[k]`.
pub fn posed_frames(poses: &[Matrix4<f64>]) -> Vec<KeyFrame> {
    let color = texture();
    poses
        .iter()
        .enumerate()
        .map(|(k, pose)| {
            let world_to_frame = pose.try_inverse().unwrap();
            let points = PointImage::from_fn(SIZE, SIZE, |x, y| {
                let p = transform_point(&world_to_frame, &base_point(x, y));
                Rgb([p.x as f32, p.y as f32, p.z as f32])
            });
            tagged(k, &color, points)
        })
        .collect()
}

pub fn store(count: usize, step: [f32; 3]) -> SharedKeyFrames {
    shared(moving_frames(count, step))
}

/// Computer writing below a fresh temporary data directory.
pub fn computer(store: &SharedKeyFrames, options: TrackingOptions) -> (SlamComputer, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let config = ComputerConfig {
        data_dir: dir.path().join("living_room"),
        tracking: options,
        ..Default::default()
    };
    (SlamComputer::new(store, config), dir)
}

/// Every event the computer emits, in order.
pub fn record_events(computer: &mut SlamComputer) -> Arc<Mutex<Vec<ComputerEvent>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    computer.subscribe(move |event| sink.lock().push(event.clone()));
    events
}

pub fn progress_values(events: &[ComputerEvent]) -> Vec<usize> {
    events
        .iter()
        .filter_map(|event| match event {
            ComputerEvent::Progress(value) => Some(*value),
            _ => None,
        })
        .collect()
}

pub fn square_marker(id: u32, x: f32, y: f32) -> Marker {
    Marker {
        id,
        corners: [
            Vector2::new(x, y),
            Vector2::new(x + 6.0, y),
            Vector2::new(x + 6.0, y + 6.0),
            Vector2::new(x, y + 6.0),
        ],
    }
}

/// Index tagged into pixel (0, 0) by [`moving_frames`]
pub fn frame_tag(image: &RgbImage) -> u8 {
    image.get_pixel(0, 0).0[0]
}

pub fn translation_of(matrix: &nalgebra::Matrix4<f64>) -> Vector3<f64> {
    matrix.fixed_slice::<3, 1>(0, 3).clone_owned()
}
