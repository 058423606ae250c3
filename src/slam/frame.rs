use std::sync::{Arc, Weak};

use image::{ImageBuffer, Rgb, RgbImage};
use nalgebra::{Matrix4, Vector3};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Per-pixel 3D points in the sensor frame, three `f32` channels (x, y, z) in meters.
pub type PointImage = ImageBuffer<Rgb<f32>, Vec<f32>>;

/// Availability of the marker derived ground truth of a frame
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnswerState {
    #[default]
    NotComputed,
    /// First frame of the sequence, its answer is the identity by definition
    Reference,
    Estimated,
    /// No common markers with the previous frame or the marker registration failed
    Missing,
}

/// One RGB-D capture of the sequence.
#[derive(Clone)]
pub struct KeyFrame {
    pub id: usize,
    pub color_image: RgbImage,
    pub point_image: PointImage,
    /// Maps this frame's coordinates into the previous frame's coordinates
    pub alignment_matrix: Matrix4<f64>,
    /// Same role as `alignment_matrix` but derived from fiducial markers
    pub answer_alignment_matrix: Matrix4<f64>,
    /// Whether the tracking strategy selected this frame for the trajectory
    pub used: bool,
    pub answer_state: AnswerState,
}

impl KeyFrame {
    pub fn new(id: usize, color_image: RgbImage, point_image: PointImage) -> Self {
        Self {
            id,
            color_image,
            point_image,
            alignment_matrix: Matrix4::identity(),
            answer_alignment_matrix: Matrix4::identity(),
            used: false,
            answer_state: AnswerState::NotComputed,
        }
    }

    /// 3D point stored at a point image pixel, `None` for missing depth.
    pub fn point_at(&self, x: u32, y: u32) -> Option<Vector3<f64>> {
        if x >= self.point_image.width() || y >= self.point_image.height() {
            return None;
        }

        let [px, py, pz] = self.point_image.get_pixel(x, y).0;
        let point = Vector3::new(px as f64, py as f64, pz as f64);

        (point.iter().all(|v| v.is_finite()) && point != Vector3::zeros()).then_some(point)
    }

    /// Drop any computed alignment, leaving the frame unselected
    pub fn reset_alignment(&mut self) {
        self.alignment_matrix = Matrix4::identity();
        self.used = false;
    }
}

pub type KeyFrames = Vec<KeyFrame>;

/// Keyframe store shared between the engine and any display path.
pub type SharedKeyFrames = Arc<RwLock<KeyFrames>>;

/// Non-owning handle onto the keyframe store.
pub type KeyFramesHandle = Weak<RwLock<KeyFrames>>;

pub fn shared(keyframes: KeyFrames) -> SharedKeyFrames {
    Arc::new(RwLock::new(keyframes))
}
