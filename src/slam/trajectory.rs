//! Global poses composed from per-frame alignments, for renderers and reports.

use nalgebra::{Matrix4, Vector3};

use crate::algorithms::rigid::transform_point;
use crate::slam::frame::KeyFrame;

/// Which per-frame matrix a trajectory is built from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatrixSource {
    Estimation,
    Answer,
}

impl MatrixSource {
    pub fn matrix_of(&self, keyframe: &KeyFrame) -> Matrix4<f64> {
        match self {
            MatrixSource::Estimation => keyframe.alignment_matrix,
            MatrixSource::Answer => keyframe.answer_alignment_matrix,
        }
    }
}

/// Left to right product `M_0 * M_1 * ... * M_n`.
pub fn accumulate<I>(matrices: I) -> Matrix4<f64>
where
    I: IntoIterator<Item = Matrix4<f64>>,
{
    matrices
        .into_iter()
        .fold(Matrix4::identity(), |accumulated, matrix| accumulated * matrix)
}

/// Pose of every frame in the coordinates of the first one.
pub fn global_poses(keyframes: &[KeyFrame], source: MatrixSource) -> Vec<Matrix4<f64>> {
    keyframes
        .iter()
        .scan(Matrix4::identity(), |accumulated, keyframe| {
            *accumulated *= source.matrix_of(keyframe);
            Some(*accumulated)
        })
        .collect()
}

/// Line between the camera origins of two consecutive frames
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrajectorySegment {
    pub from: usize,
    pub to: usize,
    pub start: Vector3<f64>,
    pub end: Vector3<f64>,
}

pub fn trajectory_segments(keyframes: &[KeyFrame], source: MatrixSource) -> Vec<TrajectorySegment> {
    let origins: Vec<Vector3<f64>> = global_poses(keyframes, source)
        .iter()
        .map(|pose| transform_point(pose, &Vector3::zeros()))
        .collect();

    keyframes
        .windows(2)
        .zip(origins.windows(2))
        .map(|(frames, points)| TrajectorySegment {
            from: frames[0].id,
            to: frames[1].id,
            start: points[0],
            end: points[1],
        })
        .collect()
}
