//! Plain text report of how far the estimated trajectory ends from the marker trajectory.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use log::info;
use nalgebra::{Matrix3, Matrix4, Rotation3, UnitQuaternion, Vector3};

use crate::{
    algorithms::rigid::transform_point,
    error::{Error, Result},
    slam::{
        frame::{AnswerState, KeyFrame},
        options::TrackingOptions,
        trajectory::{accumulate, global_poses, MatrixSource},
    },
};

/// Rotation angles below this have no meaningful axis
const AXIS_EPSILON: f64 = 1e-6;

/// `<data_dir>/Result`
pub fn report_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("Result")
}

/// `<data_dir>/Result/<timestamp>_<strategy>.txt`
pub fn report_path(data_dir: &Path, timestamp: u64, strategy: &str) -> PathBuf {
    report_dir(data_dir).join(format!("{timestamp}_{strategy}.txt"))
}

/// Where the composed ground truth pose of the last frame came from
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReferencePose {
    /// Product of the marker answers, every frame had one
    Markers(Matrix4<f64>),
    /// Direct registration of the last frame onto the first
    Registration(Matrix4<f64>),
    /// Nothing usable, the error is measured against the identity
    Unavailable,
}

impl ReferencePose {
    pub fn matrix(&self) -> Matrix4<f64> {
        match self {
            ReferencePose::Markers(m) | ReferencePose::Registration(m) => *m,
            ReferencePose::Unavailable => Matrix4::identity(),
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            ReferencePose::Markers(_) => "Reference : composed marker answers",
            ReferencePose::Registration(_) => "Reference : registration of the last frame onto the first",
            ReferencePose::Unavailable => "Reference : unavailable, compared against identity",
        }
    }
}

/// Whether every frame after the first carries a marker answer.
pub fn answers_complete(keyframes: &[KeyFrame]) -> bool {
    keyframes.len() > 1
        && keyframes[1..]
            .iter()
            .all(|k| k.answer_state == AnswerState::Estimated)
}

/// Rigid difference between two poses broken down for reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ErrorSummary {
    /// `(w, x, y, z)` with a non-negative `w`
    pub quaternion: [f64; 4],
    pub translation: Vector3<f64>,
    pub distance: f64,
    /// Zero when there is no rotation
    pub axis: Vector3<f64>,
    pub degrees: f64,
}

impl ErrorSummary {
    pub fn from_matrix(matrix: &Matrix4<f64>) -> Self {
        let rotation: Matrix3<f64> = matrix.fixed_slice::<3, 3>(0, 0).clone_owned();
        let translation: Vector3<f64> = matrix.fixed_slice::<3, 1>(0, 3).clone_owned();

        let mut q = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix(&rotation))
            .into_inner();
        if q.w < 0.0 {
            q = -q;
        }

        let radians = 2.0 * q.w.clamp(-1.0, 1.0).acos();
        let half_sin = (0.5 * radians).sin();
        let axis = if half_sin.abs() > AXIS_EPSILON {
            Vector3::new(q.i, q.j, q.k) / half_sin
        } else {
            Vector3::zeros()
        };

        Self {
            quaternion: [q.w, q.i, q.j, q.k],
            translation,
            distance: translation.norm(),
            axis,
            degrees: radians.to_degrees(),
        }
    }
}

/// Error of the last frame, `inverse(reference) * estimate`.
pub fn final_error(keyframes: &[KeyFrame], reference: &ReferencePose) -> ErrorSummary {
    let estimate = accumulate(keyframes.iter().map(|k| k.alignment_matrix));
    let inverse = reference.matrix().try_inverse().unwrap_or_else(Matrix4::identity);
    ErrorSummary::from_matrix(&(inverse * estimate))
}

/// Render the report text.
pub fn render(
    options: &TrackingOptions,
    keyframes: &[KeyFrame],
    reference: &ReferencePose,
    per_frame: bool,
) -> String {
    let error = final_error(keyframes, reference);
    let [w, x, y, z] = error.quaternion;
    let mut out = String::new();

    // writing into a String cannot fail
    let _ = writeln!(
        out,
        "Current tracker type : {} ({})",
        options.tracking_type.name().unwrap_or("Unknown"),
        options.tracking_type.index()
    );
    let _ = writeln!(out, "{}", options.output());
    let _ = writeln!(out, "{}", reference.describe());
    let _ = writeln!(out, "Rotation by Quaternion (t; x y z) :{w} {x} {y} {z}");
    let t = error.translation;
    let _ = writeln!(out, "Translation Vector : {} {} {}", t.x, t.y, t.z);
    let _ = writeln!(out, "Distance           : {}", error.distance);
    let a = error.axis;
    let _ = writeln!(out, "Rotation Axis      : {}, {}, {}", a.x, a.y, a.z);
    let _ = writeln!(out, "Rotation Degree    : {}", error.degrees);

    if per_frame {
        out.push('\n');
        out.push_str(&per_frame_table(keyframes));
    }

    out
}

/// Experimental per-frame comparison of estimated and marker camera positions and viewing directions.
pub fn per_frame_table(keyframes: &[KeyFrame]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "CAUTION: The look at point has been translated to the origin.");
    let _ = writeln!(
        out,
        "Position X (estimation),Position Y (estimation),Position Z (estimation),\
         Position X (marker),Position Y (marker),Position Z (marker),\
         Translation Error,\
         LookatPoint X (estimation),LookatPoint Y (estimation),LookatPoint Z (estimation),\
         LookatPoint X (marker),LookatPoint Y (marker),LookatPoint Z (marker),\
         Rotation Error"
    );

    let estimated = global_poses(keyframes, MatrixSource::Estimation);
    let answers = global_poses(keyframes, MatrixSource::Answer);
    let forward = Vector3::z();

    for ((keyframe, estimate), answer) in keyframes.iter().zip(&estimated).zip(&answers) {
        let position_estimate = transform_point(estimate, &Vector3::zeros());
        let position_marker = transform_point(answer, &Vector3::zeros());
        let lookat_estimate = transform_point(estimate, &forward) - position_estimate;
        let lookat_marker = transform_point(answer, &forward) - position_marker;

        let (translation_error, rotation_error) = if keyframe.used {
            (
                (position_estimate - position_marker).norm(),
                lookat_estimate.angle(&lookat_marker),
            )
        } else {
            (0.0, 0.0)
        };

        let _ = writeln!(
            out,
            "{},{},{},{},{},{},{},{},{},{},{},{},{},{}",
            position_estimate.x,
            position_estimate.y,
            position_estimate.z,
            position_marker.x,
            position_marker.y,
            position_marker.z,
            translation_error,
            lookat_estimate.x,
            lookat_estimate.y,
            lookat_estimate.z,
            lookat_marker.x,
            lookat_marker.y,
            lookat_marker.z,
            rotation_error
        );
    }

    out
}

/// Write the report, creating the result directory on demand.
pub fn write_report(
    path: &Path,
    options: &TrackingOptions,
    keyframes: &[KeyFrame],
    reference: &ReferencePose,
    per_frame: bool,
) -> Result<()> {
    if options.tracking_type.name().is_none() {
        return Err(Error::Report {
            path: path.to_path_buf(),
            reason: "no result to be written for an unknown tracking type".into(),
        });
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, render(options, keyframes, reference, per_frame))?;

    info!("wrote result report to {}", path.display());
    Ok(())
}
