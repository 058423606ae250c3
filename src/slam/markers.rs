//! Ground truth alignment from fiducial markers seen in consecutive frames.

use std::collections::HashMap;

use image::RgbImage;
use log::{debug, info, warn};
use nalgebra::{Matrix4, Vector2, Vector3};

use crate::{
    algorithms::transformation::TransformationEstimator,
    error::{Error, Result},
    slam::{
        converter::Converter,
        frame::{AnswerState, KeyFrame, SharedKeyFrames},
        notifier::Notifier,
        options::OneByOneOptions,
    },
};

/// Refinement rounds used for marker registrations
pub const ANSWER_MAX_ITERATIONS: usize = 100;

/// A detected fiducial marker.
#[derive(Debug, Clone, PartialEq)]
pub struct Marker {
    pub id: u32,
    /// Corner pixels in detection order
    pub corners: [Vector2<f32>; 4],
}

/// Capability locating fiducial markers in a color image.
pub trait MarkerDetector: Send + Sync {
    fn detect(&self, image: &RgbImage) -> Vec<Marker>;
}

impl<F> MarkerDetector for F
where
    F: Fn(&RgbImage) -> Vec<Marker> + Send + Sync,
{
    fn detect(&self, image: &RgbImage) -> Vec<Marker> {
        self(image)
    }
}

/// Frames with and without a marker derived answer after a ground truth pass
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AnswerSummary {
    pub estimated: Vec<usize>,
    pub missing: Vec<usize>,
}

/// Corners of the markers both frames share, lifted into 3D as `(points_last, points_current)`.
///
/// Corners without depth in either frame are dropped.
pub fn marker_correspondences(
    last: (&KeyFrame, &[Marker]),
    current: (&KeyFrame, &[Marker]),
    converter: &dyn Converter,
) -> (Vec<Vector3<f64>>, Vec<Vector3<f64>>) {
    let (last_frame, last_markers) = last;
    let (current_frame, current_markers) = current;

    let by_id: HashMap<u32, &Marker> = last_markers.iter().map(|m| (m.id, m)).collect();

    current_markers
        .iter()
        .filter_map(|marker| Some((by_id.get(&marker.id)?, marker)))
        .flat_map(|(last_marker, current_marker)| {
            last_marker.corners.iter().zip(current_marker.corners.iter())
        })
        .filter_map(|(a, b)| {
            Some((
                converter.point_at(last_frame, *a)?,
                converter.point_at(current_frame, *b)?,
            ))
        })
        .unzip()
}

/// Compute the answer alignment of every frame from the markers it shares with its predecessor.
pub fn generate_answers(
    keyframes: &SharedKeyFrames,
    detector: &dyn MarkerDetector,
    converter: &dyn Converter,
    thresholds: &OneByOneOptions,
    notifier: &Notifier,
) -> Result<AnswerSummary> {
    let estimator = TransformationEstimator::new(
        ANSWER_MAX_ITERATIONS,
        thresholds.threshold_outlier,
        thresholds.threshold_inlier,
    );

    // detection and estimation only read the store
    let answers: Vec<(Matrix4<f64>, AnswerState)> = {
        let frames = keyframes.read();
        if frames.len() < 2 {
            return Err(Error::InsufficientKeyFrames {
                found: frames.len(),
                required: 2,
            });
        }

        let markers: Vec<Vec<Marker>> = frames
            .iter()
            .map(|frame| detector.detect(&frame.color_image))
            .collect();

        let mut answers = vec![(Matrix4::identity(), AnswerState::Reference)];
        for current in 1..frames.len() {
            let last = current - 1;
            let (points_last, points_current) = marker_correspondences(
                (&frames[last], &markers[last]),
                (&frames[current], &markers[current]),
                converter,
            );

            if points_last.is_empty() {
                warn!("frames {last} and {current} share no markers");
                notifier.message(format!("No common markers between frame {last} and {current}"));
                answers.push((Matrix4::identity(), AnswerState::Missing));
                notifier.progress(current);
                continue;
            }

            match estimator.estimate(&points_current, &points_last) {
                Ok(matrix) => {
                    debug!("answer for frame {current} from {} corners", points_last.len());
                    answers.push((matrix, AnswerState::Estimated));
                }
                Err(err) => {
                    warn!("marker registration of frame {current} failed: {err}");
                    notifier.message(format!("Answer of frame {current} could not be computed"));
                    answers.push((Matrix4::identity(), AnswerState::Missing));
                }
            }
            notifier.progress(current);
        }
        answers
    };

    let mut summary = AnswerSummary::default();
    let mut frames = keyframes.write();
    for (index, (frame, (matrix, state))) in frames.iter_mut().zip(answers).enumerate() {
        frame.answer_alignment_matrix = matrix;
        frame.answer_state = state;
        match state {
            AnswerState::Estimated => summary.estimated.push(index),
            AnswerState::Missing => summary.missing.push(index),
            AnswerState::Reference | AnswerState::NotComputed => {}
        }
    }

    info!(
        "ground truth: {} frames estimated, {} missing",
        summary.estimated.len(),
        summary.missing.len()
    );
    Ok(summary)
}
