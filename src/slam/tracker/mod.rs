//! Frame selection strategies and the pair registration they share.

mod fixed_interval;
mod one_by_one;
mod pca_keyframe;

use std::sync::Arc;

use log::{debug, warn};
use nalgebra::Matrix4;

pub use fixed_interval::FixedIntervalTracker;
pub use one_by_one::OneByOneTracker;
pub use pca_keyframe::PcaKeyFrameTracker;

use crate::{
    error::{Error, Result},
    slam::{
        converter::{Converter, XtionConverter},
        features::{extract_features, lift_matches, match_features, SizedFeature},
        frame::SharedKeyFrames,
        notifier::Notifier,
        options::{TrackingOptions, TrackingType},
    },
};

/// A strategy deciding which keyframe pairs get registered.
///
/// Driven as `initialize`, then `compute_next` until `update` returns `false`.
pub trait Tracker: Send {
    fn name(&self) -> &'static str;

    fn set_keyframes(&mut self, keyframes: SharedKeyFrames);
    fn set_options(&mut self, options: TrackingOptions);
    fn set_converter(&mut self, converter: Arc<dyn Converter>);
    fn set_notifier(&mut self, notifier: Notifier);

    /// Reset every frame to identity and unused, mark the first frame used
    /// and prepare the strategy state.
    fn initialize(&mut self) -> Result<()>;

    /// Register one pair or window, emitting the index of the frame reached as progress.
    fn compute_next(&mut self) -> Result<()>;

    /// Whether another `compute_next` has work to do.
    fn update(&self) -> bool;

    /// Frames whose registration failed during this run
    fn failed_frames(&self) -> &[usize];
}

/// Tracker for the configured strategy.
pub fn create_tracker(options: &TrackingOptions) -> Result<Box<dyn Tracker>> {
    options.validate()?;

    let mut tracker: Box<dyn Tracker> = match options.tracking_type {
        TrackingType::OneByOne => Box::<OneByOneTracker>::default(),
        TrackingType::FixedFrameCount => Box::<FixedIntervalTracker>::default(),
        TrackingType::PcaKeyFrame => Box::<PcaKeyFrameTracker>::default(),
        TrackingType::Unknown => {
            return Err(Error::Configuration(
                "unknown tracking type, choose a strategy before computing".into(),
            ))
        }
    };
    tracker.set_options(*options);
    Ok(tracker)
}

/// State every strategy carries.
pub struct TrackerBase {
    pub keyframes: Option<SharedKeyFrames>,
    pub options: TrackingOptions,
    pub converter: Arc<dyn Converter>,
    pub notifier: Notifier,
    pub failed_frames: Vec<usize>,
}

impl Default for TrackerBase {
    fn default() -> Self {
        Self {
            keyframes: None,
            options: TrackingOptions::default(),
            converter: Arc::new(XtionConverter),
            notifier: Notifier::default(),
            failed_frames: Vec::new(),
        }
    }
}

impl TrackerBase {
    pub fn store(&self) -> Result<&SharedKeyFrames> {
        self.keyframes.as_ref().ok_or(Error::StoreUnavailable)
    }

    /// Reset the alignment of every frame, returning the number of frames.
    pub fn reset_frames(&mut self) -> Result<usize> {
        self.failed_frames.clear();

        let mut keyframes = self.store()?.write();
        if keyframes.len() < 2 {
            return Err(Error::InsufficientKeyFrames {
                found: keyframes.len(),
                required: 2,
            });
        }

        for keyframe in keyframes.iter_mut() {
            keyframe.reset_alignment();
        }
        keyframes[0].used = true;

        Ok(keyframes.len())
    }

    pub fn features_of(&self, index: usize) -> Result<Vec<SizedFeature>> {
        let keyframes = self.store()?.read();
        let keyframe = keyframes.get(index).ok_or(Error::FrameOutOfRange {
            index,
            len: keyframes.len(),
        })?;
        Ok(extract_features(&keyframe.color_image))
    }

    /// Align frame `current` onto frame `last` and store the outcome.
    ///
    /// A failed registration leaves `current` unused at identity and is recorded,
    /// it never aborts the run.
    pub fn register_pair(
        &mut self,
        last: usize,
        current: usize,
        last_features: &[SizedFeature],
        current_features: &[SizedFeature],
    ) -> Result<bool> {
        let estimated = self.estimate_pair(last, current, last_features, current_features)?;

        let mut keyframes = self.store()?.write();
        let len = keyframes.len();
        let keyframe = keyframes
            .get_mut(current)
            .ok_or(Error::FrameOutOfRange { index: current, len })?;

        match estimated {
            Ok(matrix) => {
                keyframe.alignment_matrix = matrix;
                keyframe.used = true;
                Ok(true)
            }
            Err(reason) => {
                warn!("registration of frame {current} onto frame {last} failed: {reason}");
                keyframe.alignment_matrix = Matrix4::identity();
                keyframe.used = false;
                drop(keyframes);

                self.failed_frames.push(current);
                self.notifier
                    .message(format!("Frame {current} could not be aligned onto frame {last}"));
                Ok(false)
            }
        }
    }

    /// Matching and estimation only need read access to the store.
    fn estimate_pair(
        &self,
        last: usize,
        current: usize,
        last_features: &[SizedFeature],
        current_features: &[SizedFeature],
    ) -> Result<std::result::Result<Matrix4<f64>, Error>> {
        let estimator = self.options.estimator().ok_or_else(|| {
            Error::Configuration("no estimator for an unknown tracking type".into())
        })?;

        let keyframes = self.store()?.read();
        let len = keyframes.len();
        let (last_frame, current_frame) = match (keyframes.get(last), keyframes.get(current)) {
            (Some(a), Some(b)) => (a, b),
            _ => {
                return Err(Error::FrameOutOfRange {
                    index: last.max(current),
                    len,
                })
            }
        };

        let matches = match_features(last_features, current_features);
        let (points_last, points_current) = lift_matches(
            &matches,
            (last_frame, last_features),
            (current_frame, current_features),
            self.converter.as_ref(),
        );
        debug!(
            "frames {last} -> {current}: {} matches, {} with depth",
            matches.len(),
            points_last.len()
        );

        Ok(estimator
            .estimate(&points_current, &points_last)
            .map_err(Error::from))
    }
}
