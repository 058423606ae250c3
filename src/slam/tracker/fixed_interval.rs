use std::sync::Arc;

use crate::{
    error::Result,
    slam::{
        converter::Converter, features::SizedFeature, frame::SharedKeyFrames, notifier::Notifier,
        options::TrackingOptions,
    },
};

use super::{Tracker, TrackerBase};

/// Registers every `frame_count`-th frame against the previous one.
///
/// Frames in between stay unused at identity, so the composed trajectory
/// only moves at the representative frames.
#[derive(Default)]
pub struct FixedIntervalTracker {
    base: TrackerBase,
    /// 0, N, 2N, ... and always the last frame
    representatives: Vec<usize>,
    /// Position in `representatives` of the next frame to register
    cursor: usize,
    last_features: Option<Vec<SizedFeature>>,
}

/// Representative frames for a sequence of `frame_count` frames.
pub fn representative_frames(frame_count: usize, interval: usize) -> Vec<usize> {
    if frame_count == 0 {
        return Vec::new();
    }

    let mut frames: Vec<usize> = (0..frame_count).step_by(interval.max(1)).collect();
    if frames.last() != Some(&(frame_count - 1)) {
        frames.push(frame_count - 1);
    }
    frames
}

impl Tracker for FixedIntervalTracker {
    fn name(&self) -> &'static str {
        "FixedFrameCount"
    }

    fn set_keyframes(&mut self, keyframes: SharedKeyFrames) {
        self.base.keyframes = Some(keyframes);
    }

    fn set_options(&mut self, options: TrackingOptions) {
        self.base.options = options;
    }

    fn set_converter(&mut self, converter: Arc<dyn Converter>) {
        self.base.converter = converter;
    }

    fn set_notifier(&mut self, notifier: Notifier) {
        self.base.notifier = notifier;
    }

    fn initialize(&mut self) -> Result<()> {
        let frame_count = self.base.reset_frames()?;
        self.representatives =
            representative_frames(frame_count, self.base.options.fixed_frame_count.frame_count);
        self.cursor = 1;
        self.last_features = None;
        log::debug!("representative frames: {:?}", self.representatives);
        Ok(())
    }

    fn compute_next(&mut self) -> Result<()> {
        if !self.update() {
            return Ok(());
        }

        let last = self.representatives[self.cursor - 1];
        let current = self.representatives[self.cursor];

        let last_features = match self.last_features.take() {
            Some(features) => features,
            None => self.base.features_of(last)?,
        };
        let current_features = self.base.features_of(current)?;

        self.base
            .register_pair(last, current, &last_features, &current_features)?;

        self.last_features = Some(current_features);
        self.base.notifier.progress(current);
        self.cursor += 1;
        Ok(())
    }

    fn update(&self) -> bool {
        self.cursor < self.representatives.len()
    }

    fn failed_frames(&self) -> &[usize] {
        &self.base.failed_frames
    }
}
