use std::sync::Arc;

use log::debug;
use nalgebra::DVector;

use crate::{
    algorithms::pca::PcaBasis,
    error::{Error, Result},
    slam::{
        converter::Converter,
        features::SizedFeature,
        frame::{KeyFrame, SharedKeyFrames},
        notifier::Notifier,
        options::TrackingOptions,
    },
};

use super::{Tracker, TrackerBase};

/// Below this the sequence has no usable appearance change and only the interval bound applies
const MIN_DEVIATION: f64 = 1e-9;

/// Selects keyframes where the scene depth has changed enough along its principal direction.
#[derive(Default)]
pub struct PcaKeyFrameTracker {
    base: TrackerBase,
    /// Coefficient of every frame along the dominant principal axis
    coefficients: Vec<f64>,
    /// Accumulated change that selects the next keyframe
    change_limit: f64,
    /// Last selected keyframe
    anchor: usize,
    anchor_features: Option<Vec<SizedFeature>>,
}

/// Mean valid depth of each cell of a `grid_size x grid_size` grid over the point image.
///
/// Cells without a valid point read as zero.
pub fn depth_descriptor(keyframe: &KeyFrame, grid_size: usize) -> DVector<f64> {
    let (width, height) = keyframe.point_image.dimensions();
    let mut sums = vec![0.0; grid_size * grid_size];
    let mut counts = vec![0usize; grid_size * grid_size];

    for y in 0..height {
        for x in 0..width {
            let Some(point) = keyframe.point_at(x, y) else {
                continue;
            };
            let cx = (x as usize * grid_size / width as usize).min(grid_size - 1);
            let cy = (y as usize * grid_size / height as usize).min(grid_size - 1);
            sums[cy * grid_size + cx] += point.z;
            counts[cy * grid_size + cx] += 1;
        }
    }

    DVector::from_iterator(
        sums.len(),
        sums.iter()
            .zip(&counts)
            .map(|(sum, &count)| if count > 0 { sum / count as f64 } else { 0.0 }),
    )
}

impl PcaKeyFrameTracker {
    /// Frame following `anchor` where the accumulated dominant change reaches the limit,
    /// bounded by the interval and the end of the sequence.
    fn next_keyframe(&self) -> usize {
        let last = self.coefficients.len() - 1;
        let max_interval = self.base.options.pca_keyframe.max_frame_interval.max(1);

        let mut accumulated = 0.0;
        let mut next = self.anchor + 1;
        loop {
            accumulated += (self.coefficients[next] - self.coefficients[next - 1]).abs();

            let changed = self.change_limit > MIN_DEVIATION && accumulated >= self.change_limit;
            if changed || next == last || next - self.anchor >= max_interval {
                return next;
            }
            next += 1;
        }
    }
}

impl Tracker for PcaKeyFrameTracker {
    fn name(&self) -> &'static str {
        "PcaKeyFrame"
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
        self.base.reset_frames()?;
        let options = self.base.options.pca_keyframe;

        let descriptors: Vec<DVector<f64>> = self
            .base
            .store()?
            .read()
            .iter()
            .map(|keyframe| depth_descriptor(keyframe, options.grid_size))
            .collect();

        let basis = PcaBasis::from_samples(&descriptors, 1).ok_or_else(|| {
            Error::Configuration("depth descriptors do not form a PCA basis".into())
        })?;

        self.coefficients = descriptors
            .iter()
            .map(|descriptor| basis.project(descriptor)[0])
            .collect();

        let deviation = basis.dominant_deviation();
        self.change_limit = if deviation > MIN_DEVIATION {
            options.change_threshold * deviation
        } else {
            0.0
        };
        debug!(
            "dominant deviation {deviation:.6}, keyframe change limit {:.6}",
            self.change_limit
        );

        self.anchor = 0;
        self.anchor_features = None;
        Ok(())
    }

    fn compute_next(&mut self) -> Result<()> {
        if !self.update() {
            return Ok(());
        }

        let next = self.next_keyframe();
        let anchor_features = match self.anchor_features.take() {
            Some(features) => features,
            None => self.base.features_of(self.anchor)?,
        };
        let next_features = self.base.features_of(next)?;

        self.base
            .register_pair(self.anchor, next, &anchor_features, &next_features)?;

        self.anchor_features = Some(next_features);
        self.base.notifier.progress(next);
        self.anchor = next;
        Ok(())
    }

    fn update(&self) -> bool {
        self.anchor + 1 < self.coefficients.len()
    }

    fn failed_frames(&self) -> &[usize] {
        &self.base.failed_frames
    }
}
