use std::sync::Arc;

use crate::{
    error::Result,
    slam::{
        converter::Converter, features::SizedFeature, frame::SharedKeyFrames, notifier::Notifier,
        options::TrackingOptions,
    },
};

use super::{Tracker, TrackerBase};

/// Registers every consecutive pair `(i - 1, i)`.
#[derive(Default)]
pub struct OneByOneTracker {
    base: TrackerBase,
    frame_count: usize,
    /// Next frame to register
    current: usize,
    /// Features of `current - 1`, kept from the previous step
    last_features: Option<Vec<SizedFeature>>,
}

impl Tracker for OneByOneTracker {
    fn name(&self) -> &'static str {
        "OneByOne"
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
        self.frame_count = self.base.reset_frames()?;
        self.current = 1;
        self.last_features = None;
        Ok(())
    }

    fn compute_next(&mut self) -> Result<()> {
        if !self.update() {
            return Ok(());
        }

        let last = self.current - 1;
        let last_features = match self.last_features.take() {
            Some(features) => features,
            None => self.base.features_of(last)?,
        };
        let current_features = self.base.features_of(self.current)?;

        self.base
            .register_pair(last, self.current, &last_features, &current_features)?;

        self.last_features = Some(current_features);
        self.base.notifier.progress(self.current);
        self.current += 1;
        Ok(())
    }

    fn update(&self) -> bool {
        self.current < self.frame_count
    }

    fn failed_frames(&self) -> &[usize] {
        &self.base.failed_frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slam::{
        frame,
        notifier::ComputerEvent,
        tracker::{create_tracker, tests::{moving_frames, run}},
    };
    use approx::assert_relative_eq;
    use nalgebra::Vector3;
    use parking_lot::Mutex;

    #[test]
    fn registers_every_pair() {
        let store = frame::shared(moving_frames(4, [0.02, 0.0, 0.0]));
        let progress = Arc::new(Mutex::new(Vec::new()));

        let mut notifier = Notifier::new();
        let sink = progress.clone();
        notifier.subscribe(move |event| {
            if let ComputerEvent::Progress(value) = event {
                sink.lock().push(*value);
            }
        });

        let mut tracker = create_tracker(&TrackingOptions::one_by_one(Default::default())).unwrap();
        tracker.set_keyframes(store.clone());
        tracker.set_notifier(notifier);

        assert_eq!(run(tracker.as_mut()), 3);
        assert_eq!(*progress.lock(), vec![1, 2, 3]);
        assert!(tracker.failed_frames().is_empty());

        for keyframe in store.read().iter().skip(1) {
            assert!(keyframe.used);
            let translation: Vector3<f64> = keyframe.alignment_matrix.fixed_slice::<3, 1>(0, 3).clone_owned();
            assert_relative_eq!(translation, Vector3::new(0.02, 0.0, 0.0), epsilon = 1e-4);
        }
    }

    #[test]
    fn update_is_false_before_initialize() {
        let tracker = OneByOneTracker::default();
        assert!(!tracker.update());
    }
}
