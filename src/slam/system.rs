use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use crossbeam_channel::Sender;
use log::{error, info, warn};
use nalgebra::Matrix4;

use crate::{
    config::ComputerConfig,
    error::{Error, Result},
    io::{
        cache::{self, ComputationResultCache},
        report::{self, ReferencePose},
    },
    slam::{
        converter::converter_from_index,
        frame::{self, KeyFrame, KeyFramesHandle, SharedKeyFrames},
        markers::{self, AnswerSummary, MarkerDetector},
        notifier::{ComputerEvent, Notifier, StopHandle},
        options::TrackingOptions,
        tracker::{create_tracker, OneByOneTracker, Tracker},
        trajectory::{self, MatrixSource, TrajectorySegment},
    },
};

/// Lifecycle of the most recent computation
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ComputeState {
    #[default]
    Idle,
    Running,
    Completed,
    Stopped,
    Failed,
}

/// What a finished or interrupted run produced
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub strategy: &'static str,
    pub frames: usize,
    /// `compute_next` calls made
    pub steps: usize,
    pub failed_frames: Vec<usize>,
    pub elapsed: Duration,
    /// Only set for completed runs whose cache could be written
    pub cache_path: Option<PathBuf>,
    /// Only set for completed runs whose report could be written
    pub report_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ComputeOutcome {
    /// Nothing to compute, the store is gone or holds fewer than two frames
    Skipped(String),
    Completed(RunSummary),
    /// Stopped between two units of work, nothing was persisted
    Stopped(RunSummary),
}

/// Drives a tracking strategy over the keyframe store and persists its outcome.
pub struct SlamComputer {
    keyframes: KeyFramesHandle,
    config: ComputerConfig,
    data_set_name: String,
    marker_detector: Option<Arc<dyn MarkerDetector>>,
    notifier: Notifier,
    running: StopHandle,
    state: ComputeState,
}

impl SlamComputer {
    pub fn new(keyframes: &SharedKeyFrames, config: ComputerConfig) -> Self {
        let data_set_name = data_set_name_of(&config.data_dir);
        Self {
            keyframes: Arc::downgrade(keyframes),
            config,
            data_set_name,
            marker_detector: None,
            notifier: Notifier::new(),
            running: StopHandle::default(),
            state: ComputeState::Idle,
        }
    }

    /// Computer configured from the YAML file at `path`.
    pub fn from_config_file(keyframes: &SharedKeyFrames, path: &Path) -> Result<Self> {
        let config = ComputerConfig::load(path)?;
        info!("loaded configuration from {}", path.display());
        Ok(Self::new(keyframes, config))
    }

    pub fn set_keyframes(&mut self, keyframes: &SharedKeyFrames) {
        self.keyframes = Arc::downgrade(keyframes);
    }

    pub fn set_options(&mut self, options: TrackingOptions) {
        self.config.tracking = options;
    }

    pub fn options(&self) -> &TrackingOptions {
        &self.config.tracking
    }

    pub fn set_converter_choice(&mut self, converter: usize) {
        self.config.converter = converter;
    }

    pub fn converter_choice(&self) -> usize {
        self.config.converter
    }

    pub fn set_data_dir(&mut self, data_dir: impl Into<PathBuf>) {
        self.config.data_dir = data_dir.into();
        self.data_set_name = data_set_name_of(&self.config.data_dir);
    }

    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    /// Name recorded in cache files, defaults to the data directory's name
    pub fn set_data_set_name(&mut self, name: impl Into<String>) {
        self.data_set_name = name.into();
    }

    pub fn set_per_frame_report(&mut self, enabled: bool) {
        self.config.report.per_frame = enabled;
    }

    pub fn set_marker_detector(&mut self, detector: Arc<dyn MarkerDetector>) {
        self.marker_detector = Some(detector);
    }

    pub fn subscribe<F>(&mut self, listener: F)
    where
        F: Fn(&ComputerEvent) + Send + Sync + 'static,
    {
        self.notifier.subscribe(listener);
    }

    pub fn subscribe_channel(&mut self, sender: Sender<ComputerEvent>) {
        self.notifier.subscribe_channel(sender);
    }

    /// Handle able to stop a running computation from another thread or a subscriber
    pub fn stop_handle(&self) -> StopHandle {
        self.running.clone()
    }

    /// Stop the running computation before its next unit of work.
    ///
    /// Only affects a run in progress, `start_compute` raises the flag again when it begins.
    pub fn stop_compute(&self) {
        self.running.stop();
    }

    pub fn state(&self) -> ComputeState {
        self.state
    }

    fn store(&self) -> Option<SharedKeyFrames> {
        let store = self.keyframes.upgrade();
        if store.is_none() {
            warn!("keyframe store is no longer available");
            self.notifier.message("No keyframes loaded.");
        }
        store
    }

    /// Run the configured tracking strategy to completion or until stopped.
    pub fn start_compute(&mut self) -> Result<ComputeOutcome> {
        self.running.start();
        self.state = ComputeState::Running;

        let outcome = self.run_compute();

        self.state = match &outcome {
            Ok(ComputeOutcome::Completed(_)) => ComputeState::Completed,
            Ok(ComputeOutcome::Stopped(_)) => ComputeState::Stopped,
            Ok(ComputeOutcome::Skipped(_)) => ComputeState::Idle,
            Err(e) => {
                error!("computation failed: {e}");
                self.notifier.message(format!("Computation failed: {e}"));
                ComputeState::Failed
            }
        };
        self.running.stop();
        outcome
    }

    fn run_compute(&mut self) -> Result<ComputeOutcome> {
        let Some(store) = self.store() else {
            return Ok(ComputeOutcome::Skipped("keyframe store is gone".into()));
        };

        let frame_count = store.read().len();
        if frame_count < 2 {
            info!("skipping computation of {frame_count} keyframes");
            self.notifier.message("At least two keyframes are needed to compute.");
            return Ok(ComputeOutcome::Skipped(format!(
                "{frame_count} keyframes loaded, at least 2 required"
            )));
        }

        // configuration problems surface before any frame is touched
        let mut tracker = create_tracker(&self.config.tracking)?;
        let converter = converter_from_index(self.config.converter)?;

        tracker.set_keyframes(store.clone());
        tracker.set_converter(converter);
        tracker.set_notifier(self.notifier.clone());

        let started = Instant::now();
        info!(
            "computing {frame_count} keyframes with {} tracking",
            tracker.name()
        );
        self.notifier.message("Computation begins...");

        tracker.initialize()?;
        self.notifier.progress_range(1, frame_count - 1);

        let mut steps = 0;
        loop {
            // a stop arriving during the last unit still lets the run complete
            if !self.running.is_running() {
                info!("computation stopped after {steps} steps");
                self.notifier.message("Computation stopped.");
                return Ok(ComputeOutcome::Stopped(RunSummary {
                    strategy: tracker.name(),
                    frames: frame_count,
                    steps,
                    failed_frames: tracker.failed_frames().to_vec(),
                    elapsed: started.elapsed(),
                    cache_path: None,
                    report_path: None,
                }));
            }

            tracker.compute_next()?;
            steps += 1;

            if !tracker.update() {
                break;
            }
        }

        let elapsed = started.elapsed();
        self.notifier.message(format!(
            "Done computing {frame_count} frames. (used {})",
            format_elapsed(elapsed)
        ));

        let timestamp = unix_timestamp();
        let cache_path = self.write_cache(&store, tracker.name(), timestamp, elapsed);
        let report_path = self.write_result(&store, tracker.name(), timestamp);

        Ok(ComputeOutcome::Completed(RunSummary {
            strategy: tracker.name(),
            frames: frame_count,
            steps,
            failed_frames: tracker.failed_frames().to_vec(),
            elapsed,
            cache_path,
            report_path,
        }))
    }

    fn write_cache(
        &self,
        store: &SharedKeyFrames,
        strategy: &str,
        timestamp: u64,
        elapsed: Duration,
    ) -> Option<PathBuf> {
        let record = ComputationResultCache::from_keyframes(
            self.data_set_name.clone(),
            elapsed.as_millis() as u64,
            self.config.tracking,
            self.config.converter,
            &store.read(),
        );
        let path = cache::cache_path(&self.config.data_dir, &self.data_set_name, timestamp, strategy);

        match cache::save(&path, &record) {
            Ok(()) => Some(path),
            Err(e) => {
                warn!("failed to write cache {}: {e}", path.display());
                self.notifier.message(format!("Cache could not be written: {e}"));
                None
            }
        }
    }

    fn write_result(&self, store: &SharedKeyFrames, strategy: &str, timestamp: u64) -> Option<PathBuf> {
        let reference = self.reference_pose(store);
        let path = report::report_path(&self.config.data_dir, timestamp, strategy);

        let written = report::write_report(
            &path,
            &self.config.tracking,
            &store.read(),
            &reference,
            self.config.report.per_frame,
        );
        match written {
            Ok(()) => Some(path),
            Err(e) => {
                warn!("failed to write report {}: {e}", path.display());
                self.notifier.message("No result to be written.");
                None
            }
        }
    }

    /// Composed ground truth of the last frame, registering it directly onto the first
    /// when some frame lacks a marker answer.
    fn reference_pose(&self, store: &SharedKeyFrames) -> ReferencePose {
        let (first, last) = {
            let keyframes = store.read();
            if report::answers_complete(&keyframes) {
                return ReferencePose::Markers(trajectory::accumulate(
                    keyframes.iter().map(|k| k.answer_alignment_matrix),
                ));
            }
            match (keyframes.first(), keyframes.last()) {
                (Some(first), Some(last)) => (first.clone(), last.clone()),
                _ => return ReferencePose::Unavailable,
            }
        };

        match self.compute_transformation_matrix_of(&last, &first) {
            Ok(matrix) => ReferencePose::Registration(matrix),
            Err(e) => {
                warn!("no reference pose for the report: {e}");
                ReferencePose::Unavailable
            }
        }
    }

    /// Alignment of `from` onto `to`, registered as a standalone pair.
    pub fn compute_transformation_matrix_of(&self, from: &KeyFrame, to: &KeyFrame) -> Result<Matrix4<f64>> {
        let pair = frame::shared(vec![to.clone(), from.clone()]);

        let mut tracker = OneByOneTracker::default();
        tracker.set_keyframes(pair.clone());
        tracker.set_options(TrackingOptions::one_by_one(self.config.tracking.one_by_one));
        tracker.set_converter(converter_from_index(self.config.converter)?);
        tracker.initialize()?;
        tracker.compute_next()?;

        let keyframes = pair.read();
        if keyframes[1].used {
            Ok(keyframes[1].alignment_matrix)
        } else {
            Err(Error::Registration {
                from: from.id,
                to: to.id,
            })
        }
    }

    /// Marker based ground truth for every frame.
    ///
    /// Returns `None` when there is nothing to compute.
    pub fn start_generate_answer(&mut self) -> Result<Option<AnswerSummary>> {
        let Some(store) = self.store() else {
            return Ok(None);
        };

        let frame_count = store.read().len();
        if frame_count < 2 {
            info!("skipping ground truth of {frame_count} keyframes");
            return Ok(None);
        }

        let detector = self
            .marker_detector
            .clone()
            .ok_or(Error::MissingMarkerDetector)?;
        let converter = converter_from_index(self.config.converter)?;

        let started = Instant::now();
        self.notifier.progress_range(1, frame_count - 1);

        let summary = markers::generate_answers(
            &store,
            detector.as_ref(),
            converter.as_ref(),
            &self.config.tracking.one_by_one,
            &self.notifier,
        )?;

        self.notifier.message(format!(
            "Done generating answers of {frame_count} frames. (used {})",
            format_elapsed(started.elapsed())
        ));
        Ok(Some(summary))
    }

    /// Create the cache directory if needed and report whether it holds any result.
    pub fn check_previous_result(&self) -> Result<bool> {
        let dir = cache::cache_dir(&self.config.data_dir);
        std::fs::create_dir_all(&dir)?;
        Ok(!cache::list_cache_files(&dir)?.is_empty())
    }

    /// Cached results of this data directory, newest first
    pub fn previous_results(&self) -> Result<Vec<PathBuf>> {
        Ok(cache::list_cache_files(&cache::cache_dir(&self.config.data_dir))?)
    }

    /// Replay a cached result onto the store, adopting its options and converter.
    ///
    /// Returns the number of frames the cache was applied to.
    pub fn use_previous_result(&mut self, path: &Path) -> Result<usize> {
        let store = self.store().ok_or(Error::StoreUnavailable)?;
        if store.read().is_empty() {
            self.notifier.message("No data found, cannot apply matrices.");
        }

        let started = Instant::now();
        let record = cache::load(path).map_err(|e| {
            warn!("failed to load cache {}: {e}", path.display());
            self.notifier.message(format!("Previous result could not be loaded: {e}"));
            e
        })?;

        info!(
            "replaying {} computed in {} ms on {}",
            record.data_set_name, record.computation_time_ms, path.display()
        );
        self.config.tracking = record.options;
        self.config.converter = record.converter;

        let applied = record.apply(&mut store.write());
        self.notifier.message(format!(
            "Done loading {applied} frames' results. (used {})",
            format_elapsed(started.elapsed())
        ));
        Ok(applied)
    }

    /// Trajectory of the current store contents, empty when the store is gone
    pub fn trajectory(&self, source: MatrixSource) -> Vec<TrajectorySegment> {
        self.keyframes
            .upgrade()
            .map(|store| trajectory::trajectory_segments(&store.read(), source))
            .unwrap_or_default()
    }

    /// Run any important cleanup procedures then the computer is no longer in use
    pub fn shutdown(self) {
        self.running.stop();
    }
}

fn data_set_name_of(data_dir: &Path) -> String {
    data_dir
        .file_name()
        .and_then(|name| name.to_str())
        .filter(|name| !name.is_empty() && *name != ".")
        .unwrap_or("dataset")
        .to_string()
}

fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn format_elapsed(elapsed: Duration) -> String {
    let millis = elapsed.as_millis();
    format!("{}m {}s {}ms", millis / 60_000, (millis / 1000) % 60, millis % 1000)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigLoadError;
    use crate::slam::{options::TrackingType, tracker::tests::moving_frames};

    fn computer(store: &SharedKeyFrames, options: TrackingOptions) -> (SlamComputer, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let config = ComputerConfig {
            data_dir: dir.path().to_path_buf(),
            tracking: options,
            ..Default::default()
        };
        (SlamComputer::new(store, config), dir)
    }

    #[test]
    fn configuration_file_sets_up_the_computer() {
        let store = frame::shared(moving_frames(2, [0.01, 0.0, 0.0]));
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "converter: 1\ntracking:\n  type: FixedFrameCount\n").unwrap();

        let computer = SlamComputer::from_config_file(&store, &path).unwrap();
        assert_eq!(computer.converter_choice(), 1);
        assert_eq!(computer.options().tracking_type, TrackingType::FixedFrameCount);

        assert!(matches!(
            SlamComputer::from_config_file(&store, &dir.path().join("absent.yaml")),
            Err(Error::Config(ConfigLoadError::Io(_)))
        ));
    }

    #[test]
    fn stop_before_start_does_not_cancel_the_run() {
        let store = frame::shared(moving_frames(3, [0.01, 0.0, 0.0]));
        let (mut computer, _dir) = computer(&store, TrackingOptions::one_by_one(Default::default()));

        computer.stop_compute();
        assert!(matches!(computer.start_compute().unwrap(), ComputeOutcome::Completed(_)));
    }

    #[test]
    fn elapsed_formatting() {
        assert_eq!(format_elapsed(Duration::from_millis(61_005)), "1m 1s 5ms");
    }

    #[test]
    fn data_set_name_from_directory() {
        assert_eq!(data_set_name_of(Path::new("/data/living_room")), "living_room");
        assert_eq!(data_set_name_of(Path::new(".")), "dataset");
    }

    #[test]
    fn unknown_options_fail_before_touching_frames() {
        let store = frame::shared(moving_frames(3, [0.01, 0.0, 0.0]));
        store.write()[1].used = true;
        let (mut computer, _dir) = computer(&store, TrackingOptions::default());
        assert_eq!(computer.options().tracking_type, TrackingType::Unknown);

        assert!(matches!(computer.start_compute(), Err(Error::Configuration(_))));
        assert_eq!(computer.state(), ComputeState::Failed);
        assert!(store.read()[1].used);
    }

    #[test]
    fn bad_converter_is_a_configuration_error() {
        let store = frame::shared(moving_frames(3, [0.01, 0.0, 0.0]));
        let (mut computer, _dir) = computer(&store, TrackingOptions::one_by_one(Default::default()));
        computer.set_converter_choice(5);
        assert!(matches!(computer.start_compute(), Err(Error::Configuration(_))));
    }

    #[test]
    fn standalone_pair_registration() {
        let store = frame::shared(moving_frames(2, [0.03, 0.0, 0.0]));
        let (computer, _dir) = computer(&store, TrackingOptions::one_by_one(Default::default()));

        let keyframes = store.read();
        let matrix = computer
            .compute_transformation_matrix_of(&keyframes[1], &keyframes[0])
            .unwrap();
        approx::assert_relative_eq!(matrix[(0, 3)], 0.03, epsilon = 1e-4);

        let mut blank = keyframes[1].clone();
        blank.color_image = image::RgbImage::new(64, 64);
        assert!(matches!(
            computer.compute_transformation_matrix_of(&blank, &keyframes[0]),
            Err(Error::Registration { from: 1, to: 0 })
        ));
    }
}
