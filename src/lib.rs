//! Alignment of RGB-D keyframe sequences into one trajectory.
//!
//! A [`SlamComputer`] drives one of the tracking strategies over a shared keyframe store,
//! writes a replayable result cache and a report comparing the estimate with
//! marker derived ground truth.

pub mod algorithms;
pub mod config;
pub mod error;
pub mod io;
pub mod slam;

pub use config::ComputerConfig;
pub use error::{Error, Result};
pub use slam::{
    converter::{AistConverter, Converter, XtionConverter},
    frame::{shared, AnswerState, KeyFrame, KeyFrames, PointImage, SharedKeyFrames},
    markers::{AnswerSummary, Marker, MarkerDetector},
    notifier::{ComputerEvent, StopHandle},
    options::{
        FixedFrameCountOptions, OneByOneOptions, PcaKeyFrameOptions, TrackingOptions, TrackingType,
    },
    system::{ComputeOutcome, ComputeState, RunSummary, SlamComputer},
    trajectory::MatrixSource,
    worker::{ComputeWorker, WorkerCommand, WorkerReply},
};
