//! Error types for the alignment engine

use std::path::PathBuf;

use crate::algorithms::transformation::EstimationError;
use crate::config::ConfigLoadError;
use crate::io::cache::CacheError;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Engine error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Tracking strategy, converter or option values are not usable
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Fewer keyframes than an operation requires
    #[error("Insufficient keyframes: {found} present, at least {required} required")]
    InsufficientKeyFrames {
        /// Keyframes present in the store
        found: usize,
        /// Minimum required by the operation
        required: usize,
    },

    /// Rigid transformation estimation failed
    #[error("Estimation failed: {0}")]
    Estimation(#[from] EstimationError),

    /// A frame pair could not be registered
    #[error("Registration of frame {to} against frame {from} failed")]
    Registration {
        /// Reference frame
        from: usize,
        /// Frame being aligned
        to: usize,
    },

    /// Result cache could not be written or read
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// Configuration file could not be loaded
    #[error(transparent)]
    Config(#[from] ConfigLoadError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The shared keyframe store has been dropped
    #[error("Keyframe store is no longer available")]
    StoreUnavailable,

    /// Frame index outside of the store
    #[error("Frame {index} out of range (store holds {len} frames)")]
    FrameOutOfRange {
        /// Requested index
        index: usize,
        /// Store length
        len: usize,
    },

    /// Ground truth generation requested without a marker detector
    #[error("No marker detector configured")]
    MissingMarkerDetector,

    /// The compute worker thread is gone
    #[error("Compute worker error: {0}")]
    Worker(String),

    /// Result report could not be produced
    #[error("Report error for {path}: {reason}")]
    Report {
        /// Target report path
        path: PathBuf,
        /// Failure description
        reason: String,
    },
}
