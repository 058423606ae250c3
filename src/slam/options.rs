//! Tracking strategy selection and the per-strategy parameters.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::algorithms::transformation::TransformationEstimator;
use crate::error::{Error, Result};

/// Tracking strategies
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackingType {
    OneByOne,
    FixedFrameCount,
    PcaKeyFrame,
    /// Not configured yet, every computation refuses to run with it
    #[default]
    Unknown,
}

impl TrackingType {
    /// Name used for reports and cache files, `None` for [`TrackingType::Unknown`]
    pub fn name(&self) -> Option<&'static str> {
        match self {
            TrackingType::OneByOne => Some("OneByOne"),
            TrackingType::FixedFrameCount => Some("FixedFrameCount"),
            TrackingType::PcaKeyFrame => Some("PcaKeyFrame"),
            TrackingType::Unknown => None,
        }
    }

    pub fn index(&self) -> i32 {
        match self {
            TrackingType::OneByOne => 0,
            TrackingType::FixedFrameCount => 1,
            TrackingType::PcaKeyFrame => 2,
            TrackingType::Unknown => -1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OneByOneOptions {
    /// meters
    pub threshold_outlier: f64,
    /// meters
    pub threshold_inlier: f64,
    pub max_iterations: usize,
}

impl Default for OneByOneOptions {
    fn default() -> Self {
        Self {
            threshold_outlier: 0.05,
            threshold_inlier: 0.02,
            max_iterations: 100,
        }
    }
}

impl fmt::Display for OneByOneOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Threshold of outlier : {}", self.threshold_outlier)?;
        writeln!(f, "Threshold of inlier : {}", self.threshold_inlier)?;
        write!(f, "Max iterations : {}", self.max_iterations)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FixedFrameCountOptions {
    /// Distance in frames between two registered representative frames
    pub frame_count: usize,
    pub threshold_outlier: f64,
    pub threshold_inlier: f64,
    pub max_iterations: usize,
}

impl Default for FixedFrameCountOptions {
    fn default() -> Self {
        Self {
            frame_count: 5,
            threshold_outlier: 0.05,
            threshold_inlier: 0.02,
            max_iterations: 100,
        }
    }
}

impl fmt::Display for FixedFrameCountOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Frame count : {}", self.frame_count)?;
        writeln!(f, "Threshold of outlier : {}", self.threshold_outlier)?;
        writeln!(f, "Threshold of inlier : {}", self.threshold_inlier)?;
        write!(f, "Max iterations : {}", self.max_iterations)
    }
}

/// Largest accepted `grid_size`, the PCA covariance has `grid_size^4` entries
pub const MAX_GRID_SIZE: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PcaKeyFrameOptions {
    /// Cells per side of the depth grid summarising each point image, at most [`MAX_GRID_SIZE`]
    pub grid_size: usize,
    /// Accumulated change along the dominant axis, in standard deviations, which selects a new keyframe
    pub change_threshold: f64,
    /// Upper bound on the distance in frames between two keyframes
    pub max_frame_interval: usize,
    pub threshold_outlier: f64,
    pub threshold_inlier: f64,
    pub max_iterations: usize,
}

impl Default for PcaKeyFrameOptions {
    fn default() -> Self {
        Self {
            grid_size: 8,
            change_threshold: 0.5,
            max_frame_interval: 10,
            threshold_outlier: 0.05,
            threshold_inlier: 0.02,
            max_iterations: 100,
        }
    }
}

impl fmt::Display for PcaKeyFrameOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Grid size : {}", self.grid_size)?;
        writeln!(f, "Change threshold : {}", self.change_threshold)?;
        writeln!(f, "Max frame interval : {}", self.max_frame_interval)?;
        writeln!(f, "Threshold of outlier : {}", self.threshold_outlier)?;
        writeln!(f, "Threshold of inlier : {}", self.threshold_inlier)?;
        write!(f, "Max iterations : {}", self.max_iterations)
    }
}

/// Configuration of one computation, chosen before the run starts.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingOptions {
    #[serde(rename = "type")]
    pub tracking_type: TrackingType,
    pub one_by_one: OneByOneOptions,
    pub fixed_frame_count: FixedFrameCountOptions,
    pub pca_keyframe: PcaKeyFrameOptions,
}

impl TrackingOptions {
    pub fn one_by_one(options: OneByOneOptions) -> Self {
        Self {
            tracking_type: TrackingType::OneByOne,
            one_by_one: options,
            ..Default::default()
        }
    }

    pub fn fixed_frame_count(options: FixedFrameCountOptions) -> Self {
        Self {
            tracking_type: TrackingType::FixedFrameCount,
            fixed_frame_count: options,
            ..Default::default()
        }
    }

    pub fn pca_keyframe(options: PcaKeyFrameOptions) -> Self {
        Self {
            tracking_type: TrackingType::PcaKeyFrame,
            pca_keyframe: options,
            ..Default::default()
        }
    }

    /// Check the record of the selected strategy.
    pub fn validate(&self) -> Result<()> {
        match self.tracking_type {
            TrackingType::OneByOne => {
                let o = &self.one_by_one;
                check_estimation(o.threshold_outlier, o.threshold_inlier, o.max_iterations)
            }
            TrackingType::FixedFrameCount => {
                let o = &self.fixed_frame_count;
                if o.frame_count == 0 {
                    return Err(invalid("frame_count must be at least 1"));
                }
                check_estimation(o.threshold_outlier, o.threshold_inlier, o.max_iterations)
            }
            TrackingType::PcaKeyFrame => {
                let o = &self.pca_keyframe;
                if o.grid_size == 0 || o.grid_size > MAX_GRID_SIZE {
                    return Err(Error::Configuration(format!(
                        "grid_size must be between 1 and {MAX_GRID_SIZE}, got {}",
                        o.grid_size
                    )));
                }
                if o.max_frame_interval == 0 {
                    return Err(invalid("max_frame_interval must be at least 1"));
                }
                if !(o.change_threshold.is_finite() && o.change_threshold > 0.0) {
                    return Err(invalid("change_threshold must be positive"));
                }
                check_estimation(o.threshold_outlier, o.threshold_inlier, o.max_iterations)
            }
            TrackingType::Unknown => Err(Error::Configuration(
                "Setup computation options at first.".into(),
            )),
        }
    }

    /// Estimator parameters of the selected strategy.
    pub fn estimator(&self) -> Option<TransformationEstimator> {
        let (iterations, outlier, inlier) = match self.tracking_type {
            TrackingType::OneByOne => {
                let o = &self.one_by_one;
                (o.max_iterations, o.threshold_outlier, o.threshold_inlier)
            }
            TrackingType::FixedFrameCount => {
                let o = &self.fixed_frame_count;
                (o.max_iterations, o.threshold_outlier, o.threshold_inlier)
            }
            TrackingType::PcaKeyFrame => {
                let o = &self.pca_keyframe;
                (o.max_iterations, o.threshold_outlier, o.threshold_inlier)
            }
            TrackingType::Unknown => return None,
        };
        Some(TransformationEstimator::new(iterations, outlier, inlier))
    }

    /// Text block describing the selected strategy's parameters
    pub fn output(&self) -> String {
        match self.tracking_type {
            TrackingType::OneByOne => self.one_by_one.to_string(),
            TrackingType::FixedFrameCount => self.fixed_frame_count.to_string(),
            TrackingType::PcaKeyFrame => self.pca_keyframe.to_string(),
            TrackingType::Unknown => String::new(),
        }
    }
}

fn check_estimation(outlier: f64, inlier: f64, iterations: usize) -> Result<()> {
    if !(outlier.is_finite() && outlier > 0.0) {
        return Err(invalid("threshold_outlier must be positive"));
    }
    if !(inlier.is_finite() && inlier > 0.0) {
        return Err(invalid("threshold_inlier must be positive"));
    }
    if iterations == 0 {
        return Err(invalid("max_iterations must be at least 1"));
    }
    Ok(())
}

fn invalid(reason: &str) -> Error {
    Error::Configuration(reason.to_string())
}
