//! Robust rigid body registration between two corresponding 3D point sets.

use arrsac::Arrsac;
use log::{debug, trace};
use nalgebra::{Matrix4, Vector3};
use rand::{rngs::StdRng, SeedableRng};
use sample_consensus::Consensus;

use super::rigid::{Correspondence, RigidTransform, RigidTransformEstimator, MIN_CORRESPONDENCES};

/// Seed of the consensus sampler, fixed so that registrations are reproducible.
const CONSENSUS_SEED: u64 = 0x5eed_f00d;

/// Estimation failure conditions
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EstimationError {
    /// Point sequences of different length
    #[error("Correspondence sets differ in length: {from} vs {to}")]
    Mismatched {
        /// Length of the source sequence
        from: usize,
        /// Length of the target sequence
        to: usize,
    },

    /// Not enough usable correspondences to determine a rigid transform
    #[error("Insufficient correspondences: {found} usable, at least {required} required")]
    InsufficientCorrespondences {
        /// Usable correspondences
        found: usize,
        /// Minimum required
        required: usize,
    },

    /// The inlier set collapsed below the minimal sample
    #[error("No inliers: {remaining} correspondences left under the inlier threshold")]
    NoInliers {
        /// Inliers left when the estimation gave up
        remaining: usize,
    },
}

/// Parameters of the robust estimation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransformationEstimator {
    /// Refinement rounds after the consensus stage
    pub max_iterations: usize,
    /// Residual (meters) above which a correspondence is an outlier of a consensus hypothesis
    pub outlier_threshold: f64,
    /// Residual (meters) below which a correspondence takes part in the refit
    pub inlier_threshold: f64,
}

impl TransformationEstimator {
    pub fn new(max_iterations: usize, outlier_threshold: f64, inlier_threshold: f64) -> Self {
        Self {
            max_iterations,
            outlier_threshold,
            inlier_threshold,
        }
    }

    /// Estimate the transform `T` such that `T * points_from[k] ≈ points_to[k]`.
    ///
    /// Correspondences with a non-finite or all-zero point on either side are ignored.
    pub fn estimate(
        &self,
        points_from: &[Vector3<f64>],
        points_to: &[Vector3<f64>],
    ) -> Result<Matrix4<f64>, EstimationError> {
        self.estimate_rigid(points_from, points_to)
            .map(|transform| transform.to_homogeneous())
    }

    pub fn estimate_rigid(
        &self,
        points_from: &[Vector3<f64>],
        points_to: &[Vector3<f64>],
    ) -> Result<RigidTransform, EstimationError> {
        if points_from.len() != points_to.len() {
            return Err(EstimationError::Mismatched {
                from: points_from.len(),
                to: points_to.len(),
            });
        }

        let correspondences: Vec<Correspondence> = points_from
            .iter()
            .zip(points_to)
            .filter(|(a, b)| is_usable(a) && is_usable(b))
            .map(|(a, b)| Correspondence::new(*a, *b))
            .collect();

        if correspondences.len() < MIN_CORRESPONDENCES {
            return Err(EstimationError::InsufficientCorrespondences {
                found: correspondences.len(),
                required: MIN_CORRESPONDENCES,
            });
        }

        // This is an ARRSAC (Adaptive Real-Time Random Sample Consensus) package,
        // which could perform as well or better than RANSAC.
        // https://people.inf.ethz.ch/pomarc/pubs/RaguramECCV08.pdf
        let consensus = Arrsac::new(self.outlier_threshold, StdRng::seed_from_u64(CONSENSUS_SEED))
            .model_inliers(&RigidTransformEstimator, correspondences.iter());

        let mut inliers: Vec<usize> = match consensus {
            Some((_, inliers)) if inliers.len() >= MIN_CORRESPONDENCES => inliers,
            _ => {
                debug!(
                    "consensus found no hypothesis for {} correspondences, refining from the full set",
                    correspondences.len()
                );
                (0..correspondences.len()).collect()
            }
        };
        inliers.sort_unstable();

        let mut model = None;
        for iteration in 0..self.max_iterations.max(1) {
            let fitted = RigidTransform::fit(inliers.iter().map(|&i| &correspondences[i]))
                .ok_or(EstimationError::NoInliers {
                    remaining: inliers.len(),
                })?;

            let refined: Vec<usize> = correspondences
                .iter()
                .enumerate()
                .filter(|(_, c)| fitted.residual_of(c) < self.inlier_threshold)
                .map(|(i, _)| i)
                .collect();

            trace!(
                "refinement {}: {} -> {} inliers",
                iteration,
                inliers.len(),
                refined.len()
            );

            if refined.len() < MIN_CORRESPONDENCES {
                return Err(EstimationError::NoInliers {
                    remaining: refined.len(),
                });
            }

            let converged = refined == inliers;
            inliers = refined;
            model = Some(fitted);

            if converged {
                break;
            }
        }

        // the last round may have moved the inlier set, the answer is the fit over the final set
        match RigidTransform::fit(inliers.iter().map(|&i| &correspondences[i])) {
            Some(transform) => Ok(transform),
            None => model.ok_or(EstimationError::NoInliers {
                remaining: inliers.len(),
            }),
        }
    }
}

/// Functional form of [`TransformationEstimator::estimate`].
pub fn compute_transformation_matrix(
    points_from: &[Vector3<f64>],
    points_to: &[Vector3<f64>],
    max_iterations: usize,
    outlier_threshold: f64,
    inlier_threshold: f64,
) -> Result<Matrix4<f64>, EstimationError> {
    TransformationEstimator::new(max_iterations, outlier_threshold, inlier_threshold)
        .estimate(points_from, points_to)
}

fn is_usable(point: &Vector3<f64>) -> bool {
    point.iter().all(|v| v.is_finite()) && *point != Vector3::zeros()
}
