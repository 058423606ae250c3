use nalgebra::{Matrix3, Matrix4, Point3, Rotation3, Vector3};
use sample_consensus::{Estimator, Model};

/// Minimum number of point correspondences which determine a rigid body transformation.
pub const MIN_CORRESPONDENCES: usize = 3;

/// A pair of 3D points believed to be the same physical point seen from two frames.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Correspondence {
    pub from: Vector3<f64>,
    pub to: Vector3<f64>,
}

impl Correspondence {
    pub fn new(from: Vector3<f64>, to: Vector3<f64>) -> Self {
        Self { from, to }
    }
}

/// Rotation and translation mapping points of one frame into another:
/// ```plain
/// p_to = R * p_from + t
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RigidTransform {
    pub rotation: Matrix3<f64>,
    pub translation: Vector3<f64>,
}

impl RigidTransform {
    pub fn identity() -> Self {
        Self {
            rotation: Matrix3::identity(),
            translation: Vector3::zeros(),
        }
    }

    pub fn transform(&self, point: &Vector3<f64>) -> Vector3<f64> {
        self.rotation * point + self.translation
    }

    /// Homogeneous `4x4` form, `[R t; 0 1]`
    pub fn to_homogeneous(&self) -> Matrix4<f64> {
        let mut matrix = Matrix4::identity();
        matrix.fixed_slice_mut::<3, 3>(0, 0).copy_from(&self.rotation);
        matrix.fixed_slice_mut::<3, 1>(0, 3).copy_from(&self.translation);
        matrix
    }

    /// Least squares rigid fit between two point sets using the SVD of the cross-covariance (Kabsch / Horn).
    ///
    /// Returns `None` for fewer than [`MIN_CORRESPONDENCES`] points or when the SVD cannot be computed.
    pub fn fit<'a, I>(correspondences: I) -> Option<Self>
    where
        I: Iterator<Item = &'a Correspondence> + Clone,
    {
        let count = correspondences.clone().count();
        if count < MIN_CORRESPONDENCES {
            return None;
        }

        let (sum_from, sum_to) = correspondences
            .clone()
            .fold((Vector3::zeros(), Vector3::zeros()), |(a, b), c| {
                (a + c.from, b + c.to)
            });
        let centroid_from: Vector3<f64> = sum_from / count as f64;
        let centroid_to: Vector3<f64> = sum_to / count as f64;

        // H = sum((p_from - c_from) * (p_to - c_to)^T)
        let covariance = correspondences.fold(Matrix3::zeros(), |h, c| {
            h + (c.from - centroid_from) * (c.to - centroid_to).transpose()
        });

        let svd = covariance.svd(true, true);
        let matrix_u = svd.u?;
        let matrix_v = svd.v_t?.transpose();

        // R = V U^T, flipping the weakest axis when that produces a reflection
        let mut rotation = matrix_v * matrix_u.transpose();
        if rotation.determinant() < 0.0 {
            let mut corrected_v = matrix_v;
            corrected_v.column_mut(2).neg_mut();
            rotation = corrected_v * matrix_u.transpose();
        }

        if !rotation.iter().all(|v| v.is_finite()) {
            return None;
        }

        // re-orthonormalize to keep round-off out of accumulated trajectories
        let rotation = Rotation3::from_matrix(&rotation).into_inner();
        let translation = centroid_to - rotation * centroid_from;

        Some(Self {
            rotation,
            translation,
        })
    }

    pub fn residual_of(&self, correspondence: &Correspondence) -> f64 {
        (self.transform(&correspondence.from) - correspondence.to).norm()
    }
}

impl From<&RigidTransform> for Matrix4<f64> {
    fn from(transform: &RigidTransform) -> Self {
        transform.to_homogeneous()
    }
}

/// Apply a homogeneous transform to a euclidean point.
pub fn transform_point(matrix: &Matrix4<f64>, point: &Vector3<f64>) -> Vector3<f64> {
    matrix.transform_point(&Point3::from(*point)).coords
}

// Implementations for `sample_consensus`

impl<'a> Model<&'a Correspondence> for RigidTransform {
    /// Euclidean distance between the transformed source point and its target
    fn residual(&self, data: &&'a Correspondence) -> f64 {
        self.residual_of(data)
    }
}

#[derive(Default)]
pub struct RigidTransformEstimator;

impl<'a> Estimator<&'a Correspondence> for RigidTransformEstimator {
    const MIN_SAMPLES: usize = MIN_CORRESPONDENCES;
    type Model = RigidTransform;
    type ModelIter = Option<RigidTransform>;

    fn estimate<I>(&self, data: I) -> Self::ModelIter
    where
        I: Iterator<Item = &'a Correspondence> + Clone,
    {
        RigidTransform::fit(data)
    }
}
