use nalgebra::{DMatrix, DVector, SymmetricEigen};

/// Principal component basis of a set of equally sized sample vectors.
#[derive(Debug, Clone)]
pub struct PcaBasis {
    pub mean: DVector<f64>,
    /// Unit principal axes, strongest first
    pub axes: Vec<DVector<f64>>,
    /// Variance of the samples along each axis, same order as `axes`
    pub variances: Vec<f64>,
}

impl PcaBasis {
    /// Compute the basis from `samples`, keeping at most `components` axes.
    ///
    /// Returns `None` when there are no samples or their dimensions disagree.
    pub fn from_samples(samples: &[DVector<f64>], components: usize) -> Option<Self> {
        let first = samples.first()?;
        let dimension = first.len();
        if dimension == 0 || samples.iter().any(|s| s.len() != dimension) {
            return None;
        }

        let count = samples.len() as f64;
        let mean = samples
            .iter()
            .fold(DVector::zeros(dimension), |acc, s| acc + s)
            / count;

        let covariance = samples.iter().fold(DMatrix::zeros(dimension, dimension), |acc, s| {
            let centered = s - &mean;
            acc + &centered * centered.transpose()
        }) / count;

        let eigen = SymmetricEigen::new(covariance);

        let mut order: Vec<usize> = (0..dimension).collect();
        order.sort_by(|&a, &b| eigen.eigenvalues[b].total_cmp(&eigen.eigenvalues[a]));
        order.truncate(components.max(1));

        Some(Self {
            axes: order
                .iter()
                .map(|&i| eigen.eigenvectors.column(i).clone_owned())
                .collect(),
            // tiny negative eigenvalues are round-off of a semi-definite matrix
            variances: order.iter().map(|&i| eigen.eigenvalues[i].max(0.0)).collect(),
            mean,
        })
    }

    /// Coefficients of `sample` along every kept axis.
    pub fn project(&self, sample: &DVector<f64>) -> DVector<f64> {
        let centered = sample - &self.mean;
        DVector::from_iterator(self.axes.len(), self.axes.iter().map(|axis| axis.dot(&centered)))
    }

    /// Standard deviation along the strongest axis.
    pub fn dominant_deviation(&self) -> f64 {
        self.variances.first().copied().unwrap_or(0.0).sqrt()
    }
}
