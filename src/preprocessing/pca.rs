//! Principal Component Analysis
//!
//! Linear dimensionality reduction for flow feature vectors. The mean and
//! covariance are gathered by a [`CovarianceAccumulator`], a mergeable
//! running-moment reduction, so partial statistics from any number of data
//! partitions combine into the same model. The top-k eigenvectors of the
//! covariance matrix are then extracted with cyclic Jacobi rotations.

use crate::error::{IdsError, Result};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Rows per partition when accumulating moments in parallel
const ACCUMULATION_CHUNK: usize = 4096;

/// Maximum number of Jacobi sweeps
const MAX_SWEEPS: usize = 100;

/// Eigenvalue floor per dimension, in ulps of the largest eigenvalue.
/// Only directions lost to rounding count as degenerate.
const RANK_TOLERANCE: f64 = 8.0 * f64::EPSILON;

/// Running mean and co-moment matrix over a set of vectors.
///
/// `accumulate` and `merge` form an associative, commutative reduction (up to
/// floating-point summation order), so partitions can be accumulated
/// independently and merged in any order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CovarianceAccumulator {
    count: usize,
    mean: Array1<f64>,
    comoment: Array2<f64>,
}

impl CovarianceAccumulator {
    /// Empty accumulator for `n_features`-dimensional vectors
    pub fn new(n_features: usize) -> Self {
        Self {
            count: 0,
            mean: Array1::zeros(n_features),
            comoment: Array2::zeros((n_features, n_features)),
        }
    }

    /// Fold one vector into the running moments
    pub fn accumulate(mut self, x: ArrayView1<f64>) -> Self {
        self.count += 1;
        let delta = &x - &self.mean;
        self.mean.scaled_add(1.0 / self.count as f64, &delta);
        let delta_after = &x - &self.mean;

        let d = self.mean.len();
        for i in 0..d {
            for j in 0..d {
                self.comoment[[i, j]] += delta[i] * delta_after[j];
            }
        }
        self
    }

    /// Combine the moments of two disjoint partitions
    pub fn merge(self, other: Self) -> Self {
        if other.count == 0 {
            return self;
        }
        if self.count == 0 {
            return other;
        }

        let n_a = self.count as f64;
        let n_b = other.count as f64;
        let n = n_a + n_b;
        let delta = &other.mean - &self.mean;

        let mut mean = self.mean;
        mean.scaled_add(n_b / n, &delta);

        let mut comoment = self.comoment + &other.comoment;
        let weight = n_a * n_b / n;
        let d = mean.len();
        for i in 0..d {
            for j in 0..d {
                comoment[[i, j]] += weight * delta[i] * delta[j];
            }
        }

        Self {
            count: self.count + other.count,
            mean,
            comoment,
        }
    }

    /// Accumulate the rows of a matrix, one partition per chunk of rows.
    ///
    /// Chunks are merged in row order, so the result does not depend on the
    /// number of worker threads.
    pub fn from_rows(x: ArrayView2<f64>) -> Self {
        let d = x.ncols();
        let chunks: Vec<ArrayView2<f64>> = x.axis_chunks_iter(Axis(0), ACCUMULATION_CHUNK).collect();

        chunks
            .par_iter()
            .map(|chunk| {
                chunk
                    .rows()
                    .into_iter()
                    .fold(Self::new(d), |acc, row| acc.accumulate(row))
            })
            .collect::<Vec<_>>()
            .into_iter()
            .fold(Self::new(d), Self::merge)
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn n_features(&self) -> usize {
        self.mean.len()
    }

    pub fn mean(&self) -> &Array1<f64> {
        &self.mean
    }

    /// Sample covariance (n - 1 normalisation)
    pub fn covariance(&self) -> Array2<f64> {
        if self.count < 2 {
            return Array2::zeros(self.comoment.raw_dim());
        }
        &self.comoment / (self.count - 1) as f64
    }
}

/// PCA configuration parameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PcaConfig {
    /// Number of output dimensions
    pub n_components: usize,
    /// Scale each feature to unit variance before projecting
    pub standardize: bool,
}

impl Default for PcaConfig {
    fn default() -> Self {
        Self {
            n_components: 6,
            standardize: false,
        }
    }
}

impl PcaConfig {
    pub fn with_components(n_components: usize) -> Self {
        Self {
            n_components,
            ..Default::default()
        }
    }
}

/// Fitted projection. Immutable and safe to share across threads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrincipalComponentModel {
    mean: Array1<f64>,
    scale: Option<Array1<f64>>,
    /// d x k, one unit-norm direction per column
    components: Array2<f64>,
    eigenvalues: Array1<f64>,
    total_variance: f64,
}

impl PrincipalComponentModel {
    pub fn n_features(&self) -> usize {
        self.components.nrows()
    }

    pub fn n_components(&self) -> usize {
        self.components.ncols()
    }

    pub fn mean(&self) -> &Array1<f64> {
        &self.mean
    }

    /// Projection matrix, columns ordered by decreasing explained variance
    pub fn components(&self) -> &Array2<f64> {
        &self.components
    }

    /// Variance captured by each component
    pub fn explained_variance(&self) -> &Array1<f64> {
        &self.eigenvalues
    }

    /// Fraction of the total variance captured by each component
    pub fn explained_variance_ratio(&self) -> Array1<f64> {
        if self.total_variance <= 0.0 {
            return Array1::zeros(self.eigenvalues.len());
        }
        self.eigenvalues.mapv(|ev| (ev / self.total_variance).max(0.0))
    }

    fn check_width(&self, width: usize) -> Result<()> {
        if width != self.n_features() {
            return Err(IdsError::ShapeError {
                expected: format!("{} features", self.n_features()),
                actual: format!("{} features", width),
            });
        }
        Ok(())
    }

    fn normalize(&self, x: ArrayView1<f64>) -> Array1<f64> {
        let centered = &x - &self.mean;
        match &self.scale {
            Some(scale) => centered / scale,
            None => centered,
        }
    }

    /// Project one vector: `(x - mean) . P`
    pub fn transform(&self, x: ArrayView1<f64>) -> Result<Array1<f64>> {
        self.check_width(x.len())?;
        Ok(self.normalize(x).dot(&self.components))
    }

    /// Project every row of `x`
    pub fn transform_batch(&self, x: ArrayView2<f64>) -> Result<Array2<f64>> {
        self.check_width(x.ncols())?;
        let mut centered = &x - &self.mean;
        if let Some(scale) = &self.scale {
            centered /= scale;
        }
        Ok(centered.dot(&self.components))
    }

    /// Map a reduced vector back into feature space
    pub fn inverse_transform(&self, reduced: ArrayView1<f64>) -> Result<Array1<f64>> {
        if reduced.len() != self.n_components() {
            return Err(IdsError::ShapeError {
                expected: format!("{} components", self.n_components()),
                actual: format!("{} components", reduced.len()),
            });
        }
        let mut restored = self.components.dot(&reduced);
        if let Some(scale) = &self.scale {
            restored *= scale;
        }
        Ok(restored + &self.mean)
    }
}

/// Fits [`PrincipalComponentModel`]s
#[derive(Debug, Clone, Default)]
pub struct PcaReducer {
    config: PcaConfig,
}

impl PcaReducer {
    pub fn new(config: PcaConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PcaConfig {
        &self.config
    }

    /// Fit a projection over the rows of `x`
    pub fn fit(&self, x: ArrayView2<f64>) -> Result<PrincipalComponentModel> {
        self.check_components()?;
        if x.nrows() == 0 {
            return Err(IdsError::EmptyDataset("PCA requires at least one vector".to_string()));
        }
        self.fit_accumulated(CovarianceAccumulator::from_rows(x))
    }

    /// Fit from moments accumulated elsewhere (e.g. merged partition results)
    pub fn fit_accumulated(&self, acc: CovarianceAccumulator) -> Result<PrincipalComponentModel> {
        self.check_components()?;
        if acc.count() == 0 {
            return Err(IdsError::EmptyDataset("PCA requires at least one vector".to_string()));
        }

        let d = acc.n_features();
        let k = self.config.n_components;
        if k > d {
            return Err(IdsError::DegenerateInput(format!(
                "{} components requested from {} features",
                k, d
            )));
        }

        let mut cov = acc.covariance();
        let scale = if self.config.standardize {
            let std = cov.diag().mapv(|v| if v > 0.0 { v.sqrt() } else { 1.0 });
            for i in 0..d {
                for j in 0..d {
                    cov[[i, j]] /= std[i] * std[j];
                }
            }
            Some(std)
        } else {
            None
        };

        let total_variance = cov.diag().sum();
        let (values, vectors) = symmetric_eigen(cov);

        let mut order: Vec<usize> = (0..d).collect();
        // Stable: equal eigenvalues keep the solver's index order
        order.sort_by(|&a, &b| {
            values[b]
                .partial_cmp(&values[a])
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let largest = values[order[0]].max(0.0);
        let floor = largest * d as f64 * RANK_TOLERANCE;
        let rank = order.iter().filter(|&&i| values[i] > floor && values[i] > 0.0).count();
        if rank < k {
            return Err(IdsError::DegenerateInput(format!(
                "covariance has rank {} but {} components were requested",
                rank, k
            )));
        }

        let mut components = Array2::zeros((d, k));
        let mut eigenvalues = Array1::zeros(k);
        for (c, &idx) in order.iter().take(k).enumerate() {
            let mut direction = vectors.column(idx).to_owned();
            orient(&mut direction);
            components.column_mut(c).assign(&direction);
            eigenvalues[c] = values[idx];
        }

        debug!(
            n_samples = acc.count(),
            n_features = d,
            n_components = k,
            captured = eigenvalues.sum() / total_variance,
            "Fitted PCA projection"
        );

        Ok(PrincipalComponentModel {
            mean: acc.mean().clone(),
            scale,
            components,
            eigenvalues,
            total_variance,
        })
    }

    fn check_components(&self) -> Result<()> {
        if self.config.n_components < 1 {
            return Err(IdsError::invalid_config(
                "n_components",
                self.config.n_components,
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Flip a direction so its largest-magnitude entry is positive
fn orient(v: &mut Array1<f64>) {
    let mut pivot = 0.0f64;
    for &x in v.iter() {
        if x.abs() > pivot.abs() {
            pivot = x;
        }
    }
    if pivot < 0.0 {
        v.mapv_inplace(|x| -x);
    }
}

/// Eigen-decomposition of a symmetric matrix by cyclic Jacobi rotations.
///
/// Returns the eigenvalues and a matrix whose columns are the matching
/// unit eigenvectors, both in the solver's index order.
fn symmetric_eigen(mut a: Array2<f64>) -> (Array1<f64>, Array2<f64>) {
    let n = a.nrows();
    let mut v = Array2::<f64>::eye(n);

    let scale: f64 = a.iter().map(|x| x * x).sum();
    if scale == 0.0 {
        return (Array1::zeros(n), v);
    }

    for _sweep in 0..MAX_SWEEPS {
        let mut off = 0.0;
        for p in 0..n {
            for q in (p + 1)..n {
                off += a[[p, q]] * a[[p, q]];
            }
        }
        if off <= scale * f64::EPSILON * f64::EPSILON {
            break;
        }

        for p in 0..n {
            for q in (p + 1)..n {
                let apq = a[[p, q]];
                if apq == 0.0 {
                    continue;
                }

                let theta = (a[[q, q]] - a[[p, p]]) / (2.0 * apq);
                let t = theta.signum() / (theta.abs() + theta.hypot(1.0));
                let c = 1.0 / t.hypot(1.0);
                let s = t * c;

                for k in 0..n {
                    let akp = a[[k, p]];
                    let akq = a[[k, q]];
                    a[[k, p]] = c * akp - s * akq;
                    a[[k, q]] = s * akp + c * akq;
                }
                for k in 0..n {
                    let apk = a[[p, k]];
                    let aqk = a[[q, k]];
                    a[[p, k]] = c * apk - s * aqk;
                    a[[q, k]] = s * apk + c * aqk;
                }
                for k in 0..n {
                    let vkp = v[[k, p]];
                    let vkq = v[[k, q]];
                    v[[k, p]] = c * vkp - s * vkq;
                    v[[k, q]] = s * vkp + c * vkq;
                }
            }
        }
    }

    (a.diag().to_owned(), v)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn random_data(n: usize, d: usize, seed: u64) -> Array2<f64> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        // Distinct per-feature scales give well separated eigenvalues
        Array2::from_shape_fn((n, d), |(_, j)| rng.gen_range(-1.0..1.0) * (j + 1) as f64)
    }

    fn reconstruction_error(model: &PrincipalComponentModel, x: &Array2<f64>) -> f64 {
        let total: f64 = x
            .rows()
            .into_iter()
            .map(|row| {
                let reduced = model.transform(row).unwrap();
                let restored = model.inverse_transform(reduced.view()).unwrap();
                (&restored - &row).mapv(|e| e * e).sum()
            })
            .sum();
        total / x.nrows() as f64
    }

    #[test]
    fn test_jacobi_known_matrix() {
        let (values, vectors) = symmetric_eigen(array![[2.0, 1.0], [1.0, 2.0]]);
        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| b.partial_cmp(a).unwrap());
        assert!((sorted[0] - 3.0).abs() < 1e-12);
        assert!((sorted[1] - 1.0).abs() < 1e-12);

        for c in 0..2 {
            let norm = vectors.column(c).dot(&vectors.column(c));
            assert!((norm - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_transform_dimensionality() {
        let x = random_data(200, 10, 1);
        for k in 1..=10 {
            let model = PcaReducer::new(PcaConfig::with_components(k)).fit(x.view()).unwrap();
            assert_eq!(model.transform(x.row(0)).unwrap().len(), k);
            assert_eq!(model.transform_batch(x.view()).unwrap().dim(), (200, k));
        }
    }

    #[test]
    fn test_variance_is_non_increasing() {
        let x = random_data(500, 8, 2);
        let model = PcaReducer::new(PcaConfig::with_components(8)).fit(x.view()).unwrap();
        let variance = model.explained_variance();
        for i in 0..variance.len() - 1 {
            assert!(variance[i] >= variance[i + 1]);
        }

        let ratio_sum: f64 = model.explained_variance_ratio().sum();
        assert!((ratio_sum - 1.0).abs() < 1e-9, "ratios sum to {}", ratio_sum);
    }

    #[test]
    fn test_components_are_orthonormal() {
        let x = random_data(300, 6, 3);
        let model = PcaReducer::new(PcaConfig::with_components(4)).fit(x.view()).unwrap();
        let gram = model.components().t().dot(model.components());
        for i in 0..4 {
            for j in 0..4 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((gram[[i, j]] - expected).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn test_reconstruction_error_non_increasing_in_k() {
        let x = random_data(300, 6, 4);
        let mut previous = f64::INFINITY;
        for k in 1..=6 {
            let model = PcaReducer::new(PcaConfig::with_components(k)).fit(x.view()).unwrap();
            let err = reconstruction_error(&model, &x);
            assert!(err <= previous + 1e-9, "k={} error {} > {}", k, err, previous);
            previous = err;
        }
        assert!(previous < 1e-9, "full-rank reconstruction should be exact");
    }

    #[test]
    fn test_dominant_axis() {
        let x = Array2::from_shape_fn((100, 2), |(i, j)| {
            if j == 0 {
                i as f64
            } else {
                (i % 3) as f64 * 0.01
            }
        });
        let model = PcaReducer::new(PcaConfig::with_components(1)).fit(x.view()).unwrap();
        let direction = model.components().column(0);
        assert!(direction[0] > 0.999, "direction = {:?}", direction);
    }

    #[test]
    fn test_standardize() {
        let x = Array2::from_shape_fn((50, 2), |(i, j)| {
            let v = i as f64;
            if j == 0 { v } else { 1000.0 * (v % 7.0) }
        });
        let config = PcaConfig {
            n_components: 2,
            standardize: true,
        };
        let model = PcaReducer::new(config).fit(x.view()).unwrap();
        // Correlation matrix trace equals the feature count
        assert!((model.explained_variance().sum() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_input() {
        let x = Array2::<f64>::zeros((0, 3));
        let result = PcaReducer::default().fit(x.view());
        assert!(matches!(result, Err(IdsError::EmptyDataset(_))));
    }

    #[test]
    fn test_zero_components() {
        let x = random_data(10, 3, 5);
        let result = PcaReducer::new(PcaConfig::with_components(0)).fit(x.view());
        assert!(matches!(result, Err(IdsError::InvalidConfiguration { .. })));
    }

    #[test]
    fn test_more_components_than_features() {
        let x = random_data(10, 3, 6);
        let result = PcaReducer::new(PcaConfig::with_components(4)).fit(x.view());
        assert!(matches!(result, Err(IdsError::DegenerateInput(_))));
    }

    #[test]
    fn test_rank_deficient() {
        // Third column duplicates the first and the second is constant: rank 1
        let x = Array2::from_shape_fn((20, 3), |(i, j)| match j {
            1 => 5.0,
            _ => i as f64,
        });
        let result = PcaReducer::new(PcaConfig::with_components(2)).fit(x.view());
        assert!(matches!(result, Err(IdsError::DegenerateInput(_))));

        // One direction is still available
        assert!(PcaReducer::new(PcaConfig::with_components(1)).fit(x.view()).is_ok());
    }

    #[test]
    fn test_mixed_scale_features_are_full_rank() {
        let mut rng = ChaCha8Rng::seed_from_u64(21);
        let x = Array2::from_shape_fn((500, 2), |(_, j)| {
            let u: f64 = rng.gen();
            if j == 0 {
                u * 1e6
            } else {
                u
            }
        });

        let model = PcaReducer::new(PcaConfig::with_components(2)).fit(x.view()).unwrap();
        let variance = model.explained_variance();
        // Uniform on [0, 1) has variance 1/12
        assert!(variance[1] > 0.05 && variance[1] < 0.12);
        assert!(variance[0] > 1e10);
    }

    #[test]
    fn test_accumulator_partition_invariance() {
        let x = random_data(97, 4, 7);
        let whole = CovarianceAccumulator::from_rows(x.view());

        let part = |range: std::ops::Range<usize>| {
            range.fold(CovarianceAccumulator::new(4), |acc, i| acc.accumulate(x.row(i)))
        };
        let merged = part(60..97).merge(part(0..25)).merge(part(25..60));

        assert_eq!(merged.count(), 97);
        let diff = (&whole.covariance() - &merged.covariance()).mapv(f64::abs);
        assert!(diff.iter().all(|&e| e < 1e-9));
        let mean_diff = (whole.mean() - merged.mean()).mapv(f64::abs);
        assert!(mean_diff.iter().all(|&e| e < 1e-12));
    }

    #[test]
    fn test_accumulator_matches_direct_covariance() {
        let x = array![[1.0, 2.0], [3.0, 6.0], [5.0, 7.0]];
        let cov = CovarianceAccumulator::from_rows(x.view()).covariance();
        // var(x0) = 4, var(x1) = 7, cov = 5
        assert!((cov[[0, 0]] - 4.0).abs() < 1e-12);
        assert!((cov[[1, 1]] - 7.0).abs() < 1e-12);
        assert!((cov[[0, 1]] - 5.0).abs() < 1e-12);
        assert!((cov[[1, 0]] - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_shape_mismatch_on_transform() {
        let x = random_data(20, 3, 8);
        let model = PcaReducer::new(PcaConfig::with_components(2)).fit(x.view()).unwrap();
        let wrong = array![1.0, 2.0];
        assert!(matches!(
            model.transform(wrong.view()),
            Err(IdsError::ShapeError { .. })
        ));
    }
}
