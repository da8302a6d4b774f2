// =============================================================================
// Cluster-Based Initialization
// =============================================================================
//
// EM converges to a local maximum; where it starts matters. The initializer
// policies produce the K starting centroids that become the initial component
// means (covariances start at identity, weights uniform):
//
//   - KMeans:       one k-means run over the full dataset.
//   - RefinedStart: the Bradley & Fayyad (1998) scheme. Run k-means on
//                   several small random sub-samples, pool the candidate
//                   centroid sets, then cluster the pooled set itself once
//                   per candidate seeding and keep the lowest-distortion
//                   solution. The sub-sampled runs are cheap and explore the
//                   mode structure far better than a single random seeding.
//
// Like the covariance constraints, this is a closed set of policies selected
// once per training configuration.
//
// =============================================================================

pub mod kmeans;

use ndarray::{Array2, Axis};
use rand::Rng;

use crate::error::{MixFitError, Result};

/// Default number of sub-samplings for the refined start.
pub const DEFAULT_SAMPLINGS: usize = 100;
/// Default fraction of the dataset used per sub-sampling.
pub const DEFAULT_PERCENTAGE: f64 = 0.02;

/// Iteration cap handed to the underlying k-means runs.
const KMEANS_MAX_ITERATIONS: usize = 1000;

/// Policy producing the K initial centroids for one EM trial.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Initializer {
    /// A single k-means run over the full dataset.
    KMeans,
    /// Bradley-Fayyad refined start over `samplings` sub-samples, each
    /// holding `percentage` of the data (0 < percentage <= 1).
    RefinedStart { samplings: usize, percentage: f64 },
}

impl Default for Initializer {
    fn default() -> Self {
        Self::KMeans
    }
}

impl Initializer {
    /// The refined start with the original default parameters.
    pub fn refined_start() -> Self {
        Self::RefinedStart {
            samplings: DEFAULT_SAMPLINGS,
            percentage: DEFAULT_PERCENTAGE,
        }
    }

    /// Reject out-of-range parameters before any clustering work begins.
    pub fn validate(&self) -> Result<()> {
        match *self {
            Self::KMeans => Ok(()),
            Self::RefinedStart { samplings, percentage } => {
                if samplings == 0 {
                    return Err(MixFitError::InvalidConfiguration(
                        "refined start needs at least one sampling".to_string(),
                    ));
                }
                if !(percentage > 0.0 && percentage <= 1.0) {
                    return Err(MixFitError::InvalidConfiguration(format!(
                        "refined start percentage must be in (0, 1], got {percentage}"
                    )));
                }
                Ok(())
            }
        }
    }

    /// Produce `k` initial centroids for the given data.
    pub fn initial_centroids<R: Rng>(
        &self,
        data: &Array2<f64>,
        k: usize,
        rng: &mut R,
    ) -> Result<Array2<f64>> {
        self.validate()?;
        match *self {
            Self::KMeans => {
                let result = kmeans::cluster(data, k, KMEANS_MAX_ITERATIONS, rng)?;
                Ok(result.centroids)
            }
            Self::RefinedStart { samplings, percentage } => {
                refined_start(data, k, samplings, percentage, rng)
            }
        }
    }
}

/// Bradley-Fayyad refined start.
///
/// Phase 1 clusters `samplings` random sub-samples, collecting one candidate
/// centroid set per sampling. Phase 2 clusters the pooled candidates once per
/// candidate seeding; the seeding whose solution has the lowest distortion
/// over the pooled set wins, and its refined centroids are returned.
fn refined_start<R: Rng>(
    data: &Array2<f64>,
    k: usize,
    samplings: usize,
    percentage: f64,
    rng: &mut R,
) -> Result<Array2<f64>> {
    let n = data.nrows();
    let d = data.ncols();
    if k > n {
        return Err(MixFitError::InvalidConfiguration(format!(
            "cannot form {k} clusters from {n} points"
        )));
    }

    // Each sub-sample must still hold at least k points.
    let sample_size = ((percentage * n as f64).ceil() as usize).clamp(k, n);

    // Phase 1: candidate centroid sets from the sub-samples.
    let mut candidates: Vec<Array2<f64>> = Vec::with_capacity(samplings);
    for _ in 0..samplings {
        let result = if sample_size == n {
            // Full dataset: no sampling, and identical behavior to a plain
            // k-means run from the same generator state.
            kmeans::cluster(data, k, KMEANS_MAX_ITERATIONS, rng)?
        } else {
            let indices = rand::seq::index::sample(rng, n, sample_size).into_vec();
            let subsample = data.select(Axis(0), &indices);
            kmeans::cluster(&subsample, k, KMEANS_MAX_ITERATIONS, rng)?
        };
        candidates.push(result.centroids);
    }

    // Pool all candidate centroids into one (samplings * k, d) matrix.
    let mut pooled = Array2::zeros((samplings * k, d));
    for (s, candidate) in candidates.iter().enumerate() {
        for c in 0..k {
            for j in 0..d {
                pooled[[s * k + c, j]] = candidate[[c, j]];
            }
        }
    }

    // Phase 2: refine over the pooled set, one run per candidate seeding.
    let mut best: Option<KRefined> = None;
    for candidate in candidates {
        let result = kmeans::cluster_with_centroids(&pooled, candidate, KMEANS_MAX_ITERATIONS)?;
        let better = match &best {
            Some(current) => result.distortion < current.distortion,
            None => true,
        };
        if better {
            best = Some(KRefined {
                centroids: result.centroids,
                distortion: result.distortion,
            });
        }
    }

    // samplings >= 1 was validated, so phase 2 saw at least one candidate.
    best.map(|b| b.centroids)
        .ok_or_else(|| MixFitError::InvalidConfiguration("no candidate seedings".to_string()))
}

struct KRefined {
    centroids: Array2<f64>,
    distortion: f64,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn two_blobs() -> Array2<f64> {
        array![
            [0.0, 0.1],
            [0.1, -0.1],
            [-0.1, 0.0],
            [0.05, 0.05],
            [10.0, 10.1],
            [10.1, 9.9],
            [9.9, 10.0],
            [10.05, 9.95],
        ]
    }

    #[test]
    fn test_validate_rejects_zero_samplings() {
        let init = Initializer::RefinedStart { samplings: 0, percentage: 0.5 };
        assert!(matches!(
            init.validate().unwrap_err(),
            MixFitError::InvalidConfiguration(_)
        ));
    }

    #[test]
    fn test_validate_rejects_bad_percentage() {
        for percentage in [0.0, -0.5, 1.5] {
            let init = Initializer::RefinedStart { samplings: 10, percentage };
            assert!(
                init.validate().is_err(),
                "percentage {percentage} should be rejected"
            );
        }
        // 1.0 inclusive is allowed.
        let init = Initializer::RefinedStart { samplings: 10, percentage: 1.0 };
        assert!(init.validate().is_ok());
    }

    #[test]
    fn test_plain_kmeans_finds_blob_centers() {
        let data = two_blobs();
        let mut rng = StdRng::seed_from_u64(2);
        let centroids = Initializer::KMeans
            .initial_centroids(&data, 2, &mut rng)
            .unwrap();
        let mut xs: Vec<f64> = centroids.outer_iter().map(|c| c[0]).collect();
        xs.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert!(xs[0].abs() < 0.5);
        assert!((xs[1] - 10.0).abs() < 0.5);
    }

    #[test]
    fn test_degenerate_refined_start_equals_plain_kmeans() {
        // One sampling over the full dataset is exactly one plain k-means
        // run; the refinement phase then re-clusters k centroids into k
        // clusters, a fixed point. Same seed, identical output.
        let data = two_blobs();
        let plain = Initializer::KMeans
            .initial_centroids(&data, 2, &mut StdRng::seed_from_u64(17))
            .unwrap();
        let refined = Initializer::RefinedStart { samplings: 1, percentage: 1.0 }
            .initial_centroids(&data, 2, &mut StdRng::seed_from_u64(17))
            .unwrap();
        assert_eq!(plain, refined);
    }

    #[test]
    fn test_refined_start_produces_k_centroids() {
        let data = two_blobs();
        let mut rng = StdRng::seed_from_u64(8);
        let centroids = Initializer::RefinedStart { samplings: 5, percentage: 0.5 }
            .initial_centroids(&data, 2, &mut rng)
            .unwrap();
        assert_eq!(centroids.nrows(), 2);
        assert_eq!(centroids.ncols(), 2);
        // Refined centers should separate the blobs.
        let mut xs: Vec<f64> = centroids.outer_iter().map(|c| c[0]).collect();
        xs.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert!(xs[0] < 5.0 && xs[1] > 5.0);
    }
}
