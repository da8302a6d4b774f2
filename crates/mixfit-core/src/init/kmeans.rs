// =============================================================================
// K-Means Clustering Primitive
// =============================================================================
//
// Lloyd's algorithm with squared Euclidean distance. This is deliberately a
// plain, self-contained primitive: points + K in, centroids + assignments +
// distortion out. The initializer policies in the parent module decide how
// and on what data it runs.
//
// Empty clusters are repaired by moving the empty centroid onto the point
// currently farthest from its assigned centroid, so the algorithm always
// returns exactly K centroids.
//
// =============================================================================

use ndarray::{Array2, ArrayView1, Axis};
use rand::Rng;

use crate::error::{MixFitError, Result};

/// Outcome of one k-means run.
#[derive(Debug, Clone)]
pub struct KMeansResult {
    /// Cluster centers, one row per cluster (k x d).
    pub centroids: Array2<f64>,
    /// Index of the assigned cluster for every input point.
    pub assignments: Vec<usize>,
    /// Sum of squared distances from each point to its assigned centroid.
    pub distortion: f64,
    /// Number of Lloyd iterations run.
    pub iterations: usize,
}

fn squared_distance(a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(&x, &y)| (x - y) * (x - y))
        .sum()
}

/// Cluster `data` into `k` groups, seeding the centroids from `k` distinct
/// points chosen at random.
pub fn cluster<R: Rng>(
    data: &Array2<f64>,
    k: usize,
    max_iterations: usize,
    rng: &mut R,
) -> Result<KMeansResult> {
    let n = data.nrows();
    if k == 0 {
        return Err(MixFitError::InvalidConfiguration(
            "number of clusters must be at least 1".to_string(),
        ));
    }
    if n == 0 {
        return Err(MixFitError::EmptyInput("data has no points".to_string()));
    }
    if k > n {
        return Err(MixFitError::InvalidConfiguration(format!(
            "cannot form {k} clusters from {n} points"
        )));
    }

    let seeds = rand::seq::index::sample(rng, n, k).into_vec();
    let centroids = data.select(Axis(0), &seeds);
    lloyd(data, centroids, max_iterations)
}

/// Cluster `data` starting from explicitly supplied centroids.
///
/// Used by the refined-start initializer, which evaluates each candidate
/// seeding on the pooled centroid set.
pub fn cluster_with_centroids(
    data: &Array2<f64>,
    initial_centroids: Array2<f64>,
    max_iterations: usize,
) -> Result<KMeansResult> {
    if data.nrows() == 0 {
        return Err(MixFitError::EmptyInput("data has no points".to_string()));
    }
    if initial_centroids.ncols() != data.ncols() {
        return Err(MixFitError::DimensionMismatch(format!(
            "centroids have dimensionality {} but data has {}",
            initial_centroids.ncols(),
            data.ncols()
        )));
    }
    if initial_centroids.nrows() == 0 || initial_centroids.nrows() > data.nrows() {
        return Err(MixFitError::InvalidConfiguration(format!(
            "cannot form {} clusters from {} points",
            initial_centroids.nrows(),
            data.nrows()
        )));
    }
    lloyd(data, initial_centroids, max_iterations)
}

fn lloyd(data: &Array2<f64>, mut centroids: Array2<f64>, max_iterations: usize) -> Result<KMeansResult> {
    let n = data.nrows();
    let d = data.ncols();
    let k = centroids.nrows();

    let mut assignments = vec![0usize; n];
    let mut iterations = 0;

    loop {
        iterations += 1;

        // Assignment step.
        let mut changed = false;
        for (i, point) in data.outer_iter().enumerate() {
            let mut best = 0;
            let mut best_dist = f64::INFINITY;
            for (c, centroid) in centroids.outer_iter().enumerate() {
                let dist = squared_distance(point, centroid);
                if dist < best_dist {
                    best_dist = dist;
                    best = c;
                }
            }
            if assignments[i] != best {
                assignments[i] = best;
                changed = true;
            }
        }
        if !changed && iterations > 1 {
            break;
        }

        // Update step.
        // No typed sink pins the accumulator's element type; spell it out.
        let mut sums = Array2::<f64>::zeros((k, d));
        let mut counts = vec![0usize; k];
        for (i, point) in data.outer_iter().enumerate() {
            let c = assignments[i];
            counts[c] += 1;
            for j in 0..d {
                sums[[c, j]] += point[j];
            }
        }
        for c in 0..k {
            if counts[c] > 0 {
                for j in 0..d {
                    centroids[[c, j]] = sums[[c, j]] / counts[c] as f64;
                }
            } else {
                // Empty cluster: reseed on the point farthest from its
                // current centroid.
                let (far, _) = data.outer_iter().enumerate().fold(
                    (0, f64::NEG_INFINITY),
                    |(best_i, best_d), (i, point)| {
                        let dist = squared_distance(point, centroids.row(assignments[i]));
                        if dist > best_d {
                            (i, dist)
                        } else {
                            (best_i, best_d)
                        }
                    },
                );
                centroids.row_mut(c).assign(&data.row(far));
                assignments[far] = c;
            }
        }

        if max_iterations > 0 && iterations >= max_iterations {
            break;
        }
    }

    let distortion = data
        .outer_iter()
        .enumerate()
        .map(|(i, point)| squared_distance(point, centroids.row(assignments[i])))
        .sum();

    Ok(KMeansResult {
        centroids,
        assignments,
        distortion,
        iterations,
    })
}

// =============================================================================
// Tests
// =============================================================================
