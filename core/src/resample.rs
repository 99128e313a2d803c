//! Resampling index selection
//!
//! Resampling draws a new population from the current one in proportion to the importance
//! weights. The functions here only decide *which* source particles are selected; building the
//! replacement particles (roughening, uniform weights) is done by the filter.
//!
//! Every strategy works against the normalized cumulative distribution of the weights and fails
//! with [`FilterError::DegenerateWeights`] when the total weight is exactly zero. That condition
//! means every hypothesis was judged impossible and is never silently repaired.
use crate::FilterError;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Strategy used to select source particles during resampling.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum ResamplingStrategy {
    /// One uniform offset and N evenly spaced points swept against the CDF; O(N), low variance.
    #[default]
    Systematic,
    /// One uniform draw inside each of the N equal strata.
    Stratified,
    /// N independent uniform draws.
    Multinomial,
    /// Deterministic copies of `floor(N·w)` followed by systematic selection on the residuals.
    Residual,
}

impl ResamplingStrategy {
    /// Select `weights.len()` source indices.
    pub fn select<R: Rng>(&self, weights: &[f64], rng: &mut R) -> Result<Vec<usize>, FilterError> {
        let n = weights.len();
        match self {
            ResamplingStrategy::Systematic => {
                let cdf = cumulative_distribution(weights)?;
                let u = rng.random_range(0.0..1.0 / n as f64);
                Ok(sweep(&cdf, systematic_points(n, u)))
            }
            ResamplingStrategy::Stratified => {
                let cdf = cumulative_distribution(weights)?;
                let points = (0..n).map(|i| (i as f64 + rng.random::<f64>()) / n as f64);
                Ok(sweep(&cdf, points.collect::<Vec<_>>()))
            }
            ResamplingStrategy::Multinomial => {
                let cdf = cumulative_distribution(weights)?;
                let mut points: Vec<f64> = (0..n).map(|_| rng.random::<f64>()).collect();
                points.sort_by(f64::total_cmp);
                Ok(sweep(&cdf, points))
            }
            ResamplingStrategy::Residual => residual_indices(weights, rng),
        }
    }
}

/// Normalized cumulative distribution of `weights`: `cdf[i] = cdf[i-1] + w_i / Σw`.
///
/// # Errors
/// - [`FilterError::EmptyPopulation`] for an empty slice
/// - [`FilterError::DegenerateWeights`] if `Σw == 0`
/// - [`FilterError::NonFiniteWeights`] if `Σw` is NaN or infinite
pub fn cumulative_distribution(weights: &[f64]) -> Result<Vec<f64>, FilterError> {
    if weights.is_empty() {
        return Err(FilterError::EmptyPopulation);
    }
    let total: f64 = weights.iter().sum();
    if total == 0.0 {
        return Err(FilterError::DegenerateWeights);
    }
    if !total.is_finite() {
        return Err(FilterError::NonFiniteWeights { total });
    }
    let mut cdf = Vec::with_capacity(weights.len());
    let mut running = 0.0;
    for w in weights {
        running += w / total;
        cdf.push(running);
    }
    Ok(cdf)
}

/// Systematic selection for a fixed offset `u` in `[0, 1/N)`.
///
/// Sample point `i` is `β = u + i/N`. A single cursor sweeps the CDF forward and is never reset,
/// so the returned indices are non-decreasing.
///
/// # Example
/// ```rust
/// use bearingtrack::resample::systematic_indices;
///
/// let indices = systematic_indices(&[0.1, 0.1, 0.8], 0.05).unwrap();
/// assert_eq!(indices, vec![0, 2, 2]);
/// ```
pub fn systematic_indices(weights: &[f64], u: f64) -> Result<Vec<usize>, FilterError> {
    let cdf = cumulative_distribution(weights)?;
    Ok(sweep(&cdf, systematic_points(weights.len(), u)))
}

fn systematic_points(n: usize, u: f64) -> Vec<f64> {
    let step = 1.0 / n as f64;
    (0..n).map(|i| u + i as f64 * step).collect()
}

/// Walk non-decreasing sample points against the CDF with one forward cursor.
///
/// The cursor stops at the last index, which absorbs rounding in the final CDF entry.
fn sweep(cdf: &[f64], points: Vec<f64>) -> Vec<usize> {
    let last = cdf.len() - 1;
    let mut indices = Vec::with_capacity(points.len());
    let mut j = 0;
    for beta in points {
        while j < last && cdf[j] < beta {
            j += 1;
        }
        indices.push(j);
    }
    indices
}

fn residual_indices<R: Rng>(weights: &[f64], rng: &mut R) -> Result<Vec<usize>, FilterError> {
    let cdf = cumulative_distribution(weights)?;
    let n = weights.len();
    let total: f64 = weights.iter().sum();

    let mut indices = Vec::with_capacity(n);
    let mut residual = Vec::with_capacity(n);
    for (i, w) in weights.iter().enumerate() {
        let expected = w / total * n as f64;
        let copies = expected.floor() as usize;
        indices.extend(std::iter::repeat_n(i, copies));
        residual.push(expected - copies as f64);
    }
    // Rounding can push the deterministic part past N
    indices.truncate(n);

    let remaining = n - indices.len();
    if remaining > 0 {
        let residual_cdf = cumulative_distribution(&residual).unwrap_or(cdf);
        let u = rng.random_range(0.0..1.0 / remaining as f64);
        indices.extend(sweep(&residual_cdf, systematic_points(remaining, u)));
    }
    Ok(indices)
}
