//! Error types for the bearing-only particle filter

use thiserror::Error;

/// Errors returned by fallible filter operations.
///
/// Malformed observations and non-detections are not errors; they are absorbed by the weight
/// update. Only conditions the filter cannot recover from without masking a modeling failure
/// are surfaced here.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FilterError {
    /// Every particle carries zero weight at resample time.
    #[error("Zero total weight for particles")]
    DegenerateWeights,

    /// The total particle weight is NaN or infinite.
    #[error("Non-finite total weight for particles: {total}")]
    NonFiniteWeights { total: f64 },

    /// A construction-time parameter is out of range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A filter was constructed from an empty particle set.
    #[error("Particle population must contain at least one particle")]
    EmptyPopulation,
}
