//! Bearing-only target tracking with a sequential importance resampling particle filter
//!
//! This crate estimates the position of a moving target from noisy, intermittent bearing
//! observations. A population of weighted hypotheses (particles) is propagated through a motion
//! model, reweighted against sensor likelihoods, and periodically resampled to fight weight
//! degeneracy. The estimator is a classic recursive Bayesian filter: predict, weight, resample,
//! estimate.
//!
//! This crate is primarily built off of the following dependencies:
//! - [`nalgebra`](https://crates.io/crates/nalgebra): 2-D position, velocity, and covariance types.
//! - [`rand`](https://crates.io/crates/rand) and [`rand_distr`](https://crates.io/crates/rand_distr): Random
//!   number generation for initialization, sensor noise synthesis, and resampling.
//! - [`serde`](https://crates.io/crates/serde) and [`csv`](https://crates.io/crates/csv): Scenario
//!   configuration and particle state export.
//!
//! ## Crate overview
//!
//! - [error]: The error type returned by fallible filter operations.
//! - [particle]: A single weighted hypothesis (position, velocity, weight).
//! - [motion]: Motion models used to propagate particles between observations.
//! - [sensor]: Bearing observations and the bearing sensor observation model.
//! - [resample]: Cumulative weight distributions and resampling index selection.
//! - [filter]: The particle filter estimation engine.
//! - [sim]: A world simulator, particle state export, and a headless driver loop.
//!
//! ## Filter cycle
//!
//! ```rust
//! use bearingtrack::filter::{ParticleFilter, ParticleFilterConfig};
//! use bearingtrack::motion::ConstantVelocity;
//! use bearingtrack::sensor::{BearingSensor, Observation};
//!
//! let config = ParticleFilterConfig {
//!     num_particles: 200,
//!     ..Default::default()
//! };
//! let mut pf = ParticleFilter::new(&config, ConstantVelocity::new(12.0, 20.0)).unwrap();
//! let sensors = vec![BearingSensor::new(0.0, 1500.0, 2500.0, 15.0, 100.0)];
//! let observations = vec![Observation::new(0, -1.2, 0.0, 0.0)];
//!
//! pf.motion_update();
//! pf.update_weights(&observations, &sensors);
//! let estimate = pf.estimate();
//! pf.resample().unwrap();
//! assert!(estimate.x.is_finite() && estimate.y.is_finite());
//! ```
//!
//! ## Angles
//!
//! All bearings are in radians, measured counter-clockwise from the +x axis as returned by
//! `atan2(dy, dx)`, and kept in the half-open interval (-π, π] by [`wrap_to_pi`]. Sensor noise
//! parameters are configured in degrees for readability and converted on use.
pub mod error;
pub mod filter;
pub mod motion;
pub mod particle;
pub mod resample;
pub mod sensor;
pub mod sim;

pub use error::FilterError;
pub use filter::{ParticleFilter, ParticleFilterConfig};
pub use motion::{ConstantVelocity, MotionModel};
pub use particle::Particle;
pub use resample::ResamplingStrategy;
pub use sensor::{BearingSensor, Observation, ObservationModel};

use std::f64::consts::{PI, TAU};

/// Time step used by [`ParticleFilter::motion_update`] (seconds).
pub const DEFAULT_TIME_STEP: f64 = 1.0;

/// Added to every likelihood before taking its logarithm so an impossible reading cannot
/// produce `ln(0)`.
pub const LIKELIHOOD_FLOOR: f64 = 1e-10;

/// Wrap an angle into the half-open interval (-π, π].
///
/// Angles already inside the interval are returned unchanged, which makes the function exactly
/// idempotent. Non-finite input is passed through.
///
/// # Example
/// ```rust
/// use bearingtrack::wrap_to_pi;
/// use std::f64::consts::PI;
///
/// assert_eq!(wrap_to_pi(-PI), PI);
/// assert!((wrap_to_pi(3.0 * PI / 2.0) + PI / 2.0).abs() < 1e-12);
/// ```
pub fn wrap_to_pi(angle: f64) -> f64 {
    if !angle.is_finite() || (angle > -PI && angle <= PI) {
        return angle;
    }
    let wrapped = angle.rem_euclid(TAU);
    // rem_euclid yields [0, 2π]; the subtraction is exact for wrapped in (π, 2π]
    if wrapped > PI { wrapped - TAU } else { wrapped }
}

/// Zero-mean Gaussian probability density evaluated at `x` for the given variance.
pub fn gaussian_pdf(x: f64, variance: f64) -> f64 {
    (-0.5 * x * x / variance).exp() / (2.0 * PI * variance).sqrt()
}
