//! Bearing observations and the bearing sensor observation model
//!
//! A [`BearingSensor`] sits at a fixed position and reports the direction to the target when the
//! target is within range. The reported bearing is corrupted with Gaussian angular noise. Each
//! reading also carries a position fix perturbed with Gaussian noise; the fix is recorded for
//! export but the likelihood ignores it, so the filter fuses bearings only.
//!
//! # Observation rows
//!
//! Observations can also be carried as raw rows `[sensor_id, bearing, x, y]`, which is how
//! recorded sensor logs store them. [`Observation`] implements `TryFrom<&[f64]>` for that form.
use crate::particle::Particle;
use crate::{FilterError, gaussian_pdf, wrap_to_pi};

use nalgebra::Vector2;
use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

/// A single bearing reading produced by one sensor for the current true target position.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Index of the producing sensor in the sensor list passed alongside the batch
    pub sensor_id: usize,
    /// Measured bearing from the sensor to the target in radians, in (-π, π]
    pub bearing: f64,
    /// Noisy position fix, x component
    pub x: f64,
    /// Noisy position fix, y component
    pub y: f64,
}

impl Observation {
    pub fn new(sensor_id: usize, bearing: f64, x: f64, y: f64) -> Self {
        Observation {
            sensor_id,
            bearing,
            x,
            y,
        }
    }

    /// The noisy position fix as a vector.
    pub fn position(&self) -> Vector2<f64> {
        Vector2::new(self.x, self.y)
    }
}

/// Parse a sensor id stored as a float in a raw observation row.
///
/// Returns `None` for negative, fractional, or non-finite ids.
pub fn sensor_id_from_row(row: &[f64]) -> Option<usize> {
    let id = *row.first()?;
    if id.is_finite() && id >= 0.0 && id.fract() == 0.0 {
        Some(id as usize)
    } else {
        None
    }
}

impl TryFrom<&[f64]> for Observation {
    type Error = &'static str;
    /// Attempts to create an Observation from a `[sensor_id, bearing, x, y]` row.
    fn try_from(row: &[f64]) -> Result<Self, Self::Error> {
        if row.len() < 4 {
            return Err("Observation row must have at least 4 elements [sensor_id, bearing, x, y]");
        }
        let sensor_id = sensor_id_from_row(row)
            .ok_or("Observation sensor id must be a non-negative integer")?;
        Ok(Observation::new(sensor_id, row[1], row[2], row[3]))
    }
}

impl From<Observation> for Vec<f64> {
    fn from(observation: Observation) -> Self {
        vec![
            observation.sensor_id as f64,
            observation.bearing,
            observation.x,
            observation.y,
        ]
    }
}

/// Scores how consistent an observation is with a hypothesized particle state.
pub trait ObservationModel {
    /// Likelihood `p(observation | particle)`, always `>= 0`.
    fn likelihood(&self, observation: &Observation, particle: &Particle) -> f64;
}

/// A fixed bearing sensor with a circular detection range.
///
/// Immutable geometry and noise parameters: position, maximum detection range, bearing noise
/// standard deviation (degrees), and position-fix noise standard deviation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BearingSensor {
    x: f64,
    y: f64,
    max_range: f64,
    bearing_std_degrees: f64,
    position_std: f64,
}

impl BearingSensor {
    /// Create a new bearing sensor.
    ///
    /// # Panics
    /// If the parameters fail [`BearingSensor::validate`].
    pub fn new(
        x: f64,
        y: f64,
        max_range: f64,
        bearing_std_degrees: f64,
        position_std: f64,
    ) -> Self {
        let sensor = BearingSensor {
            x,
            y,
            max_range,
            bearing_std_degrees,
            position_std,
        };
        if let Err(e) = sensor.validate() {
            panic!("{}", e);
        }
        sensor
    }

    /// Check the sensor parameters. Bearing noise must be strictly positive so the likelihood
    /// stays a proper density.
    pub fn validate(&self) -> Result<(), FilterError> {
        if !(self.x.is_finite() && self.y.is_finite()) {
            return Err(FilterError::InvalidConfig(
                "sensor position must be finite".to_string(),
            ));
        }
        if !(self.max_range >= 0.0) {
            return Err(FilterError::InvalidConfig(format!(
                "sensor max_range must be non-negative, got {}",
                self.max_range
            )));
        }
        if !(self.bearing_std_degrees > 0.0 && self.bearing_std_degrees.is_finite()) {
            return Err(FilterError::InvalidConfig(format!(
                "sensor bearing_std_degrees must be positive, got {}",
                self.bearing_std_degrees
            )));
        }
        if !(self.position_std >= 0.0 && self.position_std.is_finite()) {
            return Err(FilterError::InvalidConfig(format!(
                "sensor position_std must be non-negative, got {}",
                self.position_std
            )));
        }
        Ok(())
    }

    pub fn position(&self) -> Vector2<f64> {
        Vector2::new(self.x, self.y)
    }

    pub fn max_range(&self) -> f64 {
        self.max_range
    }

    pub fn bearing_std_degrees(&self) -> f64 {
        self.bearing_std_degrees
    }

    pub fn position_std(&self) -> f64 {
        self.position_std
    }

    /// Bearing noise variance in radians squared.
    pub fn bearing_variance(&self) -> f64 {
        self.bearing_std_degrees.to_radians().powi(2)
    }

    /// Bearing from the sensor to `point`, `atan2(dy, dx)`.
    pub fn bearing_to(&self, point: &Vector2<f64>) -> f64 {
        (point.y - self.y).atan2(point.x - self.x)
    }

    /// True iff the Euclidean distance from the sensor to the target is within `max_range`.
    pub fn can_detect(&self, target: &Vector2<f64>) -> bool {
        (target - self.position()).norm() <= self.max_range
    }

    /// Synthesize a noisy reading of the target.
    ///
    /// Returns `None` when the target is out of range; no observation is constructed for an
    /// undetectable target.
    pub fn observe<R: Rng>(
        &self,
        sensor_id: usize,
        target: &Vector2<f64>,
        rng: &mut R,
    ) -> Option<Observation> {
        if !self.can_detect(target) {
            return None;
        }
        let bearing_noise: f64 = rng.sample(StandardNormal);
        let bearing = wrap_to_pi(
            self.bearing_to(target) + bearing_noise * self.bearing_std_degrees.to_radians(),
        );
        let x_noise: f64 = rng.sample(StandardNormal);
        let y_noise: f64 = rng.sample(StandardNormal);
        Some(Observation::new(
            sensor_id,
            bearing,
            target.x + x_noise * self.position_std,
            target.y + y_noise * self.position_std,
        ))
    }
}

impl ObservationModel for BearingSensor {
    /// Gaussian density of the wrapped difference between the bearing predicted for the
    /// particle and the measured bearing. A non-finite measured bearing has likelihood zero.
    fn likelihood(&self, observation: &Observation, particle: &Particle) -> f64 {
        if !observation.bearing.is_finite() {
            return 0.0;
        }
        let predicted = self.bearing_to(&particle.position());
        let difference = wrap_to_pi(predicted - observation.bearing);
        gaussian_pdf(difference, self.bearing_variance())
    }
}
