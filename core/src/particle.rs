//! A single weighted hypothesis of the target's kinematic state.
use nalgebra::Vector2;
use std::fmt::{self, Display};

/// One weighted hypothesis: position, locally constant velocity, importance weight.
///
/// Particles are plain values. Cloning (or copying) produces an independent particle and no
/// particle refers to another. Velocity is fixed at creation and only changes when resampling
/// draws a new, perturbed particle. The weight is written by the filter only.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Particle {
    position: Vector2<f64>,
    velocity: Vector2<f64>,
    weight: f64,
}

impl Display for Particle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Particle")
            .field("x", &self.position.x)
            .field("y", &self.position.y)
            .field("vx", &self.velocity.x)
            .field("vy", &self.velocity.y)
            .field("weight", &self.weight)
            .finish()
    }
}

impl Particle {
    /// Create a new particle.
    ///
    /// # Panics
    /// If `weight` is negative or NaN.
    pub fn new(position: Vector2<f64>, velocity: Vector2<f64>, weight: f64) -> Particle {
        assert!(weight >= 0.0, "Particle weight must be non-negative");
        Particle {
            position,
            velocity,
            weight,
        }
    }

    /// Position `(x, y)`.
    pub fn position(&self) -> Vector2<f64> {
        self.position
    }

    /// Velocity `(vx, vy)` per unit time.
    pub fn velocity(&self) -> Vector2<f64> {
        self.velocity
    }

    /// Speed, the norm of the velocity.
    pub fn speed(&self) -> f64 {
        self.velocity.norm()
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    /// Move the particle. Used by motion models; velocity is left untouched.
    pub fn set_position(&mut self, position: Vector2<f64>) {
        self.position = position;
    }

    pub(crate) fn set_weight(&mut self, weight: f64) {
        self.weight = weight;
    }
}

impl From<(f64, f64, f64, f64, f64)> for Particle {
    /// Builds a particle from an `(x, y, vx, vy, weight)` tuple.
    fn from(tuple: (f64, f64, f64, f64, f64)) -> Self {
        let (x, y, vx, vy, weight) = tuple;
        Particle::new(Vector2::new(x, y), Vector2::new(vx, vy), weight)
    }
}
