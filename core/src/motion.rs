//! Motion models for propagating particles between observations
//!
//! A motion model advances a particle's kinematic state by one time step. The filter applies it
//! to every particle during the predict step. Motion models also bound the speeds sampled when
//! the filter draws its initial population; those bounds are not enforced afterwards, and
//! resampling perturbation may push velocities outside them.
use crate::particle::Particle;

/// Propagates a particle through time.
pub trait MotionModel {
    /// Advance `particle` by `dt` in place.
    fn predict(&self, particle: &mut Particle, dt: f64);

    /// `(min_speed, max_speed)` used when sampling initial particle velocities.
    fn speed_bounds(&self) -> (f64, f64);
}

/// Constant-velocity kinematics: `position += velocity * dt`.
///
/// Deterministic; velocity is never modified.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ConstantVelocity {
    min_speed: f64,
    max_speed: f64,
}

impl ConstantVelocity {
    /// Create a constant-velocity model with the given initialization speed bounds.
    pub fn new(min_speed: f64, max_speed: f64) -> Self {
        ConstantVelocity {
            min_speed,
            max_speed,
        }
    }

    pub fn min_speed(&self) -> f64 {
        self.min_speed
    }

    pub fn max_speed(&self) -> f64 {
        self.max_speed
    }
}

impl MotionModel for ConstantVelocity {
    fn predict(&self, particle: &mut Particle, dt: f64) {
        let position = particle.position() + particle.velocity() * dt;
        particle.set_position(position);
    }

    fn speed_bounds(&self) -> (f64, f64) {
        (self.min_speed, self.max_speed)
    }
}
