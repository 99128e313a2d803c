//! Sequential importance resampling particle filter for bearing-only tracking
//!
//! The filter owns a fixed-size population of [`Particle`]s and a cached point estimate. A
//! conventional cycle is:
//!
//! 1. [`ParticleFilter::motion_update`] (or [`ParticleFilter::predict`] with an explicit time
//!    step) propagates every particle through the motion model.
//! 2. [`ParticleFilter::update_weights`] replaces each weight with the product of the
//!    per-observation likelihoods, accumulated in log space.
//! 3. [`ParticleFilter::resample`] draws a new, roughened population with uniform weights.
//! 4. [`ParticleFilter::estimate`] returns the weighted mean position.
//!
//! The population size never changes after construction. The estimate is recomputed after every
//! predict and weight update and left untouched by resampling.
//!
//! All randomness comes from a [`StdRng`] owned by the filter, so two filters built with the same
//! seed and fed the same inputs evolve identically.
use crate::motion::{ConstantVelocity, MotionModel};
use crate::particle::Particle;
use crate::resample::ResamplingStrategy;
use crate::sensor::{Observation, ObservationModel, sensor_id_from_row};
use crate::{DEFAULT_TIME_STEP, FilterError, LIKELIHOOD_FLOOR};

use log::{debug, warn};
use nalgebra::{Matrix2, Vector2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;
use std::fmt::{self, Debug};

/// Standard deviation of the position perturbation applied to resampled particles.
pub const POSITION_ROUGHENING_STD: f64 = 5.0;
/// Standard deviation of the velocity perturbation applied to resampled particles.
pub const VELOCITY_ROUGHENING_STD: f64 = 0.5;

/// Default seed value for reproducible filters
fn default_seed() -> u64 {
    42
}

/// Construction-time parameters of a [`ParticleFilter`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParticleFilterConfig {
    /// Population size `N`, fixed for the filter's lifetime
    pub num_particles: usize,
    /// Initial position guess `[x, y]`
    pub initial_position: [f64; 2],
    /// Standard deviation of the initial position spread around the guess
    pub initial_std: f64,
    /// Position roughening applied after resampling
    pub position_roughening_std: f64,
    /// Velocity roughening applied after resampling
    pub velocity_roughening_std: f64,
    /// Index selection scheme used by [`ParticleFilter::resample`]
    pub resampling_strategy: ResamplingStrategy,
    /// Seed for the filter's random number generator
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for ParticleFilterConfig {
    fn default() -> Self {
        ParticleFilterConfig {
            num_particles: 500,
            initial_position: [0.0, 0.0],
            initial_std: 300.0,
            position_roughening_std: POSITION_ROUGHENING_STD,
            velocity_roughening_std: VELOCITY_ROUGHENING_STD,
            resampling_strategy: ResamplingStrategy::default(),
            seed: default_seed(),
        }
    }
}

impl ParticleFilterConfig {
    pub fn validate(&self) -> Result<(), FilterError> {
        if self.num_particles == 0 {
            return Err(FilterError::InvalidConfig(
                "num_particles must be at least 1".to_string(),
            ));
        }
        if !self.initial_position.iter().all(|v| v.is_finite()) {
            return Err(FilterError::InvalidConfig(
                "initial_position must be finite".to_string(),
            ));
        }
        for (name, value) in [
            ("initial_std", self.initial_std),
            ("position_roughening_std", self.position_roughening_std),
            ("velocity_roughening_std", self.velocity_roughening_std),
        ] {
            if !(value >= 0.0 && value.is_finite()) {
                return Err(FilterError::InvalidConfig(format!(
                    "{} must be non-negative, got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

fn validate_speed_bounds(min_speed: f64, max_speed: f64) -> Result<(), FilterError> {
    if !(min_speed.is_finite() && max_speed.is_finite() && min_speed >= 0.0) {
        return Err(FilterError::InvalidConfig(format!(
            "speed bounds must be finite and non-negative, got [{}, {}]",
            min_speed, max_speed
        )));
    }
    if min_speed > max_speed {
        return Err(FilterError::InvalidConfig(format!(
            "min_speed {} exceeds max_speed {}",
            min_speed, max_speed
        )));
    }
    Ok(())
}

/// Bearing-only SIR particle filter.
#[derive(Clone)]
pub struct ParticleFilter<M: MotionModel = ConstantVelocity> {
    particles: Vec<Particle>,
    motion_model: M,
    estimate: Vector2<f64>,
    position_roughening_std: f64,
    velocity_roughening_std: f64,
    resampling_strategy: ResamplingStrategy,
    rng: StdRng,
}

impl<M: MotionModel> Debug for ParticleFilter<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let min_weight = self
            .particles
            .iter()
            .map(|p| p.weight())
            .fold(f64::INFINITY, f64::min);
        let max_weight = self.particles.iter().map(|p| p.weight()).fold(0.0, f64::max);
        f.debug_struct("ParticleFilter")
            .field("num_particles", &self.particles.len())
            .field("effective_particles", &self.effective_sample_size())
            .field(
                "weight_range",
                &format_args!("[{:.4e}, {:.4e}]", min_weight, max_weight),
            )
            .field(
                "estimate",
                &format_args!("({:.2}, {:.2})", self.estimate.x, self.estimate.y),
            )
            .field("resampling_strategy", &self.resampling_strategy)
            .finish()
    }
}

impl<M: MotionModel> ParticleFilter<M> {
    /// Create a filter whose random number generator is seeded from `config.seed`.
    pub fn new(config: &ParticleFilterConfig, motion_model: M) -> Result<Self, FilterError> {
        Self::with_rng(config, motion_model, StdRng::seed_from_u64(config.seed))
    }

    /// Create a filter that draws from the supplied random number generator.
    ///
    /// Positions are drawn from a Gaussian around `config.initial_position`, speeds uniformly
    /// between the motion model's bounds, headings uniformly over the full circle, and every
    /// weight is `1/N`. The initial estimate is the initial position guess.
    ///
    /// `config.seed` is ignored.
    pub fn with_rng(
        config: &ParticleFilterConfig,
        motion_model: M,
        mut rng: StdRng,
    ) -> Result<Self, FilterError> {
        config.validate()?;
        let (min_speed, max_speed) = motion_model.speed_bounds();
        validate_speed_bounds(min_speed, max_speed)?;

        let n = config.num_particles;
        let [init_x, init_y] = config.initial_position;
        let weight = 1.0 / n as f64;
        let mut particles = Vec::with_capacity(n);
        for _ in 0..n {
            let x_noise: f64 = rng.sample(StandardNormal);
            let y_noise: f64 = rng.sample(StandardNormal);
            let position = Vector2::new(
                init_x + x_noise * config.initial_std,
                init_y + y_noise * config.initial_std,
            );
            let speed = min_speed + (max_speed - min_speed) * rng.random::<f64>();
            let heading = TAU * rng.random::<f64>();
            let velocity = Vector2::new(speed * heading.cos(), speed * heading.sin());
            particles.push(Particle::new(position, velocity, weight));
        }
        debug!(
            "Initialized {} particles around ({:.2}, {:.2}) with std {:.2}",
            n, init_x, init_y, config.initial_std
        );

        Ok(ParticleFilter {
            particles,
            motion_model,
            estimate: Vector2::new(init_x, init_y),
            position_roughening_std: config.position_roughening_std,
            velocity_roughening_std: config.velocity_roughening_std,
            resampling_strategy: config.resampling_strategy,
            rng,
        })
    }

    /// Create a filter around an existing population.
    ///
    /// Uses the default roughening and systematic resampling. The estimate starts as the weighted
    /// mean of the population, or its plain centroid when every weight is zero.
    pub fn from_particles(
        particles: Vec<Particle>,
        motion_model: M,
        rng: StdRng,
    ) -> Result<Self, FilterError> {
        if particles.is_empty() {
            return Err(FilterError::EmptyPopulation);
        }
        let centroid = particles
            .iter()
            .fold(Vector2::zeros(), |acc, p| acc + p.position())
            / particles.len() as f64;
        let mut filter = ParticleFilter {
            particles,
            motion_model,
            estimate: centroid,
            position_roughening_std: POSITION_ROUGHENING_STD,
            velocity_roughening_std: VELOCITY_ROUGHENING_STD,
            resampling_strategy: ResamplingStrategy::default(),
            rng,
        };
        filter.update_estimate();
        Ok(filter)
    }

    /// Replace the roughening standard deviations.
    ///
    /// # Panics
    /// If either value is negative or not finite.
    pub fn with_roughening(mut self, position_std: f64, velocity_std: f64) -> Self {
        assert!(
            position_std >= 0.0 && position_std.is_finite(),
            "Position roughening standard deviation must be non-negative"
        );
        assert!(
            velocity_std >= 0.0 && velocity_std.is_finite(),
            "Velocity roughening standard deviation must be non-negative"
        );
        self.position_roughening_std = position_std;
        self.velocity_roughening_std = velocity_std;
        self
    }

    pub fn with_resampling_strategy(mut self, strategy: ResamplingStrategy) -> Self {
        self.resampling_strategy = strategy;
        self
    }

    /// Predict with the default unit time step.
    pub fn motion_update(&mut self) {
        self.predict(DEFAULT_TIME_STEP);
    }

    /// Propagate every particle by `dt` and recompute the estimate with the current weights.
    pub fn predict(&mut self, dt: f64) {
        for particle in &mut self.particles {
            self.motion_model.predict(particle, dt);
        }
        self.update_estimate();
    }

    /// Reweight the population against a batch of observations.
    ///
    /// Each particle's weight becomes `exp(Σ ln(likelihood + ε))` over the batch, the product of
    /// the independent per-sensor likelihoods. If the largest of these would overflow, every
    /// weight is divided by it instead, which leaves the weight ratios unchanged. `observation.sensor_id` indexes into `sensors`;
    /// an observation with an unknown sensor id contributes nothing. An empty batch leaves the
    /// weights and estimate untouched.
    pub fn update_weights<S: ObservationModel>(
        &mut self,
        observations: &[Observation],
        sensors: &[S],
    ) {
        if observations.is_empty() {
            debug!("Empty observation batch, weights unchanged");
            return;
        }
        let terms: Vec<(usize, Option<Observation>)> = observations
            .iter()
            .filter(|obs| obs.sensor_id < sensors.len())
            .map(|obs| (obs.sensor_id, Some(*obs)))
            .collect();
        let skipped = observations.len() - terms.len();
        if skipped > 0 {
            debug!(
                "Skipped {} observation(s) referencing unknown sensors ({} sensors available)",
                skipped,
                sensors.len()
            );
        }
        self.reweight(&terms, sensors);
    }

    /// Reweight the population against raw `[sensor_id, bearing, x, y]` rows.
    ///
    /// Rows without a usable sensor id, or whose id is out of range, are skipped. A row that
    /// names a valid sensor but cannot be parsed scores likelihood zero for every particle.
    pub fn update_weights_raw<T, S>(&mut self, rows: &[T], sensors: &[S])
    where
        T: AsRef<[f64]>,
        S: ObservationModel,
    {
        if rows.is_empty() {
            debug!("Empty observation batch, weights unchanged");
            return;
        }
        let mut terms = Vec::with_capacity(rows.len());
        for row in rows {
            let row = row.as_ref();
            match sensor_id_from_row(row) {
                Some(id) if id < sensors.len() => match Observation::try_from(row) {
                    Ok(obs) => terms.push((id, Some(obs))),
                    Err(e) => {
                        warn!("Malformed observation row {:?}: {}", row, e);
                        terms.push((id, None));
                    }
                },
                _ => debug!("Skipping observation row {:?} without a known sensor", row),
            }
        }
        self.reweight(&terms, sensors);
    }

    fn reweight<S: ObservationModel>(
        &mut self,
        terms: &[(usize, Option<Observation>)],
        sensors: &[S],
    ) {
        let log_weights: Vec<f64> = self
            .particles
            .iter()
            .map(|particle| {
                terms
                    .iter()
                    .map(|(id, obs)| {
                        let likelihood = obs
                            .as_ref()
                            .map_or(0.0, |obs| sensors[*id].likelihood(obs, particle));
                        (likelihood + LIKELIHOOD_FLOOR).ln()
                    })
                    .sum()
            })
            .collect();

        // Sharp sensors over a large batch can push exp(log_weight) past f64::MAX. Rescaling by
        // the largest weight keeps the proportions between particles.
        let max_log_weight = log_weights.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let overflow_limit = f64::MAX.ln() - (self.particles.len() as f64).ln();
        let shift = if max_log_weight > overflow_limit {
            debug!(
                "Rescaling weights by exp(-{:.1}) to avoid overflow",
                max_log_weight
            );
            max_log_weight
        } else {
            0.0
        };
        for (particle, log_weight) in self.particles.iter_mut().zip(log_weights) {
            particle.set_weight((log_weight - shift).exp());
        }
        self.update_estimate();
    }

    /// Replace the population by resampling with roughening.
    ///
    /// Source particles are selected with the configured [`ResamplingStrategy`] against the
    /// pre-resample population. Each selection becomes a new particle whose position and velocity
    /// are perturbed by independent Gaussian noise. Every new weight is `1/N` and the old
    /// population is swapped out as a whole.
    ///
    /// # Errors
    /// [`FilterError::DegenerateWeights`] when every weight is zero. The population is left
    /// unchanged.
    pub fn resample(&mut self) -> Result<(), FilterError> {
        let weights = self.weights();
        let indices = self.resampling_strategy.select(&weights, &mut self.rng)?;
        debug!(
            "Resampling {} particles ({:?}), effective sample size {:.1}",
            weights.len(),
            self.resampling_strategy,
            self.effective_sample_size()
        );

        let n = self.particles.len();
        let weight = 1.0 / n as f64;
        let mut resampled = Vec::with_capacity(n);
        for j in indices {
            let source = &self.particles[j];
            let noise: [f64; 4] = std::array::from_fn(|_| self.rng.sample(StandardNormal));
            let position = source.position()
                + Vector2::new(noise[0], noise[1]) * self.position_roughening_std;
            let velocity = source.velocity()
                + Vector2::new(noise[2], noise[3]) * self.velocity_roughening_std;
            resampled.push(Particle::new(position, velocity, weight));
        }
        self.particles = resampled;
        Ok(())
    }

    /// Resample only when the effective sample size falls below `threshold_ratio · N`.
    ///
    /// Returns whether resampling was performed.
    pub fn resample_if_needed(&mut self, threshold_ratio: f64) -> Result<bool, FilterError> {
        let threshold = threshold_ratio * self.particles.len() as f64;
        if self.effective_sample_size() < threshold {
            self.resample()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn update_estimate(&mut self) {
        let mut weighted = Vector2::zeros();
        let mut total = 0.0;
        for particle in &self.particles {
            weighted += particle.position() * particle.weight();
            total += particle.weight();
        }
        if total > 0.0 && total.is_finite() {
            self.estimate = weighted / total;
        }
    }

    /// The cached weighted-mean position estimate.
    pub fn estimate(&self) -> Vector2<f64> {
        self.estimate
    }

    /// Weighted 2×2 covariance of particle positions about their weighted mean.
    ///
    /// Zero when the total weight is zero.
    pub fn covariance(&self) -> Matrix2<f64> {
        let total = self.total_weight();
        if !(total > 0.0) {
            return Matrix2::zeros();
        }
        let mean = self
            .particles
            .iter()
            .fold(Vector2::zeros(), |acc, p| acc + p.position() * p.weight())
            / total;
        self.particles.iter().fold(Matrix2::zeros(), |acc, p| {
            let diff = p.position() - mean;
            acc + diff * diff.transpose() * (p.weight() / total)
        })
    }

    /// Effective sample size `(Σw)² / Σw²`; equals `N` for uniform weights.
    pub fn effective_sample_size(&self) -> f64 {
        let sum_of_squares: f64 = self.particles.iter().map(|p| p.weight() * p.weight()).sum();
        if sum_of_squares > 0.0 {
            self.total_weight().powi(2) / sum_of_squares
        } else {
            0.0
        }
    }

    pub fn total_weight(&self) -> f64 {
        self.particles.iter().map(|p| p.weight()).sum()
    }

    pub fn weights(&self) -> Vec<f64> {
        self.particles.iter().map(|p| p.weight()).collect()
    }

    /// Read-only access to the population.
    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    /// A copy of the particle at `index`.
    pub fn particle(&self, index: usize) -> Option<Particle> {
        self.particles.get(index).copied()
    }

    pub fn num_particles(&self) -> usize {
        self.particles.len()
    }

    pub fn motion_model(&self) -> &M {
        &self.motion_model
    }

    pub fn resampling_strategy(&self) -> ResamplingStrategy {
        self.resampling_strategy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::BearingSensor;
    use assert_approx_eq::assert_approx_eq;
    use std::f64::consts::FRAC_PI_4;

    fn small_config(n: usize) -> ParticleFilterConfig {
        ParticleFilterConfig {
            num_particles: n,
            initial_position: [100.0, -50.0],
            initial_std: 10.0,
            seed: 7,
            ..Default::default()
        }
    }

    fn line_filter(weights: [f64; 3]) -> ParticleFilter {
        let particles = vec![
            Particle::from((0.0, 0.0, 1.0, 0.0, weights[0])),
            Particle::from((10.0, 0.0, 1.0, 0.0, weights[1])),
            Particle::from((20.0, 0.0, 1.0, 0.0, weights[2])),
        ];
        ParticleFilter::from_particles(
            particles,
            ConstantVelocity::new(0.0, 1.0),
            StdRng::seed_from_u64(3),
        )
        .unwrap()
    }

    #[test]
    fn test_initialization() {
        let pf = ParticleFilter::new(&small_config(200), ConstantVelocity::new(12.0, 20.0)).unwrap();
        assert_eq!(pf.num_particles(), 200);
        assert_eq!(pf.estimate(), Vector2::new(100.0, -50.0));
        for particle in pf.particles() {
            assert_approx_eq!(particle.weight(), 1.0 / 200.0, 1e-15);
            let speed = particle.speed();
            assert!((12.0 - 1e-9..=20.0 + 1e-9).contains(&speed), "speed {}", speed);
        }
        assert_approx_eq!(pf.effective_sample_size(), 200.0, 1e-6);
    }

    #[test]
    fn test_initial_spread_matches_config() {
        let pf = ParticleFilter::new(&small_config(4000), ConstantVelocity::new(1.0, 2.0)).unwrap();
        let n = pf.num_particles() as f64;
        let mean_x = pf.particles().iter().map(|p| p.position().x).sum::<f64>() / n;
        let var_x = pf
            .particles()
            .iter()
            .map(|p| (p.position().x - mean_x).powi(2))
            .sum::<f64>()
            / n;
        assert!((mean_x - 100.0).abs() < 1.0, "mean {}", mean_x);
        assert!((var_x.sqrt() - 10.0).abs() < 0.75, "std {}", var_x.sqrt());
    }

    #[test]
    fn test_same_seed_same_population() {
        let a = ParticleFilter::new(&small_config(50), ConstantVelocity::new(12.0, 20.0)).unwrap();
        let b = ParticleFilter::new(&small_config(50), ConstantVelocity::new(12.0, 20.0)).unwrap();
        assert_eq!(a.particles(), b.particles());
    }

    #[test]
    fn test_invalid_config() {
        let motion = ConstantVelocity::new(12.0, 20.0);
        assert!(matches!(
            ParticleFilter::new(&small_config(0), motion),
            Err(FilterError::InvalidConfig(_))
        ));
        let mut config = small_config(10);
        config.initial_std = -1.0;
        assert!(ParticleFilter::new(&config, motion).is_err());
        assert!(ParticleFilter::new(&small_config(10), ConstantVelocity::new(20.0, 12.0)).is_err());
        assert_eq!(
            ParticleFilter::from_particles(Vec::new(), motion, StdRng::seed_from_u64(0)).err(),
            Some(FilterError::EmptyPopulation)
        );
    }

    #[test]
    fn test_motion_update_moves_particles_and_estimate() {
        let mut pf = line_filter([1.0, 1.0, 1.0]);
        assert_approx_eq!(pf.estimate().x, 10.0, 1e-12);
        pf.motion_update();
        assert_approx_eq!(pf.estimate().x, 11.0, 1e-12);
        assert_approx_eq!(pf.particle(0).unwrap().position().x, 1.0, 1e-12);
        assert_eq!(pf.weights(), vec![1.0, 1.0, 1.0]);
        pf.predict(2.5);
        assert_approx_eq!(pf.estimate().x, 13.5, 1e-12);
    }

    #[test]
    fn test_update_weights_log_space_product() {
        let sensors = vec![
            BearingSensor::new(0.0, 100.0, 1000.0, 10.0, 1.0),
            BearingSensor::new(50.0, -100.0, 1000.0, 20.0, 1.0),
        ];
        let observations = vec![
            Observation::new(0, -1.2, 0.0, 0.0),
            Observation::new(1, 2.0, 0.0, 0.0),
        ];
        let mut pf = line_filter([1.0, 1.0, 1.0]);
        pf.update_weights(&observations, &sensors);
        for particle in pf.particles() {
            let expected: f64 = observations
                .iter()
                .map(|obs| sensors[obs.sensor_id].likelihood(obs, particle) + LIKELIHOOD_FLOOR)
                .product();
            assert_approx_eq!(particle.weight(), expected, expected * 1e-9);
        }
    }

    #[test]
    fn test_update_weights_recomputes_estimate() {
        // Sensor directly above the first particle, bearing straight down at it
        let sensors = vec![BearingSensor::new(0.0, 100.0, 1000.0, 2.0, 1.0)];
        let bearing = (-100.0_f64).atan2(0.0);
        let mut pf = line_filter([1.0, 1.0, 1.0]);
        pf.update_weights(&[Observation::new(0, bearing, 0.0, 0.0)], &sensors);
        let estimate = pf.estimate();
        assert!(estimate.x < 10.0, "estimate pulled toward the first particle: {}", estimate);
        assert!(estimate.x >= 0.0 && estimate.x <= 20.0);
    }

    #[test]
    fn test_update_weights_empty_batch_is_noop() {
        let sensors = vec![BearingSensor::new(0.0, 0.0, 1000.0, 10.0, 1.0)];
        let mut pf = line_filter([0.1, 0.1, 0.8]);
        let before = pf.estimate();
        pf.update_weights(&[], &sensors);
        assert_eq!(pf.weights(), vec![0.1, 0.1, 0.8]);
        assert_eq!(pf.estimate(), before);
    }

    #[test]
    fn test_update_weights_skips_unknown_sensor() {
        let sensors = vec![BearingSensor::new(0.0, 0.0, 1000.0, 10.0, 1.0)];
        let mut pf = line_filter([0.1, 0.1, 0.8]);
        pf.update_weights(&[Observation::new(5, 0.0, 0.0, 0.0)], &sensors);
        // Nothing contributes: every log weight is zero
        assert_eq!(pf.weights(), vec![1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_update_weights_raw_tolerates_malformed_rows() {
        let sensors = vec![BearingSensor::new(0.0, 0.0, 1000.0, 10.0, 1.0)];
        let mut pf = line_filter([1.0, 1.0, 1.0]);
        let rows: Vec<Vec<f64>> = vec![vec![0.0, 0.3], vec![9.0, 0.0, 0.0, 0.0], vec![]];
        pf.update_weights_raw(&rows, &sensors);
        for particle in pf.particles() {
            assert_approx_eq!(particle.weight(), LIKELIHOOD_FLOOR, 1e-20);
        }
    }

    #[test]
    fn test_update_weights_raw_matches_typed() {
        let sensors = vec![BearingSensor::new(0.0, 100.0, 1000.0, 10.0, 1.0)];
        let observation = Observation::new(0, -1.4, 3.0, 4.0);
        let mut typed = line_filter([1.0, 1.0, 1.0]);
        let mut raw = line_filter([1.0, 1.0, 1.0]);
        typed.update_weights(&[observation], &sensors);
        let row: Vec<f64> = observation.into();
        raw.update_weights_raw(&[row], &sensors);
        assert_eq!(typed.weights(), raw.weights());
    }

    #[test]
    fn test_resample_normalizes_and_keeps_size() {
        let mut pf = ParticleFilter::new(&small_config(64), ConstantVelocity::new(12.0, 20.0)).unwrap();
        let sensors = vec![BearingSensor::new(0.0, 0.0, 5000.0, 5.0, 1.0)];
        pf.motion_update();
        pf.update_weights(&[Observation::new(0, -0.4, 0.0, 0.0)], &sensors);
        pf.resample().unwrap();
        assert_eq!(pf.num_particles(), 64);
        assert_approx_eq!(pf.total_weight(), 1.0, 1e-12);
        for particle in pf.particles() {
            assert_eq!(particle.weight(), 1.0 / 64.0);
        }
    }

    #[test]
    fn test_resample_without_roughening_copies_selection() {
        let mut pf = line_filter([0.0, 0.0, 1.0]).with_roughening(0.0, 0.0);
        pf.resample().unwrap();
        for particle in pf.particles() {
            assert_eq!(particle.position(), Vector2::new(20.0, 0.0));
            assert_eq!(particle.velocity(), Vector2::new(1.0, 0.0));
        }
    }

    #[test]
    fn test_resample_roughening_perturbs() {
        let mut pf = line_filter([0.0, 0.0, 1.0]);
        pf.resample().unwrap();
        let distinct = pf
            .particles()
            .iter()
            .filter(|p| p.position() != Vector2::new(20.0, 0.0))
            .count();
        assert_eq!(distinct, 3);
    }

    #[test]
    fn test_resample_degenerate_weights() {
        let mut pf = line_filter([0.0, 0.0, 0.0]);
        let before = pf.particles().to_vec();
        assert_eq!(pf.resample(), Err(FilterError::DegenerateWeights));
        assert_eq!(pf.particles(), &before[..]);
    }

    #[test]
    fn test_resample_does_not_touch_estimate() {
        let mut pf = line_filter([0.1, 0.1, 0.8]);
        let before = pf.estimate();
        pf.resample().unwrap();
        assert_eq!(pf.estimate(), before);
    }

    #[test]
    fn test_estimate_retained_when_weights_vanish() {
        let sensors = vec![BearingSensor::new(0.0, 0.0, 1000.0, 10.0, 1.0)];
        let mut pf = line_filter([0.1, 0.1, 0.8]);
        let before = pf.estimate();
        // Enough impossible readings to underflow every weight to zero
        let observations = vec![Observation::new(0, f64::NAN, 0.0, 0.0); 40];
        pf.update_weights(&observations, &sensors);
        assert_eq!(pf.total_weight(), 0.0);
        assert_eq!(pf.estimate(), before);
        assert_eq!(pf.resample(), Err(FilterError::DegenerateWeights));
    }

    #[test]
    fn test_update_weights_sharp_sensor_does_not_overflow() {
        let sensors = vec![BearingSensor::new(0.0, 0.0, 1000.0, 0.001, 1.0)];
        let observations = vec![Observation::new(0, FRAC_PI_4, 0.0, 0.0); 80];
        let particles = vec![
            Particle::from((10.0, 10.0, 0.0, 0.0, 0.5)),
            Particle::from((20.0, 0.0, 0.0, 0.0, 0.5)),
        ];
        let mut pf = ParticleFilter::from_particles(
            particles,
            ConstantVelocity::new(0.0, 1.0),
            StdRng::seed_from_u64(1),
        )
        .unwrap();
        pf.update_weights(&observations, &sensors);
        assert!(pf.weights().iter().all(|w| w.is_finite()));
        assert_eq!(pf.weights()[0], 1.0);
        assert_eq!(pf.weights()[1], 0.0);
        assert_approx_eq!(pf.estimate().x, 10.0, 1e-12);
        assert_approx_eq!(pf.estimate().y, 10.0, 1e-12);
        pf.resample().unwrap();
        assert_approx_eq!(pf.total_weight(), 1.0, 1e-12);
    }

    #[test]
    fn test_update_weights_rescaling_keeps_ratios() {
        let sensors = vec![BearingSensor::new(0.0, 0.0, 1000.0, 0.001, 1.0)];
        let observations = vec![Observation::new(0, FRAC_PI_4, 0.0, 0.0); 80];
        let particles = vec![
            Particle::from((10.0, 10.0, 0.0, 0.0, 0.5)),
            Particle::from((30.0, 30.0, 0.0, 0.0, 0.5)),
        ];
        let mut pf = ParticleFilter::from_particles(
            particles,
            ConstantVelocity::new(0.0, 1.0),
            StdRng::seed_from_u64(1),
        )
        .unwrap();
        pf.update_weights(&observations, &sensors);
        assert_eq!(pf.weights(), vec![1.0, 1.0]);
        assert_approx_eq!(pf.estimate().x, 20.0, 1e-12);
    }

    #[test]
    fn test_estimate_retained_when_total_weight_is_infinite() {
        let particles = vec![
            Particle::from((0.0, 0.0, 0.0, 0.0, f64::INFINITY)),
            Particle::from((10.0, 0.0, 0.0, 0.0, 1.0)),
        ];
        let pf = ParticleFilter::from_particles(
            particles,
            ConstantVelocity::new(0.0, 1.0),
            StdRng::seed_from_u64(1),
        )
        .unwrap();
        assert_eq!(pf.estimate(), Vector2::new(5.0, 0.0));
    }

    #[test]
    fn test_resample_if_needed() {
        let mut pf = line_filter([1.0, 1.0, 1.0]);
        assert!(!pf.resample_if_needed(0.5).unwrap());
        let mut pf = line_filter([0.0, 0.0, 1.0]);
        assert!(pf.resample_if_needed(0.5).unwrap());
        assert_approx_eq!(pf.effective_sample_size(), 3.0, 1e-12);
    }

    #[test]
    fn test_covariance() {
        let pf = line_filter([1.0, 0.0, 1.0]);
        let cov = pf.covariance();
        assert_approx_eq!(cov[(0, 0)], 100.0, 1e-9);
        assert_approx_eq!(cov[(1, 1)], 0.0, 1e-12);
        assert_approx_eq!(cov[(0, 1)], 0.0, 1e-12);
        assert_eq!(line_filter([0.0, 0.0, 0.0]).covariance(), Matrix2::zeros());
    }

    #[test]
    fn test_effective_sample_size_scale_invariant() {
        let a = line_filter([0.1, 0.1, 0.8]);
        let b = line_filter([1.0, 1.0, 8.0]);
        assert_approx_eq!(a.effective_sample_size(), b.effective_sample_size(), 1e-12);
        assert_approx_eq!(a.effective_sample_size(), 1.0 / 0.66, 1e-9);
    }

    #[test]
    fn test_particle_accessor_returns_copy() {
        let pf = line_filter([1.0, 1.0, 1.0]);
        let mut particle = pf.particle(1).unwrap();
        particle.set_position(Vector2::new(-1.0, -1.0));
        assert_eq!(pf.particle(1).unwrap().position(), Vector2::new(10.0, 0.0));
        assert!(pf.particle(3).is_none());
    }

    #[test]
    fn test_debug_output() {
        let pf = line_filter([1.0, 1.0, 1.0]);
        let text = format!("{:?}", pf);
        assert!(text.contains("num_particles: 3"));
        assert!(text.contains("Systematic"));
    }
}
