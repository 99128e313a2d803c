//! Simulation utilities for bearing-only tracking scenarios
//!
//! This module holds everything needed to exercise the filter without real sensors:
//! - [`Target`]: a constant-speed, constant-course target.
//! - [`Simulator`]: the true world state plus a list of [`BearingSensor`]s that synthesize noisy
//!   observations of it.
//! - [`ParticleRecord`]: the per-particle CSV export format.
//! - [`SimulationConfig`]: a complete scenario description readable from JSON, YAML or TOML.
//! - [`run_simulation`]: the headless driver loop that steps the world and the filter together.
use crate::filter::{ParticleFilter, ParticleFilterConfig};
use crate::motion::{ConstantVelocity, MotionModel};
use crate::sensor::{BearingSensor, Observation};
use crate::FilterError;

use log::{debug, info};
use nalgebra::Vector2;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

/// Added to the true range in the relative error denominator so a target at the origin does not
/// divide by zero.
const RELATIVE_ERROR_EPSILON: f64 = 1e-6;

/// A target moving at constant speed along a fixed course.
///
/// The course is in degrees, measured counter-clockwise from the +x axis.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Target {
    x: f64,
    y: f64,
    speed: f64,
    course_degrees: f64,
}

impl Default for Target {
    fn default() -> Self {
        Target::new(0.0, 0.0, 15.0, 45.0)
    }
}

impl Target {
    pub fn new(x: f64, y: f64, speed: f64, course_degrees: f64) -> Self {
        Target {
            x,
            y,
            speed,
            course_degrees,
        }
    }

    pub fn position(&self) -> Vector2<f64> {
        Vector2::new(self.x, self.y)
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn course_degrees(&self) -> f64 {
        self.course_degrees
    }

    pub fn velocity(&self) -> Vector2<f64> {
        let course = self.course_degrees.to_radians();
        Vector2::new(self.speed * course.cos(), self.speed * course.sin())
    }

    /// Advance the target by `dt` seconds.
    pub fn step(&mut self, dt: f64) {
        let displacement = self.velocity() * dt;
        self.x += displacement.x;
        self.y += displacement.y;
    }
}

/// The true world: one target and the sensors observing it.
#[derive(Clone, Debug)]
pub struct Simulator {
    target: Target,
    sensors: Vec<BearingSensor>,
    rng: StdRng,
}

impl Simulator {
    /// Create a simulator whose sensor noise is drawn from an RNG seeded with `seed`.
    pub fn new(target: Target, seed: u64) -> Self {
        Simulator {
            target,
            sensors: Vec::new(),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Register a sensor and return its id, the index observations will carry.
    ///
    /// # Errors
    /// [`FilterError::InvalidConfig`] if the sensor fails [`BearingSensor::validate`], which can
    /// happen for sensors deserialized without going through [`BearingSensor::new`].
    pub fn add_sensor(&mut self, sensor: BearingSensor) -> Result<usize, FilterError> {
        sensor.validate()?;
        self.sensors.push(sensor);
        Ok(self.sensors.len() - 1)
    }

    pub fn step(&mut self, dt: f64) {
        self.target.step(dt);
    }

    /// One observation per sensor that can currently detect the target.
    pub fn observations(&mut self) -> Vec<Observation> {
        let truth = self.target.position();
        let mut observations = Vec::new();
        for (id, sensor) in self.sensors.iter().enumerate() {
            if let Some(observation) = sensor.observe(id, &truth, &mut self.rng) {
                observations.push(observation);
            }
        }
        observations
    }

    pub fn true_position(&self) -> Vector2<f64> {
        self.target.position()
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn sensors(&self) -> &[BearingSensor] {
        &self.sensors
    }
}

/// One particle's exported state at one time step.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParticleRecord {
    #[serde(rename = "TimeStep")]
    pub time_step: u64,
    #[serde(rename = "ParticleID")]
    pub particle_id: usize,
    #[serde(rename = "X")]
    pub x: f64,
    #[serde(rename = "Y")]
    pub y: f64,
    #[serde(rename = "Weight")]
    pub weight: f64,
    #[serde(rename = "TrueX")]
    pub true_x: f64,
    #[serde(rename = "TrueY")]
    pub true_y: f64,
    #[serde(rename = "EstimateX")]
    pub estimate_x: f64,
    #[serde(rename = "EstimateY")]
    pub estimate_y: f64,
}

impl ParticleRecord {
    /// One record per particle, in population order, tagged with the truth and the filter's
    /// current estimate.
    pub fn from_filter<M: MotionModel>(
        time_step: u64,
        filter: &ParticleFilter<M>,
        truth: &Vector2<f64>,
    ) -> Vec<Self> {
        let estimate = filter.estimate();
        filter
            .particles()
            .iter()
            .enumerate()
            .map(|(particle_id, particle)| ParticleRecord {
                time_step,
                particle_id,
                x: particle.position().x,
                y: particle.position().y,
                weight: particle.weight(),
                true_x: truth.x,
                true_y: truth.y,
                estimate_x: estimate.x,
                estimate_y: estimate.y,
            })
            .collect()
    }

    /// Writes records to a CSV file with a `TimeStep,ParticleID,X,Y,...` header.
    pub fn write_csv<P: AsRef<Path>>(records: &[Self], path: P) -> io::Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        for record in records {
            writer.serialize(record)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Reads records previously written by [`ParticleRecord::write_csv`].
    pub fn read_csv<P: AsRef<Path>>(path: P) -> Result<Vec<Self>, Box<dyn std::error::Error>> {
        let mut reader = csv::Reader::from_path(path)?;
        let mut records = Vec::new();
        for result in reader.deserialize() {
            let record: Self = result?;
            records.push(record);
        }
        Ok(records)
    }
}

/// What happened during one step of the driver loop.
#[derive(Clone, Debug, PartialEq)]
pub struct StepSummary {
    pub time_step: u64,
    /// True when the step consumed a non-empty observation batch
    pub observed: bool,
    pub observation_count: usize,
    pub true_position: Vector2<f64>,
    pub estimate: Vector2<f64>,
    /// `|estimate - truth| / (|truth| + 1e-6)`
    pub relative_error: f64,
}

/// Output of [`run_simulation`].
#[derive(Clone, Debug, Default)]
pub struct SimulationResult {
    pub steps: Vec<StepSummary>,
    pub records: Vec<ParticleRecord>,
}

impl SimulationResult {
    pub fn final_step(&self) -> Option<&StepSummary> {
        self.steps.last()
    }

    pub fn write_csv<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        ParticleRecord::write_csv(&self.records, path)
    }
}

/// Logger settings consumed by the command-line front end.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `off`, `error`, `warn`, `info`, `debug` or `trace`
    pub level: String,
    /// Append log records to this file instead of stderr
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_string(),
            file: None,
        }
    }
}

/// A complete tracking scenario.
///
/// The default is the standard two-sensor scenario: a target leaving the origin at 15 m/s on a 45°
/// course, two sensors with a 2500 m range, 500 particles, 200 one-second steps and an
/// observation opportunity every 10 steps.
///
/// ## Examples
///
/// ```
/// use bearingtrack::sim::SimulationConfig;
///
/// let config = SimulationConfig {
///     time_steps: 20,
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
/// assert_eq!(config.sensors.len(), 2);
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Run length; steps are taken at `t = 0, dt, 2·dt, ...` while `t < time_steps`
    pub time_steps: u64,
    /// Step length in seconds
    pub dt: u64,
    /// Sensors are polled only when `t` is a multiple of this
    pub observation_interval: u64,
    /// Lower speed bound for the initial particle population
    pub min_speed: f64,
    /// Upper speed bound for the initial particle population
    pub max_speed: f64,
    /// Seed for the simulator's sensor noise
    pub simulator_seed: u64,
    /// CSV file receiving the exported particle states
    pub output: PathBuf,
    pub target: Target,
    pub particle_filter: ParticleFilterConfig,
    pub logging: LoggingConfig,
    pub sensors: Vec<BearingSensor>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            time_steps: 200,
            dt: 1,
            observation_interval: 10,
            min_speed: 12.0,
            max_speed: 20.0,
            simulator_seed: 7,
            output: PathBuf::from("particle_states.csv"),
            target: Target::default(),
            particle_filter: ParticleFilterConfig::default(),
            logging: LoggingConfig::default(),
            sensors: vec![
                BearingSensor::new(1500.0, 3000.0, 2500.0, 15.0, 100.0),
                BearingSensor::new(0.0, 1500.0, 2500.0, 15.0, 100.0),
            ],
        }
    }
}

impl SimulationConfig {
    pub fn validate(&self) -> Result<(), FilterError> {
        if self.dt == 0 {
            return Err(FilterError::InvalidConfig("dt must be positive".to_string()));
        }
        if self.observation_interval == 0 {
            return Err(FilterError::InvalidConfig(
                "observation_interval must be positive".to_string(),
            ));
        }
        if !(self.target.speed.is_finite()
            && self.target.course_degrees.is_finite()
            && self.target.position().iter().all(|v| v.is_finite()))
        {
            return Err(FilterError::InvalidConfig(
                "target state must be finite".to_string(),
            ));
        }
        if !(self.min_speed >= 0.0 && self.min_speed <= self.max_speed && self.max_speed.is_finite())
        {
            return Err(FilterError::InvalidConfig(format!(
                "speed bounds [{}, {}] are invalid",
                self.min_speed, self.max_speed
            )));
        }
        for sensor in &self.sensors {
            sensor.validate()?;
        }
        self.particle_filter.validate()
    }

    /// Write the configuration as pretty-printed JSON.
    pub fn to_json<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(file, self).map_err(io::Error::other)
    }

    pub fn from_json<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = File::open(path)?;
        serde_json::from_reader(file).map_err(io::Error::other)
    }

    pub fn to_yaml<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let mut file = File::create(path)?;
        let s = serde_yaml::to_string(self).map_err(io::Error::other)?;
        file.write_all(s.as_bytes())
    }

    pub fn from_yaml<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = File::open(path)?;
        serde_yaml::from_reader(file).map_err(io::Error::other)
    }

    pub fn to_toml<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let mut file = File::create(path)?;
        let s = toml::to_string_pretty(self).map_err(io::Error::other)?;
        file.write_all(s.as_bytes())
    }

    pub fn from_toml<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let mut s = String::new();
        File::open(path)?.read_to_string(&mut s)?;
        toml::from_str(&s).map_err(io::Error::other)
    }

    /// Write in the format named by the extension (.json/.yaml/.yml/.toml).
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let p = path.as_ref();
        match extension(p).as_deref() {
            Some("json") => self.to_json(p),
            Some("yaml") | Some("yml") => self.to_yaml(p),
            Some("toml") => self.to_toml(p),
            _ => Err(unsupported_extension(p)),
        }
    }

    /// Read from the format named by the extension (.json/.yaml/.yml/.toml).
    pub fn from_file<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let p = path.as_ref();
        match extension(p).as_deref() {
            Some("json") => Self::from_json(p),
            Some("yaml") | Some("yml") => Self::from_yaml(p),
            Some("toml") => Self::from_toml(p),
            _ => Err(unsupported_extension(p)),
        }
    }
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_lowercase())
}

fn unsupported_extension(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidInput,
        format!(
            "unsupported config extension for {} (expected .json, .yaml, .yml or .toml)",
            path.display()
        ),
    )
}

/// Run the scenario described by `config` and collect per-step summaries and particle records.
///
/// At each step the world advances first, then the filter predicts. When `t` is a multiple of
/// the observation interval and at least one sensor detects the target, the filter reweights,
/// the records are taken, and the population is resampled. Otherwise the records are taken right
/// after the prediction.
///
/// # Errors
/// [`FilterError::InvalidConfig`] for a bad scenario, and [`FilterError::DegenerateWeights`] if
/// every particle is ruled out by an observation batch.
pub fn run_simulation(config: &SimulationConfig) -> Result<SimulationResult, FilterError> {
    config.validate()?;
    let motion_model = ConstantVelocity::new(config.min_speed, config.max_speed);
    let mut filter = ParticleFilter::new(&config.particle_filter, motion_model)?;
    let mut simulator = Simulator::new(config.target.clone(), config.simulator_seed);
    for sensor in &config.sensors {
        simulator.add_sensor(sensor.clone())?;
    }
    info!(
        "Starting simulation: {} particles, {} sensors, {} s at dt = {} s",
        filter.num_particles(),
        simulator.sensors().len(),
        config.time_steps,
        config.dt
    );

    let dt = config.dt as f64;
    let mut result = SimulationResult::default();
    let mut t = 0;
    while t < config.time_steps {
        simulator.step(dt);
        let truth = simulator.true_position();
        filter.predict(dt);

        let observations = if t % config.observation_interval == 0 {
            simulator.observations()
        } else {
            Vec::new()
        };
        let observed = !observations.is_empty();
        if observed {
            filter.update_weights(&observations, simulator.sensors());
            result
                .records
                .extend(ParticleRecord::from_filter(t, &filter, &truth));
            filter.resample()?;
        } else {
            result
                .records
                .extend(ParticleRecord::from_filter(t, &filter, &truth));
        }

        let estimate = filter.estimate();
        let relative_error = (estimate - truth).norm() / (truth.norm() + RELATIVE_ERROR_EPSILON);
        if observed {
            info!(
                "Time {} [OBS] | True: ({:.2}, {:.2}) | {} observations | Estimate: ({:.2}, {:.2}) | Error: {:.4}",
                t,
                truth.x,
                truth.y,
                observations.len(),
                estimate.x,
                estimate.y,
                relative_error
            );
        } else {
            info!(
                "Time {} [PRED] | True: ({:.2}, {:.2}) | No observations | Estimate: ({:.2}, {:.2}) | Error: {:.4}",
                t, truth.x, truth.y, estimate.x, estimate.y, relative_error
            );
        }
        debug!("{:?}", filter);

        result.steps.push(StepSummary {
            time_step: t,
            observed,
            observation_count: observations.len(),
            true_position: truth,
            estimate,
            relative_error,
        });
        t += config.dt;
    }

    if let Some(last) = result.final_step() {
        info!(
            "Simulation finished after {} steps, final relative error {:.4}",
            result.steps.len(),
            last.relative_error
        );
    }
    Ok(result)
}
