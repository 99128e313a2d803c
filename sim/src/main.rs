//! BEARINGTRACK: bearing-only target tracking simulation with a particle filter.
//!
//! A simulated target moves at constant speed past a set of fixed bearing sensors. Each sensor
//! reports a noisy bearing while the target is in range, and a SIR particle filter estimates the
//! target position from those bearings alone. Every particle's state is exported to CSV at every
//! step for offline analysis.
//!
//! You can run a scenario either by:
//!   1. Loading all parameters from a configuration file (TOML/JSON/YAML)
//!   2. Using the built-in default scenario, optionally adjusted with command-line flags

mod common;

use bearingtrack::ResamplingStrategy;
use bearingtrack::sim::{SimulationConfig, run_simulation};
use clap::{Args, Parser, Subcommand};
use common::{ensure_parent_dir, init_logger};
use log::{error, info};
use std::error::Error;
use std::path::PathBuf;

const LONG_ABOUT: &str = "BEARINGTRACK: bearing-only target tracking with a particle filter.

A simulated target moves at constant speed past a set of fixed bearing sensors. Sensors report
noisy bearings while the target is within range, and a sequential importance resampling
particle filter estimates the target position from the bearings alone. The state of every
particle is written to CSV at every time step.

You can run a scenario either by:
  1. Loading all parameters from a configuration file (TOML/JSON/YAML) with --config
  2. Using the built-in default scenario, optionally adjusted with `run` flags

Use `config -o <file>` to write a template configuration to start from.";

/// Command line arguments
#[derive(Parser)]
#[command(author, version, about = "Bearing-only target tracking with a particle filter.", long_about = LONG_ABOUT)]
struct Cli {
    /// Scenario configuration file (TOML/JSON/YAML). Without a subcommand the scenario is run.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,

    /// Log level (off, error, warn, info, debug, trace); overrides the config file
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Log file path (if not specified, logs to stderr)
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
}

/// Top-level commands
#[derive(Subcommand, Clone, Debug)]
enum Command {
    #[command(
        name = "run",
        about = "Run a tracking scenario",
        long_about = "Run a tracking scenario and write the particle states to CSV. The scenario comes from --config when given, otherwise the built-in default is used. Flags given here override the corresponding scenario values."
    )]
    Run(RunArgs),

    #[command(name = "config", about = "Generate a template configuration file")]
    CreateConfig(CreateConfigArgs),
}

/// Overrides applied on top of the scenario
#[derive(Args, Clone, Debug, Default)]
struct RunArgs {
    /// Output CSV file path
    #[arg(short, long, value_parser)]
    output: Option<PathBuf>,

    /// Number of particles
    #[arg(short = 'n', long)]
    num_particles: Option<usize>,

    /// Simulated duration in seconds
    #[arg(short, long)]
    time_steps: Option<u64>,

    /// Seed for both the filter and the simulated sensor noise
    #[arg(short, long)]
    seed: Option<u64>,

    /// Resampling strategy
    #[arg(short, long, value_enum)]
    resampling: Option<ResamplingStrategy>,
}

#[derive(Args, Clone, Debug)]
struct CreateConfigArgs {
    /// Output file; the extension (.toml, .json, .yaml, .yml) selects the format
    #[arg(short, long, value_parser, default_value = "bearingtrack.toml")]
    output: PathBuf,
}

impl RunArgs {
    fn apply(&self, config: &mut SimulationConfig) {
        if let Some(output) = &self.output {
            config.output = output.clone();
        }
        if let Some(n) = self.num_particles {
            config.particle_filter.num_particles = n;
        }
        if let Some(time_steps) = self.time_steps {
            config.time_steps = time_steps;
        }
        if let Some(seed) = self.seed {
            config.particle_filter.seed = seed;
            config.simulator_seed = seed;
        }
        if let Some(strategy) = self.resampling {
            config.particle_filter.resampling_strategy = strategy;
        }
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<SimulationConfig, Box<dyn Error>> {
    match path {
        Some(path) => SimulationConfig::from_file(path)
            .map_err(|e| -> Box<dyn Error> {
                format!("failed to read config {}: {}", path.display(), e).into()
            }),
        None => Ok(SimulationConfig::default()),
    }
}

fn run(config: &SimulationConfig) -> Result<(), Box<dyn Error>> {
    let result = run_simulation(config).inspect_err(|e| error!("Simulation failed: {}", e))?;
    ensure_parent_dir(&config.output)?;
    result.write_csv(&config.output)?;
    info!(
        "Wrote {} particle records to {}",
        result.records.len(),
        config.output.display()
    );
    if let Some(last) = result.final_step() {
        info!(
            "Final estimate ({:.2}, {:.2}) vs truth ({:.2}, {:.2})",
            last.estimate.x, last.estimate.y, last.true_position.x, last.true_position.y
        );
    }
    Ok(())
}

fn create_config_file(args: &CreateConfigArgs) -> Result<(), Box<dyn Error>> {
    ensure_parent_dir(&args.output)?;
    SimulationConfig::default().to_file(&args.output)?;
    info!("Wrote template configuration to {}", args.output.display());
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let mut config = load_config(cli.config.as_ref())?;

    // CLI flags take precedence over the config file's logging section
    let log_level = cli.log_level.as_deref().unwrap_or(config.logging.level.as_str());
    let log_file = cli.log_file.as_ref().or(config.logging.file.as_ref());
    init_logger(log_level, log_file)?;

    match cli.command {
        Some(Command::Run(args)) => {
            args.apply(&mut config);
            run(&config)
        }
        Some(Command::CreateConfig(args)) => create_config_file(&args),
        None if cli.config.is_some() => run(&config),
        None => {
            eprintln!("Error: No command provided. Use -h or --help for usage information.");
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use tempfile::tempdir;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run_overrides() {
        let cli = Cli::try_parse_from([
            "bearingtrack",
            "run",
            "--output",
            "out/states.csv",
            "-n",
            "250",
            "--time-steps",
            "60",
            "--seed",
            "9",
            "--resampling",
            "stratified",
        ])
        .unwrap();
        let Some(Command::Run(args)) = cli.command else {
            panic!("expected run command");
        };
        assert_eq!(args.output, Some(PathBuf::from("out/states.csv")));
        assert_eq!(args.num_particles, Some(250));
        assert_eq!(args.time_steps, Some(60));
        assert_eq!(args.seed, Some(9));
        assert_eq!(args.resampling, Some(ResamplingStrategy::Stratified));
    }

    #[test]
    fn test_parse_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "bearingtrack",
            "run",
            "--config",
            "scenario.yaml",
            "--log-level",
            "debug",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("scenario.yaml")));
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        assert!(cli.log_file.is_none());
    }

    #[test]
    fn test_parse_config_command_default_output() {
        let cli = Cli::try_parse_from(["bearingtrack", "config"]).unwrap();
        let Some(Command::CreateConfig(args)) = cli.command else {
            panic!("expected config command");
        };
        assert_eq!(args.output, PathBuf::from("bearingtrack.toml"));
    }

    #[test]
    fn test_parse_rejects_unknown_strategy() {
        assert!(Cli::try_parse_from(["bearingtrack", "run", "--resampling", "best"]).is_err());
    }

    #[test]
    fn test_run_args_apply() {
        let mut config = SimulationConfig::default();
        let args = RunArgs {
            output: Some(PathBuf::from("elsewhere.csv")),
            num_particles: Some(42),
            time_steps: None,
            seed: Some(3),
            resampling: Some(ResamplingStrategy::Residual),
        };
        args.apply(&mut config);
        assert_eq!(config.output, PathBuf::from("elsewhere.csv"));
        assert_eq!(config.particle_filter.num_particles, 42);
        assert_eq!(config.time_steps, 200);
        assert_eq!(config.particle_filter.seed, 3);
        assert_eq!(config.simulator_seed, 3);
        assert_eq!(
            config.particle_filter.resampling_strategy,
            ResamplingStrategy::Residual
        );
    }

    #[test]
    fn test_run_args_default_leaves_config_untouched() {
        let mut config = SimulationConfig::default();
        RunArgs::default().apply(&mut config);
        assert_eq!(config, SimulationConfig::default());
    }

    #[test]
    fn test_create_config_then_load() {
        let dir = tempdir().unwrap();
        let args = CreateConfigArgs {
            output: dir.path().join("templates").join("scenario.json"),
        };
        create_config_file(&args).unwrap();
        let loaded = load_config(Some(&args.output)).unwrap();
        assert_eq!(loaded, SimulationConfig::default());
    }

    #[test]
    fn test_load_config_missing_file() {
        assert!(load_config(Some(&PathBuf::from("missing.toml"))).is_err());
        assert_eq!(load_config(None).unwrap(), SimulationConfig::default());
    }

    #[test]
    fn test_run_writes_csv() {
        let dir = tempdir().unwrap();
        let mut config = SimulationConfig::default();
        config.time_steps = 12;
        config.particle_filter.num_particles = 20;
        config.output = dir.path().join("nested").join("states.csv");
        run(&config).unwrap();
        let records = bearingtrack::sim::ParticleRecord::read_csv(&config.output).unwrap();
        assert_eq!(records.len(), 12 * 20);
    }
}
