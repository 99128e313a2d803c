//! Shared helpers for the command-line front end: logger setup and output path handling.

use std::error::Error;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Timestamp layout prefixed to every log record.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Install the global logger.
///
/// Records are written as `<local time> [LEVEL] - message`. They go to stderr unless `log_file`
/// is given, in which case they are appended to that file (its directory is created if needed).
///
/// # Errors
/// Returns an error if the log file cannot be opened or a logger is already installed.
pub fn init_logger(log_level: &str, log_file: Option<&PathBuf>) -> Result<(), Box<dyn Error>> {
    let target = match log_file {
        Some(path) => env_logger::Target::Pipe(Box::new(open_log_file(path)?)),
        None => env_logger::Target::Stderr,
    };
    env_logger::Builder::new()
        .filter_level(parse_level(log_level))
        .format(write_record)
        .target(target)
        .try_init()?;
    Ok(())
}

fn write_record(buf: &mut env_logger::fmt::Formatter, record: &log::Record) -> io::Result<()> {
    let timestamp = chrono::Local::now().format(TIMESTAMP_FORMAT);
    writeln!(buf, "{} [{}] - {}", timestamp, record.level(), record.args())
}

fn open_log_file(path: &Path) -> Result<File, Box<dyn Error>> {
    ensure_parent_dir(path)?;
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    Ok(file)
}

/// Parse a level name, falling back to `info` for anything unrecognized.
pub fn parse_level(log_level: &str) -> log::LevelFilter {
    log_level.parse::<log::LevelFilter>().unwrap_or_else(|_| {
        eprintln!("Invalid log level '{}', defaulting to 'info'", log_level);
        log::LevelFilter::Info
    })
}

/// Create the directory that will hold `path` if it does not exist yet.
///
/// # Errors
/// Returns an error if directory creation fails or `path` is an existing directory.
pub fn ensure_parent_dir(path: &Path) -> Result<(), Box<dyn Error>> {
    if path.is_dir() {
        return Err(format!("{} is a directory, expected a file path", path.display()).into());
    }
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}
