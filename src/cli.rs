//! Command-line interface for winsvc.
use std::str::FromStr;

use clap::{Parser, Subcommand, error::ErrorKind};
use tracing::level_filters::LevelFilter;

use crate::registrar::StartupPolicy;

/// Printed when no command, or an unknown one, is given.
pub const USAGE: &str = "usage: winsvc install|remove|run";

/// Wrapper around `LevelFilter` so clap can parse log levels from either
/// string names ("info", "debug", etc.) or numeric shorthands (0-5).
#[derive(Clone, Copy, Debug)]
pub struct LogLevelArg(LevelFilter);

impl LogLevelArg {
    /// String representation suitable for `RUST_LOG`.
    pub fn as_str(&self) -> &'static str {
        match self.0 {
            LevelFilter::OFF => "off",
            LevelFilter::ERROR => "error",
            LevelFilter::WARN => "warn",
            LevelFilter::INFO => "info",
            LevelFilter::DEBUG => "debug",
            LevelFilter::TRACE => "trace",
        }
    }
}

impl FromStr for LogLevelArg {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err("log level cannot be empty".into());
        }

        if let Ok(number) = trimmed.parse::<u8>() {
            let level = match number {
                0 => LevelFilter::OFF,
                1 => LevelFilter::ERROR,
                2 => LevelFilter::WARN,
                3 => LevelFilter::INFO,
                4 => LevelFilter::DEBUG,
                5 => LevelFilter::TRACE,
                _ => {
                    return Err(format!(
                        "unsupported log level number '{number}' (expected 0-5)"
                    ));
                }
            };

            return Ok(LogLevelArg(level));
        }

        let level = match trimmed.to_ascii_lowercase().as_str() {
            "off" => Some(LevelFilter::OFF),
            "error" | "err" => Some(LevelFilter::ERROR),
            "warn" | "warning" => Some(LevelFilter::WARN),
            "info" | "information" => Some(LevelFilter::INFO),
            "debug" => Some(LevelFilter::DEBUG),
            "trace" => Some(LevelFilter::TRACE),
            _ => None,
        }
        .ok_or_else(|| format!("invalid log level '{trimmed}'"))?;

        Ok(LogLevelArg(level))
    }
}

/// Command-line interface for winsvc.
#[derive(Parser, Debug)]
#[command(name = "winsvc", version, author)]
#[command(about = "Install, remove or run the example Windows service", long_about = None)]
pub struct Cli {
    /// Override the logging verbosity for this invocation only.
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_level: Option<LogLevelArg>,

    /// Path to the configuration file (defaults to `winsvc.yaml` if present).
    #[arg(short, long, value_name = "PATH", global = true)]
    pub config: Option<String>,

    /// The command to execute.
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available commands for winsvc.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Register this executable as a service, or update an existing registration.
    Install {
        /// Startup policy (defaults to the configured one, normally on_demand).
        #[arg(long, value_name = "POLICY")]
        startup: Option<StartupPolicy>,
    },

    /// Remove the service registration.
    Remove,

    /// Run as a service. Started by the service control manager.
    Run {
        /// Run in this console without the service control manager.
        #[arg(long)]
        foreground: bool,
    },
}

/// Parses command-line arguments and returns a `Cli` struct.
///
/// An unknown command prints [`USAGE`] and exits with status 1; other parse
/// errors are reported by clap.
pub fn parse_args() -> Cli {
    match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) if is_unknown_command(&err) => {
            println!("{USAGE}");
            std::process::exit(1);
        }
        Err(err) => err.exit(),
    }
}

fn is_unknown_command(err: &clap::Error) -> bool {
    err.kind() == ErrorKind::InvalidSubcommand
}
