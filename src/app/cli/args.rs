//! Command line arguments

use clap::builder::PossibleValuesParser;
use clap::{CommandFactory, FromArgMatches, Parser, Subcommand};
use relaybus::core::logging::LogFormat;
use relaybus::bus::BusSettings;
use std::io::IsTerminal;
use std::path::PathBuf;
use strum::IntoEnumIterator;

#[derive(Parser, Debug, Clone)]
#[command(name = "relaybus")]
#[command(about = "Service bus node: inbox, outbox, deferred delivery and distribution")]
#[command(version)]
pub struct Args {
    /// Configuration file path
    #[arg(short = 'c', long = "config", value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Log level
    #[arg(
        short = 'l',
        long = "log-level",
        value_name = "LEVEL",
        global = true,
        value_parser = ["trace", "debug", "info", "warn", "error", "off"]
    )]
    pub log_level: Option<String>,

    /// Log output format
    #[arg(
        short = 'o',
        long = "log-format",
        value_name = "FORMAT",
        global = true,
        value_parser = log_formats()
    )]
    pub log_format: Option<String>,

    /// Log file path (use 'none' to disable file logging)
    #[arg(short = 'f', long = "log-file", value_name = "FILE", global = true)]
    pub log_file: Option<PathBuf>,

    /// Disable coloured output
    #[arg(long = "no-color", global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Start the bus and process messages until interrupted
    Run,
    /// Validate the configuration and list the configured roles
    Check,
}

impl Args {
    /// Parse the process arguments; `--version` includes build details
    pub fn parse_from_env() -> Self {
        let matches = Self::command().long_version(long_version()).get_matches();
        match Self::from_arg_matches(&matches) {
            Ok(args) => args,
            Err(e) => e.exit(),
        }
    }

    /// Explicit `--config`, otherwise the file in the user config directory
    pub fn config_path(&self) -> Option<PathBuf> {
        self.config.clone().or_else(BusSettings::default_path)
    }

    pub fn log_file(&self) -> Option<String> {
        self.log_file
            .as_ref()
            .map(|path| path.to_string_lossy().to_string())
            .filter(|path| !path.eq_ignore_ascii_case("none"))
    }

    pub fn use_color(&self) -> bool {
        !self.no_color && std::io::stdout().is_terminal()
    }
}

fn log_formats() -> PossibleValuesParser {
    PossibleValuesParser::new(LogFormat::iter().map(|format| format.to_string()))
}

pub fn long_version() -> String {
    format!(
        "{} (envelope format {}, built {}, commit {})",
        env!("CARGO_PKG_VERSION"),
        relaybus::get_envelope_format_version(),
        relaybus::BUILD_TIME,
        relaybus::GIT_HASH
    )
}
