//! CLI argument parsing for bridges.

use std::net::IpAddr;
use std::path::PathBuf;

use clap::{CommandFactory, FromArgMatches, Parser};

/// Common CLI arguments for all bridges.
#[derive(Parser, Debug, Clone)]
#[command(about = "Polymod OSC bridge")]
#[command(version)]
pub struct BridgeArgs {
    /// Path to configuration file (JSON5 format).
    #[arg(short, long)]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Send OSC messages to this IP instead of the configured one.
    #[arg(value_name = "CLIENT_IP")]
    pub client_ip: Option<IpAddr>,
}

impl BridgeArgs {
    /// Parse CLI arguments with a default config path.
    ///
    /// If no `--config` argument is provided, uses the default.
    pub fn parse_with_default(default_config: &'static str) -> Self {
        Self::parse_from_with_default(std::env::args_os(), default_config)
    }

    /// Same as [`parse_with_default`](Self::parse_with_default) over an explicit argument list.
    ///
    /// Exits the process with a usage message on invalid arguments, like clap does.
    pub fn parse_from_with_default<I, T>(args: I, default_config: &'static str) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let matches = Self::command()
            .mut_arg("config", |arg| {
                arg.required(false).default_value(default_config)
            })
            .get_matches_from(args);

        Self::from_arg_matches(&matches).unwrap_or_else(|e| e.exit())
    }
}
