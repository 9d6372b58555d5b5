//! # Command-Line Interface
//!
//! Argument parsing for the `sardis-node` binary.

use clap::{Args, Parser, Subcommand};

/// Sardis service host.
#[derive(Debug, Parser)]
#[command(name = "sardis-node", version, about = "Sardis payment core service host")]
pub struct SardisNodeCli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Start the service host.
    Run(RunArgs),
    /// Print build version information.
    Version,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Address for the HTTP API listener.
    #[arg(long, default_value = "127.0.0.1:8420")]
    pub listen_addr: String,

    /// Default log level when RUST_LOG is unset.
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Log output format: "pretty" or "json".
    #[arg(long, default_value = "pretty")]
    pub log_format: String,
}

/// Accepted log level strings.
pub fn validate_log_level(level: &str) -> bool {
    matches!(level, "trace" | "debug" | "info" | "warn" | "error")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_defaults() {
        let cli = SardisNodeCli::parse_from(["sardis-node", "run"]);
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.listen_addr, "127.0.0.1:8420");
                assert_eq!(args.log_level, "info");
                assert_eq!(args.log_format, "pretty");
            }
            other => panic!("expected run, got {other:?}"),
        }
    }

    #[test]
    fn run_overrides() {
        let cli = SardisNodeCli::parse_from([
            "sardis-node",
            "run",
            "--listen-addr",
            "0.0.0.0:9000",
            "--log-level",
            "debug",
            "--log-format",
            "json",
        ]);
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.listen_addr, "0.0.0.0:9000");
                assert_eq!(args.log_level, "debug");
                assert_eq!(args.log_format, "json");
            }
            other => panic!("expected run, got {other:?}"),
        }
    }

    #[test]
    fn log_level_validation() {
        assert!(validate_log_level("info"));
        assert!(validate_log_level("trace"));
        assert!(!validate_log_level("verbose"));
    }
}
