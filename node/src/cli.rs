//! # CLI Interface
//!
//! Defines the command-line argument structure for `vela-node` using
//! `clap` derive. Supports three subcommands: `run`, `tiers`, and
//! `version`.

use clap::{Parser, Subcommand};

/// Vela wallet core operator daemon.
///
/// Hosts the core's process-wide singletons, runs the periodic
/// maintenance sweeps (idempotency GC, expired-lock release), and exposes
/// Prometheus metrics. The request-serving HTTP layer mounts the core
/// from its own deployment; this binary is the ops surface.
#[derive(Parser, Debug)]
#[command(
    name = "vela-node",
    about = "Vela wallet core operator daemon",
    version,
    propagate_version = true
)]
pub struct VelaNodeCli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands for the vela-node binary.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the daemon.
    Run(RunArgs),
    /// Print the KYC tier limit table and exit.
    Tiers,
    /// Print version information and exit.
    Version,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "VELA_METRICS_PORT", default_value_t = 9632)]
    pub metrics_port: u16,

    /// Seconds between maintenance sweeps.
    #[arg(long, env = "VELA_SWEEP_INTERVAL", default_value_t = 60)]
    pub sweep_interval_secs: u64,

    /// Rate-limit violations inside the window that trigger an automatic
    /// account lock.
    #[arg(long, env = "VELA_ABUSE_THRESHOLD", default_value_t = 10)]
    pub abuse_threshold: usize,

    /// Trailing window over which violations are counted, in minutes.
    #[arg(long, env = "VELA_ABUSE_WINDOW_MINUTES", default_value_t = 60)]
    pub abuse_window_minutes: i64,

    /// Duration of an automatic account lock, in hours.
    #[arg(long, env = "VELA_ABUSE_LOCK_HOURS", default_value_t = 24)]
    pub abuse_lock_hours: i64,

    /// Log output format: "pretty" or "json".
    #[arg(long, env = "VELA_LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli_structure() {
        // Ensures the derive macros produce a valid CLI definition.
        VelaNodeCli::command().debug_assert();
    }

    #[test]
    fn run_args_defaults() {
        let cli = VelaNodeCli::parse_from(["vela-node", "run"]);
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.metrics_port, 9632);
                assert_eq!(args.sweep_interval_secs, 60);
                assert_eq!(args.abuse_threshold, 10);
            }
            other => panic!("expected run, got {:?}", other),
        }
    }
}
