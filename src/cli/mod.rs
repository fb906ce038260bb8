//! Command-line interface definitions for the `nimbus` binary.
//!
//! This module centralises the clap parser structures so both the main
//! binary and the build script can reuse them when generating the manual
//! page. It depends on nothing but clap.

use clap::{Parser, Subcommand};

/// Top-level CLI for the `nimbus` binary.
#[derive(Debug, Parser)]
#[command(
    name = "nimbus",
    about = "Multi-region EC2 fleet status, snapshot retention, and instance resizing",
    version,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Verbose output (region counts, tags).
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,
    /// Debug-level diagnostics on stderr.
    #[arg(long, global = true)]
    pub debug: bool,
    /// Profile from ~/.aws/config to authenticate with.
    #[arg(long, global = true, value_name = "PROFILE", env = "NIMBUS_PROFILE")]
    pub profile: Option<String>,
    /// Region to query; repeat for several. Overrides configuration.
    #[arg(long = "region", global = true, value_name = "REGION")]
    pub regions: Vec<String>,
    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands mirroring the operational surface of the fleet.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// List all provider regions.
    Regions,
    /// Show server status across the fleet.
    Status(StatusCommand),
    /// Show and optionally prune snapshots under the retention policy.
    Snapshots(SnapshotsCommand),
    /// Change a server's flavor, preserving its public address.
    Scale(ScaleCommand),
}

/// Arguments for the `status` subcommand.
#[derive(Debug, Parser)]
pub struct StatusCommand {
    /// Show only the server with this name tag.
    #[arg(long, value_name = "NAME")]
    pub name: Option<String>,
}

/// Arguments for the `snapshots` subcommand.
#[derive(Debug, Parser)]
pub struct SnapshotsCommand {
    /// Restrict deletion to the server with this name tag; other servers
    /// are still reported.
    #[arg(long, value_name = "NAME")]
    pub name: Option<String>,
    /// Actually delete; the default is a dry run.
    #[arg(long)]
    pub remove: bool,
    /// Alternative policy: keep only the most recent snapshot.
    #[arg(long)]
    pub full: bool,
    /// Evaluate the policy as of this date (YYYY-MM-DD) instead of today.
    #[arg(long, value_name = "DATE")]
    pub as_of: Option<String>,
}

/// Arguments for the `scale` subcommand.
#[derive(Debug, Parser)]
pub struct ScaleCommand {
    /// Name tag of the server to resize.
    #[arg(long, value_name = "NAME", required = true)]
    pub name: String,
    /// Target flavor, for example m1.small or m3.2xlarge. Falls back to
    /// the configured default.
    #[arg(long, value_name = "TYPE")]
    pub flavor: Option<String>,
    /// Do not re-associate the public address afterwards.
    #[arg(long)]
    pub no_address: bool,
    /// Leave the server stopped after modification.
    #[arg(long)]
    pub no_start: bool,
}
