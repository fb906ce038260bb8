//! Binary entry point for the Nimbus CLI.

use std::io::{self, Write};
use std::process;

use chrono::{NaiveDate, Utc};
use clap::Parser;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use nimbus::cli::{Cli, Command, ScaleCommand, SnapshotsCommand, StatusCommand};
use nimbus::{
    Compute, ConfigError, ConnectError, ConsoleReporter, FleetConfig, ProviderError, Reporter,
    ResizeError, ResizeOrchestrator, ResizeRequest, ResourceDirectory,
    RetentionMode, SnapshotSweeper, SweepError, SweepOptions, connect_directory,
};

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Connect(#[from] ConnectError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Sweep(#[from] SweepError),
    #[error(transparent)]
    Resize(#[from] ResizeError),
    #[error("invalid --as-of date {value:?}, expected YYYY-MM-DD")]
    InvalidDate { value: String },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(&cli);

    let exit_code = match dispatch(cli).await {
        Ok(code) => code,
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

fn init_tracing(cli: &Cli) {
    let default_directive = if cli.debug {
        "nimbus=debug"
    } else if cli.verbose {
        "nimbus=info"
    } else {
        "nimbus=warn"
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

async fn dispatch(cli: Cli) -> Result<i32, CliError> {
    let config = FleetConfig::load_without_cli_args()?;
    let profile = cli.profile.or_else(|| config.profile.clone());
    let regions = if cli.regions.is_empty() {
        config.regions()
    } else {
        cli.regions
    };

    let directory = connect_directory(&regions, profile.as_deref()).await?;
    let mut reporter = ConsoleReporter::new(io::stdout(), cli.verbose);

    match cli.command {
        Command::Regions => list_regions(&directory, &mut reporter).await,
        Command::Status(command) => status(&directory, &mut reporter, &command).await,
        Command::Snapshots(command) => snapshots(&directory, &mut reporter, command).await,
        Command::Scale(command) => scale(&directory, &mut reporter, command, &config).await,
    }
}

async fn list_regions<C: Compute>(
    directory: &ResourceDirectory<C>,
    reporter: &mut impl Reporter,
) -> Result<i32, CliError> {
    let Some(handle) = directory.any_handle() else {
        return Ok(1);
    };
    for name in handle.list_region_names().await? {
        reporter.region_name(&name);
    }
    Ok(0)
}

async fn status<C: Compute>(
    directory: &ResourceDirectory<C>,
    reporter: &mut impl Reporter,
    command: &StatusCommand,
) -> Result<i32, CliError> {
    if let Some(name) = command.name.as_deref() {
        // A missed lookup is a reported no-op, not a failure.
        match directory.find_server_by_name(name).await? {
            Some(server) => reporter.server(&server),
            None => reporter.not_found(name),
        }
        return Ok(0);
    }

    for handle in directory.handles() {
        let servers = handle.list_servers().await?;
        reporter.region_servers(handle.region(), servers.len());
        for server in &servers {
            reporter.server(server);
        }
    }
    Ok(0)
}

async fn snapshots<C: Compute>(
    directory: &ResourceDirectory<C>,
    reporter: &mut impl Reporter,
    command: SnapshotsCommand,
) -> Result<i32, CliError> {
    let today = match command.as_of {
        Some(value) => NaiveDate::parse_from_str(&value, "%Y-%m-%d")
            .map_err(|_| CliError::InvalidDate { value })?,
        None => Utc::now().date_naive(),
    };
    let options = SweepOptions {
        mode: if command.full {
            RetentionMode::Full
        } else {
            RetentionMode::Normal
        },
        remove: command.remove,
        limit: command.name,
        today,
    };

    let summary = SnapshotSweeper::new(directory, reporter, options)
        .run()
        .await?;
    tracing::info!(
        planned = summary.planned,
        deleted = summary.deleted,
        failed = summary.failed,
        "sweep finished"
    );
    // Rejected deletions were recovered and reported inside the sweep;
    // they never surface in the exit status.
    Ok(0)
}

async fn scale<C: Compute>(
    directory: &ResourceDirectory<C>,
    reporter: &mut impl Reporter,
    command: ScaleCommand,
    config: &FleetConfig,
) -> Result<i32, CliError> {
    let request = ResizeRequest {
        name: command.name,
        flavor: command
            .flavor
            .unwrap_or_else(|| config.default_flavor.clone()),
        no_start: command.no_start,
        no_address: command.no_address,
    };

    // Every non-error outcome, including a missed lookup, exits cleanly.
    ResizeOrchestrator::new(directory, reporter)
        .resize(&request)
        .await?;
    Ok(0)
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}

#[cfg(test)]
mod tests {
    use super::*;
    use nimbus::ServerState;
    use nimbus::test_support::{
        FakeCompute, RecordingReporter, ReportEvent, server, snapshot,
    };

    fn web_directory() -> (FakeCompute, ResourceDirectory<FakeCompute>) {
        let fake = FakeCompute::new("eu-west-1")
            .with_servers(vec![server(
                "i-web",
                "web",
                ServerState::Running,
                "m1.large",
                "eu-west-1a",
            )])
            .with_snapshots(vec![
                snapshot("snap-1", "web backup", 2023, 1, 3),
                snapshot("snap-2", "web backup", 2023, 1, 20),
            ]);
        let directory = ResourceDirectory::new(vec![fake.clone()]);
        (fake, directory)
    }

    fn config() -> FleetConfig {
        FleetConfig {
            profile: None,
            regions: None,
            default_flavor: "m1.large".to_owned(),
        }
    }

    #[tokio::test]
    async fn recovered_deletion_failures_exit_cleanly() {
        let (fake, directory) = web_directory();
        fake.fail_delete("snap-1");
        let mut reporter = RecordingReporter::new();
        let command = SnapshotsCommand {
            name: None,
            remove: true,
            full: false,
            as_of: Some("2023-03-10".to_owned()),
        };

        let code = snapshots(&directory, &mut reporter, command)
            .await
            .expect("sweep should succeed");

        assert_eq!(code, 0);
        assert!(reporter
            .events
            .contains(&ReportEvent::DeletionFailed("snap-1".to_owned())));
    }

    #[tokio::test]
    async fn status_for_an_unknown_name_exits_cleanly() {
        let (_fake, directory) = web_directory();
        let mut reporter = RecordingReporter::new();
        let command = StatusCommand {
            name: Some("ghost".to_owned()),
        };

        let code = status(&directory, &mut reporter, &command)
            .await
            .expect("status should succeed");

        assert_eq!(code, 0);
        assert!(reporter
            .events
            .contains(&ReportEvent::NotFound("ghost".to_owned())));
    }

    #[tokio::test]
    async fn scale_of_an_unknown_name_exits_cleanly() {
        let (fake, directory) = web_directory();
        let mut reporter = RecordingReporter::new();
        let command = ScaleCommand {
            name: "ghost".to_owned(),
            flavor: None,
            no_address: false,
            no_start: false,
        };

        let code = scale(&directory, &mut reporter, command, &config())
            .await
            .expect("scale should succeed");

        assert_eq!(code, 0);
        assert!(fake.calls().is_empty());
        assert!(reporter
            .events
            .contains(&ReportEvent::NotFound("ghost".to_owned())));
    }

    #[tokio::test]
    async fn malformed_as_of_dates_are_rejected() {
        let (_fake, directory) = web_directory();
        let mut reporter = RecordingReporter::new();
        let command = SnapshotsCommand {
            name: None,
            remove: false,
            full: false,
            as_of: Some("03/10/2023".to_owned()),
        };

        let err = snapshots(&directory, &mut reporter, command)
            .await
            .expect_err("a malformed date should be rejected");

        assert!(matches!(err, CliError::InvalidDate { ref value } if value == "03/10/2023"));
    }
}
