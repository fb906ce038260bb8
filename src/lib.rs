//! Core library for the Nimbus fleet management tool.
//!
//! The crate exposes a per-region compute provider abstraction, a
//! multi-region resource directory built on it, and two engines driven
//! through that directory: a snapshot retention sweeper and an instance
//! resize orchestrator. The EC2 module supplies the live provider;
//! everything above it is testable against in-memory doubles.

pub mod cli;
pub mod config;
pub mod directory;
pub mod ec2;
pub mod provider;
pub mod report;
pub mod resize;
pub mod retention;
pub mod test_support;

pub use config::{ConfigError, DEFAULT_REGIONS, FleetConfig};
pub use directory::{DirectoryError, ResourceDirectory, region_from_zone};
pub use ec2::{ConnectError, Ec2Compute, connect_directory};
pub use provider::{
    Compute, ProviderError, ProviderFuture, Server, ServerState, Snapshot, Tags,
};
pub use report::{ConsoleReporter, Reporter};
pub use resize::{ResizeError, ResizeOrchestrator, ResizeOutcome, ResizePhase, ResizeRequest};
pub use retention::{
    BucketDecision, RetentionDecision, RetentionMode, SnapshotSpan, SnapshotSweeper, SweepError,
    SweepOptions, SweepSummary, decide,
};
