//! Instance resize state machine.
//!
//! Drives one server through stop → modify → start → re-address against
//! the asynchronous provider API. Wait loops poll idempotent status checks
//! and are deadline-bounded; exceeding the deadline surfaces a
//! [`ResizeError::Timeout`] distinct from provider failures.

use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::time::sleep;

use crate::directory::{DirectoryError, ResourceDirectory};
use crate::provider::{Compute, ProviderError, Server, ServerState};
use crate::report::Reporter;

const POLL_INTERVAL: Duration = Duration::from_secs(5);
const WAIT_TIMEOUT: Duration = Duration::from_secs(300);

/// Steps of the resize state machine, reported as transitions happen.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ResizePhase {
    /// Nothing has been issued yet.
    Idle,
    /// A stop was issued; waiting for the server to halt.
    Stopping,
    /// The server is confirmed halted.
    Stopped,
    /// The flavor-change call is in flight.
    Modifying,
    /// A start was issued; waiting for the server to come up.
    Starting,
    /// The server is confirmed up.
    Running,
    /// Re-associating the saved public address.
    Addressing,
    /// The operation completed.
    Done,
    /// The operation failed at some step; no further calls were issued.
    Aborted,
}

impl ResizePhase {
    /// Short label used for progress output.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Stopping => "Stopping",
            Self::Stopped => "Stopped",
            Self::Modifying => "Modifying",
            Self::Starting => "Starting",
            Self::Running => "Running",
            Self::Addressing => "Addressing",
            Self::Done => "Done",
            Self::Aborted => "Aborted",
        }
    }
}

/// Inputs for one resize operation.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ResizeRequest {
    /// Name tag of the server to resize.
    pub name: String,
    /// Target flavor.
    pub flavor: String,
    /// Leave the server stopped after modification.
    pub no_start: bool,
    /// Skip re-associating the previously held public address.
    pub no_address: bool,
}

/// Terminal result of a resize operation.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ResizeOutcome {
    /// No server carries the requested name tag; nothing was issued.
    NotFound,
    /// The server already has the requested flavor; nothing was issued.
    AlreadySized {
        /// The flavor the server already has.
        flavor: String,
    },
    /// The resize ran to completion. Carries the re-fetched server so the
    /// caller observes the authoritative post-operation state.
    Resized {
        /// Fresh view of the server, when the provider still reports it.
        server: Option<Server>,
    },
}

/// Errors that abort a resize operation.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ResizeError {
    /// The server's availability zone maps to no held region.
    #[error(transparent)]
    Directory(#[from] DirectoryError),
    /// A provider call other than modification failed.
    #[error(transparent)]
    Provider(#[from] ProviderError),
    /// The flavor-change call was rejected. Not retried and not
    /// compensated: the server may be left stopped with the old flavor.
    #[error("flavor modification failed for {server_id}: {source}")]
    Modify {
        /// Server being modified.
        server_id: String,
        /// Provider rejection.
        source: ProviderError,
    },
    /// A wait loop exceeded its deadline.
    #[error("timeout waiting for {action} on server {server_id}")]
    Timeout {
        /// Action being waited on.
        action: &'static str,
        /// Server being polled.
        server_id: String,
    },
}

/// Sequences one resize operation against the directory's region handles.
pub struct ResizeOrchestrator<'a, C, R> {
    directory: &'a ResourceDirectory<C>,
    reporter: &'a mut R,
    poll_interval: Duration,
    wait_timeout: Duration,
}

impl<'a, C: Compute, R: Reporter> ResizeOrchestrator<'a, C, R> {
    /// Creates an orchestrator with the default polling cadence.
    pub fn new(directory: &'a ResourceDirectory<C>, reporter: &'a mut R) -> Self {
        Self::with_timing(directory, reporter, POLL_INTERVAL, WAIT_TIMEOUT)
    }

    /// Creates an orchestrator with an explicit polling cadence.
    pub fn with_timing(
        directory: &'a ResourceDirectory<C>,
        reporter: &'a mut R,
        poll_interval: Duration,
        wait_timeout: Duration,
    ) -> Self {
        Self {
            directory,
            reporter,
            poll_interval,
            wait_timeout,
        }
    }

    /// Runs the resize state machine for `request`.
    ///
    /// A missing server or an already-matching flavor is a clean no-op
    /// outcome, not an error. An address re-association failure is logged
    /// and reported but does not fail the resize.
    ///
    /// # Errors
    ///
    /// Returns [`ResizeError`] on lookup failures, provider rejections of
    /// stop/modify/start, or wait-loop timeouts.
    pub async fn resize(&mut self, request: &ResizeRequest) -> Result<ResizeOutcome, ResizeError> {
        match self.execute(request).await {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                self.reporter.phase(ResizePhase::Aborted);
                Err(err)
            }
        }
    }

    async fn execute(&mut self, request: &ResizeRequest) -> Result<ResizeOutcome, ResizeError> {
        let directory = self.directory;

        let Some(server) = directory.find_server_by_name(&request.name).await? else {
            self.reporter.not_found(&request.name);
            return Ok(ResizeOutcome::NotFound);
        };
        if server.flavor == request.flavor {
            tracing::info!(server = %server.id, flavor = %server.flavor, "flavor already matches");
            // Still surface the current attributes on the no-op path.
            self.reporter.server(&server);
            return Ok(ResizeOutcome::AlreadySized {
                flavor: server.flavor,
            });
        }

        self.reporter.server(&server);
        let handle = directory.region_of(&server)?;

        let mut saved_address = None;
        match server.state {
            ServerState::Running => {
                saved_address = server.public_ip.clone();
                self.reporter.phase(ResizePhase::Stopping);
                handle.stop_server(&server.id).await?;
                self.wait_for_state(handle, &server.id, &ServerState::Stopped, "stop")
                    .await?;
                self.reporter.phase(ResizePhase::Stopped);
            }
            ServerState::Stopped => {}
            // Transient states skip straight to modification without
            // waiting.
            ServerState::Other(_) => {}
        }

        self.reporter.phase(ResizePhase::Modifying);
        handle
            .modify_flavor(&server.id, &request.flavor)
            .await
            .map_err(|source| ResizeError::Modify {
                server_id: server.id.clone(),
                source,
            })?;

        if !request.no_start {
            self.reporter.phase(ResizePhase::Starting);
            handle.start_server(&server.id).await?;
            self.wait_for_state(handle, &server.id, &ServerState::Running, "start")
                .await?;
            self.reporter.phase(ResizePhase::Running);

            if let Some(address) = saved_address.as_deref().filter(|_| !request.no_address) {
                self.reporter.phase(ResizePhase::Addressing);
                if let Err(error) = handle.associate_address(&server.id, address).await {
                    tracing::warn!(server = %server.id, address, %error, "address re-association failed");
                    self.reporter.address_failed(address, &error);
                }
            }
        }

        self.reporter.phase(ResizePhase::Done);
        let refreshed = handle.poll_server(&server.id).await?;
        if let Some(current) = &refreshed {
            self.reporter.server(current);
        }
        Ok(ResizeOutcome::Resized { server: refreshed })
    }

    async fn wait_for_state(
        &mut self,
        handle: &C,
        server_id: &str,
        want: &ServerState,
        action: &'static str,
    ) -> Result<(), ResizeError> {
        let deadline = Instant::now() + self.wait_timeout;
        while Instant::now() <= deadline {
            let observed = handle.poll_server(server_id).await?;
            if observed.is_some_and(|server| server.state == *want) {
                return Ok(());
            }
            self.reporter.poll_tick();
            sleep(self.poll_interval).await;
        }

        Err(ResizeError::Timeout {
            action,
            server_id: server_id.to_owned(),
        })
    }
}
