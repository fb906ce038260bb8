//! Test support utilities shared across unit and integration tests.

use std::collections::{BTreeSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, TimeZone, Utc};

use crate::provider::{
    Compute, ProviderError, ProviderFuture, Server, ServerState, Snapshot, Tags,
};
use crate::report::Reporter;
use crate::resize::ResizePhase;
use crate::retention::SnapshotSpan;

/// Records a single call made through [`FakeCompute`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum FakeCall {
    /// A snapshot deletion, by snapshot identifier.
    DeleteSnapshot(String),
    /// A stop, by server identifier.
    Stop(String),
    /// A start, by server identifier.
    Start(String),
    /// A flavor modification.
    Modify {
        /// Server being modified.
        server: String,
        /// Requested flavor.
        flavor: String,
    },
    /// A public address re-association.
    Associate {
        /// Server receiving the address.
        server: String,
        /// Address being associated.
        address: String,
    },
    /// One status poll, by server identifier.
    Poll(String),
}

#[derive(Debug, Default)]
struct FakeState {
    servers: Vec<Server>,
    snapshots: Vec<Snapshot>,
    region_names: Vec<String>,
    poll_queue: VecDeque<Option<Server>>,
    fail_deletes: BTreeSet<String>,
    fail_modify: bool,
    fail_associate: bool,
    calls: Vec<FakeCall>,
}

/// In-memory region handle with scripted failures and call recording.
///
/// Clones share state, so a test can keep one clone for assertions after
/// moving another into a directory. Stop and start calls update the stored
/// server state, so wait loops converge on the next poll unless the poll
/// queue scripts something else.
#[derive(Clone, Debug)]
pub struct FakeCompute {
    region: String,
    state: Arc<Mutex<FakeState>>,
}

impl FakeCompute {
    /// Creates an empty fake bound to `region`.
    #[must_use]
    pub fn new(region: &str) -> Self {
        Self {
            region: region.to_owned(),
            state: Arc::new(Mutex::new(FakeState {
                region_names: vec![region.to_owned()],
                ..FakeState::default()
            })),
        }
    }

    /// Seeds the fake with servers.
    #[must_use]
    pub fn with_servers(self, servers: Vec<Server>) -> Self {
        self.lock().servers = servers;
        self
    }

    /// Seeds the fake with snapshots.
    #[must_use]
    pub fn with_snapshots(self, snapshots: Vec<Snapshot>) -> Self {
        self.lock().snapshots = snapshots;
        self
    }

    /// Sets the region names the provider reports.
    #[must_use]
    pub fn with_region_names(self, names: Vec<String>) -> Self {
        self.lock().region_names = names;
        self
    }

    /// Queues scripted poll results, consumed FIFO before falling back to
    /// the stored server list.
    pub fn script_poll(&self, outcomes: impl IntoIterator<Item = Option<Server>>) {
        self.lock().poll_queue.extend(outcomes);
    }

    /// Makes deletion of `snapshot_id` fail.
    pub fn fail_delete(&self, snapshot_id: &str) {
        self.lock().fail_deletes.insert(snapshot_id.to_owned());
    }

    /// Makes every flavor modification fail.
    pub fn fail_modify(&self) {
        self.lock().fail_modify = true;
    }

    /// Makes every address re-association fail.
    pub fn fail_associate(&self) {
        self.lock().fail_associate = true;
    }

    /// Returns every call recorded so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<FakeCall> {
        self.lock().calls.clone()
    }

    /// Returns the identifiers of the snapshots still stored.
    #[must_use]
    pub fn snapshot_ids(&self) -> Vec<String> {
        self.lock()
            .snapshots
            .iter()
            .map(|snapshot| snapshot.id.clone())
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Compute for FakeCompute {
    fn region(&self) -> &str {
        &self.region
    }

    fn list_servers(&self) -> ProviderFuture<'_, Vec<Server>> {
        Box::pin(async move { Ok(self.lock().servers.clone()) })
    }

    fn list_snapshots(&self) -> ProviderFuture<'_, Vec<Snapshot>> {
        Box::pin(async move {
            let mut snapshots = self.lock().snapshots.clone();
            snapshots.sort_by_key(|snapshot| snapshot.created_at);
            Ok(snapshots)
        })
    }

    fn delete_snapshot<'a>(&'a self, snapshot_id: &'a str) -> ProviderFuture<'a, ()> {
        Box::pin(async move {
            let mut state = self.lock();
            state
                .calls
                .push(FakeCall::DeleteSnapshot(snapshot_id.to_owned()));
            if state.fail_deletes.contains(snapshot_id) {
                return Err(ProviderError::api(format!(
                    "deletion of {snapshot_id} rejected"
                )));
            }
            state.snapshots.retain(|snapshot| snapshot.id != snapshot_id);
            Ok(())
        })
    }

    fn stop_server<'a>(&'a self, server_id: &'a str) -> ProviderFuture<'a, ()> {
        Box::pin(async move {
            let mut state = self.lock();
            state.calls.push(FakeCall::Stop(server_id.to_owned()));
            for server in &mut state.servers {
                if server.id == server_id {
                    server.state = ServerState::Stopped;
                }
            }
            Ok(())
        })
    }

    fn start_server<'a>(&'a self, server_id: &'a str) -> ProviderFuture<'a, ()> {
        Box::pin(async move {
            let mut state = self.lock();
            state.calls.push(FakeCall::Start(server_id.to_owned()));
            for server in &mut state.servers {
                if server.id == server_id {
                    server.state = ServerState::Running;
                }
            }
            Ok(())
        })
    }

    fn modify_flavor<'a>(&'a self, server_id: &'a str, flavor: &'a str) -> ProviderFuture<'a, ()> {
        Box::pin(async move {
            let mut state = self.lock();
            state.calls.push(FakeCall::Modify {
                server: server_id.to_owned(),
                flavor: flavor.to_owned(),
            });
            if state.fail_modify {
                return Err(ProviderError::api("modification rejected"));
            }
            for server in &mut state.servers {
                if server.id == server_id {
                    server.flavor = flavor.to_owned();
                }
            }
            Ok(())
        })
    }

    fn associate_address<'a>(
        &'a self,
        server_id: &'a str,
        address: &'a str,
    ) -> ProviderFuture<'a, ()> {
        Box::pin(async move {
            let mut state = self.lock();
            state.calls.push(FakeCall::Associate {
                server: server_id.to_owned(),
                address: address.to_owned(),
            });
            if state.fail_associate {
                return Err(ProviderError::api("association rejected"));
            }
            for server in &mut state.servers {
                if server.id == server_id {
                    server.public_ip = Some(address.to_owned());
                }
            }
            Ok(())
        })
    }

    fn poll_server<'a>(&'a self, server_id: &'a str) -> ProviderFuture<'a, Option<Server>> {
        Box::pin(async move {
            let mut state = self.lock();
            state.calls.push(FakeCall::Poll(server_id.to_owned()));
            if let Some(scripted) = state.poll_queue.pop_front() {
                return Ok(scripted);
            }
            Ok(state
                .servers
                .iter()
                .find(|server| server.id == server_id)
                .cloned())
        })
    }

    fn list_region_names(&self) -> ProviderFuture<'_, Vec<String>> {
        Box::pin(async move { Ok(self.lock().region_names.clone()) })
    }
}

/// Builds a running server fixture with a `Name` tag.
#[must_use]
pub fn server(id: &str, name: &str, state: ServerState, flavor: &str, zone: &str) -> Server {
    Server {
        id: id.to_owned(),
        tags: Tags::from_pairs([(Tags::NAME_KEY, name)]),
        state,
        flavor: flavor.to_owned(),
        availability_zone: zone.to_owned(),
        public_ip: None,
        dns_name: None,
    }
}

/// Builds a snapshot fixture created at noon UTC on the given date.
#[must_use]
pub fn snapshot(id: &str, description: &str, year: i32, month: u32, day: u32) -> Snapshot {
    Snapshot {
        id: id.to_owned(),
        description: Some(description.to_owned()),
        created_at: date_time(year, month, day),
        volume_size_gib: 8,
    }
}

/// Builds a noon-UTC timestamp for the given date; falls back to the epoch
/// for out-of-range inputs.
#[must_use]
pub fn date_time(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 12, 0, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// One reporter event captured by [`RecordingReporter`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ReportEvent {
    /// Server count for a region.
    RegionServers {
        /// Region name.
        region: String,
        /// Server count.
        total: usize,
    },
    /// Snapshot count for a region.
    RegionSnapshots {
        /// Region name.
        region: String,
        /// Snapshot count.
        total: usize,
    },
    /// A server line, recorded by identifier.
    Server(String),
    /// One server's snapshot scope size.
    ServerScope {
        /// Server name tag.
        name: String,
        /// Scope size.
        count: usize,
    },
    /// A year header.
    Year(i32),
    /// A month bucket summary, recorded by month and count.
    MonthSummary {
        /// Calendar month.
        month: u32,
        /// Snapshots in the bucket.
        count: usize,
    },
    /// A month bucket delete-set, recorded by month and count.
    MonthDeletions {
        /// Calendar month.
        month: u32,
        /// Delete candidates in the bucket.
        count: usize,
    },
    /// A full-mode scope summary, recorded by count.
    ScopeSummary(usize),
    /// A full-mode delete-set, recorded by count.
    ScopeDeletions(usize),
    /// A deleted snapshot, by identifier.
    SnapshotDeleted(String),
    /// A failed deletion, by snapshot identifier.
    DeletionFailed(String),
    /// A resize phase transition.
    Phase(ResizePhase),
    /// One wait-loop poll tick.
    PollTick,
    /// A failed address re-association, by address.
    AddressFailed(String),
    /// A provider region name.
    RegionName(String),
    /// A missed name lookup, by requested name.
    NotFound(String),
}

/// Captures reporter events for assertions.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    /// Events in emission order.
    pub events: Vec<ReportEvent>,
}

impl RecordingReporter {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the recorded resize phases, in order.
    #[must_use]
    pub fn phases(&self) -> Vec<ResizePhase> {
        self.events
            .iter()
            .filter_map(|event| match event {
                ReportEvent::Phase(phase) => Some(*phase),
                _ => None,
            })
            .collect()
    }

    /// Returns the identifiers reported as deleted, in order.
    #[must_use]
    pub fn deleted_ids(&self) -> Vec<String> {
        self.events
            .iter()
            .filter_map(|event| match event {
                ReportEvent::SnapshotDeleted(id) => Some(id.clone()),
                _ => None,
            })
            .collect()
    }
}

impl Reporter for RecordingReporter {
    fn region_servers(&mut self, region: &str, total: usize) {
        self.events.push(ReportEvent::RegionServers {
            region: region.to_owned(),
            total,
        });
    }

    fn region_snapshots(&mut self, region: &str, total: usize) {
        self.events.push(ReportEvent::RegionSnapshots {
            region: region.to_owned(),
            total,
        });
    }

    fn server(&mut self, server: &Server) {
        self.events.push(ReportEvent::Server(server.id.clone()));
    }

    fn server_scope(&mut self, server_name: &str, count: usize) {
        self.events.push(ReportEvent::ServerScope {
            name: server_name.to_owned(),
            count,
        });
    }

    fn year(&mut self, year: i32) {
        self.events.push(ReportEvent::Year(year));
    }

    fn month_summary(&mut self, month: u32, span: &SnapshotSpan) {
        self.events.push(ReportEvent::MonthSummary {
            month,
            count: span.count,
        });
    }

    fn month_deletions(&mut self, month: u32, span: &SnapshotSpan) {
        self.events.push(ReportEvent::MonthDeletions {
            month,
            count: span.count,
        });
    }

    fn scope_summary(&mut self, span: &SnapshotSpan) {
        self.events.push(ReportEvent::ScopeSummary(span.count));
    }

    fn scope_deletions(&mut self, span: &SnapshotSpan) {
        self.events.push(ReportEvent::ScopeDeletions(span.count));
    }

    fn snapshot_deleted(&mut self, snapshot: &Snapshot) {
        self.events
            .push(ReportEvent::SnapshotDeleted(snapshot.id.clone()));
    }

    fn deletion_failed(&mut self, snapshot: &Snapshot, _error: &ProviderError) {
        self.events
            .push(ReportEvent::DeletionFailed(snapshot.id.clone()));
    }

    fn phase(&mut self, phase: ResizePhase) {
        self.events.push(ReportEvent::Phase(phase));
    }

    fn poll_tick(&mut self) {
        self.events.push(ReportEvent::PollTick);
    }

    fn address_failed(&mut self, address: &str, _error: &ProviderError) {
        self.events
            .push(ReportEvent::AddressFailed(address.to_owned()));
    }

    fn region_name(&mut self, name: &str) {
        self.events.push(ReportEvent::RegionName(name.to_owned()));
    }

    fn not_found(&mut self, name: &str) {
        self.events.push(ReportEvent::NotFound(name.to_owned()));
    }
}
