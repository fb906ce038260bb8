//! Snapshot retention decision engine and sweep executor.
//!
//! [`decide`] is a pure function over snapshot timestamps, the selected
//! mode, and an injected "today": it never touches the network, so every
//! policy rule is testable against in-memory fixtures. [`SnapshotSweeper`]
//! walks the resource directory region by region, scopes snapshots to
//! servers by description match, reports each decision, and — only when
//! removal was explicitly requested — executes deletions best-effort.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};
use thiserror::Error;

use crate::directory::ResourceDirectory;
use crate::provider::{Compute, ProviderError, Snapshot};
use crate::report::Reporter;

/// Retention policy selected per invocation.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RetentionMode {
    /// Layered calendar retention: dense near-term, checkpointed mid-term,
    /// anchored long-term.
    Normal,
    /// Keep only the snapshots sharing the most recent timestamp.
    Full,
}

/// Keep/delete partition for one (year, month) bucket.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BucketDecision {
    /// Calendar year of the bucket.
    pub year: i32,
    /// Calendar month of the bucket (1-12).
    pub month: u32,
    /// Every snapshot in the bucket, ascending by creation time.
    pub snapshots: Vec<Snapshot>,
    /// Snapshots eligible for deletion, ascending by creation time.
    pub delete: Vec<Snapshot>,
}

/// Result of a retention computation for one server scope.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RetentionDecision {
    /// Snapshots to retain, ascending by creation time.
    pub keep: Vec<Snapshot>,
    /// Snapshots eligible for deletion, ascending by creation time.
    pub delete: Vec<Snapshot>,
    /// Per-bucket breakdown; empty in full mode.
    pub buckets: Vec<BucketDecision>,
}

/// Date range and total volume size of a snapshot sequence, used for
/// reporting.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SnapshotSpan {
    /// Number of snapshots in the sequence.
    pub count: usize,
    /// Creation date of the earliest snapshot.
    pub first: NaiveDate,
    /// Creation date of the latest snapshot.
    pub last: NaiveDate,
    /// Sum of backing volume sizes in GiB.
    pub total_size_gib: i64,
}

impl SnapshotSpan {
    /// Summarises an ascending snapshot sequence; `None` when empty.
    #[must_use]
    pub fn of(snapshots: &[Snapshot]) -> Option<Self> {
        let first = snapshots.first()?;
        let last = snapshots.last()?;
        Some(Self {
            count: snapshots.len(),
            first: first.created_at.date_naive(),
            last: last.created_at.date_naive(),
            total_size_gib: snapshots
                .iter()
                .map(|snapshot| snapshot.volume_size_gib)
                .sum(),
        })
    }
}

/// Partitions `snapshots` into keep and delete sets.
///
/// The input need not be pre-sorted; decisions are computed over an
/// ascending copy so the result is deterministic for a fixed `today`.
#[must_use]
pub fn decide(snapshots: &[Snapshot], mode: RetentionMode, today: NaiveDate) -> RetentionDecision {
    let mut ordered = snapshots.to_vec();
    ordered.sort_by_key(|snapshot| snapshot.created_at);
    match mode {
        RetentionMode::Full => decide_full(ordered),
        RetentionMode::Normal => decide_normal(ordered, today),
    }
}

fn decide_full(ordered: Vec<Snapshot>) -> RetentionDecision {
    let Some(newest) = ordered.last().map(|snapshot| snapshot.created_at) else {
        return RetentionDecision::default();
    };
    let (keep, delete) = ordered
        .into_iter()
        .partition(|snapshot| snapshot.created_at == newest);
    RetentionDecision {
        keep,
        delete,
        buckets: Vec::new(),
    }
}

fn decide_normal(ordered: Vec<Snapshot>, today: NaiveDate) -> RetentionDecision {
    let mut by_month: BTreeMap<(i32, u32), Vec<Snapshot>> = BTreeMap::new();
    for snapshot in ordered {
        let key = (snapshot.created_at.year(), snapshot.created_at.month());
        by_month.entry(key).or_default().push(snapshot);
    }

    let mut decision = RetentionDecision::default();
    for ((year, month), bucket) in by_month {
        let Some(last) = bucket.last().cloned() else {
            continue;
        };
        let delete: Vec<Snapshot> = bucket
            .iter()
            .filter(|snapshot| !is_exempt(snapshot, &last, today))
            .cloned()
            .collect();
        decision.keep.extend(
            bucket
                .iter()
                .filter(|snapshot| is_exempt(snapshot, &last, today))
                .cloned(),
        );
        decision.delete.extend(delete.iter().cloned());
        decision.buckets.push(BucketDecision {
            year,
            month,
            snapshots: bucket,
            delete,
        });
    }
    decision
}

/// Inclusive-OR of the four exemption rules: a snapshot satisfying any of
/// them is kept.
fn is_exempt(snapshot: &Snapshot, bucket_last: &Snapshot, today: NaiveDate) -> bool {
    anchors_recent_year(snapshot, bucket_last, today)
        || in_month(snapshot, today.year(), today.month())
        || in_previous_month(snapshot, today)
        || checkpoint_in_current_year(snapshot, today)
}

/// Year-boundary anchor: the snapshot shares the bucket's last
/// day-of-month and itself falls in the current or previous calendar year.
fn anchors_recent_year(snapshot: &Snapshot, bucket_last: &Snapshot, today: NaiveDate) -> bool {
    snapshot.created_at.day() == bucket_last.created_at.day()
        && (snapshot.created_at.year() == today.year()
            || snapshot.created_at.year() == today.year() - 1)
}

fn in_month(snapshot: &Snapshot, year: i32, month: u32) -> bool {
    snapshot.created_at.year() == year && snapshot.created_at.month() == month
}

/// One-month grace window, rolling over to December of the previous year
/// when `today` is in January.
fn in_previous_month(snapshot: &Snapshot, today: NaiveDate) -> bool {
    let (year, month) = if today.month() == 1 {
        (today.year() - 1, 12)
    } else {
        (today.year(), today.month() - 1)
    };
    in_month(snapshot, year, month)
}

/// Fixed mid-cycle checkpoints: the 1st and 15th are preserved for the
/// running year regardless of age.
fn checkpoint_in_current_year(snapshot: &Snapshot, today: NaiveDate) -> bool {
    matches!(snapshot.created_at.day(), 1 | 15) && snapshot.created_at.year() == today.year()
}

/// Per-invocation sweep parameters.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SweepOptions {
    /// Policy mode to evaluate.
    pub mode: RetentionMode,
    /// Execute deletions. Without it the sweep is a dry run.
    pub remove: bool,
    /// When set, only this server's delete-set may be executed; every other
    /// server's decision is still computed and reported.
    pub limit: Option<String>,
    /// The invocation's current date, injectable for reproducible runs.
    pub today: NaiveDate,
}

/// Counts accumulated over one sweep.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SweepSummary {
    /// Delete candidates identified across all servers.
    pub planned: usize,
    /// Snapshots actually deleted.
    pub deleted: usize,
    /// Deletion calls the provider rejected; processing continued.
    pub failed: usize,
}

/// Errors that abort a sweep.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum SweepError {
    /// A region inventory listing failed.
    #[error("listing {what} in region {region} failed: {source}")]
    List {
        /// Resource kind being listed.
        what: &'static str,
        /// Region whose listing failed.
        region: String,
        /// Underlying provider failure.
        source: ProviderError,
    },
}

/// Walks every held region and every server with a non-empty snapshot
/// scope, in region-then-server order.
pub struct SnapshotSweeper<'a, C, R> {
    directory: &'a ResourceDirectory<C>,
    reporter: &'a mut R,
    options: SweepOptions,
}

impl<'a, C: Compute, R: Reporter> SnapshotSweeper<'a, C, R> {
    /// Creates a sweeper over `directory` reporting through `reporter`.
    pub fn new(
        directory: &'a ResourceDirectory<C>,
        reporter: &'a mut R,
        options: SweepOptions,
    ) -> Self {
        Self {
            directory,
            reporter,
            options,
        }
    }

    /// Runs the sweep.
    ///
    /// Individual deletion failures are recovered: logged, reported, and
    /// counted in the summary without aborting the traversal.
    ///
    /// # Errors
    ///
    /// Returns [`SweepError`] when a region's inventory cannot be listed.
    pub async fn run(&mut self) -> Result<SweepSummary, SweepError> {
        let directory = self.directory;
        let mut summary = SweepSummary::default();

        for handle in directory.handles() {
            let mut snapshots =
                handle
                    .list_snapshots()
                    .await
                    .map_err(|source| SweepError::List {
                        what: "snapshots",
                        region: handle.region().to_owned(),
                        source,
                    })?;
            snapshots.sort_by_key(|snapshot| snapshot.created_at);
            self.reporter
                .region_snapshots(handle.region(), snapshots.len());

            let servers = handle
                .list_servers()
                .await
                .map_err(|source| SweepError::List {
                    what: "servers",
                    region: handle.region().to_owned(),
                    source,
                })?;

            for server in &servers {
                let Some(name) = server.name() else {
                    tracing::debug!(server = %server.id, "skipping server without Name tag");
                    continue;
                };
                let scope: Vec<Snapshot> = snapshots
                    .iter()
                    .filter(|snapshot| snapshot.matches_server(name))
                    .cloned()
                    .collect();
                self.reporter.server_scope(name, scope.len());

                let decision = decide(&scope, self.options.mode, self.options.today);
                summary.planned += decision.delete.len();
                let execute = self.options.remove
                    && self
                        .options
                        .limit
                        .as_deref()
                        .is_none_or(|limit| limit == name);

                match self.options.mode {
                    RetentionMode::Full => {
                        self.sweep_full(handle, &scope, &decision, execute, &mut summary)
                            .await;
                    }
                    RetentionMode::Normal => {
                        self.sweep_normal(handle, &decision, execute, &mut summary)
                            .await;
                    }
                }
            }
        }

        Ok(summary)
    }

    async fn sweep_full(
        &mut self,
        handle: &C,
        scope: &[Snapshot],
        decision: &RetentionDecision,
        execute: bool,
        summary: &mut SweepSummary,
    ) {
        if let Some(span) = SnapshotSpan::of(scope) {
            self.reporter.scope_summary(&span);
        }
        let Some(span) = SnapshotSpan::of(&decision.delete) else {
            return;
        };
        self.reporter.scope_deletions(&span);
        if execute {
            self.delete_all(handle, &decision.delete, summary).await;
        }
    }

    async fn sweep_normal(
        &mut self,
        handle: &C,
        decision: &RetentionDecision,
        execute: bool,
        summary: &mut SweepSummary,
    ) {
        let mut current_year = None;
        for bucket in &decision.buckets {
            if current_year != Some(bucket.year) {
                self.reporter.year(bucket.year);
                current_year = Some(bucket.year);
            }
            if let Some(span) = SnapshotSpan::of(&bucket.snapshots) {
                self.reporter.month_summary(bucket.month, &span);
            }
            let Some(span) = SnapshotSpan::of(&bucket.delete) else {
                continue;
            };
            self.reporter.month_deletions(bucket.month, &span);
            if execute {
                self.delete_all(handle, &bucket.delete, summary).await;
            }
        }
    }

    async fn delete_all(&mut self, handle: &C, snapshots: &[Snapshot], summary: &mut SweepSummary) {
        for snapshot in snapshots {
            match handle.delete_snapshot(&snapshot.id).await {
                Ok(()) => {
                    self.reporter.snapshot_deleted(snapshot);
                    summary.deleted += 1;
                }
                Err(error) => {
                    tracing::warn!(snapshot = %snapshot.id, %error, "snapshot deletion failed");
                    self.reporter.deletion_failed(snapshot, &error);
                    summary.failed += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests;
