//! Unit tests for the retention decision engine and the sweep executor.

use chrono::NaiveDate;
use rstest::rstest;

use super::*;
use crate::directory::ResourceDirectory;
use crate::provider::ServerState;
use crate::test_support::{FakeCall, FakeCompute, RecordingReporter, ReportEvent, server, snapshot};

fn day(year: i32, month: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, d).expect("valid date")
}

fn ids(snapshots: &[Snapshot]) -> Vec<&str> {
    snapshots.iter().map(|snapshot| snapshot.id.as_str()).collect()
}

#[rstest]
fn full_mode_keeps_only_the_newest_timestamp() {
    let snapshots = vec![
        snapshot("snap-1", "web backup", 2023, 1, 5),
        snapshot("snap-2", "web backup", 2023, 2, 5),
        snapshot("snap-3", "web backup", 2023, 3, 5),
    ];

    let decision = decide(&snapshots, RetentionMode::Full, day(2023, 3, 10));
    assert_eq!(ids(&decision.keep), vec!["snap-3"]);
    assert_eq!(ids(&decision.delete), vec!["snap-1", "snap-2"]);
    assert!(decision.buckets.is_empty());
}

#[rstest]
fn full_mode_keeps_every_snapshot_sharing_the_newest_timestamp() {
    let snapshots = vec![
        snapshot("snap-old", "web backup", 2023, 1, 5),
        snapshot("snap-a", "web backup", 2023, 3, 5),
        snapshot("snap-b", "db backup", 2023, 3, 5),
    ];

    let decision = decide(&snapshots, RetentionMode::Full, day(2023, 3, 10));
    assert_eq!(ids(&decision.keep), vec!["snap-a", "snap-b"]);
    assert_eq!(ids(&decision.delete), vec!["snap-old"]);
}

#[rstest]
#[case(RetentionMode::Normal)]
#[case(RetentionMode::Full)]
fn empty_scope_yields_an_empty_decision(#[case] mode: RetentionMode) {
    let decision = decide(&[], mode, day(2023, 2, 15));
    assert_eq!(decision, RetentionDecision::default());
}

#[rstest]
fn recent_checkpoints_and_grace_months_are_all_kept() {
    // Mid-February: January holds both checkpoints, February is current.
    let snapshots = vec![
        snapshot("snap-1", "web backup", 2023, 1, 1),
        snapshot("snap-2", "web backup", 2023, 1, 15),
        snapshot("snap-3", "web backup", 2023, 2, 10),
        snapshot("snap-4", "web backup", 2023, 2, 28),
    ];

    let decision = decide(&snapshots, RetentionMode::Normal, day(2023, 2, 15));
    assert!(decision.delete.is_empty());
    assert_eq!(decision.keep.len(), 4);
}

#[rstest]
fn stale_mid_month_snapshots_are_deleted_once_the_grace_month_passes() {
    // Mid-March: January is two months back, so only its bucket-last
    // anchor survives.
    let snapshots = vec![
        snapshot("snap-1", "web backup", 2023, 1, 3),
        snapshot("snap-2", "web backup", 2023, 1, 10),
        snapshot("snap-3", "web backup", 2023, 1, 20),
    ];

    let decision = decide(&snapshots, RetentionMode::Normal, day(2023, 3, 10));
    assert_eq!(ids(&decision.keep), vec!["snap-3"]);
    assert_eq!(ids(&decision.delete), vec!["snap-1", "snap-2"]);
}

#[rstest]
fn previous_month_rolls_over_the_year_boundary() {
    let snapshots = vec![
        snapshot("snap-dec", "web backup", 2023, 12, 20),
        snapshot("snap-old", "web backup", 2022, 11, 5),
    ];

    let decision = decide(&snapshots, RetentionMode::Normal, day(2024, 1, 10));
    assert_eq!(ids(&decision.keep), vec!["snap-dec"]);
    assert_eq!(ids(&decision.delete), vec!["snap-old"]);
}

#[rstest]
fn bucket_last_anchors_survive_for_the_current_and_previous_year() {
    let snapshots = vec![
        snapshot("snap-2021", "web backup", 2021, 6, 30),
        snapshot("snap-2022", "web backup", 2022, 6, 30),
    ];

    let decision = decide(&snapshots, RetentionMode::Normal, day(2023, 3, 10));
    assert_eq!(ids(&decision.keep), vec!["snap-2022"]);
    assert_eq!(ids(&decision.delete), vec!["snap-2021"]);
}

#[rstest]
fn checkpoints_from_older_years_are_not_preserved() {
    // A 1st-of-month snapshot from two years back is neither a current-year
    // checkpoint nor a recent-year anchor (bucket last is the 20th).
    let snapshots = vec![
        snapshot("snap-first", "web backup", 2021, 4, 1),
        snapshot("snap-last", "web backup", 2021, 4, 20),
    ];

    let decision = decide(&snapshots, RetentionMode::Normal, day(2023, 3, 10));
    assert!(decision.keep.is_empty());
    assert_eq!(ids(&decision.delete), vec!["snap-first", "snap-last"]);
}

#[rstest]
fn decisions_are_insensitive_to_input_order() {
    let ordered = vec![
        snapshot("snap-1", "web backup", 2023, 1, 3),
        snapshot("snap-2", "web backup", 2023, 1, 10),
        snapshot("snap-3", "web backup", 2023, 1, 20),
    ];
    let shuffled = vec![ordered[2].clone(), ordered[0].clone(), ordered[1].clone()];

    let today = day(2023, 3, 10);
    assert_eq!(
        decide(&ordered, RetentionMode::Normal, today),
        decide(&shuffled, RetentionMode::Normal, today)
    );
}

#[rstest]
fn buckets_are_ordered_and_carry_their_delete_sets() {
    let snapshots = vec![
        snapshot("snap-3", "web backup", 2023, 2, 10),
        snapshot("snap-1", "web backup", 2022, 6, 5),
        snapshot("snap-2", "web backup", 2022, 6, 30),
    ];

    let decision = decide(&snapshots, RetentionMode::Normal, day(2023, 2, 15));
    let keys: Vec<(i32, u32)> = decision
        .buckets
        .iter()
        .map(|bucket| (bucket.year, bucket.month))
        .collect();
    assert_eq!(keys, vec![(2022, 6), (2023, 2)]);
    assert_eq!(ids(&decision.buckets[0].delete), vec!["snap-1"]);
    assert!(decision.buckets[1].delete.is_empty());
}

#[rstest]
fn span_summarises_an_ascending_sequence() {
    let snapshots = vec![
        snapshot("snap-1", "web backup", 2023, 1, 3),
        snapshot("snap-2", "web backup", 2023, 1, 20),
    ];

    let span = SnapshotSpan::of(&snapshots).expect("non-empty span");
    assert_eq!(span.count, 2);
    assert_eq!(span.first, day(2023, 1, 3));
    assert_eq!(span.last, day(2023, 1, 20));
    assert_eq!(span.total_size_gib, 16);
    assert!(SnapshotSpan::of(&[]).is_none());
}

fn sweep_fixture() -> (FakeCompute, ResourceDirectory<FakeCompute>) {
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
            snapshot("snap-2", "web backup", 2023, 1, 10),
            snapshot("snap-3", "web backup", 2023, 1, 20),
        ]);
    let directory = ResourceDirectory::new(vec![fake.clone()]);
    (fake, directory)
}

fn options(remove: bool, limit: Option<&str>) -> SweepOptions {
    SweepOptions {
        mode: RetentionMode::Normal,
        remove,
        limit: limit.map(str::to_owned),
        today: day(2023, 3, 10),
    }
}

#[tokio::test]
async fn dry_run_reports_candidates_without_deleting() {
    let (fake, directory) = sweep_fixture();
    let mut reporter = RecordingReporter::new();

    let summary = SnapshotSweeper::new(&directory, &mut reporter, options(false, None))
        .run()
        .await
        .expect("sweep should succeed");

    assert_eq!(summary.planned, 2);
    assert_eq!(summary.deleted, 0);
    assert!(!fake
        .calls()
        .iter()
        .any(|call| matches!(call, FakeCall::DeleteSnapshot(_))));
    assert!(reporter.events.contains(&ReportEvent::MonthDeletions {
        month: 1,
        count: 2
    }));
}

#[tokio::test]
async fn remove_deletes_the_candidates() {
    let (fake, directory) = sweep_fixture();
    let mut reporter = RecordingReporter::new();

    let summary = SnapshotSweeper::new(&directory, &mut reporter, options(true, None))
        .run()
        .await
        .expect("sweep should succeed");

    assert_eq!(summary.planned, 2);
    assert_eq!(summary.deleted, 2);
    assert_eq!(summary.failed, 0);
    assert_eq!(fake.snapshot_ids(), vec!["snap-3"]);
    assert_eq!(reporter.deleted_ids(), vec!["snap-1", "snap-2"]);
}

#[tokio::test]
async fn limit_executes_only_the_named_servers_deletions() {
    let fake = FakeCompute::new("eu-west-1")
        .with_servers(vec![
            server("i-web", "web", ServerState::Running, "m1.large", "eu-west-1a"),
            server("i-db", "db", ServerState::Running, "m1.large", "eu-west-1a"),
        ])
        .with_snapshots(vec![
            snapshot("snap-web-1", "web backup", 2023, 1, 3),
            snapshot("snap-web-2", "web backup", 2023, 1, 20),
            snapshot("snap-db-1", "db backup", 2023, 1, 4),
            snapshot("snap-db-2", "db backup", 2023, 1, 21),
        ]);
    let directory = ResourceDirectory::new(vec![fake.clone()]);
    let mut reporter = RecordingReporter::new();

    let summary = SnapshotSweeper::new(&directory, &mut reporter, options(true, Some("db")))
        .run()
        .await
        .expect("sweep should succeed");

    assert_eq!(summary.planned, 2);
    assert_eq!(summary.deleted, 1);
    assert_eq!(reporter.deleted_ids(), vec!["snap-db-1"]);
    assert_eq!(
        fake.snapshot_ids(),
        vec!["snap-web-1", "snap-web-2", "snap-db-2"]
    );
}

#[tokio::test]
async fn limit_naming_no_server_deletes_nothing() {
    let (fake, directory) = sweep_fixture();
    let mut reporter = RecordingReporter::new();

    let summary = SnapshotSweeper::new(&directory, &mut reporter, options(true, Some("ghost")))
        .run()
        .await
        .expect("sweep should succeed");

    assert_eq!(summary.planned, 2);
    assert_eq!(summary.deleted, 0);
    assert_eq!(fake.snapshot_ids(), vec!["snap-1", "snap-2", "snap-3"]);
}

#[tokio::test]
async fn deletion_failures_are_counted_and_do_not_abort() {
    let (fake, directory) = sweep_fixture();
    fake.fail_delete("snap-1");
    let mut reporter = RecordingReporter::new();

    let summary = SnapshotSweeper::new(&directory, &mut reporter, options(true, None))
        .run()
        .await
        .expect("sweep should succeed");

    assert_eq!(summary.deleted, 1);
    assert_eq!(summary.failed, 1);
    assert!(reporter
        .events
        .contains(&ReportEvent::DeletionFailed("snap-1".to_owned())));
    assert_eq!(reporter.deleted_ids(), vec!["snap-2"]);
}

#[tokio::test]
async fn servers_without_a_name_tag_are_skipped() {
    let mut anonymous = server("i-anon", "x", ServerState::Running, "m1.large", "eu-west-1a");
    anonymous.tags = crate::provider::Tags::default();
    let fake = FakeCompute::new("eu-west-1")
        .with_servers(vec![anonymous])
        .with_snapshots(vec![snapshot("snap-1", "backup", 2023, 1, 3)]);
    let directory = ResourceDirectory::new(vec![fake]);
    let mut reporter = RecordingReporter::new();

    let summary = SnapshotSweeper::new(&directory, &mut reporter, options(true, None))
        .run()
        .await
        .expect("sweep should succeed");

    assert_eq!(summary.planned, 0);
    assert!(!reporter
        .events
        .iter()
        .any(|event| matches!(event, ReportEvent::ServerScope { .. })));
}

#[tokio::test]
async fn regions_are_swept_in_lexicographic_order() {
    let us = FakeCompute::new("us-east-1");
    let eu = FakeCompute::new("eu-west-1");
    let directory = ResourceDirectory::new(vec![us, eu]);
    let mut reporter = RecordingReporter::new();

    SnapshotSweeper::new(&directory, &mut reporter, options(false, None))
        .run()
        .await
        .expect("sweep should succeed");

    let regions: Vec<&str> = reporter
        .events
        .iter()
        .filter_map(|event| match event {
            ReportEvent::RegionSnapshots { region, .. } => Some(region.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(regions, vec!["eu-west-1", "us-east-1"]);
}

#[tokio::test]
async fn normal_sweep_emits_one_year_header_per_year() {
    let fake = FakeCompute::new("eu-west-1")
        .with_servers(vec![server(
            "i-web",
            "web",
            ServerState::Running,
            "m1.large",
            "eu-west-1a",
        )])
        .with_snapshots(vec![
            snapshot("snap-1", "web backup", 2022, 5, 10),
            snapshot("snap-2", "web backup", 2022, 8, 10),
            snapshot("snap-3", "web backup", 2023, 2, 10),
        ]);
    let directory = ResourceDirectory::new(vec![fake]);
    let mut reporter = RecordingReporter::new();

    SnapshotSweeper::new(&directory, &mut reporter, options(false, None))
        .run()
        .await
        .expect("sweep should succeed");

    let years: Vec<i32> = reporter
        .events
        .iter()
        .filter_map(|event| match event {
            ReportEvent::Year(year) => Some(*year),
            _ => None,
        })
        .collect();
    assert_eq!(years, vec![2022, 2023]);
}
