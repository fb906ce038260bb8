//! Structured reporting of fleet events.
//!
//! The engines emit events through the [`Reporter`] trait and never format
//! output themselves. [`ConsoleReporter`] renders the events as colorized
//! lines on any [`Write`] sink; tests substitute a recording double.

use std::io::Write;

use colored::{ColoredString, Colorize};

use crate::provider::{ProviderError, Server, Snapshot};
use crate::resize::ResizePhase;
use crate::retention::SnapshotSpan;

/// Receives structured events from the directory, retention, and resize
/// paths.
pub trait Reporter {
    /// Server count for a region (status listing).
    fn region_servers(&mut self, region: &str, total: usize);
    /// Snapshot count for a region (retention sweep).
    fn region_snapshots(&mut self, region: &str, total: usize);
    /// One server's current attributes.
    fn server(&mut self, server: &Server);
    /// Size of one server's snapshot scope.
    fn server_scope(&mut self, server_name: &str, count: usize);
    /// A new calendar year in a normal-mode sweep.
    fn year(&mut self, year: i32);
    /// Summary of one month bucket.
    fn month_summary(&mut self, month: u32, span: &SnapshotSpan);
    /// Delete candidates within one month bucket.
    fn month_deletions(&mut self, month: u32, span: &SnapshotSpan);
    /// Summary of a full-mode scope.
    fn scope_summary(&mut self, span: &SnapshotSpan);
    /// Delete candidates of a full-mode scope.
    fn scope_deletions(&mut self, span: &SnapshotSpan);
    /// A snapshot was deleted.
    fn snapshot_deleted(&mut self, snapshot: &Snapshot);
    /// A deletion call was rejected; the sweep continues.
    fn deletion_failed(&mut self, snapshot: &Snapshot, error: &ProviderError);
    /// A resize state transition.
    fn phase(&mut self, phase: ResizePhase);
    /// One wait-loop poll elapsed without reaching the target state.
    fn poll_tick(&mut self);
    /// Address re-association failed; the resize still succeeded.
    fn address_failed(&mut self, address: &str, error: &ProviderError);
    /// A provider region name (regions listing).
    fn region_name(&mut self, name: &str);
    /// A requested server name matched nothing.
    fn not_found(&mut self, name: &str);
}

/// Renders events as colorized console lines.
pub struct ConsoleReporter<W> {
    out: W,
    verbose: bool,
}

impl<W: Write> ConsoleReporter<W> {
    /// Creates a reporter writing to `out`; `verbose` adds region counts
    /// and tag dumps.
    pub const fn new(out: W, verbose: bool) -> Self {
        Self { out, verbose }
    }

    fn line(&mut self, text: &ColoredString) {
        writeln!(self.out, "{text}").ok();
    }
}

fn state_text(server: &Server) -> ColoredString {
    match server.state.as_str() {
        "running" => server.state.as_str().green(),
        "stopped" => server.state.as_str().red(),
        other => other.cyan(),
    }
}

impl<W: Write> Reporter for ConsoleReporter<W> {
    fn region_servers(&mut self, region: &str, total: usize) {
        if self.verbose {
            self.line(&format!("{total} servers in region {region}").blue());
        }
    }

    fn region_snapshots(&mut self, region: &str, total: usize) {
        self.line(&format!("{total} snapshots in region {region}").blue());
    }

    fn server(&mut self, server: &Server) {
        let name = server.name().unwrap_or("-");
        write!(
            self.out,
            "{:<10} {:<15}: {:<10} {:<10} {:<15}",
            server.id,
            name,
            state_text(server),
            server.flavor,
            server.availability_zone,
        )
        .ok();
        if let Some(dns) = server.dns_name.as_deref() {
            let address = server.public_ip.as_deref().unwrap_or("-");
            write!(self.out, " DNS/IP: {dns} ({address})").ok();
        }
        if self.verbose {
            write!(self.out, " Tags: {}", server.tags).ok();
        }
        writeln!(self.out).ok();
    }

    fn server_scope(&mut self, server_name: &str, count: usize) {
        self.line(&format!("{count} snapshots for server {server_name}").green());
    }

    fn year(&mut self, year: i32) {
        writeln!(self.out, "   Year {year}:").ok();
    }

    fn month_summary(&mut self, month: u32, span: &SnapshotSpan) {
        writeln!(
            self.out,
            "   Month {month}: {} snapshots from {} to {}, Total size {} GB",
            span.count, span.first, span.last, span.total_size_gib,
        )
        .ok();
    }

    fn month_deletions(&mut self, month: u32, span: &SnapshotSpan) {
        self.line(
            &format!(
                "   Month {month}: {} snapshots to delete from {} to {}",
                span.count, span.first, span.last,
            )
            .red(),
        );
    }

    fn scope_summary(&mut self, span: &SnapshotSpan) {
        writeln!(
            self.out,
            "   {} snapshots from {} to {}, Total size {} GB",
            span.count, span.first, span.last, span.total_size_gib,
        )
        .ok();
    }

    fn scope_deletions(&mut self, span: &SnapshotSpan) {
        self.line(
            &format!(
                "   {} snapshots to delete from {} to {}",
                span.count, span.first, span.last,
            )
            .red(),
        );
    }

    fn snapshot_deleted(&mut self, snapshot: &Snapshot) {
        let description = snapshot.description.as_deref().unwrap_or("");
        self.line(
            &format!(
                "   {} {description} {} deleted",
                snapshot.id,
                snapshot.created_at.date_naive(),
            )
            .red(),
        );
    }

    fn deletion_failed(&mut self, snapshot: &Snapshot, error: &ProviderError) {
        self.line(&format!("   {} delete failed: {error}", snapshot.id).red());
    }

    fn phase(&mut self, phase: ResizePhase) {
        match phase {
            ResizePhase::Done | ResizePhase::Aborted => {
                writeln!(self.out, "{}.", phase.label()).ok();
            }
            other => {
                write!(self.out, "{}.", other.label()).ok();
                self.out.flush().ok();
            }
        }
    }

    fn poll_tick(&mut self) {
        write!(self.out, ".").ok();
        self.out.flush().ok();
    }

    fn address_failed(&mut self, address: &str, error: &ProviderError) {
        self.line(&format!("re-association of {address} failed: {error}").red());
    }

    fn region_name(&mut self, name: &str) {
        writeln!(self.out, "{name}").ok();
    }

    fn not_found(&mut self, name: &str) {
        writeln!(self.out, "server {name} not found").ok();
    }
}
