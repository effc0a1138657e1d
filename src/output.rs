//! Terminal output: progress lines, pipeline statistics, and summaries.
//!
//! Everything here writes to stderr so stdout stays clean for the exported
//! JSON in the default (non-sync) mode.

use std::io::{IsTerminal, Write};
use std::time::{Duration, Instant};

use crate::harmonic::HarmonicBookmark;
use crate::syncer::SyncReport;

/// True when stderr is attached to a terminal (progress lines make sense).
pub fn stderr_is_tty() -> bool {
    std::io::stderr().is_terminal()
}

/// In-place `current/total` progress display on one stderr line.
pub struct ProgressLine {
    label: &'static str,
}

impl ProgressLine {
    pub fn new(label: &'static str) -> Self {
        Self { label }
    }

    /// Redraws the progress line in place.
    pub fn update(&self, current: usize, total: usize) {
        let mut stderr = std::io::stderr().lock();
        let _ = write!(stderr, "\r{}: {}/{}", self.label, current, total);
        let _ = stderr.flush();
    }

    /// Erases the progress line (carriage return + erase-to-end-of-line).
    pub fn clear(&self) {
        let mut stderr = std::io::stderr().lock();
        let _ = write!(stderr, "\r\x1b[K");
        let _ = stderr.flush();
    }
}

/// Bookmark counts at each pipeline stage plus timing.
pub struct Stats {
    pub found: usize,
    pub after_filter: usize,
    pub after_limit: usize,
    pub skipped: usize,
    pub converted: usize,
    pub deduped: usize,
    pub cache_hits: usize,
    pub prefetched: usize,

    total_start: Instant,
    pub fetch_duration: Duration,
    pub sync_duration: Duration,
}

impl Default for Stats {
    fn default() -> Self {
        Self {
            found: 0,
            after_filter: 0,
            after_limit: 0,
            skipped: 0,
            converted: 0,
            deduped: 0,
            cache_hits: 0,
            prefetched: 0,
            total_start: Instant::now(),
            fetch_duration: Duration::ZERO,
            sync_duration: Duration::ZERO,
        }
    }
}

impl Stats {
    fn total_duration(&self) -> Duration {
        self.total_start.elapsed()
    }

    fn avg_fetch_time(&self) -> Duration {
        if self.after_limit == 0 {
            return Duration::ZERO;
        }
        self.fetch_duration / self.after_limit as u32
    }

    /// Prints the counts shared by every summary: found, filtered, limited.
    fn print_pipeline(&self) {
        eprintln!("Bookmarks found : {}", self.found);

        let date_filtered = self.found.saturating_sub(self.after_filter);
        if date_filtered > 0 {
            eprintln!("  Date filtered : -{date_filtered}");
        }

        let limited = self.after_filter.saturating_sub(self.after_limit);
        if limited > 0 {
            eprintln!("  Limited       : -{limited}");
        }
    }

    /// Conversion-mode summary.
    pub fn print_summary(&self) {
        eprintln!("\n=== Summary ===");
        self.print_pipeline();

        if self.skipped > 0 {
            eprintln!(
                "  Fetch skipped : -{}   (deleted/dead/not found)",
                self.skipped
            );
        }
        if self.deduped > 0 {
            eprintln!(
                "  Deduplicated  : -{}   (merged duplicate URLs)",
                self.deduped
            );
        }
        eprintln!("Converted       : {}", self.converted);

        if self.cache_hits > 0 || self.after_limit > self.cache_hits {
            let from_api = self.after_limit.saturating_sub(self.cache_hits);
            eprintln!("  From cache    : {}", self.cache_hits);
            eprintln!("  From API      : {from_api}");
        }

        eprintln!("\nTiming:");
        eprintln!(
            "  Total time    : {:.2}s",
            self.total_duration().as_secs_f64()
        );
        eprintln!("  Fetch time    : {:.2}s", self.fetch_duration.as_secs_f64());
        if self.after_limit > 0 {
            eprintln!(
                "  Avg per fetch : {}ms",
                self.avg_fetch_time().as_millis()
            );
        }
    }

    /// Sync-mode summary: the conversion summary plus the decision tally.
    pub fn print_sync_summary(&self, report: &SyncReport) {
        self.print_summary();

        eprintln!("\nSync results:");
        if self.prefetched > 0 {
            eprintln!("  Pre-fetched   : {}   (existing bookmarks)", self.prefetched);
        }
        eprintln!("  Created       : {}", report.created);
        eprintln!("  Updated       : {}", report.updated);
        eprintln!("  Skipped       : {}", report.skipped);
        eprintln!("  Failed        : {}", report.failed());

        if !report.failures.is_empty() {
            eprintln!("\nFailures:");
            for failure in &report.failures {
                eprintln!("  {} : {}", failure.url, failure.error);
            }
        }
        eprintln!(
            "  Sync time     : {:.2}s",
            self.sync_duration.as_secs_f64()
        );
    }

    /// Dry-run report: input statistics only, no API calls made.
    pub fn print_dry_run(&self, bookmarks: &[HarmonicBookmark]) {
        eprintln!("=== Dry Run ===");
        self.print_pipeline();
        eprintln!("To process      : {}", self.after_limit);

        if let (Some(oldest), Some(newest)) = (
            bookmarks.iter().map(|b| b.timestamp).min(),
            bookmarks.iter().map(|b| b.timestamp).max(),
        ) {
            eprintln!("\nDate range:");
            eprintln!("  Oldest        : {}", format_date(oldest));
            eprintln!("  Newest        : {}", format_date(newest));
        }

        eprintln!("\nNo API calls made.");
    }
}

fn format_date(ts: i64) -> String {
    chrono::DateTime::<chrono::Utc>::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| ts.to_string())
}
