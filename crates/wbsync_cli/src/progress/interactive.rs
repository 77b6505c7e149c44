use std::sync::Mutex;
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use wbsync::sync::SyncProgress;

const TICK: Duration = Duration::from_millis(100);

/// Running counts of what the bars have seen.
#[allow(dead_code)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Totals {
    pub dispatched: usize,
    pub excluded: usize,
    pub failed: usize,
    pub uploaded: usize,
    /// Entries rejected by the marketplace or lost with a failed batch.
    pub rejected: usize,
}

#[derive(Default)]
struct ProgressState {
    /// Catalog loading, then listing discovery.
    discovery_bar: Option<ProgressBar>,
    upload_bar: Option<ProgressBar>,
    totals: Totals,
}

/// Interactive progress reporter using indicatif.
pub struct InteractiveReporter {
    multi: MultiProgress,
    state: Mutex<ProgressState>,
}

impl InteractiveReporter {
    pub fn new() -> Self {
        Self::with_multi(MultiProgress::new())
    }

    /// A reporter that draws nothing.
    #[cfg(test)]
    pub fn hidden() -> Self {
        Self::with_multi(MultiProgress::with_draw_target(indicatif::ProgressDrawTarget::hidden()))
    }

    fn with_multi(multi: MultiProgress) -> Self {
        Self {
            multi,
            state: Mutex::new(ProgressState::default()),
        }
    }

    #[cfg(test)]
    pub fn totals(&self) -> Totals {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).totals
    }

    fn discovery_bar(&self, state: &mut ProgressState) -> ProgressBar {
        state
            .discovery_bar
            .get_or_insert_with(|| {
                let bar = self.multi.add(ProgressBar::new_spinner());
                bar.set_style(Self::counter_style());
                bar.set_prefix(format!("{:12}", "Discovery"));
                bar.enable_steady_tick(TICK);
                bar
            })
            .clone()
    }

    fn upload_bar(&self, state: &mut ProgressState) -> ProgressBar {
        state
            .upload_bar
            .get_or_insert_with(|| {
                let bar = self.multi.add(ProgressBar::new_spinner());
                bar.set_style(Self::counter_style());
                bar.set_prefix(format!("{:12}", "Upload"));
                bar.enable_steady_tick(TICK);
                bar
            })
            .clone()
    }

    fn println(&self, line: String) {
        let _ = self.multi.println(line);
    }

    pub fn handle(&self, event: SyncProgress) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        match event {
            SyncProgress::OperationStarted {
                operation,
                limit,
                dry_run,
            } => {
                let bar = self.discovery_bar(&mut state);
                let mode = if dry_run { ", dry run" } else { "" };
                bar.set_message(format!("{operation}: loading catalog (limit {limit}{mode})"));
            }

            SyncProgress::AttributesLoaded { attribute, count } => {
                let bar = self.discovery_bar(&mut state);
                bar.set_message(format!("Loaded {count} {attribute}"));
            }

            SyncProgress::DiscoveryStarted { limit, workers } => {
                let bar = self.discovery_bar(&mut state);
                match limit {
                    Some(limit) => {
                        bar.set_length(limit as u64);
                        bar.set_style(Self::spinner_style());
                    }
                    None => bar.set_style(Self::counter_style()),
                }
                bar.set_message(format!("Paging listing with {workers} workers..."));
            }

            SyncProgress::FetchedPage { total_so_far, .. } => {
                state.totals.dispatched = state.totals.dispatched.max(total_so_far);
                let bar = self.discovery_bar(&mut state);
                bar.set_position(total_so_far as u64);
                bar.set_message(format!("{total_so_far} cards"));
            }

            SyncProgress::PageFetchRetry {
                retry_after_ms,
                attempt,
                ..
            } => {
                let bar = self.discovery_bar(&mut state);
                bar.set_style(Self::retry_style());
                bar.set_message(format!("Retrying page in {retry_after_ms} ms (attempt {attempt})"));
            }

            SyncProgress::DiscoveryComplete { dispatched } => {
                state.totals.dispatched = dispatched;
                if let Some(ref bar) = state.discovery_bar
                    && !bar.is_finished()
                {
                    bar.finish_with_message(format!("✓ {dispatched} cards"));
                }
            }

            SyncProgress::Excluded { .. } => {
                state.totals.excluded += 1;
            }

            SyncProgress::ItemFailed {
                internal_id, error, ..
            } => {
                state.totals.failed += 1;
                self.println(format!("  ✗ item {internal_id}: {error}"));
            }

            SyncProgress::FlushingBatch {
                count, final_batch, ..
            } => {
                let bar = self.upload_bar(&mut state);
                let which = if final_batch { "final batch" } else { "batch" };
                bar.set_message(format!("Sending {which} of {count}"));
            }

            SyncProgress::BannedArticlesStripped { banned, remaining } => {
                state.totals.rejected += banned.len();
                self.println(format!(
                    "  ⚠ {} banned articles stripped, retrying {remaining}",
                    banned.len()
                ));
            }

            SyncProgress::Uploaded { count } => {
                state.totals.uploaded += count;
                let bar = self.upload_bar(&mut state);
                bar.inc(count as u64);
                bar.set_message("uploaded");
            }

            SyncProgress::UploadError { count, error } => {
                state.totals.rejected += count;
                self.println(format!("  ✗ upload of {count} failed: {error}"));
            }

            SyncProgress::Warning { message } => {
                self.println(format!("  ⚠ {message}"));
            }

            SyncProgress::OperationComplete {
                updated, errored, ..
            } => {
                if let Some(ref bar) = state.upload_bar
                    && !bar.is_finished()
                {
                    bar.finish_with_message(format!("✓ {updated} updated, {errored} errored"));
                }
            }

            _ => {}
        }
    }

    pub fn finish(&self) {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        for bar in [&state.discovery_bar, &state.upload_bar].into_iter().flatten() {
            if !bar.is_finished() {
                bar.finish();
            }
        }
    }

    fn spinner_style() -> ProgressStyle {
        ProgressStyle::default_spinner()
            .template("{prefix:.bold.cyan} {spinner:.green} {pos:>6}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
    }

    fn retry_style() -> ProgressStyle {
        ProgressStyle::default_spinner()
            .template("{prefix:.bold.cyan} {spinner:.yellow} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
    }

    fn counter_style() -> ProgressStyle {
        ProgressStyle::default_spinner()
            .template("{prefix:.bold.cyan} {spinner:.green} {pos:>6} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
    }
}

impl Default for InteractiveReporter {
    fn default() -> Self {
        Self::new()
    }
}
