use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::display::{Banner, LockMode};
use crate::history::ReadingHistory;
use crate::reading::{readings_from_entries, BackendEntry, ConvertedBatch};
use crate::{Error, Result};

use super::backend::Backend;
use super::context::{AppContext, LatestResponse};
use super::watchdog::Watchdog;

/// Granularity of the interruptible retry sleep.
const SLEEP_SLICE: Duration = Duration::from_millis(50);

/// Result of one fetch cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// Fresh readings were merged and rendered.
    Updated { readings: usize },
    /// The fetch failed and the last known data was shown as offline.
    Fallback,
    /// The fetch failed and there was nothing to show but the error banner.
    NoData,
    /// The watchdog fired during the fetch; the loop must not continue.
    Abandoned,
}

/// Fetch → merge → classify → render → persist, with a watchdog around every fetch.
pub struct PollingLoop<B: Backend> {
    ctx: Arc<AppContext>,
    backend: B,
    watchdog: Watchdog,
    last_id: Option<String>,
    next_source_id: u64,
    persistence: Option<JoinHandle<()>>,
}

impl<B: Backend> PollingLoop<B> {
    pub fn new(ctx: Arc<AppContext>, backend: B) -> Result<Self> {
        let expire_ctx = ctx.clone();
        let watchdog = Watchdog::spawn(move || expire_ctx.expire_watchdog())?;
        Ok(Self {
            ctx,
            backend,
            watchdog,
            last_id: None,
            next_source_id: 1,
            persistence: None,
        })
    }

    /// Id sent as `waitfornextid` on the next fetch.
    pub fn last_id(&self) -> Option<&str> {
        self.last_id.as_deref()
    }

    pub fn watchdog_timeout(&self) -> Duration {
        self.ctx.settings.backend_timeout + self.ctx.settings.watchdog_slack
    }

    pub fn poll_once(&mut self) -> PollOutcome {
        self.watchdog.arm(self.watchdog_timeout());
        let fetched = self.backend.fetch(self.last_id.as_deref());
        self.watchdog.disarm();
        if self.ctx.is_shutting_down() {
            return PollOutcome::Abandoned;
        }
        match fetched.and_then(|entries| self.accept(entries)) {
            Ok(readings) => PollOutcome::Updated { readings },
            Err(err) => self.fall_back(&err),
        }
    }

    /// Poll until shutdown, sleeping `retry_delay` after every failed fetch.
    pub fn run(&mut self) {
        let ctx = self.ctx.clone();
        ctx.logger.info(format!(
            "polling {} (timeout {}ms)",
            ctx.settings.endpoint,
            ctx.settings.backend_timeout.as_millis()
        ));
        while ctx.is_running() && !ctx.is_shutting_down() {
            match self.poll_once() {
                PollOutcome::Updated { .. } => {}
                PollOutcome::Fallback | PollOutcome::NoData => {
                    self.sleep_while_running(ctx.settings.retry_delay)
                }
                PollOutcome::Abandoned => break,
            }
        }
        self.wait_for_persistence();
    }

    /// Join the most recent persistence thread, if any.
    pub fn wait_for_persistence(&mut self) {
        if let Some(handle) = self.persistence.take() {
            if handle.join().is_err() {
                self.ctx.logger.error("persistence thread panicked");
            }
        }
    }

    fn accept(&mut self, entries: Vec<BackendEntry>) -> Result<usize> {
        let Some(newest) = entries.first() else {
            return Err(Error::Parse("backend returned no entries".into()));
        };
        let next_id = newest.id.as_ref().map(|id| id.to_string());
        let batch =
            readings_from_entries(entries, &self.ctx.settings.timezone, &mut self.next_source_id);
        self.log_skipped(&batch.skipped);
        let ConvertedBatch {
            entries, readings, ..
        } = batch;
        if readings.is_empty() {
            return Err(Error::Parse("backend returned no usable entries".into()));
        }
        let history = self.ctx.merge_readings(&readings);
        let count = readings.len();
        self.ctx.logger.debug(format!(
            "received {count} entries, newest {} mg/dL",
            readings[0].glucose_value
        ));
        self.ctx.set_latest(LatestResponse {
            entries: entries.clone(),
            readings,
            no_network: false,
        });
        if let Err(err) = self.ctx.render_latest(false, LockMode::Blocking) {
            self.ctx.logger.error(format!("render failed: {err}"));
        }
        self.spawn_persistence(history, entries);
        self.last_id = next_id;
        Ok(count)
    }

    fn fall_back(&mut self, err: &Error) -> PollOutcome {
        self.last_id = None;
        self.ctx.logger.warn(format!("fetch failed: {err}"));
        if !self.ctx.mark_no_network() {
            self.restore_snapshot();
        }
        if self.ctx.latest().is_empty() {
            self.ctx.show_banner(Banner::NetworkError);
            return PollOutcome::NoData;
        }
        if let Err(err) = self.ctx.render_latest(false, LockMode::Blocking) {
            self.ctx.logger.error(format!("render failed: {err}"));
        }
        PollOutcome::Fallback
    }

    /// Reload the last persisted response after a failure with nothing in memory.
    fn restore_snapshot(&mut self) {
        let entries = match self.ctx.storage.load_snapshot() {
            Ok(Some(entries)) if !entries.is_empty() => entries,
            Ok(_) => return,
            Err(err) => {
                self.ctx
                    .logger
                    .warn(format!("ignoring unreadable response snapshot: {err}"));
                return;
            }
        };
        let batch =
            readings_from_entries(entries, &self.ctx.settings.timezone, &mut self.next_source_id);
        self.log_skipped(&batch.skipped);
        if batch.readings.is_empty() {
            self.ctx
                .logger
                .warn("ignoring response snapshot: no usable entries");
            return;
        }
        self.ctx.logger.info(format!(
            "showing {} cached entries from {}",
            batch.readings.len(),
            self.ctx.storage.dir().display()
        ));
        self.ctx.set_latest(LatestResponse {
            entries: batch.entries,
            readings: batch.readings,
            no_network: true,
        });
    }

    fn log_skipped(&self, skipped: &[String]) {
        for reason in skipped {
            self.ctx.logger.warn(format!("skipping backend entry: {reason}"));
        }
    }

    fn spawn_persistence(&mut self, history: ReadingHistory, entries: Vec<BackendEntry>) {
        // One writer at a time: both files go through the same temp names.
        self.wait_for_persistence();
        let storage = self.ctx.storage.clone();
        let logger = self.ctx.logger.clone();
        let spawned = thread::Builder::new()
            .name("glucoframe-persist".into())
            .spawn(move || {
                if let Err(err) = storage.save_history(&history) {
                    logger.error(format!("failed to save reading cache: {err}"));
                }
                match storage.save_snapshot(&entries) {
                    Ok(true) => logger.trace("response snapshot written"),
                    Ok(false) => logger.trace("response snapshot unchanged"),
                    Err(err) => logger.error(format!("failed to save response snapshot: {err}")),
                }
            });
        match spawned {
            Ok(handle) => self.persistence = Some(handle),
            Err(err) => self
                .ctx
                .logger
                .error(format!("failed to spawn persistence thread: {err}")),
        }
    }

    fn sleep_while_running(&self, total: Duration) {
        let deadline = Instant::now() + total;
        while self.ctx.is_running() {
            let left = deadline.saturating_duration_since(Instant::now());
            if left.is_zero() {
                break;
            }
            thread::sleep(left.min(SLEEP_SLICE));
        }
    }
}
