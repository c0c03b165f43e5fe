//! Poll loop: fetch, decode and map the upstream snapshot on an interval.
//!
//! A failed fetch (transport error, non-2xx, timeout or an undecodable
//! body) skips the cycle without touching the registry, so the last good
//! values keep being served. Consecutive failures are counted by the
//! loop's [`FailureBudget`]; once the budget is spent the loop returns an
//! error and the process is expected to exit.

use std::time::{Duration, Instant};

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use kudu_exporter_metrics::{MapReport, SnapshotMapper, decode_snapshot};

use crate::error::{FetchError, PollerError, PollerResult};
use crate::fetch::Fetch;
use crate::state::{ExporterState, SharedState};
use crate::stats::{PollResult, PollStats};

/// Counts consecutive fetch failures against a fixed bound.
#[derive(Debug, Clone)]
pub struct FailureBudget {
    max_failures: u32,
    consecutive: u32,
}

impl FailureBudget {
    /// A budget that is exhausted at the `max_failures`-th consecutive
    /// failure. A bound of zero is treated as one.
    pub fn new(max_failures: u32) -> Self {
        Self {
            max_failures: max_failures.max(1),
            consecutive: 0,
        }
    }

    /// Record a failure. Returns `true` once the budget is exhausted.
    pub fn record_failure(&mut self) -> bool {
        self.consecutive = self.consecutive.saturating_add(1);
        self.consecutive >= self.max_failures
    }

    pub fn reset(&mut self) {
        self.consecutive = 0;
    }

    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }

    pub fn max_failures(&self) -> u32 {
        self.max_failures
    }
}

/// What one poll cycle did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// The snapshot was mapped into the registry.
    Mapped(MapReport),
    /// The fetch failed; the registry was left as it was.
    Skipped { consecutive_failures: u32 },
}

/// Periodically polls the upstream and maps each snapshot.
pub struct PollLoop<F> {
    fetcher: F,
    state: SharedState,
    mapper: SnapshotMapper,
    interval: Duration,
    budget: FailureBudget,
    stats: Option<PollStats>,
}

impl<F: Fetch> PollLoop<F> {
    pub fn new(fetcher: F, state: SharedState, interval: Duration, budget: FailureBudget) -> Self {
        Self {
            fetcher,
            state,
            mapper: SnapshotMapper::new(),
            interval,
            budget,
            stats: None,
        }
    }

    /// Report poll results through the exporter's own metrics.
    pub fn with_stats(mut self, stats: PollStats) -> Self {
        self.stats = Some(stats);
        self
    }

    pub fn budget(&self) -> &FailureBudget {
        &self.budget
    }

    /// Run one cycle.
    ///
    /// Returns an error only when the failure budget is exhausted.
    pub async fn poll_once(&mut self) -> PollerResult<PollOutcome> {
        let started = Instant::now();

        let snapshot = match self.fetcher.fetch().await {
            Ok(body) => decode_snapshot(&body).map_err(FetchError::from),
            Err(e) => Err(e),
        };

        let snapshot = match snapshot {
            Ok(snapshot) => snapshot,
            Err(e) => {
                let result = match e {
                    FetchError::Decode(_) => PollResult::DecodeError,
                    _ => PollResult::FetchError,
                };
                let exhausted = self.budget.record_failure();
                let failures = self.budget.consecutive();
                self.record(result, started, failures);

                if exhausted {
                    error!(
                        error = %e,
                        failures,
                        "upstream fetch failure budget exhausted"
                    );
                    return Err(PollerError::FetchBudgetExhausted { failures, last: e });
                }

                warn!(
                    error = %e,
                    failures,
                    max = self.budget.max_failures(),
                    "upstream fetch failed, keeping previous values"
                );
                return Ok(PollOutcome::Skipped {
                    consecutive_failures: failures,
                });
            }
        };

        if snapshot.rejected > 0 {
            warn!(rejected = snapshot.rejected, "snapshot contained malformed entities");
        }

        let (report, series) = {
            let mut guard = self.state.write().await;
            let ExporterState { filters, registry } = &mut *guard;
            let report = self.mapper.map(&snapshot, filters, registry);
            (report, registry.len())
        };

        self.budget.reset();
        self.record(PollResult::Success, started, 0);
        if let Some(stats) = &self.stats {
            stats.set_series(series);
        }

        debug!(
            entities = report.entities,
            observations = report.observations,
            series,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "poll cycle complete"
        );
        Ok(PollOutcome::Mapped(report))
    }

    /// Poll every `interval` until shutdown or until the failure budget
    /// is exhausted.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> PollerResult<()> {
        info!(
            interval_ms = self.interval.as_millis() as u64,
            max_failures = self.budget.max_failures(),
            "poll loop started"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {
                    self.poll_once().await?;
                }
                _ = shutdown.changed() => {
                    info!("poll loop shutting down");
                    return Ok(());
                }
            }
        }
    }

    fn record(&self, result: PollResult, started: Instant, failures: u32) {
        if let Some(stats) = &self.stats {
            stats.record_poll(result, started.elapsed(), failures);
        }
    }
}
