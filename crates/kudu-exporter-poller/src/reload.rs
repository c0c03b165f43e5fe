//! Reload loop for the include/exclude filter files.
//!
//! Every interval the loop compares the files' modification times with
//! the ones it last applied. Only a change triggers a reload; the new
//! rules are swapped in under the state's write lock and every series the
//! new rules exclude is retired from the registry in the same critical
//! section, so no scrape ever sees a metric the current rules drop.
//!
//! A reload that fails (a file vanished or became unreadable) keeps the
//! previous rules and is retried on the next tick.

use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use tokio::sync::watch;
use tracing::{debug, error, info};

use kudu_exporter_metrics::{FilterFileError, FilterPaths};

use crate::state::{ExporterState, SharedState};
use crate::stats::PollStats;

/// Last-applied modification times of the filter files.
#[derive(Debug, Clone)]
pub struct FileWatch {
    paths: Vec<PathBuf>,
    stamps: Vec<SystemTime>,
}

impl FileWatch {
    /// Start watching `paths`, treating their current state as applied.
    pub fn new(paths: &FilterPaths) -> Result<Self, FilterFileError> {
        let paths: Vec<PathBuf> = paths.iter().map(PathBuf::from).collect();
        let stamps = read_stamps(&paths)?;
        Ok(Self { paths, stamps })
    }

    /// Current stamps if any file changed since the last commit.
    pub fn changed(&self) -> Result<Option<Vec<SystemTime>>, FilterFileError> {
        let current = read_stamps(&self.paths)?;
        Ok((current != self.stamps).then_some(current))
    }

    pub fn commit(&mut self, stamps: Vec<SystemTime>) {
        self.stamps = stamps;
    }
}

fn read_stamps(paths: &[PathBuf]) -> Result<Vec<SystemTime>, FilterFileError> {
    paths
        .iter()
        .map(|path| {
            std::fs::metadata(path)
                .and_then(|meta| meta.modified())
                .map_err(|source| FilterFileError::Read {
                    path: path.clone(),
                    source,
                })
        })
        .collect()
}

/// What one reload check did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReloadOutcome {
    Unchanged,
    /// New rules applied; lists the raw names of retired series.
    Reloaded { retired: Vec<String> },
    Failed,
}

/// Periodically re-reads the filter files.
pub struct ReloadLoop {
    state: SharedState,
    paths: FilterPaths,
    watch: FileWatch,
    interval: Duration,
    stats: Option<PollStats>,
}

impl ReloadLoop {
    /// The filters described by `paths` must already be loaded into `state`.
    pub fn new(state: SharedState, paths: FilterPaths, interval: Duration) -> Result<Self, FilterFileError> {
        let watch = FileWatch::new(&paths)?;
        Ok(Self {
            state,
            paths,
            watch,
            interval,
            stats: None,
        })
    }

    pub fn with_stats(mut self, stats: PollStats) -> Self {
        self.stats = Some(stats);
        self
    }

    /// Check the files once and reload if they changed.
    pub async fn check_once(&mut self) -> ReloadOutcome {
        let stamps = match self.watch.changed() {
            Ok(Some(stamps)) => stamps,
            Ok(None) => {
                debug!("filter files unchanged");
                return ReloadOutcome::Unchanged;
            }
            Err(e) => {
                error!(error = %e, "filter files unreadable, keeping current rules");
                self.record(false);
                return ReloadOutcome::Failed;
            }
        };

        let reloaded = {
            let mut guard = self.state.write().await;
            let ExporterState { filters, registry } = &mut *guard;
            filters.reload(&self.paths).map(|()| {
                let retired = registry.retire_excluded(filters);
                if let Some(stats) = &self.stats {
                    stats.set_series(registry.len());
                }
                retired
            })
        };
        let retired = match reloaded {
            Ok(retired) => retired,
            Err(e) => {
                error!(error = %e, "filter reload failed, keeping current rules");
                self.record(false);
                return ReloadOutcome::Failed;
            }
        };

        self.watch.commit(stamps);
        self.record(true);
        info!(retired = retired.len(), "metric filters reloaded");
        ReloadOutcome::Reloaded { retired }
    }

    /// Check every `interval` until shutdown.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_ms = self.interval.as_millis() as u64,
            files = ?self.paths,
            "filter reload loop started"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {
                    self.check_once().await;
                }
                _ = shutdown.changed() => {
                    info!("filter reload loop shutting down");
                    break;
                }
            }
        }
    }

    fn record(&self, ok: bool) {
        if let Some(stats) = &self.stats {
            stats.record_reload(ok);
        }
    }
}
