//! Shared exporter state.
//!
//! The filter set and the gauge registry live behind one read-write lock.
//! Acquisition discipline:
//!
//! - the poll loop holds the write half for a whole mapping pass
//!   (clear + every write), never across the upstream fetch;
//! - the reload loop holds the write half while it swaps the filters and
//!   retires newly excluded series;
//! - the exposition path holds the read half while it gathers.
//!
//! Because both mutating loops take the same write lock, a reload never
//! interleaves with a mapping pass, and a scrape sees either the state
//! before a cycle or the state after it, never a half-written one. No other
//! lock is ever taken while this one is held.

use std::sync::Arc;

use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use kudu_exporter_metrics::{ExpositionError, FilterSet, MetricRegistry};

/// Everything the poll and reload loops mutate.
pub struct ExporterState {
    pub filters: FilterSet,
    pub registry: MetricRegistry,
}

impl ExporterState {
    pub fn new(filters: FilterSet, registry: MetricRegistry) -> Self {
        Self { filters, registry }
    }
}

/// Cheaply cloneable handle to the shared [`ExporterState`].
#[derive(Clone)]
pub struct SharedState {
    inner: Arc<RwLock<ExporterState>>,
}

impl SharedState {
    pub fn new(state: ExporterState) -> Self {
        Self {
            inner: Arc::new(RwLock::new(state)),
        }
    }

    pub async fn read(&self) -> RwLockReadGuard<'_, ExporterState> {
        self.inner.read().await
    }

    pub async fn write(&self) -> RwLockWriteGuard<'_, ExporterState> {
        self.inner.write().await
    }

    /// Render the registry under the read lock.
    pub async fn render(&self) -> Result<String, ExpositionError> {
        self.read().await.registry.render()
    }

    /// Number of upstream series currently registered.
    pub async fn series_count(&self) -> usize {
        self.read().await.registry.len()
    }
}
