//! kudu-exporter-poller — drives the metrics engine against a live Kudu.
//!
//! Owns everything with a clock or a socket in it: the upstream HTTP
//! fetch, the poll loop with its failure budget, the filter hot-reload
//! loop, and the shared state both loops mutate.
//!
//! # Architecture
//!
//! ```text
//! SharedState (RwLock<ExporterState { filters, registry }>)
//!   ├── PollLoop (every --interval)
//!   │   ├── Fetch::fetch() → bytes       (no lock held)
//!   │   ├── decode_snapshot()
//!   │   └── write lock → SnapshotMapper::map()
//!   ├── ReloadLoop (every --reload-interval)
//!   │   ├── FileWatch::changed()         (mtime comparison)
//!   │   └── write lock → FilterSet::reload() + retire_excluded()
//!   └── exposition (read lock → render)
//! ```
//!
//! # Failure budget
//!
//! Every failed fetch, including a body that does not decode, counts
//! against [`FailureBudget`]. A successful poll resets it. When the count
//! reaches the configured maximum, [`PollLoop::run`] returns
//! [`PollerError::FetchBudgetExhausted`] and the process exits.

pub mod error;
pub mod fetch;
pub mod poll;
pub mod reload;
pub mod state;
pub mod stats;

pub use error::{FetchError, PollerError, PollerResult};
pub use fetch::{Fetch, HttpFetcher};
pub use poll::{FailureBudget, PollLoop, PollOutcome};
pub use reload::{FileWatch, ReloadLoop, ReloadOutcome};
pub use state::{ExporterState, SharedState};
pub use stats::{PollResult, PollStats};
