//! kudu-exporter-metrics — the metric transformation engine.
//!
//! Turns the schema-loose JSON snapshot served by Kudu's `/metrics`
//! endpoint into a stable set of labeled Prometheus gauges.
//!
//! # Architecture
//!
//! ```text
//! decode_snapshot(bytes) → Snapshot
//!
//! SnapshotMapper::map(snapshot, filters, registry)
//!   ├── clear_all_observations()
//!   ├── per entity: EntityLabels (id, type, attributes, partition::parse)
//!   └── per metric: FilterSet::should_keep → get_or_create → set
//!
//! MetricRegistry
//!   ├── GaugeSeries (fixed LabelSchema, prometheus::GaugeVec)
//!   ├── retire() / retire_excluded()
//!   └── render() → Prometheus text exposition
//! ```

pub mod error;
pub mod filter;
pub mod labels;
pub mod mapper;
pub mod partition;
pub mod registry;
pub mod snapshot;

pub use error::{ExpositionError, FilterFileError, MetricMappingError, MetricsResult, PartitionParseError, SnapshotDecodeError};
pub use filter::{FilterMode, FilterPaths, FilterSet};
pub use labels::{EntityLabels, LabelSchema};
pub use mapper::{MapReport, SnapshotMapper};
pub use partition::PartitionLabels;
pub use registry::{GaugeSeries, MetricRegistry};
pub use snapshot::{EntityRecord, MetricEntry, MetricRecord, MetricShape, Snapshot, decode_snapshot};
