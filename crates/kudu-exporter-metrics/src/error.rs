//! Error types for the metrics engine.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for metrics engine operations.
pub type MetricsResult<T> = Result<T, MetricMappingError>;

/// A partition descriptor lacks a clause its shape needs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("partition descriptor {descriptor:?} has no parseable {missing} clause")]
pub struct PartitionParseError {
    pub descriptor: String,
    pub missing: &'static str,
}

/// Errors raised while turning one metric record into gauge observations.
///
/// These are always recovered per record: the mapper logs them and moves
/// on to the next metric.
#[derive(Debug, Error)]
pub enum MetricMappingError {
    #[error("metric {metric}: field {field:?} is not numeric: {value}")]
    NonNumericField {
        metric: String,
        field: String,
        value: String,
    },

    #[error("metric record without a string name: {record}")]
    MalformedRecord { record: String },

    #[error("metric {metric}: record has neither a value nor numeric sub-fields")]
    NoValue { metric: String },

    #[error("metric {metric}: {record} record does not fit a series registered as {registered}")]
    ShapeMismatch {
        metric: String,
        record: &'static str,
        registered: &'static str,
    },

    #[error("metric {metric}: registration failed: {source}")]
    Registration {
        metric: String,
        #[source]
        source: prometheus::Error,
    },

    #[error("metric {metric}: observation rejected: {source}")]
    Observation {
        metric: String,
        #[source]
        source: prometheus::Error,
    },
}

/// The registry could not be encoded in the text exposition format.
#[derive(Debug, Error)]
#[error("exposition encoding failed: {0}")]
pub struct ExpositionError(#[from] prometheus::Error);

/// A filter file could not be read.
#[derive(Debug, Error)]
pub enum FilterFileError {
    #[error("failed to read filter file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// The upstream body could not be decoded into a snapshot.
#[derive(Debug, Error)]
pub enum SnapshotDecodeError {
    #[error("snapshot is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("snapshot must be a JSON array of entities, got {0}")]
    NotAnArray(&'static str),
}
