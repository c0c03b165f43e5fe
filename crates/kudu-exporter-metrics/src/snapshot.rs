//! Upstream snapshot model.
//!
//! Kudu's `/metrics` endpoint returns a JSON array of entities, each with
//! an `id`, a `type`, free-form `attributes` and a list of metric records.
//! Records come in two shapes: scalar (`{"name": .., "value": ..}`) and
//! distribution (`{"name": .., "min": .., "mean": .., "percentile_99": ..}`).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::{MetricMappingError, SnapshotDecodeError};

/// Attribute key whose value is a partition descriptor.
pub const PARTITION_ATTRIBUTE: &str = "partition";

/// Record name carrying non-numeric status; never published.
pub const STATE_METRIC: &str = "state";

/// One polled snapshot. Lives for a single poll cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub entities: Vec<EntityRecord>,
    /// Entities dropped because they did not match the expected shape.
    pub rejected: usize,
}

/// A monitored object (tablet, table, server) and its metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    /// Attributes in document order.
    #[serde(default)]
    pub attributes: Map<String, Value>,
    /// Metric records; entries that are not records are kept raw.
    #[serde(default)]
    pub metrics: Vec<MetricEntry>,
}

impl EntityRecord {
    /// Attribute value rendered as a label value.
    ///
    /// Strings are used verbatim, anything else as its JSON text.
    pub fn attribute(&self, key: &str) -> Option<String> {
        self.attributes.get(key).map(label_text)
    }
}

/// One element of an entity's `metrics` list.
///
/// An element without a string `name` does not fail the whole entity; it
/// is kept as raw JSON so the mapper can report it and move on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricEntry {
    Record(MetricRecord),
    Malformed(Value),
}

impl MetricEntry {
    pub fn record(&self) -> Result<&MetricRecord, MetricMappingError> {
        match self {
            MetricEntry::Record(record) => Ok(record),
            MetricEntry::Malformed(raw) => Err(MetricMappingError::MalformedRecord {
                record: raw.to_string(),
            }),
        }
    }
}

/// A single named measurement reported by an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub name: String,
    /// Every field other than `name`, in document order.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// The shape of a metric record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricShape<'a> {
    /// A record with a `value` field.
    Scalar(&'a Value),
    /// A record without `value` but with other sub-fields.
    Distribution(&'a Map<String, Value>),
    /// A record with no fields besides `name`.
    Empty,
}

impl MetricRecord {
    pub fn shape(&self) -> MetricShape<'_> {
        if let Some(value) = self.fields.get("value") {
            MetricShape::Scalar(value)
        } else if self.fields.is_empty() {
            MetricShape::Empty
        } else {
            MetricShape::Distribution(&self.fields)
        }
    }

    /// The raw record as compact JSON, for diagnostics.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("{{\"name\":{:?}}}", self.name))
    }
}

/// Decode an upstream body into a snapshot.
///
/// The body must be a JSON array. Individual elements that do not look
/// like an entity are logged and dropped so one odd entry cannot blank
/// out the whole cycle.
pub fn decode_snapshot(body: &[u8]) -> Result<Snapshot, SnapshotDecodeError> {
    let value: Value = serde_json::from_slice(body)?;
    let items = match value {
        Value::Array(items) => items,
        other => return Err(SnapshotDecodeError::NotAnArray(json_kind(&other))),
    };

    let mut snapshot = Snapshot {
        entities: Vec::with_capacity(items.len()),
        rejected: 0,
    };

    for item in items {
        let raw = item.to_string();
        match serde_json::from_value::<EntityRecord>(item) {
            Ok(entity) => snapshot.entities.push(entity),
            Err(e) => {
                warn!(error = %e, record = %raw, "dropping malformed entity");
                snapshot.rejected += 1;
            }
        }
    }

    Ok(snapshot)
}

fn label_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
