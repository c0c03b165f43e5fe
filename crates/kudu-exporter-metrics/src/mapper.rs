//! Snapshot mapper: turns one polled snapshot into gauge observations.
//!
//! For every entity the mapper derives the entity's labels (`id`, `type`,
//! each attribute in document order, then the four partition labels when a
//! `partition` attribute is present) and writes every metric record into
//! the registry:
//!
//! ```text
//! {"name": "rows_inserted", "value": 42}          -> kudu_rows_inserted{id,type,..} 42
//! {"name": "scan_duration", "mean": 1, "p99": 9}  -> kudu_scan_duration{..,value_type="mean"} 1
//!                                                    kudu_scan_duration{..,value_type="p99"}  9
//! ```
//!
//! A series keeps the schema it was first registered with. Later entities
//! are projected onto that schema: missing labels are written as `""` and
//! labels the schema does not know are dropped.
//!
//! Errors are contained to the smallest unit possible. A bad partition
//! descriptor blanks that entity's partition labels; a bad metric record is
//! logged with its raw JSON and skipped. Nothing aborts the cycle.

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{MetricMappingError, MetricsResult};
use crate::filter::FilterSet;
use crate::labels::{EntityLabels, LabelSchema};
use crate::partition::{self, PARTITION_LABELS, PartitionLabels};
use crate::registry::MetricRegistry;
use crate::snapshot::{EntityRecord, MetricRecord, MetricShape, PARTITION_ATTRIBUTE, STATE_METRIC, Snapshot};

/// Summary of one mapping pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MapReport {
    pub entities: usize,
    /// Observations written.
    pub observations: usize,
    /// Records rejected by the filter.
    pub filtered: usize,
    /// Series retired because their metric is now filtered out.
    pub retired: usize,
    /// Records or sub-fields skipped because of a mapping error.
    pub errors: usize,
    /// Entities whose partition descriptor could not be parsed.
    pub partition_errors: usize,
}

/// Maps snapshots into a [`MetricRegistry`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SnapshotMapper;

impl SnapshotMapper {
    pub fn new() -> Self {
        Self
    }

    /// Run one mapping pass.
    ///
    /// Clears every observation first, so only values present in this
    /// snapshot are served afterwards.
    pub fn map(&self, snapshot: &Snapshot, filters: &FilterSet, registry: &mut MetricRegistry) -> MapReport {
        let mut report = MapReport::default();
        registry.clear_all_observations();

        for entity in &snapshot.entities {
            report.entities += 1;
            let labels = self.entity_labels(entity, &mut report);

            for entry in &entity.metrics {
                let metric = match entry.record() {
                    Ok(metric) => metric,
                    Err(e) => {
                        report.errors += 1;
                        warn!(error = %e, entity = %entity.id, "skipping metric record");
                        continue;
                    }
                };
                if metric.name == STATE_METRIC {
                    continue;
                }

                if !filters.should_keep(&metric.name) {
                    report.filtered += 1;
                    if registry.retire(&metric.name) {
                        report.retired += 1;
                    }
                    continue;
                }

                match self.map_metric(&labels, metric, registry) {
                    Ok(written) => {
                        report.observations += written.observations;
                        report.errors += written.skipped;
                    }
                    Err(e) => {
                        report.errors += 1;
                        warn!(
                            error = %e,
                            entity = %entity.id,
                            record = %metric.to_json(),
                            "skipping metric record"
                        );
                    }
                }
            }
        }

        debug!(
            entities = report.entities,
            observations = report.observations,
            filtered = report.filtered,
            errors = report.errors,
            "snapshot mapped"
        );
        report
    }

    /// Labels for one entity, in schema order.
    pub fn entity_labels(&self, entity: &EntityRecord, report: &mut MapReport) -> EntityLabels {
        let mut labels = EntityLabels::new();
        labels.push("id", entity.id.as_str());
        labels.push("type", entity.kind.as_str());

        for key in entity.attributes.keys() {
            if let Some(value) = entity.attribute(key) {
                labels.push(key.as_str(), value);
            }
        }

        if let Some(descriptor) = entity.attribute(PARTITION_ATTRIBUTE) {
            let parsed = partition::parse(&descriptor).unwrap_or_else(|e| {
                report.partition_errors += 1;
                warn!(error = %e, entity = %entity.id, "unparseable partition, using empty labels");
                PartitionLabels::default()
            });
            for (name, value) in PARTITION_LABELS.iter().zip(parsed.values()) {
                labels.push(*name, value);
            }
        }

        labels
    }

    fn map_metric(
        &self,
        labels: &EntityLabels,
        metric: &MetricRecord,
        registry: &mut MetricRegistry,
    ) -> MetricsResult<Written> {
        match metric.shape() {
            MetricShape::Scalar(value) => {
                let value = numeric(&metric.name, "value", value)?;
                let series = registry.get_or_create(&metric.name, labels.schema())?;
                if series.schema().has_value_type() {
                    return Err(MetricMappingError::ShapeMismatch {
                        metric: metric.name.clone(),
                        record: "scalar",
                        registered: "distribution",
                    });
                }
                log_dropped(labels, series.schema(), &metric.name);
                series.set(&series.schema().project(labels, None), value)?;
                Ok(Written {
                    observations: 1,
                    skipped: 0,
                })
            }
            MetricShape::Distribution(fields) => {
                let series = registry.get_or_create(&metric.name, labels.schema().with_value_type())?;
                if !series.schema().has_value_type() {
                    return Err(MetricMappingError::ShapeMismatch {
                        metric: metric.name.clone(),
                        record: "distribution",
                        registered: "scalar",
                    });
                }
                log_dropped(labels, series.schema(), &metric.name);

                let mut written = Written::default();
                for (field, value) in fields {
                    let result = numeric(&metric.name, field, value).and_then(|value| {
                        series.set(&series.schema().project(labels, Some(field.as_str())), value)
                    });
                    match result {
                        Ok(()) => written.observations += 1,
                        Err(e) => {
                            written.skipped += 1;
                            warn!(error = %e, record = %metric.to_json(), "skipping distribution field");
                        }
                    }
                }
                Ok(written)
            }
            MetricShape::Empty => Err(MetricMappingError::NoValue {
                metric: metric.name.clone(),
            }),
        }
    }
}

#[derive(Debug, Default)]
struct Written {
    observations: usize,
    skipped: usize,
}

fn numeric(metric: &str, field: &str, value: &Value) -> MetricsResult<f64> {
    value.as_f64().ok_or_else(|| MetricMappingError::NonNumericField {
        metric: metric.to_string(),
        field: field.to_string(),
        value: value.to_string(),
    })
}

fn log_dropped(labels: &EntityLabels, schema: &LabelSchema, metric: &str) {
    let dropped: Vec<&str> = labels.missing_from(schema).collect();
    if !dropped.is_empty() {
        debug!(metric, ?dropped, "labels outside the registered schema dropped");
    }
}
