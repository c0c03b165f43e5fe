//! Gauge series registry.
//!
//! Wraps a `prometheus::Registry` and tracks every series created from the
//! upstream snapshot, keyed by published name. A series' label schema is
//! fixed the first time it is seen; later requests for the same name reuse
//! it regardless of the schema they ask for.

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use prometheus::{Encoder, GaugeVec, Opts, Registry, TextEncoder};
use tracing::{debug, info, warn};

use crate::error::{ExpositionError, MetricMappingError, MetricsResult};
use crate::filter::FilterSet;
use crate::labels::LabelSchema;

/// Prefix applied to upstream metric names by default.
pub const DEFAULT_PREFIX: &str = "kudu_";

/// Source name used in help text by default.
pub const DEFAULT_SOURCE: &str = "kudu";

/// A published gauge with a fixed label schema.
#[derive(Debug, Clone)]
pub struct GaugeSeries {
    raw_name: String,
    name: String,
    schema: LabelSchema,
    gauge: GaugeVec,
}

impl GaugeSeries {
    /// Upstream name, as seen by filters.
    pub fn raw_name(&self) -> &str {
        &self.raw_name
    }

    /// Published (prefixed) name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &LabelSchema {
        &self.schema
    }

    /// Set the observation at `label_values`.
    pub fn set(&self, label_values: &[&str], value: f64) -> MetricsResult<()> {
        let gauge = self
            .gauge
            .get_metric_with_label_values(label_values)
            .map_err(|source| MetricMappingError::Observation {
                metric: self.name.clone(),
                source,
            })?;
        gauge.set(value);
        Ok(())
    }
}

#[cfg(test)]
impl GaugeSeries {
    /// Current observation at `label_values`, if one was written.
    pub fn get(&self, label_values: &[&str]) -> Option<f64> {
        use prometheus::core::Collector;

        let wanted: HashMap<&str, &str> = self
            .schema
            .names()
            .iter()
            .map(String::as_str)
            .zip(label_values.iter().copied())
            .collect();

        self.gauge
            .collect()
            .iter()
            .flat_map(|family| family.get_metric())
            .find(|metric| {
                let pairs = metric.get_label();
                pairs.len() == wanted.len()
                    && pairs
                        .iter()
                        .all(|pair| wanted.get(pair.get_name()) == Some(&pair.get_value()))
            })
            .map(|metric| metric.get_gauge().get_value())
    }

    /// Number of labeled observations currently held.
    pub fn observation_count(&self) -> usize {
        use prometheus::core::Collector;

        self.gauge
            .collect()
            .iter()
            .map(|family| family.get_metric().len())
            .sum()
    }
}

/// The set of gauge series published to the exposition endpoint.
pub struct MetricRegistry {
    registry: Registry,
    prefix: String,
    source: String,
    series: HashMap<String, GaugeSeries>,
}

impl MetricRegistry {
    /// Create an empty registry with the default `kudu_` naming.
    pub fn new() -> Self {
        Self::with_naming(DEFAULT_PREFIX, DEFAULT_SOURCE)
    }

    pub fn with_naming(prefix: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            registry: Registry::new(),
            prefix: prefix.into(),
            source: source.into(),
            series: HashMap::new(),
        }
    }

    /// The underlying registry, for collectors that live beside the series.
    pub fn prometheus(&self) -> &Registry {
        &self.registry
    }

    pub fn published_name(&self, raw_name: &str) -> String {
        format!("{}{}", self.prefix, raw_name)
    }

    /// Fetch the series for `raw_name`, creating it under `schema` if absent.
    pub fn get_or_create(&mut self, raw_name: &str, schema: LabelSchema) -> MetricsResult<&GaugeSeries> {
        let name = self.published_name(raw_name);
        match self.series.entry(name) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let name = entry.key().clone();
                let help = format!("{} metrics: {}", self.source, name);
                let label_names: Vec<&str> = schema.names().iter().map(String::as_str).collect();

                let gauge = GaugeVec::new(Opts::new(name.clone(), help), &label_names).map_err(
                    |source| MetricMappingError::Registration {
                        metric: name.clone(),
                        source,
                    },
                )?;
                self.registry
                    .register(Box::new(gauge.clone()))
                    .map_err(|source| MetricMappingError::Registration {
                        metric: name.clone(),
                        source,
                    })?;

                debug!(metric = %name, labels = %schema, "gauge series created");
                Ok(entry.insert(GaugeSeries {
                    raw_name: raw_name.to_string(),
                    name,
                    schema,
                    gauge,
                }))
            }
        }
    }

    /// Look up a series by raw name.
    pub fn get(&self, raw_name: &str) -> Option<&GaugeSeries> {
        self.series.get(&self.published_name(raw_name))
    }

    pub fn contains(&self, raw_name: &str) -> bool {
        self.get(raw_name).is_some()
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Drop every labeled observation while keeping the series registered.
    pub fn clear_all_observations(&mut self) {
        for series in self.series.values() {
            series.gauge.reset();
        }
    }

    /// Permanently remove a series and all its observations.
    pub fn retire(&mut self, raw_name: &str) -> bool {
        let name = self.published_name(raw_name);
        let Some(series) = self.series.remove(&name) else {
            return false;
        };
        if let Err(e) = self.registry.unregister(Box::new(series.gauge.clone())) {
            warn!(metric = %series.name, error = %e, "failed to unregister gauge series");
        }
        info!(metric = %series.name, "gauge series retired");
        true
    }

    /// Retire every series the filter no longer keeps.
    pub fn retire_excluded(&mut self, filters: &FilterSet) -> Vec<String> {
        let mut excluded: Vec<String> = self
            .series
            .values()
            .filter(|series| !filters.should_keep(&series.raw_name))
            .map(|series| series.raw_name.clone())
            .collect();
        excluded.sort();

        for raw_name in &excluded {
            self.retire(raw_name);
        }
        excluded
    }

    /// Render everything in the registry in the Prometheus text format.
    pub fn render(&self) -> Result<String, ExpositionError> {
        let families = self.registry.gather();
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

impl Default for MetricRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus::core::Collector;
    use crate::labels::EntityLabels;

    fn schema(names: &[&str]) -> LabelSchema {
        let mut labels = EntityLabels::new();
        for name in names {
            labels.push(*name, "");
        }
        labels.schema()
    }

    #[test]
    fn get_or_create_is_idempotent() {
        let mut registry = MetricRegistry::new();
        registry
            .get_or_create("rows_inserted", schema(&["id", "type"]))
            .unwrap();
        let series = registry
            .get_or_create("rows_inserted", schema(&["id", "type", "table_name"]))
            .unwrap();

        // The first schema sticks.
        assert_eq!(series.schema().names(), ["id", "type"]);
        assert_eq!(series.name(), "kudu_rows_inserted");
        assert_eq!(series.raw_name(), "rows_inserted");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn set_and_render() {
        let mut registry = MetricRegistry::new();
        let series = registry
            .get_or_create("rows_inserted", schema(&["id", "type"]))
            .unwrap();
        series.set(&["t1", "tablet"], 42.5).unwrap();
        assert_eq!(series.get(&["t1", "tablet"]), Some(42.5));
        assert_eq!(series.get(&["t2", "tablet"]), None);

        let text = registry.render().unwrap();
        assert!(text.contains("# HELP kudu_rows_inserted kudu metrics: kudu_rows_inserted"));
        assert!(text.contains("# TYPE kudu_rows_inserted gauge"));
        assert!(text.contains(r#"kudu_rows_inserted{id="t1",type="tablet"} 42.5"#));
    }

    #[test]
    fn render_errors_are_exposition_errors() {
        let err = ExpositionError::from(prometheus::Error::Msg("bad family".into()));
        assert_eq!(err.to_string(), "exposition encoding failed: bad family");

        let rendered: Result<String, ExpositionError> = MetricRegistry::new().render();
        assert!(rendered.is_ok());
    }

    #[test]
    fn arity_mismatch_is_an_error() {
        let mut registry = MetricRegistry::new();
        let series = registry
            .get_or_create("rows_inserted", schema(&["id", "type"]))
            .unwrap();
        let err = series.set(&["t1"], 1.0).unwrap_err();
        assert!(matches!(err, MetricMappingError::Observation { .. }));
    }

    #[test]
    fn invalid_label_name_fails_registration() {
        let mut registry = MetricRegistry::new();
        let err = registry
            .get_or_create("rows_inserted", schema(&["id", "type", "table-name"]))
            .unwrap_err();
        assert!(matches!(err, MetricMappingError::Registration { .. }));
        assert!(registry.is_empty());
    }

    #[test]
    fn clear_keeps_series_registered() {
        let mut registry = MetricRegistry::new();
        let series = registry
            .get_or_create("rows_inserted", schema(&["id", "type"]))
            .unwrap();
        series.set(&["t1", "tablet"], 1.0).unwrap();
        series.set(&["t2", "tablet"], 2.0).unwrap();
        assert_eq!(series.observation_count(), 2);

        registry.clear_all_observations();

        let series = registry.get("rows_inserted").unwrap();
        assert_eq!(series.observation_count(), 0);
        assert!(registry.contains("rows_inserted"));
    }

    #[test]
    fn retire_removes_from_exposition() {
        let mut registry = MetricRegistry::new();
        registry
            .get_or_create("rows_inserted", schema(&["id", "type"]))
            .unwrap()
            .set(&["t1", "tablet"], 1.0)
            .unwrap();

        assert!(registry.retire("rows_inserted"));
        assert!(!registry.retire("rows_inserted"));
        assert!(!registry.render().unwrap().contains("kudu_rows_inserted"));

        // The name can be registered again after retirement.
        let series = registry
            .get_or_create("rows_inserted", schema(&["id", "type", "table_name"]))
            .unwrap();
        assert_eq!(series.schema().len(), 3);
    }

    #[test]
    fn retire_excluded_follows_filters() {
        let mut registry = MetricRegistry::new();
        for name in ["foo", "bar", "baz"] {
            registry.get_or_create(name, schema(&["id", "type"])).unwrap();
        }

        let filters = FilterSet::from_names(Vec::<String>::new(), ["foo", "baz"]);
        assert_eq!(registry.retire_excluded(&filters), vec!["baz", "foo"]);
        assert!(registry.contains("bar"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn custom_naming() {
        let mut registry = MetricRegistry::with_naming("impala_kudu_", "impala");
        let series = registry.get_or_create("scans", schema(&["id", "type"])).unwrap();
        assert_eq!(series.name(), "impala_kudu_scans");
        let desc = series.gauge.desc();
        assert_eq!(desc[0].help, "impala metrics: impala_kudu_scans");
    }
}
