//! Label schemas and per-entity label values.

use std::fmt;

/// Trailing label that distinguishes the sub-fields of a distribution.
pub const VALUE_TYPE_LABEL: &str = "value_type";

/// Ordered, duplicate-free label names of a gauge series.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelSchema(Vec<String>);

impl LabelSchema {
    pub fn names(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The schema used by distribution records: this one plus `value_type`.
    pub fn with_value_type(mut self) -> Self {
        if !self.has_value_type() {
            self.0.push(VALUE_TYPE_LABEL.to_string());
        }
        self
    }

    pub fn has_value_type(&self) -> bool {
        self.0.last().is_some_and(|name| name == VALUE_TYPE_LABEL)
    }

    /// Lay an entity's labels out in this schema's order.
    ///
    /// Labels the entity lacks become `""`; labels the schema lacks are
    /// dropped. The result always has exactly `self.len()` values, so a
    /// series registered by one entity accepts writes from any other.
    pub fn project<'a>(&self, labels: &'a EntityLabels, value_type: Option<&'a str>) -> Vec<&'a str> {
        self.0
            .iter()
            .map(|name| {
                if name == VALUE_TYPE_LABEL {
                    if let Some(value_type) = value_type {
                        return value_type;
                    }
                }
                labels.get(name).unwrap_or("")
            })
            .collect()
    }
}

impl fmt::Display for LabelSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.0.join(", "))
    }
}

/// Label name/value pairs derived from one entity, in schema order.
///
/// Names are unique; the first value pushed for a name wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityLabels {
    pairs: Vec<(String, String)>,
}

impl EntityLabels {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a label unless one with the same name is already present.
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) -> bool {
        let name = name.into();
        if self.get(&name).is_some() {
            return false;
        }
        self.pairs.push((name, value.into()));
        true
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// The schema these labels would register a new series under.
    pub fn schema(&self) -> LabelSchema {
        LabelSchema(self.pairs.iter().map(|(n, _)| n.clone()).collect())
    }

    /// Names present here but missing from `schema`.
    pub fn missing_from<'a>(&'a self, schema: &'a LabelSchema) -> impl Iterator<Item = &'a str> {
        self.pairs
            .iter()
            .map(|(n, _)| n.as_str())
            .filter(move |n| !schema.names().iter().any(|s| s == n))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(pairs: &[(&str, &str)]) -> EntityLabels {
        let mut labels = EntityLabels::new();
        for (n, v) in pairs {
            labels.push(*n, *v);
        }
        labels
    }

    #[test]
    fn first_value_wins() {
        let mut labels = entity(&[("id", "t1"), ("type", "tablet")]);
        assert!(!labels.push("id", "other"));
        assert_eq!(labels.get("id"), Some("t1"));
        assert_eq!(labels.len(), 2);
    }

    #[test]
    fn schema_keeps_push_order() {
        let labels = entity(&[("id", "t1"), ("type", "tablet"), ("zone", "b"), ("app", "a")]);
        assert_eq!(labels.schema().names(), ["id", "type", "zone", "app"]);
    }

    #[test]
    fn value_type_appended_once() {
        let schema = entity(&[("id", "t1"), ("type", "tablet")])
            .schema()
            .with_value_type()
            .with_value_type();
        assert_eq!(schema.names(), ["id", "type", "value_type"]);
        assert!(schema.has_value_type());
    }

    #[test]
    fn projection_pads_and_drops() {
        let schema = entity(&[("id", ""), ("type", ""), ("table_name", "")]).schema();
        let other = entity(&[("id", "t2"), ("type", "tablet"), ("extra", "x")]);

        assert_eq!(schema.project(&other, None), vec!["t2", "tablet", ""]);
        assert_eq!(other.missing_from(&schema).collect::<Vec<_>>(), vec!["extra"]);
    }

    #[test]
    fn projection_fills_value_type() {
        let labels = entity(&[("id", "t1"), ("type", "tablet")]);
        let schema = labels.schema().with_value_type();
        assert_eq!(schema.project(&labels, Some("p99")), vec!["t1", "tablet", "p99"]);
    }

    #[test]
    fn display_lists_names() {
        let schema = entity(&[("id", "t1"), ("type", "tablet")]).schema();
        assert_eq!(schema.to_string(), "[id, type]");
    }
}
