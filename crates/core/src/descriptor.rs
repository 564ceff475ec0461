use std::collections::HashMap;

use crate::error::Error;
use crate::record::ScoreRecord;

/// A decoded database row, handed to a [`RecordDescriptor`] as a driver-
/// agnostic bag of columns so `score-indexer-core` never depends on the
/// relational driver crate.
#[derive(Debug, Clone, Default)]
pub struct RawRow(HashMap<String, serde_json::Value>);

impl RawRow {
    pub fn new(columns: HashMap<String, serde_json::Value>) -> Self {
        Self(columns)
    }

    pub fn get(&self, column: &str) -> Option<&serde_json::Value> {
        self.0.get(column)
    }

    pub fn get_i64(&self, column: &str) -> Option<i64> {
        self.get(column).and_then(|v| v.as_i64())
    }

    pub fn get_str(&self, column: &str) -> Option<&str> {
        self.get(column).and_then(|v| v.as_str())
    }

    pub fn get_bool(&self, column: &str) -> Option<bool> {
        self.get(column).and_then(|v| v.as_bool())
    }
}

/// Per-record-type query shape and decoding, as an explicit descriptor
/// value rather than a trait implemented once per record type.
///
/// Object-safe by design (no associated type) so a table of heterogeneous
/// rulesets can share one registry keyed by [`RecordDescriptor::type_name`],
/// all decoding into the single [`ScoreRecord`] shape.
pub trait RecordDescriptor: Send + Sync {
    /// Identifies this descriptor in the registry, e.g. `"osu"`, `"taiko"`.
    fn type_name(&self) -> &'static str;

    /// Column compared against the scan cursor.
    fn cursor_column(&self) -> &'static str;

    /// Column list (or `*`) for the cursor-scan `SELECT`.
    fn select_clause(&self) -> &'static str;

    /// Expression evaluated once per rebuild to bound the scan, e.g.
    /// `"MAX(id)"`.
    fn max_expression(&self) -> &'static str;

    /// Extra `AND` clause appended to the cursor-scan `WHERE`, if any.
    fn extra_where(&self) -> Option<&'static str> {
        None
    }

    /// The work-queue `mode` value this descriptor's live mode polls for.
    fn queue_mode(&self) -> &'static str;

    /// Source table queried in rebuild mode.
    fn table(&self) -> &'static str;

    fn decode(&self, row: &RawRow) -> Result<ScoreRecord, Error>;
}

/// Table of descriptors keyed by record-type identifier.
#[derive(Default)]
pub struct DescriptorRegistry {
    descriptors: HashMap<&'static str, Box<dyn RecordDescriptor>>,
}

impl DescriptorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, descriptor: Box<dyn RecordDescriptor>) -> &mut Self {
        self.descriptors.insert(descriptor.type_name(), descriptor);
        self
    }

    pub fn get(&self, type_name: &str) -> Option<&dyn RecordDescriptor> {
        self.descriptors.get(type_name).map(|b| b.as_ref())
    }

    pub fn type_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.descriptors.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ToyDescriptor;

    impl RecordDescriptor for ToyDescriptor {
        fn type_name(&self) -> &'static str {
            "toy"
        }

        fn cursor_column(&self) -> &'static str {
            "id"
        }

        fn select_clause(&self) -> &'static str {
            "id, active"
        }

        fn max_expression(&self) -> &'static str {
            "MAX(id)"
        }

        fn queue_mode(&self) -> &'static str {
            "toy"
        }

        fn table(&self) -> &'static str {
            "toy_scores"
        }

        fn decode(&self, row: &RawRow) -> Result<ScoreRecord, Error> {
            Ok(ScoreRecord {
                id: row.get_i64("id").ok_or_else(|| Error::parse("missing id"))?,
                ruleset: "toy".into(),
                active: row.get_bool("active").unwrap_or(true),
                payload: serde_json::Value::Null,
            })
        }
    }

    #[test]
    fn registry_looks_up_by_type_name() {
        let mut registry = DescriptorRegistry::new();
        registry.register(Box::new(ToyDescriptor));

        let found = registry.get("toy").expect("registered");
        assert_eq!(found.table(), "toy_scores");
        assert!(registry.get("missing").is_none());
    }
}
