//! Built-in [`RecordDescriptor`] implementations for the score rulesets.
//!
//! Concrete row shapes belong to the deployment, not the core pipeline,
//! but the binary still needs something to register so `run`/`pump` are
//! usable out of the box. These four mirror the classic ruleset split
//! (osu!/taiko/catch/mania), each decoding into the single [`ScoreRecord`]
//! shape.

use score_indexer_core::{DescriptorRegistry, Error, RawRow, RecordDescriptor, ScoreRecord};
use serde_json::json;

struct RulesetDescriptor {
    ruleset: &'static str,
    table: &'static str,
}

impl RecordDescriptor for RulesetDescriptor {
    fn type_name(&self) -> &'static str {
        self.ruleset
    }

    fn cursor_column(&self) -> &'static str {
        "score_id"
    }

    fn select_clause(&self) -> &'static str {
        "score_id, user_id, total_score, max_combo, rank, active"
    }

    fn max_expression(&self) -> &'static str {
        "MAX(score_id)"
    }

    fn queue_mode(&self) -> &'static str {
        self.ruleset
    }

    fn table(&self) -> &'static str {
        self.table
    }

    fn decode(&self, row: &RawRow) -> Result<ScoreRecord, Error> {
        let id = row
            .get_i64("score_id")
            .ok_or_else(|| Error::parse(format!("{}: missing score_id", self.ruleset)))?;

        let payload = json!({
            "score_id": id,
            "user_id": row.get_i64("user_id"),
            "total_score": row.get_i64("total_score"),
            "max_combo": row.get_i64("max_combo"),
            "rank": row.get_str("rank"),
            "ruleset": self.ruleset,
        });

        Ok(ScoreRecord {
            id,
            ruleset: self.ruleset.to_string(),
            active: row.get_bool("active").unwrap_or(true),
            payload,
        })
    }
}

/// The registry shipped by default: one descriptor per ruleset, keyed by
/// the same name used as the work-queue `mode` and the alias suffix.
pub fn builtin_registry() -> DescriptorRegistry {
    let mut registry = DescriptorRegistry::new();

    registry
        .register(Box::new(RulesetDescriptor {
            ruleset: "osu",
            table: "osu_scores_high",
        }))
        .register(Box::new(RulesetDescriptor {
            ruleset: "taiko",
            table: "osu_scores_taiko_high",
        }))
        .register(Box::new(RulesetDescriptor {
            ruleset: "fruits",
            table: "osu_scores_fruits_high",
        }))
        .register(Box::new(RulesetDescriptor {
            ruleset: "mania",
            table: "osu_scores_mania_high",
        }));

    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_all_four_rulesets() {
        let registry = builtin_registry();
        let mut names: Vec<_> = registry.type_names().collect();
        names.sort_unstable();
        assert_eq!(names, vec!["fruits", "mania", "osu", "taiko"]);
    }

    #[test]
    fn decodes_inactive_row_as_not_should_index() {
        use std::collections::HashMap;

        let registry = builtin_registry();
        let osu = registry.get("osu").unwrap();

        let mut cols = HashMap::new();
        cols.insert("score_id".to_string(), json!(42));
        cols.insert("active".to_string(), json!(false));
        let row = RawRow::new(cols);

        let record = osu.decode(&row).unwrap();
        assert_eq!(record.id, 42);
        assert!(!score_indexer_core::Record::should_index(&record));
    }
}
