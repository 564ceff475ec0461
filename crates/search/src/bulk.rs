use serde::Deserialize;
use std::collections::HashMap;

/// Error payload of a single bulk item, as the search cluster reports it.
#[derive(Debug, Clone, Deserialize)]
pub struct BulkItemError {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BulkItemResult {
    #[serde(default)]
    pub _id: Option<String>,
    pub status: u16,
    #[serde(default)]
    pub error: Option<BulkItemError>,
}

const REJECTED_EXECUTION: &str = "es_rejected_execution_exception";
const INDEX_CLOSED: &str = "index_closed_exception";

impl BulkItemResult {
    fn is_reject_retry(&self) -> bool {
        self.status == 429
            || self
                .error
                .as_ref()
                .is_some_and(|e| e.kind == REJECTED_EXECUTION)
    }

    fn is_index_closed(&self) -> bool {
        self.error.as_ref().is_some_and(|e| e.kind == INDEX_CLOSED)
    }

    fn is_error(&self) -> bool {
        self.error.is_some() || self.status >= 300
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawBulkResponse {
    #[serde(default)]
    pub errors: bool,
    #[serde(default)]
    pub items: Vec<HashMap<String, BulkItemResult>>,
}

/// Per-item classification of a single bulk request's response, per the
/// search cluster's bulk error shape (`status == 429` or
/// `type == "es_rejected_execution_exception"` => reject-retry;
/// `type == "index_closed_exception"` => index-closed).
#[derive(Debug, Clone, Default)]
pub struct BulkResult {
    pub reject_retry: Vec<BulkItemResult>,
    pub index_closed: Vec<BulkItemResult>,
    pub other: Vec<BulkItemResult>,
}

impl BulkResult {
    pub(crate) fn classify(raw: RawBulkResponse) -> Self {
        let mut result = BulkResult::default();

        for item in raw.items.into_iter().flat_map(|m| m.into_values()) {
            if !item.is_error() {
                continue;
            }
            if item.is_reject_retry() {
                result.reject_retry.push(item);
            } else if item.is_index_closed() {
                result.index_closed.push(item);
            } else {
                result.other.push(item);
            }
        }

        result
    }

    pub fn has_reject_retry(&self) -> bool {
        !self.reject_retry.is_empty()
    }

    pub fn has_index_closed(&self) -> bool {
        !self.index_closed.is_empty()
    }

    pub fn is_success(&self) -> bool {
        self.reject_retry.is_empty() && self.index_closed.is_empty() && self.other.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw_from(items: serde_json::Value) -> RawBulkResponse {
        serde_json::from_value(json!({ "errors": true, "items": items })).unwrap()
    }

    #[test]
    fn classifies_429_as_reject_retry() {
        let raw = raw_from(json!([{ "index": { "status": 429 } }]));
        let result = BulkResult::classify(raw);
        assert!(result.has_reject_retry());
        assert!(!result.has_index_closed());
    }

    #[test]
    fn classifies_rejected_execution_type_as_reject_retry() {
        let raw = raw_from(json!([{
            "index": { "status": 429, "error": { "type": "es_rejected_execution_exception" } }
        }]));
        let result = BulkResult::classify(raw);
        assert!(result.has_reject_retry());
    }

    #[test]
    fn classifies_index_closed() {
        let raw = raw_from(json!([{
            "index": { "status": 400, "error": { "type": "index_closed_exception" } }
        }]));
        let result = BulkResult::classify(raw);
        assert!(result.has_index_closed());
        assert!(!result.has_reject_retry());
    }

    #[test]
    fn other_errors_do_not_block_success_classification_of_clean_items() {
        let raw = raw_from(json!([
            { "index": { "status": 201 } },
            { "index": { "status": 400, "error": { "type": "mapper_parsing_exception" } } }
        ]));
        let result = BulkResult::classify(raw);
        assert_eq!(result.other.len(), 1);
        assert!(!result.is_success());
    }

    #[test]
    fn all_success_items_yield_success() {
        let raw = raw_from(json!([{ "index": { "status": 201 } }, { "delete": { "status": 200 } }]));
        let result = BulkResult::classify(raw);
        assert!(result.is_success());
    }
}
