use score_indexer_core::RawRow;
use std::collections::HashMap;

/// Converts a driver row into the driver-agnostic [`RawRow`] descriptors
/// decode from, trying progressively looser column types since the
/// relational driver doesn't expose a row's runtime type to generic code.
pub fn row_to_raw(row: &postgres::Row) -> RawRow {
    let mut columns = HashMap::new();

    for (idx, col) in row.columns().iter().enumerate() {
        let name = col.name().to_string();
        let value = column_value(row, idx);
        columns.insert(name, value);
    }

    RawRow::new(columns)
}

fn column_value(row: &postgres::Row, idx: usize) -> serde_json::Value {
    if let Ok(v) = row.try_get::<_, Option<i64>>(idx) {
        return v.map(serde_json::Value::from).unwrap_or(serde_json::Value::Null);
    }
    if let Ok(v) = row.try_get::<_, Option<i32>>(idx) {
        return v.map(serde_json::Value::from).unwrap_or(serde_json::Value::Null);
    }
    if let Ok(v) = row.try_get::<_, Option<f64>>(idx) {
        return v.map(serde_json::Value::from).unwrap_or(serde_json::Value::Null);
    }
    if let Ok(v) = row.try_get::<_, Option<bool>>(idx) {
        return v.map(serde_json::Value::from).unwrap_or(serde_json::Value::Null);
    }
    if let Ok(v) = row.try_get::<_, Option<String>>(idx) {
        return v.map(serde_json::Value::from).unwrap_or(serde_json::Value::Null);
    }
    if let Ok(v) = row.try_get::<_, Option<chrono::NaiveDateTime>>(idx) {
        return v
            .map(|dt| serde_json::Value::from(dt.to_string()))
            .unwrap_or(serde_json::Value::Null);
    }

    serde_json::Value::Null
}
