/// The monotonic scan key of a record (typically its primary key).
pub type CursorValue = i64;

/// A row pulled from the source of truth.
///
/// Concrete record shapes (one per score ruleset) live behind this trait so
/// the pipeline stays parametric over record type rather than generic over
/// it — see [`crate::descriptor::RecordDescriptor`].
pub trait Record: Send + Sync + Clone + std::fmt::Debug + 'static {
    /// The scan key. Non-decreasing for records yielded by a single reader.
    fn cursor_value(&self) -> CursorValue;

    /// Distinguishes records to upsert from records to delete.
    fn should_index(&self) -> bool;
}

/// The single concrete record shape used across rulesets, discriminated by
/// `ruleset` rather than by a family of inherited types.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreRecord {
    pub id: CursorValue,
    pub ruleset: String,
    /// False for soft-deleted or otherwise unindexable rows.
    pub active: bool,
    pub payload: serde_json::Value,
}

impl Record for ScoreRecord {
    fn cursor_value(&self) -> CursorValue {
        self.id
    }

    fn should_index(&self) -> bool {
        self.active
    }
}
