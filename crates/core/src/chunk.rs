use crate::record::{CursorValue, Record};

/// An ordered, non-empty, bounded-size sequence of records sharing a single
/// record type. The unit of back-pressure and bulk dispatch.
#[derive(Debug, Clone)]
pub enum Chunk<R: Record> {
    Adds(Vec<R>),
    Deletes(Vec<CursorValue>),
    Mixed { adds: Vec<R>, deletes: Vec<CursorValue> },
}

impl<R: Record> Chunk<R> {
    pub fn adds(&self) -> &[R] {
        match self {
            Chunk::Adds(a) => a,
            Chunk::Mixed { adds, .. } => adds,
            Chunk::Deletes(_) => &[],
        }
    }

    pub fn delete_ids(&self) -> &[CursorValue] {
        match self {
            Chunk::Deletes(d) => d,
            Chunk::Mixed { deletes, .. } => deletes,
            Chunk::Adds(_) => &[],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.adds().is_empty() && self.delete_ids().is_empty()
    }

    pub fn len(&self) -> usize {
        self.adds().len() + self.delete_ids().len()
    }

    /// The highest cursor value carried by this chunk, across adds and
    /// deletes. `None` for an empty chunk.
    pub fn last_cursor_value(&self) -> Option<CursorValue> {
        let add_max = self.adds().iter().map(Record::cursor_value).max();
        let delete_max = self.delete_ids().iter().copied().max();

        match (add_max, delete_max) {
            (Some(a), Some(d)) => Some(a.max(d)),
            (Some(a), None) => Some(a),
            (None, Some(d)) => Some(d),
            (None, None) => None,
        }
    }
}
