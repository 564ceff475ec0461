use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::record::CursorValue;

/// Lifecycle marker for a physical [`crate::index_name::IndexName`].
///
/// `Building -> Ready -> Aliased -> Closed`. Only the owning Indexer performs
/// `Building -> Ready`; an alias commit performs `-> Aliased` on the target
/// and `-> Closed` on previously aliased indices. States only move forward;
/// `Aliased -> Aliased` is a permitted no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexState {
    Building,
    Ready,
    Aliased,
    Closed,
}

impl Default for IndexState {
    fn default() -> Self {
        IndexState::Building
    }
}

impl IndexState {
    /// Whether moving from `self` to `next` respects the forward-only rule.
    pub fn can_transition_to(self, next: IndexState) -> bool {
        next >= self
    }
}

fn default_updated_at() -> DateTime<Utc> {
    Utc::now()
}

/// Per-index progress and lifecycle state, persisted inside the index's
/// mapping metadata.
///
/// Invariants: `last_id` is non-decreasing over the lifetime of an
/// IndexName; `schema` is immutable once set; `state` only moves forward
/// per [`IndexState::can_transition_to`].
///
/// Every field defaults when absent from a partially-populated mapping
/// `_meta`, including `schema` (defaults to an empty string). A missing
/// `schema` therefore never fails to deserialize on its own — an empty
/// `schema` simply never equals a real `schema_tag`, so candidates
/// enumerated by [`crate::index_name`]-keyed lookups (e.g. stray or legacy
/// indices under an alias's `{alias}_*` namespace) are excluded rather than
/// aborting the caller. The fatal "missing schema" condition for a
/// non-rebuild run is surfaced where it actually matters: the Indexer
/// comparing its resolved Metadata's `schema` against the configured
/// `schema_tag` and failing with `VersionMismatch` when they differ.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default)]
    pub last_id: CursorValue,
    #[serde(default)]
    pub reset_queue_to: Option<CursorValue>,
    #[serde(default)]
    pub schema: String,
    #[serde(default)]
    pub state: IndexState,
    #[serde(default = "default_updated_at")]
    pub updated_at: DateTime<Utc>,
}

impl Metadata {
    pub fn new(schema: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            last_id: 0,
            reset_queue_to: None,
            schema: schema.into(),
            state: IndexState::Building,
            updated_at: now,
        }
    }

    /// `last_id := max(last_id, candidate)`, bumping `updated_at`. Never
    /// moves `last_id` backwards, which is what makes it safe for
    /// concurrent dispatcher workers to report out of order.
    pub fn advance_last_id(&mut self, candidate: CursorValue, now: DateTime<Utc>) {
        if candidate > self.last_id {
            self.last_id = candidate;
        }
        self.updated_at = now;
    }

    /// Apply a forward state transition, rejecting any attempt to move the
    /// state backwards.
    pub fn transition(&mut self, next: IndexState, now: DateTime<Utc>) -> Result<(), Error> {
        if !self.state.can_transition_to(next) {
            return Err(Error::message(format!(
                "illegal state transition {:?} -> {:?}",
                self.state, next
            )));
        }
        self.state = next;
        self.updated_at = now;
        Ok(())
    }
}
