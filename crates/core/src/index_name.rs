use std::fmt;

use chrono::{DateTime, Utc};

/// A logical name resolved by the search cluster to at most one physical
/// index at a time. May be unaliased transiently during switchover.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Alias(String);

impl Alias {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Glob this alias resolves against when enumerating physical indices.
    pub fn index_prefix(&self) -> String {
        format!("{}_", self.0)
    }
}

impl fmt::Display for Alias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A physical index name, `"{alias}_{suffix}"` where `suffix` is a UTC
/// timestamp in `yyyyMMddHHmmss`. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IndexName(String);

const SUFFIX_FORMAT: &str = "%Y%m%d%H%M%S";

impl IndexName {
    /// Mint a fresh physical name for `alias` at the given instant.
    pub fn new(alias: &Alias, at: DateTime<Utc>) -> Self {
        Self(format!("{}_{}", alias.as_str(), at.format(SUFFIX_FORMAT)))
    }

    /// Wrap an existing physical name, e.g. one read back from the search
    /// cluster's index enumeration.
    pub fn from_existing(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The alias prefix this index belongs to, i.e. everything before the
    /// last `_{suffix}` segment.
    pub fn alias_prefix(&self) -> Option<&str> {
        self.0.rsplit_once('_').map(|(prefix, _)| prefix)
    }

    /// The `yyyyMMddHHmmss` suffix. Used to order candidates
    /// lexicographically, which sorts chronologically for this fixed-width
    /// format.
    pub fn suffix(&self) -> Option<&str> {
        self.0.rsplit_once('_').map(|(_, suffix)| suffix)
    }

    /// True if this name belongs to `alias`'s namespace.
    pub fn belongs_to(&self, alias: &Alias) -> bool {
        self.alias_prefix() == Some(alias.as_str())
    }
}

impl fmt::Display for IndexName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
