use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::record::CursorValue;

/// Process-wide configuration, resolved once at startup into an immutable
/// bundle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub source_connection_string: String,
    pub search_cluster_url: String,
    pub coordination_store_url: String,
    pub schema_tag: String,
    pub alias_prefix: String,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    #[serde(default = "default_max_parallel_dispatch")]
    pub max_parallel_dispatch: usize,

    #[serde(default)]
    pub is_rebuild: bool,

    #[serde(default)]
    pub is_new: bool,

    #[serde(default)]
    pub is_prep_mode: bool,

    #[serde(default)]
    pub resume_from: Option<CursorValue>,

    #[serde(default)]
    pub switch_on_complete: bool,

    #[serde(default = "default_read_delay_ms")]
    pub read_delay_ms: u64,
}

fn default_batch_size() -> usize {
    10_000
}

fn default_queue_capacity() -> usize {
    100
}

fn default_max_parallel_dispatch() -> usize {
    4
}

fn default_read_delay_ms() -> u64 {
    0
}

impl Settings {
    /// A non-empty schema tag, and strictly positive batch size / queue
    /// capacity.
    pub fn validate(&self) -> Result<(), Error> {
        if self.schema_tag.trim().is_empty() {
            return Err(Error::MissingSchema);
        }
        if self.batch_size < 1 {
            return Err(Error::config("batch_size must be >= 1"));
        }
        if self.queue_capacity < 1 {
            return Err(Error::config("queue_capacity must be >= 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Settings {
        Settings {
            source_connection_string: "postgres://localhost/scores".into(),
            search_cluster_url: "http://localhost:9200".into(),
            coordination_store_url: "redis://localhost".into(),
            schema_tag: "v7".into(),
            alias_prefix: "scores".into(),
            batch_size: 10_000,
            queue_capacity: 100,
            max_parallel_dispatch: 4,
            is_rebuild: false,
            is_new: false,
            is_prep_mode: false,
            resume_from: None,
            switch_on_complete: false,
            read_delay_ms: 0,
        }
    }

    #[test]
    fn empty_schema_tag_is_missing_schema() {
        let mut s = base();
        s.schema_tag = "".into();
        assert!(matches!(s.validate(), Err(Error::MissingSchema)));
    }

    #[test]
    fn zero_batch_size_rejected() {
        let mut s = base();
        s.batch_size = 0;
        assert!(s.validate().is_err());
    }

    #[test]
    fn valid_settings_pass() {
        assert!(base().validate().is_ok());
    }
}
