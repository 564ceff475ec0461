//! Domain types and traits shared by every `score-indexer` crate.
//!
//! Glossary:
//!  - `chunk`: the unit of back-pressure and bulk dispatch — a bounded,
//!    non-empty batch of records (or delete ids) moving through the pipeline.
//!  - `descriptor`: the per-record-type query shape and decoder, replacing
//!    generic-over-record-type polymorphism with an explicit value.

pub mod chunk;
pub mod descriptor;
pub mod error;
pub mod index_name;
pub mod metadata;
pub mod record;
pub mod settings;

pub use chunk::Chunk;
pub use descriptor::{DescriptorRegistry, RawRow, RecordDescriptor};
pub use error::Error;
pub use index_name::{Alias, IndexName};
pub use metadata::{IndexState, Metadata};
pub use record::{CursorValue, Record, ScoreRecord};
pub use settings::Settings;
