//! Relational source access: the cursor-scanned score tables (rebuild mode)
//! and the work-queue table (live mode, and the `pump` write side).
//!
//! [`RecordSource`] and [`RecordQueue`] are the trait seams: [`SourceDb`]
//! and [`WorkQueue`] are the real Postgres-backed implementations, and the
//! `testing` feature adds an in-memory fake for driving the pipeline in
//! tests without a database.

pub mod queue;
pub mod row;
pub mod source;
pub mod traits;

#[cfg(feature = "testing")]
pub mod testing;

pub use queue::WorkQueue;
pub use source::SourceDb;
pub use traits::{RecordQueue, RecordSource};
