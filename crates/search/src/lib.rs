pub mod bulk;
pub mod client;
pub mod metadata_store;

#[cfg(feature = "testing")]
pub mod testing;

pub use bulk::{BulkItemError, BulkItemResult, BulkResult};
pub use client::{find_or_create_index, HttpSearchClient, SearchClient};
pub use metadata_store::MetadataStore;
