//! Document-search backend: shells as JSON documents in a search index.

pub mod elasticsearch;
pub mod embedded;
pub mod index;
pub mod store;

pub use elasticsearch::ElasticsearchIndex;
pub use embedded::EmbeddedIndex;
pub use index::{
    DocumentIndex, Refresh, ScriptEffect, ScriptedUpdate, UpdateOutcome, UpdateScript,
    UNBOUNDED_RETRIES,
};
pub use store::{DocumentStore, CLEAR_BATCH_SIZE};
