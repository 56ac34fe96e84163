//! ciceron-store - SQLite corpus for the guide collection
//!
//! Stores chunks, chunk embeddings and image records. Keyword search runs on
//! FTS5 with BM25 ranking; vector search scans the stored embeddings of the
//! rows that pass the metadata filter.

mod schema;
mod snapshot;
mod sqlite;

pub use snapshot::{LoadReport, Snapshot, SnapshotChunk};
pub use sqlite::SqliteCorpus;

// Re-export schema for testing/migrations
pub use schema::SCHEMA;
