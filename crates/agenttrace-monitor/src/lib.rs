//! Trace persistence, ingestion and query for agent-trace.
//!
//! - [`TraceStore`] — persistence abstraction, implemented by [`SqliteTraceStore`]
//! - [`IngestionPipeline`] — validate, stamp, account, then insert
//! - [`QueryEngine`] — parse list parameters and look traces up by id
//!
//! Every store call takes a [`CallContext`] carrying cancellation and an
//! optional deadline. Nothing here retries.

mod context;
mod ingest;
mod query;
mod sqlite;
mod store;

#[cfg(test)]
mod testing;

pub use context::CallContext;
pub use ingest::{IngestError, IngestionPipeline};
pub use query::{ListParams, QueryEngine};
pub use sqlite::SqliteTraceStore;
pub use store::{StoreError, TraceFilter, TraceStore};
