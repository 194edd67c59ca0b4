//! Trace persistence abstraction.

use agenttrace_core::{RecordId, TraceRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::context::CallContext;

/// Errors from trace store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A trace with the same `trace_id` is already stored.
    #[error("Duplicate trace_id: {0}")]
    DuplicateKey(String),

    /// The store could not complete the call.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Trace not found: {0}")]
    NotFound(String),

    /// The identifier is not syntactically valid.
    #[error("Invalid trace id: {0}")]
    InvalidId(String),

    #[error("Store call cancelled")]
    Cancelled,

    #[error("Store call deadline exceeded")]
    DeadlineExceeded,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Filter and pagination for listing traces.
///
/// Time bounds are inclusive. Results are ordered newest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceFilter {
    pub agent_name: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: u32,
    pub offset: u32,
}

impl TraceFilter {
    pub const DEFAULT_LIMIT: u32 = 50;
    pub const DEFAULT_OFFSET: u32 = 0;

    pub fn for_agent(agent_name: impl Into<String>) -> Self {
        Self {
            agent_name: Some(agent_name.into()),
            ..Default::default()
        }
    }

    /// Whether `record` satisfies the predicate part of the filter.
    pub fn matches(&self, record: &TraceRecord) -> bool {
        if let Some(ref agent) = self.agent_name {
            if &record.agent_name != agent {
                return false;
            }
        }
        if self.from.is_some_and(|from| record.timestamp < from) {
            return false;
        }
        if self.to.is_some_and(|to| record.timestamp > to) {
            return false;
        }
        true
    }
}

impl Default for TraceFilter {
    fn default() -> Self {
        Self {
            agent_name: None,
            from: None,
            to: None,
            limit: Self::DEFAULT_LIMIT,
            offset: Self::DEFAULT_OFFSET,
        }
    }
}

/// Append-only trace persistence.
///
/// Pagination is skip/take: inserts landing between two page fetches can
/// shift records across pages.
#[async_trait]
pub trait TraceStore: Send + Sync {
    /// Persists a new record. Fails with [`StoreError::DuplicateKey`] when the
    /// `trace_id` already exists.
    ///
    /// `ctx` is honored only until the write starts. A started write runs to
    /// completion and its real outcome is returned.
    async fn insert(&self, ctx: &CallContext, record: &TraceRecord) -> Result<(), StoreError>;

    async fn get_by_id(&self, ctx: &CallContext, id: RecordId) -> Result<TraceRecord, StoreError>;

    /// Records matching `filter`, ordered by timestamp descending then `trace_id`.
    async fn query(&self, ctx: &CallContext, filter: &TraceFilter) -> Result<Vec<TraceRecord>, StoreError>;
}
