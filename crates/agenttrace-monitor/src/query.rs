//! Read path: parse external parameters, delegate to the store.

use std::sync::Arc;

use agenttrace_core::{RecordId, TraceRecord};
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::context::CallContext;
use crate::store::{StoreError, TraceFilter, TraceStore};

/// Raw list parameters as received from a transport.
///
/// Everything is a string so parse failures are handled here rather than
/// rejected upstream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListParams {
    pub agent: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub limit: Option<String>,
    pub offset: Option<String>,
}

impl ListParams {
    /// Builds params from decoded query pairs. The first occurrence of a key
    /// wins; unknown keys are ignored.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut params = Self::default();
        for (key, value) in pairs {
            let slot = match key.as_ref() {
                "agent" => &mut params.agent,
                "from" => &mut params.from,
                "to" => &mut params.to,
                "limit" => &mut params.limit,
                "offset" => &mut params.offset,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value.into());
            }
        }
        params
    }

    /// Converts to a [`TraceFilter`].
    ///
    /// Unparsable `from`/`to` bounds are dropped, not rejected. Unparsable
    /// `limit`/`offset` fall back to the filter defaults.
    pub fn to_filter(&self) -> TraceFilter {
        TraceFilter {
            agent_name: self.agent.clone().filter(|a| !a.is_empty()),
            from: parse_bound("from", self.from.as_deref()),
            to: parse_bound("to", self.to.as_deref()),
            limit: self
                .limit
                .as_deref()
                .and_then(|s| s.trim().parse::<u32>().ok())
                .filter(|&n| n > 0)
                .unwrap_or(TraceFilter::DEFAULT_LIMIT),
            offset: self
                .offset
                .as_deref()
                .and_then(|s| s.trim().parse::<u32>().ok())
                .unwrap_or(TraceFilter::DEFAULT_OFFSET),
        }
    }
}

fn parse_bound(name: &'static str, raw: Option<&str>) -> Option<DateTime<Utc>> {
    let raw = raw.filter(|s| !s.is_empty())?;
    match DateTime::parse_from_rfc3339(raw.trim()) {
        Ok(dt) => Some(dt.with_timezone(&Utc)),
        Err(e) => {
            debug!(bound = name, value = %raw, error = %e, "Dropping unparsable time bound");
            None
        }
    }
}

/// Orchestrates trace lookups and listings.
#[derive(Clone)]
pub struct QueryEngine {
    store: Arc<dyn TraceStore>,
}

impl QueryEngine {
    pub fn new(store: Arc<dyn TraceStore>) -> Self {
        Self { store }
    }

    pub async fn list(&self, ctx: &CallContext, params: &ListParams) -> Result<Vec<TraceRecord>, StoreError> {
        let filter = params.to_filter();
        debug!(?filter, "Listing traces");
        self.store.query(ctx, &filter).await
    }

    /// Looks up a trace by its storage id. A malformed id fails with
    /// [`StoreError::InvalidId`] before the store is called.
    pub async fn get_by_id(&self, ctx: &CallContext, id: &str) -> Result<TraceRecord, StoreError> {
        let id: RecordId = id
            .parse()
            .map_err(|_| StoreError::InvalidId(id.to_string()))?;
        self.store.get_by_id(ctx, id).await
    }
}
