//! In-memory store double that counts calls.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use agenttrace_core::{RecordId, TraceRecord};
use async_trait::async_trait;

use crate::context::CallContext;
use crate::store::{StoreError, TraceFilter, TraceStore};

#[derive(Default)]
pub(crate) struct CountingStore {
    records: Mutex<Vec<TraceRecord>>,
    inserts: AtomicUsize,
    gets: AtomicUsize,
    queries: AtomicUsize,
    last_filter: Mutex<Option<TraceFilter>>,
    fail: bool,
}

impl CountingStore {
    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub(crate) fn with_records(records: Vec<TraceRecord>) -> Self {
        Self {
            records: Mutex::new(records),
            ..Default::default()
        }
    }

    pub(crate) fn inserts(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
    }

    pub(crate) fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub(crate) fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    pub(crate) fn records(&self) -> Vec<TraceRecord> {
        self.records.lock().unwrap().clone()
    }

    pub(crate) fn last_filter(&self) -> Option<TraceFilter> {
        self.last_filter.lock().unwrap().clone()
    }

    fn unavailable(&self) -> Result<(), StoreError> {
        if self.fail {
            return Err(StoreError::Unavailable("db error".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl TraceStore for CountingStore {
    async fn insert(&self, ctx: &CallContext, record: &TraceRecord) -> Result<(), StoreError> {
        self.inserts.fetch_add(1, Ordering::SeqCst);
        ctx.check()?;
        self.unavailable()?;
        let mut records = self.records.lock().unwrap();
        if records.iter().any(|r| r.trace_id == record.trace_id) {
            return Err(StoreError::DuplicateKey(record.trace_id.clone()));
        }
        records.push(record.clone());
        Ok(())
    }

    async fn get_by_id(&self, ctx: &CallContext, id: RecordId) -> Result<TraceRecord, StoreError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        ctx.check()?;
        self.unavailable()?;
        self.records
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn query(&self, ctx: &CallContext, filter: &TraceFilter) -> Result<Vec<TraceRecord>, StoreError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        *self.last_filter.lock().unwrap() = Some(filter.clone());
        ctx.check()?;
        self.unavailable()?;

        let mut matched: Vec<TraceRecord> = self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| a.trace_id.cmp(&b.trace_id)));

        Ok(matched
            .into_iter()
            .skip(filter.offset as usize)
            .take(filter.limit as usize)
            .collect())
    }
}
