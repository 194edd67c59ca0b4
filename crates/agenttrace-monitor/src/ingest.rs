//! Write path: validate, stamp, account, persist.

use std::sync::Arc;

use agenttrace_core::{AccountingError, TokenAccountant, TracePayload, TraceRecord};
use chrono::Utc;
use thiserror::Error;
use tracing::{info, warn};

use crate::context::CallContext;
use crate::store::{StoreError, TraceStore};

/// Errors from [`IngestionPipeline::ingest`].
#[derive(Debug, Error)]
pub enum IngestError {
    /// The payload is malformed. Nothing was persisted.
    #[error("Invalid trace payload: {0}")]
    Validation(String),

    /// The model has no pricing entry. The store was not called.
    #[error(transparent)]
    UnsupportedModel(#[from] AccountingError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Orchestrates trace ingestion.
///
/// A record is either stored with fully computed token usage or not stored
/// at all: accounting failures abort before any store call.
#[derive(Clone)]
pub struct IngestionPipeline {
    accountant: TokenAccountant,
    store: Arc<dyn TraceStore>,
}

impl IngestionPipeline {
    pub fn new(accountant: TokenAccountant, store: Arc<dyn TraceStore>) -> Self {
        Self { accountant, store }
    }

    /// Ingests a raw JSON body.
    pub async fn ingest_json(&self, ctx: &CallContext, body: &[u8]) -> Result<TraceRecord, IngestError> {
        let payload: TracePayload =
            serde_json::from_slice(body).map_err(|e| IngestError::Validation(e.to_string()))?;
        self.ingest(ctx, payload).await
    }

    /// Validates, stamps and accounts for `payload`, then persists it.
    pub async fn ingest(&self, ctx: &CallContext, payload: TracePayload) -> Result<TraceRecord, IngestError> {
        payload.validate().map_err(IngestError::Validation)?;

        let now = Utc::now();

        let usage = self
            .accountant
            .analyze(&payload.input_prompt, &payload.output_prompt, &payload.model)
            .inspect_err(|e| {
                warn!(trace_id = %payload.trace_id, model = %payload.model, error = %e, "Token accounting failed");
            })?;

        let record = TraceRecord::from_payload(payload, now, usage);
        self.store.insert(ctx, &record).await?;

        info!(
            trace_id = %record.trace_id,
            record_id = %record.id,
            agent = %record.agent_name,
            model = %record.model,
            total_tokens = record.token_usage.total,
            estimated_cost_usd = record.token_usage.estimated_cost,
            "Trace ingested"
        );

        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::CountingStore;
    use agenttrace_core::{ModelPricing, PricingTable, SubStep, TiktokenTokenizer};

    fn pipeline(store: Arc<CountingStore>) -> IngestionPipeline {
        let pricing = PricingTable::from_entries([("gpt-4-turbo", ModelPricing::new(0.01, 0.03))]).unwrap();
        let accountant = TokenAccountant::new(Arc::new(pricing), Arc::new(TiktokenTokenizer::new()));
        IngestionPipeline::new(accountant, store)
    }

    fn payload(model: &str) -> TracePayload {
        TracePayload {
            trace_id: "xyz789".into(),
            session_id: "s-1".into(),
            agent_name: "TestAgent".into(),
            status: "success".into(),
            input_prompt: "Hello".into(),
            output_prompt: "Hi there".into(),
            latency_ms: 42,
            model: model.into(),
            sub_steps: vec![],
        }
    }

    #[tokio::test]
    async fn test_ingest_computes_usage_and_stamps_time() {
        let store = Arc::new(CountingStore::default());
        let before = Utc::now();
        let record = pipeline(store.clone())
            .ingest(&CallContext::new(), payload("gpt-4-turbo"))
            .await
            .unwrap();
        let after = Utc::now();

        let usage = record.token_usage;
        assert!(usage.input_tokens > 0);
        assert_eq!(usage.total, usage.input_tokens + usage.output_tokens);
        let expected = (usage.input_tokens as f64 / 1000.0) * 0.01
            + (usage.output_tokens as f64 / 1000.0) * 0.03;
        assert!((usage.estimated_cost - expected).abs() < 1e-12);

        assert!(record.timestamp >= agenttrace_core::stamp(before) && record.timestamp <= after);
        assert_eq!(store.inserts(), 1);
        assert_eq!(store.records()[0], record);
    }

    #[tokio::test]
    async fn test_unsupported_model_never_reaches_store() {
        let store = Arc::new(CountingStore::default());
        let err = pipeline(store.clone())
            .ingest(&CallContext::new(), payload("made-up-model"))
            .await
            .unwrap_err();

        assert!(matches!(err, IngestError::UnsupportedModel(_)));
        assert_eq!(store.inserts(), 0);
    }

    #[tokio::test]
    async fn test_missing_model_is_unpriced() {
        let store = Arc::new(CountingStore::default());
        let err = pipeline(store.clone())
            .ingest_json(
                &CallContext::new(),
                br#"{"trace_id": "t", "agent_name": "a", "sub_steps": [{"name": "s"}]}"#,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, IngestError::UnsupportedModel(_)));
        assert_eq!(store.inserts(), 0);
    }

    #[tokio::test]
    async fn test_validation_errors() {
        let store = Arc::new(CountingStore::default());
        let pipeline = pipeline(store.clone());
        let ctx = CallContext::new();

        let err = pipeline.ingest_json(&ctx, b"{invalid_json}").await.unwrap_err();
        assert!(matches!(err, IngestError::Validation(_)));

        let err = pipeline
            .ingest_json(&ctx, br#"{"trace_id": "t", "model": "gpt-4-turbo"}"#)
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Validation(_)));

        let mut bad_step = payload("gpt-4-turbo");
        let start = Utc::now();
        bad_step.sub_steps.push(SubStep {
            name: String::new(),
            input: String::new(),
            output: String::new(),
            status: String::new(),
            start,
            end: start,
        });
        let err = pipeline.ingest(&ctx, bad_step).await.unwrap_err();
        assert!(matches!(err, IngestError::Validation(_)));

        assert_eq!(store.inserts(), 0);
    }

    #[tokio::test]
    async fn test_client_timestamp_is_ignored() {
        let store = Arc::new(CountingStore::default());
        let body = br#"{
            "trace_id": "t-1",
            "agent_name": "agent1",
            "model": "gpt-4-turbo",
            "input_prompt": "",
            "output_prompt": "",
            "timestamp": "1999-01-01T00:00:00Z",
            "token_usage": {"input_tokens": 5, "output_tokens": 5, "total": 10, "estimated_cost_usd": 1.0}
        }"#;
        let record = pipeline(store)
            .ingest_json(&CallContext::new(), body)
            .await
            .unwrap();

        assert!(record.timestamp.timestamp() > 946_684_800);
        assert_eq!(record.token_usage.total, 0);
        assert_eq!(record.token_usage.estimated_cost, 0.0);
    }

    #[tokio::test]
    async fn test_store_error_propagates() {
        let store = Arc::new(CountingStore::failing());
        let err = pipeline(store.clone())
            .ingest(&CallContext::new(), payload("gpt-4-turbo"))
            .await
            .unwrap_err();

        assert!(matches!(err, IngestError::Store(StoreError::Unavailable(_))));
        assert_eq!(store.inserts(), 1);
    }
}
