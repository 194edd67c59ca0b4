//! Core domain types and token accounting for agent-trace.
//!
//! This crate provides the types shared across agent-trace:
//!
//! - [`TraceRecord`], [`SubStep`] and [`TokenUsage`] — the persisted trace model
//! - [`TracePayload`] — the caller-facing ingestion shape
//! - [`PricingTable`] and [`ModelPricing`] — per-model token prices
//! - [`TokenAccountant`] — turns prompt/output text into token counts and cost
//!
//! # Example
//!
//! ```rust,no_run
//! use agenttrace_core::TokenAccountant;
//!
//! let accountant = TokenAccountant::with_defaults();
//! let usage = accountant.analyze("Hello", "Hi there", "gpt-4-turbo").unwrap();
//! assert_eq!(usage.total, usage.input_tokens + usage.output_tokens);
//! ```

mod pricing;
mod tokens;
mod trace;

pub use pricing::{ModelPricing, PricingError, PricingTable};
pub use tokens::{AccountingError, TiktokenTokenizer, TokenAccountant, Tokenizer, TokenizerError};
pub use trace::{stamp, RecordId, SubStep, TokenUsage, TracePayload, TraceRecord};
