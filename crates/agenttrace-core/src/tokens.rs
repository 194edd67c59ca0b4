//! Token counting and cost accounting.

use std::sync::{Arc, OnceLock};

use thiserror::Error;
use tiktoken_rs::tokenizer::{get_tokenizer, Tokenizer as Encoding};
use tiktoken_rs::CoreBPE;
use tracing::debug;

use crate::pricing::PricingTable;
use crate::trace::TokenUsage;

/// Errors from a [`Tokenizer`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenizerError {
    /// No encoding is known for the model.
    #[error("no token encoding for model: {0}")]
    UnknownModelEncoding(String),

    /// The encoding exists but could not be loaded.
    #[error("failed to load token encoding: {0}")]
    Load(String),
}

/// Errors from [`TokenAccountant::analyze`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccountingError {
    /// The model has no pricing entry and cannot be billed.
    #[error("pricing info not available for model: {0}")]
    UnsupportedModel(String),
}

/// Counts tokens in a text for a given model.
pub trait Tokenizer: Send + Sync {
    fn count(&self, text: &str, model: &str) -> Result<usize, TokenizerError>;
}

/// [`Tokenizer`] backed by OpenAI's BPE encodings.
///
/// Encodings are loaded on first use and then shared read-only.
#[derive(Default)]
pub struct TiktokenTokenizer {
    o200k: OnceLock<Option<CoreBPE>>,
    cl100k: OnceLock<Option<CoreBPE>>,
    p50k: OnceLock<Option<CoreBPE>>,
    p50k_edit: OnceLock<Option<CoreBPE>>,
    r50k: OnceLock<Option<CoreBPE>>,
}

impl TiktokenTokenizer {
    pub fn new() -> Self {
        Self::default()
    }

    fn encoding(&self, model: &str) -> Result<&CoreBPE, TokenizerError> {
        let encoding = get_tokenizer(model)
            .ok_or_else(|| TokenizerError::UnknownModelEncoding(model.to_string()))?;

        let slot = match encoding {
            Encoding::O200kBase => self.o200k.get_or_init(|| tiktoken_rs::o200k_base().ok()),
            Encoding::Cl100kBase => self.cl100k.get_or_init(|| tiktoken_rs::cl100k_base().ok()),
            Encoding::P50kBase => self.p50k.get_or_init(|| tiktoken_rs::p50k_base().ok()),
            Encoding::P50kEdit => self.p50k_edit.get_or_init(|| tiktoken_rs::p50k_edit().ok()),
            Encoding::R50kBase | Encoding::Gpt2 => {
                self.r50k.get_or_init(|| tiktoken_rs::r50k_base().ok())
            }
            #[allow(unreachable_patterns)]
            _ => return Err(TokenizerError::UnknownModelEncoding(model.to_string())),
        };

        slot.as_ref()
            .ok_or_else(|| TokenizerError::Load(format!("{encoding:?}")))
    }
}

impl Tokenizer for TiktokenTokenizer {
    fn count(&self, text: &str, model: &str) -> Result<usize, TokenizerError> {
        if text.is_empty() {
            return Ok(0);
        }
        let bpe = self.encoding(model)?;
        Ok(bpe.encode_ordinary(text).len())
    }
}

/// Converts prompt/output text plus a model id into token usage and cost.
///
/// Pricing is checked before any tokenization: an unpriced model fails with
/// [`AccountingError::UnsupportedModel`] without touching the tokenizer. A
/// tokenizer failure for a priced model counts that side as zero tokens.
#[derive(Clone)]
pub struct TokenAccountant {
    pricing: Arc<PricingTable>,
    tokenizer: Arc<dyn Tokenizer>,
}

impl TokenAccountant {
    pub fn new(pricing: Arc<PricingTable>, tokenizer: Arc<dyn Tokenizer>) -> Self {
        Self { pricing, tokenizer }
    }

    /// Accountant with the built-in pricing table and the tiktoken tokenizer.
    pub fn with_defaults() -> Self {
        Self::new(Arc::new(PricingTable::builtin()), Arc::new(TiktokenTokenizer::new()))
    }

    pub fn pricing(&self) -> &PricingTable {
        &self.pricing
    }

    pub fn analyze(&self, input: &str, output: &str, model: &str) -> Result<TokenUsage, AccountingError> {
        let pricing = self
            .pricing
            .get(model)
            .ok_or_else(|| AccountingError::UnsupportedModel(model.to_string()))?;

        let input_tokens = self.count_side(input, model, "input");
        let output_tokens = self.count_side(output, model, "output");
        let cost = pricing.estimate(input_tokens, output_tokens);

        Ok(TokenUsage::new(input_tokens, output_tokens, cost))
    }

    fn count_side(&self, text: &str, model: &str, side: &'static str) -> u64 {
        if text.is_empty() {
            return 0;
        }
        match self.tokenizer.count(text, model) {
            Ok(n) => n as u64,
            Err(e) => {
                debug!(model = %model, side, error = %e, "Tokenizer failed, counting zero tokens");
                0
            }
        }
    }
}

impl std::fmt::Debug for TokenAccountant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenAccountant")
            .field("models", &self.pricing.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pricing::ModelPricing;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts whitespace-separated words and records how often it was called.
    #[derive(Default)]
    struct WordTokenizer {
        calls: AtomicUsize,
        fail_for: Option<&'static str>,
    }

    impl Tokenizer for WordTokenizer {
        fn count(&self, text: &str, model: &str) -> Result<usize, TokenizerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_for == Some(model) {
                return Err(TokenizerError::UnknownModelEncoding(model.to_string()));
            }
            Ok(text.split_whitespace().count())
        }
    }

    fn table() -> Arc<PricingTable> {
        Arc::new(
            PricingTable::from_entries([
                ("gpt-4-turbo", ModelPricing::new(0.01, 0.03)),
                ("no-encoding", ModelPricing::new(0.001, 0.002)),
            ])
            .unwrap(),
        )
    }

    #[test]
    fn test_analyze_cost_formula() {
        let accountant = TokenAccountant::new(table(), Arc::new(WordTokenizer::default()));
        let usage = accountant
            .analyze("one two three four", "five six", "gpt-4-turbo")
            .unwrap();

        assert_eq!(usage.input_tokens, 4);
        assert_eq!(usage.output_tokens, 2);
        assert_eq!(usage.total, 6);
        let expected = (4.0 / 1000.0) * 0.01 + (2.0 / 1000.0) * 0.03;
        assert!((usage.estimated_cost - expected).abs() < 1e-12);
    }

    #[test]
    fn test_unpriced_model_skips_tokenizer() {
        let tokenizer = Arc::new(WordTokenizer::default());
        let accountant = TokenAccountant::new(table(), tokenizer.clone());

        // The tokenizer would happily count this model; pricing still gates it.
        let err = accountant.analyze("Hello", "Hi there", "made-up-model").unwrap_err();
        assert_eq!(err, AccountingError::UnsupportedModel("made-up-model".into()));
        assert_eq!(tokenizer.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_tokenizer_failure_counts_zero() {
        let tokenizer = Arc::new(WordTokenizer {
            calls: AtomicUsize::new(0),
            fail_for: Some("no-encoding"),
        });
        let accountant = TokenAccountant::new(table(), tokenizer.clone());

        let usage = accountant.analyze("a b c", "d e", "no-encoding").unwrap();
        assert_eq!(usage, TokenUsage::new(0, 0, 0.0));
        assert_eq!(tokenizer.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_empty_text_is_free() {
        let tokenizer = Arc::new(WordTokenizer::default());
        let accountant = TokenAccountant::new(table(), tokenizer.clone());

        let usage = accountant.analyze("", "", "gpt-4-turbo").unwrap();
        assert_eq!(usage.input_tokens, 0);
        assert_eq!(usage.output_tokens, 0);
        assert_eq!(usage.total, 0);
        assert_eq!(usage.estimated_cost, 0.0);
        assert_eq!(tokenizer.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_total_is_sum_for_every_priced_model() {
        let accountant = TokenAccountant::new(
            Arc::new(PricingTable::builtin()),
            Arc::new(WordTokenizer::default()),
        );
        let texts = ["", "single", "a few words here", "Hello, world! How are you?"];
        for model in accountant.pricing().models() {
            for input in texts {
                for output in texts {
                    let usage = accountant.analyze(input, output, model).unwrap();
                    assert_eq!(usage.total, usage.input_tokens + usage.output_tokens);
                    assert!(usage.estimated_cost >= 0.0);
                }
            }
        }
    }

    #[test]
    fn test_tiktoken_counts() {
        let tokenizer = TiktokenTokenizer::new();
        assert!(tokenizer.count("Hello world", "gpt-4-turbo").unwrap() >= 2);
        assert_eq!(tokenizer.count("", "gpt-4-turbo").unwrap(), 0);
        assert!(matches!(
            tokenizer.count("Hello", "claude-3-opus"),
            Err(TokenizerError::UnknownModelEncoding(_))
        ));
    }

    #[test]
    fn test_tiktoken_accounting_scenario() {
        let accountant = TokenAccountant::with_defaults();
        let usage = accountant.analyze("Hello", "Hi there", "gpt-4-turbo").unwrap();

        assert!(usage.input_tokens > 0);
        assert!(usage.output_tokens > 0);
        let expected = (usage.input_tokens as f64 / 1000.0) * 0.01
            + (usage.output_tokens as f64 / 1000.0) * 0.03;
        assert!((usage.estimated_cost - expected).abs() < 1e-12);

        // Priced but unknown to tiktoken: zero tokens, still succeeds.
        let claude = accountant.analyze("Hello", "Hi there", "claude-3-opus").unwrap();
        assert_eq!(claude.total, 0);
    }
}
