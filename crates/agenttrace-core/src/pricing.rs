//! Per-model token pricing.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Model pricing for cost estimation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    /// Cost per 1K input tokens in USD.
    pub input_per_1k: f64,
    /// Cost per 1K output tokens in USD.
    pub output_per_1k: f64,
}

impl ModelPricing {
    pub fn new(input_per_1k: f64, output_per_1k: f64) -> Self {
        Self {
            input_per_1k,
            output_per_1k,
        }
    }

    /// Estimate cost for given token counts.
    pub fn estimate(&self, input_tokens: u64, output_tokens: u64) -> f64 {
        (input_tokens as f64 / 1000.0) * self.input_per_1k
            + (output_tokens as f64 / 1000.0) * self.output_per_1k
    }

    fn is_valid(&self) -> bool {
        self.input_per_1k.is_finite()
            && self.output_per_1k.is_finite()
            && self.input_per_1k >= 0.0
            && self.output_per_1k >= 0.0
    }
}

/// Errors from loading a pricing table.
#[derive(Debug, thiserror::Error)]
pub enum PricingError {
    #[error("Failed to read pricing file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse pricing file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid pricing for model {0}: costs must be finite and non-negative")]
    InvalidPrice(String),

    #[error("Pricing table is empty")]
    Empty,
}

/// Immutable mapping from model id to pricing.
///
/// Built once at startup and shared read-only; a model absent from the table
/// is not billable.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PricingTable {
    models: HashMap<String, ModelPricing>,
}

impl PricingTable {
    /// Builds a table from explicit entries, rejecting negative or non-finite prices.
    pub fn from_entries<I, S>(entries: I) -> Result<Self, PricingError>
    where
        I: IntoIterator<Item = (S, ModelPricing)>,
        S: Into<String>,
    {
        let mut models = HashMap::new();
        for (model, pricing) in entries {
            let model = model.into();
            if !pricing.is_valid() {
                return Err(PricingError::InvalidPrice(model));
            }
            models.insert(model, pricing);
        }
        Ok(Self { models })
    }

    /// Loads a JSON object of `{"model": {"input_per_1k": .., "output_per_1k": ..}}`.
    pub fn from_json_str(json: &str) -> Result<Self, PricingError> {
        let entries: HashMap<String, ModelPricing> = serde_json::from_str(json)?;
        if entries.is_empty() {
            return Err(PricingError::Empty);
        }
        Self::from_entries(entries)
    }

    pub fn load(path: &Path) -> Result<Self, PricingError> {
        let content = fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    pub fn get(&self, model: &str) -> Option<&ModelPricing> {
        self.models.get(model)
    }

    pub fn contains(&self, model: &str) -> bool {
        self.models.contains_key(model)
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Model ids in the table, sorted.
    pub fn models(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.models.keys().map(|s| s.as_str()).collect();
        ids.sort_unstable();
        ids
    }

    /// The built-in pricing table (USD per 1K tokens).
    pub fn builtin() -> Self {
        let models = BUILTIN_PRICING
            .iter()
            .map(|&(model, input, output)| (model.to_string(), ModelPricing::new(input, output)))
            .collect();
        Self { models }
    }
}

const BUILTIN_PRICING: &[(&str, f64, f64)] = &[
    // OpenAI
    ("gpt-4o", 0.005, 0.015),
    ("gpt-4o-mini", 0.00015, 0.0006),
    ("gpt-4-turbo", 0.01, 0.03),
    ("gpt-4", 0.03, 0.06),
    ("gpt-4-32k", 0.06, 0.12),
    ("gpt-3.5-turbo-0125", 0.0005, 0.0015),
    ("gpt-3.5-turbo-1106", 0.001, 0.002),
    ("gpt-3.5-turbo-0613", 0.0015, 0.002),
    ("gpt-3.5-turbo-instruct", 0.0015, 0.002),
    // Google Gemini
    ("gemini-1.5-pro", 0.00125, 0.005),
    ("gemini-1.5-pro-extended", 0.0025, 0.01),
    ("gemini-1.5-flash", 0.000075, 0.0003),
    ("gemini-1.5-flash-extended", 0.00015, 0.0006),
    ("gemini-1.0-pro", 0.0005, 0.0015),
    // Anthropic Claude
    ("claude-3.7-sonnet", 0.003, 0.015),
    ("claude-3.5-sonnet", 0.003, 0.015),
    ("claude-3-opus", 0.015, 0.075),
    ("claude-3.5-haiku", 0.0008, 0.004),
    ("claude-3-haiku", 0.00025, 0.00125),
    ("claude-instant-1.2", 0.00163, 0.00551),
    // Mistral
    ("mistral-large", 0.002, 0.006),
    ("mistral-medium", 0.00275, 0.0081),
    ("mistral-small", 0.0006, 0.0018),
    ("mistral-nemo", 0.00015, 0.00015),
    ("codestral", 0.0002, 0.0006),
    ("mixtral-8x7b", 0.00024, 0.00024),
    // Cohere
    ("command-a", 0.0025, 0.01),
    ("command-r+", 0.0025, 0.01),
    ("command-r", 0.00015, 0.0006),
    ("command-r-ft", 0.0003, 0.0012),
    ("command-r7b", 0.0000375, 0.00015),
    ("command-legacy", 0.001, 0.002),
    ("command-light-legacy", 0.0003, 0.0006),
    // Meta (Llama via Groq)
    ("llama-3.1-70b", 0.00059, 0.00079),
    ("llama-3-8b", 0.00005, 0.00008),
    ("llama-3.1-8b", 0.00005, 0.00008),
];
