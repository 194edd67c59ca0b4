//! Trace record types for agent executions.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Storage-assigned identifier of a persisted trace.
///
/// Distinct from the caller's `trace_id` business key. Only well-formed
/// UUIDs can be turned into a `RecordId`, so a lookup by a malformed id is
/// rejected before it reaches any store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(Uuid);

impl RecordId {
    /// Generates a fresh random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for RecordId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Token counts and estimated cost for one trace.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Tokens in the input prompt.
    pub input_tokens: u64,
    /// Tokens in the output.
    pub output_tokens: u64,
    /// Always `input_tokens + output_tokens`.
    pub total: u64,
    /// Estimated cost in USD, never negative.
    #[serde(rename = "estimated_cost_usd")]
    pub estimated_cost: f64,
}

impl TokenUsage {
    pub fn new(input_tokens: u64, output_tokens: u64, estimated_cost: f64) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total: input_tokens + output_tokens,
            estimated_cost: estimated_cost.max(0.0),
        }
    }
}

/// One internal stage of an agent execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubStep {
    pub name: String,
    #[serde(default)]
    pub input: String,
    #[serde(default)]
    pub output: String,
    #[serde(default)]
    pub status: String,
    /// Wall-clock time the stage started. Defaults to the Unix epoch.
    #[serde(default)]
    pub start: DateTime<Utc>,
    /// Wall-clock time the stage ended. Defaults to the Unix epoch.
    #[serde(default)]
    pub end: DateTime<Utc>,
}

/// A persisted agent execution trace.
///
/// Created only by the ingestion pipeline and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceRecord {
    /// Storage identifier used for direct lookup.
    pub id: RecordId,
    /// Caller-supplied business key.
    pub trace_id: String,
    pub session_id: String,
    pub agent_name: String,
    /// Model identifier used for cost accounting.
    pub model: String,
    pub status: String,
    pub input_prompt: String,
    pub output_prompt: String,
    /// End-to-end latency reported by the caller.
    pub latency_ms: u64,
    /// Server time at ingestion.
    pub timestamp: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub token_usage: TokenUsage,
    /// Sub-steps in execution order.
    pub sub_steps: Vec<SubStep>,
}

impl TraceRecord {
    /// Builds a record from an accepted payload, stamped at `now`.
    pub fn from_payload(payload: TracePayload, now: DateTime<Utc>, token_usage: TokenUsage) -> Self {
        let now = stamp(now);
        Self {
            id: RecordId::new(),
            trace_id: payload.trace_id,
            session_id: payload.session_id,
            agent_name: payload.agent_name,
            model: payload.model,
            status: payload.status,
            input_prompt: payload.input_prompt,
            output_prompt: payload.output_prompt,
            latency_ms: payload.latency_ms,
            timestamp: now,
            created_at: now,
            token_usage,
            sub_steps: payload.sub_steps,
        }
    }
}

/// Truncates a server timestamp to the microsecond precision kept by stores.
pub fn stamp(now: DateTime<Utc>) -> DateTime<Utc> {
    now.trunc_subsecs(6)
}

/// Ingestion payload as sent by callers.
///
/// Server-computed fields (`id`, `timestamp`, `created_at`, `token_usage`)
/// are absent; if a caller sends them they are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TracePayload {
    pub trace_id: String,
    #[serde(default)]
    pub session_id: String,
    pub agent_name: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub input_prompt: String,
    #[serde(default)]
    pub output_prompt: String,
    #[serde(default)]
    pub latency_ms: u64,
    /// An absent model is left to cost accounting, which rejects it as unpriced.
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub sub_steps: Vec<SubStep>,
}

impl TracePayload {
    /// Checks the constraints serde cannot express.
    pub fn validate(&self) -> Result<(), String> {
        if self.trace_id.trim().is_empty() {
            return Err("trace_id must not be empty".into());
        }
        if self.agent_name.trim().is_empty() {
            return Err("agent_name must not be empty".into());
        }
        for (idx, step) in self.sub_steps.iter().enumerate() {
            if step.name.trim().is_empty() {
                return Err(format!("sub_steps[{idx}].name must not be empty"));
            }
            if step.end < step.start {
                return Err(format!("sub_steps[{idx}] ends before it starts"));
            }
        }
        Ok(())
    }
}
