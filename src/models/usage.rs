use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// Per-token prices in USD.
const GPT4_TURBO_INPUT_PRICE: f64 = 10.0 / 1_000_000.0;
const GPT4_TURBO_OUTPUT_PRICE: f64 = 30.0 / 1_000_000.0;
const GPT35_TURBO_INPUT_PRICE: f64 = 0.50 / 1_000_000.0;
const GPT35_TURBO_OUTPUT_PRICE: f64 = 1.50 / 1_000_000.0;
const WHISPER_PRICE_PER_MINUTE: f64 = 0.006;

/// The kind of generation call a usage record was produced by.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum UsageOperation {
    Breakdown,
    Chat,
    Refine,
    Transcribe,
}

impl UsageOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Breakdown => "breakdown",
            Self::Chat => "chat",
            Self::Refine => "refine",
            Self::Transcribe => "transcribe",
        }
    }
}

/// Raw token counts as reported by a model provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenCounts {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl TokenCounts {
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// Immutable cost record of one generation call.
///
/// Records are appended to an idea's usage log and never modified afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    /// Cost in USD.
    pub cost: f64,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    pub operation: UsageOperation,
    pub model: String,
}

impl TokenUsage {
    /// Price a provider's token counts for the given model.
    ///
    /// `audio_seconds` only matters for transcriptions; without it a
    /// transcription is recorded at zero cost.
    pub fn from_counts(
        counts: TokenCounts,
        operation: UsageOperation,
        model: impl Into<String>,
        audio_seconds: Option<f64>,
    ) -> Self {
        let model = model.into();
        let cost = match operation {
            UsageOperation::Transcribe => transcription_cost(audio_seconds),
            _ => completion_cost(counts.prompt_tokens, counts.completion_tokens, &model),
        };

        Self {
            prompt_tokens: counts.prompt_tokens,
            completion_tokens: counts.completion_tokens,
            total_tokens: counts.total_tokens,
            cost,
            timestamp: Utc::now(),
            operation,
            model,
        }
    }
}

/// Self-hosted models (Ollama tags such as `gpt-oss:20b`) are free.
pub fn is_self_hosted(model: &str) -> bool {
    model.contains("ollama") || model.contains("gpt-oss") || model.contains(':')
}

pub fn completion_cost(prompt_tokens: u64, completion_tokens: u64, model: &str) -> f64 {
    if is_self_hosted(model) {
        return 0.0;
    }

    let (input_price, output_price) = if model.contains("gpt-3.5") {
        (GPT35_TURBO_INPUT_PRICE, GPT35_TURBO_OUTPUT_PRICE)
    } else {
        (GPT4_TURBO_INPUT_PRICE, GPT4_TURBO_OUTPUT_PRICE)
    };

    prompt_tokens as f64 * input_price + completion_tokens as f64 * output_price
}

pub fn transcription_cost(audio_seconds: Option<f64>) -> f64 {
    match audio_seconds {
        Some(seconds) if seconds > 0.0 => seconds / 60.0 * WHISPER_PRICE_PER_MINUTE,
        _ => 0.0,
    }
}

/// Aggregate of usage records sharing one operation kind.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct UsageSummary {
    pub count: usize,
    pub tokens: u64,
    pub cost: f64,
}

pub fn total_cost(records: &[TokenUsage]) -> f64 {
    records.iter().map(|usage| usage.cost).sum()
}

pub fn total_tokens(records: &[TokenUsage]) -> u64 {
    records.iter().map(|usage| usage.total_tokens).sum()
}

pub fn usage_by_operation(records: &[TokenUsage]) -> BTreeMap<UsageOperation, UsageSummary> {
    let mut summary: BTreeMap<UsageOperation, UsageSummary> = BTreeMap::new();
    for usage in records {
        let entry = summary.entry(usage.operation).or_default();
        entry.count += 1;
        entry.tokens += usage.total_tokens;
        entry.cost += usage.cost;
    }
    summary
}

pub fn format_cost(cost: f64) -> String {
    format!("${:.4}", cost)
}

pub fn format_tokens(tokens: u64) -> String {
    if tokens < 1000 {
        tokens.to_string()
    } else {
        format!("{:.1}k", tokens as f64 / 1000.0)
    }
}
