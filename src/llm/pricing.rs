// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Token and cost estimation
//!
//! Used when the provider does not report usage. Token counts are a
//! character-length approximation and costs come from a static per-model
//! price table, so the numbers are planning estimates, not billing facts.

use serde::{Deserialize, Serialize};

use crate::chat::message::TokenUsage;

/// Flat per-1k rate applied when no price table entry matches
pub const FALLBACK_RATE_PER_1K: f64 = 0.01;

/// Approximate characters per token
const CHARS_PER_TOKEN: usize = 4;

/// Estimate the token count for a text
///
/// `ceil(chars / 4)`, floored at 1 so even an empty exchange is billed as
/// one token.
pub fn estimate_tokens(text: &str) -> u32 {
    let chars = text.chars().count();
    (chars.div_ceil(CHARS_PER_TOKEN)).max(1) as u32
}

/// Estimate usage for one exchange from its raw texts
pub fn estimate_usage(input_text: &str, output_text: &str) -> TokenUsage {
    TokenUsage::new(estimate_tokens(input_text), estimate_tokens(output_text))
}

/// Per-1k token rates for one model family
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    /// USD per 1k input tokens
    pub input_per_1k: f64,
    /// USD per 1k output tokens
    pub output_per_1k: f64,
}

impl ModelPricing {
    /// Create a rate pair
    pub fn new(input_per_1k: f64, output_per_1k: f64) -> Self {
        Self {
            input_per_1k,
            output_per_1k,
        }
    }

    /// Flat fallback rate for unknown models
    pub fn fallback() -> Self {
        Self::new(FALLBACK_RATE_PER_1K, FALLBACK_RATE_PER_1K)
    }
}

/// Known-model price table
///
/// Lookup is a case-insensitive substring match of the model id against the
/// entry patterns, first match wins, so more specific patterns must come
/// before their prefixes (e.g. "gpt-4o-mini" before "gpt-4o").
#[derive(Debug, Clone)]
pub struct PriceTable {
    entries: Vec<(String, ModelPricing)>,
    fallback: ModelPricing,
}

impl Default for PriceTable {
    fn default() -> Self {
        Self::new(
            vec![
                ("gpt-4o-mini".into(), ModelPricing::new(0.00015, 0.0006)),
                ("gpt-4o".into(), ModelPricing::new(0.0025, 0.01)),
                ("gpt-4".into(), ModelPricing::new(0.03, 0.06)),
                ("gpt-3.5".into(), ModelPricing::new(0.0005, 0.0015)),
                ("claude-3-opus".into(), ModelPricing::new(0.015, 0.075)),
                ("claude-3-5-sonnet".into(), ModelPricing::new(0.003, 0.015)),
                ("claude-3-sonnet".into(), ModelPricing::new(0.003, 0.015)),
                ("claude-3-haiku".into(), ModelPricing::new(0.00025, 0.00125)),
                ("gemini-1.5-flash".into(), ModelPricing::new(0.000075, 0.0003)),
                ("gemini".into(), ModelPricing::new(0.00125, 0.005)),
                ("llama".into(), ModelPricing::new(0.0002, 0.0002)),
                ("mistral".into(), ModelPricing::new(0.0002, 0.0006)),
            ],
            ModelPricing::fallback(),
        )
    }
}

impl PriceTable {
    /// Create a table from explicit entries
    pub fn new(entries: Vec<(String, ModelPricing)>, fallback: ModelPricing) -> Self {
        Self { entries, fallback }
    }

    /// Consume the table, yielding its entries in lookup order
    pub fn into_entries(self) -> Vec<(String, ModelPricing)> {
        self.entries
    }

    /// Rates for a model id, falling back to the flat rate when unknown
    pub fn pricing_for(&self, model_id: &str) -> ModelPricing {
        let needle = model_id.to_lowercase();
        self.entries
            .iter()
            .find(|(pattern, _)| needle.contains(&pattern.to_lowercase()))
            .map(|(_, pricing)| *pricing)
            .unwrap_or(self.fallback)
    }

    /// Estimated cost of one exchange in USD
    pub fn estimate_cost(&self, model_id: &str, input_tokens: u32, output_tokens: u32) -> f64 {
        let pricing = self.pricing_for(model_id);
        (f64::from(input_tokens) / 1000.0) * pricing.input_per_1k
            + (f64::from(output_tokens) / 1000.0) * pricing.output_per_1k
    }

    /// Cost of a canonical exchange of `tokens` in each direction
    ///
    /// Shown to the user before sending a comparison round; a planning
    /// number only.
    pub fn projected_exchange_cost(&self, model_id: &str, tokens: u32) -> f64 {
        self.estimate_cost(model_id, tokens, tokens)
    }
}
