// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Settings management for Confab
//!
//! Handles loading and saving engine settings from ~/.confab/settings.json.
//! Host applications may also construct `Settings` directly and skip the
//! file entirely.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{ConfabError, Result};
use crate::llm::pricing::{ModelPricing, PriceTable};

/// Main settings structure, stored in ~/.confab/settings.json
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Settings {
    /// Default settings for new conversations
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Chat input and pagination settings
    #[serde(default)]
    pub chat: ChatConfig,

    /// Streaming behavior settings
    #[serde(default)]
    pub streaming: StreamingConfig,

    /// Multi-model comparison settings
    #[serde(default)]
    pub comparison: ComparisonConfig,

    /// Cost estimation settings
    #[serde(default)]
    pub pricing: PricingConfig,
}

/// Defaults applied to new conversations
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DefaultsConfig {
    /// Model used when the conversation does not specify one
    #[serde(default = "default_model")]
    pub default_model: String,
}

/// Chat input and pagination settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatConfig {
    /// Maximum outgoing message length in characters
    #[serde(default = "default_max_message_chars")]
    pub max_message_chars: usize,

    /// Messages fetched per history page
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Prior messages included as model context
    #[serde(default = "default_context_messages")]
    pub context_messages: usize,
}

/// Streaming behavior settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StreamingConfig {
    /// Idle timeout between provider chunks, in milliseconds
    #[serde(default = "default_chunk_timeout_ms")]
    pub chunk_timeout_ms: u64,
}

/// Multi-model comparison settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ComparisonConfig {
    /// Ceiling on models compared side-by-side
    #[serde(default = "default_max_models")]
    pub max_models: usize,

    /// Token count assumed per direction when projecting costs
    #[serde(default = "default_projection_tokens")]
    pub projection_tokens: u32,
}

/// Cost estimation settings
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct PricingConfig {
    /// Per-1k rate overrides checked before the built-in table
    #[serde(default)]
    pub overrides: Vec<PriceOverride>,
}

/// One price table override
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceOverride {
    /// Case-insensitive substring matched against the model id
    pub pattern: String,
    /// USD per 1k input tokens
    pub input_per_1k: f64,
    /// USD per 1k output tokens
    pub output_per_1k: f64,
}

fn default_model() -> String {
    "openai/gpt-4o-mini".to_string()
}

fn default_max_message_chars() -> usize {
    10_000
}

fn default_page_size() -> usize {
    50
}

fn default_context_messages() -> usize {
    20
}

fn default_chunk_timeout_ms() -> u64 {
    30_000
}

fn default_max_models() -> usize {
    4
}

fn default_projection_tokens() -> u32 {
    500
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            default_model: default_model(),
        }
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_message_chars: default_max_message_chars(),
            page_size: default_page_size(),
            context_messages: default_context_messages(),
        }
    }
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            chunk_timeout_ms: default_chunk_timeout_ms(),
        }
    }
}

impl Default for ComparisonConfig {
    fn default() -> Self {
        Self {
            max_models: default_max_models(),
            projection_tokens: default_projection_tokens(),
        }
    }
}

impl Settings {
    /// Confab home directory (~/.confab)
    pub fn confab_home() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".confab")
    }

    /// Path of the settings file
    pub fn settings_path() -> PathBuf {
        Self::confab_home().join("settings.json")
    }

    /// Load settings from the default path, falling back to defaults
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::settings_path())
    }

    /// Load settings from an explicit path
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let settings: Settings = serde_json::from_str(&content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Save settings to the default path
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::settings_path())
    }

    /// Save settings to an explicit path
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<()> {
        if self.chat.max_message_chars == 0 {
            return Err(ConfabError::Config(
                "chat.max_message_chars must be positive".to_string(),
            ));
        }
        if self.chat.page_size == 0 {
            return Err(ConfabError::Config(
                "chat.page_size must be positive".to_string(),
            ));
        }
        if self.streaming.chunk_timeout_ms == 0 {
            return Err(ConfabError::Config(
                "streaming.chunk_timeout_ms must be positive".to_string(),
            ));
        }
        if self.comparison.max_models < 2 {
            return Err(ConfabError::Config(
                "comparison.max_models must allow at least 2 models".to_string(),
            ));
        }
        Ok(())
    }

    /// Idle timeout between provider chunks
    pub fn chunk_timeout(&self) -> Duration {
        Duration::from_millis(self.streaming.chunk_timeout_ms)
    }

    /// Build the price table, applying configured overrides first
    pub fn price_table(&self) -> PriceTable {
        let defaults = PriceTable::default();
        if self.pricing.overrides.is_empty() {
            return defaults;
        }
        let mut entries: Vec<(String, ModelPricing)> = self
            .pricing
            .overrides
            .iter()
            .map(|o| {
                (
                    o.pattern.clone(),
                    ModelPricing::new(o.input_per_1k, o.output_per_1k),
                )
            })
            .collect();
        entries.extend(defaults.into_entries());
        PriceTable::new(entries, ModelPricing::fallback())
    }
}
