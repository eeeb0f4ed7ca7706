// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Completion provider trait and related types
//!
//! Defines the abstraction layer for remote model backends. The real HTTP
//! transport lives in the host application; the engine only consumes the
//! chunk stream this trait hands back.

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

use crate::chat::message::Message;
use crate::error::Result;

/// Stream of raw provider chunks, terminated by success or a typed failure
pub type ProviderStream = Pin<Box<dyn Stream<Item = Result<StreamChunk>> + Send>>;

/// Main trait for completion providers
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Get the provider name (e.g., "openrouter", "aggregator")
    fn name(&self) -> &str;

    /// List available models
    fn available_models(&self) -> Vec<ModelInfo>;

    /// Check if a specific model is supported
    fn supports_model(&self, model: &str) -> bool {
        self.available_models().iter().any(|m| m.id == model)
    }

    /// Get model info by ID
    fn model_info(&self, model: &str) -> Option<ModelInfo> {
        self.available_models().into_iter().find(|m| m.id == model)
    }

    /// Streaming completion for one (message, model) pair
    async fn stream_completion(&self, request: CompletionRequest) -> Result<ProviderStream>;
}

/// Request for a streaming completion
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Model to use
    pub model: String,

    /// Prior messages plus the new user message, oldest first
    pub messages: Vec<Message>,

    /// API credential authorizing the call
    pub credential: String,
}

impl CompletionRequest {
    /// Create a request
    pub fn new(
        model: impl Into<String>,
        messages: Vec<Message>,
        credential: impl Into<String>,
    ) -> Self {
        Self {
            model: model.into(),
            messages,
            credential: credential.into(),
        }
    }

    /// The outgoing user text, i.e. the content of the last user message
    pub fn user_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.is_from_user())
            .map(|m| m.content.as_str())
    }
}

/// One chunk of a streaming response
///
/// `Complete` and `Error` are terminal; a well-formed stream emits exactly
/// one of them, after zero or more `Text` chunks.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamChunk {
    /// Incremental text delta
    Text(String),
    /// Normal end of the stream
    Complete,
    /// Provider failure, terminal and recoverable
    Error(String),
}

impl StreamChunk {
    /// Whether this chunk ends the stream
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamChunk::Complete | StreamChunk::Error(_))
    }
}

/// Descriptor for one model in the catalog
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelInfo {
    /// Model identifier (e.g., "openai/gpt-4o")
    pub id: String,

    /// Human-readable name
    pub display_name: String,

    /// Context window size in tokens
    pub context_window: u32,

    /// Maximum output tokens
    pub max_output_tokens: u32,
}

impl ModelInfo {
    /// Create a descriptor with catalog defaults for the window sizes
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            context_window: 128_000,
            max_output_tokens: 4_096,
        }
    }
}
