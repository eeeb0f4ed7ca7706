// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Error types for Confab
//!
//! This module defines all error types used throughout the engine.

use thiserror::Error;

/// Main error type for Confab operations
#[derive(Error, Debug)]
pub enum ConfabError {
    /// Provider-related errors
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Conversation store errors
    #[error("Store error: {0}")]
    Store(String),

    /// Streaming session errors
    #[error("Session error: {0}")]
    Session(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Provider-specific error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    /// Authentication failed (invalid API key)
    #[error("Authentication failed: invalid API key")]
    AuthenticationFailed,

    /// Rate limited by the API
    #[error("Rate limited: retry after {0} seconds")]
    RateLimited(u32),

    /// Requested model not found
    #[error("Model not found: {0}")]
    ModelNotFound(String),

    /// Network connectivity error
    #[error("Network error: {0}")]
    Network(String),

    /// Invalid response from the provider
    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),

    /// Provider returned an error
    #[error("Provider error ({status}): {message}")]
    ServerError { status: u16, message: String },

    /// Timeout waiting for model output
    #[error("Timed out waiting for model output")]
    Timeout,

    /// Streaming error
    #[error("Streaming error: {0}")]
    Stream(String),
}

/// Result type alias for Confab operations
pub type Result<T> = std::result::Result<T, ConfabError>;
