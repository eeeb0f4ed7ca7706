// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Confab - streaming multi-model chat engine.
//!
//! This crate is the conversation core consumed by chat client shells
//! (mobile, TUI, desktop). It owns the parts with real coordination in
//! them; rendering, transport, and persistence stay with the host.
//!
//! Architecture highlights:
//! - `chat`: transcript messages, streaming sessions with cooperative
//!   cancellation, and the per-conversation controller state machine
//! - `compare`: the comparison-set manager and the concurrent multi-model
//!   dispatcher with its merged event stream
//! - `llm`: the completion provider seam, token/cost estimation, and the
//!   scripted mock provider for tests
//! - `platform`: credential and connectivity seams owned by the host
//! - `config`: engine settings with JSON persistence

pub mod chat;
pub mod compare;
pub mod config;
pub mod error;
pub mod llm;
pub mod platform;

pub use error::{ConfabError, ProviderError, Result};
