// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Chat module for Confab
//!
//! Single-model conversation handling: transcript messages, the
//! conversation store seam, streaming sessions, and the per-conversation
//! controller state machine.

pub mod controller;
pub mod message;
pub mod store;
pub mod streaming;
pub mod validation;

pub use controller::{
    ChatController, ChatControllerBuilder, ChatUiState, SendError, SendOutcome, SessionPhase,
};
pub use message::{Message, Role, TokenUsage};
pub use store::{ConversationStore, InMemoryConversationStore};
pub use streaming::{CancelHandle, ChunkStream, StreamingSession};
pub use validation::{credential_looks_valid, validate_message, MessageValidation};
