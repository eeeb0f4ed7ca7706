// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Conversation store abstraction
//!
//! The engine persists and pages transcripts through this trait; the host
//! application decides what actually backs it. The in-memory implementation
//! here is the reference used by tests and prototypes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use crate::chat::message::Message;
use crate::error::Result;

/// Storage contract for conversation transcripts
///
/// Page queries return messages in chronological order (oldest first
/// within the page).
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Append a message to its conversation
    async fn append(&self, message: Message) -> Result<()>;

    /// The latest `limit` messages of a conversation
    async fn recent_messages(&self, conversation_id: Uuid, limit: usize) -> Result<Vec<Message>>;

    /// The `limit` messages immediately preceding `before`
    async fn messages_before(
        &self,
        conversation_id: Uuid,
        before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Message>>;

    /// Delete a message by id, returning whether it existed
    async fn delete_message(&self, id: Uuid) -> Result<bool>;
}

/// In-memory conversation store
#[derive(Default)]
pub struct InMemoryConversationStore {
    conversations: Mutex<HashMap<Uuid, Vec<Message>>>,
}

impl InMemoryConversationStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of messages in one conversation
    pub fn message_count(&self, conversation_id: Uuid) -> usize {
        self.conversations
            .lock()
            .unwrap()
            .get(&conversation_id)
            .map(|m| m.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn append(&self, message: Message) -> Result<()> {
        let mut conversations = self.conversations.lock().unwrap();
        conversations
            .entry(message.conversation_id)
            .or_default()
            .push(message);
        Ok(())
    }

    async fn recent_messages(&self, conversation_id: Uuid, limit: usize) -> Result<Vec<Message>> {
        let conversations = self.conversations.lock().unwrap();
        let messages = conversations
            .get(&conversation_id)
            .map(|m| m.as_slice())
            .unwrap_or_default();
        let start = messages.len().saturating_sub(limit);
        Ok(messages[start..].to_vec())
    }

    async fn messages_before(
        &self,
        conversation_id: Uuid,
        before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Message>> {
        let conversations = self.conversations.lock().unwrap();
        let earlier: Vec<Message> = conversations
            .get(&conversation_id)
            .map(|m| m.as_slice())
            .unwrap_or_default()
            .iter()
            .filter(|m| m.timestamp < before)
            .cloned()
            .collect();
        let start = earlier.len().saturating_sub(limit);
        Ok(earlier[start..].to_vec())
    }

    async fn delete_message(&self, id: Uuid) -> Result<bool> {
        let mut conversations = self.conversations.lock().unwrap();
        for messages in conversations.values_mut() {
            let before = messages.len();
            messages.retain(|m| m.id != id);
            if messages.len() < before {
                return Ok(true);
            }
        }
        Ok(false)
    }
}
