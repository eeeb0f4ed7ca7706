// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Chat session controller
//!
//! The per-conversation state machine: validates outgoing drafts, guards
//! network/credential preconditions, drives one streaming session at a
//! time, preserves partial content on user cancellation, and pages older
//! history into the transcript.
//!
//! The transcript has a single writer (the controller's own task); readers
//! observe immutable snapshots published through a watch channel on every
//! mutation.

use futures::StreamExt;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::watch;
use uuid::Uuid;

use crate::chat::message::Message;
use crate::chat::store::{ConversationStore, InMemoryConversationStore};
use crate::chat::streaming::{CancelHandle, StreamingSession};
use crate::chat::validation::{credential_looks_valid, validate_message, MessageValidation};
use crate::config::Settings;
use crate::error::{ConfabError, Result};
use crate::llm::pricing::{estimate_usage, PriceTable};
use crate::llm::provider::{CompletionProvider, CompletionRequest, StreamChunk};
use crate::platform::{ConnectivityProbe, CredentialStore, SwitchableConnectivity};

/// Marker appended when a response is finalized after user cancellation
pub const INTERRUPTED_MARKER: &str = "[interrupted]";

/// Where the controller is in its send lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Nothing in flight
    Idle,
    /// Running pre-send checks
    Validating,
    /// Accepted; user message being recorded
    Sending,
    /// Consuming the response stream
    Streaming,
    /// Cancel requested, stream winding down
    Cancelling,
}

/// Snapshot of one open conversation's UI state
#[derive(Debug, Clone)]
pub struct ChatUiState {
    /// Conversation this state belongs to
    pub conversation_id: Uuid,
    /// Transcript, oldest first
    pub messages: Vec<Message>,
    /// Current draft text
    pub draft: String,
    /// Validation of the current draft
    pub draft_validation: MessageValidation,
    /// In-flight streaming text buffer
    pub streaming_content: String,
    /// Send lifecycle phase
    pub phase: SessionPhase,
    /// Whether cancellation was requested for the in-flight stream
    pub cancel_requested: bool,
    /// Whether an older-history page is being fetched
    pub is_loading_more: bool,
    /// Whether older history may remain
    pub has_more_history: bool,
    /// Whether the view should follow new content
    pub auto_scroll: bool,
    /// Set when an assistant message arrives, cleared on acknowledge
    pub notify_new_message: bool,
    /// Last recoverable failure, surfaced inline
    pub last_error: Option<String>,
}

impl ChatUiState {
    fn new(conversation_id: Uuid) -> Self {
        Self {
            conversation_id,
            messages: Vec::new(),
            draft: String::new(),
            draft_validation: MessageValidation::Empty,
            streaming_content: String::new(),
            phase: SessionPhase::Idle,
            cancel_requested: false,
            is_loading_more: false,
            has_more_history: false,
            auto_scroll: true,
            notify_new_message: false,
            last_error: None,
        }
    }

    /// Whether a response stream is in flight
    pub fn is_streaming(&self) -> bool {
        matches!(
            self.phase,
            SessionPhase::Streaming | SessionPhase::Cancelling
        )
    }
}

/// Why a send was rejected or failed
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SendError {
    /// Draft is blank
    #[error("message is empty")]
    EmptyMessage,

    /// Draft exceeds the character limit
    #[error("message is {length} characters, limit is {limit}")]
    MessageTooLong { length: usize, limit: usize },

    /// Network unreachable
    #[error("no network connection")]
    Offline,

    /// No credential configured
    #[error("no API credential configured")]
    MissingCredential,

    /// Credential fails the local format check
    #[error("stored API credential is malformed")]
    MalformedCredential,

    /// A send is already in flight
    #[error("a message is already in flight")]
    Busy,

    /// The model stream failed
    #[error("model stream failed: {0}")]
    Provider(String),

    /// The conversation store failed
    #[error("store failure: {0}")]
    Store(String),
}

/// How an accepted send ended
#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    /// Stream completed; the finalized assistant message
    Completed(Message),
    /// User cancelled; the interrupted message if partial content existed
    Interrupted(Option<Message>),
}

/// The single-model chat state machine for one open conversation
pub struct ChatController {
    conversation_id: Uuid,
    model: String,
    provider: Arc<dyn CompletionProvider>,
    store: Arc<dyn ConversationStore>,
    credentials: Arc<dyn CredentialStore>,
    connectivity: Arc<dyn ConnectivityProbe>,
    prices: Arc<PriceTable>,
    settings: Settings,
    state: watch::Sender<ChatUiState>,
    cancel: Mutex<CancelHandle>,
}

/// Builder for ChatController instances
pub struct ChatControllerBuilder {
    conversation_id: Uuid,
    provider: Option<Arc<dyn CompletionProvider>>,
    store: Option<Arc<dyn ConversationStore>>,
    credentials: Option<Arc<dyn CredentialStore>>,
    connectivity: Option<Arc<dyn ConnectivityProbe>>,
    settings: Settings,
    model: Option<String>,
}

impl ChatControllerBuilder {
    /// Create a builder for a conversation
    pub fn new(conversation_id: Uuid) -> Self {
        Self {
            conversation_id,
            provider: None,
            store: None,
            credentials: None,
            connectivity: None,
            settings: Settings::default(),
            model: None,
        }
    }

    /// Set the completion provider (required)
    pub fn with_provider(mut self, provider: Arc<dyn CompletionProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Set the conversation store (defaults to in-memory)
    pub fn with_store(mut self, store: Arc<dyn ConversationStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the credential store (defaults to empty)
    pub fn with_credentials(mut self, credentials: Arc<dyn CredentialStore>) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Set the connectivity probe (defaults to always online)
    pub fn with_connectivity(mut self, connectivity: Arc<dyn ConnectivityProbe>) -> Self {
        self.connectivity = Some(connectivity);
        self
    }

    /// Set the engine settings
    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// Set the model for this conversation
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Build the controller
    pub fn build(self) -> Result<ChatController> {
        let provider = self
            .provider
            .ok_or_else(|| ConfabError::Config("no completion provider set".to_string()))?;
        self.settings.validate()?;

        let model = self
            .model
            .unwrap_or_else(|| self.settings.defaults.default_model.clone());
        let prices = Arc::new(self.settings.price_table());
        let (state, _) = watch::channel(ChatUiState::new(self.conversation_id));

        Ok(ChatController {
            conversation_id: self.conversation_id,
            model,
            provider,
            store: self
                .store
                .unwrap_or_else(|| Arc::new(InMemoryConversationStore::new())),
            credentials: self
                .credentials
                .unwrap_or_else(|| Arc::new(crate::platform::StaticCredentials::empty())),
            connectivity: self
                .connectivity
                .unwrap_or_else(|| Arc::new(SwitchableConnectivity::new())),
            prices,
            settings: self.settings,
            state,
            cancel: Mutex::new(CancelHandle::new()),
        })
    }
}

impl ChatController {
    /// Create a builder for a conversation
    pub fn builder(conversation_id: Uuid) -> ChatControllerBuilder {
        ChatControllerBuilder::new(conversation_id)
    }

    /// The conversation this controller owns
    pub fn conversation_id(&self) -> Uuid {
        self.conversation_id
    }

    /// The model used for sends
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Change the model for subsequent sends
    pub fn set_model(&mut self, model: impl Into<String>) {
        self.model = model.into();
    }

    /// Current state snapshot
    pub fn state(&self) -> ChatUiState {
        self.state.borrow().clone()
    }

    /// Subscribe to state snapshots
    pub fn subscribe(&self) -> watch::Receiver<ChatUiState> {
        self.state.subscribe()
    }

    fn update(&self, mutate: impl FnOnce(&mut ChatUiState)) {
        self.state.send_modify(mutate);
    }

    /// Replace the draft, revalidating it
    pub fn set_draft(&self, text: impl Into<String>) {
        let text = text.into();
        let validation = validate_message(&text, self.settings.chat.max_message_chars);
        self.update(|s| {
            s.draft = text;
            s.draft_validation = validation;
        });
    }

    /// Toggle view-follows-content
    pub fn set_auto_scroll(&self, auto_scroll: bool) {
        self.update(|s| s.auto_scroll = auto_scroll);
    }

    /// Clear the new-message notification flag
    pub fn acknowledge_activity(&self) {
        self.update(|s| s.notify_new_message = false);
    }

    /// Load the most recent history page into the transcript
    pub async fn open(&self) -> Result<()> {
        let page_size = self.settings.chat.page_size;
        let page = self
            .store
            .recent_messages(self.conversation_id, page_size)
            .await?;
        let has_more = page.len() == page_size;
        self.update(|s| {
            s.messages = page;
            s.has_more_history = has_more;
        });
        Ok(())
    }

    /// Request cancellation of the in-flight stream
    ///
    /// Cooperative: the stream stops at the next chunk boundary. Partial
    /// content is finalized by the owning send call, not here.
    pub fn cancel(&self) {
        let mut should_cancel = false;
        self.update(|s| {
            if s.phase == SessionPhase::Streaming {
                s.phase = SessionPhase::Cancelling;
                s.cancel_requested = true;
                should_cancel = true;
            }
        });
        if should_cancel {
            tracing::info!(
                target: "confab.chat.controller",
                conversation_id = %self.conversation_id,
                "cancellation requested"
            );
            self.cancel.lock().unwrap().cancel();
        }
    }

    /// Send the current draft
    ///
    /// Runs the precondition chain (validation, connectivity, credential),
    /// then clears the draft, records the user message, and streams the
    /// response to completion, error, or cancellation.
    pub async fn send(&self) -> std::result::Result<SendOutcome, SendError> {
        if self.state.borrow().phase != SessionPhase::Idle {
            return Err(SendError::Busy);
        }
        self.update(|s| {
            s.phase = SessionPhase::Validating;
            s.last_error = None;
        });

        let text = self.state.borrow().draft.clone();
        match self.preconditions(&text).await {
            Ok(credential) => self.send_accepted(text, credential).await,
            Err(error) => {
                self.update(|s| {
                    s.phase = SessionPhase::Idle;
                    s.last_error = Some(error.to_string());
                });
                Err(error)
            }
        }
    }

    /// The pre-send check chain; no side effects on failure
    async fn preconditions(&self, text: &str) -> std::result::Result<String, SendError> {
        match validate_message(text, self.settings.chat.max_message_chars) {
            MessageValidation::Valid => {}
            MessageValidation::Empty => return Err(SendError::EmptyMessage),
            MessageValidation::TooLong { length, limit } => {
                return Err(SendError::MessageTooLong { length, limit })
            }
        }

        if !self.connectivity.is_online().await {
            return Err(SendError::Offline);
        }

        // Re-read on every send so a key changed mid-conversation is seen.
        let credential = self
            .credentials
            .credential()
            .ok_or(SendError::MissingCredential)?;
        if !credential_looks_valid(&credential) {
            return Err(SendError::MalformedCredential);
        }

        Ok(credential)
    }

    async fn send_accepted(
        &self,
        text: String,
        credential: String,
    ) -> std::result::Result<SendOutcome, SendError> {
        let user_message = Message::user(self.conversation_id, text.clone());

        // Optimistic UI: the draft clears before the stream starts so the
        // user can type the next message.
        self.update(|s| {
            s.phase = SessionPhase::Sending;
            s.draft.clear();
            s.draft_validation = MessageValidation::Empty;
        });

        if let Err(e) = self.store.append(user_message.clone()).await {
            self.update(|s| {
                s.phase = SessionPhase::Idle;
                s.last_error = Some(e.to_string());
            });
            return Err(SendError::Store(e.to_string()));
        }
        self.update(|s| s.messages.push(user_message));

        let context = match self
            .store
            .recent_messages(self.conversation_id, self.settings.chat.context_messages)
            .await
        {
            Ok(context) => context,
            Err(e) => {
                self.update(|s| {
                    s.phase = SessionPhase::Idle;
                    s.last_error = Some(e.to_string());
                });
                return Err(SendError::Store(e.to_string()));
            }
        };

        let session =
            StreamingSession::new(Arc::clone(&self.provider), self.settings.chunk_timeout());
        *self.cancel.lock().unwrap() = session.cancel_handle();

        let request = CompletionRequest::new(self.model.clone(), context, credential);

        tracing::debug!(
            target: "confab.chat.controller",
            conversation_id = %self.conversation_id,
            model = %self.model,
            chars = text.chars().count(),
            "send accepted, streaming response"
        );

        let mut stream = match session.start(request).await {
            Ok(stream) => stream,
            Err(e) => {
                self.update(|s| {
                    s.phase = SessionPhase::Idle;
                    s.last_error = Some(e.to_string());
                });
                return Err(SendError::Provider(e.to_string()));
            }
        };

        self.update(|s| {
            s.phase = SessionPhase::Streaming;
            s.cancel_requested = false;
            s.streaming_content.clear();
        });

        loop {
            match stream.next().await {
                Some(StreamChunk::Text(delta)) => {
                    self.update(|s| s.streaming_content.push_str(&delta));
                }
                Some(StreamChunk::Complete) => {
                    return self.finalize_completed(&text).await;
                }
                Some(StreamChunk::Error(message)) => {
                    // Transcript untouched; the buffer is discarded and the
                    // user may resend the same text.
                    tracing::warn!(
                        target: "confab.chat.controller",
                        conversation_id = %self.conversation_id,
                        error = %message,
                        "stream failed, discarding partial content"
                    );
                    self.update(|s| {
                        s.streaming_content.clear();
                        s.phase = SessionPhase::Idle;
                        s.cancel_requested = false;
                        s.last_error = Some(message.clone());
                    });
                    return Err(SendError::Provider(message));
                }
                None => {
                    return self.finalize_cancelled(&text).await;
                }
            }
        }
    }

    async fn finalize_completed(
        &self,
        user_text: &str,
    ) -> std::result::Result<SendOutcome, SendError> {
        let content = self.state.borrow().streaming_content.clone();
        let usage = estimate_usage(user_text, &content);
        let cost = self
            .prices
            .estimate_cost(&self.model, usage.input_tokens, usage.output_tokens);
        let message = Message::assistant(self.conversation_id, content)
            .with_model(self.model.clone())
            .with_usage(usage)
            .with_cost(cost);

        self.append_assistant(message.clone()).await?;
        tracing::info!(
            target: "confab.chat.controller",
            conversation_id = %self.conversation_id,
            model = %self.model,
            output_tokens = usage.output_tokens,
            "response completed"
        );
        Ok(SendOutcome::Completed(message))
    }

    async fn finalize_cancelled(
        &self,
        user_text: &str,
    ) -> std::result::Result<SendOutcome, SendError> {
        let partial = self.state.borrow().streaming_content.clone();
        if partial.is_empty() {
            self.update(|s| {
                s.phase = SessionPhase::Idle;
                s.cancel_requested = false;
            });
            return Ok(SendOutcome::Interrupted(None));
        }

        // Explicit cancellation preserves progress: the partial buffer is
        // finalized rather than discarded.
        let content = format!("{partial}\n\n{INTERRUPTED_MARKER}");
        let usage = estimate_usage(user_text, &partial);
        let cost = self
            .prices
            .estimate_cost(&self.model, usage.input_tokens, usage.output_tokens);
        let message = Message::assistant(self.conversation_id, content)
            .with_model(self.model.clone())
            .with_usage(usage)
            .with_cost(cost);

        self.append_assistant(message.clone()).await?;
        tracing::info!(
            target: "confab.chat.controller",
            conversation_id = %self.conversation_id,
            chars = partial.chars().count(),
            "stream cancelled, partial content preserved"
        );
        Ok(SendOutcome::Interrupted(Some(message)))
    }

    async fn append_assistant(&self, message: Message) -> std::result::Result<(), SendError> {
        if let Err(e) = self.store.append(message.clone()).await {
            self.update(|s| {
                s.streaming_content.clear();
                s.phase = SessionPhase::Idle;
                s.cancel_requested = false;
                s.last_error = Some(e.to_string());
            });
            return Err(SendError::Store(e.to_string()));
        }
        self.update(|s| {
            s.messages.push(message);
            s.streaming_content.clear();
            s.phase = SessionPhase::Idle;
            s.cancel_requested = false;
            s.notify_new_message = true;
        });
        Ok(())
    }

    /// Load one page of older history, prepended to the transcript
    ///
    /// No-op when a load is already in flight or no more pages exist.
    /// Returns the number of messages prepended.
    pub async fn load_older(&self) -> Result<usize> {
        {
            let state = self.state.borrow();
            if state.is_loading_more || !state.has_more_history {
                return Ok(0);
            }
        }
        let oldest = {
            let state = self.state.borrow();
            state.messages.first().map(|m| m.timestamp)
        };
        let Some(oldest) = oldest else {
            self.update(|s| s.has_more_history = false);
            return Ok(0);
        };

        self.update(|s| s.is_loading_more = true);
        let page_size = self.settings.chat.page_size;
        let page = match self
            .store
            .messages_before(self.conversation_id, oldest, page_size)
            .await
        {
            Ok(page) => page,
            Err(e) => {
                self.update(|s| {
                    s.is_loading_more = false;
                    s.last_error = Some(e.to_string());
                });
                return Err(e);
            }
        };

        let fetched = page.len();
        // A full page leaves the exact remainder unknown; treat it as more.
        let has_more = fetched == page_size;
        self.update(|s| {
            let mut combined = page;
            combined.append(&mut s.messages);
            s.messages = combined;
            s.is_loading_more = false;
            s.has_more_history = has_more;
        });

        tracing::debug!(
            target: "confab.chat.controller",
            conversation_id = %self.conversation_id,
            fetched,
            has_more,
            "older history page loaded"
        );
        Ok(fetched)
    }

    /// Delete a message by id from the store and the transcript
    pub async fn delete_message(&self, id: Uuid) -> Result<bool> {
        let existed = self.store.delete_message(id).await?;
        if existed {
            self.update(|s| s.messages.retain(|m| m.id != id));
        }
        Ok(existed)
    }
}
