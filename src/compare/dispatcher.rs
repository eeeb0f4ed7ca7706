// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Multi-model dispatch
//!
//! Fans one user message out to N models, one streaming session per model
//! running on its own task, and merges their progress into a single ordered
//! event stream for the comparison view. Framing invariant: `Started` opens
//! the dispatch before any model work, `AllComplete` closes it after every
//! model reaches a terminal state; in between, each model emits zero or
//! more chunks followed by exactly one completion or error. One model's
//! failure never aborts its siblings.

use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use uuid::Uuid;

use crate::chat::message::{Message, TokenUsage};
use crate::chat::store::ConversationStore;
use crate::chat::streaming::{CancelHandle, StreamingSession};
use crate::config::Settings;
use crate::error::{ConfabError, Result};
use crate::llm::pricing::{estimate_usage, PriceTable};
use crate::llm::provider::{CompletionProvider, CompletionRequest, StreamChunk};

/// Per-model aggregate for one dispatch
///
/// Lives for the duration of one comparison round; the dispatcher emits a
/// finished aggregate with `ModelComplete`, and renderers can maintain
/// their own from the chunk events.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelResponse {
    /// Model identifier
    pub model_id: String,
    /// Human-readable model name
    pub model_name: String,
    /// Accumulated response text
    pub content: String,
    /// Whether the model is still streaming
    pub is_streaming: bool,
    /// Raw deltas in arrival order
    pub chunks: Vec<String>,
    /// Estimated token usage
    pub usage: Option<TokenUsage>,
    /// Estimated cost in USD
    pub estimated_cost: Option<f64>,
    /// Wall-clock time to the terminal state
    pub response_time_ms: Option<u64>,
    /// Whether the model finished normally
    pub is_complete: bool,
    /// Failure message, if the model errored
    pub error: Option<String>,
}

impl ModelResponse {
    /// An empty slot for a model that has not produced output yet
    pub fn pending(model_id: impl Into<String>, model_name: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            model_name: model_name.into(),
            content: String::new(),
            is_streaming: true,
            chunks: Vec::new(),
            usage: None,
            estimated_cost: None,
            response_time_ms: None,
            is_complete: false,
            error: None,
        }
    }

    /// Record one incoming delta
    pub fn record_delta(&mut self, delta: &str) {
        self.content.push_str(delta);
        self.chunks.push(delta.to_string());
    }

    /// Mark the model failed
    pub fn fail(&mut self, error: impl Into<String>) {
        self.is_streaming = false;
        self.is_complete = false;
        self.error = Some(error.into());
    }
}

/// One event in the merged dispatch stream
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchEvent {
    /// Dispatch opened; slots may be pre-allocated for every listed model
    Started { model_ids: Vec<String> },
    /// A model's stream began
    ModelStarted { model_id: String, model_name: String },
    /// A delta arrived; carries the running accumulation so renderers need
    /// no accumulator of their own
    Chunk {
        model_id: String,
        delta: String,
        content: String,
    },
    /// A model finished normally
    ModelComplete {
        model_id: String,
        response: ModelResponse,
    },
    /// A model failed; siblings are unaffected
    ModelError { model_id: String, error: String },
    /// Dispatch closed; every model reached a terminal state
    AllComplete { elapsed_ms: u64 },
}

/// A running dispatch: the merged event stream plus its cancel handle
pub struct ActiveDispatch {
    events: UnboundedReceiverStream<DispatchEvent>,
    cancel: CancelHandle,
}

impl ActiveDispatch {
    /// Handle that stops every model in this dispatch
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }
}

impl Stream for ActiveDispatch {
    type Item = DispatchEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.get_mut().events).poll_next(cx)
    }
}

/// Fans a user message out to a set of models concurrently
pub struct MultiModelDispatcher {
    provider: Arc<dyn CompletionProvider>,
    store: Arc<dyn ConversationStore>,
    prices: Arc<PriceTable>,
    max_models: usize,
    context_messages: usize,
    chunk_timeout: Duration,
}

impl MultiModelDispatcher {
    /// Create a dispatcher
    pub fn new(
        provider: Arc<dyn CompletionProvider>,
        store: Arc<dyn ConversationStore>,
        settings: &Settings,
    ) -> Self {
        Self {
            provider,
            store,
            prices: Arc::new(settings.price_table()),
            max_models: settings.comparison.max_models,
            context_messages: settings.chat.context_messages,
            chunk_timeout: settings.chunk_timeout(),
        }
    }

    /// Run one comparison round
    ///
    /// Records the user message once, then streams every model
    /// concurrently into one merged event sequence.
    pub async fn dispatch(
        &self,
        conversation_id: Uuid,
        text: impl Into<String>,
        model_ids: Vec<String>,
        credential: String,
    ) -> Result<ActiveDispatch> {
        let text = text.into();
        self.check_model_ids(&model_ids)?;

        let user_message = Message::user(conversation_id, text.clone());
        self.store.append(user_message).await?;
        let context = self
            .store
            .recent_messages(conversation_id, self.context_messages)
            .await?;

        tracing::info!(
            target: "confab.compare.dispatch",
            conversation_id = %conversation_id,
            models = model_ids.len(),
            "dispatching comparison round"
        );

        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancelHandle::new();
        let started_at = Instant::now();

        // Queued before any model task exists, so no later event can
        // reference an unknown model id.
        let _ = tx.send(DispatchEvent::Started {
            model_ids: model_ids.clone(),
        });

        let mut tasks = Vec::with_capacity(model_ids.len());
        for model_id in model_ids {
            tasks.push(tokio::spawn(Self::run_model(
                Arc::clone(&self.provider),
                Arc::clone(&self.prices),
                self.chunk_timeout,
                cancel.clone(),
                tx.clone(),
                model_id,
                context.clone(),
                text.clone(),
                credential.clone(),
            )));
        }

        // Supervisor: close the frame only after every model task is done.
        tokio::spawn(async move {
            for task in tasks {
                let _ = task.await;
            }
            let elapsed_ms = started_at.elapsed().as_millis() as u64;
            let _ = tx.send(DispatchEvent::AllComplete { elapsed_ms });
            tracing::info!(
                target: "confab.compare.dispatch",
                elapsed_ms,
                "comparison round closed"
            );
        });

        Ok(ActiveDispatch {
            events: UnboundedReceiverStream::new(rx),
            cancel,
        })
    }

    fn check_model_ids(&self, model_ids: &[String]) -> Result<()> {
        if model_ids.len() < 2 {
            return Err(ConfabError::InvalidInput(
                "comparison requires at least 2 models".to_string(),
            ));
        }
        if model_ids.len() > self.max_models {
            return Err(ConfabError::InvalidInput(format!(
                "comparison is limited to {} models",
                self.max_models
            )));
        }
        for (i, id) in model_ids.iter().enumerate() {
            if model_ids[..i].contains(id) {
                return Err(ConfabError::InvalidInput(format!(
                    "model {id} listed more than once"
                )));
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_model(
        provider: Arc<dyn CompletionProvider>,
        prices: Arc<PriceTable>,
        chunk_timeout: Duration,
        cancel: CancelHandle,
        tx: mpsc::UnboundedSender<DispatchEvent>,
        model_id: String,
        context: Vec<Message>,
        user_text: String,
        credential: String,
    ) {
        let model_name = provider
            .model_info(&model_id)
            .map(|m| m.display_name)
            .unwrap_or_else(|| model_id.clone());

        let _ = tx.send(DispatchEvent::ModelStarted {
            model_id: model_id.clone(),
            model_name: model_name.clone(),
        });

        let started = Instant::now();
        let session = StreamingSession::with_cancel_handle(provider, chunk_timeout, cancel);
        let request = CompletionRequest::new(model_id.clone(), context, credential);

        let mut stream = match session.start(request).await {
            Ok(stream) => stream,
            Err(e) => {
                let _ = tx.send(DispatchEvent::ModelError {
                    model_id,
                    error: e.to_string(),
                });
                return;
            }
        };

        let mut content = String::new();
        let mut chunks = Vec::new();

        while let Some(chunk) = stream.next().await {
            match chunk {
                StreamChunk::Text(delta) => {
                    content.push_str(&delta);
                    chunks.push(delta.clone());
                    let _ = tx.send(DispatchEvent::Chunk {
                        model_id: model_id.clone(),
                        delta,
                        content: content.clone(),
                    });
                }
                StreamChunk::Complete => {
                    let usage = estimate_usage(&user_text, &content);
                    let cost =
                        prices.estimate_cost(&model_id, usage.input_tokens, usage.output_tokens);
                    let response = ModelResponse {
                        model_id: model_id.clone(),
                        model_name: model_name.clone(),
                        content: content.clone(),
                        is_streaming: false,
                        chunks: chunks.clone(),
                        usage: Some(usage),
                        estimated_cost: Some(cost),
                        response_time_ms: Some(started.elapsed().as_millis() as u64),
                        is_complete: true,
                        error: None,
                    };
                    let _ = tx.send(DispatchEvent::ModelComplete {
                        model_id: model_id.clone(),
                        response,
                    });
                    return;
                }
                StreamChunk::Error(error) => {
                    tracing::warn!(
                        target: "confab.compare.dispatch",
                        model = %model_id,
                        error = %error,
                        "model failed, siblings continue"
                    );
                    let _ = tx.send(DispatchEvent::ModelError {
                        model_id: model_id.clone(),
                        error,
                    });
                    return;
                }
            }
        }
        // Stream ended without a terminal chunk: the dispatch was
        // cancelled; stop silently, the supervisor still closes the frame.
    }
}
