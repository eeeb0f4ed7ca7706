// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Streaming session handling
//!
//! Turns a provider-level chunk stream for one (message, model) pair into
//! deterministic state transitions: an append-only accumulator the caller
//! can read between emissions, exactly one terminal chunk for uncancelled
//! runs, and cooperative cancellation that drops late chunks silently.

use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::timeout;

use crate::error::{ConfabError, Result};
use crate::llm::provider::{CompletionProvider, CompletionRequest, StreamChunk};

/// Stream of normalized chunks produced by a session
pub type ChunkStream = Pin<Box<dyn Stream<Item = StreamChunk> + Send>>;

/// Cooperative cancellation flag
///
/// Cloneable; every clone observes the same flag. Checked at chunk
/// boundaries, never preemptive.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    /// Create an unarmed handle
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the flag
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Releases the single-flight guard when the chunk stream is dropped
struct ActiveGuard(Arc<AtomicBool>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// One cancellable, incremental token stream for a (message, model) pair
pub struct StreamingSession {
    provider: Arc<dyn CompletionProvider>,
    chunk_timeout: Duration,
    cancel: CancelHandle,
    content: Arc<Mutex<String>>,
    active: Arc<AtomicBool>,
}

impl StreamingSession {
    /// Create a session with its own cancel handle
    pub fn new(provider: Arc<dyn CompletionProvider>, chunk_timeout: Duration) -> Self {
        Self::with_cancel_handle(provider, chunk_timeout, CancelHandle::new())
    }

    /// Create a session sharing an external cancel handle
    ///
    /// Used by the multi-model dispatcher so one cancel stops every pane.
    pub fn with_cancel_handle(
        provider: Arc<dyn CompletionProvider>,
        chunk_timeout: Duration,
        cancel: CancelHandle,
    ) -> Self {
        Self {
            provider,
            chunk_timeout,
            cancel,
            content: Arc::new(Mutex::new(String::new())),
            active: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Handle that cancels this session's stream
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Snapshot of the text accumulated so far
    pub fn content(&self) -> String {
        self.content.lock().unwrap().clone()
    }

    /// Whether a stream is currently in flight
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Start streaming one completion
    ///
    /// The returned sequence is lazy, finite, and consumed once. Each
    /// `Text` chunk is appended to the accumulator before it is yielded;
    /// accumulate-and-check-cancel is one indivisible step. Uncancelled
    /// runs end with exactly one `Complete` or `Error`; once the cancel
    /// handle is armed, remaining chunks are dropped silently and no
    /// terminal is forced.
    pub async fn start(&self, request: CompletionRequest) -> Result<ChunkStream> {
        if self
            .active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(ConfabError::Session(
                "a stream is already active on this session".to_string(),
            ));
        }

        let guard = ActiveGuard(Arc::clone(&self.active));
        self.content.lock().unwrap().clear();

        tracing::debug!(
            target: "confab.chat.streaming",
            model = %request.model,
            message_count = request.messages.len(),
            "starting completion stream"
        );

        // Provider-level failures become terminal Error chunks, never faults.
        let mut upstream: ChunkStream = match self.provider.stream_completion(request).await {
            Ok(stream) => Box::pin(stream.map(|item| match item {
                Ok(chunk) => chunk,
                Err(e) => StreamChunk::Error(e.to_string()),
            })),
            Err(e) => {
                tracing::warn!(
                    target: "confab.chat.streaming",
                    error = %e,
                    "provider rejected completion request"
                );
                Box::pin(futures::stream::iter(vec![StreamChunk::Error(
                    e.to_string(),
                )]))
            }
        };

        let cancel = self.cancel.clone();
        let content = Arc::clone(&self.content);
        let chunk_timeout = self.chunk_timeout;

        let stream = async_stream::stream! {
            let _guard = guard;
            loop {
                let next = match timeout(chunk_timeout, upstream.next()).await {
                    Ok(item) => item,
                    Err(_) => {
                        if cancel.is_cancelled() {
                            break;
                        }
                        tracing::warn!(
                            target: "confab.chat.streaming",
                            timeout_ms = chunk_timeout.as_millis() as u64,
                            "provider idle timeout"
                        );
                        yield StreamChunk::Error(
                            "timed out waiting for model output".to_string(),
                        );
                        break;
                    }
                };

                let Some(chunk) = next else {
                    // Upstream ended without a terminal chunk; close the
                    // sequence ourselves so the contract holds.
                    if !cancel.is_cancelled() {
                        yield StreamChunk::Complete;
                    }
                    break;
                };

                if cancel.is_cancelled() {
                    break;
                }

                match chunk {
                    StreamChunk::Text(delta) => {
                        content.lock().unwrap().push_str(&delta);
                        yield StreamChunk::Text(delta);
                    }
                    StreamChunk::Complete => {
                        yield StreamChunk::Complete;
                        break;
                    }
                    StreamChunk::Error(message) => {
                        tracing::warn!(
                            target: "confab.chat.streaming",
                            error = %message,
                            "provider stream failed"
                        );
                        yield StreamChunk::Error(message);
                        break;
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::message::Message;
    use crate::error::ProviderError;
    use crate::llm::mock_provider::{MockOutcome, MockProvider};
    use uuid::Uuid;

    const TEST_TIMEOUT: Duration = Duration::from_millis(200);

    fn request() -> CompletionRequest {
        CompletionRequest::new(
            "mock-model",
            vec![Message::user(Uuid::new_v4(), "hi")],
            "sk-test-0123456789abcdef",
        )
    }

    #[tokio::test]
    async fn test_accumulator_grows_in_emission_order() {
        let provider = Arc::new(
            MockProvider::new().with_outcome(MockOutcome::reply(&["a", "b", "c"])),
        );
        let session = StreamingSession::new(provider, TEST_TIMEOUT);

        let mut stream = session.start(request()).await.unwrap();
        let mut observed = vec![];
        let mut chunks = vec![];
        while let Some(chunk) = stream.next().await {
            observed.push(session.content());
            chunks.push(chunk);
        }

        assert_eq!(observed, vec!["a", "ab", "abc", "abc"]);
        assert_eq!(chunks.last(), Some(&StreamChunk::Complete));
        assert!(!chunks.iter().any(|c| matches!(c, StreamChunk::Error(_))));
    }

    #[tokio::test]
    async fn test_cancel_drops_remaining_chunks_silently() {
        let provider = Arc::new(
            MockProvider::new().with_outcome(MockOutcome::reply(&["a", "b", "c"])),
        );
        let session = StreamingSession::new(provider, TEST_TIMEOUT);
        let cancel = session.cancel_handle();

        let mut stream = session.start(request()).await.unwrap();
        assert_eq!(
            stream.next().await,
            Some(StreamChunk::Text("a".to_string()))
        );
        assert_eq!(
            stream.next().await,
            Some(StreamChunk::Text("b".to_string()))
        );

        cancel.cancel();

        // No third chunk, no terminal; accumulated text survives.
        assert_eq!(stream.next().await, None);
        assert_eq!(session.content(), "ab");
    }

    #[tokio::test]
    async fn test_provider_error_is_terminal_chunk() {
        let provider = Arc::new(
            MockProvider::new().with_outcome(MockOutcome::error_after(&["part"], "overloaded")),
        );
        let session = StreamingSession::new(provider, TEST_TIMEOUT);

        let mut stream = session.start(request()).await.unwrap();
        let mut chunks = vec![];
        while let Some(chunk) = stream.next().await {
            chunks.push(chunk);
        }

        assert_eq!(
            chunks,
            vec![
                StreamChunk::Text("part".to_string()),
                StreamChunk::Error("overloaded".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_rejected_request_surfaces_as_error_chunk() {
        let provider = Arc::new(
            MockProvider::new().with_request_failure(ProviderError::AuthenticationFailed),
        );
        let session = StreamingSession::new(provider, TEST_TIMEOUT);

        let mut stream = session.start(request()).await.unwrap();
        let chunk = stream.next().await.unwrap();
        assert!(matches!(chunk, StreamChunk::Error(_)));
        assert_eq!(stream.next().await, None);
    }

    #[tokio::test]
    async fn test_silent_upstream_end_is_closed_with_complete() {
        let provider =
            Arc::new(MockProvider::new().with_outcome(MockOutcome::silent_end(&["a"])));
        let session = StreamingSession::new(provider, TEST_TIMEOUT);

        let mut stream = session.start(request()).await.unwrap();
        let mut chunks = vec![];
        while let Some(chunk) = stream.next().await {
            chunks.push(chunk);
        }

        assert_eq!(
            chunks,
            vec![StreamChunk::Text("a".to_string()), StreamChunk::Complete]
        );
    }

    #[tokio::test]
    async fn test_idle_timeout_closes_stream_with_error() {
        let provider =
            Arc::new(MockProvider::new().with_outcome(MockOutcome::stall_after(&["x"])));
        let session = StreamingSession::new(provider, Duration::from_millis(100));

        let mut stream = session.start(request()).await.unwrap();
        assert_eq!(
            stream.next().await,
            Some(StreamChunk::Text("x".to_string()))
        );
        match stream.next().await {
            Some(StreamChunk::Error(message)) => assert!(message.contains("timed out")),
            other => panic!("expected timeout error, got {:?}", other),
        }
        assert_eq!(stream.next().await, None);
    }

    #[tokio::test]
    async fn test_second_start_while_active_is_rejected() {
        let provider = Arc::new(MockProvider::new());
        let session = StreamingSession::new(provider, TEST_TIMEOUT);

        let _stream = session.start(request()).await.unwrap();
        assert!(session.is_active());

        let second = session.start(request()).await;
        assert!(matches!(second, Err(ConfabError::Session(_))));
    }

    #[tokio::test]
    async fn test_session_is_released_after_stream_ends() {
        let provider = Arc::new(MockProvider::new().with_outcome(MockOutcome::reply(&["a"])));
        let session = StreamingSession::new(provider, TEST_TIMEOUT);

        {
            let mut stream = session.start(request()).await.unwrap();
            while stream.next().await.is_some() {}
        }
        assert!(!session.is_active());

        // A fresh stream starts from an empty accumulator.
        let mut stream = session.start(request()).await.unwrap();
        let _ = stream.next().await;
        assert_eq!(session.content(), "a");
    }
}
