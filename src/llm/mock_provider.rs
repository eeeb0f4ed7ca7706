// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Mock completion provider for testing
//!
//! Provides a configurable, scripted implementation of the
//! CompletionProvider trait that can be used in unit and integration tests
//! without network access.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::{ProviderError, Result};
use crate::llm::provider::{
    CompletionProvider, CompletionRequest, ModelInfo, ProviderStream, StreamChunk,
};

/// How a scripted stream ends after its text chunks
#[derive(Clone, Debug)]
pub enum MockEnding {
    /// Terminate with `StreamChunk::Complete`
    Complete,
    /// Terminate with `StreamChunk::Error`
    Error(String),
    /// Never terminate (exercises idle-timeout handling)
    Stall,
    /// End the stream without any terminal chunk
    Silent,
}

/// A scripted streaming outcome
#[derive(Clone, Debug)]
pub struct MockOutcome {
    /// Text deltas emitted in order
    pub chunks: Vec<String>,
    /// How the stream ends
    pub ending: MockEnding,
}

impl MockOutcome {
    /// A normal reply streamed as the given deltas
    pub fn reply(chunks: &[&str]) -> Self {
        Self {
            chunks: chunks.iter().map(|c| c.to_string()).collect(),
            ending: MockEnding::Complete,
        }
    }

    /// A normal reply, chunked ten characters at a time
    pub fn reply_text(text: &str) -> Self {
        let chunks = text
            .chars()
            .collect::<Vec<_>>()
            .chunks(10)
            .map(|c| c.iter().collect::<String>())
            .collect();
        Self {
            chunks,
            ending: MockEnding::Complete,
        }
    }

    /// Deltas followed by a provider error
    pub fn error_after(chunks: &[&str], message: &str) -> Self {
        Self {
            chunks: chunks.iter().map(|c| c.to_string()).collect(),
            ending: MockEnding::Error(message.to_string()),
        }
    }

    /// Deltas followed by an unbounded stall
    pub fn stall_after(chunks: &[&str]) -> Self {
        Self {
            chunks: chunks.iter().map(|c| c.to_string()).collect(),
            ending: MockEnding::Stall,
        }
    }

    /// Deltas followed by stream end with no terminal chunk
    pub fn silent_end(chunks: &[&str]) -> Self {
        Self {
            chunks: chunks.iter().map(|c| c.to_string()).collect(),
            ending: MockEnding::Silent,
        }
    }
}

impl Default for MockOutcome {
    fn default() -> Self {
        Self::reply_text("Mock response")
    }
}

/// A mock completion provider for testing
#[derive(Clone)]
pub struct MockProvider {
    /// Provider name
    name: String,
    /// Scripted outcomes, consumed in order (last one repeats)
    outcomes: Arc<Mutex<Vec<MockOutcome>>>,
    /// Per-model overrides, checked before the shared script
    model_outcomes: Arc<Mutex<HashMap<String, MockOutcome>>>,
    /// Reject every request with this error instead of streaming
    request_failure: Arc<Mutex<Option<ProviderError>>>,
    /// Call counter
    call_count: Arc<AtomicUsize>,
    /// Recorded requests
    recorded_requests: Arc<Mutex<Vec<CompletionRequest>>>,
    /// Available models
    models: Vec<ModelInfo>,
    /// Optional pause before each emitted chunk
    chunk_delay: Option<Duration>,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockProvider {
    /// Create a new mock provider
    pub fn new() -> Self {
        Self {
            name: "mock".to_string(),
            outcomes: Arc::new(Mutex::new(vec![MockOutcome::default()])),
            model_outcomes: Arc::new(Mutex::new(HashMap::new())),
            request_failure: Arc::new(Mutex::new(None)),
            call_count: Arc::new(AtomicUsize::new(0)),
            recorded_requests: Arc::new(Mutex::new(vec![])),
            models: vec![ModelInfo::new("mock-model", "Mock Model")],
            chunk_delay: None,
        }
    }

    /// Create a mock provider with a custom name
    pub fn with_name(name: impl Into<String>) -> Self {
        let mut provider = Self::new();
        provider.name = name.into();
        provider
    }

    /// Replace the script with a single outcome
    pub fn with_outcome(self, outcome: MockOutcome) -> Self {
        {
            let mut outcomes = self.outcomes.lock().unwrap();
            outcomes.clear();
            outcomes.push(outcome);
        }
        self
    }

    /// Queue multiple outcomes (returned in order, last repeats)
    pub fn with_outcomes(self, queued: Vec<MockOutcome>) -> Self {
        {
            let mut outcomes = self.outcomes.lock().unwrap();
            *outcomes = queued;
        }
        self
    }

    /// Script a specific model, overriding the shared script
    pub fn with_model_outcome(self, model_id: impl Into<String>, outcome: MockOutcome) -> Self {
        self.model_outcomes
            .lock()
            .unwrap()
            .insert(model_id.into(), outcome);
        self
    }

    /// Reject every request with the given error
    pub fn with_request_failure(self, error: ProviderError) -> Self {
        *self.request_failure.lock().unwrap() = Some(error);
        self
    }

    /// Replace the model catalog
    pub fn with_models(mut self, models: Vec<ModelInfo>) -> Self {
        self.models = models;
        self
    }

    /// Pause before each emitted chunk
    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = Some(delay);
        self
    }

    /// Get the number of times stream_completion() was called
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Get all recorded requests
    pub fn recorded_requests(&self) -> Vec<CompletionRequest> {
        self.recorded_requests.lock().unwrap().clone()
    }

    /// Get the last request made
    pub fn last_request(&self) -> Option<CompletionRequest> {
        self.recorded_requests.lock().unwrap().last().cloned()
    }

    /// Reset call count and recorded requests
    pub fn reset(&self) {
        self.call_count.store(0, Ordering::SeqCst);
        self.recorded_requests.lock().unwrap().clear();
    }

    /// Pick the outcome for this call
    fn next_outcome(&self, model: &str) -> MockOutcome {
        let count = self.call_count.fetch_add(1, Ordering::SeqCst);

        if let Some(outcome) = self.model_outcomes.lock().unwrap().get(model) {
            return outcome.clone();
        }

        let outcomes = self.outcomes.lock().unwrap();
        if outcomes.is_empty() {
            MockOutcome::default()
        } else {
            outcomes[count.min(outcomes.len() - 1)].clone()
        }
    }
}

#[async_trait]
impl CompletionProvider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn available_models(&self) -> Vec<ModelInfo> {
        self.models.clone()
    }

    async fn stream_completion(&self, request: CompletionRequest) -> Result<ProviderStream> {
        self.recorded_requests.lock().unwrap().push(request.clone());

        if let Some(error) = self.request_failure.lock().unwrap().clone() {
            self.call_count.fetch_add(1, Ordering::SeqCst);
            return Err(error.into());
        }

        let outcome = self.next_outcome(&request.model);
        let delay = self.chunk_delay;

        let stream = async_stream::stream! {
            for chunk in outcome.chunks {
                if let Some(pause) = delay {
                    tokio::time::sleep(pause).await;
                }
                yield Ok(StreamChunk::Text(chunk));
            }
            match outcome.ending {
                MockEnding::Complete => yield Ok(StreamChunk::Complete),
                MockEnding::Error(message) => yield Ok(StreamChunk::Error(message)),
                MockEnding::Stall => {
                    futures::future::pending::<()>().await;
                }
                MockEnding::Silent => {}
            }
        };

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::message::Message;
    use futures::StreamExt;
    use uuid::Uuid;

    fn request(model: &str) -> CompletionRequest {
        CompletionRequest::new(model, vec![Message::user(Uuid::new_v4(), "Test")], "sk-test")
    }

    async fn collect(provider: &MockProvider, model: &str) -> Vec<StreamChunk> {
        let mut stream = provider.stream_completion(request(model)).await.unwrap();
        let mut chunks = vec![];
        while let Some(chunk) = stream.next().await {
            chunks.push(chunk.unwrap());
        }
        chunks
    }

    #[test]
    fn test_mock_provider_creation() {
        let provider = MockProvider::new();
        assert_eq!(provider.name(), "mock");
        assert_eq!(provider.call_count(), 0);
        assert!(provider.supports_model("mock-model"));
        assert!(!provider.supports_model("unknown-model"));
    }

    #[test]
    fn test_mock_provider_with_name() {
        let provider = MockProvider::with_name("aggregator");
        assert_eq!(provider.name(), "aggregator");
    }

    #[tokio::test]
    async fn test_mock_provider_streams_scripted_reply() {
        let provider = MockProvider::new().with_outcome(MockOutcome::reply(&["Hel", "lo"]));

        let chunks = collect(&provider, "mock-model").await;
        assert_eq!(
            chunks,
            vec![
                StreamChunk::Text("Hel".to_string()),
                StreamChunk::Text("lo".to_string()),
                StreamChunk::Complete,
            ]
        );
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_provider_error_ending() {
        let provider =
            MockProvider::new().with_outcome(MockOutcome::error_after(&["partial"], "overloaded"));

        let chunks = collect(&provider, "mock-model").await;
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1], StreamChunk::Error("overloaded".to_string()));
    }

    #[tokio::test]
    async fn test_mock_provider_silent_ending() {
        let provider = MockProvider::new().with_outcome(MockOutcome::silent_end(&["a"]));

        let chunks = collect(&provider, "mock-model").await;
        assert_eq!(chunks, vec![StreamChunk::Text("a".to_string())]);
    }

    #[tokio::test]
    async fn test_mock_provider_request_failure() {
        let provider = MockProvider::new().with_request_failure(ProviderError::RateLimited(5));

        let result = provider.stream_completion(request("mock-model")).await;
        assert!(result.is_err());
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_provider_per_model_override() {
        let provider = MockProvider::new()
            .with_outcome(MockOutcome::reply(&["shared"]))
            .with_model_outcome("m1", MockOutcome::error_after(&[], "m1 down"));

        let m1 = collect(&provider, "m1").await;
        let other = collect(&provider, "mock-model").await;

        assert_eq!(m1, vec![StreamChunk::Error("m1 down".to_string())]);
        assert_eq!(other[0], StreamChunk::Text("shared".to_string()));
    }

    #[tokio::test]
    async fn test_mock_provider_outcome_queue_repeats_last() {
        let provider = MockProvider::new().with_outcomes(vec![
            MockOutcome::reply(&["first"]),
            MockOutcome::reply(&["second"]),
        ]);

        let first = collect(&provider, "mock-model").await;
        let second = collect(&provider, "mock-model").await;
        let third = collect(&provider, "mock-model").await;

        assert_eq!(first[0], StreamChunk::Text("first".to_string()));
        assert_eq!(second[0], StreamChunk::Text("second".to_string()));
        assert_eq!(third[0], StreamChunk::Text("second".to_string()));
    }

    #[tokio::test]
    async fn test_mock_provider_records_requests() {
        let provider = MockProvider::new();

        provider
            .stream_completion(request("mock-model"))
            .await
            .unwrap();

        let recorded = provider.recorded_requests();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].model, "mock-model");
        assert_eq!(recorded[0].credential, "sk-test");
    }

    #[tokio::test]
    async fn test_mock_provider_reset() {
        let provider = MockProvider::new();

        provider
            .stream_completion(request("mock-model"))
            .await
            .unwrap();
        assert_eq!(provider.call_count(), 1);

        provider.reset();
        assert_eq!(provider.call_count(), 0);
        assert!(provider.recorded_requests().is_empty());
    }

    #[test]
    fn test_mock_outcome_reply_text_chunking() {
        let outcome = MockOutcome::reply_text("a".repeat(25).as_str());
        assert_eq!(outcome.chunks.len(), 3);
        assert_eq!(outcome.chunks[0].len(), 10);
        assert_eq!(outcome.chunks[2].len(), 5);
    }

    #[test]
    fn test_mock_provider_clone_shares_state() {
        let provider = MockProvider::new();
        let cloned = provider.clone();
        assert!(Arc::ptr_eq(&provider.outcomes, &cloned.outcomes));
    }
}
