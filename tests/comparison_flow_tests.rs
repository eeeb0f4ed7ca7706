// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use uuid::Uuid;

use confab::chat::{ConversationStore, InMemoryConversationStore};
use confab::compare::{
    ComparisonError, ComparisonSetManager, CompareSendError, DispatchEvent, ModelResponse,
    MultiModelDispatcher,
};
use confab::config::{PriceOverride, Settings};
use confab::llm::mock_provider::{MockOutcome, MockProvider};
use confab::llm::provider::ModelInfo;

const TEST_CREDENTIAL: &str = "sk-test-0123456789abcdef";

fn test_settings() -> Settings {
    let mut settings = Settings::default();
    settings.streaming.chunk_timeout_ms = 200;
    settings
}

fn dispatcher_with(provider: MockProvider, settings: &Settings) -> MultiModelDispatcher {
    let store: Arc<dyn ConversationStore> = Arc::new(InMemoryConversationStore::new());
    MultiModelDispatcher::new(Arc::new(provider), store, settings)
}

#[tokio::test]
async fn selection_drives_a_comparison_round() {
    let settings = test_settings();
    let mut manager = ComparisonSetManager::new(
        Arc::new(settings.price_table()),
        settings.comparison.max_models,
        settings.comparison.projection_tokens,
    );

    manager.activate();
    assert_eq!(
        manager.validate_for_send(),
        Err(CompareSendError::NoModelsSelected)
    );

    manager.add_model(ModelInfo::new("m1", "Model One")).unwrap();
    assert_eq!(
        manager.validate_for_send(),
        Err(CompareSendError::InsufficientModels { selected: 1 })
    );

    manager.add_model(ModelInfo::new("m2", "Model Two")).unwrap();
    manager.validate_for_send().unwrap();

    let provider = MockProvider::new()
        .with_model_outcome("m1", MockOutcome::reply(&["one"]))
        .with_model_outcome("m2", MockOutcome::reply(&["two"]));
    let dispatcher = dispatcher_with(provider, &settings);

    let dispatch = dispatcher
        .dispatch(
            Uuid::new_v4(),
            "which of you is best?",
            manager.mode().selected_ids(),
            TEST_CREDENTIAL.to_string(),
        )
        .await
        .unwrap();
    let events: Vec<DispatchEvent> = dispatch.collect().await;

    let completed: Vec<&str> = events
        .iter()
        .filter_map(|e| match e {
            DispatchEvent::ModelComplete { model_id, .. } => Some(model_id.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(completed.len(), 2);
    assert!(completed.contains(&"m1"));
    assert!(completed.contains(&"m2"));
}

#[tokio::test]
async fn renderer_can_aggregate_panes_from_events() {
    let provider = MockProvider::new()
        .with_model_outcome("m1", MockOutcome::reply(&["alpha ", "beta"]))
        .with_model_outcome("m2", MockOutcome::error_after(&["gam"], "m2 crashed"));
    let settings = test_settings();
    let dispatcher = dispatcher_with(provider, &settings);

    let mut dispatch = dispatcher
        .dispatch(
            Uuid::new_v4(),
            "compare",
            vec!["m1".to_string(), "m2".to_string()],
            TEST_CREDENTIAL.to_string(),
        )
        .await
        .unwrap();

    // Drive the pane map exactly the way a comparison screen would.
    let mut panes: HashMap<String, ModelResponse> = HashMap::new();
    let mut closed = false;
    while let Some(event) = dispatch.next().await {
        match event {
            DispatchEvent::Started { model_ids } => {
                for id in model_ids {
                    panes.insert(id.clone(), ModelResponse::pending(id, String::new()));
                }
            }
            DispatchEvent::ModelStarted {
                model_id,
                model_name,
            } => {
                if let Some(pane) = panes.get_mut(&model_id) {
                    pane.model_name = model_name;
                }
            }
            DispatchEvent::Chunk {
                model_id, delta, ..
            } => {
                panes.get_mut(&model_id).unwrap().record_delta(&delta);
            }
            DispatchEvent::ModelComplete { model_id, response } => {
                panes.insert(model_id, response);
            }
            DispatchEvent::ModelError { model_id, error } => {
                panes.get_mut(&model_id).unwrap().fail(error);
            }
            DispatchEvent::AllComplete { .. } => closed = true,
        }
    }

    assert!(closed);
    assert_eq!(panes.len(), 2);

    let m1 = &panes["m1"];
    assert!(m1.is_complete);
    assert_eq!(m1.content, "alpha beta");
    assert!(m1.usage.is_some());

    // The failed pane kept its partial text and carries the error.
    let m2 = &panes["m2"];
    assert!(!m2.is_complete);
    assert_eq!(m2.content, "gam");
    assert_eq!(m2.error.as_deref(), Some("m2 crashed"));
}

#[tokio::test]
async fn four_models_complete_in_any_order() {
    let provider = MockProvider::new()
        .with_outcome(MockOutcome::reply(&["shared reply"]))
        .with_chunk_delay(Duration::from_millis(5));
    let settings = test_settings();
    let dispatcher = dispatcher_with(provider, &settings);
    let ids: Vec<String> = (1..=4).map(|i| format!("m{i}")).collect();

    let dispatch = dispatcher
        .dispatch(Uuid::new_v4(), "fan out", ids.clone(), TEST_CREDENTIAL.to_string())
        .await
        .unwrap();
    let events: Vec<DispatchEvent> = dispatch.collect().await;

    assert!(matches!(events.first(), Some(DispatchEvent::Started { .. })));
    assert!(matches!(events.last(), Some(DispatchEvent::AllComplete { .. })));

    let mut completed: Vec<String> = events
        .iter()
        .filter_map(|e| match e {
            DispatchEvent::ModelComplete { model_id, .. } => Some(model_id.clone()),
            _ => None,
        })
        .collect();
    completed.sort();
    assert_eq!(completed, ids);
}

#[test]
fn projection_uses_configured_overrides() {
    let mut settings = test_settings();
    settings.pricing.overrides.push(PriceOverride {
        pattern: "m1".to_string(),
        input_per_1k: 0.002,
        output_per_1k: 0.004,
    });

    let mut manager = ComparisonSetManager::new(
        Arc::new(settings.price_table()),
        settings.comparison.max_models,
        settings.comparison.projection_tokens,
    );
    manager.activate();
    manager.add_model(ModelInfo::new("m1", "Model One")).unwrap();

    // 500/1000 * 0.002 + 500/1000 * 0.004
    assert!((manager.mode().total_estimated_cost - 0.003).abs() < 1e-12);
}

#[test]
fn capacity_and_duplicates_are_enforced_together() {
    let settings = test_settings();
    let mut manager = ComparisonSetManager::new(
        Arc::new(settings.price_table()),
        settings.comparison.max_models,
        settings.comparison.projection_tokens,
    );
    manager.activate();

    for i in 1..=4 {
        manager
            .add_model(ModelInfo::new(format!("m{i}"), format!("Model {i}")))
            .unwrap();
    }

    assert_eq!(
        manager.add_model(ModelInfo::new("m1", "Model One")),
        Err(ComparisonError::CapacityExceeded { max: 4 })
    );

    manager.remove_model("m1");
    assert_eq!(
        manager.add_model(ModelInfo::new("m2", "Model Two")),
        Err(ComparisonError::DuplicateModel("m2".to_string()))
    );
    assert_eq!(manager.mode().selected_models.len(), 3);
}
