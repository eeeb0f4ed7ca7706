// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Comparison set management
//!
//! Pure state transitions over the set of models under comparison:
//! activation, add/remove with capacity and duplicate constraints, and the
//! pre-send cost projection shown to the user.

use std::sync::Arc;
use thiserror::Error;

use crate::llm::pricing::PriceTable;
use crate::llm::provider::ModelInfo;

/// The set of models under comparison
#[derive(Debug, Clone)]
pub struct ComparisonMode {
    /// Whether comparison mode is on
    pub is_active: bool,
    /// Selected models, insertion order = display order
    pub selected_models: Vec<ModelInfo>,
    /// Ceiling on selected models
    pub max_models: usize,
    /// Projected cost of one comparison round across the selection
    pub total_estimated_cost: f64,
}

impl ComparisonMode {
    fn new(max_models: usize) -> Self {
        Self {
            is_active: false,
            selected_models: Vec::new(),
            max_models,
            total_estimated_cost: 0.0,
        }
    }

    /// Ids of the selected models, in display order
    pub fn selected_ids(&self) -> Vec<String> {
        self.selected_models.iter().map(|m| m.id.clone()).collect()
    }
}

/// Why a model could not be added
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ComparisonError {
    /// The selection is already at its ceiling
    #[error("comparison set is full ({max} models max)")]
    CapacityExceeded { max: usize },

    /// The model is already selected
    #[error("model {0} is already selected")]
    DuplicateModel(String),
}

/// Why a comparison round cannot be sent
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompareSendError {
    /// Comparison mode is off
    #[error("comparison mode is not active")]
    NotActive,

    /// Nothing selected
    #[error("no models selected")]
    NoModelsSelected,

    /// Comparison needs at least two models
    #[error("comparison requires at least 2 models, {selected} selected")]
    InsufficientModels { selected: usize },
}

/// State machine over the comparison selection
pub struct ComparisonSetManager {
    mode: ComparisonMode,
    prices: Arc<PriceTable>,
    projection_tokens: u32,
}

impl ComparisonSetManager {
    /// Create a manager
    pub fn new(prices: Arc<PriceTable>, max_models: usize, projection_tokens: u32) -> Self {
        Self {
            mode: ComparisonMode::new(max_models),
            prices,
            projection_tokens,
        }
    }

    /// Current mode snapshot
    pub fn mode(&self) -> &ComparisonMode {
        &self.mode
    }

    /// Turn comparison mode on
    pub fn activate(&mut self) {
        self.mode.is_active = true;
    }

    /// Turn comparison mode off and clear the selection
    pub fn deactivate(&mut self) {
        self.mode.is_active = false;
        self.mode.selected_models.clear();
        self.mode.total_estimated_cost = 0.0;
    }

    /// Add a model to the selection
    pub fn add_model(&mut self, model: ModelInfo) -> Result<(), ComparisonError> {
        if self.mode.selected_models.len() >= self.mode.max_models {
            return Err(ComparisonError::CapacityExceeded {
                max: self.mode.max_models,
            });
        }
        if self.mode.selected_models.iter().any(|m| m.id == model.id) {
            return Err(ComparisonError::DuplicateModel(model.id));
        }
        self.mode.selected_models.push(model);
        self.recompute_cost();
        Ok(())
    }

    /// Remove a model by id; absent ids are a no-op success
    pub fn remove_model(&mut self, model_id: &str) -> bool {
        let before = self.mode.selected_models.len();
        self.mode.selected_models.retain(|m| m.id != model_id);
        let removed = self.mode.selected_models.len() < before;
        if removed {
            self.recompute_cost();
        }
        removed
    }

    /// Check whether a comparison round may be sent
    pub fn validate_for_send(&self) -> Result<(), CompareSendError> {
        if !self.mode.is_active {
            return Err(CompareSendError::NotActive);
        }
        match self.mode.selected_models.len() {
            0 => Err(CompareSendError::NoModelsSelected),
            1 => Err(CompareSendError::InsufficientModels { selected: 1 }),
            _ => Ok(()),
        }
    }

    /// Projected cost of a canonical exchange across the selection
    fn recompute_cost(&mut self) {
        self.mode.total_estimated_cost = self
            .mode
            .selected_models
            .iter()
            .map(|m| {
                self.prices
                    .projected_exchange_cost(&m.id, self.projection_tokens)
            })
            .sum();
    }
}
