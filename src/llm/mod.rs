// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! LLM module for Confab
//!
//! Provides the completion provider abstraction, token/cost estimation,
//! and the scripted mock provider used by tests.

pub mod mock_provider;
pub mod pricing;
pub mod provider;

pub use pricing::{estimate_tokens, estimate_usage, ModelPricing, PriceTable};
pub use provider::*;
