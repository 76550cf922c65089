// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for the pipeline runtime.

use crate::{PipelineState, UnitError};

/// Errors that can occur while building or driving a pipeline.
///
/// None of these are transient: each one reflects a caller contract
/// violation or a structurally invalid input.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Bad construction-time shape or configuration value.
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Backward was invoked on a stage with no pending forward record.
    #[error("stage {stage}: backward called with no pending activation")]
    CacheUnderflow { stage: usize },

    /// A stage was asked to retain more records than its cache allows.
    #[error("stage {stage}: activation cache is full ({capacity} entries)")]
    CacheOverflow { stage: usize, capacity: usize },

    /// An operation was called in a state that does not permit it.
    #[error("cannot call {operation} while pipeline is {state}")]
    SequenceError {
        operation: &'static str,
        state: PipelineState,
    },

    /// The supplied stage graph is structurally invalid.
    #[error("graph error: {0}")]
    GraphError(#[from] stage_graph::GraphError),

    /// A batch-level tensor operation (split, concat, loss) failed.
    #[error("tensor error: {0}")]
    TensorError(#[from] tensor_core::TensorError),

    /// A stage's computation unit failed.
    #[error("stage {stage} unit '{unit}' failed: {source}")]
    UnitError {
        stage: usize,
        unit: String,
        #[source]
        source: UnitError,
    },
}
