// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Stage partition: the layer nodes of a validated graph grouped by stage.
//!
//! A partition is the contract between graph analysis and stage assembly.
//! Stage `i` holds the layers that run on device `i`, in topological order.

use crate::GraphError;
use std::collections::HashSet;
use std::fmt;

/// The layers assigned to a single pipeline stage.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct StageSlice {
    /// Index of this stage in pipeline order.
    pub stage_index: usize,
    /// Layer node identifiers, in topological order.
    pub node_ids: Vec<String>,
    /// Sum of the layer weights in this stage.
    pub total_weight: f64,
}

impl StageSlice {
    /// Returns the number of layers in this stage.
    pub fn num_layers(&self) -> usize {
        self.node_ids.len()
    }
}

/// All stages of a partitioned graph.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct StagePartition {
    /// Name of the graph this partition was derived from.
    pub graph_name: String,
    /// Ordered stage slices.
    pub stages: Vec<StageSlice>,
}

impl StagePartition {
    /// Creates a partition from pre-built slices without checking them.
    pub fn new(graph_name: impl Into<String>, stages: Vec<StageSlice>) -> Self {
        Self {
            graph_name: graph_name.into(),
            stages,
        }
    }

    /// Returns the number of stages.
    pub fn num_stages(&self) -> usize {
        self.stages.len()
    }

    /// Returns the total number of layers across all stages.
    pub fn total_layers(&self) -> usize {
        self.stages.iter().map(StageSlice::num_layers).sum()
    }

    /// Returns a stage slice by index.
    pub fn stage(&self, index: usize) -> Option<&StageSlice> {
        self.stages.get(index)
    }

    /// Iterates the stage slices in pipeline order.
    pub fn iter(&self) -> impl Iterator<Item = &StageSlice> {
        self.stages.iter()
    }

    /// Ratio of the heaviest stage weight to the mean stage weight.
    ///
    /// Returns `1.0` for an empty or zero-weight partition.
    pub fn imbalance(&self) -> f64 {
        let total: f64 = self.stages.iter().map(|s| s.total_weight).sum();
        if self.stages.is_empty() || total <= 0.0 {
            return 1.0;
        }
        let mean = total / self.stages.len() as f64;
        let max = self
            .stages
            .iter()
            .map(|s| s.total_weight)
            .fold(0.0_f64, f64::max);
        max / mean
    }

    /// Validates the partition.
    ///
    /// Checks:
    /// - Partition is non-empty.
    /// - Stage indices are consecutive starting from 0.
    /// - No stage is empty.
    /// - No layer appears in more than one stage.
    pub fn validate(&self) -> Result<(), GraphError> {
        if self.stages.is_empty() {
            return Err(GraphError::InvalidPartition(format!(
                "graph '{}' has no layer nodes",
                self.graph_name,
            )));
        }

        let mut seen: HashSet<&str> = HashSet::new();
        for (expected, slice) in self.stages.iter().enumerate() {
            if slice.stage_index != expected {
                return Err(GraphError::InvalidPartition(format!(
                    "expected stage index {expected}, got {}",
                    slice.stage_index,
                )));
            }
            if slice.node_ids.is_empty() {
                return Err(GraphError::InvalidPartition(format!(
                    "stage {expected} is empty"
                )));
            }
            for id in &slice.node_ids {
                if !seen.insert(id.as_str()) {
                    return Err(GraphError::InvalidPartition(format!(
                        "layer '{id}' appears in more than one stage"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Returns a human-readable summary of the partition.
    pub fn summary(&self) -> String {
        let mut s = format!(
            "Partition of '{}': {} stages, {} layers, imbalance {:.2}\n",
            self.graph_name,
            self.num_stages(),
            self.total_layers(),
            self.imbalance(),
        );
        for slice in &self.stages {
            s.push_str(&format!(
                "  Stage {}: {} layers, weight {:.2}\n",
                slice.stage_index,
                slice.num_layers(),
                slice.total_weight,
            ));
        }
        s
    }
}

impl fmt::Display for StagePartition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())
    }
}
