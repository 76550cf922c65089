// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! JSON graph description.
//!
//! An external tracer or partitioner hands the graph over as JSON:
//!
//! ```json
//! {
//!   "name": "mlp",
//!   "nodes": [
//!     { "id": "input0", "kind": "input" },
//!     { "id": "Net/Linear[fc1]", "kind": "layer", "inputs": ["input0"], "stage": 0, "weight": 1.5 },
//!     { "id": "Net/Linear[fc1]/weight", "kind": "param", "outputs": ["Net/Linear[fc1]"] },
//!     { "id": "output0", "kind": "output", "inputs": ["Net/Linear[fc1]"] }
//!   ]
//! }
//! ```
//!
//! `stage`, `inputs`, `outputs` and `weight` are optional.

use crate::{GraphError, GraphState, Node, StageGraph};
use std::path::Path;

/// Serialized form of a [`StageGraph`].
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct GraphDescription {
    /// Graph name.
    pub name: String,
    /// Nodes in insertion order.
    pub nodes: Vec<Node>,
}

impl GraphDescription {
    /// Loads a description from a JSON file path.
    pub fn from_file(path: &Path) -> Result<Self, GraphError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Parses a description from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, GraphError> {
        let description: Self = serde_json::from_str(json)?;
        Ok(description)
    }

    /// Serializes the description as pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, GraphError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Builds an unvalidated graph. Fails only on duplicate identifiers.
    pub fn into_graph(self) -> Result<StageGraph, GraphError> {
        let mut graph = StageGraph::new(self.name);
        for node in self.nodes {
            graph.insert(node)?;
        }
        tracing::debug!(
            graph = %graph.name,
            nodes = graph.num_nodes(),
            "built stage graph from description",
        );
        Ok(graph)
    }
}

impl<S: GraphState> StageGraph<S> {
    /// Captures the graph, including stage assignments, as a description.
    pub fn describe(&self) -> GraphDescription {
        GraphDescription {
            name: self.name.clone(),
            nodes: self.nodes().to_vec(),
        }
    }
}
