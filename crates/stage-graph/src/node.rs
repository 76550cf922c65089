// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Node definitions for the stage graph.
//!
//! A [`Node`] is one traced computation point: a layer, a parameter or
//! buffer it reads, or a graph input/output. Edges are not stored
//! separately; they are implied by the `inputs` and `outputs` identifier
//! lists.

/// The role a node plays in the traced computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// A computation that will be executed inside some stage.
    Layer,
    /// A parameter or buffer read by a layer.
    #[serde(alias = "param", alias = "buffer")]
    BufferOrParam,
    /// A graph input.
    Input,
    /// A graph output.
    Output,
}

impl NodeKind {
    /// Returns a human-readable label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Layer => "layer",
            Self::BufferOrParam => "buffer_or_param",
            Self::Input => "input",
            Self::Output => "output",
        }
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single node of a [`crate::StageGraph`].
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Node {
    /// Stable, scope-qualified identifier (e.g. `"Net/Sequential[body]/Linear[0]"`).
    pub id: String,
    /// What this node represents.
    pub kind: NodeKind,
    /// Pipeline stage this node is assigned to, once partitioned.
    #[serde(default)]
    pub stage: Option<usize>,
    /// Identifiers of the nodes this node consumes, in argument order.
    #[serde(default)]
    pub inputs: Vec<String>,
    /// Identifiers of the nodes consuming this node's result.
    #[serde(default)]
    pub outputs: Vec<String>,
    /// Optional cost estimate supplied by an external profiler.
    #[serde(default)]
    pub weight: Option<f64>,
}

impl Node {
    /// Returns `true` for [`NodeKind::Layer`] nodes.
    pub fn is_layer(&self) -> bool {
        self.kind == NodeKind::Layer
    }

    /// The cost weight, treating a missing weight as zero.
    pub fn weight_or_zero(&self) -> f64 {
        self.weight.unwrap_or(0.0)
    }

    /// Returns a concise summary string for display.
    pub fn summary(&self) -> String {
        let stage = self
            .stage
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string());
        format!(
            "{} ({}) stage {} <- [{}]",
            self.id,
            self.kind,
            stage,
            self.inputs.join(", "),
        )
    }
}
