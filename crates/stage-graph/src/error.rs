// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for stage graph construction and validation.

/// Structural defects in a [`crate::StageGraph`] or its description.
///
/// All of these are fatal and are meant to be surfaced before any pipeline
/// execution begins.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// The graph contains a cycle; `node` is one of the nodes on it.
    #[error("graph contains a cycle through node '{node}'")]
    Cycle { node: String },

    /// A node references an identifier that is not in the graph.
    #[error("node '{node}' references unknown node '{missing}'")]
    DanglingReference { node: String, missing: String },

    /// A node is assigned an earlier stage than a node upstream of it.
    ///
    /// `input` is the upstream node holding the later stage; it may sit
    /// several edges away when the path runs through unassigned nodes.
    #[error(
        "node '{node}' is assigned stage {stage} but upstream node '{input}' is in later stage {input_stage}"
    )]
    NonMonotonicStage {
        node: String,
        stage: usize,
        input: String,
        input_stage: usize,
    },

    /// A node with this identifier was already added.
    #[error("duplicate node '{0}'")]
    DuplicateNode(String),

    /// An operation referenced a node that does not exist.
    #[error("unknown node '{0}'")]
    UnknownNode(String),

    /// A layer node has no stage assignment, so no partition can be derived.
    #[error("layer node '{node}' has no stage assignment")]
    Unassigned { node: String },

    /// The stage assignment does not form a contiguous partition.
    #[error("invalid partition: {0}")]
    InvalidPartition(String),

    /// The graph description file could not be read.
    #[error("failed to read graph description: {0}")]
    DescriptionRead(#[from] std::io::Error),

    /// The graph description JSON is malformed.
    #[error("failed to parse graph description: {0}")]
    DescriptionParse(#[from] serde_json::Error),
}
