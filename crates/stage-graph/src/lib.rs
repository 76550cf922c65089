// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # stage-graph
//!
//! Dependency graph of a traced model, annotated with pipeline stages.
//!
//! - [`Node`] / [`NodeKind`]: one traced computation point.
//! - [`StageGraph`]: the DAG, with a **type-state pattern**
//!   (`Building` → `Validated`).
//! - [`StagePartition`]: layer nodes grouped by stage, ready for assembly.
//! - [`GraphDescription`]: the JSON interchange format.
//!
//! # Example
//! ```
//! use stage_graph::{NodeKind, StageGraph};
//!
//! let mut graph = StageGraph::new("tiny");
//! graph.add_node("x", NodeKind::Input, vec![], vec![]).unwrap();
//! graph.add_node("fc", NodeKind::Layer, vec!["x".into()], vec![]).unwrap();
//! graph.assign_stage("fc", 0).unwrap();
//!
//! let graph = graph.validate().unwrap();
//! let partition = graph.partition().unwrap();
//! assert_eq!(partition.num_stages(), 1);
//! ```

mod description;
mod error;
pub mod graph;
mod node;
mod partition;

pub use description::GraphDescription;
pub use error::GraphError;
pub use graph::{Building, GraphState, StageGraph, Validated};
pub use node::{Node, NodeKind};
pub use partition::{StagePartition, StageSlice};
