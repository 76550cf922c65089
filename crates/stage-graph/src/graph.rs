// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Stage graph: a traced model as a DAG of nodes annotated with stages.
//!
//! # Type-State Pattern
//!
//! ```text
//! StageGraph<Building>   nodes added, stages being assigned.
//!       │  .validate()
//!       ▼
//! StageGraph<Validated>  acyclic, references resolved, stages monotonic.
//! ```
//!
//! Only a validated graph can be partitioned, and a validated graph is
//! read-only.

use crate::{GraphError, Node, NodeKind, StagePartition, StageSlice};
use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap, HashMap, HashSet};
use std::fmt;

// ── Type-state markers ─────────────────────────────────────────────

/// Marker: graph is still being built.
#[derive(Debug, Clone)]
pub struct Building;

/// Marker: graph has passed validation and is read-only.
#[derive(Debug, Clone)]
pub struct Validated;

/// Sealed trait for graph states.
pub trait GraphState: fmt::Debug + Clone {}
impl GraphState for Building {}
impl GraphState for Validated {}

// ── StageGraph ─────────────────────────────────────────────────────

/// A directed acyclic graph of traced nodes.
///
/// Nodes are kept in insertion order. Edges are implied: `a -> b` exists
/// when `b` lists `a` among its inputs or `a` lists `b` among its outputs.
#[derive(Debug, Clone)]
pub struct StageGraph<S: GraphState = Building> {
    /// Human-readable graph name.
    pub name: String,
    nodes: Vec<Node>,
    index: HashMap<String, usize>,
    /// Topological order as node positions; filled on validation.
    order: Vec<usize>,
    _state: std::marker::PhantomData<S>,
}

// ── Building state ─────────────────────────────────────────────────

impl StageGraph<Building> {
    /// Creates an empty graph.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: Vec::new(),
            index: HashMap::new(),
            order: Vec::new(),
            _state: std::marker::PhantomData,
        }
    }

    /// Adds a node with no stage assignment and no weight.
    ///
    /// Returns a mutable handle so callers can attach a weight or stage.
    pub fn add_node(
        &mut self,
        id: impl Into<String>,
        kind: NodeKind,
        inputs: Vec<String>,
        outputs: Vec<String>,
    ) -> Result<&mut Node, GraphError> {
        self.insert(Node {
            id: id.into(),
            kind,
            stage: None,
            inputs,
            outputs,
            weight: None,
        })
    }

    /// Adds a fully-specified node.
    pub fn insert(&mut self, node: Node) -> Result<&mut Node, GraphError> {
        if self.index.contains_key(&node.id) {
            return Err(GraphError::DuplicateNode(node.id));
        }
        let pos = self.nodes.len();
        self.index.insert(node.id.clone(), pos);
        self.nodes.push(node);
        Ok(&mut self.nodes[pos])
    }

    /// Assigns `id` to pipeline stage `stage`, replacing any earlier assignment.
    pub fn assign_stage(&mut self, id: &str, stage: usize) -> Result<(), GraphError> {
        let pos = *self
            .index
            .get(id)
            .ok_or_else(|| GraphError::UnknownNode(id.to_string()))?;
        self.nodes[pos].stage = Some(stage);
        Ok(())
    }

    /// Checks the graph without consuming it.
    ///
    /// Walks the topological order once, verifying that every referenced
    /// input was already emitted, that no node depends on itself, and that
    /// stage indices never decrease along any path. Unassigned nodes carry
    /// the highest stage upstream of them but are not compared themselves.
    pub fn check(&self) -> Result<(), GraphError> {
        let order = self.order_positions()?;
        self.walk(&order)
    }

    /// Validates the graph and transitions to the `Validated` state.
    pub fn validate(self) -> Result<StageGraph<Validated>, GraphError> {
        let order = self.order_positions()?;
        self.walk(&order)?;

        tracing::debug!(
            graph = %self.name,
            nodes = self.nodes.len(),
            "stage graph validated",
        );

        Ok(StageGraph {
            name: self.name,
            nodes: self.nodes,
            index: self.index,
            order,
            _state: std::marker::PhantomData,
        })
    }

    fn walk(&self, order: &[usize]) -> Result<(), GraphError> {
        let mut preds = vec![Vec::new(); self.nodes.len()];
        for (src, targets) in self.edges().into_iter().enumerate() {
            for dst in targets {
                preds[dst].push(src);
            }
        }

        let mut emitted = vec![false; self.nodes.len()];
        // Highest stage reaching each node, with the node it comes from.
        let mut reach: Vec<Option<(usize, usize)>> = vec![None; self.nodes.len()];
        for &pos in order {
            let node = &self.nodes[pos];
            for input in &node.inputs {
                let src = self.resolve(&node.id, input)?;
                if !emitted[src] {
                    return Err(GraphError::Cycle {
                        node: node.id.clone(),
                    });
                }
            }
            for output in &node.outputs {
                self.resolve(&node.id, output)?;
            }

            let upstream = preds[pos]
                .iter()
                .filter_map(|&p| reach[p])
                .fold(None, |best: Option<(usize, usize)>, cand| match best {
                    Some(b) if b.0 >= cand.0 => Some(b),
                    _ => Some(cand),
                });
            reach[pos] = match (node.stage, upstream) {
                (Some(stage), Some((input_stage, src))) if stage < input_stage => {
                    return Err(GraphError::NonMonotonicStage {
                        node: node.id.clone(),
                        stage,
                        input: self.nodes[src].id.clone(),
                        input_stage,
                    });
                }
                (Some(stage), _) => Some((stage, pos)),
                (None, upstream) => upstream,
            };
            emitted[pos] = true;
        }
        Ok(())
    }

    fn resolve(&self, from: &str, reference: &str) -> Result<usize, GraphError> {
        self.index
            .get(reference)
            .copied()
            .ok_or_else(|| GraphError::DanglingReference {
                node: from.to_string(),
                missing: reference.to_string(),
            })
    }
}

// ── Validated state ────────────────────────────────────────────────

impl StageGraph<Validated> {
    /// Iterates nodes in the validated topological order.
    pub fn iter_ordered(&self) -> impl Iterator<Item = &Node> {
        self.order.iter().map(move |&pos| &self.nodes[pos])
    }

    /// Iterates layer nodes in topological order.
    pub fn iter_layers(&self) -> impl Iterator<Item = &Node> {
        self.iter_ordered().filter(|n| n.is_layer())
    }

    /// Number of stages referenced by assignments (highest index + 1).
    pub fn num_stages(&self) -> usize {
        self.nodes
            .iter()
            .filter_map(|n| n.stage)
            .max()
            .map_or(0, |s| s + 1)
    }

    /// Sum of the weights of all layer nodes.
    pub fn total_weight(&self) -> f64 {
        self.iter_layers().map(Node::weight_or_zero).sum()
    }

    /// Groups layer nodes by stage into a [`StagePartition`].
    ///
    /// Each slice lists its layers in topological order. Fails if a layer
    /// is unassigned or if the used stage indices are not `0..k`.
    pub fn partition(&self) -> Result<StagePartition, GraphError> {
        let mut by_stage: BTreeMap<usize, StageSlice> = BTreeMap::new();
        for node in self.iter_layers() {
            let stage = node.stage.ok_or_else(|| GraphError::Unassigned {
                node: node.id.clone(),
            })?;
            let slice = by_stage.entry(stage).or_insert_with(|| StageSlice {
                stage_index: stage,
                node_ids: Vec::new(),
                total_weight: 0.0,
            });
            slice.node_ids.push(node.id.clone());
            slice.total_weight += node.weight_or_zero();
        }

        let partition = StagePartition::new(self.name.clone(), by_stage.into_values().collect());
        partition.validate()?;

        tracing::debug!(
            graph = %self.name,
            stages = partition.num_stages(),
            "derived stage partition",
        );
        Ok(partition)
    }

    /// Returns a summary string describing the graph.
    pub fn summary(&self) -> String {
        format!(
            "Graph '{}': {} nodes, {} layers, {} stages, total weight {:.2}",
            self.name,
            self.nodes.len(),
            self.iter_layers().count(),
            self.num_stages(),
            self.total_weight(),
        )
    }
}

// ── Shared implementations ─────────────────────────────────────────

impl<S: GraphState> StageGraph<S> {
    /// Number of nodes in the graph.
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Looks up a node by identifier.
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.index.get(id).map(|&pos| &self.nodes[pos])
    }

    /// Nodes in insertion order.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Returns the node identifiers in a deterministic topological order.
    ///
    /// Ties are broken by insertion order. References to unknown nodes are
    /// ignored here and reported by validation.
    pub fn topological_order(&self) -> Result<Vec<&str>, GraphError> {
        Ok(self
            .order_positions()?
            .into_iter()
            .map(|pos| self.nodes[pos].id.as_str())
            .collect())
    }

    fn edges(&self) -> Vec<Vec<usize>> {
        let mut seen: HashSet<(usize, usize)> = HashSet::new();
        let mut succ = vec![Vec::new(); self.nodes.len()];
        for (dst, node) in self.nodes.iter().enumerate() {
            for input in &node.inputs {
                if let Some(&src) = self.index.get(input) {
                    if seen.insert((src, dst)) {
                        succ[src].push(dst);
                    }
                }
            }
            for output in &node.outputs {
                if let Some(&out) = self.index.get(output) {
                    if seen.insert((dst, out)) {
                        succ[dst].push(out);
                    }
                }
            }
        }
        succ
    }

    /// Kahn's algorithm with a min-heap on insertion position.
    fn order_positions(&self) -> Result<Vec<usize>, GraphError> {
        let n = self.nodes.len();
        let succ = self.edges();
        let mut in_degree = vec![0usize; n];
        for targets in &succ {
            for &t in targets {
                in_degree[t] += 1;
            }
        }

        let mut ready: BinaryHeap<Reverse<usize>> = (0..n)
            .filter(|&i| in_degree[i] == 0)
            .map(Reverse)
            .collect();
        let mut order = Vec::with_capacity(n);

        while let Some(Reverse(pos)) = ready.pop() {
            order.push(pos);
            for &t in &succ[pos] {
                in_degree[t] -= 1;
                if in_degree[t] == 0 {
                    ready.push(Reverse(t));
                }
            }
        }

        if order.len() != n {
            let node = self.node_on_cycle(&succ, &in_degree);
            return Err(GraphError::Cycle {
                node: self.nodes[node].id.clone(),
            });
        }
        Ok(order)
    }

    /// Walks predecessors among the unordered nodes until one repeats.
    fn node_on_cycle(&self, succ: &[Vec<usize>], in_degree: &[usize]) -> usize {
        let mut pred: Vec<Option<usize>> = vec![None; self.nodes.len()];
        for (src, targets) in succ.iter().enumerate() {
            if in_degree[src] == 0 {
                continue;
            }
            for &t in targets {
                if in_degree[t] > 0 && pred[t].is_none() {
                    pred[t] = Some(src);
                }
            }
        }

        let start = in_degree.iter().position(|&d| d > 0).unwrap_or(0);
        let mut visited = vec![false; self.nodes.len()];
        let mut cur = start;
        while !visited[cur] {
            visited[cur] = true;
            match pred[cur] {
                Some(p) => cur = p,
                None => break,
            }
        }
        cur
    }
}

impl<S: GraphState> fmt::Display for StageGraph<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "StageGraph '{}' ({} nodes):", self.name, self.nodes.len())?;
        for node in &self.nodes {
            writeln!(f, "  {}", node.summary())?;
        }
        Ok(())
    }
}
