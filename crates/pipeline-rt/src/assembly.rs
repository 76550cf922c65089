// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Stage assembly: the units of one stage, chained in order.
//!
//! An assembly is plain data: an ordered list of `(scope, unit)` members
//! and a table mapping each graph scope name to a short field name
//! (`l_0`, `l_1`, ...). It runs its members in order on forward and in
//! reverse on backward.

use crate::{Context, PipelineError, StageUnit, UnitError};
use stage_graph::{Node, StageGraph, StagePartition, Validated};
use std::collections::BTreeMap;
use tensor_core::{Device, Tensor};

struct Member {
    scope: String,
    field: String,
    unit: Box<dyn StageUnit>,
}

/// The ordered members of one pipeline stage.
pub struct StageAssembly {
    name: String,
    members: Vec<Member>,
    fields: BTreeMap<String, String>,
}

impl StageAssembly {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            members: Vec::new(),
            fields: BTreeMap::new(),
        }
    }

    /// Appends `unit` under `scope`, returning the field name it was given.
    pub fn push(
        &mut self,
        scope: impl Into<String>,
        unit: Box<dyn StageUnit>,
    ) -> Result<&str, PipelineError> {
        let scope = scope.into();
        if self.fields.contains_key(&scope) {
            return Err(PipelineError::ConfigError(format!(
                "scope '{scope}' appears twice in {}",
                self.name
            )));
        }
        let field = format!("l_{}", self.members.len());
        self.fields.insert(scope.clone(), field.clone());
        self.members.push(Member { scope, field, unit });
        Ok(&self.members[self.members.len() - 1].field)
    }

    /// Builds one assembly per stage of `partition`.
    ///
    /// `factory` is called once per layer node, in stage order then
    /// topological order. Fails if the assembled layer count differs from
    /// the partition's.
    pub fn from_partition<F>(
        graph: &StageGraph<Validated>,
        partition: &StagePartition,
        mut factory: F,
    ) -> Result<Vec<StageAssembly>, PipelineError>
    where
        F: FnMut(&Node) -> Result<Box<dyn StageUnit>, PipelineError>,
    {
        partition.validate()?;
        let mut assemblies = Vec::with_capacity(partition.num_stages());
        for slice in partition.iter() {
            let mut assembly = StageAssembly::new(format!("{}/stage{}", graph.name, slice.stage_index));
            for id in &slice.node_ids {
                let node = graph
                    .node(id)
                    .ok_or_else(|| stage_graph::GraphError::UnknownNode(id.clone()))?;
                assembly.push(id.clone(), factory(node)?)?;
            }
            tracing::debug!(
                stage = slice.stage_index,
                layers = assembly.len(),
                "stage assembled",
            );
            assemblies.push(assembly);
        }

        let built: usize = assemblies.iter().map(StageAssembly::len).sum();
        if built != partition.total_layers() {
            return Err(PipelineError::ConfigError(format!(
                "assembled {built} layers but the partition has {}",
                partition.total_layers(),
            )));
        }
        Ok(assemblies)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Field name assigned to `scope`.
    pub fn field(&self, scope: &str) -> Option<&str> {
        self.fields.get(scope).map(String::as_str)
    }

    /// The scope → field table.
    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }

    /// `(scope, field)` pairs in execution order.
    pub fn members(&self) -> impl Iterator<Item = (&str, &str)> {
        self.members
            .iter()
            .map(|m| (m.scope.as_str(), m.field.as_str()))
    }
}

impl std::fmt::Debug for StageAssembly {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageAssembly")
            .field("name", &self.name)
            .field("fields", &self.fields)
            .finish()
    }
}

impl StageUnit for StageAssembly {
    fn name(&self) -> &str {
        &self.name
    }

    fn forward(&mut self, input: &Tensor) -> Result<(Tensor, Context), UnitError> {
        let mut context = Context::new();
        let mut x = input.clone();
        for member in &mut self.members {
            let (y, child) = member.unit.forward(&x)?;
            context.push_child(child);
            x = y;
        }
        Ok((x, context))
    }

    fn backward(&mut self, context: Context, grad_output: &Tensor) -> Result<Tensor, UnitError> {
        let children = context.take_children(self.members.len())?;
        let mut g = grad_output.clone();
        for (member, child) in self.members.iter_mut().rev().zip(children.into_iter().rev()) {
            g = member.unit.backward(child, &g)?;
        }
        Ok(g)
    }

    fn place(&mut self, device: Device) {
        for member in &mut self.members {
            member.unit.place(device);
        }
    }

    fn parameters(&self) -> Vec<(String, &Tensor)> {
        self.members
            .iter()
            .flat_map(|m| m.unit.parameters())
            .collect()
    }

    fn parameter_gradients(&self) -> Vec<(String, &Tensor)> {
        self.members
            .iter()
            .flat_map(|m| m.unit.parameter_gradients())
            .collect()
    }

    fn zero_grad(&mut self) {
        for member in &mut self.members {
            member.unit.zero_grad();
        }
    }
}
