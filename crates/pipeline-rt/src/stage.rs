// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! A computation unit bound to a device, with its activation cache.

use crate::{ActivationCache, PipelineError, StageMetrics, StageUnit};
use std::time::Instant;
use tensor_core::{Device, Tensor};

/// One pipeline stage.
///
/// Owns its unit and its cache exclusively. The only effects that escape a
/// stage are the device placement of the payloads it returns and the
/// gradient accumulation inside its unit.
#[derive(Debug)]
pub struct StageWrapper {
    index: usize,
    device: Device,
    unit: Box<dyn StageUnit>,
    cache: ActivationCache,
    profiling: bool,
    metrics: StageMetrics,
}

impl StageWrapper {
    /// Wraps `unit` as stage `index` on `device`, placing its parameters there.
    ///
    /// `capacity` bounds the number of pending forward records.
    pub fn new(
        index: usize,
        mut unit: Box<dyn StageUnit>,
        device: Device,
        capacity: Option<usize>,
    ) -> Self {
        unit.place(device);
        tracing::debug!(stage = index, %device, unit = unit.name(), "stage created");
        Self {
            index,
            device,
            unit,
            cache: ActivationCache::new(index, capacity),
            profiling: false,
            metrics: StageMetrics::new(index, device.to_string()),
        }
    }

    /// Enables or disables timing of forward and backward calls.
    pub fn with_profiling(mut self, enabled: bool) -> Self {
        self.profiling = enabled;
        self
    }

    /// Runs the unit on `input` for micro-batch `micro_batch`.
    ///
    /// The input is moved onto this stage's device first. The unit's saved
    /// state is cached only on the first invocation for a micro-batch. The
    /// output is left on this stage's device.
    pub fn forward(&mut self, micro_batch: usize, input: Tensor) -> Result<Tensor, PipelineError> {
        let started = Instant::now();
        let input = input.into_device(self.device);
        let (output, context) = self
            .unit
            .forward(&input)
            .map_err(|source| self.unit_error(source))?;
        self.cache.push(micro_batch, context)?;

        if self.profiling {
            self.metrics.record_forward(started.elapsed());
        }
        tracing::trace!(stage = self.index, micro_batch, "forward done");
        Ok(output)
    }

    /// Consumes the oldest cached record and back-propagates `grad_output`.
    ///
    /// Returns the gradient with respect to this stage's input, on this
    /// stage's device.
    pub fn backward(&mut self, grad_output: Tensor) -> Result<Tensor, PipelineError> {
        let started = Instant::now();
        let entry = self.cache.pop()?;
        let grad_output = grad_output.into_device(self.device);
        let grad_input = self
            .unit
            .backward(entry.context, &grad_output)
            .map_err(|source| self.unit_error(source))?;

        if self.profiling {
            self.metrics.record_backward(started.elapsed());
        }
        tracing::trace!(stage = self.index, micro_batch = entry.micro_batch, "backward done");
        Ok(grad_input)
    }

    fn unit_error(&self, source: crate::UnitError) -> PipelineError {
        PipelineError::UnitError {
            stage: self.index,
            unit: self.unit.name().to_string(),
            source,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn unit(&self) -> &dyn StageUnit {
        self.unit.as_ref()
    }

    pub fn unit_mut(&mut self) -> &mut dyn StageUnit {
        self.unit.as_mut()
    }

    pub fn cache(&self) -> &ActivationCache {
        &self.cache
    }

    /// Drops all pending records.
    pub fn clear_cache(&mut self) -> usize {
        self.cache.clear()
    }

    pub fn metrics(&self) -> &StageMetrics {
        &self.metrics
    }
}
