// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Pipeline-parallel orchestration over one full batch at a time.
//!
//! ```text
//!        forward()                     backward()
//! Idle ─────────► ForwardInFlight ──► ForwardComplete ─────────► BackwardInFlight ──► Idle
//! ```
//!
//! `forward` splits the batch into micro-batches and pushes them through
//! the stages on the [`Conveyor`]; every stage caches one record per
//! micro-batch. `backward` turns the caller's loss into per-micro-batch
//! output gradients and pushes those through the stages in reverse,
//! consuming the cached records in the order they were produced.
//!
//! A failure in either pass drops all pending records and returns the
//! pipeline to `Idle`; there are no partial results.

use crate::{
    Conveyor, LossFn, PipelineConfig, PipelineError, PipelineMetrics, Schedule, StageAssembly,
    StageUnit, StageWrapper,
};
use stage_graph::{Node, StageGraph, Validated};
use std::fmt;
use std::time::Instant;
use tensor_core::{Device, Tensor};

/// Where a [`PipelineParallel`] instance is in its forward/backward cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    ForwardInFlight,
    ForwardComplete,
    BackwardInFlight,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::ForwardInFlight => "running forward",
            Self::ForwardComplete => "awaiting backward",
            Self::BackwardInFlight => "running backward",
        })
    }
}

/// An ordered chain of stages, each bound to one device.
///
/// Stage and device assignment is fixed at construction.
///
/// # Example
/// ```
/// use pipeline_rt::{units::Identity, MseLoss, PipelineParallel, StageUnit};
/// use tensor_core::{Device, Shape, Tensor};
///
/// let units: Vec<Box<dyn StageUnit>> = vec![
///     Box::new(Identity::new("a")),
///     Box::new(Identity::new("b")),
/// ];
/// let mut pipe =
///     PipelineParallel::new(units, vec![Device::Gpu(0), Device::Gpu(1)], 2).unwrap();
///
/// let batch = Tensor::from_f32(Shape::matrix(4, 1), &[1.0, 2.0, 3.0, 4.0]).unwrap();
/// let out = pipe.forward(&batch).unwrap();
/// let loss = pipe.backward(&MseLoss, &out, &batch).unwrap();
/// assert_eq!(loss, 0.0);
/// ```
#[derive(Debug)]
pub struct PipelineParallel {
    stages: Vec<StageWrapper>,
    micro_batch_size: usize,
    output_device: Device,
    conveyor: Conveyor,
    max_in_flight: Option<usize>,
    profiling: bool,
    state: PipelineState,
    /// Leading dimension of the batch seen by the pending forward.
    forward_rows: usize,
    metrics: PipelineMetrics,
}

impl PipelineParallel {
    /// Builds a pipeline with one stage per unit, placed on the matching device.
    ///
    /// Uses the same defaults as [`PipelineConfig::default`]: outputs are
    /// collected on the host, the schedule is overlapped, caches are
    /// unbounded and profiling is on.
    pub fn new(
        units: Vec<Box<dyn StageUnit>>,
        devices: Vec<Device>,
        micro_batch_size: usize,
    ) -> Result<Self, PipelineError> {
        Self::build(
            units,
            devices,
            micro_batch_size,
            Device::Cpu,
            Schedule::Overlapped,
            None,
            true,
        )
    }

    /// Builds a pipeline from a validated configuration.
    pub fn from_config(
        units: Vec<Box<dyn StageUnit>>,
        config: &PipelineConfig,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        Self::build(
            units,
            config.parse_devices()?,
            config.micro_batch_size,
            config.parse_output_device()?,
            config.parse_schedule()?,
            config.max_in_flight,
            config.enable_profiling,
        )
    }

    /// Builds one [`StageAssembly`] per stage of `graph` and wraps them.
    ///
    /// `factory` creates the unit for each layer node.
    pub fn from_graph<F>(
        graph: &StageGraph<Validated>,
        factory: F,
        config: &PipelineConfig,
    ) -> Result<Self, PipelineError>
    where
        F: FnMut(&Node) -> Result<Box<dyn StageUnit>, PipelineError>,
    {
        let partition = graph.partition()?;
        let units = StageAssembly::from_partition(graph, &partition, factory)?
            .into_iter()
            .map(|a| Box::new(a) as Box<dyn StageUnit>)
            .collect();
        Self::from_config(units, config)
    }

    fn build(
        units: Vec<Box<dyn StageUnit>>,
        devices: Vec<Device>,
        micro_batch_size: usize,
        output_device: Device,
        schedule: Schedule,
        max_in_flight: Option<usize>,
        profiling: bool,
    ) -> Result<Self, PipelineError> {
        if units.len() != devices.len() {
            return Err(PipelineError::ConfigError(format!(
                "{} stages but {} devices",
                units.len(),
                devices.len(),
            )));
        }
        if units.is_empty() {
            return Err(PipelineError::ConfigError(
                "pipeline needs at least one stage".into(),
            ));
        }
        if micro_batch_size == 0 {
            return Err(PipelineError::ConfigError(
                "micro_batch_size must be positive".into(),
            ));
        }

        let stages: Vec<StageWrapper> = units
            .into_iter()
            .zip(devices)
            .enumerate()
            .map(|(i, (unit, device))| {
                StageWrapper::new(i, unit, device, max_in_flight).with_profiling(profiling)
            })
            .collect();

        tracing::info!(
            stages = stages.len(),
            micro_batch_size,
            %schedule,
            %output_device,
            "pipeline created",
        );

        let metrics = PipelineMetrics::new(stages.iter().map(|s| s.metrics().clone()).collect());
        Ok(Self {
            stages,
            micro_batch_size,
            output_device,
            conveyor: Conveyor::new(schedule),
            max_in_flight,
            profiling,
            state: PipelineState::Idle,
            forward_rows: 0,
            metrics,
        })
    }

    /// Replaces the conveyor schedule.
    pub fn with_schedule(mut self, schedule: Schedule) -> Self {
        self.conveyor = Conveyor::new(schedule);
        self
    }

    /// Replaces the device forward outputs are collected on.
    pub fn with_output_device(mut self, device: Device) -> Self {
        self.output_device = device;
        self
    }

    /// Enables or disables per-stage timing.
    pub fn with_profiling(mut self, enabled: bool) -> Self {
        self.profiling = enabled;
        self.stages = self
            .stages
            .into_iter()
            .map(|s| s.with_profiling(enabled))
            .collect();
        self
    }

    // ── Forward ────────────────────────────────────────────────────

    /// Runs the full batch through every stage and returns the output,
    /// concatenated in original row order on the output device.
    pub fn forward(&mut self, batch: &Tensor) -> Result<Tensor, PipelineError> {
        self.expect_state("forward", PipelineState::Idle)?;

        let rows = self.check_batch(batch)?;
        let micro_batches = batch.split_rows(self.micro_batch_size)?;
        let count = micro_batches.len();
        if let Some(capacity) = self.max_in_flight {
            if count > capacity {
                return Err(PipelineError::ConfigError(format!(
                    "batch splits into {count} micro-batches but max_in_flight is {capacity}"
                )));
            }
        }

        self.transition(PipelineState::ForwardInFlight);
        let started = Instant::now();
        let output_device = self.output_device;
        let collect = move |t: Tensor| t.into_device(output_device);

        let conveyor = self.conveyor;
        let outputs = conveyor
            .run(
                micro_batches,
                &mut self.stages,
                |stage: &mut StageWrapper, k: usize, x: Tensor| stage.forward(k, x),
                Some(&collect),
                true,
            )
            .map_err(|e| self.abort("forward", e))?;
        let output = Tensor::concat_rows(&outputs).map_err(|e| self.abort("forward", e.into()))?;

        self.forward_rows = rows;
        if self.profiling {
            self.sync_stage_metrics();
            self.metrics.record_forward_pass(
                count,
                conveyor.ticks(count, self.stages.len()),
                started.elapsed(),
            );
        }
        self.transition(PipelineState::ForwardComplete);
        Ok(output)
    }

    // ── Backward ───────────────────────────────────────────────────

    /// Back-propagates `loss_fn(results, targets)` through every stage.
    ///
    /// `results` must be the output of the pending forward call. Each
    /// micro-batch loss and its gradient are divided by the full-batch row
    /// count, so parameter gradients match an unpipelined run over the
    /// whole batch. Returns the normalised full-batch loss.
    pub fn backward<L>(
        &mut self,
        loss_fn: &L,
        results: &Tensor,
        targets: &Tensor,
    ) -> Result<f32, PipelineError>
    where
        L: LossFn + ?Sized,
    {
        self.expect_state("backward", PipelineState::ForwardComplete)?;

        for (what, t) in [("results", results), ("targets", targets)] {
            if t.rows() != Some(self.forward_rows) {
                return Err(PipelineError::ConfigError(format!(
                    "{what} have shape {} but the forward batch had {} rows",
                    t.shape(),
                    self.forward_rows,
                )));
            }
        }

        let norm = 1.0 / self.forward_rows as f32;
        let result_parts = results.split_rows(self.micro_batch_size)?;
        let target_parts = targets
            .to_device(results.device())
            .split_rows(self.micro_batch_size)?;

        let mut total_loss = 0.0;
        let mut grads = Vec::with_capacity(result_parts.len());
        for (r, t) in result_parts.iter().zip(&target_parts) {
            let out = loss_fn.loss(r, t)?;
            total_loss += out.loss * norm;
            let mut grad = Tensor::zeros_like(&out.grad);
            tensor_core::scale(&out.grad.view(), norm, &mut grad)?;
            grads.push(grad);
        }

        self.transition(PipelineState::BackwardInFlight);
        let started = Instant::now();
        let count = grads.len();
        let conveyor = self.conveyor;
        let mut reversed: Vec<&mut StageWrapper> = self.stages.iter_mut().rev().collect();
        let outcome = conveyor.run(
            grads,
            &mut reversed,
            |stage: &mut &mut StageWrapper, _k: usize, g: Tensor| stage.backward(g),
            None,
            false,
        );
        drop(reversed);
        outcome.map_err(|e| self.abort("backward", e))?;

        if self.profiling {
            self.sync_stage_metrics();
            self.metrics.record_backward_pass(
                conveyor.ticks(count, self.stages.len()),
                started.elapsed(),
            );
        }
        self.transition(PipelineState::Idle);
        Ok(total_loss)
    }

    // ── State handling ─────────────────────────────────────────────

    /// Drops any pending forward records and returns to `Idle`.
    ///
    /// Use after an inference-only forward that will not be followed by
    /// backward.
    pub fn reset(&mut self) {
        let dropped: usize = self.stages.iter_mut().map(StageWrapper::clear_cache).sum();
        if dropped > 0 {
            tracing::debug!(dropped, "discarded pending activations");
        }
        self.transition(PipelineState::Idle);
    }

    fn expect_state(
        &self,
        operation: &'static str,
        expected: PipelineState,
    ) -> Result<(), PipelineError> {
        if self.state != expected {
            return Err(PipelineError::SequenceError {
                operation,
                state: self.state,
            });
        }
        Ok(())
    }

    fn transition(&mut self, next: PipelineState) {
        if self.state != next {
            tracing::debug!(from = %self.state, to = %next, "pipeline state");
            self.state = next;
        }
    }

    fn abort(&mut self, operation: &'static str, error: PipelineError) -> PipelineError {
        tracing::warn!(operation, %error, "pipeline pass failed; dropping pending activations");
        self.reset();
        error
    }

    fn check_batch(&self, batch: &Tensor) -> Result<usize, PipelineError> {
        let rows = batch.rows().ok_or_else(|| {
            PipelineError::ConfigError(format!(
                "forward input {} has no batch dimension",
                batch.shape()
            ))
        })?;
        if rows == 0 || rows % self.micro_batch_size != 0 {
            return Err(PipelineError::ConfigError(format!(
                "batch size {rows} is not a positive multiple of micro-batch size {}",
                self.micro_batch_size,
            )));
        }
        Ok(rows)
    }

    fn sync_stage_metrics(&mut self) {
        self.metrics
            .update_stages(self.stages.iter().map(|s| s.metrics().clone()));
    }

    // ── Gradients ──────────────────────────────────────────────────

    /// Resets every unit's gradient accumulators.
    pub fn zero_grad(&mut self) {
        for stage in &mut self.stages {
            stage.unit_mut().zero_grad();
        }
    }

    /// Named gradient accumulators, grouped by stage.
    pub fn parameter_gradients(&self) -> Vec<Vec<(String, &Tensor)>> {
        self.stages
            .iter()
            .map(|s| s.unit().parameter_gradients())
            .collect()
    }

    // ── Accessors ──────────────────────────────────────────────────

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn num_stages(&self) -> usize {
        self.stages.len()
    }

    pub fn devices(&self) -> Vec<Device> {
        self.stages.iter().map(StageWrapper::device).collect()
    }

    pub fn output_device(&self) -> Device {
        self.output_device
    }

    pub fn micro_batch_size(&self) -> usize {
        self.micro_batch_size
    }

    pub fn schedule(&self) -> Schedule {
        self.conveyor.schedule()
    }

    /// Whether per-stage timings and pass metrics are being recorded.
    pub fn profiling(&self) -> bool {
        self.profiling
    }

    pub fn stage(&self, index: usize) -> Option<&StageWrapper> {
        self.stages.get(index)
    }

    /// Pending forward records per stage.
    pub fn pending_cache_entries(&self) -> Vec<usize> {
        self.stages.iter().map(|s| s.cache().len()).collect()
    }

    pub fn metrics(&self) -> &PipelineMetrics {
        &self.metrics
    }
}
