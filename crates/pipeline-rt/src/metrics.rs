// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Pipeline profiling metrics.
//!
//! [`PipelineMetrics`] collects per-stage compute time and call counts plus
//! per-pass totals. Comparing stage times is how an unbalanced partition
//! shows up: the slowest stage bounds steady-state throughput.

use std::time::Duration;

/// Timing for a single stage, accumulated across passes.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct StageMetrics {
    /// Stage index in pipeline order.
    pub stage_index: usize,
    /// Device the stage runs on.
    pub device: String,
    /// Time spent in forward calls.
    pub forward_duration: Duration,
    /// Time spent in backward calls.
    pub backward_duration: Duration,
    /// Number of forward calls.
    pub forward_calls: usize,
    /// Number of backward calls.
    pub backward_calls: usize,
}

impl StageMetrics {
    pub fn new(stage_index: usize, device: String) -> Self {
        Self {
            stage_index,
            device,
            ..Default::default()
        }
    }

    pub fn record_forward(&mut self, elapsed: Duration) {
        self.forward_duration += elapsed;
        self.forward_calls += 1;
    }

    pub fn record_backward(&mut self, elapsed: Duration) {
        self.backward_duration += elapsed;
        self.backward_calls += 1;
    }

    /// Forward plus backward time.
    pub fn busy(&self) -> Duration {
        self.forward_duration + self.backward_duration
    }
}

/// Aggregate metrics for a pipeline instance.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct PipelineMetrics {
    /// Per-stage metrics, in pipeline order.
    pub stages: Vec<StageMetrics>,
    /// Micro-batches in the most recent forward pass.
    pub micro_batches: usize,
    /// Completed forward passes.
    pub forward_passes: usize,
    /// Completed backward passes.
    pub backward_passes: usize,
    /// Conveyor ticks across all passes.
    pub ticks: usize,
    /// Wall-clock time across forward passes.
    pub total_forward_duration: Duration,
    /// Wall-clock time across backward passes.
    pub total_backward_duration: Duration,
}

impl PipelineMetrics {
    /// Creates an empty metrics container.
    pub fn new(stages: Vec<StageMetrics>) -> Self {
        Self {
            stages,
            ..Default::default()
        }
    }

    /// Records a completed forward pass.
    pub fn record_forward_pass(&mut self, micro_batches: usize, ticks: usize, elapsed: Duration) {
        self.micro_batches = micro_batches;
        self.forward_passes += 1;
        self.ticks += ticks;
        self.total_forward_duration += elapsed;
    }

    /// Records a completed backward pass.
    pub fn record_backward_pass(&mut self, ticks: usize, elapsed: Duration) {
        self.backward_passes += 1;
        self.ticks += ticks;
        self.total_backward_duration += elapsed;
    }

    /// Replaces the per-stage entries with fresh snapshots.
    pub fn update_stages(&mut self, stages: impl IntoIterator<Item = StageMetrics>) {
        self.stages = stages.into_iter().collect();
    }

    /// Index of the stage with the most busy time.
    pub fn bottleneck_stage(&self) -> Option<usize> {
        self.stages
            .iter()
            .max_by_key(|s| s.busy())
            .map(|s| s.stage_index)
    }

    /// Returns a human-readable summary.
    pub fn summary(&self) -> String {
        let bottleneck = self
            .bottleneck_stage()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string());
        format!(
            "Pipeline: {} stages, {} micro-batches, {} forward / {} backward passes, \
             {} ticks, {:.2}ms forward, {:.2}ms backward, bottleneck stage {}",
            self.stages.len(),
            self.micro_batches,
            self.forward_passes,
            self.backward_passes,
            self.ticks,
            self.total_forward_duration.as_secs_f64() * 1000.0,
            self.total_backward_duration.as_secs_f64() * 1000.0,
            bottleneck,
        )
    }
}
