// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # pipeline-rt
//!
//! Pipeline-parallel execution of a model cut into stages.
//!
//! The runtime takes:
//! - An ordered list of [`StageUnit`]s, one per stage, or a validated
//!   `StageGraph` from `stage-graph` plus a unit factory.
//! - One `Device` per stage.
//!
//! And runs full batches through the stages as micro-batches, so that
//! stage `m` can work on micro-batch `k` while stage `m + 1` works on
//! micro-batch `k - 1`.
//!
//! # Components
//! - [`StageWrapper`]: one unit on one device with its FIFO
//!   [`ActivationCache`].
//! - [`Conveyor`]: the driver, with a sequential and an overlapped
//!   (rayon wavefront) [`Schedule`].
//! - [`PipelineParallel`]: splits batches, runs forward and backward,
//!   enforces the `Idle → ForwardComplete → Idle` cycle.
//! - [`StageAssembly`]: the units of one stage built from a graph partition.
//!
//! The library logs through `tracing` and installs no subscriber.

mod assembly;
mod cache;
mod config;
mod conveyor;
mod error;
mod metrics;
mod parallel;
mod stage;
mod unit;
pub mod units;

pub use assembly::StageAssembly;
pub use cache::{ActivationCache, CacheEntry};
pub use config::PipelineConfig;
pub use conveyor::{Conveyor, LastStageHook, Schedule};
pub use error::PipelineError;
pub use metrics::{PipelineMetrics, StageMetrics};
pub use parallel::{PipelineParallel, PipelineState};
pub use stage::StageWrapper;
pub use unit::{Context, LossFn, LossOutput, MseLoss, StageUnit, UnitError};
