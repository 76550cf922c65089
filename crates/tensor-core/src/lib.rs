// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # tensor-core
//!
//! The payload type carried between pipeline stages.
//!
//! This crate provides:
//! - [`Tensor`]: a row-major `f32` tensor tagged with the [`Device`] it
//!   currently lives on.
//! - [`Shape`]: dimension descriptors with leading-dimension helpers used
//!   for micro-batch splitting.
//! - [`Device`]: a placement identifier (`cpu`, `gpu:N`).
//! - Kernels the stock stage units need: matrix multiplication (plain and
//!   transposed forms), element-wise arithmetic, ReLU and GELU with their
//!   derivatives.
//!
//! # Placement model
//! Data is always host-resident. The device tag records where a stage
//! considers the tensor to be, and every kernel refuses to mix operands
//! from different devices. Moving a tensor between devices is an explicit
//! [`Tensor::to_device`] / [`Tensor::into_device`] call, which is the
//! hand-off point a real accelerator backend would implement as a copy.

mod device;
mod error;
mod ops;
mod shape;
mod tensor;

pub use device::Device;
pub use error::TensorError;
pub use ops::{
    add_assign, add_row_bias, gelu, gelu_backward, matmul, matmul_lhs_transposed,
    matmul_rhs_transposed, relu, relu_backward, scale, sub, sum_rows,
};
pub use shape::Shape;
pub use tensor::{Tensor, TensorView};
