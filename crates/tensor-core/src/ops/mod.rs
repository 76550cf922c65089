// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Tensor arithmetic operations.
//!
//! Each operation writes into a caller-provided output tensor so stage
//! units can reuse gradient buffers across micro-batches. Every kernel
//! checks that its operands share a device before touching data.

mod elementwise_op;
mod gelu_op;
mod matmul_op;

pub use elementwise_op::{add_assign, add_row_bias, relu, relu_backward, scale, sub, sum_rows};
pub use gelu_op::{gelu, gelu_backward};
pub use matmul_op::{matmul, matmul_lhs_transposed, matmul_rhs_transposed};

use crate::{Device, Shape, TensorError};

pub(crate) fn ensure_same_device(
    op: &'static str,
    lhs: Device,
    rhs: Device,
) -> Result<(), TensorError> {
    if lhs != rhs {
        return Err(TensorError::DeviceMismatch { op, lhs, rhs });
    }
    Ok(())
}

pub(crate) fn ensure_same_shape(
    op: &'static str,
    lhs: &Shape,
    rhs: &Shape,
) -> Result<(), TensorError> {
    if lhs != rhs {
        return Err(TensorError::ShapeMismatch {
            op,
            lhs: lhs.clone(),
            rhs: rhs.clone(),
        });
    }
    Ok(())
}
