// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Gaussian Error Linear Unit (GELU) activation and its derivative.

use super::{ensure_same_device, ensure_same_shape};
use crate::{Tensor, TensorError, TensorView};

/// Coefficient `sqrt(2/π)`.
const SQRT_2_OVER_PI: f32 = 0.797_884_6;

/// Cubic coefficient in the tanh approximation.
const GELU_COEFF: f32 = 0.044715;

/// Applies the GELU activation element-wise using the tanh approximation:
///
/// `GELU(x) ≈ 0.5 * x * (1 + tanh(sqrt(2/π) * (x + 0.044715 * x³)))`
///
/// # Errors
/// Returns [`TensorError::ShapeMismatch`] if input and output shapes differ.
pub fn gelu(input: &TensorView<'_>, output: &mut Tensor) -> Result<(), TensorError> {
    ensure_same_device("gelu", input.device(), output.device())?;
    ensure_same_shape("gelu", input.shape(), output.shape())?;

    for (d, &x) in output.as_f32_slice_mut().iter_mut().zip(input.as_f32_slice()) {
        *d = gelu_scalar(x);
    }
    Ok(())
}

/// Back-propagates through GELU: `grad_input = grad_output * GELU'(input)`.
pub fn gelu_backward(
    input: &TensorView<'_>,
    grad_output: &TensorView<'_>,
    grad_input: &mut Tensor,
) -> Result<(), TensorError> {
    ensure_same_device("gelu_backward", input.device(), grad_output.device())?;
    ensure_same_device("gelu_backward (output)", input.device(), grad_input.device())?;
    ensure_same_shape("gelu_backward", input.shape(), grad_output.shape())?;
    ensure_same_shape("gelu_backward (output)", input.shape(), grad_input.shape())?;

    for ((d, &x), &g) in grad_input
        .as_f32_slice_mut()
        .iter_mut()
        .zip(input.as_f32_slice())
        .zip(grad_output.as_f32_slice())
    {
        *d = g * gelu_derivative(x);
    }
    Ok(())
}

#[inline(always)]
fn gelu_scalar(x: f32) -> f32 {
    let inner = SQRT_2_OVER_PI * (x + GELU_COEFF * x * x * x);
    0.5 * x * (1.0 + inner.tanh())
}

#[inline(always)]
fn gelu_derivative(x: f32) -> f32 {
    let inner = SQRT_2_OVER_PI * (x + GELU_COEFF * x * x * x);
    let t = inner.tanh();
    let d_inner = SQRT_2_OVER_PI * (1.0 + 3.0 * GELU_COEFF * x * x);
    0.5 * (1.0 + t) + 0.5 * x * (1.0 - t * t) * d_inner
}
