// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Stock computation units.
//!
//! | Unit       | Forward              | Saved    | Parameters       |
//! |------------|----------------------|----------|------------------|
//! | [`Linear`] | `x @ W + b`          | `x`      | `weight`, `bias` |
//! | [`Relu`]   | `max(0, x)`          | `x`      | none             |
//! | [`Gelu`]   | GELU (tanh approx.)  | `x`      | none             |
//! | [`Identity`] | `x`                | nothing  | none             |

use crate::{Context, StageUnit, UnitError};
use tensor_core::{Device, Shape, Tensor, TensorError};

// ── Linear ─────────────────────────────────────────────────────────

/// Fully-connected layer over `[N, in]` inputs, with weight `[in, out]`.
#[derive(Debug, Clone)]
pub struct Linear {
    name: String,
    weight: Tensor,
    bias: Tensor,
    grad_weight: Tensor,
    grad_bias: Tensor,
}

impl Linear {
    /// Creates a layer from explicit parameters.
    ///
    /// `weight` must be `[in, out]` and `bias` must be `[out]`.
    pub fn new(name: impl Into<String>, weight: Tensor, bias: Tensor) -> Result<Self, UnitError> {
        let out = weight.shape().dim(1);
        if weight.shape().rank() != 2 || bias.shape() != &Shape::vector(out.unwrap_or(0)) {
            return Err(TensorError::ShapeMismatch {
                op: "linear",
                lhs: weight.shape().clone(),
                rhs: bias.shape().clone(),
            }
            .into());
        }
        let bias = bias.into_device(weight.device());
        Ok(Self {
            name: name.into(),
            grad_weight: Tensor::zeros_like(&weight),
            grad_bias: Tensor::zeros_like(&bias),
            weight,
            bias,
        })
    }

    /// Creates a zero-initialised `in -> out` layer.
    pub fn zeros(name: impl Into<String>, in_features: usize, out_features: usize) -> Self {
        let weight = Tensor::zeros(Shape::matrix(in_features, out_features));
        let bias = Tensor::zeros(Shape::vector(out_features));
        Self {
            name: name.into(),
            grad_weight: Tensor::zeros_like(&weight),
            grad_bias: Tensor::zeros_like(&bias),
            weight,
            bias,
        }
    }

    pub fn in_features(&self) -> usize {
        self.weight.shape().dims()[0]
    }

    pub fn out_features(&self) -> usize {
        self.weight.shape().dims()[1]
    }

    pub fn weight(&self) -> &Tensor {
        &self.weight
    }

    pub fn bias(&self) -> &Tensor {
        &self.bias
    }

    pub fn grad_weight(&self) -> &Tensor {
        &self.grad_weight
    }

    pub fn grad_bias(&self) -> &Tensor {
        &self.grad_bias
    }
}

impl StageUnit for Linear {
    fn name(&self) -> &str {
        &self.name
    }

    fn forward(&mut self, input: &Tensor) -> Result<(Tensor, Context), UnitError> {
        let rows = input.rows().unwrap_or(0);
        let mut output =
            Tensor::zeros(Shape::matrix(rows, self.out_features())).with_device(input.device());
        tensor_core::matmul(&input.view(), &self.weight.view(), &mut output)?;
        tensor_core::add_row_bias(&mut output, &self.bias.view())?;
        Ok((output, Context::with_saved(vec![input.clone()])))
    }

    fn backward(&mut self, context: Context, grad_output: &Tensor) -> Result<Tensor, UnitError> {
        let saved = context.take_saved(1)?;
        let input = &saved[0];
        let device = input.device();

        let mut grad_w = Tensor::zeros_like(&self.weight);
        tensor_core::matmul_lhs_transposed(&input.view(), &grad_output.view(), &mut grad_w)?;
        tensor_core::add_assign(&mut self.grad_weight, &grad_w.view())?;

        let mut grad_b = Tensor::zeros_like(&self.bias);
        tensor_core::sum_rows(&grad_output.view(), &mut grad_b)?;
        tensor_core::add_assign(&mut self.grad_bias, &grad_b.view())?;

        let rows = input.rows().unwrap_or(0);
        let mut grad_input =
            Tensor::zeros(Shape::matrix(rows, self.in_features())).with_device(device);
        tensor_core::matmul_rhs_transposed(&grad_output.view(), &self.weight.view(), &mut grad_input)?;
        Ok(grad_input)
    }

    fn place(&mut self, device: Device) {
        for t in [
            &mut self.weight,
            &mut self.bias,
            &mut self.grad_weight,
            &mut self.grad_bias,
        ] {
            *t = t.to_device(device);
        }
    }

    fn parameters(&self) -> Vec<(String, &Tensor)> {
        vec![
            (format!("{}.weight", self.name), &self.weight),
            (format!("{}.bias", self.name), &self.bias),
        ]
    }

    fn parameter_gradients(&self) -> Vec<(String, &Tensor)> {
        vec![
            (format!("{}.weight", self.name), &self.grad_weight),
            (format!("{}.bias", self.name), &self.grad_bias),
        ]
    }

    fn zero_grad(&mut self) {
        self.grad_weight.fill_f32(0.0);
        self.grad_bias.fill_f32(0.0);
    }
}

// ── Activations ────────────────────────────────────────────────────

/// Rectified linear unit.
#[derive(Debug, Clone)]
pub struct Relu {
    name: String,
}

impl Relu {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl StageUnit for Relu {
    fn name(&self) -> &str {
        &self.name
    }

    fn forward(&mut self, input: &Tensor) -> Result<(Tensor, Context), UnitError> {
        let mut output = Tensor::zeros_like(input);
        tensor_core::relu(&input.view(), &mut output)?;
        Ok((output, Context::with_saved(vec![input.clone()])))
    }

    fn backward(&mut self, context: Context, grad_output: &Tensor) -> Result<Tensor, UnitError> {
        let saved = context.take_saved(1)?;
        let mut grad_input = Tensor::zeros_like(&saved[0]);
        tensor_core::relu_backward(&saved[0].view(), &grad_output.view(), &mut grad_input)?;
        Ok(grad_input)
    }
}

/// GELU activation.
#[derive(Debug, Clone)]
pub struct Gelu {
    name: String,
}

impl Gelu {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl StageUnit for Gelu {
    fn name(&self) -> &str {
        &self.name
    }

    fn forward(&mut self, input: &Tensor) -> Result<(Tensor, Context), UnitError> {
        let mut output = Tensor::zeros_like(input);
        tensor_core::gelu(&input.view(), &mut output)?;
        Ok((output, Context::with_saved(vec![input.clone()])))
    }

    fn backward(&mut self, context: Context, grad_output: &Tensor) -> Result<Tensor, UnitError> {
        let saved = context.take_saved(1)?;
        let mut grad_input = Tensor::zeros_like(&saved[0]);
        tensor_core::gelu_backward(&saved[0].view(), &grad_output.view(), &mut grad_input)?;
        Ok(grad_input)
    }
}

/// Pass-through unit.
#[derive(Debug, Clone)]
pub struct Identity {
    name: String,
}

impl Identity {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl StageUnit for Identity {
    fn name(&self) -> &str {
        &self.name
    }

    fn forward(&mut self, input: &Tensor) -> Result<(Tensor, Context), UnitError> {
        Ok((input.clone(), Context::new()))
    }

    fn backward(&mut self, _context: Context, grad_output: &Tensor) -> Result<Tensor, UnitError> {
        Ok(grad_output.clone())
    }
}
