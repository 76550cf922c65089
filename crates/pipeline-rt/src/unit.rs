// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The computation-unit contract a pipeline stage runs.
//!
//! A [`StageUnit`] is opaque to the scheduler: it turns an input payload
//! into an output payload plus a [`Context`] holding whatever it needs to
//! differentiate later, and given that context and the upstream gradient it
//! accumulates its parameter gradients and returns the gradient with
//! respect to its input.

use tensor_core::{Device, Tensor, TensorError};

/// Failures raised by a computation unit.
#[derive(Debug, thiserror::Error)]
pub enum UnitError {
    /// A kernel rejected its operands.
    #[error(transparent)]
    Tensor(#[from] TensorError),

    /// The context handed to `backward` does not match what `forward` saved.
    #[error("context mismatch: expected {expected} saved entries, found {found}")]
    ContextMismatch { expected: usize, found: usize },

    /// Any other unit-specific failure.
    #[error("{0}")]
    Other(String),
}

/// State retained from a forward call for the matching backward call.
///
/// Composite units nest the contexts of their members as children.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Context {
    saved: Vec<Tensor>,
    children: Vec<Context>,
}

impl Context {
    /// An empty context, for units that need nothing to differentiate.
    pub fn new() -> Self {
        Self::default()
    }

    /// A context holding the given tensors.
    pub fn with_saved(saved: Vec<Tensor>) -> Self {
        Self {
            saved,
            children: Vec::new(),
        }
    }

    /// Appends a tensor.
    pub fn save(&mut self, tensor: Tensor) {
        self.saved.push(tensor);
    }

    /// Appends a member's context.
    pub fn push_child(&mut self, child: Context) {
        self.children.push(child);
    }

    /// Tensors saved directly in this context.
    pub fn saved(&self) -> &[Tensor] {
        &self.saved
    }

    /// Consumes the context, returning exactly `expected` saved tensors.
    pub fn take_saved(self, expected: usize) -> Result<Vec<Tensor>, UnitError> {
        if self.saved.len() != expected {
            return Err(UnitError::ContextMismatch {
                expected,
                found: self.saved.len(),
            });
        }
        Ok(self.saved)
    }

    /// Consumes the context, returning exactly `expected` child contexts.
    pub fn take_children(self, expected: usize) -> Result<Vec<Context>, UnitError> {
        if self.children.len() != expected {
            return Err(UnitError::ContextMismatch {
                expected,
                found: self.children.len(),
            });
        }
        Ok(self.children)
    }

    /// Bytes held by this context and all of its children.
    pub fn size_bytes(&self) -> usize {
        self.saved.iter().map(Tensor::size_bytes).sum::<usize>()
            + self.children.iter().map(Context::size_bytes).sum::<usize>()
    }
}

/// A differentiable computation that can run as (part of) a pipeline stage.
///
/// `Send` is required because the overlapped schedule runs different
/// stages on different worker threads. A unit is only ever called from one
/// thread at a time.
pub trait StageUnit: Send {
    /// Name used in logs, errors and gradient listings.
    fn name(&self) -> &str;

    /// Runs the unit on `input`, returning the output and the state the
    /// matching backward call will need.
    fn forward(&mut self, input: &Tensor) -> Result<(Tensor, Context), UnitError>;

    /// Accumulates parameter gradients from `grad_output` and returns the
    /// gradient with respect to the forward input.
    fn backward(&mut self, context: Context, grad_output: &Tensor) -> Result<Tensor, UnitError>;

    /// Places the unit's parameters on `device`.
    fn place(&mut self, _device: Device) {}

    /// Named parameter tensors.
    fn parameters(&self) -> Vec<(String, &Tensor)> {
        Vec::new()
    }

    /// Named gradient accumulators, in the same order as [`parameters`](Self::parameters).
    fn parameter_gradients(&self) -> Vec<(String, &Tensor)> {
        Vec::new()
    }

    /// Resets gradient accumulators to zero.
    fn zero_grad(&mut self) {}
}

impl std::fmt::Debug for dyn StageUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "StageUnit({})", self.name())
    }
}

// ── Loss ───────────────────────────────────────────────────────────

/// A loss value together with its gradient with respect to the output.
#[derive(Debug, Clone)]
pub struct LossOutput {
    /// Loss summed over the rows of the micro-batch.
    pub loss: f32,
    /// Gradient of `loss` with respect to the output, shaped like it.
    pub grad: Tensor,
}

/// A loss over one micro-batch of outputs and targets.
///
/// Implementations return the loss *summed* over rows; the pipeline
/// normalises by the full-batch sample count.
pub trait LossFn: Sync {
    fn loss(&self, output: &Tensor, target: &Tensor) -> Result<LossOutput, TensorError>;
}

impl<F> LossFn for F
where
    F: Fn(&Tensor, &Tensor) -> Result<LossOutput, TensorError> + Sync,
{
    fn loss(&self, output: &Tensor, target: &Tensor) -> Result<LossOutput, TensorError> {
        self(output, target)
    }
}

/// Summed squared error: `Σ (output - target)²`, gradient `2 (output - target)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MseLoss;

impl LossFn for MseLoss {
    fn loss(&self, output: &Tensor, target: &Tensor) -> Result<LossOutput, TensorError> {
        let mut diff = Tensor::zeros_like(output);
        tensor_core::sub(&output.view(), &target.view(), &mut diff)?;

        let loss = diff.as_f32_slice().iter().map(|d| d * d).sum();
        let mut grad = Tensor::zeros_like(output);
        tensor_core::scale(&diff.view(), 2.0, &mut grad)?;
        Ok(LossOutput { loss, grad })
    }
}
