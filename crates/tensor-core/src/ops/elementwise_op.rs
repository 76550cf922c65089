// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Element-wise and row-wise arithmetic.

use super::{ensure_same_device, ensure_same_shape};
use crate::{Shape, Tensor, TensorError, TensorView};

/// Accumulates `src` into `dst` element-wise (`dst += src`).
///
/// This is the gradient accumulation primitive: parameter gradients from
/// successive micro-batches are summed into the same buffer.
pub fn add_assign(dst: &mut Tensor, src: &TensorView<'_>) -> Result<(), TensorError> {
    ensure_same_device("add_assign", dst.device(), src.device())?;
    ensure_same_shape("add_assign", dst.shape(), src.shape())?;

    for (d, s) in dst.as_f32_slice_mut().iter_mut().zip(src.as_f32_slice()) {
        *d += s;
    }
    Ok(())
}

/// Computes `output = lhs - rhs` element-wise.
pub fn sub(
    lhs: &TensorView<'_>,
    rhs: &TensorView<'_>,
    output: &mut Tensor,
) -> Result<(), TensorError> {
    ensure_same_device("sub", lhs.device(), rhs.device())?;
    ensure_same_device("sub (output)", lhs.device(), output.device())?;
    ensure_same_shape("sub", lhs.shape(), rhs.shape())?;
    ensure_same_shape("sub (output)", lhs.shape(), output.shape())?;

    let out = output.as_f32_slice_mut();
    for ((o, a), b) in out.iter_mut().zip(lhs.as_f32_slice()).zip(rhs.as_f32_slice()) {
        *o = a - b;
    }
    Ok(())
}

/// Computes `output = input * factor`.
pub fn scale(input: &TensorView<'_>, factor: f32, output: &mut Tensor) -> Result<(), TensorError> {
    ensure_same_device("scale", input.device(), output.device())?;
    ensure_same_shape("scale", input.shape(), output.shape())?;

    for (o, x) in output.as_f32_slice_mut().iter_mut().zip(input.as_f32_slice()) {
        *o = x * factor;
    }
    Ok(())
}

/// Adds a `[C]` bias vector to every row of a `[N, C]` tensor in place.
pub fn add_row_bias(output: &mut Tensor, bias: &TensorView<'_>) -> Result<(), TensorError> {
    ensure_same_device("add_row_bias", output.device(), bias.device())?;

    let cols = output.shape().dim(1);
    if output.shape().rank() != 2 || bias.shape() != &Shape::vector(cols.unwrap_or(0)) {
        return Err(TensorError::ShapeMismatch {
            op: "add_row_bias",
            lhs: output.shape().clone(),
            rhs: bias.shape().clone(),
        });
    }

    let b = bias.as_f32_slice();
    for row in output.as_f32_slice_mut().chunks_exact_mut(b.len().max(1)) {
        for (o, bj) in row.iter_mut().zip(b) {
            *o += bj;
        }
    }
    Ok(())
}

/// Sums a `[N, C]` tensor over its rows into a `[C]` output.
///
/// Used for bias gradients.
pub fn sum_rows(input: &TensorView<'_>, output: &mut Tensor) -> Result<(), TensorError> {
    ensure_same_device("sum_rows", input.device(), output.device())?;

    let cols = input.shape().dim(1);
    if input.shape().rank() != 2 || output.shape() != &Shape::vector(cols.unwrap_or(0)) {
        return Err(TensorError::ShapeMismatch {
            op: "sum_rows",
            lhs: input.shape().clone(),
            rhs: output.shape().clone(),
        });
    }

    let out = output.as_f32_slice_mut();
    out.iter_mut().for_each(|x| *x = 0.0);
    for row in input.as_f32_slice().chunks_exact(out.len().max(1)) {
        for (o, x) in out.iter_mut().zip(row) {
            *o += x;
        }
    }
    Ok(())
}

/// Applies `max(0, x)` element-wise.
pub fn relu(input: &TensorView<'_>, output: &mut Tensor) -> Result<(), TensorError> {
    ensure_same_device("relu", input.device(), output.device())?;
    ensure_same_shape("relu", input.shape(), output.shape())?;

    for (o, &x) in output.as_f32_slice_mut().iter_mut().zip(input.as_f32_slice()) {
        *o = x.max(0.0);
    }
    Ok(())
}

/// Back-propagates through ReLU: `grad_input = grad_output * (input > 0)`.
pub fn relu_backward(
    input: &TensorView<'_>,
    grad_output: &TensorView<'_>,
    grad_input: &mut Tensor,
) -> Result<(), TensorError> {
    ensure_same_device("relu_backward", input.device(), grad_output.device())?;
    ensure_same_device("relu_backward (output)", input.device(), grad_input.device())?;
    ensure_same_shape("relu_backward", input.shape(), grad_output.shape())?;
    ensure_same_shape("relu_backward (output)", input.shape(), grad_input.shape())?;

    let out = grad_input.as_f32_slice_mut();
    for ((o, &x), &g) in out
        .iter_mut()
        .zip(input.as_f32_slice())
        .zip(grad_output.as_f32_slice())
    {
        *o = if x > 0.0 { g } else { 0.0 };
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Device;

    #[test]
    fn test_add_assign_accumulates() {
        let mut acc = Tensor::zeros(Shape::vector(3));
        let g = Tensor::from_f32(Shape::vector(3), &[1.0, 2.0, 3.0]).unwrap();
        add_assign(&mut acc, &g.view()).unwrap();
        add_assign(&mut acc, &g.view()).unwrap();
        assert_eq!(acc.as_f32_slice(), &[2.0, 4.0, 6.0]);
    }

    #[test]
    fn test_add_assign_device_mismatch() {
        let mut acc = Tensor::zeros(Shape::vector(2)).with_device(Device::Gpu(0));
        let g = Tensor::zeros(Shape::vector(2));
        assert!(add_assign(&mut acc, &g.view()).is_err());
    }

    #[test]
    fn test_sub_and_scale() {
        let a = Tensor::from_f32(Shape::vector(3), &[3.0, 2.0, 1.0]).unwrap();
        let b = Tensor::from_f32(Shape::vector(3), &[1.0, 1.0, 1.0]).unwrap();
        let mut d = Tensor::zeros(Shape::vector(3));
        sub(&a.view(), &b.view(), &mut d).unwrap();
        assert_eq!(d.as_f32_slice(), &[2.0, 1.0, 0.0]);

        let mut s = Tensor::zeros(Shape::vector(3));
        scale(&d.view(), 0.5, &mut s).unwrap();
        assert_eq!(s.as_f32_slice(), &[1.0, 0.5, 0.0]);
    }

    #[test]
    fn test_row_bias_and_sum_rows() {
        let mut x = Tensor::from_f32(Shape::matrix(2, 2), &[1.0, 2.0, 3.0, 4.0]).unwrap();
        let bias = Tensor::from_f32(Shape::vector(2), &[10.0, 20.0]).unwrap();
        add_row_bias(&mut x, &bias.view()).unwrap();
        assert_eq!(x.as_f32_slice(), &[11.0, 22.0, 13.0, 24.0]);

        let mut sums = Tensor::zeros(Shape::vector(2));
        sum_rows(&x.view(), &mut sums).unwrap();
        assert_eq!(sums.as_f32_slice(), &[24.0, 46.0]);
    }

    #[test]
    fn test_row_bias_shape_mismatch() {
        let mut x = Tensor::zeros(Shape::matrix(2, 2));
        let bias = Tensor::zeros(Shape::vector(3));
        assert!(add_row_bias(&mut x, &bias.view()).is_err());
    }

    #[test]
    fn test_relu_forward_backward() {
        let x = Tensor::from_f32(Shape::vector(4), &[-1.0, 0.0, 0.5, 2.0]).unwrap();
        let mut y = Tensor::zeros(Shape::vector(4));
        relu(&x.view(), &mut y).unwrap();
        assert_eq!(y.as_f32_slice(), &[0.0, 0.0, 0.5, 2.0]);

        let g = Tensor::from_f32(Shape::vector(4), &[1.0, 1.0, 1.0, 3.0]).unwrap();
        let mut gx = Tensor::zeros(Shape::vector(4));
        relu_backward(&x.view(), &g.view(), &mut gx).unwrap();
        assert_eq!(gx.as_f32_slice(), &[0.0, 0.0, 1.0, 3.0]);
    }
}
