// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Matrix multiplication and its transposed forms.
//!
//! The two transposed variants are what a linear layer's backward pass
//! needs: `dW = Xᵀ · dY` and `dX = dY · Wᵀ`. They index the operands in
//! place instead of materialising a transposed copy.

use super::{ensure_same_device, ensure_same_shape};
use crate::{Shape, Tensor, TensorError, TensorView};

/// Performs matrix multiplication: `output = lhs @ rhs`.
///
/// `lhs` is `[M, K]`, `rhs` is `[K, N]`, and `output` must be `[M, N]`.
///
/// # Errors
/// Returns [`TensorError::ShapeMismatch`] if dimensions are incompatible and
/// [`TensorError::DeviceMismatch`] if the operands are on different devices.
pub fn matmul(
    lhs: &TensorView<'_>,
    rhs: &TensorView<'_>,
    output: &mut Tensor,
) -> Result<(), TensorError> {
    ensure_same_device("matmul", lhs.device(), rhs.device())?;
    ensure_same_device("matmul (output)", lhs.device(), output.device())?;

    if !lhs.shape().is_matmul_compatible(rhs.shape()) {
        return Err(TensorError::ShapeMismatch {
            op: "matmul",
            lhs: lhs.shape().clone(),
            rhs: rhs.shape().clone(),
        });
    }

    let (m, k) = (lhs.shape().dims()[0], lhs.shape().dims()[1]);
    let n = rhs.shape().dims()[1];
    ensure_same_shape("matmul (output)", &Shape::matrix(m, n), output.shape())?;

    let a = lhs.as_f32_slice();
    let b = rhs.as_f32_slice();
    let c = output.as_f32_slice_mut();
    c.iter_mut().for_each(|x| *x = 0.0);

    // ikj loop order: the inner loop is a saxpy on a row of C,
    // which is sequential in memory.
    for i in 0..m {
        let c_row = &mut c[i * n..(i + 1) * n];
        for p in 0..k {
            let a_ip = a[i * k + p];
            let b_row = &b[p * n..(p + 1) * n];
            for (cj, bj) in c_row.iter_mut().zip(b_row) {
                *cj += a_ip * bj;
            }
        }
    }

    Ok(())
}

/// Computes `output = lhsᵀ @ rhs`.
///
/// `lhs` is `[K, M]`, `rhs` is `[K, N]`, and `output` must be `[M, N]`.
pub fn matmul_lhs_transposed(
    lhs: &TensorView<'_>,
    rhs: &TensorView<'_>,
    output: &mut Tensor,
) -> Result<(), TensorError> {
    ensure_same_device("matmul_lhs_transposed", lhs.device(), rhs.device())?;
    ensure_same_device("matmul_lhs_transposed (output)", lhs.device(), output.device())?;

    let (ld, rd) = (lhs.shape().dims(), rhs.shape().dims());
    if ld.len() != 2 || rd.len() != 2 || ld[0] != rd[0] {
        return Err(TensorError::ShapeMismatch {
            op: "matmul_lhs_transposed",
            lhs: lhs.shape().clone(),
            rhs: rhs.shape().clone(),
        });
    }

    let (k, m, n) = (ld[0], ld[1], rd[1]);
    ensure_same_shape(
        "matmul_lhs_transposed (output)",
        &Shape::matrix(m, n),
        output.shape(),
    )?;

    let a = lhs.as_f32_slice();
    let b = rhs.as_f32_slice();
    let c = output.as_f32_slice_mut();
    c.iter_mut().for_each(|x| *x = 0.0);

    for p in 0..k {
        let b_row = &b[p * n..(p + 1) * n];
        for i in 0..m {
            let a_pi = a[p * m + i];
            let c_row = &mut c[i * n..(i + 1) * n];
            for (cj, bj) in c_row.iter_mut().zip(b_row) {
                *cj += a_pi * bj;
            }
        }
    }

    Ok(())
}

/// Computes `output = lhs @ rhsᵀ`.
///
/// `lhs` is `[M, K]`, `rhs` is `[N, K]`, and `output` must be `[M, N]`.
pub fn matmul_rhs_transposed(
    lhs: &TensorView<'_>,
    rhs: &TensorView<'_>,
    output: &mut Tensor,
) -> Result<(), TensorError> {
    ensure_same_device("matmul_rhs_transposed", lhs.device(), rhs.device())?;
    ensure_same_device("matmul_rhs_transposed (output)", lhs.device(), output.device())?;

    let (ld, rd) = (lhs.shape().dims(), rhs.shape().dims());
    if ld.len() != 2 || rd.len() != 2 || ld[1] != rd[1] {
        return Err(TensorError::ShapeMismatch {
            op: "matmul_rhs_transposed",
            lhs: lhs.shape().clone(),
            rhs: rhs.shape().clone(),
        });
    }

    let (m, k, n) = (ld[0], ld[1], rd[0]);
    ensure_same_shape(
        "matmul_rhs_transposed (output)",
        &Shape::matrix(m, n),
        output.shape(),
    )?;

    let a = lhs.as_f32_slice();
    let b = rhs.as_f32_slice();
    let c = output.as_f32_slice_mut();

    // Both operands are walked along contiguous rows: a dot product per cell.
    for i in 0..m {
        let a_row = &a[i * k..(i + 1) * k];
        for j in 0..n {
            let b_row = &b[j * k..(j + 1) * k];
            c[i * n + j] = a_row.iter().zip(b_row).map(|(x, y)| x * y).sum();
        }
    }

    Ok(())
}
