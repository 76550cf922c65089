// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for tensor operations.

use crate::{Device, Shape};

/// Errors that can occur during tensor operations.
#[derive(Debug, thiserror::Error)]
pub enum TensorError {
    /// The provided buffer length does not match the element count of the shape.
    #[error("buffer size mismatch: expected {expected} elements, got {actual}")]
    BufferSizeMismatch { expected: usize, actual: usize },

    /// Two tensors have incompatible shapes for the requested operation.
    #[error("incompatible shapes for {op}: {lhs} vs {rhs}")]
    ShapeMismatch {
        op: &'static str,
        lhs: Shape,
        rhs: Shape,
    },

    /// Operands live on different devices.
    #[error("device mismatch for {op}: {lhs} vs {rhs}")]
    DeviceMismatch {
        op: &'static str,
        lhs: Device,
        rhs: Device,
    },

    /// The tensor has no leading (batch) dimension to split or concatenate along.
    #[error("{op} requires a tensor with at least one dimension, got shape {shape}")]
    NoLeadingDimension { op: &'static str, shape: Shape },

    /// The leading dimension is not evenly divisible by the requested chunk size.
    #[error("cannot split {rows} rows into chunks of {chunk}")]
    UnevenSplit { rows: usize, chunk: usize },

    /// Concatenation was requested over an empty list of tensors.
    #[error("cannot concatenate an empty list of tensors")]
    EmptyConcat,

    /// A device identifier string could not be parsed.
    #[error("invalid device '{0}': expected 'cpu' or 'gpu:<ordinal>'")]
    InvalidDevice(String),
}
