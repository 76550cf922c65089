// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Core tensor type and view abstractions.

use crate::{Device, Shape, TensorError};

/// An owned, n-dimensional `f32` tensor stored in contiguous memory.
///
/// `Tensor` is the payload that flows between pipeline stages. Besides its
/// shape and data it carries the [`Device`] it is placed on; kernels refuse
/// to combine tensors from different devices.
///
/// # Memory Layout
/// Data is stored in row-major (C) order. Row `i` of a tensor with shape
/// `[N, ...]` occupies `data[i * row_len .. (i + 1) * row_len]`, which is
/// what makes [`split_rows`](Tensor::split_rows) and
/// [`concat_rows`](Tensor::concat_rows) plain slice copies.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    shape: Shape,
    device: Device,
    data: Vec<f32>,
}

impl Tensor {
    /// Creates a new host tensor filled with zeros.
    ///
    /// # Examples
    /// ```
    /// use tensor_core::{Tensor, Shape};
    /// let t = Tensor::zeros(Shape::matrix(2, 3));
    /// assert_eq!(t.size_bytes(), 24); // 2 * 3 * 4 bytes
    /// ```
    pub fn zeros(shape: Shape) -> Self {
        let n = shape.num_elements();
        Self {
            shape,
            device: Device::Cpu,
            data: vec![0.0; n],
        }
    }

    /// Creates a zero tensor with the same shape and device as `other`.
    pub fn zeros_like(other: &Tensor) -> Self {
        Self::zeros(other.shape.clone()).with_device(other.device)
    }

    /// Creates a host tensor from a slice of `f32` values.
    ///
    /// # Examples
    /// ```
    /// use tensor_core::{Tensor, Shape};
    /// let t = Tensor::from_f32(Shape::vector(3), &[1.0, 2.0, 3.0]).unwrap();
    /// assert_eq!(t.as_f32_slice(), &[1.0, 2.0, 3.0]);
    /// ```
    pub fn from_f32(shape: Shape, values: &[f32]) -> Result<Self, TensorError> {
        Self::from_vec(shape, values.to_vec())
    }

    /// Creates a host tensor that takes ownership of `values`.
    pub fn from_vec(shape: Shape, values: Vec<f32>) -> Result<Self, TensorError> {
        let expected = shape.num_elements();
        if values.len() != expected {
            return Err(TensorError::BufferSizeMismatch {
                expected,
                actual: values.len(),
            });
        }
        Ok(Self {
            shape,
            device: Device::Cpu,
            data: values,
        })
    }

    /// Re-tags the tensor with `device` without copying (builder style).
    pub fn with_device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }

    /// Returns the tensor's shape.
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Returns the device this tensor is placed on.
    pub fn device(&self) -> Device {
        self.device
    }

    /// Returns the batch dimension, or `None` for scalars.
    pub fn rows(&self) -> Option<usize> {
        self.shape.leading_dim()
    }

    /// Returns an immutable view over this tensor's data.
    pub fn view(&self) -> TensorView<'_> {
        TensorView {
            shape: &self.shape,
            device: self.device,
            data: &self.data,
        }
    }

    /// Returns the memory footprint of this tensor in bytes.
    pub fn size_bytes(&self) -> usize {
        self.data.len() * std::mem::size_of::<f32>()
    }

    /// Returns the data as a flat row-major slice.
    pub fn as_f32_slice(&self) -> &[f32] {
        &self.data
    }

    /// Returns the data as a mutable flat row-major slice.
    pub fn as_f32_slice_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Consumes the tensor and returns its backing buffer.
    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }

    /// Fills the tensor with a constant value.
    pub fn fill_f32(&mut self, value: f32) {
        self.data.iter_mut().for_each(|x| *x = value);
    }

    /// Returns a copy of this tensor placed on `device`.
    pub fn to_device(&self, device: Device) -> Tensor {
        self.clone().into_device(device)
    }

    /// Moves this tensor onto `device`. A no-op when it is already resident.
    pub fn into_device(self, device: Device) -> Tensor {
        if self.device == device {
            return self;
        }
        tracing::trace!("moving {} tensor {} -> {}", self.shape, self.device, device);
        self.with_device(device)
    }

    /// Splits the tensor along its leading dimension into consecutive chunks
    /// of `rows_per_chunk` rows, preserving row order.
    ///
    /// # Errors
    /// - [`TensorError::NoLeadingDimension`] for scalars.
    /// - [`TensorError::UnevenSplit`] when `rows_per_chunk` is zero or does not
    ///   divide the leading dimension exactly.
    pub fn split_rows(&self, rows_per_chunk: usize) -> Result<Vec<Tensor>, TensorError> {
        let rows = self.rows().ok_or_else(|| TensorError::NoLeadingDimension {
            op: "split_rows",
            shape: self.shape.clone(),
        })?;
        if rows_per_chunk == 0 || rows % rows_per_chunk != 0 {
            return Err(TensorError::UnevenSplit {
                rows,
                chunk: rows_per_chunk,
            });
        }

        let chunk_shape = self.shape.with_leading_dim(rows_per_chunk);
        let chunk_len = chunk_shape.num_elements();
        if chunk_len == 0 {
            // Zero-width rows: nothing to slice, but the chunk count still matters.
            return Ok((0..rows / rows_per_chunk)
                .map(|_| Tensor::zeros(chunk_shape.clone()).with_device(self.device))
                .collect());
        }
        Ok(self
            .data
            .chunks_exact(chunk_len)
            .map(|chunk| Tensor {
                shape: chunk_shape.clone(),
                device: self.device,
                data: chunk.to_vec(),
            })
            .collect())
    }

    /// Concatenates tensors along their leading dimension, in order.
    ///
    /// All parts must share trailing dimensions and device.
    pub fn concat_rows(parts: &[Tensor]) -> Result<Tensor, TensorError> {
        let first = parts.first().ok_or(TensorError::EmptyConcat)?;
        if first.rows().is_none() {
            return Err(TensorError::NoLeadingDimension {
                op: "concat_rows",
                shape: first.shape.clone(),
            });
        }

        let mut rows = 0;
        for part in parts {
            if !part.shape.same_trailing(&first.shape) {
                return Err(TensorError::ShapeMismatch {
                    op: "concat_rows",
                    lhs: first.shape.clone(),
                    rhs: part.shape.clone(),
                });
            }
            if part.device != first.device {
                return Err(TensorError::DeviceMismatch {
                    op: "concat_rows",
                    lhs: first.device,
                    rhs: part.device,
                });
            }
            rows += part.rows().unwrap_or(0);
        }

        let mut data = Vec::with_capacity(parts.iter().map(|p| p.data.len()).sum());
        for part in parts {
            data.extend_from_slice(&part.data);
        }
        Ok(Tensor {
            shape: first.shape.with_leading_dim(rows),
            device: first.device,
            data,
        })
    }
}

/// A borrowed, read-only view over a [`Tensor`]'s data.
///
/// Views are zero-copy and tied to the lifetime of the source tensor,
/// enforced by the borrow checker.
#[derive(Debug, Clone, Copy)]
pub struct TensorView<'a> {
    shape: &'a Shape,
    device: Device,
    data: &'a [f32],
}

impl<'a> TensorView<'a> {
    /// Returns the shape of the viewed tensor.
    pub fn shape(&self) -> &'a Shape {
        self.shape
    }

    /// Returns the device of the viewed tensor.
    pub fn device(&self) -> Device {
        self.device
    }

    /// Returns the viewed data.
    pub fn as_f32_slice(&self) -> &'a [f32] {
        self.data
    }
}
