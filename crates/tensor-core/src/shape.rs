// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Tensor shapes, with the first dimension read as the batch dimension.

use std::fmt;

/// Dimensions of a [`crate::Tensor`], outermost first.
///
/// Micro-batching only ever cuts along dimension 0; everything after it is
/// the per-row shape and must match across the pieces of one batch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Shape {
    dims: Vec<usize>,
}

impl Shape {
    /// # Examples
    /// ```
    /// use tensor_core::Shape;
    /// let s = Shape::new(vec![12, 3, 4]);
    /// assert_eq!(s.leading_dim(), Some(12));
    /// assert_eq!(s.with_leading_dim(4).num_elements(), 48);
    /// ```
    pub fn new(dims: Vec<usize>) -> Self {
        Self { dims }
    }

    pub fn scalar() -> Self {
        Self { dims: vec![] }
    }

    pub fn vector(len: usize) -> Self {
        Self { dims: vec![len] }
    }

    pub fn matrix(rows: usize, cols: usize) -> Self {
        Self {
            dims: vec![rows, cols],
        }
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Product of all dimensions; 1 for a scalar.
    pub fn num_elements(&self) -> usize {
        self.dims.iter().product()
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn dim(&self, index: usize) -> Option<usize> {
        self.dims.get(index).copied()
    }

    /// Bytes taken by an `f32` payload of this shape.
    pub fn size_bytes(&self) -> usize {
        self.num_elements() * std::mem::size_of::<f32>()
    }

    /// The batch dimension, or `None` for scalars.
    pub fn leading_dim(&self) -> Option<usize> {
        self.dims.first().copied()
    }

    /// This shape with `rows` as its batch dimension.
    ///
    /// A scalar becomes a vector of `rows` elements.
    pub fn with_leading_dim(&self, rows: usize) -> Shape {
        let mut dims = self.dims.clone();
        match dims.first_mut() {
            Some(first) => *first = rows,
            None => dims.push(rows),
        }
        Shape { dims }
    }

    /// Whether both shapes have the same per-row shape.
    pub fn same_trailing(&self, other: &Shape) -> bool {
        self.rank() == other.rank() && self.dims.get(1..) == other.dims.get(1..)
    }

    /// `[M, K] x [K, N]`.
    pub fn is_matmul_compatible(&self, other: &Shape) -> bool {
        matches!((self.dims.as_slice(), other.dims.as_slice()), ([_, k], [k2, _]) if k == k2)
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dims: Vec<String> = self.dims.iter().map(usize::to_string).collect();
        write!(f, "[{}]", dims.join(", "))
    }
}

impl From<Vec<usize>> for Shape {
    fn from(dims: Vec<usize>) -> Self {
        Self::new(dims)
    }
}
