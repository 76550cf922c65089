// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Benchmarks for the kernels used by stage units.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tensor_core::{matmul, matmul_lhs_transposed, Shape, Tensor};

fn filled(rows: usize, cols: usize) -> Tensor {
    let values: Vec<f32> = (0..rows * cols).map(|i| (i % 7) as f32 * 0.1).collect();
    Tensor::from_vec(Shape::matrix(rows, cols), values).unwrap()
}

fn bench_matmul(c: &mut Criterion) {
    let a = filled(64, 128);
    let b = filled(128, 64);
    let mut out = Tensor::zeros(Shape::matrix(64, 64));
    c.bench_function("matmul 64x128x64", |bench| {
        bench.iter(|| matmul(&black_box(&a).view(), &black_box(&b).view(), &mut out).unwrap())
    });
}

fn bench_weight_gradient(c: &mut Criterion) {
    let x = filled(64, 128);
    let dy = filled(64, 64);
    let mut dw = Tensor::zeros(Shape::matrix(128, 64));
    c.bench_function("matmul_lhs_transposed 128x64", |bench| {
        bench.iter(|| {
            matmul_lhs_transposed(&black_box(&x).view(), &black_box(&dy).view(), &mut dw).unwrap()
        })
    });
}

fn bench_split_concat(c: &mut Criterion) {
    let batch = filled(256, 64);
    c.bench_function("split_rows + concat_rows 256x64 / 16", |bench| {
        bench.iter(|| {
            let parts = black_box(&batch).split_rows(16).unwrap();
            Tensor::concat_rows(&parts).unwrap()
        })
    });
}

criterion_group!(benches, bench_matmul, bench_weight_gradient, bench_split_concat);
criterion_main!(benches);
