// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Integration tests: end-to-end pipeline-parallel training steps.
//!
//! These tests compare pipelined forward/backward against the same units
//! run unpartitioned over the whole batch, check micro-batch ordering at
//! every stage, and exercise the graph → assembly → pipeline path.

use pipeline_rt::units::{Gelu, Identity, Linear, Relu};
use pipeline_rt::{
    Context, LossFn, MseLoss, PipelineConfig, PipelineError, PipelineParallel, PipelineState,
    Schedule, StageAssembly, StageUnit, StageWrapper, UnitError,
};
use stage_graph::{GraphDescription, GraphError, Node};
use std::sync::{Arc, Mutex};
use tensor_core::{Device, Shape, Tensor};

const TOL: f32 = 1e-4;

// ── Helpers ────────────────────────────────────────────────────

/// Deterministic, mildly varied values in roughly [-1, 1].
fn values(n: usize, salt: usize) -> Vec<f32> {
    (0..n)
        .map(|i| (((i + salt) * 37 % 17) as f32 - 8.0) / 8.0)
        .collect()
}

fn matrix(rows: usize, cols: usize, salt: usize) -> Tensor {
    Tensor::from_vec(Shape::matrix(rows, cols), values(rows * cols, salt)).unwrap()
}

fn linear(name: &str, inp: usize, out: usize, salt: usize) -> Box<dyn StageUnit> {
    let weight = Tensor::from_vec(
        Shape::matrix(inp, out),
        values(inp * out, salt).into_iter().map(|v| v * 0.5).collect(),
    )
    .unwrap();
    let bias = Tensor::from_vec(Shape::vector(out), values(out, salt + 3)).unwrap();
    Box::new(Linear::new(name, weight, bias).unwrap())
}

/// A small MLP as a flat list of named units: 3 → 5 → 4 → 4 → 2.
fn mlp() -> Vec<(String, Box<dyn StageUnit>)> {
    vec![
        ("fc1".to_string(), linear("fc1", 3, 5, 1)),
        ("act1".to_string(), Box::new(Gelu::new("act1")) as Box<dyn StageUnit>),
        ("fc2".to_string(), linear("fc2", 5, 4, 2)),
        ("act2".to_string(), Box::new(Relu::new("act2"))),
        ("fc3".to_string(), linear("fc3", 4, 4, 3)),
        ("act3".to_string(), Box::new(Gelu::new("act3"))),
        ("fc4".to_string(), linear("fc4", 4, 2, 4)),
    ]
}

/// Cuts `units` into `stages` contiguous, non-empty assemblies.
fn split_into_stages(
    units: Vec<(String, Box<dyn StageUnit>)>,
    stages: usize,
) -> Vec<Box<dyn StageUnit>> {
    let total = units.len();
    let mut out: Vec<StageAssembly> = (0..stages)
        .map(|s| StageAssembly::new(format!("stage{s}")))
        .collect();
    for (i, (scope, unit)) in units.into_iter().enumerate() {
        out[i * stages / total].push(scope, unit).unwrap();
    }
    out.into_iter()
        .map(|a| Box::new(a) as Box<dyn StageUnit>)
        .collect()
}

/// Flattened gradients of every parameter, in stage then unit order.
fn flat_gradients(pipe: &PipelineParallel) -> Vec<(String, Vec<f32>)> {
    pipe.parameter_gradients()
        .into_iter()
        .flatten()
        .map(|(name, t)| (name, t.as_f32_slice().to_vec()))
        .collect()
}

struct Reference {
    output: Tensor,
    loss: f32,
    gradients: Vec<(String, Vec<f32>)>,
}

/// Runs the whole MLP over the whole batch with no pipelining.
fn reference(x: &Tensor, y: &Tensor) -> Reference {
    let mut whole = StageAssembly::new("reference");
    for (scope, unit) in mlp() {
        whole.push(scope, unit).unwrap();
    }
    let (output, ctx) = whole.forward(x).unwrap();

    let n = x.rows().unwrap() as f32;
    let loss = MseLoss.loss(&output, y).unwrap();
    let mut grad = Tensor::zeros_like(&loss.grad);
    tensor_core::scale(&loss.grad.view(), 1.0 / n, &mut grad).unwrap();
    whole.backward(ctx, &grad).unwrap();

    let gradients = whole
        .parameter_gradients()
        .into_iter()
        .map(|(name, t)| (name, t.as_f32_slice().to_vec()))
        .collect();
    Reference {
        output,
        loss: loss.loss / n,
        gradients,
    }
}

fn assert_close(a: &[f32], b: &[f32], what: &str) {
    assert_eq!(a.len(), b.len(), "{what}: length");
    for (i, (x, y)) in a.iter().zip(b).enumerate() {
        assert!((x - y).abs() < TOL, "{what}[{i}]: {x} vs {y}");
    }
}

fn gpu_devices(n: usize) -> Vec<Device> {
    (0..n as u32).map(Device::Gpu).collect()
}

/// Logs every forward and backward call with the first input value it saw.
struct Recorder {
    name: String,
    stage: usize,
    log: Arc<Mutex<Vec<(usize, &'static str, f32)>>>,
}

impl StageUnit for Recorder {
    fn name(&self) -> &str {
        &self.name
    }

    fn forward(&mut self, input: &Tensor) -> Result<(Tensor, Context), UnitError> {
        let first = input.as_f32_slice()[0];
        self.log.lock().unwrap().push((self.stage, "forward", first));
        Ok((input.clone(), Context::with_saved(vec![input.clone()])))
    }

    fn backward(&mut self, context: Context, grad_output: &Tensor) -> Result<Tensor, UnitError> {
        let saved = context.take_saved(1)?;
        let first = saved[0].as_f32_slice()[0];
        self.log.lock().unwrap().push((self.stage, "backward", first));
        Ok(grad_output.clone())
    }
}

// ── Concrete scenarios ─────────────────────────────────────────

#[test]
fn test_identity_12_rows_4_per_micro_batch_3_stages() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let units: Vec<Box<dyn StageUnit>> = (0..3)
        .map(|stage| {
            Box::new(Recorder {
                name: format!("rec{stage}"),
                stage,
                log: Arc::clone(&log),
            }) as Box<dyn StageUnit>
        })
        .collect();
    let mut pipe = PipelineParallel::new(units, gpu_devices(3), 4).unwrap();

    let rows: Vec<f32> = (0..12).map(|r| r as f32).collect();
    let batch = Tensor::from_f32(Shape::matrix(12, 1), &rows).unwrap();
    let out = pipe.forward(&batch).unwrap();

    assert_eq!(out, batch);
    assert_eq!(pipe.pending_cache_entries(), vec![3, 3, 3]);
    for stage in 0..3 {
        let seen: Vec<f32> = log
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, dir, _)| *s == stage && *dir == "forward")
            .map(|(_, _, v)| *v)
            .collect();
        // Micro-batches 0, 1, 2 start at rows 0, 4, 8.
        assert_eq!(seen, vec![0.0, 4.0, 8.0], "stage {stage}");
    }
}

#[test]
fn test_single_micro_batch_matches_reference() {
    let x = matrix(8, 3, 11);
    let y = matrix(8, 2, 5);
    let expected = reference(&x, &y);

    for stages in 1..=4 {
        let mut pipe = PipelineParallel::new(split_into_stages(mlp(), stages), gpu_devices(stages), 8)
            .unwrap()
            .with_profiling(true);
        let out = pipe.forward(&x).unwrap();
        assert_close(out.as_f32_slice(), expected.output.as_f32_slice(), "output");

        pipe.backward(&MseLoss, &out, &y).unwrap();
        // One micro-batch: the overlapped schedule degenerates to sequential.
        assert_eq!(pipe.metrics().micro_batches, 1);
        assert_eq!(pipe.metrics().ticks, 2 * stages);
    }
}

// ── Numerical equivalence ──────────────────────────────────────

#[test]
fn test_forward_matches_unpartitioned_model() {
    let x = matrix(12, 3, 7);
    let y = matrix(12, 2, 9);
    let expected = reference(&x, &y);

    for stages in 1..=4 {
        for micro in [1, 2, 3, 4, 6, 12] {
            let mut pipe =
                PipelineParallel::new(split_into_stages(mlp(), stages), gpu_devices(stages), micro)
                    .unwrap();
            let out = pipe.forward(&x).unwrap();
            assert_eq!(out.shape(), expected.output.shape());
            assert_eq!(out.device(), Device::Cpu);
            assert_close(
                out.as_f32_slice(),
                expected.output.as_f32_slice(),
                &format!("S={stages} m={micro}"),
            );
            pipe.reset();
        }
    }
}

#[test]
fn test_gradients_match_unpartitioned_model() {
    let x = matrix(8, 3, 2);
    let y = matrix(8, 2, 13);
    let expected = reference(&x, &y);

    for stages in 1..=4 {
        let mut pipe =
            PipelineParallel::new(split_into_stages(mlp(), stages), gpu_devices(stages), 2).unwrap();
        let out = pipe.forward(&x).unwrap();
        let loss = pipe.backward(&MseLoss, &out, &y).unwrap();

        assert!((loss - expected.loss).abs() < TOL, "S={stages} loss");
        let got = flat_gradients(&pipe);
        assert_eq!(got.len(), expected.gradients.len());
        for ((name, g), (ref_name, r)) in got.iter().zip(&expected.gradients) {
            assert_eq!(name, ref_name);
            assert_close(g, r, &format!("S={stages} {name}"));
        }
    }
}

#[test]
fn test_schedules_produce_identical_results() {
    let x = matrix(12, 3, 4);
    let y = matrix(12, 2, 8);

    let mut runs = Vec::new();
    for schedule in [Schedule::Sequential, Schedule::Overlapped] {
        let mut pipe = PipelineParallel::new(split_into_stages(mlp(), 3), gpu_devices(3), 3)
            .unwrap()
            .with_schedule(schedule);
        let out = pipe.forward(&x).unwrap();
        let loss = pipe.backward(&MseLoss, &out, &y).unwrap();
        runs.push((out, loss, flat_gradients(&pipe)));
    }
    assert_eq!(runs[0], runs[1]);
}

#[test]
fn test_gradients_accumulate_until_zeroed() {
    let x = matrix(4, 3, 1);
    let y = matrix(4, 2, 2);
    let mut pipe = PipelineParallel::new(split_into_stages(mlp(), 2), gpu_devices(2), 2).unwrap();

    let out = pipe.forward(&x).unwrap();
    pipe.backward(&MseLoss, &out, &y).unwrap();
    let once = flat_gradients(&pipe);

    let out = pipe.forward(&x).unwrap();
    pipe.backward(&MseLoss, &out, &y).unwrap();
    for ((_, twice), (name, once)) in flat_gradients(&pipe).iter().zip(&once) {
        let doubled: Vec<f32> = once.iter().map(|v| v * 2.0).collect();
        assert_close(twice, &doubled, name);
    }

    pipe.zero_grad();
    assert!(flat_gradients(&pipe)
        .iter()
        .all(|(_, g)| g.iter().all(|&v| v == 0.0)));
}

// ── Ordering ───────────────────────────────────────────────────

#[test]
fn test_cache_entries_created_and_consumed_in_micro_batch_order() {
    for schedule in [Schedule::Sequential, Schedule::Overlapped] {
        let log = Arc::new(Mutex::new(Vec::new()));
        let units: Vec<Box<dyn StageUnit>> = (0..4)
            .map(|stage| {
                Box::new(Recorder {
                    name: format!("rec{stage}"),
                    stage,
                    log: Arc::clone(&log),
                }) as Box<dyn StageUnit>
            })
            .collect();
        let mut pipe = PipelineParallel::new(units, vec![Device::Cpu; 4], 2)
            .unwrap()
            .with_schedule(schedule);

        let rows: Vec<f32> = (0..10).map(|r| r as f32).collect();
        let x = Tensor::from_f32(Shape::matrix(10, 1), &rows).unwrap();
        let out = pipe.forward(&x).unwrap();
        pipe.backward(&MseLoss, &out, &x).unwrap();

        let log = log.lock().unwrap();
        for stage in 0..4 {
            for dir in ["forward", "backward"] {
                let order: Vec<f32> = log
                    .iter()
                    .filter(|(s, d, _)| *s == stage && *d == dir)
                    .map(|(_, _, v)| *v)
                    .collect();
                assert_eq!(
                    order,
                    vec![0.0, 2.0, 4.0, 6.0, 8.0],
                    "{schedule} stage {stage} {dir}"
                );
            }
        }
        // Backward visits the last stage first.
        let first_backward = log.iter().find(|(_, d, _)| *d == "backward").unwrap();
        assert_eq!(first_backward.0, 3);
    }
}

// ── Error cases ────────────────────────────────────────────────

#[test]
fn test_backward_before_forward_is_sequence_error() {
    let mut pipe = PipelineParallel::new(split_into_stages(mlp(), 2), gpu_devices(2), 2).unwrap();
    let y = matrix(4, 2, 0);
    let err = pipe.backward(&MseLoss, &y, &y).unwrap_err();
    assert!(matches!(
        err,
        PipelineError::SequenceError {
            operation: "backward",
            state: PipelineState::Idle
        }
    ));
}

#[test]
fn test_second_backward_is_sequence_error() {
    let x = matrix(4, 3, 0);
    let y = matrix(4, 2, 0);
    let mut pipe = PipelineParallel::new(split_into_stages(mlp(), 2), gpu_devices(2), 2).unwrap();
    let out = pipe.forward(&x).unwrap();
    pipe.backward(&MseLoss, &out, &y).unwrap();
    assert!(matches!(
        pipe.backward(&MseLoss, &out, &y),
        Err(PipelineError::SequenceError { .. })
    ));
}

#[test]
fn test_stage_backward_without_forward_is_cache_underflow() {
    let mut stage = StageWrapper::new(2, Box::new(Identity::new("id")), Device::Gpu(2), None);
    let err = stage.backward(matrix(1, 1, 0)).unwrap_err();
    assert!(matches!(err, PipelineError::CacheUnderflow { stage: 2 }));
    assert!(err.to_string().contains("stage 2"));
}

#[test]
fn test_extra_stage_backward_is_cache_underflow() {
    let mut stage = StageWrapper::new(0, Box::new(Identity::new("id")), Device::Cpu, None);
    stage.forward(0, matrix(1, 1, 0)).unwrap();
    stage.backward(matrix(1, 1, 0)).unwrap();
    assert!(matches!(
        stage.backward(matrix(1, 1, 0)),
        Err(PipelineError::CacheUnderflow { stage: 0 })
    ));
}

// ── Graph → pipeline ───────────────────────────────────────────

const MLP_GRAPH: &str = r#"{
    "name": "mlp",
    "nodes": [
        { "id": "input0", "kind": "input" },
        { "id": "Net/Linear[fc1]", "kind": "layer", "inputs": ["input0"], "stage": 0, "weight": 2.0 },
        { "id": "Net/Linear[fc1]/weight", "kind": "param", "outputs": ["Net/Linear[fc1]"] },
        { "id": "Net/GELU[act1]", "kind": "layer", "inputs": ["Net/Linear[fc1]"], "stage": 0, "weight": 0.5 },
        { "id": "Net/Linear[fc2]", "kind": "layer", "inputs": ["Net/GELU[act1]"], "stage": 1, "weight": 2.0 },
        { "id": "Net/ReLU[act2]", "kind": "layer", "inputs": ["Net/Linear[fc2]"], "stage": 1, "weight": 0.5 },
        { "id": "Net/Linear[fc3]", "kind": "layer", "inputs": ["Net/ReLU[act2]"], "stage": 2, "weight": 2.0 },
        { "id": "output0", "kind": "output", "inputs": ["Net/Linear[fc3]"] }
    ]
}"#;

fn unit_for(node: &Node) -> Result<Box<dyn StageUnit>, PipelineError> {
    let unit: Box<dyn StageUnit> = match node.id.as_str() {
        "Net/Linear[fc1]" => linear(&node.id, 3, 4, 1),
        "Net/Linear[fc2]" => linear(&node.id, 4, 4, 2),
        "Net/Linear[fc3]" => linear(&node.id, 4, 2, 3),
        id if id.starts_with("Net/GELU") => Box::new(Gelu::new(id)),
        id if id.starts_with("Net/ReLU") => Box::new(Relu::new(id)),
        other => {
            return Err(PipelineError::ConfigError(format!("no unit for '{other}'")));
        }
    };
    Ok(unit)
}

#[test]
fn test_pipeline_from_graph_description() {
    let graph = GraphDescription::from_json(MLP_GRAPH)
        .unwrap()
        .into_graph()
        .unwrap()
        .validate()
        .unwrap();
    let config = PipelineConfig::from_toml(
        r#"
micro_batch_size = 2
devices = ["gpu:0", "gpu:1", "cpu"]
output_device = "cpu"
schedule = "overlapped"
enable_profiling = true
"#,
    )
    .unwrap();

    let mut pipe = PipelineParallel::from_graph(&graph, unit_for, &config).unwrap();
    assert_eq!(pipe.num_stages(), 3);
    assert_eq!(pipe.devices(), vec![Device::Gpu(0), Device::Gpu(1), Device::Cpu]);

    let x = matrix(6, 3, 3);
    let y = matrix(6, 2, 6);
    let out = pipe.forward(&x).unwrap();
    assert_eq!(out.shape(), &Shape::matrix(6, 2));

    // Same units chained directly.
    let mut whole = StageAssembly::new("whole");
    for node in graph.iter_layers() {
        whole.push(node.id.clone(), unit_for(node).unwrap()).unwrap();
    }
    let (direct, _) = whole.forward(&x).unwrap();
    assert_close(out.as_f32_slice(), direct.as_f32_slice(), "graph pipeline output");

    let loss = pipe.backward(&MseLoss, &out, &y).unwrap();
    assert!(loss > 0.0);
    assert_eq!(pipe.metrics().backward_passes, 1);
    assert!(pipe.metrics().summary().contains("3 stages"));
}

#[test]
fn test_non_monotonic_graph_is_rejected() {
    let json = MLP_GRAPH.replace(
        r#""id": "Net/Linear[fc3]", "kind": "layer", "inputs": ["Net/ReLU[act2]"], "stage": 2"#,
        r#""id": "Net/Linear[fc3]", "kind": "layer", "inputs": ["Net/ReLU[act2]"], "stage": 0"#,
    );
    let err = GraphDescription::from_json(&json)
        .unwrap()
        .into_graph()
        .unwrap()
        .validate()
        .unwrap_err();
    match err {
        GraphError::NonMonotonicStage {
            node,
            stage,
            input,
            input_stage,
        } => {
            assert_eq!(node, "Net/Linear[fc3]");
            assert_eq!(stage, 0);
            assert_eq!(input, "Net/ReLU[act2]");
            assert_eq!(input_stage, 1);
        }
        other => panic!("expected NonMonotonicStage, got {other:?}"),
    }
}

#[test]
fn test_partition_stage_count_must_match_devices() {
    let graph = GraphDescription::from_json(MLP_GRAPH)
        .unwrap()
        .into_graph()
        .unwrap()
        .validate()
        .unwrap();
    let config = PipelineConfig {
        micro_batch_size: 2,
        devices: vec!["gpu:0".into(), "gpu:1".into()],
        ..Default::default()
    };
    assert!(matches!(
        PipelineParallel::from_graph(&graph, unit_for, &config),
        Err(PipelineError::ConfigError(_))
    ));
}

#[test]
fn test_unassigned_layer_surfaces_as_graph_error() {
    let json = MLP_GRAPH.replace(r#", "stage": 1, "weight": 0.5"#, r#", "weight": 0.5"#);
    let graph = GraphDescription::from_json(&json)
        .unwrap()
        .into_graph()
        .unwrap()
        .validate()
        .unwrap();
    let err = PipelineParallel::from_graph(&graph, unit_for, &PipelineConfig::default()).unwrap_err();
    assert!(matches!(
        err,
        PipelineError::GraphError(GraphError::Unassigned { .. })
    ));
}
