//! Search step benchmarks.
//!
//! Run with: `cargo bench -p mcts`
//!
//! These benchmarks measure growing a tree to a fixed size with each
//! algorithm, using a cheap closure expander so the policy dominates.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use mcts::{
    AbMctsAParams, AbMctsMParams, AlgorithmParams, FnExpander, SearchAlgorithm, SearchTree,
    StandardParams, Successor,
};
use serde_json::{json, Value};

fn successors(action: &str, state: Option<&Value>) -> Vec<Successor> {
    let depth = state.and_then(Value::as_u64).unwrap_or(0) + 1;
    let bias = if action == "a" { 0.3 } else { 0.6 };
    vec![
        Successor::new(json!(depth), bias),
        Successor::new(json!(depth), bias + 0.1 / depth as f64),
    ]
}

fn grow(params: &AlgorithmParams, steps: usize) -> SearchTree {
    let mut algo = SearchAlgorithm::init(params.clone(), 42).unwrap();
    let mut tree = SearchTree::new();
    let actions = vec!["a".to_string(), "b".to_string()];
    let mut expander = FnExpander(successors);
    for _ in 0..steps {
        algo.step(&mut tree, &actions, &mut expander).unwrap();
    }
    tree
}

fn bench_algorithms(c: &mut Criterion) {
    let mut group = c.benchmark_group("step");
    let algorithms = [
        (
            "standard",
            AlgorithmParams::Standard(StandardParams::default().with_samples_per_action(2)),
        ),
        ("ab_mcts_a", AlgorithmParams::AbMctsA(AbMctsAParams::default())),
        ("ab_mcts_m", AlgorithmParams::AbMctsM(AbMctsMParams::default())),
    ];

    for steps in [50usize, 200] {
        group.throughput(Throughput::Elements(steps as u64));
        for (name, params) in &algorithms {
            group.bench_with_input(BenchmarkId::new(*name, steps), &steps, |b, &steps| {
                b.iter(|| black_box(grow(params, steps)))
            });
        }
    }

    group.finish();
}

criterion_group!(benches, bench_algorithms);
criterion_main!(benches);
