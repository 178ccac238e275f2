//! Benchmarks for kan-optim-rs
//!
//! Run with: cargo bench -p kan-optim-rs

use candle_core::{DType, Device, Tensor, Var};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use kan_optim_rs::{partition, DeltaTracker, KanLayer, KanLayerConfig, Module, ParamStore, Sequential};

fn build_model(store: &mut ParamStore, width: usize, depth: usize) -> Module {
    let device = Device::Cpu;
    let mut seq = Sequential::new();
    for i in 0..depth {
        let config = KanLayerConfig::new(width, width);
        seq = seq.push(KanLayer::new(store, &config, &device, &format!("kan.{i}")).unwrap());
    }
    seq.into()
}

fn bench_delta_update(c: &mut Criterion) {
    let mut group = c.benchmark_group("delta_update");
    for width in [16, 64, 256] {
        let mut store = ParamStore::new();
        let model = build_model(&mut store, width, 4);
        let params = partition(&model).w;
        let mut tracker = DeltaTracker::default();
        tracker.update(&params).unwrap();

        let bump = Tensor::ones((width, width), DType::F32, &Device::Cpu).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(width), &width, |b, _| {
            b.iter(|| {
                for param in &params {
                    let next = (param.as_tensor() + &bump).unwrap();
                    param.var().set(&next).unwrap();
                }
                black_box(tracker.update(&params).unwrap())
            });
        });
    }
    group.finish();
}

fn bench_partition(c: &mut Criterion) {
    let mut group = c.benchmark_group("partition");
    for depth in [4, 32, 128] {
        let mut store = ParamStore::new();
        let model = build_model(&mut store, 8, depth);
        group.bench_with_input(BenchmarkId::from_parameter(depth), &model, |b, model| {
            b.iter(|| black_box(partition(model)));
        });
    }
    group.finish();
}

fn bench_snapshot_large(c: &mut Criterion) {
    let var = Var::zeros((1024, 1024), DType::F32, &Device::Cpu).unwrap();
    let mut store = ParamStore::new();
    let params = vec![store.register("big", var)];
    let mut tracker = DeltaTracker::default();
    tracker.update(&params).unwrap();
    c.bench_function("delta_update_1m_elems", |b| {
        b.iter(|| black_box(tracker.update(&params).unwrap()));
    });
}

criterion_group!(benches, bench_delta_update, bench_partition, bench_snapshot_large);
criterion_main!(benches);
