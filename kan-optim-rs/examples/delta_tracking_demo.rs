//! Example demonstrating W/C grouping and delta tracking in a KAN training loop.
//!
//! This example shows how to:
//! - Partition a KAN into W (`scale_base`/`scale_sp`) and C (`coef`) groups
//! - Give each group its own AdamW learning rate
//! - Watch the smoothed W movement shrink as the loss converges
//!
//! Run with:
//! ```bash
//! RUST_LOG=kan_optim_rs=debug cargo run --example delta_tracking_demo
//! ```

use candle_core::{DType, Device, Tensor};
use candle_nn::optim::{AdamW, Optimizer, ParamsAdamW};
use kan_optim_rs::{
    partition, unassigned, DeltaTracker, KanLayer, KanLayerConfig, LinearLayer, Module,
    ParamStore, Sequential,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("kan_optim_rs=info".parse()?),
        )
        .init();

    let device = Device::Cpu;
    let mut store = ParamStore::new();
    let model: Module = Sequential::new()
        .push(KanLayer::new(&mut store, &KanLayerConfig::new(4, 8), &device, "kan.0")?)
        .push(KanLayer::new(&mut store, &KanLayerConfig::new(8, 4), &device, "kan.1")?)
        .push(LinearLayer::init(&mut store, 4, 1, &device, "head")?)
        .into();

    let groups = partition(&model);
    let rest = unassigned(&model, &groups);
    println!(
        "W group: {} tensors, C group: {} tensors, unassigned: {}",
        groups.w.len(),
        groups.c.len(),
        rest.len()
    );

    let mut w_opt = AdamW::new(
        groups.w_vars(),
        ParamsAdamW {
            lr: 1e-2,
            ..Default::default()
        },
    )?;
    let mut c_opt = AdamW::new(
        groups.c_vars(),
        ParamsAdamW {
            lr: 1e-3,
            ..Default::default()
        },
    )?;
    let mut rest_opt = AdamW::new(
        rest.iter().map(|p| p.var().clone()).collect(),
        ParamsAdamW::default(),
    )?;

    let params = model.parameters();
    let mut tracker = DeltaTracker::new(0.9)?;
    tracker.update(&groups.w)?;

    for step in 1..=200 {
        // Toy objective: pull every parameter toward zero
        let mut loss = Tensor::zeros((), DType::F32, &device)?;
        for param in &params {
            loss = (loss + param.as_tensor().sqr()?.sum_all()?)?;
        }
        let grads = loss.backward()?;
        w_opt.step(&grads)?;
        c_opt.step(&grads)?;
        rest_opt.step(&grads)?;

        let report = tracker.observe(&groups.w)?;
        if step % 20 == 0 {
            println!(
                "step {step:>4}  loss {:>10.4}  W delta {:.6}  EMA {:.6}",
                loss.to_scalar::<f32>()?,
                report.step.unwrap_or(0.0),
                report.smoothed
            );
        }
    }

    Ok(())
}
