//! # kan-optim-rs
//!
//! Training-loop diagnostics for Kolmogorov-Arnold Networks built on
//! [candle](https://github.com/huggingface/candle).
//!
//! Two independent pieces:
//!
//! - [`DeltaTracker`]: an exponential moving average of how much a set of
//!   parameters moves per step (mean absolute change, averaged per tensor).
//! - [`partition`]: splits a model's KAN parameters into a W group
//!   (`scale_base`, `scale_sp`) and a C group (`coef`) so each can get its
//!   own optimizer settings.
//!
//! ## Quick Start
//!
//! ```ignore
//! use candle_core::Device;
//! use candle_nn::optim::{AdamW, Optimizer, ParamsAdamW};
//! use kan_optim_rs::{partition, DeltaTracker, KanLayer, KanLayerConfig, Module, ParamStore, Sequential};
//!
//! let mut store = ParamStore::new();
//! let model: Module = Sequential::new()
//!     .push(KanLayer::new(&mut store, &KanLayerConfig::new(4, 8), &Device::Cpu, "0")?)
//!     .push(KanLayer::new(&mut store, &KanLayerConfig::new(8, 1), &Device::Cpu, "1")?)
//!     .into();
//!
//! let groups = partition(&model);
//! let mut w_opt = AdamW::new(groups.w_vars(), ParamsAdamW { lr: 1e-2, ..Default::default() })?;
//! let mut c_opt = AdamW::new(groups.c_vars(), ParamsAdamW { lr: 1e-3, ..Default::default() })?;
//! let mut tracker = DeltaTracker::default();
//!
//! for step in 0..100 {
//!     let loss = compute_loss(&model)?;
//!     let grads = loss.backward()?;
//!     w_opt.step(&grads)?;
//!     c_opt.step(&grads)?;
//!     let ema = tracker.update(&groups.w)?;
//! }
//! ```
//!
//! ## Modules
//!
//! - [`config`]: Configuration types
//! - [`error`]: Error types and result alias
//! - [`param`]: Parameter arena with stable identities
//! - [`model`]: Module tree and the KAN layer capability
//! - [`delta`]: Parameter-delta EMA
//! - [`groups`]: W/C parameter grouping

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod delta;
pub mod error;
pub mod groups;
pub mod model;
pub mod param;

pub use config::{DeltaTrackerConfig, KanLayerConfig};
pub use delta::{DeltaReport, DeltaTracker};
pub use error::{KanOptimError, Result};
pub use groups::{partition, partition_with_fallback, unassigned, ParamGroups};
pub use model::{KanLayer, KanParameters, LinearLayer, Module, Sequential};
pub use param::{Binding, Param, ParamId, ParamStore};
