//! Exponential moving average of parameter change.
//!
//! [`DeltaTracker`] keeps a detached copy of every parameter it has seen and,
//! on each call, measures how far each previously seen parameter has moved
//! (mean absolute elementwise change). The per-parameter magnitudes are
//! averaged with equal weight per tensor and folded into an EMA:
//!
//! ```text
//! ema_t = beta * ema_{t-1} + (1 - beta) * mean_i(mean(|p_i(t) - p_i(t-1)|))
//! ```
//!
//! The first observation of a parameter only establishes its baseline and
//! contributes no sample, so parameters added mid-training do not drag the
//! average toward zero.

use std::collections::HashMap;

use candle_core::{DType, Device, Tensor};

use crate::config::DeltaTrackerConfig;
use crate::error::{KanOptimError, Result};
use crate::param::{Param, ParamId};

/// Outcome of a single [`DeltaTracker::observe`] call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeltaReport {
    /// EMA after the call.
    pub smoothed: f64,
    /// Mean magnitude folded in this call, `None` if no parameter had a baseline.
    pub step: Option<f64>,
    /// Number of magnitude samples contributing to `step`.
    pub samples: usize,
    /// Number of parameters whose baseline was established this call.
    pub baselined: usize,
}

/// Tracks a smoothed magnitude of parameter updates across training steps.
///
/// # Example
///
/// ```
/// use candle_core::{Device, Tensor, Var};
/// use kan_optim_rs::{DeltaTracker, ParamStore};
///
/// let device = Device::Cpu;
/// let mut store = ParamStore::new();
/// let p = store.register("w", Var::from_slice(&[1.0f32, 1.0], 2, &device)?);
///
/// let mut tracker = DeltaTracker::new(0.9)?;
/// assert_eq!(tracker.update(&[p.clone()])?, 0.0);
///
/// p.var().set(&Tensor::from_slice(&[3.0f32, 3.0], 2, &device)?)?;
/// assert!((tracker.update(&[p])? - 0.2).abs() < 1e-9);
/// # Ok::<(), kan_optim_rs::KanOptimError>(())
/// ```
#[derive(Debug)]
pub struct DeltaTracker {
    smoothing_factor: f64,
    /// Last observed value per parameter. Never evicted.
    previous: HashMap<ParamId, Tensor>,
    smoothed: f64,
    updates: u64,
}

impl Default for DeltaTracker {
    fn default() -> Self {
        Self::with_factor(DeltaTrackerConfig::default().smoothing_factor)
    }
}

impl DeltaTracker {
    /// Create a tracker with the given smoothing factor.
    ///
    /// Values outside `(0, 1)` are accepted but almost certainly a mistake.
    ///
    /// # Errors
    ///
    /// Returns [`KanOptimError::InvalidConfig`] if the factor is not finite.
    pub fn new(smoothing_factor: f64) -> Result<Self> {
        Self::from_config(&DeltaTrackerConfig::default().with_smoothing_factor(smoothing_factor))
    }

    /// Create a tracker from a config.
    ///
    /// # Errors
    ///
    /// Returns [`KanOptimError::InvalidConfig`] if the config is invalid.
    pub fn from_config(config: &DeltaTrackerConfig) -> Result<Self> {
        config.validate()?;
        if !(config.smoothing_factor > 0.0 && config.smoothing_factor < 1.0) {
            tracing::warn!(
                smoothing_factor = config.smoothing_factor,
                "smoothing factor outside (0, 1)"
            );
        }
        Ok(Self::with_factor(config.smoothing_factor))
    }

    fn with_factor(smoothing_factor: f64) -> Self {
        Self {
            smoothing_factor,
            previous: HashMap::new(),
            smoothed: 0.0,
            updates: 0,
        }
    }

    /// Fold the current values of `tracked` into the EMA and return it.
    ///
    /// # Errors
    ///
    /// See [`DeltaTracker::observe`].
    pub fn update(&mut self, tracked: &[Param]) -> Result<f64> {
        Ok(self.observe(tracked)?.smoothed)
    }

    /// Fold the current values of `tracked` into the EMA.
    ///
    /// An empty slice is a no-op. Parameters seen for the first time are
    /// baselined and skipped; if no parameter had a baseline the EMA is left
    /// unchanged.
    ///
    /// The call is all-or-nothing: if it fails, no snapshot and no EMA state
    /// has been modified.
    ///
    /// # Errors
    ///
    /// Returns [`KanOptimError::ShapeMismatch`] if a parameter's shape differs
    /// from its stored baseline, or a tensor error if copying fails.
    pub fn observe(&mut self, tracked: &[Param]) -> Result<DeltaReport> {
        if tracked.is_empty() {
            return Ok(self.report(None, 0, 0));
        }

        let mut staged: HashMap<ParamId, Tensor> = HashMap::with_capacity(tracked.len());
        let mut magnitudes = Vec::with_capacity(tracked.len());
        let mut baselined = 0;

        for param in tracked {
            let current = snapshot(param)?;
            let previous = staged
                .get(&param.id())
                .or_else(|| self.previous.get(&param.id()));

            match previous {
                None => {
                    tracing::trace!(param = param.name(), id = %param.id(), "baseline established");
                    baselined += 1;
                }
                Some(previous) => {
                    if previous.dims() != current.dims() {
                        return Err(KanOptimError::ShapeMismatch {
                            param: param.name().to_string(),
                            expected: previous.dims().to_vec(),
                            actual: current.dims().to_vec(),
                        });
                    }
                    if current.elem_count() > 0 {
                        magnitudes.push(mean_abs_delta(&current, previous)?);
                    }
                }
            }
            staged.insert(param.id(), current);
        }

        self.previous.extend(staged);

        let step = mean(&magnitudes);
        if let Some(step) = step {
            self.smoothed =
                self.smoothing_factor * self.smoothed + (1.0 - self.smoothing_factor) * step;
            self.updates += 1;
        }

        let report = self.report(step, magnitudes.len(), baselined);
        tracing::debug!(
            smoothed = report.smoothed,
            step = ?report.step,
            samples = report.samples,
            baselined = report.baselined,
            "delta tracker updated"
        );
        Ok(report)
    }

    const fn report(&self, step: Option<f64>, samples: usize, baselined: usize) -> DeltaReport {
        DeltaReport {
            smoothed: self.smoothed,
            step,
            samples,
            baselined,
        }
    }

    /// Current EMA value.
    #[must_use]
    pub const fn value(&self) -> f64 {
        self.smoothed
    }

    /// Configured smoothing factor.
    #[must_use]
    pub const fn smoothing_factor(&self) -> f64 {
        self.smoothing_factor
    }

    /// Number of parameters with a stored baseline.
    #[must_use]
    pub fn tracked_len(&self) -> usize {
        self.previous.len()
    }

    /// Whether a baseline is stored for `id`.
    #[must_use]
    pub fn is_tracking(&self, id: ParamId) -> bool {
        self.previous.contains_key(&id)
    }

    /// Number of calls that changed the EMA.
    #[must_use]
    pub const fn updates(&self) -> u64 {
        self.updates
    }
}

/// Detached host copy of a parameter, in fresh storage. `to_device` and
/// `to_dtype` alias the source when they are no-ops, hence the `copy()`.
fn snapshot(param: &Param) -> Result<Tensor> {
    Ok(param
        .as_tensor()
        .detach()
        .to_device(&Device::Cpu)?
        .to_dtype(DType::F64)?
        .copy()?)
}

fn mean_abs_delta(current: &Tensor, previous: &Tensor) -> Result<f64> {
    let delta = current.sub(previous)?.abs()?.mean_all()?;
    Ok(delta.to_scalar::<f64>()?)
}

#[allow(clippy::cast_precision_loss)]
fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}
