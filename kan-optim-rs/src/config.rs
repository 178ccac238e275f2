//! Configuration types for delta tracking and KAN layer construction.
//!
//! - [`DeltaTrackerConfig`]: smoothing settings for [`crate::DeltaTracker`]
//! - [`KanLayerConfig`]: shapes and initialization of a [`crate::KanLayer`]

use serde::{Deserialize, Serialize};

use crate::error::{KanOptimError, Result};

/// Configuration for the parameter-delta EMA.
///
/// # Example
///
/// ```
/// use kan_optim_rs::DeltaTrackerConfig;
///
/// let config = DeltaTrackerConfig::default().with_smoothing_factor(0.95);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeltaTrackerConfig {
    /// EMA smoothing factor. Closer to 1.0 means slower updates.
    pub smoothing_factor: f64,
}

impl Default for DeltaTrackerConfig {
    fn default() -> Self {
        Self {
            smoothing_factor: 0.9,
        }
    }
}

impl DeltaTrackerConfig {
    /// Set the smoothing factor.
    #[must_use]
    pub const fn with_smoothing_factor(mut self, smoothing_factor: f64) -> Self {
        self.smoothing_factor = smoothing_factor;
        self
    }

    /// Check that the smoothing factor is a finite real.
    ///
    /// # Errors
    ///
    /// Returns [`KanOptimError::InvalidConfig`] for NaN or infinite values.
    pub fn validate(&self) -> Result<()> {
        if !self.smoothing_factor.is_finite() {
            return Err(KanOptimError::InvalidConfig(format!(
                "smoothing_factor must be finite, got {}",
                self.smoothing_factor
            )));
        }
        Ok(())
    }
}

/// Configuration for a single KAN layer.
///
/// Shapes follow the usual B-spline KAN layout: `coef` is
/// `[in_dim, out_dim, grid_size + spline_order]`, the two scales are
/// `[in_dim, out_dim]`.
///
/// # Example
///
/// ```
/// use kan_optim_rs::KanLayerConfig;
///
/// let config = KanLayerConfig::new(4, 8)
///     .with_grid_size(10)
///     .with_scale_sp_trainable(false);
/// assert_eq!(config.num_basis(), 13);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KanLayerConfig {
    /// Input dimension.
    pub in_dim: usize,

    /// Output dimension.
    pub out_dim: usize,

    /// Number of grid intervals.
    pub grid_size: usize,

    /// Spline order (3 = cubic).
    pub spline_order: usize,

    /// Standard deviation of the initial coefficient noise, before dividing by `grid_size`.
    pub noise_scale: f64,

    /// Mean of the residual (base) branch scale.
    pub scale_base_mu: f64,

    /// Half-width of the uniform noise added to the base scale.
    pub scale_base_sigma: f64,

    /// Initial spline branch scale.
    pub scale_sp: f64,

    /// Whether `scale_base` is trainable.
    pub sb_trainable: bool,

    /// Whether `scale_sp` is trainable.
    pub sp_trainable: bool,
}

impl Default for KanLayerConfig {
    fn default() -> Self {
        Self {
            in_dim: 2,
            out_dim: 2,
            grid_size: 5,
            spline_order: 3,
            noise_scale: 0.5,
            scale_base_mu: 0.0,
            scale_base_sigma: 1.0,
            scale_sp: 1.0,
            sb_trainable: true,
            sp_trainable: true,
        }
    }
}

impl KanLayerConfig {
    /// Create a config for an `in_dim -> out_dim` layer with default spline settings.
    #[must_use]
    pub fn new(in_dim: usize, out_dim: usize) -> Self {
        Self {
            in_dim,
            out_dim,
            ..Self::default()
        }
    }

    /// Set the number of grid intervals.
    #[must_use]
    pub const fn with_grid_size(mut self, grid_size: usize) -> Self {
        self.grid_size = grid_size;
        self
    }

    /// Set the spline order.
    #[must_use]
    pub const fn with_spline_order(mut self, spline_order: usize) -> Self {
        self.spline_order = spline_order;
        self
    }

    /// Set the coefficient noise scale.
    #[must_use]
    pub const fn with_noise_scale(mut self, noise_scale: f64) -> Self {
        self.noise_scale = noise_scale;
        self
    }

    /// Set whether `scale_base` is trainable.
    #[must_use]
    pub const fn with_scale_base_trainable(mut self, trainable: bool) -> Self {
        self.sb_trainable = trainable;
        self
    }

    /// Set whether `scale_sp` is trainable.
    #[must_use]
    pub const fn with_scale_sp_trainable(mut self, trainable: bool) -> Self {
        self.sp_trainable = trainable;
        self
    }

    /// Number of spline basis functions per edge.
    #[must_use]
    pub const fn num_basis(&self) -> usize {
        self.grid_size + self.spline_order
    }

    /// Validate dimensions and initialization scales.
    ///
    /// # Errors
    ///
    /// Returns [`KanOptimError::InvalidConfig`] if a dimension or the grid size is
    /// zero, or an initialization scale is not finite.
    pub fn validate(&self) -> Result<()> {
        if self.in_dim == 0 || self.out_dim == 0 {
            return Err(KanOptimError::InvalidConfig(format!(
                "layer dimensions must be positive, got {}x{}",
                self.in_dim, self.out_dim
            )));
        }
        if self.grid_size == 0 {
            return Err(KanOptimError::InvalidConfig(
                "grid_size must be positive".to_string(),
            ));
        }
        let scales = [
            ("noise_scale", self.noise_scale),
            ("scale_base_mu", self.scale_base_mu),
            ("scale_base_sigma", self.scale_base_sigma),
            ("scale_sp", self.scale_sp),
        ];
        for (name, value) in scales {
            if !value.is_finite() {
                return Err(KanOptimError::InvalidConfig(format!(
                    "{name} must be finite, got {value}"
                )));
            }
        }
        Ok(())
    }
}
