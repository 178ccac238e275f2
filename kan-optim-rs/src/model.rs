//! Module tree consumed by the group partitioner.
//!
//! Models are built from a closed set of module kinds ([`Module`]). Layers
//! that own KAN tensor roles implement [`KanParameters`]; the partitioner
//! only ever looks at modules exposing that capability, so nothing is found
//! by probing attribute names.

use std::collections::HashSet;

use candle_core::{DType, Device, Tensor};
use candle_nn::Init;

use crate::config::KanLayerConfig;
use crate::error::Result;
use crate::param::{Binding, Param, ParamId, ParamStore};

/// Tensor roles of a KAN layer.
///
/// `scale_base` and `scale_sp` are the basis weights ("W"), `coef` holds the
/// spline coefficients ("C"). Any role may be absent.
pub trait KanParameters {
    /// Scale of the residual (base) branch.
    fn scale_base(&self) -> Option<&Binding>;

    /// Scale of the spline branch.
    fn scale_sp(&self) -> Option<&Binding>;

    /// Spline coefficients.
    fn coef(&self) -> Option<&Binding>;
}

/// A B-spline KAN layer's parameter set.
#[derive(Debug, Clone)]
pub struct KanLayer {
    coef: Option<Binding>,
    scale_base: Option<Binding>,
    scale_sp: Option<Binding>,
    mask: Option<Binding>,
}

impl KanLayer {
    /// Create a freshly initialized layer, registering its trainable tensors.
    ///
    /// Registered names are `{prefix}.coef`, `{prefix}.scale_base` and
    /// `{prefix}.scale_sp`. Scales marked non-trainable in the config, and
    /// the edge mask, are bound as frozen tensors.
    ///
    /// # Errors
    ///
    /// Returns error if the config is invalid or tensor creation fails.
    #[allow(clippy::cast_precision_loss)]
    pub fn new(
        store: &mut ParamStore,
        config: &KanLayerConfig,
        device: &Device,
        prefix: &str,
    ) -> Result<Self> {
        config.validate()?;

        let edge_shape = (config.in_dim, config.out_dim);
        let coef_shape = (config.in_dim, config.out_dim, config.num_basis());
        let fan_in = (config.in_dim as f64).sqrt();

        let coef_init = Init::Randn {
            mean: 0.0,
            stdev: config.noise_scale / config.grid_size as f64,
        };
        let scale_base_init = Init::Uniform {
            lo: (config.scale_base_mu - config.scale_base_sigma) / fan_in,
            up: (config.scale_base_mu + config.scale_base_sigma) / fan_in,
        };
        let scale_sp_init = Init::Const(config.scale_sp / fan_in);

        let coef = coef_init.var(coef_shape, DType::F32, device)?;
        let coef = Binding::Trainable(store.register(format!("{prefix}.coef"), coef));

        let scale_base = scale_base_init.var(edge_shape, DType::F32, device)?;
        let scale_base = if config.sb_trainable {
            Binding::Trainable(store.register(format!("{prefix}.scale_base"), scale_base))
        } else {
            Binding::Frozen(scale_base.as_detached_tensor())
        };

        let scale_sp = scale_sp_init.var(edge_shape, DType::F32, device)?;
        let scale_sp = if config.sp_trainable {
            Binding::Trainable(store.register(format!("{prefix}.scale_sp"), scale_sp))
        } else {
            Binding::Frozen(scale_sp.as_detached_tensor())
        };

        let mask = Binding::Frozen(Tensor::ones(edge_shape, DType::F32, device)?);

        Ok(Self {
            coef: Some(coef),
            scale_base: Some(scale_base),
            scale_sp: Some(scale_sp),
            mask: Some(mask),
        })
    }

    /// Build a layer from explicit bindings.
    ///
    /// Passing the same [`Param`] to several layers models weight sharing.
    #[must_use]
    pub const fn from_bindings(
        scale_base: Option<Binding>,
        scale_sp: Option<Binding>,
        coef: Option<Binding>,
    ) -> Self {
        Self {
            coef,
            scale_base,
            scale_sp,
            mask: None,
        }
    }

    /// Edge mask, if any.
    #[must_use]
    pub const fn mask(&self) -> Option<&Binding> {
        self.mask.as_ref()
    }

    fn bindings(&self) -> impl Iterator<Item = &Binding> {
        [&self.scale_base, &self.scale_sp, &self.coef, &self.mask]
            .into_iter()
            .flatten()
    }
}

impl KanParameters for KanLayer {
    fn scale_base(&self) -> Option<&Binding> {
        self.scale_base.as_ref()
    }

    fn scale_sp(&self) -> Option<&Binding> {
        self.scale_sp.as_ref()
    }

    fn coef(&self) -> Option<&Binding> {
        self.coef.as_ref()
    }
}

/// Plain affine layer. Never part of a KAN parameter group.
#[derive(Debug, Clone)]
pub struct LinearLayer {
    weight: Binding,
    bias: Option<Binding>,
}

impl LinearLayer {
    /// Create a linear layer from its bindings.
    #[must_use]
    pub const fn new(weight: Binding, bias: Option<Binding>) -> Self {
        Self { weight, bias }
    }

    /// Create and register a `out_dim x in_dim` layer with bias.
    ///
    /// # Errors
    ///
    /// Returns error if tensor creation fails.
    #[allow(clippy::cast_precision_loss)]
    pub fn init(
        store: &mut ParamStore,
        in_dim: usize,
        out_dim: usize,
        device: &Device,
        prefix: &str,
    ) -> Result<Self> {
        let bound = 1.0 / (in_dim.max(1) as f64).sqrt();
        let init = Init::Uniform {
            lo: -bound,
            up: bound,
        };
        let weight = init.var((out_dim, in_dim), DType::F32, device)?;
        let bias = init.var(out_dim, DType::F32, device)?;
        Ok(Self {
            weight: Binding::Trainable(store.register(format!("{prefix}.weight"), weight)),
            bias: Some(Binding::Trainable(
                store.register(format!("{prefix}.bias"), bias),
            )),
        })
    }

    fn bindings(&self) -> impl Iterator<Item = &Binding> {
        std::iter::once(&self.weight).chain(self.bias.as_ref())
    }
}

/// Ordered container of child modules.
#[derive(Debug, Clone, Default)]
pub struct Sequential {
    children: Vec<Module>,
}

impl Sequential {
    /// Create an empty container.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a child module.
    #[must_use]
    pub fn push(mut self, module: impl Into<Module>) -> Self {
        self.children.push(module.into());
        self
    }

    /// Child modules in declaration order.
    #[must_use]
    pub fn children(&self) -> &[Module] {
        &self.children
    }
}

/// A node of the model tree.
#[derive(Debug, Clone)]
pub enum Module {
    /// KAN layer.
    Kan(KanLayer),
    /// Linear layer.
    Linear(LinearLayer),
    /// Container.
    Sequential(Sequential),
}

impl Module {
    /// This module and all descendants, depth-first pre-order.
    #[must_use]
    pub fn modules(&self) -> Vec<&Module> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(module) = stack.pop() {
            out.push(module);
            if let Self::Sequential(seq) = module {
                stack.extend(seq.children.iter().rev());
            }
        }
        out
    }

    /// The KAN capability, if this module has it.
    #[must_use]
    pub fn as_kan(&self) -> Option<&dyn KanParameters> {
        match self {
            Self::Kan(layer) => Some(layer),
            Self::Linear(_) | Self::Sequential(_) => None,
        }
    }

    /// Every trainable parameter of the tree, pre-order, first occurrence only.
    #[must_use]
    pub fn parameters(&self) -> Vec<Param> {
        let mut seen: HashSet<ParamId> = HashSet::new();
        let mut out = Vec::new();
        for module in self.modules() {
            let bindings: Vec<&Binding> = match module {
                Self::Kan(layer) => layer.bindings().collect(),
                Self::Linear(layer) => layer.bindings().collect(),
                Self::Sequential(_) => Vec::new(),
            };
            for param in bindings.into_iter().filter_map(Binding::as_trainable) {
                if seen.insert(param.id()) {
                    out.push(param.clone());
                }
            }
        }
        out
    }
}

impl From<KanLayer> for Module {
    fn from(layer: KanLayer) -> Self {
        Self::Kan(layer)
    }
}

impl From<LinearLayer> for Module {
    fn from(layer: LinearLayer) -> Self {
        Self::Linear(layer)
    }
}

impl From<Sequential> for Module {
    fn from(seq: Sequential) -> Self {
        Self::Sequential(seq)
    }
}
