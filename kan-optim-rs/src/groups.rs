//! Split KAN parameters into W (basis scales) and C (spline coefficients).
//!
//! The two groups usually get different learning rates. Grouping is purely
//! structural: a parameter lands in W if some KAN layer binds it as
//! `scale_base` or `scale_sp`, in C if bound as `coef`, in neither otherwise.
//! A parameter shared between layers is claimed by its first occurrence in
//! traversal order and never appears twice.

use std::collections::HashSet;

use candle_core::Var;

use crate::model::{KanParameters, Module};
use crate::param::{Binding, Param, ParamId};

/// Disjoint W and C parameter groups.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParamGroups {
    /// `scale_base` / `scale_sp` parameters.
    pub w: Vec<Param>,
    /// `coef` parameters.
    pub c: Vec<Param>,
}

impl ParamGroups {
    /// Variables of the W group, for optimizer construction.
    #[must_use]
    pub fn w_vars(&self) -> Vec<Var> {
        self.w.iter().map(|p| p.var().clone()).collect()
    }

    /// Variables of the C group, for optimizer construction.
    #[must_use]
    pub fn c_vars(&self) -> Vec<Var> {
        self.c.iter().map(|p| p.var().clone()).collect()
    }

    /// Total number of grouped parameters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.w.len() + self.c.len()
    }

    /// Whether both groups are empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.w.is_empty() && self.c.is_empty()
    }

    /// Whether either group holds `id`.
    #[must_use]
    pub fn contains(&self, id: ParamId) -> bool {
        self.w.iter().chain(&self.c).any(|p| p.id() == id)
    }

    /// Append parameters to W, skipping any already grouped.
    pub fn absorb_into_w(&mut self, params: impl IntoIterator<Item = Param>) {
        let mut seen: HashSet<ParamId> = self.w.iter().chain(&self.c).map(Param::id).collect();
        for param in params {
            if seen.insert(param.id()) {
                self.w.push(param);
            }
        }
    }
}

/// Walk `model` and collect its KAN parameters into W and C groups.
///
/// Modules are visited depth-first in declaration order, the root included.
/// On each KAN layer, `scale_base` then `scale_sp` go to W and `coef` goes to
/// C. Absent or frozen roles and already-claimed parameters are skipped.
///
/// # Example
///
/// ```
/// use candle_core::Device;
/// use kan_optim_rs::{partition, KanLayer, KanLayerConfig, Module, ParamStore, Sequential};
///
/// let mut store = ParamStore::new();
/// let config = KanLayerConfig::new(2, 3);
/// let model: Module = Sequential::new()
///     .push(KanLayer::new(&mut store, &config, &Device::Cpu, "0")?)
///     .push(KanLayer::new(&mut store, &config, &Device::Cpu, "1")?)
///     .into();
///
/// let groups = partition(&model);
/// assert_eq!(groups.w.len(), 4);
/// assert_eq!(groups.c.len(), 2);
/// # Ok::<(), kan_optim_rs::KanOptimError>(())
/// ```
#[must_use]
pub fn partition(model: &Module) -> ParamGroups {
    let mut groups = ParamGroups::default();
    let mut seen: HashSet<ParamId> = HashSet::new();

    for layer in model.modules().into_iter().filter_map(Module::as_kan) {
        for binding in [layer.scale_base(), layer.scale_sp()] {
            if let Some(param) = claim(binding, &mut seen) {
                groups.w.push(param);
            }
        }
        if let Some(param) = claim(layer.coef(), &mut seen) {
            groups.c.push(param);
        }
    }

    tracing::debug!(
        w = groups.w.len(),
        c = groups.c.len(),
        "partitioned KAN parameters"
    );
    groups
}

/// Trainable parameters of `model` that are in neither group.
///
/// These remain trainable; the caller decides which optimizer gets them.
#[must_use]
pub fn unassigned(model: &Module, groups: &ParamGroups) -> Vec<Param> {
    model
        .parameters()
        .into_iter()
        .filter(|p| !groups.contains(p.id()))
        .collect()
}

/// [`partition`], then append every unassigned trainable parameter to W.
#[must_use]
pub fn partition_with_fallback(model: &Module) -> ParamGroups {
    let mut groups = partition(model);
    let rest = unassigned(model, &groups);
    if !rest.is_empty() {
        tracing::debug!(count = rest.len(), "adding unassigned parameters to W");
    }
    groups.absorb_into_w(rest);
    groups
}

fn claim(binding: Option<&Binding>, seen: &mut HashSet<ParamId>) -> Option<Param> {
    let param = binding?.as_trainable()?;
    seen.insert(param.id()).then(|| param.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KanLayerConfig;
    use crate::model::{KanLayer, LinearLayer, Sequential};
    use crate::param::ParamStore;
    use candle_core::{DType, Device, Tensor};

    fn kan(store: &mut ParamStore, prefix: &str) -> KanLayer {
        KanLayer::new(store, &KanLayerConfig::new(2, 2), &Device::Cpu, prefix).unwrap()
    }

    fn var(dims: &[usize]) -> Var {
        Var::zeros(dims, DType::F32, &Device::Cpu).unwrap()
    }

    fn names(params: &[Param]) -> Vec<&str> {
        params.iter().map(Param::name).collect()
    }

    #[test]
    fn test_empty_model() {
        let model: Module = Sequential::new().into();
        let groups = partition(&model);
        assert!(groups.w.is_empty());
        assert!(groups.c.is_empty());
    }

    #[test]
    fn test_no_kan_layers() {
        let mut store = ParamStore::new();
        let model: Module = Sequential::new()
            .push(LinearLayer::init(&mut store, 4, 4, &Device::Cpu, "fc").unwrap())
            .into();
        assert!(partition(&model).is_empty());
    }

    #[test]
    fn test_root_kan_layer() {
        let mut store = ParamStore::new();
        let model = Module::from(kan(&mut store, "root"));
        let groups = partition(&model);
        assert_eq!(names(&groups.w), vec!["root.scale_base", "root.scale_sp"]);
        assert_eq!(names(&groups.c), vec!["root.coef"]);
    }

    #[test]
    fn test_traversal_order() {
        let mut store = ParamStore::new();
        let model: Module = Sequential::new()
            .push(kan(&mut store, "a"))
            .push(Sequential::new().push(kan(&mut store, "b")))
            .push(kan(&mut store, "c"))
            .into();

        let groups = partition(&model);
        assert_eq!(
            names(&groups.w),
            vec![
                "a.scale_base",
                "a.scale_sp",
                "b.scale_base",
                "b.scale_sp",
                "c.scale_base",
                "c.scale_sp"
            ]
        );
        assert_eq!(names(&groups.c), vec!["a.coef", "b.coef", "c.coef"]);
    }

    #[test]
    fn test_shared_weights_claimed_once() {
        let mut store = ParamStore::new();
        let scale = store.register("shared.scale", var(&[2, 2]));
        let coef = store.register("shared.coef", var(&[2, 2, 8]));
        let first = KanLayer::from_bindings(
            Some(scale.clone().into()),
            None,
            Some(coef.clone().into()),
        );
        // Second layer reuses the scale in another role and the coef again
        let second = KanLayer::from_bindings(None, Some(scale.into()), Some(coef.into()));
        let model: Module = Sequential::new().push(first).push(second).into();

        let groups = partition(&model);
        assert_eq!(names(&groups.w), vec!["shared.scale"]);
        assert_eq!(names(&groups.c), vec!["shared.coef"]);
    }

    #[test]
    fn test_param_bound_as_scale_and_coef_goes_to_first_role() {
        let mut store = ParamStore::new();
        let p = store.register("odd", var(&[2, 2]));
        let layer = KanLayer::from_bindings(Some(p.clone().into()), None, Some(p.into()));
        let groups = partition(&Module::from(layer));
        assert_eq!(groups.w.len(), 1);
        assert!(groups.c.is_empty());
    }

    #[test]
    fn test_frozen_and_absent_roles_skipped() {
        let mut store = ParamStore::new();
        let frozen = Tensor::ones((2, 2), DType::F32, &Device::Cpu).unwrap();
        let coef = store.register("l.coef", var(&[2, 2, 8]));
        let layer = KanLayer::from_bindings(Some(Binding::Frozen(frozen)), None, Some(coef.into()));
        let groups = partition(&Module::from(layer));
        assert!(groups.w.is_empty());
        assert_eq!(names(&groups.c), vec!["l.coef"]);
    }

    #[test]
    fn test_disjoint() {
        let mut store = ParamStore::new();
        let shared = kan(&mut store, "s");
        let model: Module = Sequential::new()
            .push(shared.clone())
            .push(kan(&mut store, "x"))
            .push(shared)
            .into();

        let groups = partition(&model);
        let w: HashSet<ParamId> = groups.w.iter().map(Param::id).collect();
        let c: HashSet<ParamId> = groups.c.iter().map(Param::id).collect();
        assert_eq!(w.len(), groups.w.len());
        assert_eq!(c.len(), groups.c.len());
        assert!(w.is_disjoint(&c));
        assert_eq!(groups.len(), 6);
    }

    #[test]
    fn test_idempotent() {
        let mut store = ParamStore::new();
        let model: Module = Sequential::new()
            .push(kan(&mut store, "a"))
            .push(LinearLayer::init(&mut store, 2, 2, &Device::Cpu, "fc").unwrap())
            .push(kan(&mut store, "b"))
            .into();
        assert_eq!(partition(&model), partition(&model));
    }

    #[test]
    fn test_unassigned_and_fallback() {
        let mut store = ParamStore::new();
        let model: Module = Sequential::new()
            .push(kan(&mut store, "k"))
            .push(LinearLayer::init(&mut store, 2, 3, &Device::Cpu, "fc").unwrap())
            .into();

        let groups = partition(&model);
        assert_eq!(names(&unassigned(&model, &groups)), vec!["fc.weight", "fc.bias"]);

        let merged = partition_with_fallback(&model);
        assert_eq!(
            names(&merged.w),
            vec!["k.scale_base", "k.scale_sp", "fc.weight", "fc.bias"]
        );
        assert_eq!(names(&merged.c), vec!["k.coef"]);
        assert_eq!(merged.len(), store.len());
    }
}
