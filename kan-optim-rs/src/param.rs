//! Parameter arena with stable identities.
//!
//! Trainable tensors are registered once in a [`ParamStore`], which issues a
//! [`ParamId`] per distinct [`Var`]. Every downstream consumer (the delta
//! tracker, the group partitioner) keys on that id rather than on tensor
//! contents or addresses, so two parameters with equal values are still
//! distinct, and a weight shared between layers has exactly one identity.
//!
//! Ids come from a process-wide counter, so parameters registered in
//! different stores never share an id.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use candle_core::{Tensor, TensorId, Var};

/// Stable identity of a registered parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParamId(usize);

impl ParamId {
    fn new() -> Self {
        static COUNTER: AtomicUsize = AtomicUsize::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ParamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "param#{}", self.0)
    }
}

/// Handle to a trainable tensor owned by a model.
///
/// Cloning a `Param` clones the handle, not the data: clones share the id
/// and the underlying [`Var`] storage, so in-place optimizer updates are
/// visible through every clone.
#[derive(Debug, Clone)]
pub struct Param {
    id: ParamId,
    name: String,
    var: Var,
}

impl Param {
    /// Stable identity.
    #[must_use]
    pub const fn id(&self) -> ParamId {
        self.id
    }

    /// Name given at registration, for diagnostics only.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The live variable.
    #[must_use]
    pub const fn var(&self) -> &Var {
        &self.var
    }

    /// The live value as a tensor.
    #[must_use]
    pub fn as_tensor(&self) -> &Tensor {
        self.var.as_tensor()
    }

    /// Current shape.
    #[must_use]
    pub fn dims(&self) -> &[usize] {
        self.var.dims()
    }
}

#[cfg(test)]
impl Param {
    /// Same identity bound to different storage.
    pub(crate) fn rebound(&self, var: Var) -> Self {
        Self {
            id: self.id,
            name: self.name.clone(),
            var,
        }
    }
}

impl PartialEq for Param {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Param {}

/// What a layer attribute is bound to.
#[derive(Debug, Clone)]
pub enum Binding {
    /// A registered trainable parameter.
    Trainable(Param),
    /// A plain tensor that never receives gradients (masks, frozen scales).
    Frozen(Tensor),
}

impl Binding {
    /// The parameter handle if this binding is trainable.
    #[must_use]
    pub const fn as_trainable(&self) -> Option<&Param> {
        match self {
            Self::Trainable(param) => Some(param),
            Self::Frozen(_) => None,
        }
    }

    /// Whether this binding is trainable.
    #[must_use]
    pub const fn is_trainable(&self) -> bool {
        matches!(self, Self::Trainable(_))
    }

    /// The bound value.
    #[must_use]
    pub fn as_tensor(&self) -> &Tensor {
        match self {
            Self::Trainable(param) => param.as_tensor(),
            Self::Frozen(tensor) => tensor,
        }
    }
}

impl From<Param> for Binding {
    fn from(param: Param) -> Self {
        Self::Trainable(param)
    }
}

/// Arena of trainable parameters.
///
/// # Example
///
/// ```
/// use candle_core::{DType, Device, Var};
/// use kan_optim_rs::ParamStore;
///
/// let mut store = ParamStore::new();
/// let var = Var::zeros((2, 3), DType::F32, &Device::Cpu)?;
/// let a = store.register("layer.weight", var.clone());
/// let b = store.register("tied.weight", var);
/// assert_eq!(a.id(), b.id());
/// assert_eq!(store.len(), 1);
/// # Ok::<(), candle_core::Error>(())
/// ```
#[derive(Debug, Default)]
pub struct ParamStore {
    params: Vec<Param>,
    /// Position in `params`, by underlying tensor and by id.
    by_tensor: HashMap<TensorId, usize>,
    by_id: HashMap<ParamId, usize>,
}

impl ParamStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a variable and return its handle.
    ///
    /// Registering a variable that is already present (same underlying
    /// tensor) returns the existing handle and keeps the original name.
    pub fn register(&mut self, name: impl Into<String>, var: Var) -> Param {
        if let Some(&pos) = self.by_tensor.get(&var.id()) {
            return self.params[pos].clone();
        }

        let id = ParamId::new();
        let pos = self.params.len();
        self.by_tensor.insert(var.id(), pos);
        self.by_id.insert(id, pos);
        let param = Param {
            id,
            name: name.into(),
            var,
        };
        self.params.push(param.clone());
        param
    }

    /// Look up a parameter by id.
    #[must_use]
    pub fn get(&self, id: ParamId) -> Option<&Param> {
        self.by_id.get(&id).map(|&pos| &self.params[pos])
    }

    /// Number of registered parameters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Whether no parameter has been registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Parameters in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Param> {
        self.params.iter()
    }

    /// All variables in registration order.
    #[must_use]
    pub fn vars(&self) -> Vec<Var> {
        self.params.iter().map(|p| p.var.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};

    #[test]
    fn test_register_assigns_increasing_ids() {
        let device = Device::Cpu;
        let mut store = ParamStore::new();
        let a = store.register("a", Var::zeros(4, DType::F32, &device).unwrap());
        let b = store.register("b", Var::zeros(4, DType::F32, &device).unwrap());

        assert!(a.id() < b.id());
        assert_ne!(a, b);
        assert_eq!(store.len(), 2);
        assert_eq!(store.get(b.id()).unwrap().name(), "b");
    }

    #[test]
    fn test_register_same_var_twice() {
        let var = Var::ones((2, 2), DType::F32, &Device::Cpu).unwrap();
        let mut store = ParamStore::new();
        let first = store.register("shared", var.clone());
        let second = store.register("alias", var);

        assert_eq!(first, second);
        assert_eq!(second.name(), "shared");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_separate_stores_never_share_ids() {
        let device = Device::Cpu;
        let mut first = ParamStore::new();
        let mut second = ParamStore::new();
        let a = first.register("a", Var::zeros(2, DType::F32, &device).unwrap());
        let b = second.register("b", Var::zeros(2, DType::F32, &device).unwrap());

        assert_ne!(a.id(), b.id());
        assert!(first.get(b.id()).is_none());
        assert!(second.get(a.id()).is_none());
        assert_eq!(second.get(b.id()).unwrap().name(), "b");
    }

    #[test]
    fn test_equal_values_distinct_identity() {
        let device = Device::Cpu;
        let mut store = ParamStore::new();
        let a = store.register("a", Var::ones(3, DType::F32, &device).unwrap());
        let b = store.register("b", Var::ones(3, DType::F32, &device).unwrap());
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_binding_trainable() {
        let device = Device::Cpu;
        let mut store = ParamStore::new();
        let param = store.register("p", Var::ones(3, DType::F32, &device).unwrap());

        let trainable = Binding::from(param.clone());
        assert!(trainable.is_trainable());
        assert_eq!(trainable.as_trainable(), Some(&param));

        let frozen = Binding::Frozen(Tensor::ones(3, DType::F32, &device).unwrap());
        assert!(!frozen.is_trainable());
        assert!(frozen.as_trainable().is_none());
        assert_eq!(frozen.as_tensor().dims(), &[3]);
    }
}
