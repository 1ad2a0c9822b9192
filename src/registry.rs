//! Operator registration.
//!
//! Binds operator names and engines to a fixed [`OpBinding`]. This is pure
//! configuration: every binding ends up in the same [`Dispatcher`] logic,
//! only the weight layout and the engine (and therefore whether
//! `float16_compute` is honoured) differ.
//!
//! | name                   | kind     | layout        |
//! |------------------------|----------|---------------|
//! | `FC`                   | forward  | natural       |
//! | `FCGradient`           | gradient | natural       |
//! | `FCTransposed`         | forward  | pre-transposed|
//! | `FCTransposedGradient` | gradient | pre-transposed|
//!
//! Each name is registered for [`Engine::Default`] and, on runtimes of at
//! least [`TENSOR_CORE_MIN_RUNTIME_VERSION`], for [`Engine::TensorCore`].
//!
//! [`Dispatcher`]: crate::ops::dispatch::Dispatcher
//! [`TENSOR_CORE_MIN_RUNTIME_VERSION`]: crate::engine::TENSOR_CORE_MIN_RUNTIME_VERSION

use std::collections::HashMap;

use log::debug;

use crate::engine::{get_default_engine, Engine};
use crate::error::{DispatchError, Result};
use crate::operator::{FullyConnectedGradientOp, FullyConnectedOp, Operator, OperatorDef};
use crate::plan::WeightLayout;

/// Forward FC, natural weights.
pub const FC: &str = "FC";
/// Gradient of [`FC`].
pub const FC_GRADIENT: &str = "FCGradient";
/// Forward FC, pre-transposed weights.
pub const FC_TRANSPOSED: &str = "FCTransposed";
/// Gradient of [`FC_TRANSPOSED`].
pub const FC_TRANSPOSED_GRADIENT: &str = "FCTransposedGradient";

/// Runtime version assumed by [`OperatorRegistry::new`].
pub const DEFAULT_RUNTIME_VERSION: u32 = 9000;

/// Whether a binding computes the forward or the gradient pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    /// Computes `Y`.
    Forward,
    /// Computes `dW`, `dB` and optionally `dX`.
    Gradient,
}

/// What a registered `(name, engine)` pair resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OpBinding {
    /// Forward or gradient pass.
    pub kind: OpKind,
    /// Weight orientation the operator expects.
    pub layout: WeightLayout,
    /// Engine the binding was registered under.
    pub engine: Engine,
}

/// Maps `(name, engine)` pairs to bindings.
#[derive(Debug, Clone)]
pub struct OperatorRegistry {
    runtime_version: u32,
    bindings: HashMap<(String, Engine), OpBinding>,
}

impl Default for OperatorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl OperatorRegistry {
    /// A registry with the FC family registered for
    /// [`DEFAULT_RUNTIME_VERSION`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_runtime_version(DEFAULT_RUNTIME_VERSION)
    }

    /// A registry with the FC family registered for `runtime_version`.
    #[must_use]
    pub fn with_runtime_version(runtime_version: u32) -> Self {
        let mut registry = Self::empty(runtime_version);
        registry.register_fully_connected();
        registry
    }

    /// A registry with nothing registered.
    #[must_use]
    pub fn empty(runtime_version: u32) -> Self {
        Self {
            runtime_version,
            bindings: HashMap::new(),
        }
    }

    /// The runtime version engines are checked against.
    #[must_use]
    pub const fn runtime_version(&self) -> u32 {
        self.runtime_version
    }

    /// Registers `binding` under `op_type` and its engine.
    ///
    /// Returns `false` and registers nothing if the engine is not available
    /// on this runtime.
    pub fn register(&mut self, op_type: impl Into<String>, binding: OpBinding) -> bool {
        if !binding.engine.is_available(self.runtime_version) {
            return false;
        }
        self.bindings
            .insert((op_type.into(), binding.engine), binding);
        true
    }

    fn register_fully_connected(&mut self) {
        let family = [
            (FC, OpKind::Forward, WeightLayout::Natural),
            (FC_GRADIENT, OpKind::Gradient, WeightLayout::Natural),
            (FC_TRANSPOSED, OpKind::Forward, WeightLayout::PreTransposed),
            (FC_TRANSPOSED_GRADIENT, OpKind::Gradient, WeightLayout::PreTransposed),
        ];
        for engine in [Engine::Default, Engine::TensorCore] {
            for (name, kind, layout) in family {
                self.register(name, OpBinding { kind, layout, engine });
            }
        }
    }

    /// Exact lookup, without engine fallback.
    #[must_use]
    pub fn lookup(&self, op_type: &str, engine: Engine) -> Option<OpBinding> {
        self.bindings.get(&(op_type.to_owned(), engine)).copied()
    }

    /// All registered `(name, engine)` pairs, sorted.
    #[must_use]
    pub fn registered(&self) -> Vec<(&str, Engine)> {
        let mut keys: Vec<_> = self
            .bindings
            .keys()
            .map(|(name, engine)| (name.as_str(), *engine))
            .collect();
        keys.sort_by(|a, b| a.0.cmp(b.0).then((a.1 as u8).cmp(&(b.1 as u8))));
        keys
    }

    /// Resolves the binding for `def`.
    ///
    /// The requested engine (or the process default when none is named) is
    /// tried first, then [`Engine::Default`].
    ///
    /// # Errors
    /// [`DispatchError::UnknownEngine`] for an unparsable engine name and
    /// [`DispatchError::UnknownOperator`] if the name is not registered at all.
    pub fn resolve(&self, def: &OperatorDef) -> Result<OpBinding> {
        let engine = match def.engine.as_deref() {
            Some(name) => {
                Engine::from_name(name).ok_or_else(|| DispatchError::UnknownEngine(name.to_owned()))?
            }
            None => get_default_engine(),
        };
        if let Some(binding) = self.lookup(&def.op_type, engine) {
            return Ok(binding);
        }
        if engine != Engine::Default {
            if let Some(binding) = self.lookup(&def.op_type, Engine::Default) {
                debug!(
                    "{} has no {engine} implementation on runtime {}, using {}",
                    def.op_type,
                    self.runtime_version(),
                    Engine::Default
                );
                return Ok(binding);
            }
        }
        Err(DispatchError::UnknownOperator {
            op_type: def.op_type.clone(),
        })
    }

    /// Instantiates the operator described by `def`.
    ///
    /// # Errors
    /// Any error of [`resolve`](Self::resolve), or
    /// [`DispatchError::InvalidDefinition`] if the inputs and outputs do not
    /// fit the operator.
    pub fn create(&self, def: &OperatorDef) -> Result<Box<dyn Operator>> {
        let binding = self.resolve(def)?;
        Ok(match binding.kind {
            OpKind::Forward => Box::new(FullyConnectedOp::new(def, binding)?),
            OpKind::Gradient => Box::new(FullyConnectedGradientOp::new(def, binding)?),
        })
    }
}
