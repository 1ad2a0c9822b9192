//! Fully-connected operators bound to a workspace.
//!
//! An operator is built from an [`OperatorDef`] and an [`OpBinding`] chosen
//! by the registry. It owns a [`Dispatcher`] whose configuration never
//! changes afterwards; running it reads input blobs, dispatches and stores
//! the outputs back under the names from the definition.

use core::fmt;

use crate::device::{DeviceId, DeviceQuery};
use crate::error::{DispatchError, Result};
use crate::ops::dispatch::{Dispatcher, ForwardState, GradientState, TypedExecutor};
use crate::registry::{OpBinding, OpKind};
use crate::tensors::{Tensor, Workspace};

/// Serialized description of one operator instance.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OperatorDef {
    /// Registered operator name, e.g. `"FC"`.
    pub op_type: String,
    /// Requested engine name; `None` uses the process default.
    pub engine: Option<String>,
    /// Input blob names.
    pub inputs: Vec<String>,
    /// Output blob names.
    pub outputs: Vec<String>,
    /// Request FP16 accumulation for FP16 inputs.
    pub float16_compute: bool,
    /// Device to run on.
    pub device: DeviceId,
}

impl OperatorDef {
    /// A definition with no inputs, outputs or arguments.
    pub fn new(op_type: impl Into<String>) -> Self {
        Self {
            op_type: op_type.into(),
            ..Self::default()
        }
    }

    /// Sets the engine name.
    #[must_use]
    pub fn with_engine(mut self, engine: impl Into<String>) -> Self {
        self.engine = Some(engine.into());
        self
    }

    /// Sets the input blob names.
    #[must_use]
    pub fn with_inputs<I, S>(mut self, inputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inputs = inputs.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the output blob names.
    #[must_use]
    pub fn with_outputs<I, S>(mut self, outputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.outputs = outputs.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the `float16_compute` argument.
    #[must_use]
    pub const fn with_float16_compute(mut self, on: bool) -> Self {
        self.float16_compute = on;
        self
    }

    /// Sets the device.
    #[must_use]
    pub const fn on_device(mut self, device: DeviceId) -> Self {
        self.device = device;
        self
    }

    fn check_arity(&self, inputs: usize, outputs: core::ops::RangeInclusive<usize>) -> Result<()> {
        if self.inputs.len() != inputs {
            return Err(DispatchError::InvalidDefinition(format!(
                "{} expects {inputs} inputs, got {}",
                self.op_type,
                self.inputs.len()
            )));
        }
        if !outputs.contains(&self.outputs.len()) {
            return Err(DispatchError::InvalidDefinition(format!(
                "{} expects {}..={} outputs, got {}",
                self.op_type,
                outputs.start(),
                outputs.end(),
                self.outputs.len()
            )));
        }
        Ok(())
    }
}

/// A runnable operator instance.
pub trait Operator: fmt::Debug {
    /// The registered name this instance was created from.
    fn op_type(&self) -> &str;

    /// The fixed dispatch configuration.
    fn dispatcher(&self) -> &Dispatcher;

    /// Runs the operator once.
    ///
    /// Returns the executor's result. Outputs are written to `ws` only when it
    /// reports success.
    ///
    /// # Errors
    /// [`DispatchError::MissingBlob`] if an input is absent and
    /// [`DispatchError::UnsupportedInputType`] if `X` is neither `float` nor
    /// `float16`.
    fn run(
        &mut self,
        ws: &mut Workspace,
        device: &dyn DeviceQuery,
        executor: &mut dyn TypedExecutor,
    ) -> Result<bool>;
}

fn blob<'a>(ws: &'a Workspace, name: &str) -> Result<&'a Tensor> {
    ws.get(name)
        .ok_or_else(|| DispatchError::MissingBlob(name.to_owned()))
}

fn dispatcher_for(def: &OperatorDef, binding: OpBinding) -> Dispatcher {
    Dispatcher::new(binding.engine, binding.layout, def.float16_compute, def.device)
}

/// `Y = FC(X, W, B)`.
#[derive(Debug, Clone)]
pub struct FullyConnectedOp {
    op_type: String,
    dispatcher: Dispatcher,
    inputs: [String; 3],
    output: String,
}

impl FullyConnectedOp {
    /// Builds the operator from its definition.
    ///
    /// # Errors
    /// [`DispatchError::InvalidDefinition`] unless the definition has exactly
    /// three inputs and one output, or if `binding` is not a forward binding.
    pub fn new(def: &OperatorDef, binding: OpBinding) -> Result<Self> {
        if binding.kind != OpKind::Forward {
            return Err(DispatchError::InvalidDefinition(format!(
                "{} is not bound to a forward operator",
                def.op_type
            )));
        }
        def.check_arity(3, 1..=1)?;
        let [x, w, b] = [0, 1, 2].map(|i| def.inputs[i].clone());
        Ok(Self {
            op_type: def.op_type.clone(),
            dispatcher: dispatcher_for(def, binding),
            inputs: [x, w, b],
            output: def.outputs[0].clone(),
        })
    }
}

impl Operator for FullyConnectedOp {
    fn op_type(&self) -> &str {
        &self.op_type
    }

    fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    fn run(
        &mut self,
        ws: &mut Workspace,
        device: &dyn DeviceQuery,
        executor: &mut dyn TypedExecutor,
    ) -> Result<bool> {
        let [x, w, b] = &self.inputs;
        let mut state = ForwardState::new(blob(ws, x)?, blob(ws, w)?, blob(ws, b)?);
        let ok = self.dispatcher.run_forward(device, executor, &mut state)?;
        let y = state.y.take();
        if let (true, Some(y)) = (ok, y) {
            ws.insert(self.output.clone(), y);
        }
        Ok(ok)
    }
}

/// `(dW, dB[, dX]) = FCGradient(X, W, dY)`.
#[derive(Debug, Clone)]
pub struct FullyConnectedGradientOp {
    op_type: String,
    dispatcher: Dispatcher,
    inputs: [String; 3],
    outputs: Vec<String>,
}

impl FullyConnectedGradientOp {
    /// Builds the operator from its definition.
    ///
    /// # Errors
    /// [`DispatchError::InvalidDefinition`] unless the definition has three
    /// inputs and two or three outputs, or if `binding` is not a gradient
    /// binding.
    pub fn new(def: &OperatorDef, binding: OpBinding) -> Result<Self> {
        if binding.kind != OpKind::Gradient {
            return Err(DispatchError::InvalidDefinition(format!(
                "{} is not bound to a gradient operator",
                def.op_type
            )));
        }
        def.check_arity(3, 2..=3)?;
        let [x, w, dy] = [0, 1, 2].map(|i| def.inputs[i].clone());
        Ok(Self {
            op_type: def.op_type.clone(),
            dispatcher: dispatcher_for(def, binding),
            inputs: [x, w, dy],
            outputs: def.outputs.clone(),
        })
    }

    /// Whether the input gradient is produced.
    #[must_use]
    pub fn computes_input_grad(&self) -> bool {
        self.outputs.len() > 2
    }
}

impl Operator for FullyConnectedGradientOp {
    fn op_type(&self) -> &str {
        &self.op_type
    }

    fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    fn run(
        &mut self,
        ws: &mut Workspace,
        device: &dyn DeviceQuery,
        executor: &mut dyn TypedExecutor,
    ) -> Result<bool> {
        let want_dx = self.computes_input_grad();
        let [x, w, dy] = &self.inputs;
        let mut state = GradientState::new(blob(ws, x)?, blob(ws, w)?, blob(ws, dy)?, want_dx);
        let ok = self.dispatcher.run_gradient(device, executor, &mut state)?;
        let grads = [state.dw.take(), state.db.take(), state.dx.take()];
        if ok {
            for (name, grad) in self.outputs.iter().zip(grads) {
                if let Some(grad) = grad {
                    ws.insert(name.clone(), grad);
                }
            }
        }
        Ok(ok)
    }
}
