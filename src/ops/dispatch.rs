//! Operation Dispatch Layer
//!
//! This module selects the typed code path for every fully-connected call,
//! based on the element type of the primary input and, when the operator
//! asks for FP16 accumulation, the live capability of its device.
//!
//! Each call resolves in this order:
//! 1. Unsupported input type → error, nothing else happens
//! 2. `float` input → all-`float` plan
//! 3. `float16` input → `float16` storage, accumulation picked by
//!    [`select_math`]; an incapable device degrades to `float` accumulation
//!    with one informational log line
//!
//! # Design Highlights
//! - **Lazy query**: the device is only asked when the answer matters
//! - **Non-fatal fallback**: a missing FP16 unit never fails the call
//!
//! # Example
//! ```rust
//! use fc_dispatch::device::{DeviceId, FixedCapability};
//! use fc_dispatch::dtype::ElementType;
//! use fc_dispatch::engine::Engine;
//! use fc_dispatch::ops::dispatch::Dispatcher;
//! use fc_dispatch::plan::{ForwardPlan, WeightLayout};
//!
//! let fc = Dispatcher::new(Engine::Default, WeightLayout::Natural, true, DeviceId(0));
//! let plan = fc.forward_plan(ElementType::F16, &FixedCapability(7)).unwrap();
//! assert_eq!(plan, ForwardPlan::uniform(ElementType::F16, ElementType::F16));
//! ```

use log::{debug, info};

use crate::device::{DeviceId, DeviceQuery};
use crate::dtype::{ElementType, TypeFamily};
use crate::engine::Engine;
use crate::error::{DispatchError, Result};
use crate::plan::{select_math, ForwardPlan, GradientPlan, MathChoice, WeightLayout};
use crate::tensors::Tensor;

/// Borrowed inputs and output slot of a forward call.
#[derive(Debug)]
pub struct ForwardState<'a> {
    /// Input activations, `M×K`.
    pub x: &'a Tensor,
    /// Weights in the dispatcher's layout.
    pub w: &'a Tensor,
    /// Bias, `N` elements.
    pub b: &'a Tensor,
    /// Filled by the executor on success.
    pub y: Option<Tensor>,
}

impl<'a> ForwardState<'a> {
    /// A state with an empty output slot.
    #[must_use]
    pub const fn new(x: &'a Tensor, w: &'a Tensor, b: &'a Tensor) -> Self {
        Self { x, w, b, y: None }
    }
}

/// Borrowed inputs and output slots of a gradient call.
#[derive(Debug)]
pub struct GradientState<'a> {
    /// Forward input activations.
    pub x: &'a Tensor,
    /// Weights in the dispatcher's layout.
    pub w: &'a Tensor,
    /// Gradient of the output, `M×N`.
    pub dy: &'a Tensor,
    /// Whether `dx` should be produced.
    pub want_dx: bool,
    /// Weight gradient, shaped like `w`.
    pub dw: Option<Tensor>,
    /// Bias gradient.
    pub db: Option<Tensor>,
    /// Input gradient, shaped like `x`; only set when `want_dx` is.
    pub dx: Option<Tensor>,
}

impl<'a> GradientState<'a> {
    /// A state with empty output slots.
    #[must_use]
    pub const fn new(x: &'a Tensor, w: &'a Tensor, dy: &'a Tensor, want_dx: bool) -> Self {
        Self {
            x,
            w,
            dy,
            want_dx,
            dw: None,
            db: None,
            dx: None,
        }
    }
}

/// Performs the numeric work for a plan.
///
/// The `layout` argument selects the entry point for natural or
/// pre-transposed weights. The returned flag is passed back to the caller
/// unchanged.
pub trait TypedExecutor {
    /// Runs a forward call.
    fn forward(
        &mut self,
        plan: ForwardPlan,
        layout: WeightLayout,
        state: &mut ForwardState<'_>,
    ) -> bool;

    /// Runs a gradient call.
    fn gradient(
        &mut self,
        plan: GradientPlan,
        layout: WeightLayout,
        state: &mut GradientState<'_>,
    ) -> bool;
}

impl<E: TypedExecutor + ?Sized> TypedExecutor for &mut E {
    fn forward(
        &mut self,
        plan: ForwardPlan,
        layout: WeightLayout,
        state: &mut ForwardState<'_>,
    ) -> bool {
        (**self).forward(plan, layout, state)
    }

    fn gradient(
        &mut self,
        plan: GradientPlan,
        layout: WeightLayout,
        state: &mut GradientState<'_>,
    ) -> bool {
        (**self).gradient(plan, layout, state)
    }
}

/// Per-operator dispatch configuration, fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dispatcher {
    /// Engine the operator was registered under.
    pub engine: Engine,
    /// Backend entry point.
    pub layout: WeightLayout,
    /// The operator's request for FP16 accumulation.
    pub float16_compute: bool,
    /// Device the operator runs on.
    pub device: DeviceId,
}

impl Dispatcher {
    /// Creates a dispatcher.
    #[must_use]
    pub const fn new(
        engine: Engine,
        layout: WeightLayout,
        float16_compute: bool,
        device: DeviceId,
    ) -> Self {
        Self {
            engine,
            layout,
            float16_compute,
            device,
        }
    }

    /// The preference handed to the accumulation policy.
    ///
    /// Tensor-core bindings always report `false`.
    #[must_use]
    pub const fn prefers_reduced(&self) -> bool {
        self.engine.honours_float16_compute() && self.float16_compute
    }

    fn choose<Q>(&self, input: ElementType, device: &Q) -> Result<(TypeFamily, MathChoice)>
    where
        Q: DeviceQuery + ?Sized,
    {
        let family = input
            .family()
            .ok_or(DispatchError::UnsupportedInputType(input))?;
        let choice = select_math(family, self.prefers_reduced(), || {
            device.capability_of(self.device)
        });
        if choice.fell_back {
            info!(
                "Device {} does not support FP16 computation, falling back to FP32.",
                self.device
            );
        }
        Ok((family, choice))
    }

    /// Picks the forward plan for an input of type `input`.
    ///
    /// # Errors
    /// [`DispatchError::UnsupportedInputType`] for anything but `float` and
    /// `float16`.
    pub fn forward_plan<Q>(&self, input: ElementType, device: &Q) -> Result<ForwardPlan>
    where
        Q: DeviceQuery + ?Sized,
    {
        let (family, choice) = self.choose(input, device)?;
        Ok(ForwardPlan::select(family, choice))
    }

    /// Picks the gradient plan for an input of type `input`.
    ///
    /// # Errors
    /// [`DispatchError::UnsupportedInputType`] for anything but `float` and
    /// `float16`.
    pub fn gradient_plan<Q>(&self, input: ElementType, device: &Q) -> Result<GradientPlan>
    where
        Q: DeviceQuery + ?Sized,
    {
        let (family, choice) = self.choose(input, device)?;
        Ok(GradientPlan::select(family, choice))
    }

    /// Dispatches a forward call and returns the executor's result.
    ///
    /// # Errors
    /// [`DispatchError::UnsupportedInputType`] if `state.x` has an
    /// unsupported element type; the executor is not invoked.
    pub fn run_forward<Q, E>(
        &self,
        device: &Q,
        executor: &mut E,
        state: &mut ForwardState<'_>,
    ) -> Result<bool>
    where
        Q: DeviceQuery + ?Sized,
        E: TypedExecutor + ?Sized,
    {
        let plan = self.forward_plan(state.x.dtype(), device)?;
        debug!("FC forward on device {} ({}): {plan:?}", self.device, self.engine);
        Ok(executor.forward(plan, self.layout, state))
    }

    /// Dispatches a gradient call and returns the executor's result.
    ///
    /// # Errors
    /// [`DispatchError::UnsupportedInputType`] if `state.x` has an
    /// unsupported element type; the executor is not invoked.
    pub fn run_gradient<Q, E>(
        &self,
        device: &Q,
        executor: &mut E,
        state: &mut GradientState<'_>,
    ) -> Result<bool>
    where
        Q: DeviceQuery + ?Sized,
        E: TypedExecutor + ?Sized,
    {
        let plan = self.gradient_plan(state.x.dtype(), device)?;
        debug!("FC gradient on device {} ({}): {plan:?}", self.device, self.engine);
        Ok(executor.gradient(plan, self.layout, state))
    }
}
