//! fc_dispatch: precision-aware dispatch for fully-connected operators.
//!
//! Given the element type of an operator's primary input, its
//! `float16_compute` preference and the live capability of its device, the
//! dispatcher picks one typed execution plan for the forward or gradient
//! pass and hands it to an executor. Running FP16 accumulation on a device
//! that cannot do it natively degrades to FP32 accumulation with a log
//! notice; it never fails the call.
//!
//! # Modules
//!
//! - [`dtype`] — element type tags and the full/reduced families.
//! - [`device`] — capability records and the query trait.
//! - [`plan`] — typed plans and the shared accumulation policy.
//! - [`ops`] — dispatchers, the executor trait and a CPU reference executor.
//! - [`engine`] — engine variants and the process default engine.
//! - [`registry`] / [`operator`] — named operator bindings and instances.
//! - [`tensors`] — type-erased tensors and the blob workspace.
//!
//! # Example
//!
//! ```rust
//! use fc_dispatch::device::FixedCapability;
//! use fc_dispatch::operator::OperatorDef;
//! use fc_dispatch::ops::cpu::CpuExecutor;
//! use fc_dispatch::registry::OperatorRegistry;
//! use fc_dispatch::tensors::Workspace;
//! use fc_dispatch::tensor;
//!
//! let mut ws = Workspace::new();
//! ws.insert("X", tensor!([[1.0, 2.0]]));
//! ws.insert("W", tensor!([[3.0, 4.0]]));
//! ws.insert("B", tensor!([0.5]));
//!
//! let def = OperatorDef::new("FC").with_inputs(["X", "W", "B"]).with_outputs(["Y"]);
//! let mut op = OperatorRegistry::new().create(&def).unwrap();
//! assert!(op.run(&mut ws, &FixedCapability(7), &mut CpuExecutor).unwrap());
//! assert_eq!(ws.get("Y").unwrap().to_f32_vec(), vec![11.5]);
//! ```

pub mod device;
pub mod dtype;
pub mod engine;
pub mod error;
pub mod operator;
pub mod ops;
pub mod plan;
pub mod registry;
pub mod tensors;

pub use error::{DispatchError, Result};
