//! # Operation Dispatch Layer
//!
//! This module decides which typed code path services a fully-connected
//! call and hands the resulting plan to an executor.
//!
//! ## Submodules
//!
//! - [`dispatch`] — the forward and gradient dispatchers and the executor seam
//! - [`cpu`] — multi-threaded reference executor for every emitted plan
//! - `wgpu` *(opt-in)* — device capability query backed by real adapters
//!
//! ## Extending the Backend
//!
//! To add a new executor:
//!
//! 1. Implement [`dispatch::TypedExecutor`] for it
//! 2. Match on the plan's storage and math types and run the kernel
//! 3. Return `false` for plans it cannot service
//!
//! ## Feature Flags
//!
//! - `wgpu` — Enables the `wgpu` capability query

pub mod cpu;
pub mod dispatch;

#[cfg(feature = "wgpu")]
pub mod wgpu;
