//! Device capability from real GPU adapters using WGPU.
//!
//! WGPU does not expose a numeric feature level, so the adapter's
//! `SHADER_F16` feature is mapped onto one: adapters with native half
//! precision report [`FP16_MIN_FEATURE_LEVEL`], the rest one less.
//! Unknown device ordinals report level `0`.
//!
//! Adapters are enumerated once; a process-wide instance is available through
//! [`WgpuDeviceQuery::global`] (initialized via `lazy_static`).

use log::{debug, warn};
use thiserror::Error;

use crate::device::{Capability, DeviceId, DeviceQuery, FP16_MIN_FEATURE_LEVEL};

/// Basic wrapper for adapter discovery errors.
#[derive(Debug, Error)]
pub enum GpuError {
    /// An error in requesting the adapter.
    #[error("Adapter error: {0}")]
    Adapter(#[from] wgpu::RequestAdapterError),
}

/// Capability snapshot of every adapter visible to WGPU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WgpuDeviceQuery {
    levels: Vec<u32>,
}

fn feature_level(adapter: &wgpu::Adapter) -> u32 {
    let info = adapter.get_info();
    let level = if adapter.features().contains(wgpu::Features::SHADER_F16) {
        FP16_MIN_FEATURE_LEVEL
    } else {
        FP16_MIN_FEATURE_LEVEL - 1
    };
    debug!("adapter {} ({:?}): feature level {level}", info.name, info.backend);
    level
}

impl WgpuDeviceQuery {
    /// Enumerates adapters on every backend.
    ///
    /// If enumeration finds nothing, the default adapter is requested
    /// instead, using `pollster::block_on` to wait for it.
    ///
    /// # Errors
    /// [`GpuError::Adapter`] if no adapter is available at all.
    pub fn new() -> Result<Self, GpuError> {
        let instance = wgpu::Instance::default();
        let mut levels: Vec<u32> = instance
            .enumerate_adapters(wgpu::Backends::all())
            .iter()
            .map(feature_level)
            .collect();
        if levels.is_empty() {
            let adapter = pollster::block_on(
                instance.request_adapter(&wgpu::RequestAdapterOptions::default()),
            )?;
            levels.push(feature_level(&adapter));
        }
        Ok(Self { levels })
    }

    /// The process-wide query, or `None` if no adapter could be found.
    #[must_use]
    pub fn global() -> Option<&'static Self> {
        GLOBAL_QUERY.as_ref()
    }

    /// Number of adapters found.
    #[must_use]
    pub fn device_count(&self) -> usize {
        self.levels.len()
    }
}

impl DeviceQuery for WgpuDeviceQuery {
    fn capability_of(&self, device: DeviceId) -> Capability {
        Capability::new(self.levels.get(device.0).copied().unwrap_or(0))
    }
}

lazy_static::lazy_static! {
    static ref GLOBAL_QUERY: Option<WgpuDeviceQuery> = match WgpuDeviceQuery::new() {
        Ok(q) => Some(q),
        Err(e) => {
            warn!("no GPU adapter available: {e}");
            None
        }
    };
}
