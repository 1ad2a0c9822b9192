//! Accelerator capability queries.
//!
//! The dispatcher only needs one number from the device: its numeric feature
//! level. Native half-precision arithmetic is available from
//! [`FP16_MIN_FEATURE_LEVEL`] upwards.

use core::fmt;

/// Minimum feature level with native FP16 arithmetic.
pub const FP16_MIN_FEATURE_LEVEL: u32 = 6;

/// Ordinal of an accelerator in the current process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DeviceId(pub usize);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Snapshot of what a device can do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Capability {
    /// Hardware feature level (compute capability major version on CUDA).
    pub feature_level: u32,
}

impl Capability {
    /// A capability record with the given feature level.
    #[must_use]
    pub const fn new(feature_level: u32) -> Self {
        Self { feature_level }
    }

    /// Whether the device computes natively in FP16.
    #[must_use]
    pub const fn supports_fp16_compute(self) -> bool {
        self.feature_level >= FP16_MIN_FEATURE_LEVEL
    }
}

/// Reports the capability of a device.
///
/// Implementations must be idempotent: the dispatcher queries on every call
/// that needs the answer and never caches it.
pub trait DeviceQuery: Send + Sync {
    /// Current capability of `device`.
    fn capability_of(&self, device: DeviceId) -> Capability;
}

impl<Q: DeviceQuery + ?Sized> DeviceQuery for &Q {
    fn capability_of(&self, device: DeviceId) -> Capability {
        (**self).capability_of(device)
    }
}

/// A query that reports the same feature level for every device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FixedCapability(pub u32);

impl DeviceQuery for FixedCapability {
    fn capability_of(&self, _device: DeviceId) -> Capability {
        Capability::new(self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_is_inclusive() {
        assert!(!Capability::new(FP16_MIN_FEATURE_LEVEL - 1).supports_fp16_compute());
        assert!(Capability::new(FP16_MIN_FEATURE_LEVEL).supports_fp16_compute());
        assert!(Capability::new(9).supports_fp16_compute());
    }

    #[test]
    fn fixed_capability_ignores_device() {
        let q = FixedCapability(7);
        assert_eq!(q.capability_of(DeviceId(0)), q.capability_of(DeviceId(3)));
    }
}
