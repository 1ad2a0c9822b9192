//! Typed execution plans and the shared accumulation policy.
//!
//! A plan names one [`ElementType`] per semantic slot of a fully-connected
//! call plus the `math` type products are accumulated in. Plans are built
//! fresh for every invocation, passed to the executor by value and dropped.
//!
//! Both the forward and the gradient plan are derived from the same
//! [`select_math`] decision, so the two paths cannot pick different
//! accumulation types for the same inputs.

use crate::device::Capability;
use crate::dtype::{ElementType, TypeFamily};

/// Orientation of the weight operand, which picks the backend entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum WeightLayout {
    /// `W` is `N×K` and the kernel computes `Y = X·Wᵀ + B`.
    #[default]
    Natural,
    /// `W` is `K×N` and the kernel computes `Y = X·W + B`.
    PreTransposed,
}

/// Outcome of the accumulation policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MathChoice {
    /// Accumulation type.
    pub math: ElementType,
    /// `true` when FP16 accumulation was requested but the device could not
    /// provide it.
    pub fell_back: bool,
}

/// Picks the accumulation type for one invocation.
///
/// `capability` is only called when the answer depends on it: reduced input
/// with `prefer_reduced` set.
pub fn select_math<F>(family: TypeFamily, prefer_reduced: bool, capability: F) -> MathChoice
where
    F: FnOnce() -> Capability,
{
    let pick = |math, fell_back| MathChoice { math, fell_back };
    match family {
        TypeFamily::Full => pick(ElementType::F32, false),
        TypeFamily::Reduced if !prefer_reduced => pick(ElementType::F32, false),
        TypeFamily::Reduced => {
            if capability().supports_fp16_compute() {
                pick(ElementType::F16, false)
            } else {
                pick(ElementType::F32, true)
            }
        }
    }
}

/// Slot types for a forward call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ForwardPlan {
    /// Input activations.
    pub x: ElementType,
    /// Weights.
    pub w: ElementType,
    /// Bias.
    pub b: ElementType,
    /// Output.
    pub y: ElementType,
    /// Accumulation type.
    pub math: ElementType,
}

impl ForwardPlan {
    /// Every storage slot set to `storage`, accumulating in `math`.
    #[must_use]
    pub const fn uniform(storage: ElementType, math: ElementType) -> Self {
        Self {
            x: storage,
            w: storage,
            b: storage,
            y: storage,
            math,
        }
    }

    /// Storage slots follow `family`, accumulation follows `choice`.
    #[must_use]
    pub const fn select(family: TypeFamily, choice: MathChoice) -> Self {
        Self::uniform(family.storage(), choice.math)
    }

    /// The storage slots in declaration order.
    #[must_use]
    pub const fn storage_slots(&self) -> [ElementType; 4] {
        [self.x, self.w, self.b, self.y]
    }
}

/// Slot types for a gradient call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GradientPlan {
    /// Forward input activations.
    pub x: ElementType,
    /// Weights.
    pub w: ElementType,
    /// Upstream gradient.
    pub dy: ElementType,
    /// Bias.
    pub b: ElementType,
    /// Input gradient.
    pub dx: ElementType,
    /// Weight gradient.
    pub dw: ElementType,
    /// Bias gradient.
    pub db: ElementType,
    /// Accumulation type.
    pub math: ElementType,
}

impl GradientPlan {
    /// Every storage slot set to `storage`, accumulating in `math`.
    #[must_use]
    pub const fn uniform(storage: ElementType, math: ElementType) -> Self {
        Self {
            x: storage,
            w: storage,
            dy: storage,
            b: storage,
            dx: storage,
            dw: storage,
            db: storage,
            math,
        }
    }

    /// Storage slots follow `family`, accumulation follows `choice`.
    #[must_use]
    pub const fn select(family: TypeFamily, choice: MathChoice) -> Self {
        Self::uniform(family.storage(), choice.math)
    }

    /// The storage slots in declaration order.
    #[must_use]
    pub const fn storage_slots(&self) -> [ElementType; 7] {
        [self.x, self.w, self.dy, self.b, self.dx, self.dw, self.db]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::FP16_MIN_FEATURE_LEVEL;

    fn never() -> Capability {
        panic!("capability must not be queried")
    }

    #[test]
    fn full_precision_never_queries() {
        for prefer in [false, true] {
            let c = select_math(TypeFamily::Full, prefer, never);
            assert_eq!(c.math, ElementType::F32);
            assert!(!c.fell_back);
        }
    }

    #[test]
    fn reduced_without_preference_accumulates_in_f32() {
        let c = select_math(TypeFamily::Reduced, false, never);
        assert_eq!(
            c,
            MathChoice {
                math: ElementType::F32,
                fell_back: false
            }
        );
    }

    #[test]
    fn reduced_with_preference_follows_capability() {
        let capable = select_math(TypeFamily::Reduced, true, || {
            Capability::new(FP16_MIN_FEATURE_LEVEL)
        });
        assert_eq!(capable.math, ElementType::F16);
        assert!(!capable.fell_back);

        let old = select_math(TypeFamily::Reduced, true, || {
            Capability::new(FP16_MIN_FEATURE_LEVEL - 1)
        });
        assert_eq!(old.math, ElementType::F32);
        assert!(old.fell_back);
    }

    #[test]
    fn plans_keep_storage_homogeneous() {
        let choice = MathChoice {
            math: ElementType::F32,
            fell_back: false,
        };
        let fwd = ForwardPlan::select(TypeFamily::Reduced, choice);
        let grad = GradientPlan::select(TypeFamily::Reduced, choice);
        assert!(fwd.storage_slots().iter().all(|&t| t == ElementType::F16));
        assert!(grad.storage_slots().iter().all(|&t| t == ElementType::F16));
        assert_eq!(fwd.math, grad.math);
    }
}
