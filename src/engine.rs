//! Engine selection module.
//!
//! An engine is the backend kernel family that services a registered
//! operator name. Engines are bound when an operator is instantiated, never
//! per call.
//!
//! # Supported Engines
//!
//! - `Default` — general purpose kernels, always registered.
//! - `TensorCore` — high-throughput kernels, registered only when the runtime
//!   is at least [`TENSOR_CORE_MIN_RUNTIME_VERSION`]. These kernels manage
//!   their own precision, so they never take the reduced-precision
//!   accumulation path.
//!
//! The engine used for definitions that do not name one is stored globally
//! in an `AtomicU8`, so it can be switched at runtime.

use briny::traits::{InteriorImmutable, RawConvert, StableLayout, Unaligned};
use core::convert::TryFrom;
use core::fmt;
use core::sync::atomic::{AtomicU8, Ordering};

/// Runtime version from which [`Engine::TensorCore`] kernels exist.
pub const TENSOR_CORE_MIN_RUNTIME_VERSION: u32 = 9000;

/// Backend kernel families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum Engine {
    /// General purpose kernels (default).
    #[default]
    Default = 0,
    /// Tensor-core kernels.
    TensorCore,
}

unsafe impl StableLayout for Engine {}
unsafe impl RawConvert for Engine {}
unsafe impl Unaligned for Engine {}
unsafe impl InteriorImmutable for Engine {}

impl TryFrom<u8> for Engine {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Default),
            1 => Ok(Self::TensorCore),
            _ => Err(()),
        }
    }
}

impl Engine {
    /// Parses an engine name as written in an operator definition.
    ///
    /// The empty string and `"DEFAULT"` name the default engine; matching is
    /// case-insensitive.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        if name.is_empty() || name.eq_ignore_ascii_case("DEFAULT") {
            Some(Self::Default)
        } else if name.eq_ignore_ascii_case("TENSORCORE") {
            Some(Self::TensorCore)
        } else {
            None
        }
    }

    /// Canonical registration name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Default => "DEFAULT",
            Self::TensorCore => "TENSORCORE",
        }
    }

    /// Whether this engine's kernels exist on the given runtime version.
    #[must_use]
    pub const fn is_available(self, runtime_version: u32) -> bool {
        match self {
            Self::Default => true,
            Self::TensorCore => runtime_version >= TENSOR_CORE_MIN_RUNTIME_VERSION,
        }
    }

    /// Whether the operator's `float16_compute` flag is forwarded to the
    /// dispatcher. Tensor-core bindings always pass `false`.
    #[must_use]
    pub const fn honours_float16_compute(self) -> bool {
        matches!(self, Self::Default)
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Global engine used when a definition does not name one.
///
/// Expected to change during setup only, not while operators run.
static GLOBAL_DEFAULT_ENGINE: AtomicU8 = AtomicU8::new(Engine::Default as u8);

/// Sets the engine used for definitions without an explicit engine.
///
/// # Example
///
/// ```
/// use fc_dispatch::engine::{get_default_engine, set_default_engine, Engine};
/// set_default_engine(Engine::TensorCore);
/// assert_eq!(get_default_engine(), Engine::TensorCore);
/// set_default_engine(Engine::Default);
/// ```
pub fn set_default_engine(e: Engine) {
    GLOBAL_DEFAULT_ENGINE.store(e as u8, Ordering::Release);
}

/// Returns the engine used for definitions without an explicit engine.
///
/// If the stored value is invalid, defaults to [`Engine::Default`].
pub fn get_default_engine() -> Engine {
    Engine::try_from(GLOBAL_DEFAULT_ENGINE.load(Ordering::Acquire)).unwrap_or_default()
}
