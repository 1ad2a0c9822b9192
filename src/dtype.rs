//! Element types and numeric families.
//!
//! The tensor layer can carry any [`ElementType`], but the fully-connected
//! dispatch core only recognizes two [`TypeFamily`] members:
//!
//! - `Full` — IEEE single precision (`f32`)
//! - `Reduced` — IEEE half precision ([`half::f16`])
//!
//! Everything else is carried around untouched and rejected at dispatch time.

use core::fmt;
use half::{bf16, f16};

use crate::tensors::TensorData;

/// Runtime tag describing how the elements of a tensor are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ElementType {
    /// 32-bit IEEE float.
    #[default]
    F32,
    /// 16-bit IEEE float.
    F16,
    /// 64-bit IEEE float.
    F64,
    /// 16-bit brain float.
    BF16,
    /// 32-bit signed integer.
    I32,
    /// 8-bit unsigned integer.
    U8,
}

impl ElementType {
    /// Every tag the tensor layer knows about.
    pub const ALL: [Self; 6] = [
        Self::F32,
        Self::F16,
        Self::F64,
        Self::BF16,
        Self::I32,
        Self::U8,
    ];

    /// The dispatch family of this tag, or `None` if the FC core does not
    /// support it.
    #[must_use]
    pub const fn family(self) -> Option<TypeFamily> {
        match self {
            Self::F32 => Some(TypeFamily::Full),
            Self::F16 => Some(TypeFamily::Reduced),
            _ => None,
        }
    }

    /// Size of one element in bytes.
    #[must_use]
    pub const fn size_in_bytes(self) -> usize {
        match self {
            Self::F64 => 8,
            Self::F32 | Self::I32 => 4,
            Self::F16 | Self::BF16 => 2,
            Self::U8 => 1,
        }
    }

    /// Short lowercase name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::F32 => "float",
            Self::F16 => "float16",
            Self::F64 => "double",
            Self::BF16 => "bfloat16",
            Self::I32 => "int32",
            Self::U8 => "uint8",
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The two precision families the dispatcher branches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeFamily {
    /// Single precision storage.
    Full,
    /// Half precision storage.
    Reduced,
}

impl TypeFamily {
    /// The storage tag every non-accumulation plan slot takes for this family.
    #[must_use]
    pub const fn storage(self) -> ElementType {
        match self {
            Self::Full => ElementType::F32,
            Self::Reduced => ElementType::F16,
        }
    }
}

/// A Rust type that can live inside a [`TensorData`].
pub trait Element: Copy + Send + Sync + 'static {
    /// The runtime tag of this type.
    const DTYPE: ElementType;

    /// Borrows the elements if `data` holds this type.
    fn slice(data: &TensorData) -> Option<&[Self]>;

    /// Wraps an owned buffer.
    fn wrap(values: Vec<Self>) -> TensorData;

    /// Lossy conversion to `f32`.
    fn into_f32(self) -> f32;

    /// Lossy conversion from `f32`.
    fn from_f32(x: f32) -> Self;
}

/// An element type the reference kernels can compute and accumulate in.
pub trait Scalar: Element {
    /// Additive identity.
    const ZERO: Self;

    /// `self + a * b`, rounded to `Self` after each operation.
    #[must_use]
    fn mul_acc(self, a: Self, b: Self) -> Self;

    /// `self + rhs`, rounded to `Self`.
    #[must_use]
    fn acc(self, rhs: Self) -> Self;
}

macro_rules! impl_element {
    ($ty:ty, $tag:ident, |$x:ident| $to:expr, |$y:ident| $from:expr) => {
        impl Element for $ty {
            const DTYPE: ElementType = ElementType::$tag;

            fn slice(data: &TensorData) -> Option<&[Self]> {
                match data {
                    TensorData::$tag(v) => Some(v.as_slice()),
                    _ => None,
                }
            }

            fn wrap(values: Vec<Self>) -> TensorData {
                TensorData::$tag(values)
            }

            #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
            fn into_f32(self) -> f32 {
                let $x = self;
                $to
            }

            #[allow(
                clippy::cast_possible_truncation,
                clippy::cast_sign_loss,
                clippy::cast_lossless
            )]
            fn from_f32(x: f32) -> Self {
                let $y = x;
                $from
            }
        }
    };
}

impl_element!(f32, F32, |x| x, |y| y);
impl_element!(f16, F16, |x| x.to_f32(), |y| f16::from_f32(y));
impl_element!(f64, F64, |x| x as f32, |y| f64::from(y));
impl_element!(bf16, BF16, |x| x.to_f32(), |y| bf16::from_f32(y));
impl_element!(i32, I32, |x| x as f32, |y| y as i32);
impl_element!(u8, U8, |x| f32::from(x), |y| y as u8);

impl Scalar for f32 {
    const ZERO: Self = 0.0;

    fn mul_acc(self, a: Self, b: Self) -> Self {
        self + a * b
    }

    fn acc(self, rhs: Self) -> Self {
        self + rhs
    }
}

impl Scalar for f16 {
    const ZERO: Self = f16::ZERO;

    fn mul_acc(self, a: Self, b: Self) -> Self {
        let prod = f16::from_f32(a.to_f32() * b.to_f32());
        f16::from_f32(self.to_f32() + prod.to_f32())
    }

    fn acc(self, rhs: Self) -> Self {
        f16::from_f32(self.to_f32() + rhs.to_f32())
    }
}
