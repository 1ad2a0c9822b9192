//! Type-erased tensors and a named blob workspace.
//!
//! # Core Tensor Utilities
//!
//! Operators never know the element type of their inputs at compile time; they
//! see a [`Tensor`] whose [`TensorData`] carries the runtime tag. The
//! dispatcher reads [`Tensor::dtype`] of the primary input and the executor
//! borrows the typed slice it needs with [`Tensor::as_slice`].
//!
//! ## Design Highlights
//! - Shape is stored as a `Vec<usize>` and enforced at construction
//! - Row-major only, no broadcasting or strides
//! - The `tensor!` macro builds `f32` tensors from nested literals
//!
//! ## Example
//!
//! ```rust
//! use fc_dispatch::dtype::ElementType;
//! use fc_dispatch::tensors::Tensor;
//!
//! let t = Tensor::from_vec(vec![2, 3], vec![1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0]);
//! assert_eq!(t.shape, vec![2, 3]);
//! assert_eq!(t.cast(ElementType::F16).dtype(), ElementType::F16);
//! ```

use std::collections::HashMap;

use half::{bf16, f16};

use crate::dtype::{Element, ElementType};

/// Owned element storage, one variant per [`ElementType`].
#[derive(Debug, Clone, PartialEq)]
pub enum TensorData {
    /// `float` elements.
    F32(Vec<f32>),
    /// `float16` elements.
    F16(Vec<f16>),
    /// `double` elements.
    F64(Vec<f64>),
    /// `bfloat16` elements.
    BF16(Vec<bf16>),
    /// `int32` elements.
    I32(Vec<i32>),
    /// `uint8` elements.
    U8(Vec<u8>),
}

impl TensorData {
    /// The runtime tag of the stored elements.
    #[must_use]
    pub const fn dtype(&self) -> ElementType {
        match self {
            Self::F32(_) => ElementType::F32,
            Self::F16(_) => ElementType::F16,
            Self::F64(_) => ElementType::F64,
            Self::BF16(_) => ElementType::BF16,
            Self::I32(_) => ElementType::I32,
            Self::U8(_) => ElementType::U8,
        }
    }

    /// Number of stored elements.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::F32(v) => v.len(),
            Self::F16(v) => v.len(),
            Self::F64(v) => v.len(),
            Self::BF16(v) => v.len(),
            Self::I32(v) => v.len(),
            Self::U8(v) => v.len(),
        }
    }

    /// Returns `true` if no elements are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn to_f32_vec(&self) -> Vec<f32> {
        fn conv<T: Element>(v: &[T]) -> Vec<f32> {
            v.iter().map(|x| x.into_f32()).collect()
        }
        match self {
            Self::F32(v) => v.clone(),
            Self::F16(v) => conv(v),
            Self::F64(v) => conv(v),
            Self::BF16(v) => conv(v),
            Self::I32(v) => conv(v),
            Self::U8(v) => conv(v),
        }
    }

    fn from_f32_slice(dtype: ElementType, values: &[f32]) -> Self {
        fn conv<T: Element>(v: &[f32]) -> TensorData {
            T::wrap(v.iter().map(|&x| T::from_f32(x)).collect())
        }
        match dtype {
            ElementType::F32 => Self::F32(values.to_vec()),
            ElementType::F16 => conv::<f16>(values),
            ElementType::F64 => conv::<f64>(values),
            ElementType::BF16 => conv::<bf16>(values),
            ElementType::I32 => conv::<i32>(values),
            ElementType::U8 => conv::<u8>(values),
        }
    }
}

/// An N-dimensional tensor with a shape and flat row-major data.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    /// Dimensions, outermost first.
    pub shape: Vec<usize>,
    /// Flat row-major storage.
    pub data: TensorData,
}

impl Tensor {
    /// Creates a new tensor with the given shape and storage.
    ///
    /// # Panics
    /// Panics if the number of elements in `data` does not match the shape product.
    pub fn new(shape: impl Into<Vec<usize>>, data: TensorData) -> Self {
        let shape = shape.into();
        assert_eq!(
            shape.iter().product::<usize>(),
            data.len(),
            "shape {:?} is incompatible with {} data elements",
            shape,
            data.len()
        );
        Self { shape, data }
    }

    /// Creates a tensor from a typed buffer.
    ///
    /// # Panics
    /// Panics if the number of elements in `values` does not match the shape product.
    pub fn from_vec<T: Element>(shape: impl Into<Vec<usize>>, values: Vec<T>) -> Self {
        Self::new(shape, T::wrap(values))
    }

    /// A zero-filled tensor of the given type.
    pub fn zeros(shape: impl Into<Vec<usize>>, dtype: ElementType) -> Self {
        let shape = shape.into();
        let n = shape.iter().product::<usize>();
        Self {
            data: TensorData::from_f32_slice(dtype, &vec![0.0; n]),
            shape,
        }
    }

    /// The runtime element type.
    #[must_use]
    pub const fn dtype(&self) -> ElementType {
        self.data.dtype()
    }

    /// Number of elements.
    #[must_use]
    pub fn numel(&self) -> usize {
        self.data.len()
    }

    /// Borrows the elements as `T`, or `None` if the tensor holds another type.
    #[must_use]
    pub fn as_slice<T: Element>(&self) -> Option<&[T]> {
        T::slice(&self.data)
    }

    /// Converts every element to `f32`.
    #[must_use]
    pub fn to_f32_vec(&self) -> Vec<f32> {
        self.data.to_f32_vec()
    }

    /// Returns a copy converted to `dtype` (through `f32`).
    #[must_use]
    pub fn cast(&self, dtype: ElementType) -> Self {
        if dtype == self.dtype() {
            return self.clone();
        }
        Self {
            shape: self.shape.clone(),
            data: TensorData::from_f32_slice(dtype, &self.to_f32_vec()),
        }
    }
}

/// Named tensors shared between operators.
///
/// Operators look their inputs up by name and store outputs under the names
/// given in their definition.
#[derive(Debug, Default, Clone)]
pub struct Workspace {
    blobs: HashMap<String, Tensor>,
}

impl Workspace {
    /// An empty workspace.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `tensor` under `name`, returning the previous value if any.
    pub fn insert(&mut self, name: impl Into<String>, tensor: Tensor) -> Option<Tensor> {
        self.blobs.insert(name.into(), tensor)
    }

    /// Looks up a blob.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Tensor> {
        self.blobs.get(name)
    }

    /// Removes and returns a blob.
    pub fn remove(&mut self, name: &str) -> Option<Tensor> {
        self.blobs.remove(name)
    }

    /// Returns `true` if a blob with this name exists.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.blobs.contains_key(name)
    }
}

/// Defines an `f32` tensor from nested literal arrays.
///
/// Supports arbitrary dimensionality as long as sublists are uniform in shape.
///
/// # Example
/// ```
/// use fc_dispatch::tensor;
/// let t = tensor!([[1.0, 2.0], [3.0, 4.0]]);
/// assert_eq!(t.shape, vec![2, 2]);
/// ```
#[macro_export]
macro_rules! tensor {
    ($lit:literal) => {
        $crate::tensors::Tensor::from_vec(Vec::<usize>::new(), vec![$lit as f32])
    };

    ([ $( $inner:tt ),+ $(,)? ]) => {{
        let children = vec![ $( $crate::tensor!($inner) ),+ ];
        let first_shape = children[0].shape.clone();
        assert!(children.iter().all(|c| c.shape == first_shape),
            "ragged tensor literal (rows have mismatched shapes)");
        let mut shape = vec![children.len()];
        shape.extend_from_slice(&first_shape);
        let mut data: Vec<f32> = Vec::new();
        for c in &children { data.extend(c.to_f32_vec()); }
        $crate::tensors::Tensor::from_vec(shape, data)
    }};
}
