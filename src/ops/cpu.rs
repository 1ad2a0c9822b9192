//! Parallel CPU reference executor
//!
//! # CPU Backend
//!
//! [`CpuExecutor`] implements [`TypedExecutor`] for every plan the dispatcher
//! can emit:
//!
//! | storage   | math      |
//! |-----------|-----------|
//! | `float`   | `float`   |
//! | `float16` | `float`   |
//! | `float16` | `float16` |
//!
//! Operands are converted to the math type, products are summed in it, and
//! the result is rounded back to storage. With `float16` math every partial
//! sum is rounded, which is what makes that path cheaper and less accurate.
//!
//! ## Shapes
//!
//! - `X`: `M×K` (higher rank is flattened to `shape[0] × rest`)
//! - `W`: `N×K` for [`WeightLayout::Natural`], `K×N` for
//!   [`WeightLayout::PreTransposed`]
//! - `B`: `N` elements
//! - `dY`: `M×N`
//!
//! Any plan, dtype or shape mismatch makes the call return `false`.
//!
//! ## Features
//!
//! - Parallel execution over output rows using [`rayon`](https://docs.rs/rayon)

use half::f16;
use log::warn;
use rayon::prelude::*;

use crate::dtype::{ElementType, Scalar};
use crate::ops::dispatch::{ForwardState, GradientState, TypedExecutor};
use crate::plan::{ForwardPlan, GradientPlan, WeightLayout};
use crate::tensors::Tensor;

/// Resolved problem size of one FC call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Dims {
    m: usize,
    k: usize,
    n: usize,
}

impl Dims {
    fn resolve(x: &Tensor, w: &Tensor, layout: WeightLayout) -> Option<Self> {
        let (&m, rest) = x.shape.split_first()?;
        let k = rest.iter().product::<usize>();
        let [r, c] = w.shape[..] else {
            return None;
        };
        let (n, kw) = match layout {
            WeightLayout::Natural => (r, c),
            WeightLayout::PreTransposed => (c, r),
        };
        (k == kw).then_some(Self { m, k, n })
    }

    /// Whether the `M×N`, `N×K` and `M×K` buffers of `dtype` can be allocated.
    fn buffers_fit(self, dtype: ElementType) -> bool {
        [(self.m, self.n), (self.n, self.k), (self.m, self.k)]
            .into_iter()
            .all(|(rows, cols)| {
                rows.checked_mul(cols)
                    .and_then(|len| len.checked_mul(dtype.size_in_bytes()))
                    .is_some_and(|bytes| bytes <= isize::MAX.unsigned_abs())
            })
    }

    /// Index of `W(j, p)` in the flat weight buffer.
    const fn w_at(self, layout: WeightLayout, j: usize, p: usize) -> usize {
        match layout {
            WeightLayout::Natural => j * self.k + p,
            WeightLayout::PreTransposed => p * self.n + j,
        }
    }
}

#[inline]
fn cast<S: Scalar, A: Scalar>(v: S) -> A {
    A::from_f32(v.into_f32())
}

/// Fills `out` row by row in parallel; a zero `width` leaves it untouched.
fn fill_rows<T, F>(out: &mut [T], width: usize, f: F)
where
    T: Send,
    F: Fn(usize, &mut [T]) + Send + Sync,
{
    if width == 0 {
        return;
    }
    out.par_chunks_mut(width)
        .enumerate()
        .for_each(|(r, row)| f(r, row));
}

/// `Y = X·W(ᵀ) + B`, accumulated in `A`.
fn fc_forward<S: Scalar, A: Scalar>(
    x: &[S],
    w: &[S],
    b: &[S],
    d: Dims,
    layout: WeightLayout,
) -> Vec<S> {
    let mut y = vec![S::ZERO; d.m * d.n];
    fill_rows(&mut y, d.n, |i, row| {
        let xi = &x[i * d.k..(i + 1) * d.k];
        for (j, out) in row.iter_mut().enumerate() {
            let mut acc = A::ZERO;
            for (p, &xv) in xi.iter().enumerate() {
                acc = acc.mul_acc(cast(xv), cast(w[d.w_at(layout, j, p)]));
            }
            *out = cast(acc.acc(cast(b[j])));
        }
    });
    y
}

/// Returns `(dW, dB, dX)` accumulated in `A`.
fn fc_gradient<S: Scalar, A: Scalar>(
    x: &[S],
    w: &[S],
    dy: &[S],
    d: Dims,
    layout: WeightLayout,
    want_dx: bool,
) -> (Vec<S>, Vec<S>, Option<Vec<S>>) {
    // dW(j, p) = Σ_i dY(i, j) · X(i, p)
    let dw_entry = |j: usize, p: usize| -> S {
        let mut acc = A::ZERO;
        for i in 0..d.m {
            acc = acc.mul_acc(cast(dy[i * d.n + j]), cast(x[i * d.k + p]));
        }
        cast(acc)
    };
    let mut dw = vec![S::ZERO; d.n * d.k];
    match layout {
        WeightLayout::Natural => fill_rows(&mut dw, d.k, |j, row| {
            for (p, out) in row.iter_mut().enumerate() {
                *out = dw_entry(j, p);
            }
        }),
        WeightLayout::PreTransposed => fill_rows(&mut dw, d.n, |p, row| {
            for (j, out) in row.iter_mut().enumerate() {
                *out = dw_entry(j, p);
            }
        }),
    }

    let db: Vec<S> = (0..d.n)
        .into_par_iter()
        .map(|j| {
            let mut acc = A::ZERO;
            for i in 0..d.m {
                acc = acc.acc(cast(dy[i * d.n + j]));
            }
            cast(acc)
        })
        .collect();

    let dx = want_dx.then(|| {
        // dX(i, p) = Σ_j dY(i, j) · W(j, p)
        let mut dx = vec![S::ZERO; d.m * d.k];
        fill_rows(&mut dx, d.k, |i, row| {
            for (p, out) in row.iter_mut().enumerate() {
                let mut acc = A::ZERO;
                for j in 0..d.n {
                    acc = acc.mul_acc(cast(dy[i * d.n + j]), cast(w[d.w_at(layout, j, p)]));
                }
                *out = cast(acc);
            }
        });
        dx
    });

    (dw, db, dx)
}

/// Multi-threaded reference implementation of the FC kernels.
#[derive(Debug, Default, Clone, Copy)]
pub struct CpuExecutor;

impl CpuExecutor {
    fn forward_typed<S: Scalar, A: Scalar>(
        layout: WeightLayout,
        state: &mut ForwardState<'_>,
    ) -> bool {
        let Some(d) = Dims::resolve(state.x, state.w, layout) else {
            warn!(
                "FC forward: incompatible shapes X {:?}, W {:?} ({layout:?})",
                state.x.shape, state.w.shape
            );
            return false;
        };
        if !d.buffers_fit(S::DTYPE) {
            warn!("FC forward: {}x{} output does not fit in memory", d.m, d.n);
            return false;
        }
        if state.b.numel() != d.n {
            warn!("FC forward: bias has {} elements, expected {}", state.b.numel(), d.n);
            return false;
        }
        let (Some(x), Some(w), Some(b)) = (
            state.x.as_slice::<S>(),
            state.w.as_slice::<S>(),
            state.b.as_slice::<S>(),
        ) else {
            warn!(
                "FC forward: operands {}, {}, {} do not match {} storage",
                state.x.dtype(),
                state.w.dtype(),
                state.b.dtype(),
                S::DTYPE
            );
            return false;
        };
        let y = fc_forward::<S, A>(x, w, b, d, layout);
        state.y = Some(Tensor::from_vec(vec![d.m, d.n], y));
        true
    }

    fn gradient_typed<S: Scalar, A: Scalar>(
        layout: WeightLayout,
        state: &mut GradientState<'_>,
    ) -> bool {
        let Some(d) = Dims::resolve(state.x, state.w, layout) else {
            warn!(
                "FC gradient: incompatible shapes X {:?}, W {:?} ({layout:?})",
                state.x.shape, state.w.shape
            );
            return false;
        };
        if !d.buffers_fit(S::DTYPE) {
            warn!(
                "FC gradient: buffers for M={} N={} K={} do not fit in memory",
                d.m, d.n, d.k
            );
            return false;
        }
        if state.dy.numel() != d.m * d.n {
            warn!(
                "FC gradient: dY has {} elements, expected {}x{}",
                state.dy.numel(),
                d.m,
                d.n
            );
            return false;
        }
        let (Some(x), Some(w), Some(dy)) = (
            state.x.as_slice::<S>(),
            state.w.as_slice::<S>(),
            state.dy.as_slice::<S>(),
        ) else {
            warn!(
                "FC gradient: operands {}, {}, {} do not match {} storage",
                state.x.dtype(),
                state.w.dtype(),
                state.dy.dtype(),
                S::DTYPE
            );
            return false;
        };
        let (dw, db, dx) = fc_gradient::<S, A>(x, w, dy, d, layout, state.want_dx);
        state.dw = Some(Tensor::from_vec(state.w.shape.clone(), dw));
        state.db = Some(Tensor::from_vec(vec![d.n], db));
        state.dx = dx.map(|dx| Tensor::from_vec(state.x.shape.clone(), dx));
        true
    }
}

impl TypedExecutor for CpuExecutor {
    fn forward(
        &mut self,
        plan: ForwardPlan,
        layout: WeightLayout,
        state: &mut ForwardState<'_>,
    ) -> bool {
        if plan.storage_slots().iter().any(|&t| t != plan.x) {
            warn!("FC forward: mixed storage plan {plan:?} is not implemented");
            return false;
        }
        match (plan.x, plan.math) {
            (ElementType::F32, ElementType::F32) => Self::forward_typed::<f32, f32>(layout, state),
            (ElementType::F16, ElementType::F32) => Self::forward_typed::<f16, f32>(layout, state),
            (ElementType::F16, ElementType::F16) => Self::forward_typed::<f16, f16>(layout, state),
            _ => {
                warn!("FC forward: no CPU kernel for {plan:?}");
                false
            }
        }
    }

    fn gradient(
        &mut self,
        plan: GradientPlan,
        layout: WeightLayout,
        state: &mut GradientState<'_>,
    ) -> bool {
        if plan.storage_slots().iter().any(|&t| t != plan.x) {
            warn!("FC gradient: mixed storage plan {plan:?} is not implemented");
            return false;
        }
        match (plan.x, plan.math) {
            (ElementType::F32, ElementType::F32) => Self::gradient_typed::<f32, f32>(layout, state),
            (ElementType::F16, ElementType::F32) => Self::gradient_typed::<f16, f32>(layout, state),
            (ElementType::F16, ElementType::F16) => Self::gradient_typed::<f16, f16>(layout, state),
            _ => {
                warn!("FC gradient: no CPU kernel for {plan:?}");
                false
            }
        }
    }
}
