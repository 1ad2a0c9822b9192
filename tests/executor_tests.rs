use fc_dispatch::device::{DeviceId, FixedCapability};
use fc_dispatch::dtype::ElementType;
use fc_dispatch::engine::Engine;
use fc_dispatch::ops::cpu::CpuExecutor;
use fc_dispatch::ops::dispatch::{Dispatcher, ForwardState, GradientState, TypedExecutor};
use fc_dispatch::plan::{ForwardPlan, GradientPlan, WeightLayout};
use fc_dispatch::tensors::Tensor;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const TOL: f64 = 1e-4;

fn random(rng: &mut StdRng, shape: Vec<usize>) -> Tensor {
    let len = shape.iter().product();
    let data: Vec<f32> = (0..len).map(|_| rng.random_range(-1.0..1.0)).collect();
    Tensor::from_vec(shape, data)
}

fn transpose(t: &Tensor) -> Tensor {
    let (r, c) = (t.shape[0], t.shape[1]);
    let v = t.to_f32_vec();
    let mut out = vec![0.0f32; r * c];
    for i in 0..r {
        for j in 0..c {
            out[j * r + i] = v[i * c + j];
        }
    }
    Tensor::from_vec(vec![c, r], out)
}

fn assert_close(got: &[f32], want: &[f64]) {
    assert_eq!(got.len(), want.len());
    for (i, (&g, &w)) in got.iter().zip(want).enumerate() {
        assert!((f64::from(g) - w).abs() < TOL, "index {i}: {g} vs {w}");
    }
}

/// `Y = X·Wᵀ + B` in f64, W natural (`N×K`).
fn reference_forward(x: &Tensor, w: &Tensor, b: &Tensor) -> Vec<f64> {
    let (m, k, n) = (x.shape[0], x.numel() / x.shape[0], w.shape[0]);
    let (x, w, b) = (x.to_f32_vec(), w.to_f32_vec(), b.to_f32_vec());
    let mut y = vec![0.0f64; m * n];
    for i in 0..m {
        for j in 0..n {
            let mut acc = f64::from(b[j]);
            for p in 0..k {
                acc += f64::from(x[i * k + p]) * f64::from(w[j * k + p]);
            }
            y[i * n + j] = acc;
        }
    }
    y
}

#[test]
fn test_float_forward_matches_reference() {
    let mut rng = StdRng::seed_from_u64(7);
    let (x, w, b) = (
        random(&mut rng, vec![17, 33]),
        random(&mut rng, vec![9, 33]),
        random(&mut rng, vec![9]),
    );
    let mut state = ForwardState::new(&x, &w, &b);
    let plan = ForwardPlan::uniform(ElementType::F32, ElementType::F32);
    assert!(CpuExecutor.forward(plan, WeightLayout::Natural, &mut state));

    let y = state.y.unwrap();
    assert_eq!(y.shape, vec![17, 9]);
    assert_close(&y.to_f32_vec(), &reference_forward(&x, &w, &b));
}

#[test]
fn test_natural_and_transposed_weights_agree() {
    let mut rng = StdRng::seed_from_u64(11);
    let (x, w, b) = (
        random(&mut rng, vec![5, 12]),
        random(&mut rng, vec![7, 12]),
        random(&mut rng, vec![7]),
    );
    let wt = transpose(&w);
    let plan = ForwardPlan::uniform(ElementType::F32, ElementType::F32);

    let mut natural = ForwardState::new(&x, &w, &b);
    let mut transposed = ForwardState::new(&x, &wt, &b);
    assert!(CpuExecutor.forward(plan, WeightLayout::Natural, &mut natural));
    assert!(CpuExecutor.forward(plan, WeightLayout::PreTransposed, &mut transposed));
    assert_eq!(natural.y, transposed.y);
}

#[test]
fn test_half_storage_loses_less_with_float_accumulation() {
    const K: usize = 4096;
    let x = Tensor::from_vec(vec![1, K], vec![1.0f32; K]).cast(ElementType::F16);
    let w = Tensor::from_vec(vec![1, K], vec![1.0f32; K]).cast(ElementType::F16);
    let b = Tensor::zeros(vec![1], ElementType::F16);

    let run = |math| {
        let mut state = ForwardState::new(&x, &w, &b);
        let plan = ForwardPlan::uniform(ElementType::F16, math);
        assert!(CpuExecutor.forward(plan, WeightLayout::Natural, &mut state));
        state.y.unwrap().to_f32_vec()
    };

    // every f16 partial sum past 2048 rounds back down
    assert_eq!(run(ElementType::F32), vec![4096.0]);
    assert_eq!(run(ElementType::F16), vec![2048.0]);
}

#[test]
fn test_dispatcher_picks_the_accumulator_the_executor_uses() {
    const K: usize = 4096;
    let x = Tensor::from_vec(vec![1, K], vec![1.0f32; K]).cast(ElementType::F16);
    let w = Tensor::from_vec(vec![1, K], vec![1.0f32; K]).cast(ElementType::F16);
    let b = Tensor::zeros(vec![1], ElementType::F16);
    let fc = Dispatcher::new(Engine::Default, WeightLayout::Natural, true, DeviceId(0));

    let run = |level| {
        let mut state = ForwardState::new(&x, &w, &b);
        assert!(fc
            .run_forward(&FixedCapability(level), &mut CpuExecutor, &mut state)
            .unwrap());
        state.y.unwrap().to_f32_vec()
    };

    assert_eq!(run(7), vec![2048.0]);
    assert_eq!(run(5), vec![4096.0]);
}

#[test]
fn test_float_gradient_matches_reference() {
    let mut rng = StdRng::seed_from_u64(23);
    let (m, k, n) = (6, 10, 4);
    let x = random(&mut rng, vec![m, k]);
    let w = random(&mut rng, vec![n, k]);
    let dy = random(&mut rng, vec![m, n]);
    let mut state = GradientState::new(&x, &w, &dy, true);
    let plan = GradientPlan::uniform(ElementType::F32, ElementType::F32);
    assert!(CpuExecutor.gradient(plan, WeightLayout::Natural, &mut state));

    let (xv, wv, dyv) = (x.to_f32_vec(), w.to_f32_vec(), dy.to_f32_vec());
    let mut dw = vec![0.0f64; n * k];
    let mut db = vec![0.0f64; n];
    let mut dx = vec![0.0f64; m * k];
    for i in 0..m {
        for j in 0..n {
            let g = f64::from(dyv[i * n + j]);
            db[j] += g;
            for p in 0..k {
                dw[j * k + p] += g * f64::from(xv[i * k + p]);
                dx[i * k + p] += g * f64::from(wv[j * k + p]);
            }
        }
    }

    assert_eq!(state.dw.as_ref().unwrap().shape, vec![n, k]);
    assert_eq!(state.dx.as_ref().unwrap().shape, vec![m, k]);
    assert_close(&state.dw.unwrap().to_f32_vec(), &dw);
    assert_close(&state.db.unwrap().to_f32_vec(), &db);
    assert_close(&state.dx.unwrap().to_f32_vec(), &dx);
}

#[test]
fn test_transposed_gradient_keeps_the_weight_layout() {
    let mut rng = StdRng::seed_from_u64(29);
    let x = random(&mut rng, vec![3, 5]);
    let w = random(&mut rng, vec![4, 5]);
    let wt = transpose(&w);
    let dy = random(&mut rng, vec![3, 4]);
    let plan = GradientPlan::uniform(ElementType::F32, ElementType::F32);

    let mut natural = GradientState::new(&x, &w, &dy, true);
    let mut transposed = GradientState::new(&x, &wt, &dy, true);
    assert!(CpuExecutor.gradient(plan, WeightLayout::Natural, &mut natural));
    assert!(CpuExecutor.gradient(plan, WeightLayout::PreTransposed, &mut transposed));

    let dwt = transposed.dw.unwrap();
    assert_eq!(dwt.shape, vec![5, 4]);
    assert_eq!(transpose(&natural.dw.unwrap()), dwt);
    assert_eq!(natural.db, transposed.db);
    assert_eq!(natural.dx, transposed.dx);
}

#[test]
fn test_gradient_without_input_grad_skips_dx() {
    let mut rng = StdRng::seed_from_u64(31);
    let x = random(&mut rng, vec![2, 3]);
    let w = random(&mut rng, vec![2, 3]);
    let dy = random(&mut rng, vec![2, 2]);
    let mut state = GradientState::new(&x, &w, &dy, false);
    let plan = GradientPlan::uniform(ElementType::F32, ElementType::F32);
    assert!(CpuExecutor.gradient(plan, WeightLayout::Natural, &mut state));
    assert!(state.dw.is_some() && state.db.is_some());
    assert!(state.dx.is_none());
}

#[test]
fn test_higher_rank_input_is_flattened() {
    let mut rng = StdRng::seed_from_u64(37);
    let x3 = random(&mut rng, vec![4, 2, 3]);
    let x2 = Tensor::from_vec(vec![4, 6], x3.to_f32_vec());
    let w = random(&mut rng, vec![5, 6]);
    let b = random(&mut rng, vec![5]);
    let plan = ForwardPlan::uniform(ElementType::F32, ElementType::F32);

    let mut flat = ForwardState::new(&x2, &w, &b);
    let mut nested = ForwardState::new(&x3, &w, &b);
    assert!(CpuExecutor.forward(plan, WeightLayout::Natural, &mut flat));
    assert!(CpuExecutor.forward(plan, WeightLayout::Natural, &mut nested));
    assert_eq!(flat.y, nested.y);
}

#[test]
fn test_bias_length_mismatch_fails() {
    let mut rng = StdRng::seed_from_u64(41);
    let x = random(&mut rng, vec![2, 3]);
    let w = random(&mut rng, vec![4, 3]);
    let b = random(&mut rng, vec![3]);
    let mut state = ForwardState::new(&x, &w, &b);
    let plan = ForwardPlan::uniform(ElementType::F32, ElementType::F32);
    assert!(!CpuExecutor.forward(plan, WeightLayout::Natural, &mut state));
    assert!(state.y.is_none());
}

#[test]
fn test_oversized_output_is_rejected_without_panicking() {
    // K = 0 keeps both operands empty while M×N overflows.
    let huge = usize::MAX / 2;
    let x = Tensor::zeros(vec![huge, 0], ElementType::F32);
    let w = Tensor::zeros(vec![huge, 0], ElementType::F32);
    let b = Tensor::zeros(vec![0], ElementType::F32);
    let dy = Tensor::zeros(vec![0], ElementType::F32);
    let fc = Dispatcher::new(Engine::Default, WeightLayout::Natural, false, DeviceId(0));

    let mut fwd = ForwardState::new(&x, &w, &b);
    assert_eq!(
        fc.run_forward(&FixedCapability(7), &mut CpuExecutor, &mut fwd),
        Ok(false)
    );
    assert!(fwd.y.is_none());

    let mut grad = GradientState::new(&x, &w, &dy, true);
    assert_eq!(
        fc.run_gradient(&FixedCapability(7), &mut CpuExecutor, &mut grad),
        Ok(false)
    );
    assert!(grad.dw.is_none() && grad.db.is_none() && grad.dx.is_none());
}
