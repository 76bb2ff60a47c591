//! End-to-end dispatch tests against the CPU reference backend.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use ufunc_core::{
    Array, AssignSource, Backend, BufferId, CpuRefBackend, DType, DispatchKey, EntryKey,
    EntryPoint, HostBuffer, OpCode, Operand, Result, Scalar, ScalarPosition, Shape, UfuncError,
};
use ufunc_ops::{BroadcastPolicy, Config, Context, assign, ufunc, ufuncs};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn cpu() -> Context {
    init_tracing();
    Context::with_config(Arc::new(CpuRefBackend::new()), Config::default()).unwrap()
}

fn shape(dims: &[i64]) -> Shape {
    Shape::new(dims.to_vec())
}

// ── Instrumented backend ─────────────────────────────────────────────────

/// Wraps the reference backend, records every ufunc dispatch and can hide
/// one entry point.
struct Probe {
    inner: CpuRefBackend,
    hidden: Option<EntryKey>,
    keys: Mutex<HashMap<EntryPoint, EntryKey>>,
    dispatched: Mutex<Vec<EntryKey>>,
}

impl Probe {
    fn new(hidden: Option<EntryKey>) -> Self {
        Self {
            inner: CpuRefBackend::new(),
            hidden,
            keys: Mutex::new(HashMap::new()),
            dispatched: Mutex::new(Vec::new()),
        }
    }

    fn dispatched(&self) -> Vec<EntryKey> {
        self.dispatched.lock().clone()
    }
}

impl Backend for Probe {
    fn name(&self) -> &'static str {
        "probe"
    }

    fn resolve(&self, key: &EntryKey) -> Option<EntryPoint> {
        if self.hidden == Some(*key) {
            return None;
        }
        let entry = self.inner.resolve(key)?;
        self.keys.lock().insert(entry, *key);
        Some(entry)
    }

    fn alloc(&self, shape: &Shape, dtype: DType) -> Result<BufferId> {
        self.inner.alloc(shape, dtype)
    }

    fn upload(&self, shape: &Shape, data: HostBuffer) -> Result<BufferId> {
        self.inner.upload(shape, data)
    }

    fn download(&self, id: BufferId) -> Result<HostBuffer> {
        self.inner.download(id)
    }

    fn free(&self, id: BufferId) {
        self.inner.free(id)
    }

    fn call_ufunc(
        &self,
        entry: EntryPoint,
        inputs: &[BufferId],
        scalar: Option<Scalar>,
    ) -> Result<BufferId> {
        if let Some(key) = self.keys.lock().get(&entry) {
            self.dispatched.lock().push(*key);
        }
        self.inner.call_ufunc(entry, inputs, scalar)
    }

    fn call_convert(&self, entry: EntryPoint, src: BufferId) -> Result<BufferId> {
        self.inner.call_convert(entry, src)
    }

    fn call_assign(&self, entry: EntryPoint, dst: BufferId, src: AssignSource) -> Result<()> {
        self.inner.call_assign(entry, dst, src)
    }
}

fn probe_context(hidden: Option<EntryKey>) -> (Arc<Probe>, Result<Context>) {
    init_tracing();
    let probe = Arc::new(Probe::new(hidden));
    let ctx = Context::with_config(probe.clone(), Config::default());
    (probe, ctx)
}

fn ufunc_key(op: OpCode, dtype: DType, scalar: Option<ScalarPosition>) -> EntryKey {
    EntryKey::Ufunc(DispatchKey::new(op, dtype, scalar))
}

// ── Host reference ───────────────────────────────────────────────────────

/// Expected result of `op` on operands 2 and 3 (false and true for bool).
fn reference(op: OpCode, dtype: DType) -> Scalar {
    let (x, y) = if dtype == DType::Bool {
        (0.0f64, 1.0f64)
    } else {
        (2.0f64, 3.0f64)
    };
    let (xi, yi) = (x as i64, y as i64);
    let num = |v: f64| {
        if dtype.is_float() {
            Scalar::Float(v)
        } else {
            Scalar::Int(v as i64)
        }
    };
    let truth = Scalar::Bool;
    match op {
        OpCode::Add => num(x + y),
        OpCode::Subtract => num(x - y),
        OpCode::Multiply => num(x * y),
        OpCode::Divide => num(x / y),
        OpCode::FloorDivide => num((x / y).floor()),
        OpCode::Power => num(x.powf(y)),
        OpCode::Maximum => num(x.max(y)),
        OpCode::Minimum => num(x.min(y)),
        OpCode::Arctan2 => num(x.atan2(y)),
        OpCode::Equal => truth(x == y),
        OpCode::NotEqual => truth(x != y),
        OpCode::Greater => truth(x > y),
        OpCode::GreaterEqual => truth(x >= y),
        OpCode::Less => truth(x < y),
        OpCode::LessEqual => truth(x <= y),
        OpCode::LogicalAnd => truth(x != 0.0 && y != 0.0),
        OpCode::LogicalOr => truth(x != 0.0 || y != 0.0),
        OpCode::LogicalXor => truth((x != 0.0) != (y != 0.0)),
        OpCode::BitwiseAnd => Scalar::Int(xi & yi),
        OpCode::BitwiseOr => Scalar::Int(xi | yi),
        OpCode::BitwiseXor => Scalar::Int(xi ^ yi),
        OpCode::Negative => num(-x),
        OpCode::Absolute => num(x.abs()),
        OpCode::Sqrt => num(x.sqrt()),
        OpCode::Exp => num(x.exp()),
        OpCode::Log => num(x.ln()),
        OpCode::Sin => num(x.sin()),
        OpCode::Cos => num(x.cos()),
        OpCode::Floor => num(x.floor()),
        OpCode::Ceil => num(x.ceil()),
        OpCode::IsNan => truth(x.is_nan()),
        OpCode::LogicalNot => truth(x == 0.0),
        OpCode::Invert if dtype == DType::Bool => truth(x == 0.0),
        OpCode::Invert => Scalar::Int(!xi),
    }
}

/// Assert every element of `array` equals `expected` cast to its dtype.
fn assert_filled(array: &Array, expected: Scalar, what: &str) {
    let host = array.to_host().unwrap();
    let want = HostBuffer::filled(array.dtype(), host.len(), expected);
    for i in 0..host.len() {
        match (host.get(i).unwrap(), want.get(i).unwrap()) {
            (Scalar::Float(g), Scalar::Float(w)) => {
                assert!((g - w).abs() <= 1e-6 * w.abs().max(1.0), "{what}: {g} != {w}");
            }
            (g, w) => assert_eq!(g, w, "{what}"),
        }
    }
}

// ── Every ufunc, every signature ─────────────────────────────────────────

#[test]
fn every_signature_matches_host_reference() {
    let ctx = cpu();
    let s = shape(&[4, 4]);
    for func in ufuncs() {
        for sig in func.signatures() {
            let what = format!("{}[{}]", func.name(), sig);
            let (x, y) = if sig.input == DType::Bool {
                (Scalar::Bool(false), Scalar::Bool(true))
            } else {
                (Scalar::Int(2), Scalar::Int(3))
            };
            let a = ctx.full(&s, sig.input, x).unwrap();
            let b = ctx.full(&s, sig.input, y).unwrap();
            let args: Vec<Operand<'_>> = if func.nin() == 1 {
                vec![(&a).into()]
            } else {
                vec![(&a).into(), (&b).into()]
            };
            let out = func.call(&ctx, &args).unwrap();
            assert_eq!(out.dtype(), sig.output, "{what}");
            assert_eq!(out.shape(), &s, "{what}");
            assert_filled(&out, reference(func.descriptor().op, sig.input), &what);
        }
    }
}

#[test]
fn every_binary_signature_matches_with_scalar_operand() {
    let (probe, ctx) = probe_context(None);
    let ctx = ctx.unwrap();
    let s = shape(&[4, 4]);
    for func in ufuncs().filter(|f| f.nin() == 2) {
        let op = func.descriptor().op;
        for sig in func.signatures().iter().filter(|sig| sig.input != DType::Bool) {
            let a = ctx.full(&s, sig.input, 2i64).unwrap();
            let b = ctx.full(&s, sig.input, 3i64).unwrap();

            let rhs = func.call(&ctx, &[(&a).into(), 3i64.into()]).unwrap();
            assert_filled(&rhs, reference(op, sig.input), &format!("{} rhs", func.name()));
            let lhs = func.call(&ctx, &[2i64.into(), (&b).into()]).unwrap();
            assert_filled(&lhs, reference(op, sig.input), &format!("{} lhs", func.name()));

            let recorded = probe.dispatched();
            assert_eq!(
                &recorded[recorded.len() - 2..],
                &[
                    ufunc_key(op, sig.input, Some(ScalarPosition::Rhs)),
                    ufunc_key(op, sig.input, Some(ScalarPosition::Lhs)),
                ]
            );
        }
    }
}

// ── Call scenarios ───────────────────────────────────────────────────────

#[test]
fn add_promotes_array_types() {
    let ctx = cpu();
    let a = ctx.full(&shape(&[4, 4]), DType::I8, 2i64).unwrap();
    let b = ctx.full(&shape(&[4, 4]), DType::I16, 3i64).unwrap();
    let out = ufunc("add").unwrap().call(&ctx, &[(&a).into(), (&b).into()]).unwrap();
    assert_eq!(out.dtype(), DType::I16);
    assert_eq!(out.to_vec::<i16>().unwrap(), vec![5; 16]);
}

#[test]
fn add_int_array_and_scalar_uses_scalar_rhs_entry() {
    let (probe, ctx) = probe_context(None);
    let ctx = ctx.unwrap();
    let a = ctx.full(&shape(&[4, 4]), DType::I32, 2i64).unwrap();
    let out = ufunc("add").unwrap().call(&ctx, &[(&a).into(), 3i32.into()]).unwrap();
    assert_eq!(out.dtype(), DType::I32);
    assert_eq!(out.to_vec::<i32>().unwrap(), vec![5; 16]);
    assert_eq!(
        probe.dispatched(),
        vec![ufunc_key(OpCode::Add, DType::I32, Some(ScalarPosition::Rhs))]
    );
}

#[test]
fn scalar_position_matters_for_subtract() {
    let ctx = cpu();
    let a = ctx.from_vec(vec![1.0f64, 2.0], &shape(&[2])).unwrap();
    let sub = ufunc("subtract").unwrap();
    let left = sub.call(&ctx, &[10.0f64.into(), (&a).into()]).unwrap();
    let right = sub.call(&ctx, &[(&a).into(), 10.0f64.into()]).unwrap();
    assert_eq!(left.to_vec::<f64>().unwrap(), vec![9.0, 8.0]);
    assert_eq!(right.to_vec::<f64>().unwrap(), vec![-9.0, -8.0]);
}

#[test]
fn two_scalars_rejected_before_backend() {
    let (probe, ctx) = probe_context(None);
    let ctx = ctx.unwrap();
    let err = ufunc("add").unwrap().call(&ctx, &[2i64.into(), 3i64.into()]).unwrap_err();
    assert!(matches!(err, UfuncError::MultipleScalarOperands { op: "add" }));
    assert!(probe.dispatched().is_empty());
    assert_eq!(probe.inner.live_buffers(), 0);
}

#[test]
fn incompatible_shapes_rejected_before_backend() {
    let (probe, ctx) = probe_context(None);
    let ctx = ctx.unwrap();
    let a = ctx.full(&shape(&[4, 4]), DType::F32, 1.0f64).unwrap();
    let b = ctx.full(&shape(&[3, 3]), DType::F32, 1.0f64).unwrap();
    let err = ufunc("add").unwrap().call(&ctx, &[(&a).into(), (&b).into()]).unwrap_err();
    assert_eq!(
        err.to_string(),
        "operands could not be broadcast together with shapes (4, 4) (3, 3)"
    );
    assert!(probe.dispatched().is_empty());
    assert_eq!(probe.inner.live_buffers(), 2);
}

#[test]
fn output_of_other_type_receives_converted_result() {
    let ctx = cpu();
    let a = ctx.full(&shape(&[2, 2]), DType::F64, 2.5f64).unwrap();
    let b = ctx.full(&shape(&[2, 2]), DType::F64, 1.0f64).unwrap();
    let out = ctx.full(&shape(&[2, 2]), DType::I32, 0i64).unwrap();
    let got = ufunc("add")
        .unwrap()
        .call(&ctx, &[(&a).into(), (&b).into(), (&out).into()])
        .unwrap();
    assert!(got.same_buffer(&out));
    assert_eq!(got.dtype(), DType::I32);
    assert_eq!(out.to_vec::<i32>().unwrap(), vec![3; 4]);
}

#[test]
fn comparison_into_float_output() {
    let ctx = cpu();
    let a = ctx.from_vec(vec![1i32, 5, 3], &shape(&[3])).unwrap();
    let out = ctx.empty(&shape(&[3]), DType::F32).unwrap();
    ufunc("greater")
        .unwrap()
        .call(&ctx, &[(&a).into(), 2i32.into(), (&out).into()])
        .unwrap();
    assert_eq!(out.to_vec::<f32>().unwrap(), vec![0.0, 1.0, 1.0]);
}

#[test]
fn broadcasting_inputs() {
    let ctx = cpu();
    let col = ctx.from_vec(vec![0i64, 10, 20, 30], &shape(&[4, 1])).unwrap();
    let row = ctx.from_vec(vec![1i64, 2, 3], &shape(&[3])).unwrap();
    let out = ufunc("add").unwrap().call(&ctx, &[(&col).into(), (&row).into()]).unwrap();
    assert_eq!(out.shape(), &shape(&[4, 3]));
    assert_eq!(
        out.to_vec::<i64>().unwrap(),
        vec![1, 2, 3, 11, 12, 13, 21, 22, 23, 31, 32, 33]
    );
}

#[test]
fn output_larger_than_inputs_is_filled_by_broadcast() {
    let ctx = cpu();
    let row = ctx.from_vec(vec![1u16, 2, 3], &shape(&[3])).unwrap();
    let out = ctx.empty(&shape(&[2, 3]), DType::U16).unwrap();
    ufunc("multiply")
        .unwrap()
        .call(&ctx, &[(&row).into(), 2u16.into(), (&out).into()])
        .unwrap();
    assert_eq!(out.to_vec::<u16>().unwrap(), vec![2, 4, 6, 2, 4, 6]);
}

#[test]
fn output_smaller_than_broadcast_rejected() {
    let ctx = cpu();
    let a = ctx.from_vec(vec![1i8; 6], &shape(&[2, 3])).unwrap();
    let out = ctx.empty(&shape(&[3]), DType::I8).unwrap();
    let err = ufunc("negative")
        .unwrap()
        .call(&ctx, &[(&a).into(), (&out).into()])
        .unwrap_err();
    assert!(matches!(err, UfuncError::ShapeMismatch { .. }));
}

#[test]
fn equal_shape_policy_restricts_broadcasting() {
    init_tracing();
    let config = Config::default().with_broadcast(BroadcastPolicy::EqualShapes);
    let ctx = Context::with_config(Arc::new(CpuRefBackend::new()), config).unwrap();
    let a = ctx.full(&shape(&[2, 3]), DType::F64, 1.0f64).unwrap();
    let row = ctx.full(&shape(&[3]), DType::F64, 1.0f64).unwrap();
    let add = ufunc("add").unwrap();
    assert!(matches!(
        add.call(&ctx, &[(&a).into(), (&row).into()]),
        Err(UfuncError::ShapeMismatch { .. })
    ));
    let same = add.call(&ctx, &[(&a).into(), (&a).into()]).unwrap();
    assert_eq!(same.to_vec::<f64>().unwrap(), vec![2.0; 6]);
    let scalar = add.call(&ctx, &[(&a).into(), 1.0f64.into()]).unwrap();
    assert_eq!(scalar.to_vec::<f64>().unwrap(), vec![2.0; 6]);
}

#[test]
fn unary_scalar_input_is_materialized() {
    let (probe, ctx) = probe_context(None);
    let ctx = ctx.unwrap();
    let out = ufunc("sqrt").unwrap().call(&ctx, &[4i64.into()]).unwrap();
    assert_eq!(out.shape(), &Shape::scalar());
    assert_eq!(out.dtype(), DType::F64);
    assert_eq!(out.to_vec::<f64>().unwrap(), vec![2.0]);
    assert_eq!(
        probe.dispatched(),
        vec![ufunc_key(OpCode::Sqrt, DType::F64, None)]
    );
    drop(out);
    assert_eq!(probe.inner.live_buffers(), 0);
}

#[test]
fn weak_scalars() {
    let ctx = cpu();
    let bytes = ctx.from_vec(vec![250u8, 1], &shape(&[2])).unwrap();
    let add = ufunc("add").unwrap();
    let wrapped = add.call(&ctx, &[(&bytes).into(), 10i64.into()]).unwrap();
    assert_eq!(wrapped.dtype(), DType::U8);
    assert_eq!(wrapped.to_vec::<u8>().unwrap(), vec![4, 11]);

    let halves = add.call(&ctx, &[(&bytes).into(), 0.5f64.into()]).unwrap();
    assert_eq!(halves.dtype(), DType::F64);
    assert_eq!(halves.to_vec::<f64>().unwrap(), vec![250.5, 1.5]);

    let floats = ctx.from_vec(vec![1.0f32], &shape(&[1])).unwrap();
    let kept = add.call(&ctx, &[0.5f64.into(), (&floats).into()]).unwrap();
    assert_eq!(kept.dtype(), DType::F32);
    assert_eq!(kept.to_vec::<f32>().unwrap(), vec![1.5]);
}

#[test]
fn weak_int_scalar_out_of_range_rejected() {
    let (probe, ctx) = probe_context(None);
    let ctx = ctx.unwrap();
    let bytes = ctx.from_vec(vec![1u8, 2], &shape(&[2])).unwrap();
    let out = ctx.from_vec(vec![false, false], &shape(&[2])).unwrap();

    let err = ufunc("greater")
        .unwrap()
        .call(&ctx, &[(&bytes).into(), 256i64.into(), (&out).into()])
        .unwrap_err();
    assert_eq!(err.to_string(), "scalar 256 is out of bounds for uint8");
    assert_eq!(out.to_vec::<bool>().unwrap(), vec![false, false]);

    let err = ufunc("add")
        .unwrap()
        .call(&ctx, &[(&bytes).into(), (-1i64).into()])
        .unwrap_err();
    assert!(matches!(
        err,
        UfuncError::ScalarOutOfBounds {
            value: Scalar::Int(-1),
            dtype: DType::U8
        }
    ));

    let longs = ctx.from_vec(vec![1i64], &shape(&[1])).unwrap();
    let err = ufunc("add")
        .unwrap()
        .call(&ctx, &[(&longs).into(), u64::MAX.into()])
        .unwrap_err();
    assert!(matches!(err, UfuncError::ScalarOutOfBounds { dtype: DType::I64, .. }));

    assert!(probe.dispatched().is_empty());
    assert_eq!(probe.inner.live_buffers(), 3);

    let edge = ufunc("greater")
        .unwrap()
        .call(&ctx, &[(&bytes).into(), 255i64.into()])
        .unwrap();
    assert_eq!(edge.to_vec::<bool>().unwrap(), vec![false, false]);
}

#[test]
fn bool_arithmetic_falls_back_to_int8() {
    let ctx = cpu();
    let t = ctx.from_vec(vec![true, false], &shape(&[2])).unwrap();
    let out = ufunc("add").unwrap().call(&ctx, &[(&t).into(), (&t).into()]).unwrap();
    assert_eq!(out.dtype(), DType::I8);
    assert_eq!(out.to_vec::<i8>().unwrap(), vec![2, 0]);
}

#[test]
fn unresolvable_types_rejected() {
    let ctx = cpu();
    let f = ctx.from_vec(vec![1.0f32], &shape(&[1])).unwrap();
    let err = ufunc("bitwise_or")
        .unwrap()
        .call(&ctx, &[(&f).into(), (&f).into()])
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "'bitwise_or' has no type signature matching inputs (float32, float32)"
    );
}

// ── Resource handling ────────────────────────────────────────────────────

#[test]
fn temporaries_released_when_backend_fails() {
    let (probe, ctx) = probe_context(None);
    let ctx = ctx.unwrap();
    let base = ctx.from_vec(vec![2i8, 3], &shape(&[2])).unwrap();
    let exps = ctx.from_vec(vec![1i64, -1], &shape(&[2])).unwrap();
    let out = ctx.from_vec(vec![7i64, 7], &shape(&[2])).unwrap();
    let deferred = ctx.from_vec(vec![7.0f64, 7.0], &shape(&[2])).unwrap();
    let live = probe.inner.live_buffers();

    let power = ufunc("power").unwrap();
    for target in [&out, &deferred] {
        let err = power
            .call(&ctx, &[(&base).into(), (&exps).into(), target.into()])
            .unwrap_err();
        assert!(matches!(err, UfuncError::Backend(_)), "{err}");
        assert_eq!(probe.inner.live_buffers(), live);
    }
    assert_eq!(out.to_vec::<i64>().unwrap(), vec![7, 7]);
    assert_eq!(deferred.to_vec::<f64>().unwrap(), vec![7.0, 7.0]);
}

#[test]
fn temporaries_released_after_success() {
    let (probe, ctx) = probe_context(None);
    let ctx = ctx.unwrap();
    let a = ctx.from_vec(vec![1u8, 2], &shape(&[2])).unwrap();
    let b = ctx.from_vec(vec![0.5f64, 0.25], &shape(&[2])).unwrap();
    let out = ctx.empty(&shape(&[2]), DType::I32).unwrap();
    let live = probe.inner.live_buffers();
    ufunc("multiply")
        .unwrap()
        .call(&ctx, &[(&a).into(), (&b).into(), (&out).into()])
        .unwrap();
    assert_eq!(probe.inner.live_buffers(), live);
    assert_eq!(out.to_vec::<i32>().unwrap(), vec![0, 0]);
}

#[test]
fn missing_entry_point_detected_at_construction() {
    let hidden = ufunc_key(OpCode::Subtract, DType::I32, Some(ScalarPosition::Lhs));
    let (_, ctx) = probe_context(Some(hidden));
    match ctx {
        Err(UfuncError::MissingEntryPoint { backend, key }) => {
            assert_eq!(backend, "probe");
            assert_eq!(key, hidden);
        }
        other => panic!("expected a missing entry point, got {other:?}"),
    }

    let (_, ctx) = probe_context(Some(EntryKey::Convert {
        from: DType::U16,
        to: DType::F32,
    }));
    assert!(matches!(ctx, Err(UfuncError::MissingEntryPoint { .. })));
}

// ── Assign ───────────────────────────────────────────────────────────────

#[test]
fn scalar_assign_fills_every_dtype() {
    let ctx = cpu();
    for dtype in DType::ALL {
        let a = ctx.empty(&shape(&[3, 2]), dtype).unwrap();
        assign(&ctx, 1i64, &a).unwrap();
        assert_eq!(
            a.to_host().unwrap(),
            HostBuffer::filled(dtype, 6, Scalar::Int(1)),
            "{dtype}"
        );
    }
}

#[test]
fn array_assign_broadcasts_and_converts_to_every_dtype() {
    let ctx = cpu();
    let src = ctx.from_vec(vec![0i32, 1, 2], &shape(&[3])).unwrap();
    for dtype in DType::ALL {
        let dest = ctx.empty(&shape(&[2, 3]), dtype).unwrap();
        assign(&ctx, &src, &dest).unwrap();
        let expected = HostBuffer::from(vec![0i32, 1, 2, 0, 1, 2]).cast(dtype);
        assert_eq!(dest.to_host().unwrap(), expected, "{dtype}");
    }
}

// ── Concurrency ──────────────────────────────────────────────────────────

#[test]
fn shared_context_across_threads() {
    let ctx = cpu();
    let a = ctx.full(&shape(&[8]), DType::F32, 1.0f64).unwrap();
    let add = ufunc("add").unwrap();
    std::thread::scope(|s| {
        for _ in 0..4 {
            let (ctx, a) = (&ctx, &a);
            s.spawn(move || {
                for i in 0..25u8 {
                    let out = add.call(ctx, &[a.into(), f32::from(i).into()]).unwrap();
                    assert_eq!(out.to_vec::<f32>().unwrap(), vec![1.0 + f32::from(i); 8]);
                }
            });
        }
    });
}
