/*
 * Copyright (c) Microsoft Corporation.
 * Licensed under the MIT license.
 */

//! End-to-end behavior of methods built from specifications.

use std::sync::{Arc, Mutex};

use arraymethod::{
    get_masked_strided_loop, ArrayMethod, AuxDataMut, BoundArrayMethod, CallError,
    GetStridedLoop, LoopContext, LoopError, MethodFlags, MethodResult, MethodSpec, SelectedLoop,
    Slot, StridedArg, StridedLoop,
};
use arraymethod_dtype::{testing, Casting, CastingLevel, DTypeRef, DescrRef, Descriptor};
use proptest::prelude::*;
use rand::{rngs::StdRng, Rng, SeedableRng};

/////////////
// Kernels //
/////////////

/// # Safety
///
/// Three aligned `i32` arguments.
unsafe fn sum_i32(
    _context: &LoopContext<'_>,
    data: &[*mut u8],
    len: usize,
    strides: &[isize],
    _auxdata: AuxDataMut<'_>,
) -> Result<(), LoopError> {
    for i in 0..len as isize {
        // SAFETY: Guaranteed by the caller.
        unsafe {
            let lhs = data[0].offset(i * strides[0]).cast::<i32>().read();
            let rhs = data[1].offset(i * strides[1]).cast::<i32>().read();
            data[2].offset(i * strides[2]).cast::<i32>().write(lhs + rhs);
        }
    }
    Ok(())
}

/// # Safety
///
/// Three possibly unaligned `i32` arguments.
unsafe fn sum_i32_unaligned(
    _context: &LoopContext<'_>,
    data: &[*mut u8],
    len: usize,
    strides: &[isize],
    _auxdata: AuxDataMut<'_>,
) -> Result<(), LoopError> {
    for i in 0..len as isize {
        // SAFETY: Guaranteed by the caller.
        unsafe {
            let lhs = data[0].offset(i * strides[0]).cast::<i32>().read_unaligned();
            let rhs = data[1].offset(i * strides[1]).cast::<i32>().read_unaligned();
            data[2]
                .offset(i * strides[2])
                .cast::<i32>()
                .write_unaligned(lhs + rhs);
        }
    }
    Ok(())
}

/// # Safety
///
/// Never touches its arguments.
unsafe fn untouched(
    _context: &LoopContext<'_>,
    _data: &[*mut u8],
    len: usize,
    _strides: &[isize],
    _auxdata: AuxDataMut<'_>,
) -> Result<(), LoopError> {
    match len {
        usize::MAX => Err(LoopError::INVALID_AUXDATA),
        _ => Ok(()),
    }
}

#[derive(Debug, Default)]
struct Counts {
    runs: Vec<usize>,
    visited: Vec<i32>,
}

#[derive(Debug)]
struct Counter(Arc<Mutex<Counts>>);

/// Counts elements without writing anything.
///
/// # Safety
///
/// The first argument holds `len` `i32`s.
unsafe fn count(
    _context: &LoopContext<'_>,
    data: &[*mut u8],
    len: usize,
    strides: &[isize],
    auxdata: AuxDataMut<'_>,
) -> Result<(), LoopError> {
    let Some(counter) = auxdata.and_then(|auxdata| auxdata.downcast_mut::<Counter>()) else {
        return Err(LoopError::INVALID_AUXDATA);
    };
    let mut counts = counter.0.lock().unwrap();
    counts.runs.push(len);
    for i in 0..len as isize {
        // SAFETY: Guaranteed by the caller.
        let value = unsafe { data[0].offset(i * strides[0]).cast::<i32>().read() };
        counts.visited.push(value);
    }
    Ok(())
}

#[derive(Debug, Default)]
struct CountingSelector(Arc<Mutex<Counts>>);

impl GetStridedLoop for CountingSelector {
    fn get_strided_loop(
        &self,
        _context: &LoopContext<'_>,
        _aligned: bool,
        _strides: &[isize],
    ) -> MethodResult<SelectedLoop> {
        Ok(SelectedLoop::new(StridedLoop::new(count))
            .with_auxdata(Box::new(Counter(self.0.clone()))))
    }
}

/////////////
// Helpers //
/////////////

fn int32() -> DescrRef {
    testing::int32().default_descriptor().unwrap()
}

fn sum_spec() -> MethodSpec {
    MethodSpec::new("sum", 2, 1)
        .with_casting(Casting::No)
        .with_dtypes(std::iter::repeat(Some(testing::int32())).take(3))
        .with_slot(Slot::strided_loop(StridedLoop::new(sum_i32)))
}

fn counting_method(counts: Arc<Mutex<Counts>>) -> BoundArrayMethod {
    let spec = MethodSpec::new("count", 1, 0)
        .with_casting(Casting::No)
        .with_dtypes([Some(testing::int32())])
        .with_slot(Slot::get_loop(Arc::new(CountingSelector(counts))));
    ArrayMethod::from_spec(&spec).unwrap()
}

fn run_masked(bound: &BoundArrayMethod, values: &[i32], mask: &[bool]) {
    let descriptors = [int32()];
    let context = LoopContext::new(bound.method(), &descriptors);
    let mut selected = get_masked_strided_loop(&context, true, &[4, 1]).unwrap();

    let mut values = values.to_vec();
    let mut mask: Vec<u8> = mask.iter().map(|&m| u8::from(m)).collect();
    let data = [values.as_mut_ptr().cast::<u8>(), mask.as_mut_ptr()];
    // SAFETY: Both buffers hold `values.len()` elements at the given strides.
    unsafe { selected.call(&context, &data, values.len(), &[4, 1]) }.unwrap();
}

fn zoo() -> impl Strategy<Value = DTypeRef> {
    prop::sample::select(vec![testing::boolean(), testing::int32(), testing::float64()])
}

///////////
// Tests //
///////////

#[test]
fn same_kind_with_deferred_output_resolves_to_no_casting() {
    let spec = MethodSpec::new("maximum", 2, 1)
        .with_casting(Casting::SameKind)
        .with_dtypes([Some(testing::int32()), Some(testing::int32()), None])
        .with_slot(Slot::strided_loop(StridedLoop::new(sum_i32)));
    let bound = ArrayMethod::from_spec(&spec).unwrap();

    let resolution = bound
        .resolve_descriptors(&[Some(int32()), Some(int32()), None])
        .unwrap()
        .unwrap();
    assert_eq!(resolution.casting(), CastingLevel::NO);

    let out = &resolution.descriptors()[2];
    assert!(out.is_instance_of(&testing::int32()));
    assert!(out.is_canonical());
}

#[test]
fn unaligned_strided_serves_unaligned_contiguous_buffers() {
    let spec = sum_spec()
        .with_flags(MethodFlags::SUPPORTS_UNALIGNED)
        .with_slot(Slot::unaligned_strided_loop(StridedLoop::new(sum_i32_unaligned)));
    let bound = ArrayMethod::from_spec(&spec).unwrap();

    let descriptors = [int32(), int32(), int32()];
    let context = LoopContext::new(bound.method(), &descriptors);
    let selected = context.get_strided_loop(false, &[4, 4, 4]).unwrap();
    assert!(selected
        .func
        .same(&StridedLoop::new(sum_i32_unaligned)));

    // The same through the direct call, with buffers off the four byte grid.
    let mut storage = [0u32; 8];
    let base = storage.as_mut_ptr().cast::<u8>().wrapping_add(1);
    for (i, value) in [1i32, 2, 30, 40].into_iter().enumerate() {
        // SAFETY: `base + 4 * i + 4` is within the 32 bytes of `storage`.
        unsafe { base.add(4 * i).cast::<i32>().write_unaligned(value) };
    }
    // SAFETY: Each argument covers 8 bytes of `storage`, at offsets 1, 9 and 17.
    let args = unsafe {
        [
            StridedArg::from_raw_parts(int32(), base, 2, 4, false),
            StridedArg::from_raw_parts(int32(), base.add(8), 2, 4, false),
            StridedArg::from_raw_parts(int32(), base.add(16), 2, 4, true),
        ]
    };
    bound.simple_strided_call(&args).unwrap();
    drop(args);

    // SAFETY: The output covers offsets 17 to 25.
    let out = [0, 1].map(|i| unsafe { base.add(16 + 4 * i).cast::<i32>().read_unaligned() });
    assert_eq!(out, [31, 42]);
}

#[test]
fn masked_runs() {
    let counts = Arc::new(Mutex::new(Counts::default()));
    let bound = counting_method(counts.clone());

    run_masked(&bound, &[1, 2, 3, 4, 5], &[true, true, false, false, true]);
    let counts = counts.lock().unwrap();
    assert_eq!(counts.runs, [2, 1]);
    assert_eq!(counts.visited, [1, 2, 5]);
}

#[test]
fn direct_call_does_not_adapt() {
    let bound = ArrayMethod::from_spec(&sum_spec()).unwrap();
    let lhs = [1i32, 2];
    let rhs = [3i32, 4];
    let mut out = [0i32; 2];

    let args = [
        StridedArg::from_slice(int32(), &lhs).unwrap(),
        StridedArg::from_slice(int32(), &rhs).unwrap(),
        StridedArg::from_mut_slice(testing::swapped(&testing::int32()), &mut out).unwrap(),
    ];
    let err = bound.simple_strided_call(&args).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<CallError>(),
        Some(CallError::DescriptorsAdapted { index: 2, .. })
    ));
    drop(args);
    assert_eq!(out, [0, 0]);

    let args = [
        StridedArg::from_slice(int32(), &lhs).unwrap(),
        StridedArg::from_slice(int32(), &rhs).unwrap(),
        StridedArg::from_mut_slice(int32(), &mut out).unwrap(),
    ];
    bound.simple_strided_call(&args).unwrap();
    drop(args);
    assert_eq!(out, [4, 6]);
}

#[test]
fn selection_is_deterministic() {
    let spec = sum_spec()
        .with_flags(MethodFlags::SUPPORTS_UNALIGNED)
        .with_slot(Slot::contiguous_loop(StridedLoop::new(untouched)))
        .with_slot(Slot::unaligned_strided_loop(StridedLoop::new(sum_i32_unaligned)));
    let bound = ArrayMethod::from_spec(&spec).unwrap();
    let descriptors = [int32(), int32(), int32()];
    let context = LoopContext::new(bound.method(), &descriptors);

    let mut rng = StdRng::seed_from_u64(0x5eed);
    for _ in 0..64 {
        let aligned = rng.random::<bool>();
        let strides: [isize; 3] =
            std::array::from_fn(|_| 4 * rng.random_range(-2i32..3) as isize);

        let first = context.get_strided_loop(aligned, &strides).unwrap().func;
        for _ in 0..4 {
            let again = context.get_strided_loop(aligned, &strides).unwrap().func;
            assert_eq!(again.addr(), first.addr());
        }
        let contiguous = aligned && strides == [4, 4, 4];
        assert_eq!(first.same(&StridedLoop::new(untouched)), contiguous);
    }
}

#[test]
fn rebinding_shares_the_method() {
    let bound = ArrayMethod::from_spec(&sum_spec()).unwrap();
    let rebound = BoundArrayMethod::new(
        bound.method().clone(),
        vec![Some(testing::float64()), Some(testing::float64()), None],
    )
    .unwrap();
    assert!(Arc::ptr_eq(bound.method(), rebound.method()));

    let float = testing::float64().default_descriptor().unwrap();
    let resolution = rebound
        .resolve_descriptors(&[Some(float.clone()), Some(float.clone()), None])
        .unwrap()
        .unwrap();
    assert_eq!(resolution.casting(), CastingLevel::NO);
    assert!(resolution.descriptors()[2].is_instance_of(&testing::float64()));
}

proptest! {
    #[test]
    fn canonical_inputs_resolve_to_themselves(
        dtype in zoo(),
        nin in 1usize..4,
        nout in 1usize..3,
        casting in prop::sample::select(Casting::ALL.to_vec()),
    ) {
        let spec = MethodSpec::new("identity", nin, nout)
            .with_casting(casting)
            .with_dtypes(std::iter::repeat(Some(dtype.clone())).take(nin + nout))
            .with_slot(Slot::strided_loop(StridedLoop::new(untouched)));
        spec.validate().unwrap();
        spec.validate().unwrap();
        let bound = ArrayMethod::from_spec(&spec).unwrap();

        let given: Vec<DescrRef> = (0..nin + nout)
            .map(|_| dtype.default_descriptor().unwrap())
            .collect();
        let resolution = bound
            .resolve_descriptors(&given.iter().cloned().map(Some).collect::<Vec<_>>())
            .unwrap()
            .unwrap();

        prop_assert_eq!(resolution.casting(), CastingLevel::new(casting));
        prop_assert_eq!(resolution.descriptors().len(), given.len());
        for (resolved, given) in std::iter::zip(resolution.descriptors(), &given) {
            prop_assert!(Descriptor::identical(resolved, given));
        }
    }

    #[test]
    fn masked_loop_visits_unmasked_elements_once(
        mask in proptest::collection::vec(any::<bool>(), 0..128)
    ) {
        let counts = Arc::new(Mutex::new(Counts::default()));
        let bound = counting_method(counts.clone());
        let values: Vec<i32> = (0..mask.len() as i32).collect();
        run_masked(&bound, &values, &mask);

        let counts = counts.lock().unwrap();
        let expected: Vec<i32> = std::iter::zip(&values, &mask)
            .filter_map(|(&value, &keep)| keep.then_some(value))
            .collect();
        prop_assert_eq!(counts.runs.iter().sum::<usize>(), expected.len());
        prop_assert!(counts.runs.iter().all(|&run| run > 0));
        prop_assert_eq!(&counts.visited, &expected);
    }
}
