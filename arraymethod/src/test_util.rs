/*
 * Copyright (c) Microsoft Corporation.
 * Licensed under the MIT license.
 */

//! Kernels, resolvers and selectors shared by the unit tests.
//!
//! Every kernel has a distinct body so that function identity checks stay meaningful.

use std::{
    num::NonZeroI32,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use arraymethod_dtype::{testing, Casting, CastingLevel, DTypeRef, DescrRef, Descriptor};

use crate::{
    ArrayMethod, AuxDataMut, GetStridedLoop, LoopContext, LoopError, MethodFlags, MethodResult,
    MethodSpec, Resolution, ResolveDescriptors, SelectedLoop, Slot, StridedLoop,
};

pub const FAILURE_CODE: i32 = -5;

/// `int32 + int32 -> int32` with the aligned strided loop [`add_i32`].
pub fn binary_i32_spec() -> MethodSpec {
    MethodSpec::new("add", 2, 1)
        .with_casting(Casting::No)
        .with_dtypes(std::iter::repeat(Some(testing::int32())).take(3))
        .with_slot(Slot::strided_loop(StridedLoop::new(add_i32)))
}

/// `n` default `int32` instances.
pub fn i32_descriptors(n: usize) -> Vec<DescrRef> {
    (0..n)
        .map(|_| testing::int32().default_descriptor().unwrap())
        .collect()
}

/// # Safety
///
/// Three aligned `i32` arguments.
pub unsafe fn add_i32(
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
            data[2]
                .offset(i * strides[2])
                .cast::<i32>()
                .write(lhs.wrapping_add(rhs));
        }
    }
    Ok(())
}

/// # Safety
///
/// Three aligned, contiguous and non-overlapping `i32` arguments.
pub unsafe fn add_i32_contiguous(
    _context: &LoopContext<'_>,
    data: &[*mut u8],
    len: usize,
    _strides: &[isize],
    _auxdata: AuxDataMut<'_>,
) -> Result<(), LoopError> {
    // SAFETY: Guaranteed by the caller.
    let (lhs, rhs, out) = unsafe {
        (
            std::slice::from_raw_parts(data[0].cast::<i32>(), len),
            std::slice::from_raw_parts(data[1].cast::<i32>(), len),
            std::slice::from_raw_parts_mut(data[2].cast::<i32>(), len),
        )
    };
    for ((out, lhs), rhs) in out.iter_mut().zip(lhs).zip(rhs) {
        *out = lhs.wrapping_add(*rhs);
    }
    Ok(())
}

/// # Safety
///
/// Three possibly unaligned `i32` arguments.
pub unsafe fn add_i32_unaligned(
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
                .write_unaligned(lhs.wrapping_add(rhs));
        }
    }
    Ok(())
}

/// # Safety
///
/// Never touches its arguments.
pub unsafe fn noop(
    _context: &LoopContext<'_>,
    _data: &[*mut u8],
    _len: usize,
    _strides: &[isize],
    _auxdata: AuxDataMut<'_>,
) -> Result<(), LoopError> {
    Ok(())
}

/// # Safety
///
/// Never touches its arguments.
pub unsafe fn noop_unaligned(
    _context: &LoopContext<'_>,
    data: &[*mut u8],
    _len: usize,
    strides: &[isize],
    _auxdata: AuxDataMut<'_>,
) -> Result<(), LoopError> {
    if data.len() != strides.len() {
        return Err(LoopError::INVALID_AUXDATA);
    }
    Ok(())
}

/// # Safety
///
/// Never touches its arguments.
pub unsafe fn failing(
    _context: &LoopContext<'_>,
    _data: &[*mut u8],
    _len: usize,
    _strides: &[isize],
    _auxdata: AuxDataMut<'_>,
) -> Result<(), LoopError> {
    Err(LoopError::new(NonZeroI32::new(FAILURE_CODE).unwrap()))
}

/// A resolver rejecting every combination.
#[derive(Debug)]
pub struct AlwaysInvalid;

impl ResolveDescriptors for AlwaysInvalid {
    fn resolve_descriptors(
        &self,
        _method: &ArrayMethod,
        _dtypes: &[Option<DTypeRef>],
        _given: &[Option<DescrRef>],
    ) -> MethodResult<Option<Resolution>> {
        Ok(None)
    }
}

/// A resolver reporting a fixed casting level.
///
/// Given instances are used unchanged, missing ones are default instances of their class.
/// A deferred class without a given instance is an invalid combination.
#[derive(Debug)]
pub struct FixedCasting(pub CastingLevel);

impl ResolveDescriptors for FixedCasting {
    fn resolve_descriptors(
        &self,
        _method: &ArrayMethod,
        dtypes: &[Option<DTypeRef>],
        given: &[Option<DescrRef>],
    ) -> MethodResult<Option<Resolution>> {
        let mut descriptors = Vec::with_capacity(given.len());
        for (dtype, given) in std::iter::zip(dtypes, given) {
            let descr = match (given, dtype) {
                (Some(given), _) => Descriptor::ensure_canonical(given),
                (None, Some(dtype)) => dtype.default_descriptor()?,
                (None, None) => return Ok(None),
            };
            descriptors.push(descr);
        }
        Ok(Some(Resolution::new(self.0, descriptors)))
    }
}

/// Shared observations of [`record_runs`].
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    /// The length of every invocation.
    pub runs: Arc<Mutex<Vec<usize>>>,
    /// Every element of the first argument, in visiting order.
    pub visited: Arc<Mutex<Vec<i32>>>,
    /// The number of released [`RecordingData`].
    pub drops: Arc<AtomicUsize>,
}

#[derive(Debug)]
pub struct RecordingData {
    recorder: Recorder,
    fail_on_run: Option<usize>,
}

impl Drop for RecordingData {
    fn drop(&mut self) {
        self.recorder.drops.fetch_add(1, Ordering::SeqCst);
    }
}

/// Records the runs it is called with. The first argument must hold `i32`s.
///
/// # Safety
///
/// See [`crate::StridedLoopFn`].
pub unsafe fn record_runs(
    _context: &LoopContext<'_>,
    data: &[*mut u8],
    len: usize,
    strides: &[isize],
    auxdata: AuxDataMut<'_>,
) -> Result<(), LoopError> {
    let Some(recording) = auxdata.and_then(|auxdata| auxdata.downcast_mut::<RecordingData>())
    else {
        return Err(LoopError::INVALID_AUXDATA);
    };

    let mut visited = recording.recorder.visited.lock().unwrap();
    for i in 0..len as isize {
        // SAFETY: Guaranteed by the caller.
        visited.push(unsafe { data[0].offset(i * strides[0]).cast::<i32>().read_unaligned() });
    }

    let mut runs = recording.recorder.runs.lock().unwrap();
    runs.push(len);
    if recording.fail_on_run == Some(runs.len()) {
        return Err(RecordingSelector::FAILURE);
    }
    Ok(())
}

/// A selector handing out [`record_runs`] with fresh [`RecordingData`].
#[derive(Debug, Default)]
pub struct RecordingSelector {
    pub recorder: Recorder,
    pub fail_on_run: Option<usize>,
}

impl RecordingSelector {
    pub const FAILURE: LoopError = LoopError::new(NonZeroI32::new(-7).unwrap());

    /// Fail on the `run`-th invocation, counting from 1.
    pub fn failing_on_run(run: usize) -> Self {
        Self {
            recorder: Recorder::default(),
            fail_on_run: Some(run),
        }
    }
}

impl GetStridedLoop for RecordingSelector {
    fn get_strided_loop(
        &self,
        context: &LoopContext<'_>,
        _aligned: bool,
        _strides: &[isize],
    ) -> MethodResult<SelectedLoop> {
        let data = RecordingData {
            recorder: self.recorder.clone(),
            fail_on_run: self.fail_on_run,
        };
        Ok(SelectedLoop::new(StridedLoop::new(record_runs))
            .with_auxdata(Box::new(data))
            .with_flags(context.method().flags().runtime()))
    }
}

/// A selector handing out [`noop`] with a fixed set of flags.
#[derive(Debug)]
pub struct FixedFlags(pub MethodFlags);

impl GetStridedLoop for FixedFlags {
    fn get_strided_loop(
        &self,
        _context: &LoopContext<'_>,
        _aligned: bool,
        _strides: &[isize],
    ) -> MethodResult<SelectedLoop> {
        Ok(SelectedLoop::new(StridedLoop::new(noop)).with_flags(self.0))
    }
}
