/*
 * Copyright (c) Microsoft Corporation.
 * Licensed under the MIT license.
 */

//! Inner loops that skip masked-out elements.
//!
//! The masked loop takes one argument more than the method: a trailing boolean mask with
//! one byte per element. The wrapped inner loop is invoked once for every maximal run of
//! `true` entries, with all pointers advanced past the preceding `false` entries.

use tracing::trace;

use crate::{
    AuxDataMut, InternalFault, LoopContext, LoopError, MethodError, MethodResult, SelectedLoop,
    StridedLoop,
};

/// The auxiliary data of a masked loop.
///
/// Owns the wrapped loop together with its auxiliary data, which is released exactly once
/// when `self` is dropped.
#[derive(Debug)]
pub struct MaskedLoopData {
    inner: SelectedLoop,
    nargs: usize,
    scratch: Vec<*mut u8>,
}

// SAFETY: `scratch` only holds copies of the data pointers of the call in progress. It
// is overwritten at the start of every call and never dereferenced outside of one.
unsafe impl Send for MaskedLoopData {}

impl MaskedLoopData {
    /// The wrapped loop.
    pub fn inner(&self) -> &SelectedLoop {
        &self.inner
    }

    pub fn nargs(&self) -> usize {
        self.nargs
    }
}

/// Select the inner loop for `context` and wrap it into a masked loop.
///
/// Only the first `nargs` entries of `strides` are used for selecting the inner loop, so
/// the stride of the mask may be included. The returned loop expects `nargs + 1` data
/// pointers and strides, the last of which describe the mask.
pub fn get_masked_strided_loop(
    context: &LoopContext<'_>,
    aligned: bool,
    strides: &[isize],
) -> MethodResult<SelectedLoop> {
    let method = context.method();
    let nargs = method.nargs();
    let strides = strides.get(..nargs).ok_or_else(|| {
        MethodError::from(InternalFault::ArgumentCount {
            method: method.name().to_owned(),
            what: "strides",
            expected: nargs,
            got: strides.len(),
        })
    })?;

    let inner = context.get_strided_loop(aligned, strides)?;
    let flags = inner.flags;
    let data = MaskedLoopData {
        inner,
        nargs,
        scratch: vec![std::ptr::null_mut(); nargs],
    };

    Ok(SelectedLoop::new(StridedLoop::new(masked_strided_loop))
        .with_auxdata(Box::new(data))
        .with_flags(flags))
}

/// The masked loop. Its auxiliary data must be a [`MaskedLoopData`] and `data` and
/// `strides` must hold `nargs + 1` entries, the last ones describing the mask. Otherwise
/// [`LoopError::INVALID_AUXDATA`] or [`LoopError::ARGUMENT_COUNT`] is returned.
///
/// # Safety
///
/// See [`crate::StridedLoopFn`]. The mask must be readable for `len` bytes at its stride.
pub unsafe fn masked_strided_loop(
    context: &LoopContext<'_>,
    data: &[*mut u8],
    len: usize,
    strides: &[isize],
    auxdata: AuxDataMut<'_>,
) -> Result<(), LoopError> {
    let Some(masked) = auxdata.and_then(|auxdata| auxdata.downcast_mut::<MaskedLoopData>())
    else {
        return Err(LoopError::INVALID_AUXDATA);
    };
    let nargs = masked.nargs;
    if data.len() != nargs + 1 || strides.len() != nargs + 1 {
        return Err(LoopError::ARGUMENT_COUNT);
    }

    let (strides, mask_stride) = (&strides[..nargs], strides[nargs]);
    let mut mask = data[nargs].cast_const();
    masked.scratch.copy_from_slice(&data[..nargs]);

    let mut remaining = len;
    while remaining > 0 {
        // SAFETY: `mask` is readable for `remaining` more elements.
        let skip = unsafe { run_length(mask, mask_stride, remaining, false) };
        advance(&mut masked.scratch, strides, skip);
        mask = mask.wrapping_offset(mask_stride.wrapping_mul(skip as isize));
        remaining -= skip;
        if remaining == 0 {
            break;
        }

        // SAFETY: As above.
        let run = unsafe { run_length(mask, mask_stride, remaining, true) };
        trace!("{}: masked run of {}", context.method().name(), run);
        // SAFETY: The scratch pointers are valid for `remaining >= run` elements by the
        // contract of this function.
        unsafe { masked.inner.call(context, &masked.scratch, run, strides) }?;
        advance(&mut masked.scratch, strides, run);
        mask = mask.wrapping_offset(mask_stride.wrapping_mul(run as isize));
        remaining -= run;
    }
    Ok(())
}

/// Count the leading mask entries equal to `value`, up to `len`.
///
/// # Safety
///
/// `mask` offset by `k * stride` bytes must be readable for all `k < len`.
unsafe fn run_length(mask: *const u8, stride: isize, len: usize, value: bool) -> usize {
    let mut count = 0;
    let mut ptr = mask;
    // SAFETY: `count < len`.
    while count < len && (unsafe { ptr.read() } != 0) == value {
        count += 1;
        ptr = ptr.wrapping_offset(stride);
    }
    count
}

fn advance(pointers: &mut [*mut u8], strides: &[isize], elements: usize) {
    for (ptr, &stride) in std::iter::zip(pointers, strides) {
        *ptr = ptr.wrapping_offset(stride.wrapping_mul(elements as isize));
    }
}

///////////
// Tests //
///////////
